#![forbid(unsafe_code)]

pub mod ast;
pub mod lexer;
pub mod parser;
pub mod template;

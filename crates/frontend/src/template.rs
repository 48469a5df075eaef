#![forbid(unsafe_code)]

use crate::ast::Expr;
use crate::lexer::{lex, Pos};
use crate::parser::{ParseError, Parser};

/// The compiled form of a print template: literal text alternating with
/// embedded expressions. Compiled once at parse time, never re-parsed during
/// evaluation. `raw` keeps the literal's original content so a template
/// renders back to the exact source it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    pub raw: String,
    pub segments: Vec<Segment>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    Text(String),
    Expr(Expr),
}

/// Compile a string literal's raw content. `{expr}` spans are parsed with the
/// full expression grammar; `{{` and `}}` escape to literal braces. `pos` is
/// the literal's own source position, used for every diagnostic raised here.
pub fn compile(raw: &str, pos: Pos) -> Result<Template, ParseError> {
    let mut segments = Vec::new();
    let mut text = String::new();
    let mut chars = raw.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                text.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                text.push('}');
            }
            '}' => return Err(ParseError::UnmatchedBrace { pos }),
            '{' => {
                let mut interior = String::new();
                let mut closed = false;
                for c in chars.by_ref() {
                    if c == '}' {
                        closed = true;
                        break;
                    }
                    interior.push(c);
                }
                if !closed {
                    return Err(ParseError::UnmatchedBrace { pos });
                }
                if !text.is_empty() {
                    segments.push(Segment::Text(std::mem::take(&mut text)));
                }
                segments.push(Segment::Expr(compile_expr(&interior)?));
            }
            _ => text.push(ch),
        }
    }
    if !text.is_empty() {
        segments.push(Segment::Text(text));
    }

    Ok(Template {
        raw: raw.to_string(),
        segments,
    })
}

fn compile_expr(interior: &str) -> Result<Expr, ParseError> {
    let tokens = lex(interior)?;
    let mut parser = Parser::from_tokens(tokens);
    let expr = parser.parse_expr()?;
    parser.expect_eof("end of interpolated expression")?;
    Ok(expr)
}

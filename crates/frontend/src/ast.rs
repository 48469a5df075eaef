#![forbid(unsafe_code)]

use crate::lexer::Pos;
use crate::template::Template;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub funcs: Vec<FuncDecl>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FuncDecl {
    pub name: String,
    /// Parameters are implicitly typed `int`.
    pub params: Vec<String>,
    pub ret: RetType,
    pub body: Block,
    pub pos: Pos,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetType {
    Int,
    None,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub stmts: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Decl(VarDecl),
    Assign(Assign),
    Expr(Expr),
    For(ForStmt),
    While(WhileStmt),
    If(IfStmt),
    Return { value: Option<Expr>, pos: Pos },
    Print(PrintStmt),
}

/// `decl name [size] = init;` — a size marks an array; a missing initializer
/// zero-fills.
#[derive(Debug, Clone, PartialEq)]
pub struct VarDecl {
    pub name: String,
    pub size: Option<i64>,
    pub init: Option<Expr>,
    pub pos: Pos,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Assign {
    pub target: Target,
    pub op: AssignOp,
    pub value: Expr,
    pub pos: Pos,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    Name(String),
    Index(String, Box<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    Set,
    Add,
    Sub,
    Mul,
    Div,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForStmt {
    pub init: Option<ForInit>,
    pub cond: Expr,
    pub step: Assign,
    pub body: Block,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ForInit {
    Decl(VarDecl),
    Assign(Assign),
}

#[derive(Debug, Clone, PartialEq)]
pub struct WhileStmt {
    pub cond: Expr,
    pub body: Block,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IfStmt {
    pub cond: Expr,
    pub then_body: Block,
    pub else_body: Option<Block>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PrintStmt {
    pub newline: bool,
    pub template: Template,
    pub pos: Pos,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Int {
        value: i64,
        pos: Pos,
    },
    Ident {
        name: String,
        pos: Pos,
    },
    Unary {
        op: UnaryOp,
        expr: Box<Expr>,
        pos: Pos,
    },
    Binary {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
        pos: Pos,
    },
    Call {
        name: String,
        args: Vec<Expr>,
        pos: Pos,
    },
    Index {
        name: String,
        index: Box<Expr>,
        pos: Pos,
    },
    /// Array literal; only legal as the initializer of a sized `decl`.
    Array {
        elems: Vec<Expr>,
        pos: Pos,
    },
}

impl Expr {
    pub fn pos(&self) -> Pos {
        match self {
            Expr::Int { pos, .. }
            | Expr::Ident { pos, .. }
            | Expr::Unary { pos, .. }
            | Expr::Binary { pos, .. }
            | Expr::Call { pos, .. }
            | Expr::Index { pos, .. }
            | Expr::Array { pos, .. } => *pos,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Eq,
    NotEq,
}

// --- rendering ---
//
// Every node renders back to parseable source; re-parsing the rendered text
// yields a structurally identical tree (positions aside).

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, func) in self.funcs.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            writeln!(f, "{func}")?;
        }
        Ok(())
    }
}

impl fmt::Display for FuncDecl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fun {}({})", self.name, self.params.join(", "))?;
        if self.ret == RetType::Int {
            write!(f, " int")?;
        }
        write!(f, " {}", self.body)
    }
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{{")?;
        for stmt in &self.stmts {
            writeln!(f, "{stmt}")?;
        }
        write!(f, "}}")
    }
}

impl fmt::Display for Stmt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stmt::Decl(d) => write!(f, "{d};"),
            Stmt::Assign(a) => write!(f, "{a};"),
            Stmt::Expr(e) => write!(f, "{e};"),
            Stmt::For(s) => write!(f, "{s}"),
            Stmt::While(s) => write!(f, "while ({}) {}", s.cond, s.body),
            Stmt::If(s) => {
                write!(f, "if ({}) {}", s.cond, s.then_body)?;
                if let Some(else_body) = &s.else_body {
                    write!(f, " else {else_body}")?;
                }
                Ok(())
            }
            Stmt::Return { value: Some(e), .. } => write!(f, "return {e};"),
            Stmt::Return { value: None, .. } => write!(f, "return;"),
            Stmt::Print(p) => {
                let name = if p.newline { "println" } else { "print" };
                write!(f, "{name}(\"{}\");", p.template.raw)
            }
        }
    }
}

impl fmt::Display for VarDecl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "decl {}", self.name)?;
        if let Some(size) = self.size {
            write!(f, "[{size}]")?;
        }
        if let Some(init) = &self.init {
            write!(f, " = {init}")?;
        }
        Ok(())
    }
}

impl fmt::Display for Assign {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.target, self.op, self.value)
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Name(name) => write!(f, "{name}"),
            Target::Index(name, index) => write!(f, "{name}[{index}]"),
        }
    }
}

impl fmt::Display for AssignOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            AssignOp::Set => "=",
            AssignOp::Add => "+=",
            AssignOp::Sub => "-=",
            AssignOp::Mul => "*=",
            AssignOp::Div => "/=",
        };
        write!(f, "{text}")
    }
}

impl fmt::Display for ForStmt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "for (")?;
        match &self.init {
            Some(ForInit::Decl(d)) => write!(f, "{d}")?,
            Some(ForInit::Assign(a)) => write!(f, "{a}")?,
            None => {}
        }
        write!(f, "; {}; {}) {}", self.cond, self.step, self.body)
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Int { value, .. } => write!(f, "{value}"),
            Expr::Ident { name, .. } => write!(f, "{name}"),
            Expr::Unary { op, expr, .. } => write!(f, "{op}{expr}"),
            Expr::Binary {
                op, left, right, ..
            } => write!(f, "({left} {op} {right})"),
            Expr::Call { name, args, .. } => {
                write!(f, "{name}(")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                write!(f, ")")
            }
            Expr::Index { name, index, .. } => write!(f, "{name}[{index}]"),
            Expr::Array { elems, .. } => {
                write!(f, "[")?;
                for (i, elem) in elems.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{elem}")?;
                }
                write!(f, "]")
            }
        }
    }
}

impl fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnaryOp::Neg => write!(f, "-"),
            UnaryOp::Not => write!(f, "!"),
        }
    }
}

impl fmt::Display for BinOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Lt => "<",
            BinOp::LtEq => "<=",
            BinOp::Gt => ">",
            BinOp::GtEq => ">=",
            BinOp::Eq => "==",
            BinOp::NotEq => "!=",
        };
        write!(f, "{text}")
    }
}

#![forbid(unsafe_code)]

use crate::ast::*;
use crate::lexer::{lex, LexError, Pos, Token, TokenKind};
use crate::template;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error(transparent)]
    Lex(#[from] LexError),
    #[error("{pos}: expected {expected}, found {found}")]
    Unexpected {
        expected: &'static str,
        found: TokenKind,
        pos: Pos,
    },
    #[error("{pos}: array size must be a non-negative integer literal")]
    BadArraySize { pos: Pos },
    #[error("{pos}: array initializer has {count} element(s), expected 1 or {size}")]
    BadArrayInit { count: usize, size: i64, pos: Pos },
    #[error("{pos}: a sized declaration requires an array literal initializer")]
    ExpectedArrayInit { pos: Pos },
    #[error("{pos}: an array literal requires a declared size")]
    ArrayInitWithoutSize { pos: Pos },
    #[error("{pos}: unmatched brace in string template")]
    UnmatchedBrace { pos: Pos },
}

/// Recursive-descent parser over an eagerly lexed token vector. Parsing stops
/// at the first error; there is no recovery.
pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    pub fn new(source: &str) -> Result<Self, ParseError> {
        Ok(Self::from_tokens(lex(source)?))
    }

    pub(crate) fn from_tokens(mut tokens: Vec<Token>) -> Self {
        if tokens.is_empty() {
            tokens.push(Token {
                kind: TokenKind::Eof,
                pos: Pos { line: 1, column: 1 },
            });
        }
        Self { tokens, pos: 0 }
    }

    pub fn parse_program(&mut self) -> Result<Program, ParseError> {
        let mut funcs = Vec::new();
        while !self.check(&TokenKind::Eof) {
            funcs.push(self.parse_func()?);
        }
        Ok(Program { funcs })
    }

    fn parse_func(&mut self) -> Result<FuncDecl, ParseError> {
        let fun_tok = self.expect(&TokenKind::KwFun, "'fun'")?;
        let (name, _) = self.expect_ident("a function name")?;
        self.expect(&TokenKind::LParen, "'(' after function name")?;
        let mut params = Vec::new();
        if !self.check(&TokenKind::RParen) {
            loop {
                let (param, _) = self.expect_ident("a parameter name")?;
                params.push(param);
                if !self.matches(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(&TokenKind::RParen, "')' after parameters")?;
        // 'none' may be written explicitly or omitted
        let ret = if self.matches(&TokenKind::KwInt) {
            RetType::Int
        } else {
            self.matches(&TokenKind::KwNone);
            RetType::None
        };
        let body = self.parse_block()?;
        Ok(FuncDecl {
            name,
            params,
            ret,
            body,
            pos: fun_tok.pos,
        })
    }

    fn parse_block(&mut self) -> Result<Block, ParseError> {
        self.expect(&TokenKind::LBrace, "'{' to open a block")?;
        let mut stmts = Vec::new();
        while !self.matches(&TokenKind::RBrace) {
            if self.check(&TokenKind::Eof) {
                return Err(ParseError::Unexpected {
                    expected: "'}' to close a block",
                    found: TokenKind::Eof,
                    pos: self.peek_pos(),
                });
            }
            stmts.push(self.parse_stmt()?);
        }
        Ok(Block { stmts })
    }

    fn parse_stmt(&mut self) -> Result<Stmt, ParseError> {
        if self.check(&TokenKind::KwDecl) {
            let decl = self.parse_decl()?;
            self.expect(&TokenKind::Semicolon, "';' after declaration")?;
            return Ok(Stmt::Decl(decl));
        }
        if self.check(&TokenKind::KwFor) {
            return self.parse_for();
        }
        if self.check(&TokenKind::KwWhile) {
            return self.parse_while();
        }
        if self.check(&TokenKind::KwIf) {
            return self.parse_if();
        }
        if self.check(&TokenKind::KwReturn) {
            return self.parse_return();
        }

        let is_print = matches!(
            self.peek_kind(),
            TokenKind::Ident(name) if name == "print" || name == "println"
        ) && self.peek_next_is(&TokenKind::LParen);
        if is_print {
            return self.parse_print();
        }

        // assignment vs expression statement: try a target plus an assignment
        // operator, rewind otherwise
        if matches!(self.peek_kind(), TokenKind::Ident(_)) {
            let save = self.pos;
            if let Ok(assign) = self.parse_assign() {
                self.expect(&TokenKind::Semicolon, "';' after assignment")?;
                return Ok(Stmt::Assign(assign));
            }
            self.pos = save;
        }

        let expr = self.parse_expr()?;
        self.expect(&TokenKind::Semicolon, "';' after expression")?;
        Ok(Stmt::Expr(expr))
    }

    /// `decl name` with optional `[size]` and optional `= initializer`; the
    /// trailing semicolon belongs to the caller (the for-header reuses this).
    fn parse_decl(&mut self) -> Result<VarDecl, ParseError> {
        let decl_tok = self.expect(&TokenKind::KwDecl, "'decl'")?;
        let (name, _) = self.expect_ident("a variable name")?;
        let size = if self.matches(&TokenKind::LBracket) {
            let tok = self.advance();
            let TokenKind::Int(n) = tok.kind else {
                return Err(ParseError::BadArraySize { pos: tok.pos });
            };
            self.expect(&TokenKind::RBracket, "']' after array size")?;
            Some(n)
        } else {
            None
        };

        let init = if self.matches(&TokenKind::Assign) {
            if let Some(declared) = size {
                if !self.check(&TokenKind::LBracket) {
                    return Err(ParseError::ExpectedArrayInit {
                        pos: self.peek_pos(),
                    });
                }
                let lit = self.parse_array_literal()?;
                if let Expr::Array { ref elems, pos } = lit {
                    let count = elems.len();
                    if count != 1 && count as i64 != declared {
                        return Err(ParseError::BadArrayInit {
                            count,
                            size: declared,
                            pos,
                        });
                    }
                }
                Some(lit)
            } else {
                if self.check(&TokenKind::LBracket) {
                    return Err(ParseError::ArrayInitWithoutSize {
                        pos: self.peek_pos(),
                    });
                }
                Some(self.parse_expr()?)
            }
        } else {
            None
        };

        Ok(VarDecl {
            name,
            size,
            init,
            pos: decl_tok.pos,
        })
    }

    fn parse_array_literal(&mut self) -> Result<Expr, ParseError> {
        let open = self.expect(&TokenKind::LBracket, "'[' to open an array literal")?;
        let mut elems = Vec::new();
        if !self.check(&TokenKind::RBracket) {
            loop {
                elems.push(self.parse_expr()?);
                if !self.matches(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(&TokenKind::RBracket, "']' to close an array literal")?;
        Ok(Expr::Array {
            elems,
            pos: open.pos,
        })
    }

    /// Assignment without its trailing semicolon (the for-header reuses this).
    fn parse_assign(&mut self) -> Result<Assign, ParseError> {
        let (name, pos) = self.expect_ident("an assignment target")?;
        let target = if self.matches(&TokenKind::LBracket) {
            let index = self.parse_expr()?;
            self.expect(&TokenKind::RBracket, "']' after index")?;
            Target::Index(name, Box::new(index))
        } else {
            Target::Name(name)
        };
        let op_tok = self.advance();
        let op = match op_tok.kind {
            TokenKind::Assign => AssignOp::Set,
            TokenKind::PlusAssign => AssignOp::Add,
            TokenKind::MinusAssign => AssignOp::Sub,
            TokenKind::StarAssign => AssignOp::Mul,
            TokenKind::SlashAssign => AssignOp::Div,
            other => {
                return Err(ParseError::Unexpected {
                    expected: "an assignment operator",
                    found: other,
                    pos: op_tok.pos,
                })
            }
        };
        let value = self.parse_expr()?;
        Ok(Assign {
            target,
            op,
            value,
            pos,
        })
    }

    fn parse_for(&mut self) -> Result<Stmt, ParseError> {
        self.expect(&TokenKind::KwFor, "'for'")?;
        self.expect(&TokenKind::LParen, "'(' after 'for'")?;
        let init = if self.check(&TokenKind::Semicolon) {
            None
        } else if self.check(&TokenKind::KwDecl) {
            Some(ForInit::Decl(self.parse_decl()?))
        } else {
            Some(ForInit::Assign(self.parse_assign()?))
        };
        self.expect(&TokenKind::Semicolon, "';' after loop initializer")?;
        let cond = self.parse_expr()?;
        self.expect(&TokenKind::Semicolon, "';' after loop condition")?;
        let step = self.parse_assign()?;
        self.expect(&TokenKind::RParen, "')' after loop step")?;
        let body = self.parse_block()?;
        Ok(Stmt::For(ForStmt {
            init,
            cond,
            step,
            body,
        }))
    }

    fn parse_while(&mut self) -> Result<Stmt, ParseError> {
        self.expect(&TokenKind::KwWhile, "'while'")?;
        self.expect(&TokenKind::LParen, "'(' after 'while'")?;
        let cond = self.parse_expr()?;
        self.expect(&TokenKind::RParen, "')' after loop condition")?;
        let body = self.parse_block()?;
        Ok(Stmt::While(WhileStmt { cond, body }))
    }

    fn parse_if(&mut self) -> Result<Stmt, ParseError> {
        self.expect(&TokenKind::KwIf, "'if'")?;
        self.expect(&TokenKind::LParen, "'(' after 'if'")?;
        let cond = self.parse_expr()?;
        self.expect(&TokenKind::RParen, "')' after condition")?;
        let then_body = self.parse_block()?;
        let else_body = if self.matches(&TokenKind::KwElse) {
            if self.check(&TokenKind::KwIf) {
                // else-if chains nest as a single-statement else block
                let nested = self.parse_if()?;
                Some(Block {
                    stmts: vec![nested],
                })
            } else {
                Some(self.parse_block()?)
            }
        } else {
            None
        };
        Ok(Stmt::If(IfStmt {
            cond,
            then_body,
            else_body,
        }))
    }

    fn parse_return(&mut self) -> Result<Stmt, ParseError> {
        let ret_tok = self.expect(&TokenKind::KwReturn, "'return'")?;
        let value = if self.check(&TokenKind::Semicolon) {
            None
        } else {
            Some(self.parse_expr()?)
        };
        self.expect(&TokenKind::Semicolon, "';' after return")?;
        Ok(Stmt::Return {
            value,
            pos: ret_tok.pos,
        })
    }

    fn parse_print(&mut self) -> Result<Stmt, ParseError> {
        let name_tok = self.advance();
        let newline = matches!(&name_tok.kind, TokenKind::Ident(n) if n == "println");
        self.expect(&TokenKind::LParen, "'(' after print builtin")?;
        let tok = self.advance();
        let TokenKind::Str(raw) = tok.kind else {
            return Err(ParseError::Unexpected {
                expected: "a string literal",
                found: tok.kind,
                pos: tok.pos,
            });
        };
        // interpolation is compiled here, once, never per evaluation
        let template = template::compile(&raw, tok.pos)?;
        self.expect(&TokenKind::RParen, "')' after template string")?;
        self.expect(&TokenKind::Semicolon, "';' after print statement")?;
        Ok(Stmt::Print(PrintStmt {
            newline,
            template,
            pos: name_tok.pos,
        }))
    }

    // --- expressions ---
    //
    // precedence: comparison < additive < multiplicative < unary < postfix

    pub(crate) fn parse_expr(&mut self) -> Result<Expr, ParseError> {
        self.parse_cmp()
    }

    fn parse_cmp(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.parse_add()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Lt => BinOp::Lt,
                TokenKind::LtEq => BinOp::LtEq,
                TokenKind::Gt => BinOp::Gt,
                TokenKind::GtEq => BinOp::GtEq,
                TokenKind::EqEq => BinOp::Eq,
                TokenKind::NotEq => BinOp::NotEq,
                _ => break,
            };
            let pos = self.advance().pos;
            let right = self.parse_add()?;
            expr = Expr::Binary {
                op,
                left: Box::new(expr),
                right: Box::new(right),
                pos,
            };
        }
        Ok(expr)
    }

    fn parse_add(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.parse_mul()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Plus => BinOp::Add,
                TokenKind::Minus => BinOp::Sub,
                _ => break,
            };
            let pos = self.advance().pos;
            let right = self.parse_mul()?;
            expr = Expr::Binary {
                op,
                left: Box::new(expr),
                right: Box::new(right),
                pos,
            };
        }
        Ok(expr)
    }

    fn parse_mul(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.parse_unary()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Star => BinOp::Mul,
                TokenKind::Slash => BinOp::Div,
                _ => break,
            };
            let pos = self.advance().pos;
            let right = self.parse_unary()?;
            expr = Expr::Binary {
                op,
                left: Box::new(expr),
                right: Box::new(right),
                pos,
            };
        }
        Ok(expr)
    }

    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        let op = match self.peek_kind() {
            TokenKind::Minus => UnaryOp::Neg,
            TokenKind::Bang => UnaryOp::Not,
            _ => return self.parse_postfix(),
        };
        let pos = self.advance().pos;
        let expr = self.parse_unary()?;
        Ok(Expr::Unary {
            op,
            expr: Box::new(expr),
            pos,
        })
    }

    fn parse_postfix(&mut self) -> Result<Expr, ParseError> {
        let expr = self.parse_primary()?;
        if self.check(&TokenKind::LParen) {
            let Expr::Ident { name, pos } = expr else {
                return Err(ParseError::Unexpected {
                    expected: "a callable name",
                    found: self.peek_kind().clone(),
                    pos: self.peek_pos(),
                });
            };
            self.advance();
            let mut args = Vec::new();
            if !self.check(&TokenKind::RParen) {
                loop {
                    args.push(self.parse_expr()?);
                    if !self.matches(&TokenKind::Comma) {
                        break;
                    }
                }
            }
            self.expect(&TokenKind::RParen, "')' after call arguments")?;
            return Ok(Expr::Call { name, args, pos });
        }
        if self.check(&TokenKind::LBracket) {
            let Expr::Ident { name, pos } = expr else {
                return Err(ParseError::Unexpected {
                    expected: "an array name",
                    found: self.peek_kind().clone(),
                    pos: self.peek_pos(),
                });
            };
            self.advance();
            let index = self.parse_expr()?;
            self.expect(&TokenKind::RBracket, "']' after index")?;
            return Ok(Expr::Index {
                name,
                index: Box::new(index),
                pos,
            });
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        let tok = self.advance();
        match tok.kind {
            TokenKind::Ident(name) => Ok(Expr::Ident {
                name,
                pos: tok.pos,
            }),
            TokenKind::Int(value) => Ok(Expr::Int {
                value,
                pos: tok.pos,
            }),
            TokenKind::LParen => {
                let expr = self.parse_expr()?;
                self.expect(&TokenKind::RParen, "')' after expression")?;
                Ok(expr)
            }
            other => Err(ParseError::Unexpected {
                expected: "an expression",
                found: other,
                pos: tok.pos,
            }),
        }
    }

    // --- token helpers ---

    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_kind(&self) -> &TokenKind {
        &self.peek().kind
    }

    fn peek_pos(&self) -> Pos {
        self.peek().pos
    }

    fn peek_next_is(&self, kind: &TokenKind) -> bool {
        self.tokens.get(self.pos + 1).map(|t| &t.kind) == Some(kind)
    }

    fn advance(&mut self) -> Token {
        let tok = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn check(&self, kind: &TokenKind) -> bool {
        self.peek_kind() == kind
    }

    fn matches(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: &TokenKind, expected: &'static str) -> Result<Token, ParseError> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            Err(ParseError::Unexpected {
                expected,
                found: self.peek_kind().clone(),
                pos: self.peek_pos(),
            })
        }
    }

    fn expect_ident(&mut self, expected: &'static str) -> Result<(String, Pos), ParseError> {
        let tok = self.advance();
        match tok.kind {
            TokenKind::Ident(name) => Ok((name, tok.pos)),
            other => Err(ParseError::Unexpected {
                expected,
                found: other,
                pos: tok.pos,
            }),
        }
    }

    pub(crate) fn expect_eof(&mut self, expected: &'static str) -> Result<(), ParseError> {
        if self.check(&TokenKind::Eof) {
            Ok(())
        } else {
            Err(ParseError::Unexpected {
                expected,
                found: self.peek_kind().clone(),
                pos: self.peek_pos(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(src: &str) -> Program {
        let mut p = Parser::new(src).unwrap();
        p.parse_program().unwrap()
    }

    fn parse_err(src: &str) -> ParseError {
        match Parser::new(src) {
            Ok(mut p) => p.parse_program().unwrap_err(),
            Err(err) => err,
        }
    }

    #[test]
    fn parse_sample_program() {
        let src = r#"
        fun sum(a, b) int {
            return a + b;
        }

        fun main() {
            decl baz[64] = [ 1 ]; // baz 0..63 = 1
            decl bar = 37;
            for (decl i = 0; i < length(baz); i += 1) {
                print("values: {baz[i]}, {bar}; sum: ");
                println("{sum(bar, baz[i])}");
            }
        }
        "#;
        let program = parse_ok(src);
        assert_eq!(program.funcs.len(), 2);
        assert_eq!(program.funcs[0].name, "sum");
        assert_eq!(program.funcs[0].params, vec!["a", "b"]);
        assert_eq!(program.funcs[0].ret, RetType::Int);
        assert_eq!(program.funcs[1].name, "main");
        assert_eq!(program.funcs[1].ret, RetType::None);
    }

    #[test]
    fn omitted_return_type_is_none() {
        let program = parse_ok("fun main() { }");
        assert_eq!(program.funcs[0].ret, RetType::None);
    }

    #[test]
    fn precedence_comparison_lowest() {
        let program = parse_ok("fun main() { decl x = 1 + 2 * 3 < 7; }");
        let Stmt::Decl(decl) = &program.funcs[0].body.stmts[0] else {
            panic!("expected decl");
        };
        // 1 + 2 * 3 < 7 parses as ((1 + (2 * 3)) < 7)
        let Some(Expr::Binary { op, left, .. }) = &decl.init else {
            panic!("expected binary init");
        };
        assert_eq!(*op, BinOp::Lt);
        let Expr::Binary { op, right, .. } = left.as_ref() else {
            panic!("expected additive left side");
        };
        assert_eq!(*op, BinOp::Add);
        assert!(matches!(right.as_ref(), Expr::Binary { op: BinOp::Mul, .. }));
    }

    #[test]
    fn for_header_variants() {
        parse_ok("fun main() { for (decl i = 0; i < 3; i += 1) { } }");
        parse_ok("fun main() { decl i = 0; for (i = 1; i < 3; i += 1) { } }");
        parse_ok("fun main() { decl i = 0; for (; i < 3; i += 1) { } }");
    }

    #[test]
    fn decl_without_initializer() {
        let program = parse_ok("fun main() { decl a; decl b[4]; }");
        let Stmt::Decl(a) = &program.funcs[0].body.stmts[0] else {
            panic!("expected decl");
        };
        assert_eq!(a.size, None);
        assert_eq!(a.init, None);
        let Stmt::Decl(b) = &program.funcs[0].body.stmts[1] else {
            panic!("expected decl");
        };
        assert_eq!(b.size, Some(4));
        assert_eq!(b.init, None);
    }

    #[test]
    fn broadcast_and_exact_initializers_accepted() {
        parse_ok("fun main() { decl a[64] = [ 1 ]; }");
        parse_ok("fun main() { decl a[3] = [ 1, 2, 3 ]; }");
        parse_ok("fun main() { decl a[0] = [ 1 ]; }");
    }

    #[test]
    fn wrong_initializer_count_is_rejected() {
        let err = parse_err("fun main() { decl a[4] = [ 1, 2 ]; }");
        assert!(matches!(
            err,
            ParseError::BadArrayInit {
                count: 2,
                size: 4,
                ..
            }
        ));
    }

    #[test]
    fn sized_decl_requires_array_literal() {
        let err = parse_err("fun main() { decl a[4] = 5; }");
        assert!(matches!(err, ParseError::ExpectedArrayInit { .. }));
    }

    #[test]
    fn array_literal_requires_size() {
        let err = parse_err("fun main() { decl a = [ 1, 2 ]; }");
        assert!(matches!(err, ParseError::ArrayInitWithoutSize { .. }));
    }

    #[test]
    fn array_size_must_be_literal() {
        let err = parse_err("fun main() { decl a[n] = [ 1 ]; }");
        assert!(matches!(err, ParseError::BadArraySize { .. }));
    }

    #[test]
    fn print_requires_string_literal() {
        let err = parse_err("fun main() { println(42); }");
        assert!(matches!(
            err,
            ParseError::Unexpected {
                expected: "a string literal",
                ..
            }
        ));
    }

    #[test]
    fn missing_semicolon_reports_position() {
        let err = parse_err("fun main() {\n    decl a = 1\n}");
        let ParseError::Unexpected { pos, .. } = err else {
            panic!("expected unexpected-token error");
        };
        assert_eq!(pos.line, 3);
    }

    #[test]
    fn lex_error_surfaces_through_parser() {
        let err = parse_err("fun main() { decl a = 1 ~ 2; }");
        assert!(matches!(err, ParseError::Lex(LexError::UnexpectedChar { .. })));
    }

    #[test]
    fn bad_template_is_a_parse_error() {
        let err = parse_err(r#"fun main() { println("{oops"); }"#);
        assert!(matches!(err, ParseError::UnmatchedBrace { .. }));
    }

    #[test]
    fn if_else_chain() {
        parse_ok(
            r#"
        fun main() {
            decl a = 1;
            if (a < 0) {
                a = 0;
            } else if (a == 1) {
                a = 2;
            } else {
                a = 3;
            }
        }
        "#,
        );
    }
}

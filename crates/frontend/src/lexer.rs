#![forbid(unsafe_code)]

use std::fmt;
use thiserror::Error;

/// A source position, 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pos {
    pub line: u32,
    pub column: u32,
}

impl fmt::Display for Pos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub pos: Pos,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    Ident(String),
    Int(i64),
    /// String literal content, verbatim. Interpolation is resolved by the
    /// template compiler, not here.
    Str(String),

    KwFun,
    KwDecl,
    KwFor,
    KwWhile,
    KwIf,
    KwElse,
    KwReturn,
    KwInt,
    KwNone,

    Plus,
    Minus,
    Star,
    Slash,
    Bang,
    Lt,
    LtEq,
    Gt,
    GtEq,
    EqEq,
    NotEq,
    Assign,
    PlusAssign,
    MinusAssign,
    StarAssign,
    SlashAssign,

    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Comma,
    Semicolon,

    Eof,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Ident(name) => write!(f, "'{name}'"),
            TokenKind::Int(v) => write!(f, "'{v}'"),
            TokenKind::Str(s) => write!(f, "\"{s}\""),
            TokenKind::KwFun => write!(f, "'fun'"),
            TokenKind::KwDecl => write!(f, "'decl'"),
            TokenKind::KwFor => write!(f, "'for'"),
            TokenKind::KwWhile => write!(f, "'while'"),
            TokenKind::KwIf => write!(f, "'if'"),
            TokenKind::KwElse => write!(f, "'else'"),
            TokenKind::KwReturn => write!(f, "'return'"),
            TokenKind::KwInt => write!(f, "'int'"),
            TokenKind::KwNone => write!(f, "'none'"),
            TokenKind::Plus => write!(f, "'+'"),
            TokenKind::Minus => write!(f, "'-'"),
            TokenKind::Star => write!(f, "'*'"),
            TokenKind::Slash => write!(f, "'/'"),
            TokenKind::Bang => write!(f, "'!'"),
            TokenKind::Lt => write!(f, "'<'"),
            TokenKind::LtEq => write!(f, "'<='"),
            TokenKind::Gt => write!(f, "'>'"),
            TokenKind::GtEq => write!(f, "'>='"),
            TokenKind::EqEq => write!(f, "'=='"),
            TokenKind::NotEq => write!(f, "'!='"),
            TokenKind::Assign => write!(f, "'='"),
            TokenKind::PlusAssign => write!(f, "'+='"),
            TokenKind::MinusAssign => write!(f, "'-='"),
            TokenKind::StarAssign => write!(f, "'*='"),
            TokenKind::SlashAssign => write!(f, "'/='"),
            TokenKind::LParen => write!(f, "'('"),
            TokenKind::RParen => write!(f, "')'"),
            TokenKind::LBrace => write!(f, "'{{'"),
            TokenKind::RBrace => write!(f, "'}}'"),
            TokenKind::LBracket => write!(f, "'['"),
            TokenKind::RBracket => write!(f, "']'"),
            TokenKind::Comma => write!(f, "','"),
            TokenKind::Semicolon => write!(f, "';'"),
            TokenKind::Eof => write!(f, "end of input"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LexError {
    #[error("{pos}: unexpected character '{ch}'")]
    UnexpectedChar { ch: char, pos: Pos },
    #[error("{pos}: unterminated string literal")]
    UnterminatedString { pos: Pos },
    #[error("{pos}: unterminated block comment")]
    UnterminatedComment { pos: Pos },
    #[error("{pos}: integer literal out of range: {text}")]
    IntOutOfRange { text: String, pos: Pos },
}

struct Lexer {
    chars: Vec<char>,
    idx: usize,
    line: u32,
    column: u32,
}

impl Lexer {
    fn new(src: &str) -> Self {
        Self {
            chars: src.chars().collect(),
            idx: 0,
            line: 1,
            column: 1,
        }
    }

    fn pos(&self) -> Pos {
        Pos {
            line: self.line,
            column: self.column,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.idx).copied()
    }

    fn peek2(&self) -> Option<char> {
        self.chars.get(self.idx + 1).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.idx += 1;
        if ch == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(ch)
    }

    fn eat(&mut self, ch: char) -> bool {
        if self.peek() == Some(ch) {
            self.bump();
            true
        } else {
            false
        }
    }

    /// Consume whitespace, `//` line comments and non-nesting `/* */` block
    /// comments. Comment contents never emit tokens.
    fn skip_trivia(&mut self) -> Result<(), LexError> {
        loop {
            match self.peek() {
                Some(c) if c.is_whitespace() => {
                    self.bump();
                }
                Some('/') if self.peek2() == Some('/') => {
                    while let Some(c) = self.bump() {
                        if c == '\n' {
                            break;
                        }
                    }
                }
                Some('/') if self.peek2() == Some('*') => {
                    let start = self.pos();
                    self.bump();
                    self.bump();
                    loop {
                        match self.bump() {
                            Some('*') if self.peek() == Some('/') => {
                                self.bump();
                                break;
                            }
                            Some(_) => {}
                            None => return Err(LexError::UnterminatedComment { pos: start }),
                        }
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn read_string(&mut self, start: Pos) -> Result<TokenKind, LexError> {
        let mut content = String::new();
        loop {
            match self.bump() {
                Some('"') => return Ok(TokenKind::Str(content)),
                Some(c) => content.push(c),
                None => return Err(LexError::UnterminatedString { pos: start }),
            }
        }
    }

    fn read_number(&mut self, first: char, start: Pos) -> Result<TokenKind, LexError> {
        let mut text = String::from(first);
        while let Some(c) = self.peek() {
            if !c.is_ascii_digit() {
                break;
            }
            text.push(c);
            self.bump();
        }
        let value: i64 = text.parse().map_err(|_| LexError::IntOutOfRange {
            text: text.clone(),
            pos: start,
        })?;
        Ok(TokenKind::Int(value))
    }

    fn read_ident(&mut self, first: char) -> TokenKind {
        let mut ident = String::from(first);
        while let Some(c) = self.peek() {
            if !is_ident_continue(c) {
                break;
            }
            ident.push(c);
            self.bump();
        }
        match ident.as_str() {
            "fun" => TokenKind::KwFun,
            "decl" => TokenKind::KwDecl,
            "for" => TokenKind::KwFor,
            "while" => TokenKind::KwWhile,
            "if" => TokenKind::KwIf,
            "else" => TokenKind::KwElse,
            "return" => TokenKind::KwReturn,
            "int" => TokenKind::KwInt,
            "none" => TokenKind::KwNone,
            _ => TokenKind::Ident(ident),
        }
    }
}

/// Lex the whole source eagerly. The result always ends with one `Eof` token.
pub fn lex(src: &str) -> Result<Vec<Token>, LexError> {
    let mut lx = Lexer::new(src);
    let mut tokens = Vec::new();

    loop {
        lx.skip_trivia()?;
        let pos = lx.pos();
        let Some(ch) = lx.bump() else {
            tokens.push(Token {
                kind: TokenKind::Eof,
                pos,
            });
            return Ok(tokens);
        };
        let kind = match ch {
            '+' => {
                if lx.eat('=') {
                    TokenKind::PlusAssign
                } else {
                    TokenKind::Plus
                }
            }
            '-' => {
                if lx.eat('=') {
                    TokenKind::MinusAssign
                } else {
                    TokenKind::Minus
                }
            }
            '*' => {
                if lx.eat('=') {
                    TokenKind::StarAssign
                } else {
                    TokenKind::Star
                }
            }
            '/' => {
                // comments were consumed by skip_trivia
                if lx.eat('=') {
                    TokenKind::SlashAssign
                } else {
                    TokenKind::Slash
                }
            }
            '<' => {
                if lx.eat('=') {
                    TokenKind::LtEq
                } else {
                    TokenKind::Lt
                }
            }
            '>' => {
                if lx.eat('=') {
                    TokenKind::GtEq
                } else {
                    TokenKind::Gt
                }
            }
            '=' => {
                if lx.eat('=') {
                    TokenKind::EqEq
                } else {
                    TokenKind::Assign
                }
            }
            '!' => {
                if lx.eat('=') {
                    TokenKind::NotEq
                } else {
                    TokenKind::Bang
                }
            }
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '{' => TokenKind::LBrace,
            '}' => TokenKind::RBrace,
            '[' => TokenKind::LBracket,
            ']' => TokenKind::RBracket,
            ',' => TokenKind::Comma,
            ';' => TokenKind::Semicolon,
            '"' => lx.read_string(pos)?,
            c if c.is_ascii_digit() => lx.read_number(c, pos)?,
            c if is_ident_start(c) => lx.read_ident(c),
            c => return Err(LexError::UnexpectedChar { ch: c, pos }),
        };
        tokens.push(Token { kind, pos });
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        lex(src).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn read_tokens() {
        let expected = vec![
            TokenKind::Assign,
            TokenKind::Plus,
            TokenKind::LParen,
            TokenKind::RParen,
            TokenKind::LBrace,
            TokenKind::RBrace,
            TokenKind::Comma,
            TokenKind::Semicolon,
            TokenKind::Eof,
        ];
        assert_eq!(kinds("=+(){},;"), expected);
    }

    #[test]
    fn declarations_with_comments() {
        let src = r#"
            decl a = 42;
            /* this is a comment */
            decl b; /* this is another comment */
            // this is another way of commenting
            b = 99;
        "#;
        let expected = vec![
            TokenKind::KwDecl,
            TokenKind::Ident("a".into()),
            TokenKind::Assign,
            TokenKind::Int(42),
            TokenKind::Semicolon,
            TokenKind::KwDecl,
            TokenKind::Ident("b".into()),
            TokenKind::Semicolon,
            TokenKind::Ident("b".into()),
            TokenKind::Assign,
            TokenKind::Int(99),
            TokenKind::Semicolon,
            TokenKind::Eof,
        ];
        assert_eq!(kinds(src), expected);
    }

    #[test]
    fn compound_and_comparison_operators() {
        let expected = vec![
            TokenKind::PlusAssign,
            TokenKind::MinusAssign,
            TokenKind::StarAssign,
            TokenKind::SlashAssign,
            TokenKind::LtEq,
            TokenKind::GtEq,
            TokenKind::EqEq,
            TokenKind::NotEq,
            TokenKind::Lt,
            TokenKind::Gt,
            TokenKind::Bang,
            TokenKind::Eof,
        ];
        assert_eq!(kinds("+= -= *= /= <= >= == != < > !"), expected);
    }

    #[test]
    fn string_content_is_verbatim() {
        let toks = lex(r#"print("values: {bar}; sum: ");"#).unwrap();
        assert_eq!(toks[0].kind, TokenKind::Ident("print".into()));
        assert_eq!(toks[2].kind, TokenKind::Str("values: {bar}; sum: ".into()));
    }

    #[test]
    fn token_positions() {
        let toks = lex("decl a = 1;\na = 2;").unwrap();
        assert_eq!(toks[0].pos, Pos { line: 1, column: 1 });
        assert_eq!(toks[1].pos, Pos { line: 1, column: 6 });
        assert_eq!(toks[5].pos, Pos { line: 2, column: 1 });
    }

    #[test]
    fn unterminated_string() {
        let err = lex("decl s = \"oops").unwrap_err();
        assert_eq!(
            err,
            LexError::UnterminatedString {
                pos: Pos {
                    line: 1,
                    column: 10
                }
            }
        );
    }

    #[test]
    fn unterminated_block_comment() {
        let err = lex("decl a = 1; /* no end").unwrap_err();
        assert!(matches!(err, LexError::UnterminatedComment { .. }));
    }

    #[test]
    fn unexpected_character() {
        let err = lex("decl a = 1 ~ 2;").unwrap_err();
        assert_eq!(
            err,
            LexError::UnexpectedChar {
                ch: '~',
                pos: Pos {
                    line: 1,
                    column: 12
                }
            }
        );
    }

    #[test]
    fn integer_out_of_range() {
        let err = lex("decl a = 99999999999999999999;").unwrap_err();
        assert!(matches!(err, LexError::IntOutOfRange { .. }));
    }
}

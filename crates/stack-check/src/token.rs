use serde::{Deserialize, Serialize};
use stack_val::StackStr;
use std::fmt;
use strum_macros;

/// Source location of a token or an operation.
///
/// `line` is 1-based, `at` is the 0-based column, `pos` the byte offset.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default, Hash, Serialize, Deserialize)]
pub struct Pos {
    pub line: usize,
    pub at: usize,
    pub pos: usize,
    pub len: usize,
}

impl Pos {
    pub fn new(line: usize, at: usize, pos: usize, len: usize) -> Self {
        Self { line, at, pos, len }
    }

    /// Smallest location covering both `self` and `other`.
    pub fn to(self, other: Pos) -> Pos {
        let end = (other.pos + other.len).max(self.pos + self.len);
        Pos {
            line: self.line,
            at: self.at,
            pos: self.pos,
            len: end.saturating_sub(self.pos),
        }
    }

    pub fn column(&self) -> usize {
        self.at + 1
    }
}

impl fmt::Display for Pos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column())
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, strum_macros::Display)]
#[strum(serialize_all = "snake_case")]
pub enum TokenKind {
    // Literals
    Int,
    Float,
    Str,
    Bytes,
    Ident,
    True,
    False,

    // Operators
    LSquare,  // [
    RSquare,  // ]
    LBrace,   // {
    RBrace,   // }
    Comma,    // ,
    Colon,    // :
    Asn,      // =
    Range,    // ..
    LArrow,   // <-
    Newline,  // \n or ;

    EOF,
}

#[derive(Debug, PartialEq, Clone)]
pub struct Token {
    pub kind: TokenKind,
    pub pos: Pos,
    pub text: StackStr,
}

impl Token {
    pub fn new(kind: TokenKind, pos: Pos, text: StackStr) -> Self {
        Token { kind, pos, text }
    }

    pub fn eof(pos: Pos) -> Self {
        Token::new(TokenKind::EOF, pos, "".into())
    }

    pub fn is(&self, kind: TokenKind) -> bool {
        self.kind == kind
    }

    /// Identifier with the given spelling.
    pub fn is_word(&self, word: &str) -> bool {
        self.kind == TokenKind::Ident && self.text == word
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            TokenKind::Newline => write!(f, "<nl>"),
            TokenKind::EOF => write!(f, "<eof>"),
            TokenKind::Str => write!(f, "<str:{}>", self.text),
            TokenKind::Ident => write!(f, "<ident:{}>", self.text),
            _ => write!(f, "<{}:{}>", self.kind, self.text),
        }
    }
}

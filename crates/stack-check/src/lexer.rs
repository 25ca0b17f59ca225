use crate::error::{pos_to_span, ParseError};
use crate::token::Pos;
use crate::token::{Token, TokenKind};
use std::iter::Peekable;
use std::str::Chars;

pub struct Lexer<'a> {
    chars: Peekable<Chars<'a>>,
    line: usize,
    pos: usize,
    at: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(code: &'a str) -> Self {
        Lexer {
            chars: code.chars().peekable(),
            line: 1,
            at: 0,
            pos: 0,
        }
    }

    /// Numbers locations as if `code` began on `line` at byte `pos` of a
    /// larger buffer.
    pub fn starting_at(mut self, line: usize, pos: usize) -> Self {
        self.line = line;
        self.pos = pos;
        self
    }

    pub fn pos(&mut self, len: usize) -> Pos {
        let p = Pos {
            line: self.line,
            at: self.at,
            pos: self.pos,
            len,
        };
        self.pos += len;
        self.at += len;
        p
    }

    /// Location of the next character without consuming anything.
    fn here(&self, len: usize) -> Pos {
        Pos {
            line: self.line,
            at: self.at,
            pos: self.pos,
            len,
        }
    }

    pub fn single(&mut self, kind: TokenKind, c: char) -> Token {
        let tok = Token::new(kind, self.pos(c.len_utf8()), c.to_string().into());
        self.chars.next();
        tok
    }

    pub fn peek(&mut self, c: char) -> bool {
        matches!(self.chars.peek(), Some(&nc) if nc == c)
    }

    fn peek_second(&self) -> Option<char> {
        let mut more = self.chars.clone();
        more.next();
        more.next()
    }

    fn skip_comment(&mut self) {
        while let Some(&c) = self.chars.peek() {
            if c == '\n' {
                break;
            }
            self.chars.next();
            self.pos += c.len_utf8();
            self.at += 1;
        }
    }

    fn newline(&mut self) -> Token {
        let tok = Token::new(TokenKind::Newline, self.pos(1), "\n".into());
        self.chars.next();
        self.line += 1;
        self.at = 0;
        tok
    }
}

// Lexer methods for various token types
impl<'a> Lexer<'a> {
    pub fn number(&mut self) -> Result<Token, ParseError> {
        let mut text = String::new();
        let mut len = 0;
        if self.peek('-') {
            text.push('-');
            self.chars.next();
            len += 1;
        }
        if self.peek('0') && self.peek_second() == Some('x') {
            self.chars.next();
            self.chars.next();
            len += 2;
            return self.hex_bytes(len);
        }
        let mut has_dot = false;
        while let Some(&c) = self.chars.peek() {
            if c.is_ascii_digit() {
                text.push(c);
            } else if c == '_' {
                // digit separator, dropped from the text
            } else if c == '.' && !has_dot && matches!(self.peek_second(), Some(n) if n.is_ascii_digit()) {
                has_dot = true;
                text.push(c);
            } else {
                break;
            }
            self.chars.next();
            len += 1;
        }
        let pos = self.pos(len);
        if text == "-" {
            return Err(ParseError::UnexpectedChar {
                ch: '-',
                span: pos_to_span(pos),
            });
        }
        let kind = if has_dot { TokenKind::Float } else { TokenKind::Int };
        Ok(Token::new(kind, pos, text.into()))
    }

    fn hex_bytes(&mut self, mut len: usize) -> Result<Token, ParseError> {
        let mut text = String::new();
        while let Some(&c) = self.chars.peek() {
            if !c.is_ascii_hexdigit() {
                break;
            }
            text.push(c);
            self.chars.next();
            len += 1;
        }
        let pos = self.pos(len);
        if text.len() % 2 != 0 {
            return Err(ParseError::InvalidLiteral {
                message: "byte literals need an even number of hex digits".to_string(),
                span: pos_to_span(pos),
            });
        }
        Ok(Token::new(TokenKind::Bytes, pos, text.into()))
    }

    pub fn str(&mut self) -> Result<Token, ParseError> {
        let start = self.here(1);
        self.chars.next(); // skip opening quote
        let mut text = String::new();
        let mut len = 1;
        loop {
            match self.chars.next() {
                None | Some('\n') => {
                    return Err(ParseError::UnterminatedString {
                        span: pos_to_span(start),
                    });
                }
                Some('"') => {
                    len += 1;
                    break;
                }
                Some('\\') => {
                    len += 1;
                    let esc = self.chars.next();
                    len += esc.map(char::len_utf8).unwrap_or(0);
                    match esc {
                        Some('n') => text.push('\n'),
                        Some('t') => text.push('\t'),
                        Some('r') => text.push('\r'),
                        Some('0') => text.push('\0'),
                        Some('\\') => text.push('\\'),
                        Some('"') => text.push('"'),
                        other => {
                            let sequence = match other {
                                Some(c) => format!("\\{}", c),
                                None => "\\".to_string(),
                            };
                            let span = pos_to_span(Pos {
                                line: self.line,
                                at: self.at + len - 2,
                                pos: self.pos + len - 2,
                                len: 2,
                            });
                            return Err(ParseError::InvalidEscapeSequence { sequence, span });
                        }
                    }
                }
                Some(c) => {
                    text.push(c);
                    len += c.len_utf8();
                }
            }
        }
        Ok(Token::new(TokenKind::Str, self.pos(len), text.into()))
    }

    pub fn identifier(&mut self) -> Token {
        let mut text = String::new();
        while let Some(&c) = self.chars.peek() {
            if c.is_alphanumeric() || c == '_' {
                text.push(c);
                self.chars.next();
            } else {
                break;
            }
        }
        let kind = match text.as_str() {
            "true" => TokenKind::True,
            "false" => TokenKind::False,
            _ => TokenKind::Ident,
        };
        Token::new(kind, self.pos(text.len()), text.into())
    }

    pub fn next(&mut self) -> Result<Token, ParseError> {
        while let Some(&c) = self.chars.peek() {
            match c {
                '\n' => return Ok(self.newline()),
                ';' => return Ok(self.single(TokenKind::Newline, c)),
                '#' => self.skip_comment(),
                c if c.is_whitespace() => {
                    self.chars.next();
                    self.pos += c.len_utf8();
                    self.at += 1;
                }
                '[' => return Ok(self.single(TokenKind::LSquare, c)),
                ']' => return Ok(self.single(TokenKind::RSquare, c)),
                '{' => return Ok(self.single(TokenKind::LBrace, c)),
                '}' => return Ok(self.single(TokenKind::RBrace, c)),
                ',' => return Ok(self.single(TokenKind::Comma, c)),
                ':' => return Ok(self.single(TokenKind::Colon, c)),
                '=' => return Ok(self.single(TokenKind::Asn, c)),
                '"' => return self.str(),
                '.' => {
                    if self.peek_second() == Some('.') {
                        self.chars.next();
                        self.chars.next();
                        return Ok(Token::new(TokenKind::Range, self.pos(2), "..".into()));
                    }
                    let pos = self.here(1);
                    self.chars.next();
                    self.pos += 1;
                    self.at += 1;
                    return Err(ParseError::UnexpectedChar {
                        ch: c,
                        span: pos_to_span(pos),
                    });
                }
                '<' if self.peek_second() == Some('-') => {
                    self.chars.next();
                    self.chars.next();
                    return Ok(Token::new(TokenKind::LArrow, self.pos(2), "<-".into()));
                }
                '-' => return self.number(),
                c if c.is_ascii_digit() => return self.number(),
                c if c.is_alphabetic() || c == '_' => return Ok(self.identifier()),
                _ => {
                    let pos = self.here(c.len_utf8());
                    self.chars.next();
                    self.pos += c.len_utf8();
                    self.at += 1;
                    return Err(ParseError::UnexpectedChar {
                        ch: c,
                        span: pos_to_span(pos),
                    });
                }
            }
        }
        Ok(Token::eof(self.here(0)))
    }
}

/// Tokenizes the whole input, stopping at the first error.
pub fn tokenize(code: &str) -> Result<Vec<Token>, ParseError> {
    let mut lexer = Lexer::new(code);
    let mut tokens = Vec::new();
    loop {
        let tok = lexer.next()?;
        let done = tok.is(TokenKind::EOF);
        tokens.push(tok);
        if done {
            return Ok(tokens);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token_string(code: &str) -> String {
        tokenize(code)
            .unwrap()
            .iter()
            .map(|t| t.to_string())
            .collect::<Vec<_>>()
            .join("")
    }

    #[test]
    fn test_statement() {
        assert_eq!(
            token_string("push x 1"),
            "<ident:push><ident:x><int:1><eof>"
        );
    }

    #[test]
    fn test_extent_and_arrow() {
        assert_eq!(
            token_string("borrow v = x [0..-1] read # trailing"),
            "<ident:borrow><ident:v><asn:=><ident:x><l_square:[><int:0><range:..><int:-1><r_square:]><ident:read><eof>"
        );
        assert_eq!(
            token_string("push t <- take s"),
            "<ident:push><ident:t><l_arrow:<-><ident:take><ident:s><eof>"
        );
    }

    #[test]
    fn test_literals() {
        assert_eq!(
            token_string("1.5 \"a\\\"b\" 0xdead true"),
            "<float:1.5><str:a\"b><bytes:dead><true:true><eof>"
        );
    }

    #[test]
    fn test_newlines_and_positions() {
        let tokens = tokenize("a\n  b;c").unwrap();
        assert_eq!(tokens[1].kind, TokenKind::Newline);
        assert_eq!(tokens[2].pos, Pos::new(2, 2, 4, 1));
        assert_eq!(tokens[3].kind, TokenKind::Newline);
        assert_eq!(tokens[4].pos.pos, 6);
    }

    #[test]
    fn test_errors() {
        assert!(matches!(
            tokenize("push x \"abc"),
            Err(ParseError::UnterminatedString { .. })
        ));
        assert!(matches!(
            tokenize("push x \"a\\q\""),
            Err(ParseError::InvalidEscapeSequence { .. })
        ));
        assert!(matches!(tokenize("push x @"), Err(ParseError::UnexpectedChar { ch: '@', .. })));
        assert!(matches!(tokenize("0xabc"), Err(ParseError::InvalidLiteral { .. })));
    }
}

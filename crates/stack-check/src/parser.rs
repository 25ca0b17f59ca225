//! Parser for the line-oriented text form of the operation stream.
//!
//! One statement per line (or per `;`). A statement that fails to parse is
//! recorded and the parser resumes at the next line, so one run reports every
//! syntax error up to the configured limit.

use crate::error::{pos_to_span, ParseError};
use crate::lexer::Lexer;
use crate::op::{Capture, Effect, Op, OpNode, Operand, ScopeKind};
use crate::token::{Pos, Token, TokenKind};
use stack_val::{
    BorrowMode, ConversionKind, ElementType, Extent, OwnershipMode, Perspective, StackStr, Value,
};
use std::str::FromStr;

const STATEMENTS: &str =
    "declare, bind, push, pop, peek, borrow, perspective, flip, capture, spawn, release, match, {, }";

pub struct Parser<'a> {
    lexer: Lexer<'a>,
    cur: Token,
    last: Pos,
    /// Stop after this many errors; zero means no limit.
    limit: usize,
}

impl<'a> Parser<'a> {
    pub fn new(code: &'a str) -> Self {
        Parser {
            lexer: Lexer::new(code),
            cur: Token::new(TokenKind::Newline, Pos::default(), "".into()),
            last: Pos::default(),
            limit: 0,
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn starting_at(mut self, line: usize, pos: usize) -> Self {
        self.lexer = self.lexer.starting_at(line, pos);
        self
    }

    /// Parses every statement. Returns all collected errors if any statement
    /// failed.
    pub fn parse(mut self) -> Result<Vec<OpNode>, Vec<ParseError>> {
        let mut ops = Vec::new();
        let mut errors = Vec::new();
        loop {
            let step = self.skip_blank().and_then(|_| {
                if self.cur.is(TokenKind::EOF) {
                    Ok(None)
                } else {
                    self.statement().map(Some)
                }
            });
            match step {
                Ok(None) => break,
                Ok(Some(node)) => ops.push(node),
                Err(e) => {
                    errors.push(e);
                    if self.limit > 0 && errors.len() >= self.limit {
                        break;
                    }
                    self.recover();
                }
            }
        }
        if errors.is_empty() {
            Ok(ops)
        } else {
            Err(errors)
        }
    }

    fn advance(&mut self) -> Result<(), ParseError> {
        self.last = self.cur.pos;
        self.cur = self.lexer.next()?;
        Ok(())
    }

    fn skip_blank(&mut self) -> Result<(), ParseError> {
        while self.cur.is(TokenKind::Newline) {
            self.advance()?;
        }
        Ok(())
    }

    /// Skips the rest of a failed line.
    fn recover(&mut self) {
        if self.cur.is(TokenKind::Newline) || self.cur.is(TokenKind::EOF) {
            return;
        }
        loop {
            match self.lexer.next() {
                Ok(tok) if tok.is(TokenKind::Newline) || tok.is(TokenKind::EOF) => {
                    self.cur = tok;
                    return;
                }
                _ => {}
            }
        }
    }

    fn unexpected(&self, expected: &str) -> ParseError {
        ParseError::UnexpectedToken {
            expected: expected.to_string(),
            found: match self.cur.kind {
                TokenKind::Newline => "end of line".to_string(),
                TokenKind::EOF => "end of input".to_string(),
                _ => format!("'{}'", self.cur.text),
            },
            span: pos_to_span(self.cur.pos),
        }
    }

    fn expect(&mut self, kind: TokenKind, expected: &str) -> Result<Token, ParseError> {
        if !self.cur.is(kind) {
            return Err(self.unexpected(expected));
        }
        let tok = self.cur.clone();
        self.advance()?;
        Ok(tok)
    }

    fn ident(&mut self, expected: &str) -> Result<StackStr, ParseError> {
        Ok(self.expect(TokenKind::Ident, expected)?.text)
    }

    /// An identifier naming one variant of `T`.
    fn word<T: FromStr>(&mut self, context: &str, choices: &str) -> Result<T, ParseError> {
        if !self.cur.is(TokenKind::Ident) {
            return Err(self.unexpected(context));
        }
        match T::from_str(self.cur.text.as_str()) {
            Ok(value) => {
                self.advance()?;
                Ok(value)
            }
            Err(_) => Err(ParseError::UnknownKeyword {
                word: self.cur.text.to_string(),
                expected: choices.to_string(),
                span: pos_to_span(self.cur.pos),
                context: context.to_string(),
            }),
        }
    }

    fn at_end(&self) -> bool {
        self.cur.is(TokenKind::Newline) || self.cur.is(TokenKind::EOF)
    }

    fn end(&mut self) -> Result<(), ParseError> {
        if self.at_end() {
            Ok(())
        } else {
            Err(self.unexpected("end of statement"))
        }
    }

    fn statement(&mut self) -> Result<OpNode, ParseError> {
        let start = self.cur.pos;
        let op = match self.cur.kind {
            TokenKind::LBrace => {
                self.advance()?;
                Op::ScopeEnter {
                    kind: ScopeKind::Block,
                }
            }
            TokenKind::RBrace => {
                self.advance()?;
                Op::ScopeExit
            }
            TokenKind::Ident => {
                let word = self.cur.text.clone();
                self.advance()?;
                match word.as_str() {
                    "declare" => self.declare()?,
                    "bind" => self.bind()?,
                    "push" => self.push()?,
                    "pop" => {
                        let binding = self.ident("binding name")?;
                        Op::Pop {
                            binding,
                            extent: self.opt_extent()?,
                        }
                    }
                    "peek" => {
                        let binding = self.ident("binding name")?;
                        Op::Peek {
                            binding,
                            extent: self.opt_extent()?,
                        }
                    }
                    "borrow" => self.borrow()?,
                    "perspective" => {
                        let binding = self.ident("binding name")?;
                        Op::SetPerspective {
                            binding,
                            perspective: self.word("perspective", "lifo, fifo, hashed")?,
                        }
                    }
                    "flip" => Op::Flip {
                        binding: self.ident("binding name")?,
                    },
                    "capture" => {
                        let target = self.ident("target binding")?;
                        self.expect(TokenKind::Asn, "'='")?;
                        Op::Capture {
                            target,
                            source: self.ident("source binding")?,
                        }
                    }
                    "spawn" => self.spawn()?,
                    "release" => Op::Release {
                        binding: self.ident("binding name")?,
                    },
                    "match" => self.match_arms()?,
                    "fn" | "task" | "block" | "global" => {
                        self.expect(TokenKind::LBrace, "'{'")?;
                        Op::ScopeEnter {
                            kind: match word.as_str() {
                                "fn" => ScopeKind::Function,
                                "task" => ScopeKind::Task,
                                "global" => ScopeKind::Global,
                                _ => ScopeKind::Block,
                            },
                        }
                    }
                    _ => {
                        return Err(ParseError::UnknownKeyword {
                            word: word.to_string(),
                            expected: STATEMENTS.to_string(),
                            span: pos_to_span(start),
                            context: "statement".to_string(),
                        })
                    }
                }
            }
            _ => return Err(self.unexpected("a statement")),
        };
        self.end()?;
        Ok(OpNode::new(op, start.to(self.last)))
    }

    /// `declare NAME: TYPE[KEY]? MODE`
    fn declare(&mut self) -> Result<Op, ParseError> {
        let container = self.ident("container name")?;
        self.expect(TokenKind::Colon, "':'")?;
        let element = self.element_type()?;
        let key = if self.cur.is(TokenKind::LSquare) {
            self.advance()?;
            let key = self.element_type()?;
            self.expect(TokenKind::RSquare, "']'")?;
            Some(key)
        } else {
            None
        };
        let mode = self.word::<OwnershipMode>("ownership mode", "owned, borrowed, mutable, shared")?;
        Ok(Op::Declare {
            container,
            element,
            key,
            mode,
        })
    }

    fn element_type(&mut self) -> Result<ElementType, ParseError> {
        self.word("element type", "integer, float, string, bool, bytes")
    }

    /// `bind B = C PERSPECTIVE?`
    fn bind(&mut self) -> Result<Op, ParseError> {
        let binding = self.ident("binding name")?;
        self.expect(TokenKind::Asn, "'='")?;
        let container = self.ident("container name")?;
        let perspective = if self.at_end() {
            None
        } else {
            Some(self.word::<Perspective>("perspective", "lifo, fifo, hashed")?)
        };
        Ok(Op::Bind {
            binding,
            container,
            perspective,
        })
    }

    /// `push B VALUE` or `push B <- EFFECT? SOURCE`, then `key VALUE` and
    /// `as KIND` in any order.
    fn push(&mut self) -> Result<Op, ParseError> {
        let binding = self.ident("binding name")?;
        let operand = if self.cur.is(TokenKind::LArrow) {
            self.advance()?;
            let first = self.ident("source binding or effect")?;
            match Effect::from_str(first.as_str()) {
                Ok(effect) if self.cur.is(TokenKind::Ident) && !self.cur.is_word("key") && !self.cur.is_word("as") => {
                    Operand::Binding {
                        name: self.ident("source binding")?,
                        effect,
                    }
                }
                _ => Operand::Binding {
                    name: first,
                    effect: Effect::Move,
                },
            }
        } else {
            Operand::Value(self.value()?)
        };

        let mut key = None;
        let mut conversion = None;
        while !self.at_end() {
            if self.cur.is_word("key") && key.is_none() {
                self.advance()?;
                key = Some(self.value()?);
            } else if self.cur.is_word("as") && conversion.is_none() {
                self.advance()?;
                conversion = Some(self.word::<ConversionKind>(
                    "conversion kind",
                    "widen, truncate, format, parse, truthy, encode, decode, auto",
                )?);
            } else {
                return Err(self.unexpected("'key', 'as' or end of statement"));
            }
        }
        Ok(Op::Push {
            binding,
            operand,
            key,
            conversion,
        })
    }

    /// `borrow B = SOURCE EXTENT read|mut`
    fn borrow(&mut self) -> Result<Op, ParseError> {
        let binding = self.ident("binding name")?;
        self.expect(TokenKind::Asn, "'='")?;
        let source = self.ident("source binding")?;
        let extent = self.extent()?;
        let mode = self.word::<BorrowMode>("borrow mode", "read, mut")?;
        Ok(Op::Borrow {
            binding,
            source,
            extent,
            mode,
        })
    }

    /// `spawn B, take B, ...`
    fn spawn(&mut self) -> Result<Op, ParseError> {
        let mut captures = Vec::new();
        while !self.at_end() {
            let first = self.ident("captured binding")?;
            let capture = if first == "take" && self.cur.is(TokenKind::Ident) {
                Capture {
                    binding: self.ident("captured binding")?,
                    take: true,
                }
            } else {
                Capture {
                    binding: first,
                    take: false,
                }
            };
            captures.push(capture);
            if self.cur.is(TokenKind::Comma) {
                self.advance()?;
            } else if !self.at_end() {
                return Err(self.unexpected("',' or end of statement"));
            }
        }
        Ok(Op::Spawn { captures })
    }

    /// `match B ARM+ _?`
    fn match_arms(&mut self) -> Result<Op, ParseError> {
        let binding = self.ident("binding name")?;
        let mut arms = Vec::new();
        let mut default = false;
        while !self.at_end() {
            if self.cur.is_word("_") {
                self.advance()?;
                default = true;
                continue;
            }
            arms.push(self.word::<Perspective>("perspective", "lifo, fifo, hashed, _")?);
            if self.cur.is(TokenKind::Comma) {
                self.advance()?;
            }
        }
        if arms.is_empty() && !default {
            return Err(self.unexpected("at least one match arm"));
        }
        Ok(Op::Match {
            binding,
            arms,
            default,
        })
    }

    fn opt_extent(&mut self) -> Result<Option<Extent>, ParseError> {
        if self.at_end() {
            Ok(None)
        } else {
            self.extent().map(Some)
        }
    }

    /// `[lo..hi]` or `{k1, k2}`
    fn extent(&mut self) -> Result<Extent, ParseError> {
        match self.cur.kind {
            TokenKind::LSquare => {
                self.advance()?;
                let lo = self.int()?;
                self.expect(TokenKind::Range, "'..'")?;
                let hi = self.int()?;
                self.expect(TokenKind::RSquare, "']'")?;
                Ok(Extent::Range { lo, hi })
            }
            TokenKind::LBrace => {
                self.advance()?;
                let mut keys = Vec::new();
                while !self.cur.is(TokenKind::RBrace) {
                    keys.push(self.value()?);
                    if self.cur.is(TokenKind::Comma) {
                        self.advance()?;
                    } else if !self.cur.is(TokenKind::RBrace) {
                        return Err(self.unexpected("',' or '}'"));
                    }
                }
                self.advance()?;
                Ok(Extent::Keys(keys))
            }
            _ => Err(self.unexpected("an extent '[lo..hi]' or '{keys}'")),
        }
    }

    fn int(&mut self) -> Result<i64, ParseError> {
        let tok = self.expect(TokenKind::Int, "an integer")?;
        tok.text.parse::<i64>().map_err(|e| ParseError::InvalidLiteral {
            message: format!("integer {}: {}", tok.text, e),
            span: pos_to_span(tok.pos),
        })
    }

    fn value(&mut self) -> Result<Value, ParseError> {
        let tok = self.cur.clone();
        let invalid = |message: String| ParseError::InvalidLiteral {
            message,
            span: pos_to_span(tok.pos),
        };
        let value = match tok.kind {
            TokenKind::Int => Value::Int(
                tok.text
                    .parse::<i64>()
                    .map_err(|e| invalid(format!("integer {}: {}", tok.text, e)))?,
            ),
            TokenKind::Float => Value::Float(
                tok.text
                    .parse::<f64>()
                    .map_err(|e| invalid(format!("float {}: {}", tok.text, e)))?,
            ),
            TokenKind::Str => Value::Str(tok.text.clone()),
            TokenKind::True => Value::Bool(true),
            TokenKind::False => Value::Bool(false),
            TokenKind::Bytes => Value::Bytes(decode_hex(&tok.text).ok_or_else(|| invalid(format!("bytes 0x{}", tok.text)))?),
            _ => return Err(self.unexpected("a literal value")),
        };
        self.advance()?;
        Ok(value)
    }
}

fn decode_hex(text: &str) -> Option<Vec<u8>> {
    (0..text.len())
        .step_by(2)
        .map(|i| text.get(i..i + 2).and_then(|pair| u8::from_str_radix(pair, 16).ok()))
        .collect()
}

/// Parses a whole text stream.
pub fn parse(code: &str, limit: usize) -> Result<Vec<OpNode>, Vec<ParseError>> {
    Parser::new(code).with_limit(limit).parse()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn ops(code: &str) -> Vec<Op> {
        parse(code, 0).unwrap().into_iter().map(|n| n.op).collect()
    }

    #[test]
    fn test_declare_and_bind() {
        assert_eq!(
            ops("declare M: int[string] shared\nbind m = M hashed"),
            vec![
                Op::Declare {
                    container: "M".into(),
                    element: ElementType::Integer,
                    key: Some(ElementType::String),
                    mode: OwnershipMode::Shared,
                },
                Op::Bind {
                    binding: "m".into(),
                    container: "M".into(),
                    perspective: Some(Perspective::Hashed),
                },
            ]
        );
    }

    #[test]
    fn test_push_forms() {
        assert_eq!(
            ops("push m 3 key \"a\"; push f 1 as widen; push t <- take s; push t <- s as auto"),
            vec![
                Op::Push {
                    binding: "m".into(),
                    operand: Operand::Value(Value::Int(3)),
                    key: Some(Value::Str("a".into())),
                    conversion: None,
                },
                Op::Push {
                    binding: "f".into(),
                    operand: Operand::Value(Value::Int(1)),
                    key: None,
                    conversion: Some(ConversionKind::Widen),
                },
                Op::Push {
                    binding: "t".into(),
                    operand: Operand::Binding {
                        name: "s".into(),
                        effect: Effect::Take,
                    },
                    key: None,
                    conversion: None,
                },
                Op::Push {
                    binding: "t".into(),
                    operand: Operand::Binding {
                        name: "s".into(),
                        effect: Effect::Move,
                    },
                    key: None,
                    conversion: Some(ConversionKind::Auto),
                },
            ]
        );
    }

    #[test]
    fn test_borrow_and_extents() {
        assert_eq!(
            ops("borrow v = x [0..1] read\npop m {\"a\", \"b\"}\npeek x"),
            vec![
                Op::Borrow {
                    binding: "v".into(),
                    source: "x".into(),
                    extent: Extent::range(0, 1),
                    mode: BorrowMode::ReadOnly,
                },
                Op::Pop {
                    binding: "m".into(),
                    extent: Some(Extent::keys(["a", "b"])),
                },
                Op::Peek {
                    binding: "x".into(),
                    extent: None,
                },
            ]
        );
    }

    #[test]
    fn test_scopes_spawn_match() {
        assert_eq!(
            ops("fn {\n{\n}\n}\nspawn a, take b\nmatch x lifo fifo _"),
            vec![
                Op::ScopeEnter {
                    kind: ScopeKind::Function
                },
                Op::ScopeEnter {
                    kind: ScopeKind::Block
                },
                Op::ScopeExit,
                Op::ScopeExit,
                Op::Spawn {
                    captures: vec![
                        Capture {
                            binding: "a".into(),
                            take: false
                        },
                        Capture {
                            binding: "b".into(),
                            take: true
                        },
                    ]
                },
                Op::Match {
                    binding: "x".into(),
                    arms: vec![Perspective::Lifo, Perspective::Fifo],
                    default: true,
                },
            ]
        );
    }

    #[test]
    fn test_positions_cover_statement() {
        let nodes = parse("\n  pop x [0..2]\n", 0).unwrap();
        assert_eq!(nodes[0].pos.line, 2);
        assert_eq!(nodes[0].pos.at, 2);
        assert_eq!(nodes[0].pos.len, "pop x [0..2]".len());
    }

    #[test]
    fn test_recovers_per_line() {
        let errors = parse("declare X int owned\npush x @\nbogus\npop x", 0).unwrap_err();
        assert_eq!(errors.len(), 3);
        assert!(matches!(errors[0], ParseError::UnexpectedToken { .. }));
        assert!(matches!(errors[1], ParseError::UnexpectedChar { ch: '@', .. }));
        assert!(matches!(errors[2], ParseError::UnknownKeyword { .. }));
    }

    #[test]
    fn test_error_limit() {
        let errors = parse("bogus\nbogus\nbogus", 2).unwrap_err();
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn test_bytes_literal() {
        assert_eq!(
            ops("push b 0x00ff"),
            vec![Op::Push {
                binding: "b".into(),
                operand: Operand::Value(Value::Bytes(vec![0, 255])),
                key: None,
                conversion: None,
            }]
        );
    }
}

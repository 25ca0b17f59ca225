use crate::types::ElementType;
use ecow::EcoString;
use serde::{Deserialize, Serialize};
use std::fmt;

pub type StackStr = EcoString;

/// A literal known at verification time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum Value {
    #[serde(rename = "integer")]
    Int(i64),
    Float(f64),
    #[serde(rename = "string")]
    Str(StackStr),
    Bool(bool),
    Bytes(Vec<u8>),
}

impl Value {
    pub fn element_type(&self) -> ElementType {
        match self {
            Value::Int(_) => ElementType::Integer,
            Value::Float(_) => ElementType::Float,
            Value::Str(_) => ElementType::String,
            Value::Bool(_) => ElementType::Bool,
            Value::Bytes(_) => ElementType::Bytes,
        }
    }

    /// Keys compare by value, except floats which compare bitwise so that
    /// `NaN` keys are still addressable.
    pub fn same_key(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (a, b) => a == b,
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.into())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

/// Prints the literal in the syntax of the textual operation stream.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => {
                if x.is_finite() && x.fract() == 0.0 {
                    write!(f, "{:.1}", x)
                } else {
                    write!(f, "{}", x)
                }
            }
            Value::Str(s) => write!(f, "{:?}", s.as_str()),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Bytes(bytes) => {
                write!(f, "0x")?;
                for b in bytes {
                    write!(f, "{:02x}", b)?;
                }
                Ok(())
            }
        }
    }
}

/// Region of a container addressed by a borrow, a pop or a peek.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Extent {
    /// Inclusive positions counted from the tail.
    Range { lo: i64, hi: i64 },
    Keys(Vec<Value>),
}

impl Extent {
    pub fn range(lo: i64, hi: i64) -> Self {
        Extent::Range { lo, hi }
    }

    pub fn keys<I, V>(keys: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Extent::Keys(keys.into_iter().map(Into::into).collect())
    }

    pub fn is_keyed(&self) -> bool {
        matches!(self, Extent::Keys(_))
    }
}

impl fmt::Display for Extent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Extent::Range { lo, hi } => write!(f, "[{}..{}]", lo, hi),
            Extent::Keys(keys) => {
                write!(f, "{{")?;
                for (i, k) in keys.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", k)?;
                }
                write!(f, "}}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_element_type_of_literal() {
        assert_eq!(Value::from(3).element_type(), ElementType::Integer);
        assert_eq!(Value::from("x").element_type(), ElementType::String);
        assert_eq!(Value::from(vec![1u8]).element_type(), ElementType::Bytes);
    }

    #[test]
    fn test_display_matches_stream_syntax() {
        assert_eq!(Value::Float(1.0).to_string(), "1.0");
        assert_eq!(Value::Float(2.5).to_string(), "2.5");
        assert_eq!(Value::from("a\"b").to_string(), "\"a\\\"b\"");
        assert_eq!(Value::Bytes(vec![0xde, 0xad]).to_string(), "0xdead");
        assert_eq!(Extent::range(0, 1).to_string(), "[0..1]");
        assert_eq!(Extent::keys(["a", "b"]).to_string(), "{\"a\", \"b\"}");
    }

    #[test]
    fn test_nan_keys_are_addressable() {
        let nan = Value::Float(f64::NAN);
        assert!(nan.same_key(&Value::Float(f64::NAN)));
        assert!(!Value::from(1).same_key(&Value::from(2)));
    }
}

//! The closed conversion table used by type-converting transfers.
//!
//! A transfer names a [`ConversionKind`]; the pair of element types it is
//! applied to must appear in the table below. `auto` picks the single row that
//! matches the pair. Nothing outside the table is ever accepted.

use crate::types::ElementType;
use crate::value::Value;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString, IntoStaticStr};
use thiserror::Error;

use ElementType::*;

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Display,
    EnumString,
    EnumIter,
    IntoStaticStr,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ConversionKind {
    /// integer→float, bool→integer, bool→float
    Widen,
    /// float→integer, rounding toward zero
    Truncate,
    /// integer, float or bool rendered as text
    Format,
    /// text parsed as integer, float or bool
    Parse,
    /// integer or float tested against zero
    Truthy,
    /// string to its UTF-8 bytes
    Encode,
    /// bytes to string, invalid sequences replaced
    Decode,
    Auto,
}

const TABLE: &[(ConversionKind, ElementType, ElementType)] = &[
    (ConversionKind::Widen, Integer, Float),
    (ConversionKind::Widen, Bool, Integer),
    (ConversionKind::Widen, Bool, Float),
    (ConversionKind::Truncate, Float, Integer),
    (ConversionKind::Format, Integer, String),
    (ConversionKind::Format, Float, String),
    (ConversionKind::Format, Bool, String),
    (ConversionKind::Parse, String, Integer),
    (ConversionKind::Parse, String, Float),
    (ConversionKind::Parse, String, Bool),
    (ConversionKind::Truthy, Integer, Bool),
    (ConversionKind::Truthy, Float, Bool),
    (ConversionKind::Encode, String, Bytes),
    (ConversionKind::Decode, Bytes, String),
];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConversionError {
    #[error("unsupported conversion '{kind}' from {from} to {to}")]
    Unsupported {
        kind: ConversionKind,
        from: ElementType,
        to: ElementType,
    },
}

impl ConversionKind {
    /// Resolves `self` against the table for the given pair and returns the
    /// concrete kind that applies. `auto` resolves to the matching row.
    pub fn resolve(self, from: ElementType, to: ElementType) -> Result<ConversionKind, ConversionError> {
        TABLE
            .iter()
            .find(|(kind, f, t)| *f == from && *t == to && (self == ConversionKind::Auto || *kind == self))
            .map(|(kind, _, _)| *kind)
            .ok_or(ConversionError::Unsupported { kind: self, from, to })
    }

    /// All element types reachable from `from` by some conversion.
    pub fn targets_of(from: ElementType) -> impl Iterator<Item = ElementType> {
        TABLE.iter().filter(move |(_, f, _)| *f == from).map(|(_, _, t)| *t)
    }
}

/// Converts a known literal. `None` means the conversion is legal but its
/// result depends on a value that fails to parse, so the outcome is unknown
/// until run time.
pub fn convert_value(value: &Value, kind: ConversionKind, to: ElementType) -> Result<Option<Value>, ConversionError> {
    let kind = kind.resolve(value.element_type(), to)?;
    let out = match (value, to) {
        (Value::Int(i), Float) => Some(Value::Float(*i as f64)),
        (Value::Bool(b), Integer) => Some(Value::Int(*b as i64)),
        (Value::Bool(b), Float) => Some(Value::Float(if *b { 1.0 } else { 0.0 })),
        (Value::Float(x), Integer) => Some(Value::Int(x.trunc() as i64)),
        (Value::Int(i), String) => Some(Value::Str(i.to_string().into())),
        (Value::Float(x), String) => Some(Value::Str(x.to_string().into())),
        (Value::Bool(b), String) => Some(Value::Str(b.to_string().into())),
        (Value::Str(s), Integer) => s.trim().parse::<i64>().ok().map(Value::Int),
        (Value::Str(s), Float) => s.trim().parse::<f64>().ok().map(Value::Float),
        (Value::Str(s), Bool) => match s.as_str() {
            "true" | "1" => Some(Value::Bool(true)),
            "false" | "0" | "" => Some(Value::Bool(false)),
            _ => None,
        },
        (Value::Int(i), Bool) => Some(Value::Bool(*i != 0)),
        (Value::Float(x), Bool) => Some(Value::Bool(*x != 0.0)),
        (Value::Str(s), Bytes) => Some(Value::Bytes(s.as_bytes().to_vec())),
        (Value::Bytes(b), String) => Some(Value::Str(std::string::String::from_utf8_lossy(b).as_ref().into())),
        _ => {
            return Err(ConversionError::Unsupported {
                kind,
                from: value.element_type(),
                to,
            })
        }
    };
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auto_picks_the_only_row() {
        assert_eq!(ConversionKind::Auto.resolve(Integer, Float), Ok(ConversionKind::Widen));
        assert_eq!(ConversionKind::Auto.resolve(String, Bytes), Ok(ConversionKind::Encode));
        assert_eq!(ConversionKind::Auto.resolve(Float, Integer), Ok(ConversionKind::Truncate));
    }

    #[test]
    fn test_named_kind_must_match_row() {
        assert_eq!(ConversionKind::Format.resolve(Integer, String), Ok(ConversionKind::Format));
        assert_eq!(
            ConversionKind::Parse.resolve(Integer, String),
            Err(ConversionError::Unsupported {
                kind: ConversionKind::Parse,
                from: Integer,
                to: String
            })
        );
    }

    #[test]
    fn test_raw_byte_reinterpretation_is_closed() {
        for ty in [Integer, Float, Bool] {
            assert!(ConversionKind::Auto.resolve(Bytes, ty).is_err());
            assert!(ConversionKind::Auto.resolve(ty, Bytes).is_err());
        }
        assert!(ConversionKind::Auto.resolve(Integer, Integer).is_err());
    }

    #[test]
    fn test_convert_literals() {
        let v = convert_value(&Value::Float(2.9), ConversionKind::Truncate, Integer).unwrap();
        assert_eq!(v, Some(Value::Int(2)));
        let v = convert_value(&Value::Float(-2.9), ConversionKind::Auto, Integer).unwrap();
        assert_eq!(v, Some(Value::Int(-2)));
        let v = convert_value(&Value::from("42"), ConversionKind::Parse, Integer).unwrap();
        assert_eq!(v, Some(Value::Int(42)));
        let v = convert_value(&Value::from("forty"), ConversionKind::Parse, Integer).unwrap();
        assert_eq!(v, None);
        let v = convert_value(&Value::Float(1.5), ConversionKind::Format, String).unwrap();
        assert_eq!(v, Some(Value::from("1.5")));
        let v = convert_value(&Value::from("0"), ConversionKind::Parse, Bool).unwrap();
        assert_eq!(v, Some(Value::Bool(false)));
        let v = convert_value(&Value::from("hi"), ConversionKind::Encode, Bytes).unwrap();
        assert_eq!(v, Some(Value::Bytes(b"hi".to_vec())));
    }

    #[test]
    fn test_targets_of() {
        let targets: Vec<_> = ConversionKind::targets_of(Bytes).collect();
        assert_eq!(targets, vec![String]);
    }
}

//! Closed vocabularies shared by the verifier and its front-ends.
//!
//! Every enum here is parsed from and printed as its lowercase keyword, which is
//! also the form used in the textual operation stream.

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString, IntoStaticStr};

/// Element type of a container, or key type of a keyed container.
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
pub enum ElementType {
    #[strum(to_string = "integer", serialize = "int")]
    Integer,
    Float,
    #[strum(to_string = "string", serialize = "str")]
    String,
    Bool,
    Bytes,
}

impl ElementType {
    pub fn name(&self) -> &'static str {
        self.into()
    }
}

/// Ownership mode declared on a container.
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
pub enum OwnershipMode {
    Owned,
    Borrowed,
    Mutable,
    Shared,
}

/// What happens to a container when the scope that declared it exits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitAction {
    Destroy,
    Forget,
    Defer,
}

impl OwnershipMode {
    /// push, pop and in-place updates
    pub fn can_mutate(&self) -> bool {
        !matches!(self, Self::Borrowed)
    }

    /// Whole-container move. Only an owner can give its data away.
    pub fn can_take(&self) -> bool {
        matches!(self, Self::Owned)
    }

    pub fn can_borrow_mut(&self) -> bool {
        !matches!(self, Self::Borrowed)
    }

    /// Shared containers are synchronised at runtime and skip the borrow ledger.
    pub fn is_ledgered(&self) -> bool {
        !matches!(self, Self::Shared)
    }

    pub fn on_exit(&self) -> ExitAction {
        match self {
            Self::Owned | Self::Mutable => ExitAction::Destroy,
            Self::Borrowed => ExitAction::Forget,
            Self::Shared => ExitAction::Defer,
        }
    }
}

/// Access discipline of a binding.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Display,
    EnumString,
    EnumIter,
    IntoStaticStr,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Perspective {
    #[default]
    Lifo,
    Fifo,
    #[strum(to_string = "hashed", serialize = "hash", serialize = "indexed")]
    Hashed,
}

impl Perspective {
    /// Lifo and Fifo are each other's flip. Hashed has no flip.
    pub fn flipped(&self) -> Option<Perspective> {
        match self {
            Self::Lifo => Some(Self::Fifo),
            Self::Fifo => Some(Self::Lifo),
            Self::Hashed => None,
        }
    }
}

/// Mode of a borrow record.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Display,
    EnumString,
    IntoStaticStr,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum BorrowMode {
    #[strum(to_string = "read_only", serialize = "read")]
    ReadOnly,
    #[strum(to_string = "mutable", serialize = "mut")]
    Mutable,
}

impl BorrowMode {
    pub fn is_mutable(&self) -> bool {
        matches!(self, Self::Mutable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_keywords_round_trip() {
        assert_eq!(ElementType::from_str("int").unwrap(), ElementType::Integer);
        assert_eq!(ElementType::Integer.to_string(), "integer");
        assert_eq!(Perspective::from_str("hash").unwrap(), Perspective::Hashed);
        assert_eq!(BorrowMode::from_str("mut").unwrap(), BorrowMode::Mutable);
        assert_eq!(BorrowMode::ReadOnly.to_string(), "read_only");
        assert!(OwnershipMode::from_str("leased").is_err());
    }

    #[test]
    fn test_mode_capabilities() {
        assert!(OwnershipMode::Owned.can_take());
        assert!(!OwnershipMode::Mutable.can_take());
        assert!(OwnershipMode::Mutable.can_mutate());
        assert!(!OwnershipMode::Borrowed.can_mutate());
        assert!(!OwnershipMode::Borrowed.can_borrow_mut());
        assert!(!OwnershipMode::Shared.is_ledgered());
        assert_eq!(OwnershipMode::Borrowed.on_exit(), ExitAction::Forget);
        assert_eq!(OwnershipMode::Shared.on_exit(), ExitAction::Defer);
    }

    #[test]
    fn test_flip() {
        assert_eq!(Perspective::Lifo.flipped(), Some(Perspective::Fifo));
        assert_eq!(Perspective::Fifo.flipped(), Some(Perspective::Lifo));
        assert_eq!(Perspective::Hashed.flipped(), None);
        assert_eq!(Perspective::default(), Perspective::Lifo);
    }
}

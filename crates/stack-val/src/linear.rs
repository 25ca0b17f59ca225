//! Move tracking for whole containers.
//!
//! An owned container given away by `take` (or moved into a spawned task)
//! stays declared but becomes unusable until it is declared again.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Tracks whether a container has been moved from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MoveState {
    /// Container is available and can be used
    #[default]
    Available,
    /// Container has been moved and is no longer valid
    Moved,
}

impl MoveState {
    pub fn is_available(&self) -> bool {
        matches!(self, Self::Available)
    }

    pub fn is_moved(&self) -> bool {
        matches!(self, Self::Moved)
    }
}

impl fmt::Display for MoveState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Available => write!(f, "available"),
            Self::Moved => write!(f, "moved"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_move_state() {
        let state = MoveState::default();
        assert!(state.is_available());
        assert!(!state.is_moved());
        assert_eq!(MoveState::Moved.to_string(), "moved");
    }
}

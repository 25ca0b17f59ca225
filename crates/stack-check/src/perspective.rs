//! Perspective state of a binding.
//!
//! A perspective only decides where a push inserts and how a pop may address
//! slots. Changing it never touches container storage or the borrow ledger.

use crate::diagnostics::Diagnostic;
use crate::token::Pos;
use serde::{Deserialize, Serialize};
use stack_val::Perspective;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    pub from: Perspective,
    pub to: Perspective,
    pub pos: Pos,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PerspectiveState {
    current: Perspective,
    history: Vec<Transition>,
}

impl PerspectiveState {
    pub fn new(initial: Perspective) -> Self {
        Self {
            current: initial,
            history: Vec::new(),
        }
    }

    pub fn current(&self) -> Perspective {
        self.current
    }

    pub fn history(&self) -> &[Transition] {
        &self.history
    }

    /// Sets the perspective. Setting the current one is a no-op and records
    /// nothing. Returns whether anything changed.
    ///
    /// `keyed` tells whether the container has a key type, which the hashed
    /// perspective requires.
    pub fn set(&mut self, to: Perspective, keyed: bool, pos: Pos) -> Result<bool, Diagnostic> {
        if to == self.current {
            return Ok(false);
        }
        if to == Perspective::Hashed && !keyed {
            return Err(Diagnostic::perspective(
                "the hashed perspective needs a container with a key type",
                pos,
            ));
        }
        self.history.push(Transition {
            from: self.current,
            to,
            pos,
        });
        self.current = to;
        Ok(true)
    }

    /// Toggles between lifo and fifo.
    pub fn flip(&mut self, pos: Pos) -> Result<Perspective, Diagnostic> {
        let to = self.current.flipped().ok_or_else(|| {
            Diagnostic::perspective("cannot flip a hashed perspective; set lifo or fifo explicitly", pos)
        })?;
        self.history.push(Transition {
            from: self.current,
            to,
            pos,
        });
        self.current = to;
        Ok(to)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DiagnosticKind;

    #[test]
    fn test_set_is_idempotent() {
        let mut state = PerspectiveState::new(Perspective::Lifo);
        assert_eq!(state.set(Perspective::Fifo, false, Pos::default()), Ok(true));
        assert_eq!(state.set(Perspective::Fifo, false, Pos::default()), Ok(false));
        assert_eq!(state.current(), Perspective::Fifo);
        assert_eq!(state.history().len(), 1);
    }

    #[test]
    fn test_flip_twice_restores() {
        let mut state = PerspectiveState::new(Perspective::Fifo);
        state.flip(Pos::default()).unwrap();
        assert_eq!(state.current(), Perspective::Lifo);
        state.flip(Pos::default()).unwrap();
        assert_eq!(state.current(), Perspective::Fifo);
        assert_eq!(state.history().len(), 2);
    }

    #[test]
    fn test_hashed_rules() {
        let mut state = PerspectiveState::default();
        let err = state.set(Perspective::Hashed, false, Pos::default()).unwrap_err();
        assert_eq!(err.kind(), DiagnosticKind::InvalidPerspectiveTransitionError);
        assert_eq!(state.current(), Perspective::Lifo);

        state.set(Perspective::Hashed, true, Pos::default()).unwrap();
        let err = state.flip(Pos::default()).unwrap_err();
        assert_eq!(err.kind(), DiagnosticKind::InvalidPerspectiveTransitionError);
        assert_eq!(state.current(), Perspective::Hashed);
    }
}

//! Abstract content of a container.
//!
//! The verifier only needs lengths and keys to check extents, but it also keeps
//! every literal it can follow so annotations can report what a `pop` or
//! `peek` yields. A slot whose value depends on run time holds `None`.

use serde::{Deserialize, Serialize};
use stack_val::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Slot {
    pub value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<Value>,
}

impl Slot {
    pub fn known(value: Value) -> Self {
        Self { value: Some(value), key: None }
    }

    pub fn keyed(value: Option<Value>, key: Value) -> Self {
        Self { value, key: Some(key) }
    }
}

/// Slots are stored tail first: index 0 is the tail, the last index the head.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Shadow {
    slots: Vec<Slot>,
}

impl Shadow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    pub fn get(&self, pos: usize) -> Option<&Slot> {
        self.slots.get(pos)
    }

    pub fn head(&self) -> Option<&Slot> {
        self.slots.last()
    }

    pub fn push_head(&mut self, slot: Slot) {
        self.slots.push(slot);
    }

    pub fn push_tail(&mut self, slot: Slot) {
        self.slots.insert(0, slot);
    }

    /// Overwrites the value at `pos`, keeping its key. Fails with the current
    /// length when `pos` is out of range.
    pub fn replace(&mut self, pos: usize, value: Option<Value>) -> Result<(), usize> {
        match self.slots.get_mut(pos) {
            Some(slot) => {
                slot.value = value;
                Ok(())
            }
            None => Err(self.slots.len()),
        }
    }

    pub fn position_of(&self, key: &Value) -> Option<usize> {
        self.slots
            .iter()
            .position(|s| s.key.as_ref().map(|k| k.same_key(key)).unwrap_or(false))
    }

    /// Removes the given positions and returns their slots in ascending
    /// position order.
    pub fn remove(&mut self, positions: &[usize]) -> Vec<Slot> {
        let mut sorted = positions.to_vec();
        sorted.sort_unstable();
        sorted.dedup();
        let mut removed = Vec::with_capacity(sorted.len());
        for pos in sorted.iter().rev() {
            if *pos < self.slots.len() {
                removed.push(self.slots.remove(*pos));
            }
        }
        removed.reverse();
        removed
    }

    pub fn clear(&mut self) {
        self.slots.clear();
    }
}

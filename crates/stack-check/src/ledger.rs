//! Borrow region ledger
//!
//! Tracks the active borrow records of every container and rejects new
//! borrows or mutations that would break the borrowing rules:
//!
//! 1. Any number of read-only borrows may overlap
//! 2. A mutable borrow overlaps nothing else
//! 3. A mutation may not touch a position under any borrow but its own
//! 4. A read may not touch a position under someone else's mutable borrow
//!
//! Each container keeps two position bitmaps, one for all borrowed positions
//! and one for mutably borrowed positions, so the common no-conflict case is a
//! word-wise AND. Only when the bitmaps intersect are the records scanned, in
//! creation order, to name the earliest conflicting one.

use crate::binding::BindingId;
use crate::registry::ContainerId;
use crate::scope::ScopeId;
use crate::token::Pos;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use stack_val::{BorrowMode, Extent};
use std::fmt;

/// Growable set of container positions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SlotSet {
    words: Vec<u64>,
}

impl SlotSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn singleton(pos: usize) -> Self {
        let mut set = Self::new();
        set.insert(pos);
        set
    }

    /// Inclusive range `[lo, hi]`.
    pub fn range(lo: usize, hi: usize) -> Self {
        let mut set = Self::new();
        for pos in lo..=hi {
            set.insert(pos);
        }
        set
    }

    pub fn from_positions(positions: &[usize]) -> Self {
        let mut set = Self::new();
        for pos in positions {
            set.insert(*pos);
        }
        set
    }

    pub fn insert(&mut self, pos: usize) {
        let word_index = pos / 64;
        if word_index >= self.words.len() {
            self.words.resize(word_index + 1, 0);
        }
        self.words[word_index] |= 1u64 << (pos % 64);
    }

    pub fn contains(&self, pos: usize) -> bool {
        self.words
            .get(pos / 64)
            .map(|word| word & (1u64 << (pos % 64)) != 0)
            .unwrap_or(false)
    }

    pub fn union_with(&mut self, other: &Self) {
        if other.words.len() > self.words.len() {
            self.words.resize(other.words.len(), 0);
        }
        for (left, right) in self.words.iter_mut().zip(other.words.iter()) {
            *left |= *right;
        }
    }

    pub fn intersects(&self, other: &Self) -> bool {
        self.words
            .iter()
            .zip(other.words.iter())
            .any(|(left, right)| left & right != 0)
    }

    /// True if every position of `other` is also in `self`.
    pub fn covers(&self, other: &Self) -> bool {
        other.iter_ones().all(|pos| self.contains(pos))
    }

    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|word| *word == 0)
    }

    pub fn count(&self) -> usize {
        self.words.iter().map(|word| word.count_ones() as usize).sum()
    }

    pub fn min(&self) -> Option<usize> {
        self.iter_ones().next()
    }

    pub fn iter_ones(&self) -> SlotSetIter<'_> {
        SlotSetIter {
            set: self,
            word_index: 0,
            current_word: self.words.first().copied().unwrap_or(0),
        }
    }

    /// Positions after inserting `n` slots at the tail.
    pub fn shift_up(&self, n: usize) -> Self {
        let mut shifted = Self::new();
        for pos in self.iter_ones() {
            shifted.insert(pos + n);
        }
        shifted
    }

    /// Positions after the slots in `removed` are deleted and everything above
    /// them slides down. Removed positions drop out of the set.
    pub fn compact(&self, removed: &SlotSet) -> Self {
        let mut compacted = Self::new();
        let mut below = 0;
        let mut removed_iter = removed.iter_ones().peekable();
        for pos in self.iter_ones() {
            while let Some(&r) = removed_iter.peek() {
                if r < pos {
                    below += 1;
                    removed_iter.next();
                } else {
                    break;
                }
            }
            if !removed.contains(pos) {
                compacted.insert(pos - below);
            }
        }
        compacted
    }
}

impl fmt::Display for SlotSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, pos) in self.iter_ones().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", pos)?;
        }
        write!(f, "}}")
    }
}

pub struct SlotSetIter<'a> {
    set: &'a SlotSet,
    word_index: usize,
    current_word: u64,
}

impl<'a> Iterator for SlotSetIter<'a> {
    type Item = usize;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.word_index >= self.set.words.len() {
                return None;
            }

            if self.current_word != 0 {
                let trailing = self.current_word.trailing_zeros() as usize;
                self.current_word &= self.current_word - 1;
                return Some(self.word_index * 64 + trailing);
            }

            self.word_index += 1;
            self.current_word = self.set.words.get(self.word_index).copied().unwrap_or(0);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub usize);

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "borrow#{}", self.0)
    }
}

/// One active borrow of a container region.
#[derive(Debug, Clone)]
pub struct BorrowRecord {
    pub id: RecordId,
    pub container: ContainerId,
    /// The extent as written, for messages.
    pub extent: Extent,
    /// The positions the extent resolved to.
    pub slots: SlotSet,
    pub mode: BorrowMode,
    /// Scope that owns the record and releases it on exit.
    pub scope: ScopeId,
    /// View binding acting through this record, if any.
    pub holder: Option<BindingId>,
    pub pos: Pos,
    /// False for borrows of shared containers, which never conflict.
    pub ledgered: bool,
}

#[derive(Debug, Clone, Default)]
struct ContainerLedger {
    borrowed: SlotSet,
    mutable: SlotSet,
    records: Vec<RecordId>,
}

/// The earliest active record that blocks an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Conflict {
    pub record: RecordId,
    pub mode: BorrowMode,
    pub pos: Pos,
}

#[derive(Default)]
pub struct Ledger {
    records: IndexMap<RecordId, BorrowRecord>,
    containers: IndexMap<ContainerId, ContainerLedger>,
    next_id: usize,
}

/// Arguments of a new record.
pub struct NewBorrow {
    pub container: ContainerId,
    pub extent: Extent,
    pub slots: SlotSet,
    pub mode: BorrowMode,
    pub scope: ScopeId,
    pub holder: Option<BindingId>,
    pub pos: Pos,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Checks `new` against the active records of its container and inserts it.
    ///
    /// A mutable borrow is rejected by any intersecting record, a read-only one
    /// only by intersecting mutable records. `except` names a record that is
    /// allowed to overlap, used when re-borrowing through a view.
    pub fn borrow(&mut self, new: NewBorrow, except: Option<RecordId>) -> Result<RecordId, Conflict> {
        if new.mode.is_mutable() {
            self.check_write(new.container, &new.slots, except)?;
        } else {
            self.check_read(new.container, &new.slots, except)?;
        }
        Ok(self.insert(new, true))
    }

    /// Inserts a record that never takes part in conflict checks.
    pub fn record_unchecked(&mut self, new: NewBorrow) -> RecordId {
        self.insert(new, false)
    }

    fn insert(&mut self, new: NewBorrow, ledgered: bool) -> RecordId {
        let id = RecordId(self.next_id);
        self.next_id += 1;
        log::trace!("{} on {} {} ({})", id, new.container, new.slots, new.mode);
        let entry = self.containers.entry(new.container).or_default();
        entry.records.push(id);
        if ledgered {
            entry.borrowed.union_with(&new.slots);
            if new.mode.is_mutable() {
                entry.mutable.union_with(&new.slots);
            }
        }
        self.records.insert(
            id,
            BorrowRecord {
                id,
                container: new.container,
                extent: new.extent,
                slots: new.slots,
                mode: new.mode,
                scope: new.scope,
                holder: new.holder,
                pos: new.pos,
                ledgered,
            },
        );
        id
    }

    /// A mutation touching `footprint` conflicts with every record but `except`.
    pub fn check_write(
        &self,
        container: ContainerId,
        footprint: &SlotSet,
        except: Option<RecordId>,
    ) -> Result<(), Conflict> {
        match self.containers.get(&container) {
            Some(entry) if entry.borrowed.intersects(footprint) => {
                self.first_conflict(entry, footprint, except, false)
            }
            _ => Ok(()),
        }
    }

    /// A read of `footprint` conflicts with mutable records other than `except`.
    pub fn check_read(
        &self,
        container: ContainerId,
        footprint: &SlotSet,
        except: Option<RecordId>,
    ) -> Result<(), Conflict> {
        match self.containers.get(&container) {
            Some(entry) if entry.mutable.intersects(footprint) => {
                self.first_conflict(entry, footprint, except, true)
            }
            _ => Ok(()),
        }
    }

    fn first_conflict(
        &self,
        entry: &ContainerLedger,
        footprint: &SlotSet,
        except: Option<RecordId>,
        mutable_only: bool,
    ) -> Result<(), Conflict> {
        for id in &entry.records {
            if Some(*id) == except {
                continue;
            }
            let Some(record) = self.records.get(id) else {
                continue;
            };
            if !record.ledgered || (mutable_only && !record.mode.is_mutable()) {
                continue;
            }
            if record.slots.intersects(footprint) {
                return Err(Conflict {
                    record: record.id,
                    mode: record.mode,
                    pos: record.pos,
                });
            }
        }
        Ok(())
    }

    pub fn get(&self, id: RecordId) -> Option<&BorrowRecord> {
        self.records.get(&id)
    }

    pub fn set_holder(&mut self, id: RecordId, holder: BindingId) {
        if let Some(record) = self.records.get_mut(&id) {
            record.holder = Some(holder);
        }
    }

    /// Replaces the positions of a record after its holder mutated the
    /// container through it.
    pub fn rebase(&mut self, id: RecordId, slots: SlotSet) {
        let container = match self.records.get_mut(&id) {
            Some(record) => {
                record.slots = slots;
                record.container
            }
            None => return,
        };
        self.recompute(container);
    }

    /// Active records on `container` in creation order.
    pub fn records_on(&self, container: ContainerId) -> impl Iterator<Item = &BorrowRecord> {
        self.containers
            .get(&container)
            .into_iter()
            .flat_map(|entry| entry.records.iter())
            .filter_map(|id| self.records.get(id))
    }

    pub fn first_on(&self, container: ContainerId, except: Option<RecordId>) -> Option<&BorrowRecord> {
        self.records_on(container).find(|r| Some(r.id) != except && r.ledgered)
    }

    pub fn release(&mut self, id: RecordId) -> Option<BorrowRecord> {
        let record = self.records.shift_remove(&id)?;
        if let Some(entry) = self.containers.get_mut(&record.container) {
            entry.records.retain(|r| *r != id);
        }
        self.recompute(record.container);
        log::trace!("release {}", id);
        Some(record)
    }

    /// Releases every record owned by `scope`, oldest first.
    pub fn release_scope(&mut self, scope: ScopeId) -> Vec<BorrowRecord> {
        let ids: Vec<RecordId> = self
            .records
            .values()
            .filter(|r| r.scope == scope)
            .map(|r| r.id)
            .collect();
        ids.into_iter().filter_map(|id| self.release(id)).collect()
    }

    pub fn active_count(&self) -> usize {
        self.records.len()
    }

    pub fn records(&self) -> impl Iterator<Item = &BorrowRecord> {
        self.records.values()
    }

    fn recompute(&mut self, container: ContainerId) {
        let mut borrowed = SlotSet::new();
        let mut mutable = SlotSet::new();
        if let Some(entry) = self.containers.get(&container) {
            for record in entry.records.iter().filter_map(|id| self.records.get(id)) {
                if !record.ledgered {
                    continue;
                }
                borrowed.union_with(&record.slots);
                if record.mode.is_mutable() {
                    mutable.union_with(&record.slots);
                }
            }
        }
        if let Some(entry) = self.containers.get_mut(&container) {
            entry.borrowed = borrowed;
            entry.mutable = mutable;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_borrow(lo: usize, hi: usize, mode: BorrowMode) -> NewBorrow {
        NewBorrow {
            container: ContainerId(0),
            extent: Extent::range(lo as i64, hi as i64),
            slots: SlotSet::range(lo, hi),
            mode,
            scope: ScopeId(1),
            holder: None,
            pos: Pos::new(lo + 1, 0, 0, 1),
        }
    }

    #[test]
    fn test_slot_set_basics() {
        let mut set = SlotSet::range(62, 66);
        assert!(set.contains(64));
        assert!(!set.contains(67));
        assert_eq!(set.count(), 5);
        set.insert(130);
        assert_eq!(set.iter_ones().collect::<Vec<_>>(), vec![62, 63, 64, 65, 66, 130]);
        assert!(set.intersects(&SlotSet::singleton(130)));
        assert!(!set.intersects(&SlotSet::singleton(129)));
        assert!(set.covers(&SlotSet::range(63, 65)));
        assert_eq!(SlotSet::new().min(), None);
    }

    #[test]
    fn test_shift_and_compact() {
        let set = SlotSet::from_positions(&[0, 2, 5]);
        assert_eq!(set.shift_up(1), SlotSet::from_positions(&[1, 3, 6]));
        let removed = SlotSet::from_positions(&[1, 2]);
        assert_eq!(set.compact(&removed), SlotSet::from_positions(&[0, 3]));
    }

    #[test]
    fn test_shared_reads_overlap() {
        let mut ledger = Ledger::new();
        assert!(ledger.borrow(new_borrow(0, 2, BorrowMode::ReadOnly), None).is_ok());
        assert!(ledger.borrow(new_borrow(1, 3, BorrowMode::ReadOnly), None).is_ok());
        assert_eq!(ledger.active_count(), 2);
    }

    #[test]
    fn test_mutable_is_exclusive() {
        let mut ledger = Ledger::new();
        let first = ledger.borrow(new_borrow(0, 1, BorrowMode::ReadOnly), None).unwrap();
        ledger.borrow(new_borrow(2, 2, BorrowMode::Mutable), None).unwrap();
        let err = ledger.borrow(new_borrow(1, 2, BorrowMode::Mutable), None).unwrap_err();
        assert_eq!(err.record, first);
        assert_eq!(err.mode, BorrowMode::ReadOnly);

        let err = ledger.borrow(new_borrow(2, 3, BorrowMode::ReadOnly), None).unwrap_err();
        assert_eq!(err.mode, BorrowMode::Mutable);
    }

    #[test]
    fn test_except_and_release() {
        let mut ledger = Ledger::new();
        let own = ledger.borrow(new_borrow(0, 3, BorrowMode::Mutable), None).unwrap();
        assert!(ledger.check_write(ContainerId(0), &SlotSet::singleton(3), Some(own)).is_ok());
        assert!(ledger.check_write(ContainerId(0), &SlotSet::singleton(3), None).is_err());
        assert!(ledger.check_write(ContainerId(1), &SlotSet::singleton(3), None).is_ok());

        let released = ledger.release_scope(ScopeId(1));
        assert_eq!(released.len(), 1);
        assert!(ledger.check_write(ContainerId(0), &SlotSet::range(0, 3), None).is_ok());
    }

    #[test]
    fn test_unchecked_records_never_conflict() {
        let mut ledger = Ledger::new();
        ledger.record_unchecked(new_borrow(0, 1, BorrowMode::Mutable));
        assert!(ledger.borrow(new_borrow(0, 1, BorrowMode::Mutable), None).is_ok());
        assert_eq!(ledger.records_on(ContainerId(0)).count(), 2);
        assert_eq!(ledger.first_on(ContainerId(0), None).map(|r| r.id), Some(RecordId(1)));
    }

    #[test]
    fn test_rebase_updates_bitmaps() {
        let mut ledger = Ledger::new();
        let id = ledger.borrow(new_borrow(0, 0, BorrowMode::Mutable), None).unwrap();
        ledger.rebase(id, SlotSet::singleton(1));
        assert!(ledger.check_write(ContainerId(0), &SlotSet::singleton(0), None).is_ok());
        assert!(ledger.check_write(ContainerId(0), &SlotSet::singleton(1), None).is_err());
    }
}

//! Pushes and container-to-container transfers.
//!
//! A transfer `push t <- [effect] s` runs three checks, on the source, the
//! conversion and the target, and commits only when all three pass. A
//! rejection names the step that failed and leaves every container, binding
//! and borrow record untouched.

use crate::diagnostics::Diagnostic;
use crate::ledger::{NewBorrow, SlotSet};
use crate::op::{Effect, Operand};
use crate::shadow::Slot;
use crate::token::Pos;
use crate::verifier::{Access, Annotation, Verifier};
use stack_val::{convert_value, BorrowMode, ConversionKind, ElementType, Extent, Perspective, Value};
use strum_macros::Display;

/// Where a push lands in the target container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Insert {
    Head,
    Tail,
    Replace(usize),
}

impl Insert {
    /// Positions an insertion shifts or overwrites, given the length before it.
    fn footprint(&self, len: usize) -> SlotSet {
        match self {
            Insert::Head => SlotSet::new(),
            Insert::Tail if len == 0 => SlotSet::new(),
            Insert::Tail => SlotSet::range(0, len - 1),
            Insert::Replace(p) => SlotSet::singleton(*p),
        }
    }

    /// The same insertion once position `removed` is gone from the container.
    fn after_removal(self, removed: usize) -> Insert {
        match self {
            Insert::Replace(p) if p == removed => Insert::Head,
            Insert::Replace(p) if p > removed => Insert::Replace(p - 1),
            other => other,
        }
    }

    /// Whether a view over `slots` may perform this insertion.
    fn allowed_through(&self, slots: &SlotSet, len: usize) -> bool {
        match self {
            Insert::Head => len == 0 || slots.contains(len - 1),
            Insert::Tail => len == 0 || slots.contains(0),
            Insert::Replace(p) => slots.contains(*p),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
enum Step {
    Source,
    Conversion,
    Target,
}

impl Verifier {
    pub(crate) fn push(
        &mut self,
        binding: &str,
        operand: &Operand,
        key: Option<&Value>,
        conversion: Option<ConversionKind>,
        pos: Pos,
    ) -> Result<Annotation, Diagnostic> {
        match operand {
            Operand::Value(value) => self.push_value(binding, value, key, conversion, pos),
            Operand::Binding { name, effect } => {
                self.transfer(binding, name, *effect, key, conversion, pos)
            }
        }
    }

    fn push_value(
        &mut self,
        binding: &str,
        value: &Value,
        key: Option<&Value>,
        conversion: Option<ConversionKind>,
        pos: Pos,
    ) -> Result<Annotation, Diagnostic> {
        let Some(target) = self.access(binding, pos)? else {
            return Ok(self.base());
        };
        self.writable(&target, "push to", pos)?;
        let element = self.registry.get(target.container).element;
        let converted = convert_literal(value, conversion, element, pos)?;
        let insert = self.plan_insert(&target, key, pos)?;
        self.check_inserts(&target, &[insert], pos)?;

        let slot = Slot {
            value: converted.clone(),
            key: key.cloned(),
        };
        self.commit_insert(&target, insert, slot);
        let mut annotation = self.describe_access(&target);
        annotation.values = vec![converted];
        Ok(annotation)
    }

    /// Decides where a push through `target` lands under its perspective.
    pub(crate) fn plan_insert(&self, target: &Access, key: Option<&Value>, pos: Pos) -> Result<Insert, Diagnostic> {
        let info = self.registry.get(target.container);
        let perspective = self.bindings.get(target.binding).perspective.current();
        match (perspective, key) {
            (Perspective::Hashed, None) => Err(Diagnostic::type_mismatch(
                info.key.map(|k| k.to_string()).unwrap_or_else(|| "a key".to_string()),
                "no key",
                format!("a push to '{}' under the hashed perspective needs a key", info.name),
                pos,
            )),
            (Perspective::Hashed, Some(key)) => {
                let Some(key_type) = info.key else {
                    return Err(Diagnostic::type_mismatch(
                        "no key",
                        key.element_type(),
                        format!("'{}' has no key type", info.name),
                        pos,
                    ));
                };
                if key.element_type() != key_type {
                    return Err(Diagnostic::type_mismatch(
                        key_type,
                        key.element_type(),
                        format!("key {} does not match the key type of '{}'", key, info.name),
                        pos,
                    ));
                }
                Ok(match info.content.position_of(key) {
                    Some(p) => Insert::Replace(p),
                    None => Insert::Head,
                })
            }
            (_, Some(_)) if !info.is_keyed() => Err(Diagnostic::type_mismatch(
                "no key",
                key.map(|k| k.element_type().to_string()).unwrap_or_default(),
                format!("'{}' has no key type", info.name),
                pos,
            )),
            (_, Some(_)) => Err(Diagnostic::perspective(
                format!("keys can only be given under the hashed perspective, but the binding is {}", perspective),
                pos,
            )),
            (Perspective::Fifo, None) => Ok(Insert::Tail),
            (Perspective::Lifo, None) => Ok(Insert::Head),
        }
    }

    /// Checks planned insertions against the acting view and the ledger.
    pub(crate) fn check_inserts(&self, target: &Access, inserts: &[Insert], pos: Pos) -> Result<(), Diagnostic> {
        let info = self.registry.get(target.container);
        let len = info.len();
        let mut footprint = SlotSet::new();
        for insert in inserts {
            footprint.union_with(&insert.footprint(len));
        }
        if let Some(record) = target.view.and_then(|r| self.ledger.get(r)) {
            if let Some(outside) = inserts.iter().find(|i| !i.allowed_through(&record.slots, len)) {
                let place = match outside {
                    Insert::Head => "the head".to_string(),
                    Insert::Tail => "the tail".to_string(),
                    Insert::Replace(p) => format!("position {}", p),
                };
                return Err(Diagnostic::ownership(
                    format!(
                        "push through view '{}' writes {} outside its borrowed extent {}",
                        self.binding_name(target.binding),
                        place,
                        record.extent
                    ),
                    pos,
                )
                .with_related(record.pos, "borrowed here"));
            }
        }
        if info.mode.is_ledgered() {
            self.ledger
                .check_write(target.container, &footprint, target.view)
                .map_err(|c| self.conflict(c, format!("push to '{}'", info.name), pos))?;
        }
        Ok(())
    }

    pub(crate) fn commit_insert(&mut self, target: &Access, insert: Insert, slot: Slot) {
        let content = &mut self.registry.get_mut(target.container).content;
        match insert {
            Insert::Head => content.push_head(slot),
            Insert::Tail => content.push_tail(slot),
            Insert::Replace(p) => {
                let replaced = content.replace(p, slot.value);
                debug_assert!(replaced.is_ok(), "replace at {} past the end of {}", p, target.container);
                if let Err(len) = replaced {
                    log::error!("replace at {} past the end of {} (len {})", p, target.container, len);
                }
            }
        }
        let len = content.len();
        let Some(view) = target.view else {
            return;
        };
        let Some(record) = self.ledger.get(view) else {
            return;
        };
        let rebased = match insert {
            Insert::Head => {
                let mut slots = record.slots.clone();
                slots.insert(len - 1);
                slots
            }
            Insert::Tail => {
                let mut slots = record.slots.shift_up(1);
                slots.insert(0);
                slots
            }
            Insert::Replace(_) => return,
        };
        self.ledger.rebase(view, rebased);
    }

    /// `push target <- [effect] source [as kind] [key k]`
    fn transfer(
        &mut self,
        target_name: &str,
        source_name: &str,
        effect: Effect,
        key: Option<&Value>,
        conversion: Option<ConversionKind>,
        pos: Pos,
    ) -> Result<Annotation, Diagnostic> {
        let Some(target) = self.access(target_name, pos)? else {
            return Ok(self.base());
        };
        let Some(source) = self
            .access(source_name, pos)
            .map_err(|d| d.in_step(Step::Source))?
        else {
            return Ok(self.base());
        };

        // source
        let head = self
            .check_source(&source, &target, effect, pos)
            .map_err(|d| d.in_step(Step::Source))?;

        // conversion
        let mut slots = self
            .convert_slots(&source, &target, effect, conversion, head, pos)
            .map_err(|d| d.in_step(Step::Conversion))?;
        if effect != Effect::Take {
            for slot in &mut slots {
                slot.key = key.cloned();
            }
        }

        // target
        let inserts = self
            .check_target(&target, &source, effect, key, &slots, pos)
            .map_err(|d| d.in_step(Step::Target))?;

        log::debug!(
            "transfer {} -> {} ({}) of {} slot(s)",
            source_name,
            target_name,
            effect,
            slots.len()
        );
        let values: Vec<Option<Value>> = slots.iter().map(|s| s.value.clone()).collect();
        let mut annotation_record = None;
        match effect {
            Effect::Move => {
                let removed = SlotSet::singleton(head);
                self.registry
                    .get_mut(source.container)
                    .content
                    .remove(&[head]);
                if let Some(view) = source.view {
                    if let Some(record) = self.ledger.get(view) {
                        let rebased = record.slots.compact(&removed);
                        self.ledger.rebase(view, rebased);
                    }
                }
                let inserts = if source.container == target.container {
                    inserts.into_iter().map(|i| i.after_removal(head)).collect()
                } else {
                    inserts
                };
                self.insert_all(&target, inserts, slots);
            }
            Effect::Take => {
                self.registry.mark_moved(source.container, pos);
                self.insert_all(&target, inserts, slots);
            }
            Effect::Borrow | Effect::BorrowMut => {
                let mode = match effect {
                    Effect::BorrowMut => BorrowMode::Mutable,
                    _ => BorrowMode::ReadOnly,
                };
                let ledgered = self.registry.get(source.container).mode.is_ledgered();
                let new = NewBorrow {
                    container: source.container,
                    extent: Extent::range(head as i64, head as i64),
                    slots: SlotSet::singleton(head),
                    mode,
                    scope: self.scopes.current(),
                    holder: None,
                    pos,
                };
                let record = if ledgered {
                    let result = self.ledger.borrow(new, source.view);
                    result.map_err(|c| self.conflict(c, "reference push", pos).in_step(Step::Source))?
                } else {
                    self.ledger.record_unchecked(new)
                };
                annotation_record = Some(record);
                self.insert_all(&target, inserts, slots);
            }
        }

        let mut annotation = self.describe_access(&target);
        annotation.values = values;
        if annotation_record.is_some() {
            annotation.record = annotation_record;
        }
        Ok(annotation)
    }

    /// Checks the source side and returns its head position. An empty
    /// source can only be taken.
    fn check_source(&self, source: &Access, target: &Access, effect: Effect, pos: Pos) -> Result<usize, Diagnostic> {
        let info = self.registry.get(source.container);
        info.ensure_usable(pos)?;
        if source.container == target.container && effect != Effect::Move {
            return Err(Diagnostic::ownership(
                format!("cannot {} '{}' into itself", effect, info.name),
                pos,
            ));
        }
        if info.is_empty() && effect != Effect::Take {
            return Err(Diagnostic::range(format!("'{}' is empty", info.name), pos));
        }
        let head = info.len().saturating_sub(1);
        let own = source.view.and_then(|r| self.ledger.get(r));
        let head_in_view = || {
            if let Some(record) = own {
                if !record.slots.contains(head) {
                    return Err(Diagnostic::ownership(
                        format!(
                            "the head of '{}' lies outside the extent {} of view '{}'",
                            info.name,
                            record.extent,
                            self.binding_name(source.binding)
                        ),
                        pos,
                    )
                    .with_related(record.pos, "borrowed here"));
                }
            }
            Ok(())
        };

        match effect {
            Effect::Move => {
                self.writable(source, "move out of", pos)?;
                head_in_view()?;
                if info.mode.is_ledgered() {
                    self.ledger
                        .check_write(source.container, &SlotSet::singleton(head), source.view)
                        .map_err(|c| self.conflict(c, format!("move out of '{}'", info.name), pos))?;
                }
            }
            Effect::Take => {
                if !info.mode.can_take() {
                    return Err(Diagnostic::ownership(
                        format!("only an owned container can be taken; '{}' is {}", info.name, info.mode),
                        pos,
                    ));
                }
                if source.view.is_some() {
                    return Err(Diagnostic::ownership(
                        format!("cannot take '{}' through a view", info.name),
                        pos,
                    ));
                }
                if let Some(record) = self.ledger.first_on(source.container, None) {
                    return Err(Diagnostic::conflict(
                        format!("cannot take '{}' while it is borrowed", info.name),
                        pos,
                        record.pos,
                    ));
                }
            }
            Effect::Borrow | Effect::BorrowMut => {
                let mutable = effect == Effect::BorrowMut;
                if mutable && !info.mode.can_borrow_mut() {
                    return Err(Diagnostic::ownership(
                        format!("cannot borrow '{}' mutably: the container is {}", info.name, info.mode),
                        pos,
                    ));
                }
                if let (true, Some(record)) = (mutable, own) {
                    if !record.mode.is_mutable() {
                        return Err(Diagnostic::ownership(
                            format!(
                                "cannot borrow mutably through read-only view '{}'",
                                self.binding_name(source.binding)
                            ),
                            pos,
                        )
                        .with_related(record.pos, "borrowed read-only here"));
                    }
                }
                head_in_view()?;
                if info.mode.is_ledgered() {
                    let footprint = SlotSet::singleton(head);
                    let checked = if mutable {
                        self.ledger.check_write(source.container, &footprint, source.view)
                    } else {
                        self.ledger.check_read(source.container, &footprint, source.view)
                    };
                    checked.map_err(|c| self.conflict(c, format!("{} of the head of '{}'", effect, info.name), pos))?;
                }
            }
        }
        Ok(head)
    }

    /// Produces the slots that land in the target, converted to its element type.
    fn convert_slots(
        &self,
        source: &Access,
        target: &Access,
        effect: Effect,
        conversion: Option<ConversionKind>,
        head: usize,
        pos: Pos,
    ) -> Result<Vec<Slot>, Diagnostic> {
        let src = self.registry.get(source.container);
        let tgt = self.registry.get(target.container);
        let (from, to) = (src.element, tgt.element);

        if effect.borrow_mode().is_some() {
            if let Some(kind) = conversion {
                return Err(Diagnostic::unsupported(kind, from, to, pos));
            }
            if from != to {
                return Err(Diagnostic::type_mismatch(
                    to,
                    from,
                    format!("a reference into '{}' keeps the element type {}", src.name, from),
                    pos,
                ));
            }
        }

        let picked: Vec<&Slot> = match effect {
            Effect::Take => src.content.slots().iter().collect(),
            _ => src.content.get(head).into_iter().collect(),
        };
        let kind = match conversion {
            None if from != to => {
                return Err(Diagnostic::type_mismatch(
                    to,
                    from,
                    format!("cannot push {} from '{}' onto '{}' of {}", from, src.name, tgt.name, to),
                    pos,
                ))
            }
            None => None,
            Some(kind) => Some(
                kind.resolve(from, to)
                    .map_err(|_| Diagnostic::unsupported(kind, from, to, pos))?,
            ),
        };

        let mut slots = Vec::with_capacity(picked.len());
        for slot in picked {
            let value = match (&slot.value, kind) {
                (Some(value), Some(kind)) => convert_value(value, kind, to)
                    .map_err(|_| Diagnostic::unsupported(kind, from, to, pos))?,
                (value, _) => value.clone(),
            };
            slots.push(Slot {
                value,
                key: slot.key.clone(),
            });
        }
        Ok(slots)
    }

    /// Checks the target side and plans where each slot lands.
    fn check_target(
        &self,
        target: &Access,
        source: &Access,
        effect: Effect,
        key: Option<&Value>,
        slots: &[Slot],
        pos: Pos,
    ) -> Result<Vec<Insert>, Diagnostic> {
        self.writable(target, "push to", pos)?;
        if effect != Effect::Take {
            let insert = self.plan_insert(target, key, pos)?;
            self.check_inserts(target, &[insert], pos)?;
            return Ok(vec![insert]);
        }

        let tgt = self.registry.get(target.container);
        let src = self.registry.get(source.container);
        if key.is_some() {
            return Err(Diagnostic::type_mismatch(
                "no key",
                "a key",
                format!("taking '{}' moves its slots with their own keys", src.name),
                pos,
            ));
        }
        let perspective = self.bindings.get(target.binding).perspective.current();
        let inserts = match perspective {
            Perspective::Lifo => vec![Insert::Head; slots.len()],
            Perspective::Fifo => vec![Insert::Tail; slots.len()],
            Perspective::Hashed => {
                if src.key != tgt.key || tgt.key.is_none() {
                    return Err(Diagnostic::type_mismatch(
                        tgt.key.map(|k| k.to_string()).unwrap_or_else(|| "no key".into()),
                        src.key.map(|k| k.to_string()).unwrap_or_else(|| "no key".into()),
                        format!("taking '{}' under the hashed perspective needs matching key types", src.name),
                        pos,
                    ));
                }
                let mut inserts = Vec::with_capacity(slots.len());
                for slot in slots {
                    let Some(key) = &slot.key else {
                        return Err(Diagnostic::type_mismatch(
                            "a keyed slot",
                            "an unkeyed slot",
                            format!("'{}' holds a slot without a key", src.name),
                            pos,
                        ));
                    };
                    inserts.push(match tgt.content.position_of(key) {
                        Some(p) => Insert::Replace(p),
                        None => Insert::Head,
                    });
                }
                inserts
            }
        };
        self.check_inserts(target, &inserts, pos)?;
        Ok(inserts)
    }

    fn insert_all(&mut self, target: &Access, inserts: Vec<Insert>, slots: Vec<Slot>) {
        for (planned, slot) in inserts.into_iter().zip(slots) {
            // keys seen earlier in the same take may now be present
            let insert = match (&slot.key, planned) {
                (Some(key), Insert::Head) => match self.registry.get(target.container).content.position_of(key) {
                    Some(p) => Insert::Replace(p),
                    None => Insert::Head,
                },
                _ => planned,
            };
            self.commit_insert(target, insert, slot);
        }
    }
}

/// Converts a literal to the element type of its target.
fn convert_literal(
    value: &Value,
    conversion: Option<ConversionKind>,
    to: ElementType,
    pos: Pos,
) -> Result<Option<Value>, Diagnostic> {
    let from = value.element_type();
    match conversion {
        None if from == to => Ok(Some(value.clone())),
        None => Err(Diagnostic::type_mismatch(
            to,
            from,
            format!("cannot push {} {} onto a container of {}", from, value, to),
            pos,
        )),
        Some(kind) => convert_value(value, kind, to).map_err(|_| Diagnostic::unsupported(kind, from, to, pos)),
    }
}

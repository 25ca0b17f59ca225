//! Verifier driver.
//!
//! Walks an operation stream once, in order, and drives the registry, the
//! binding table, the ledger and the scope tree. Each operation is one
//! checkpoint: it is fully validated before any state changes, so a rejected
//! operation leaves everything as it was. Findings go to the [`Reporter`] and
//! the walk continues.
//!
//! Container-to-container pushes live in [`crate::transfer`]; scope exit,
//! captures, spawns and teardown live in [`crate::lifetime`].

use crate::binding::{BindingId, Bindings, Referent};
use crate::diagnostics::{is_fatal, Diagnostic, Reporter};
use crate::ledger::{Conflict, Ledger, NewBorrow, RecordId, SlotSet};
use crate::op::{Op, OpNode, ScopeKind};
use crate::registry::{ContainerId, ContainerInfo, Registry};
use crate::scope::{ScopeId, ScopeTree};
use crate::token::Pos;
use serde::{Deserialize, Serialize};
use stack_val::{
    BorrowMode, ElementType, Extent, OwnershipMode, Perspective, StackStr, Value,
};
use std::fmt::Write as _;
use strum::IntoEnumIterator;

#[derive(Debug, Clone, Copy, Default)]
pub struct VerifyOptions {
    pub warnings_as_errors: bool,
}

/// What the verifier resolved for one operation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub scope: ScopeId,
    pub depth: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub binding: Option<BindingId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container: Option<StackStr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_id: Option<ContainerId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element: Option<ElementType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<ElementType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<OwnershipMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub perspective: Option<Perspective>,
    /// Length of the container after the operation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub len: Option<usize>,
    /// Values yielded or moved, `null` where only run time knows.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<Option<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record: Option<RecordId>,
    pub ok: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotatedOp {
    #[serde(flatten)]
    pub node: OpNode,
    pub annotation: Annotation,
}

/// Output of a verification run: the annotated stream plus every diagnostic.
#[derive(Debug, Clone)]
pub struct VerifiedProgram {
    pub ops: Vec<AnnotatedOp>,
    pub diagnostics: Vec<Diagnostic>,
    pub warnings_as_errors: bool,
}

impl VerifiedProgram {
    pub fn fatal_count(&self) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| is_fatal(d, self.warnings_as_errors))
            .count()
    }

    pub fn has_fatal(&self) -> bool {
        self.fatal_count() > 0
    }
}

/// A binding resolved to the container it reaches.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Access {
    pub binding: BindingId,
    pub container: ContainerId,
    /// Record the binding acts through, for views.
    pub view: Option<RecordId>,
}

pub struct Verifier {
    pub(crate) scopes: ScopeTree,
    pub(crate) registry: Registry,
    pub(crate) bindings: Bindings,
    pub(crate) ledger: Ledger,
    pub(crate) reporter: Reporter,
    pub(crate) deferred: Vec<ContainerId>,
    ops: Vec<AnnotatedOp>,
    last_pos: Pos,
    options: VerifyOptions,
}

impl Verifier {
    pub fn new(options: VerifyOptions) -> Self {
        Self {
            scopes: ScopeTree::new(),
            registry: Registry::new(),
            bindings: Bindings::new(),
            ledger: Ledger::new(),
            reporter: Reporter::new(options.warnings_as_errors),
            deferred: Vec::new(),
            ops: Vec::new(),
            last_pos: Pos::default(),
            options,
        }
    }

    /// Verifies a whole stream, closing every scope left open at the end.
    pub fn verify(ops: &[OpNode], options: VerifyOptions) -> VerifiedProgram {
        let mut verifier = Verifier::new(options);
        for node in ops {
            verifier.step(node);
        }
        verifier.finish()
    }

    /// Verifies one operation and returns the diagnostics it produced.
    pub fn step(&mut self, node: &OpNode) -> &[Diagnostic] {
        let before = self.reporter.diagnostics().len();
        log::debug!("{} {} at {}", self.ops.len(), node.op.name(), node.pos);
        let annotation = match self.apply(node) {
            Ok(annotation) => annotation,
            Err(diagnostic) => {
                self.reporter.report(diagnostic);
                self.base()
            }
        };
        self.last_pos = node.pos;
        self.ops.push(AnnotatedOp {
            node: node.clone(),
            annotation,
        });
        &self.reporter.diagnostics()[before..]
    }

    /// Closes open scopes, tears down deferred shared containers and hands out
    /// the result.
    pub fn finish(mut self) -> VerifiedProgram {
        let end = self.last_pos;
        self.close_all(end);
        VerifiedProgram {
            ops: self.ops,
            diagnostics: self.reporter.into_diagnostics(),
            warnings_as_errors: self.options.warnings_as_errors,
        }
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        self.reporter.diagnostics()
    }

    pub fn annotated(&self) -> &[AnnotatedOp] {
        &self.ops
    }

    fn apply(&mut self, node: &OpNode) -> Result<Annotation, Diagnostic> {
        let pos = node.pos;
        match &node.op {
            Op::Declare {
                container,
                element,
                key,
                mode,
            } => self.declare(container, *element, *key, *mode, pos),
            Op::Bind {
                binding,
                container,
                perspective,
            } => self.bind(binding, container, *perspective, pos),
            Op::Push {
                binding,
                operand,
                key,
                conversion,
            } => self.push(binding, operand, key.as_ref(), *conversion, pos),
            Op::Pop { binding, extent } => self.pop(binding, extent.as_ref(), pos),
            Op::Peek { binding, extent } => self.peek(binding, extent.as_ref(), pos),
            Op::Borrow {
                binding,
                source,
                extent,
                mode,
            } => self.borrow(binding, source, extent, *mode, pos),
            Op::SetPerspective {
                binding,
                perspective,
            } => self.set_perspective(binding, *perspective, pos),
            Op::Flip { binding } => self.flip(binding, pos),
            Op::Capture { target, source } => self.capture(target, source, pos),
            Op::Release { binding } => self.release(binding, pos),
            Op::Match {
                binding,
                arms,
                default,
            } => self.match_perspective(binding, arms, *default, pos),
            Op::ScopeEnter { kind } => self.enter(*kind, pos),
            Op::ScopeExit => self.exit(pos),
            Op::Spawn { captures } => self.spawn(captures, pos),
        }
    }

    pub(crate) fn base(&self) -> Annotation {
        Annotation {
            scope: self.scopes.current(),
            depth: self.scopes.depth(),
            ..Default::default()
        }
    }

    pub(crate) fn describe(&self, container: ContainerId, binding: Option<BindingId>) -> Annotation {
        let info = self.registry.get(container);
        Annotation {
            binding,
            container: Some(info.name.clone()),
            container_id: Some(container),
            element: Some(info.element),
            key: info.key,
            mode: Some(info.mode),
            perspective: binding.map(|b| self.bindings.get(b).perspective.current()),
            len: Some(info.len()),
            ok: true,
            ..self.base()
        }
    }

    pub(crate) fn describe_access(&self, access: &Access) -> Annotation {
        Annotation {
            record: access.view,
            ..self.describe(access.container, Some(access.binding))
        }
    }

    /// Resolves a binding name. `Ok(None)` means the binding is poisoned and
    /// the operation should be skipped quietly.
    pub(crate) fn access(&self, name: &str, pos: Pos) -> Result<Option<Access>, Diagnostic> {
        let binding = self.bindings.lookup(&self.scopes, name, pos)?;
        Ok(self.access_of(binding))
    }

    pub(crate) fn access_of(&self, binding: BindingId) -> Option<Access> {
        match self.bindings.get(binding).referent {
            Referent::Direct(container) => Some(Access {
                binding,
                container,
                view: None,
            }),
            Referent::View(record) => self.ledger.get(record).map(|r| Access {
                binding,
                container: r.container,
                view: Some(record),
            }),
            Referent::Poisoned => None,
        }
    }

    pub(crate) fn binding_name(&self, binding: BindingId) -> &str {
        self.bindings.get(binding).name.as_str()
    }

    /// Checks that `access` may mutate its container.
    pub(crate) fn writable(&self, access: &Access, action: &str, pos: Pos) -> Result<(), Diagnostic> {
        let info = self.registry.get(access.container);
        info.ensure_usable(pos)?;
        if !info.mode.can_mutate() {
            return Err(Diagnostic::ownership(
                format!("cannot {} '{}': the container is {}", action, info.name, info.mode),
                pos,
            ));
        }
        if let Some(record) = access.view.and_then(|r| self.ledger.get(r)) {
            if !record.mode.is_mutable() {
                return Err(Diagnostic::ownership(
                    format!(
                        "cannot {} through read-only view '{}'",
                        action,
                        self.binding_name(access.binding)
                    ),
                    pos,
                )
                .with_related(record.pos, "borrowed read-only here"));
            }
        }
        Ok(())
    }

    pub(crate) fn conflict(&self, conflict: Conflict, action: impl std::fmt::Display, pos: Pos) -> Diagnostic {
        let extent = self
            .ledger
            .get(conflict.record)
            .map(|r| r.extent.to_string())
            .unwrap_or_default();
        Diagnostic::conflict(
            format!("{} overlaps the active {} borrow {}", action, conflict.mode, extent),
            pos,
            conflict.pos,
        )
    }

    /// Resolves an extent to the positions it covers in `info`.
    pub(crate) fn resolve_extent(&self, info: &ContainerInfo, extent: &Extent, pos: Pos) -> Result<SlotSet, Diagnostic> {
        match extent {
            Extent::Range { lo, hi } => {
                if *lo < 0 || *hi < 0 {
                    return Err(Diagnostic::range(format!("negative bound in {}", extent), pos));
                }
                if lo > hi {
                    return Err(Diagnostic::range(format!("empty range {}: lo is greater than hi", extent), pos));
                }
                let len = info.len();
                if *hi as usize >= len {
                    return Err(Diagnostic::range(
                        format!("{} is out of bounds for '{}' of length {}", extent, info.name, len),
                        pos,
                    ));
                }
                Ok(SlotSet::range(*lo as usize, *hi as usize))
            }
            Extent::Keys(keys) => {
                let Some(key_type) = info.key else {
                    return Err(Diagnostic::type_mismatch(
                        "a keyed container",
                        format!("{} without keys", info.element),
                        format!("'{}' has no key type and cannot be addressed by key", info.name),
                        pos,
                    ));
                };
                if keys.is_empty() {
                    return Err(Diagnostic::range("empty key set", pos));
                }
                let mut slots = SlotSet::new();
                for key in keys {
                    if key.element_type() != key_type {
                        return Err(Diagnostic::type_mismatch(
                            key_type,
                            key.element_type(),
                            format!("key {} does not match the key type of '{}'", key, info.name),
                            pos,
                        ));
                    }
                    match info.content.position_of(key) {
                        Some(p) => slots.insert(p),
                        None => {
                            return Err(Diagnostic::range(
                                format!("key {} is not present in '{}'", key, info.name),
                                pos,
                            ))
                        }
                    }
                }
                Ok(slots)
            }
        }
    }

    fn declare(
        &mut self,
        container: &StackStr,
        element: ElementType,
        key: Option<ElementType>,
        mode: OwnershipMode,
        pos: Pos,
    ) -> Result<Annotation, Diagnostic> {
        let id = self
            .registry
            .register(&mut self.scopes, container, element, key, mode, pos)?;
        log::debug!("declare {} '{}': {} {}", id, container, element, mode);
        Ok(self.describe(id, None))
    }

    fn bind(
        &mut self,
        binding: &StackStr,
        container: &StackStr,
        perspective: Option<Perspective>,
        pos: Pos,
    ) -> Result<Annotation, Diagnostic> {
        self.bindings.ensure_free(&self.scopes, binding, pos)?;
        match self.check_bind(container, perspective, pos) {
            Ok(id) => {
                let b = self.bindings.declare(
                    &mut self.scopes,
                    binding,
                    Referent::Direct(id),
                    perspective.unwrap_or_default(),
                    pos,
                )?;
                Ok(self.describe(id, Some(b)))
            }
            Err(diagnostic) => {
                self.bindings
                    .declare(&mut self.scopes, binding, Referent::Poisoned, Perspective::default(), pos)?;
                Err(diagnostic)
            }
        }
    }

    fn check_bind(&self, container: &str, perspective: Option<Perspective>, pos: Pos) -> Result<ContainerId, Diagnostic> {
        let id = self.registry.lookup(&self.scopes, container, pos)?;
        let info = self.registry.get(id);
        info.ensure_usable(pos)?;
        if perspective == Some(Perspective::Hashed) && !info.is_keyed() {
            return Err(Diagnostic::perspective(
                format!("'{}' has no key type and cannot be bound with the hashed perspective", info.name),
                pos,
            ));
        }
        Ok(id)
    }

    /// Removal positions of a pop under the binding's perspective.
    fn removal(&self, access: &Access, extent: Option<&Extent>, pos: Pos) -> Result<SlotSet, Diagnostic> {
        let info = self.registry.get(access.container);
        let perspective = self.bindings.get(access.binding).perspective.current();
        match extent {
            None if perspective == Perspective::Hashed => Err(Diagnostic::range(
                format!("a pop from '{}' under the hashed perspective needs a key extent", info.name),
                pos,
            )),
            None => {
                if info.is_empty() {
                    return Err(Diagnostic::range(format!("cannot pop from empty container '{}'", info.name), pos));
                }
                Ok(SlotSet::singleton(info.len() - 1))
            }
            Some(extent @ Extent::Range { .. }) => {
                if perspective == Perspective::Hashed {
                    return Err(Diagnostic::range(
                        "range extents are not valid under the hashed perspective; pop by key",
                        pos,
                    ));
                }
                self.resolve_extent(info, extent, pos)
            }
            Some(extent @ Extent::Keys(_)) => {
                if perspective != Perspective::Hashed {
                    return Err(Diagnostic::range(
                        format!("key extents need the hashed perspective, but the binding is {}", perspective),
                        pos,
                    ));
                }
                self.resolve_extent(info, extent, pos)
            }
        }
    }

    fn pop(&mut self, binding: &str, extent: Option<&Extent>, pos: Pos) -> Result<Annotation, Diagnostic> {
        let Some(access) = self.access(binding, pos)? else {
            return Ok(self.base());
        };
        self.writable(&access, "pop from", pos)?;
        let removed = self.removal(&access, extent, pos)?;
        let info = self.registry.get(access.container);
        let lowest = removed.min().unwrap_or(0);
        let footprint = SlotSet::range(lowest, info.len().saturating_sub(1));

        if let Some(record) = access.view.and_then(|r| self.ledger.get(r)) {
            if !record.slots.covers(&removed) {
                return Err(Diagnostic::ownership(
                    format!(
                        "pop through view '{}' reaches outside its borrowed extent {}",
                        binding, record.extent
                    ),
                    pos,
                )
                .with_related(record.pos, "borrowed here"));
            }
        }
        if info.mode.is_ledgered() {
            self.ledger
                .check_write(access.container, &footprint, access.view)
                .map_err(|c| self.conflict(c, format!("pop from '{}'", info.name), pos))?;
        }

        // commit
        let positions: Vec<usize> = removed.iter_ones().collect();
        let slots = self.registry.get_mut(access.container).content.remove(&positions);
        if let Some(view) = access.view {
            if let Some(record) = self.ledger.get(view) {
                let rebased = record.slots.compact(&removed);
                self.ledger.rebase(view, rebased);
            }
        }
        let mut annotation = self.describe_access(&access);
        annotation.values = slots.into_iter().map(|s| s.value).collect();
        Ok(annotation)
    }

    fn peek(&mut self, binding: &str, extent: Option<&Extent>, pos: Pos) -> Result<Annotation, Diagnostic> {
        let Some(access) = self.access(binding, pos)? else {
            return Ok(self.base());
        };
        let info = self.registry.get(access.container);
        info.ensure_usable(pos)?;
        let perspective = self.bindings.get(access.binding).perspective.current();
        let slots = match extent {
            None if perspective == Perspective::Hashed => {
                return Err(Diagnostic::range(
                    format!("a peek into '{}' under the hashed perspective needs a key extent", info.name),
                    pos,
                ));
            }
            None => {
                if info.is_empty() {
                    return Err(Diagnostic::range(format!("cannot peek into empty container '{}'", info.name), pos));
                }
                SlotSet::singleton(info.len() - 1)
            }
            Some(extent) => self.resolve_extent(info, extent, pos)?,
        };
        if let Some(record) = access.view.and_then(|r| self.ledger.get(r)) {
            if !record.slots.covers(&slots) {
                return Err(Diagnostic::range(
                    format!("peek through view '{}' reaches outside its borrowed extent {}", binding, record.extent),
                    pos,
                ));
            }
        }
        if info.mode.is_ledgered() {
            self.ledger
                .check_read(access.container, &slots, access.view)
                .map_err(|c| self.conflict(c, format!("read of '{}'", info.name), pos))?;
        }
        let values = slots
            .iter_ones()
            .map(|p| info.content.get(p).and_then(|s| s.value.clone()))
            .collect();
        let mut annotation = self.describe_access(&access);
        annotation.values = values;
        Ok(annotation)
    }

    fn borrow(
        &mut self,
        name: &StackStr,
        source: &str,
        extent: &Extent,
        mode: BorrowMode,
        pos: Pos,
    ) -> Result<Annotation, Diagnostic> {
        self.bindings.ensure_free(&self.scopes, name, pos)?;
        match self.try_borrow(source, extent, mode, pos) {
            Ok(Some((record, container))) => {
                let b = self
                    .bindings
                    .declare(&mut self.scopes, name, Referent::View(record), Perspective::default(), pos)?;
                self.ledger.set_holder(record, b);
                let mut annotation = self.describe(container, Some(b));
                annotation.record = Some(record);
                Ok(annotation)
            }
            Ok(None) => {
                self.bindings
                    .declare(&mut self.scopes, name, Referent::Poisoned, Perspective::default(), pos)?;
                Ok(self.base())
            }
            Err(diagnostic) => {
                self.bindings
                    .declare(&mut self.scopes, name, Referent::Poisoned, Perspective::default(), pos)?;
                Err(diagnostic)
            }
        }
    }

    fn try_borrow(
        &mut self,
        source: &str,
        extent: &Extent,
        mode: BorrowMode,
        pos: Pos,
    ) -> Result<Option<(RecordId, ContainerId)>, Diagnostic> {
        let Some(access) = self.access(source, pos)? else {
            return Ok(None);
        };
        let info = self.registry.get(access.container);
        info.ensure_usable(pos)?;
        if mode.is_mutable() && !info.mode.can_borrow_mut() {
            return Err(Diagnostic::ownership(
                format!("cannot borrow '{}' mutably: the container is {}", info.name, info.mode),
                pos,
            ));
        }
        let slots = self.resolve_extent(info, extent, pos)?;
        if let Some(parent) = access.view.and_then(|r| self.ledger.get(r)) {
            if !parent.slots.covers(&slots) {
                return Err(Diagnostic::range(
                    format!("{} lies outside the extent {} of view '{}'", extent, parent.extent, source),
                    pos,
                ));
            }
            if mode.is_mutable() && !parent.mode.is_mutable() {
                return Err(Diagnostic::ownership(
                    format!("cannot borrow mutably through read-only view '{}'", source),
                    pos,
                )
                .with_related(parent.pos, "borrowed read-only here"));
            }
        }
        let scope = self.scopes.current();
        if !self.scopes.outlives(info.scope, scope) {
            return Err(Diagnostic::lifetime(
                format!("borrow of '{}' would outlive the scope that owns it", info.name),
                pos,
            )
            .with_related(info.decl, "declared here"));
        }

        let ledgered = info.mode.is_ledgered();
        let action = format!("{} borrow {} of '{}'", mode, extent, info.name);
        let new = NewBorrow {
            container: access.container,
            extent: extent.clone(),
            slots,
            mode,
            scope,
            holder: None,
            pos,
        };
        let record = if ledgered {
            let result = self.ledger.borrow(new, access.view);
            result.map_err(|c| self.conflict(c, &action, pos))?
        } else {
            self.ledger.record_unchecked(new)
        };
        log::debug!("{} {} created", action, record);
        Ok(Some((record, access.container)))
    }

    fn set_perspective(&mut self, binding: &str, perspective: Perspective, pos: Pos) -> Result<Annotation, Diagnostic> {
        let Some(access) = self.access(binding, pos)? else {
            return Ok(self.base());
        };
        let keyed = self.registry.get(access.container).is_keyed();
        self.bindings
            .get_mut(access.binding)
            .perspective
            .set(perspective, keyed, pos)?;
        Ok(self.describe_access(&access))
    }

    fn flip(&mut self, binding: &str, pos: Pos) -> Result<Annotation, Diagnostic> {
        let Some(access) = self.access(binding, pos)? else {
            return Ok(self.base());
        };
        self.bindings.get_mut(access.binding).perspective.flip(pos)?;
        Ok(self.describe_access(&access))
    }

    fn match_perspective(
        &mut self,
        binding: &str,
        arms: &[Perspective],
        default: bool,
        pos: Pos,
    ) -> Result<Annotation, Diagnostic> {
        let Some(access) = self.access(binding, pos)? else {
            return Ok(self.base());
        };
        let keyed = self.registry.get(access.container).is_keyed();
        let missing: Vec<String> = Perspective::iter()
            .filter(|p| !arms.contains(p))
            .filter(|p| *p != Perspective::Hashed || keyed)
            .map(|p| p.to_string())
            .collect();
        if !default && !missing.is_empty() {
            self.reporter
                .report(Diagnostic::exhaustiveness(binding, missing.join(", "), pos));
        }
        Ok(self.describe_access(&access))
    }

    fn enter(&mut self, kind: ScopeKind, pos: Pos) -> Result<Annotation, Diagnostic> {
        self.scopes.enter(kind, pos);
        Ok(Annotation {
            ok: true,
            ..self.base()
        })
    }

    fn exit(&mut self, pos: Pos) -> Result<Annotation, Diagnostic> {
        let annotation = Annotation {
            ok: true,
            ..self.base()
        };
        match self.scopes.exit() {
            Some(scope) => {
                self.close_scope(scope, pos);
                Ok(annotation)
            }
            None => Err(Diagnostic::malformed("scope exit without a matching scope enter", pos)),
        }
    }

    /// Human-readable dump of live containers, bindings and borrow records.
    pub fn dump_state(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "scope depth {}", self.scopes.depth());
        for scope in self.scopes.visible() {
            for (name, id) in &scope.containers {
                let info = self.registry.get(*id);
                let values: Vec<String> = info
                    .content
                    .slots()
                    .iter()
                    .map(|s| match (&s.key, &s.value) {
                        (Some(k), Some(v)) => format!("{}: {}", k, v),
                        (Some(k), None) => format!("{}: ?", k),
                        (None, Some(v)) => v.to_string(),
                        (None, None) => "?".to_string(),
                    })
                    .collect();
                let _ = writeln!(
                    out,
                    "  {} {}: {}{} {} [{}]{}",
                    scope.id,
                    name,
                    info.element,
                    info.key.map(|k| format!("[{}]", k)).unwrap_or_default(),
                    info.mode,
                    values.join(", "),
                    if info.state.is_moved() { " (moved)" } else { "" }
                );
            }
            for (name, id) in &scope.bindings {
                let binding = self.bindings.get(*id);
                let target = match binding.referent {
                    Referent::Direct(c) => self.registry.get(c).name.to_string(),
                    Referent::View(r) => r.to_string(),
                    Referent::Poisoned => "<invalid>".to_string(),
                };
                let _ = writeln!(
                    out,
                    "  {} {} -> {} ({})",
                    scope.id,
                    name,
                    target,
                    binding.perspective.current()
                );
            }
        }
        for record in self.ledger.records() {
            let _ = writeln!(
                out,
                "  {} {} {} of '{}' in {}",
                record.id,
                record.mode,
                record.extent,
                self.registry.get(record.container).name,
                record.scope
            );
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DiagnosticKind;
    use crate::op::Operand;

    fn node(op: Op, line: usize) -> OpNode {
        OpNode::new(op, Pos::new(line, 0, line * 10, 5))
    }

    fn declare(name: &str, element: ElementType, mode: OwnershipMode, line: usize) -> OpNode {
        node(
            Op::Declare {
                container: name.into(),
                element,
                key: None,
                mode,
            },
            line,
        )
    }

    fn bind(name: &str, container: &str, line: usize) -> OpNode {
        node(
            Op::Bind {
                binding: name.into(),
                container: container.into(),
                perspective: None,
            },
            line,
        )
    }

    fn push(binding: &str, value: Value, line: usize) -> OpNode {
        node(
            Op::Push {
                binding: binding.into(),
                operand: Operand::Value(value),
                key: None,
                conversion: None,
            },
            line,
        )
    }

    #[test]
    fn test_pop_reports_value() {
        let mut verifier = Verifier::new(VerifyOptions::default());
        verifier.step(&declare("X", ElementType::Integer, OwnershipMode::Owned, 1));
        verifier.step(&bind("x", "X", 2));
        verifier.step(&push("x", Value::Int(7), 3));
        assert!(verifier
            .step(&node(Op::Pop { binding: "x".into(), extent: None }, 4))
            .is_empty());
        let last = verifier.annotated().last().unwrap();
        assert_eq!(last.annotation.values, vec![Some(Value::Int(7))]);
        assert_eq!(last.annotation.len, Some(0));
    }

    #[test]
    fn test_unknown_binding_reports_once() {
        let mut verifier = Verifier::new(VerifyOptions::default());
        let diags = verifier.step(&push("nope", Value::Int(1), 1));
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].kind(), DiagnosticKind::UnknownContainerError);
    }

    #[test]
    fn test_failed_bind_poisons_the_name() {
        let mut verifier = Verifier::new(VerifyOptions::default());
        assert_eq!(verifier.step(&bind("x", "Missing", 1)).len(), 1);
        assert!(verifier.step(&push("x", Value::Int(1), 2)).is_empty());
        let program = verifier.finish();
        assert_eq!(program.diagnostics.len(), 1);
    }

    #[test]
    fn test_dump_state_lists_everything() {
        let mut verifier = Verifier::new(VerifyOptions::default());
        verifier.step(&declare("X", ElementType::Integer, OwnershipMode::Owned, 1));
        verifier.step(&bind("x", "X", 2));
        verifier.step(&push("x", Value::Int(7), 3));
        let dump = verifier.dump_state();
        assert!(dump.contains("X: integer owned [7]"));
        assert!(dump.contains("x -> X (lifo)"));
    }
}

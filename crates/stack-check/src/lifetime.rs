//! Lifetime checks.
//!
//! Scope exit releases the borrow records owned by the scope and applies each
//! declared container's exit action: owned and mutable containers are
//! destroyed, borrowed ones forgotten, shared ones deferred to teardown at the
//! end of the stream. A binding in a surviving scope that still refers to a
//! destroyed container is reported at the exit that destroyed it.
//!
//! Captures and spawns are checked here too, since both are about whether a
//! reference outlives what it points into.

use crate::binding::{BindingId, Referent};
use crate::diagnostics::Diagnostic;
use crate::op::Capture;
use crate::registry::{ContainerId, Liveness};
use crate::scope::ScopeId;
use crate::token::Pos;
use crate::verifier::{Annotation, Verifier};
use stack_val::{ExitAction, OwnershipMode};

impl Verifier {
    /// Runs the exit actions of a scope that was just popped off the tree.
    pub(crate) fn close_scope(&mut self, scope: ScopeId, pos: Pos) {
        let released = self.ledger.release_scope(scope);
        log::debug!("{} closed, {} borrow(s) released", scope, released.len());

        let declared = self.scopes.get(scope).declared.clone();
        for id in declared {
            let info = self.registry.get(id);
            if info.state.is_moved() || info.liveness != Liveness::Live {
                continue;
            }
            match info.mode.on_exit() {
                ExitAction::Destroy => {
                    log::trace!("destroy '{}'", info.name);
                    self.registry.get_mut(id).liveness = Liveness::Destroyed(pos);
                    self.report_dangling(id, pos);
                }
                ExitAction::Forget => {
                    self.registry.get_mut(id).liveness = Liveness::Forgotten(pos);
                }
                ExitAction::Defer => self.deferred.push(id),
            }
        }

        // views held outside the scope whose record just went away
        let stale: Vec<(BindingId, Pos)> = self
            .bindings
            .live(&self.scopes)
            .filter_map(|b| match b.referent {
                Referent::View(record) if released.iter().any(|r| r.id == record) => {
                    Some((b.id, b.captured_at.unwrap_or(b.decl)))
                }
                _ => None,
            })
            .collect();
        for (binding, at) in stale {
            let name = self.binding_name(binding).to_string();
            self.reporter.report(
                Diagnostic::lifetime(format!("view '{}' outlives the borrow it was captured from", name), pos)
                    .with_related(at, "captured here"),
            );
            self.bindings.poison(binding);
        }
    }

    /// Reports every surviving binding that still refers to `container`.
    fn report_dangling(&mut self, container: ContainerId, pos: Pos) {
        let dangling: Vec<(BindingId, Pos)> = self
            .bindings
            .live(&self.scopes)
            .filter(|b| b.referent == Referent::Direct(container))
            .map(|b| (b.id, b.captured_at.unwrap_or(b.decl)))
            .collect();
        let name = self.registry.get(container).name.clone();
        for (binding, at) in dangling {
            let message = format!(
                "'{}' still refers to '{}', which is destroyed when its scope exits",
                self.binding_name(binding),
                name
            );
            self.reporter
                .report(Diagnostic::lifetime(message, pos).with_related(at, "captured here"));
            self.bindings.poison(binding);
        }
    }

    /// Closes every scope left open, then the root, then tears down deferred
    /// shared containers.
    pub(crate) fn close_all(&mut self, end: Pos) {
        while let Some(scope) = self.scopes.exit() {
            log::debug!("{} left open at end of stream", scope);
            self.close_scope(scope, end);
        }
        if let Some(root) = self.scopes.close_root() {
            self.close_scope(root, end);
        }
        for id in std::mem::take(&mut self.deferred) {
            let info = self.registry.get_mut(id);
            if info.liveness == Liveness::Live {
                log::trace!("teardown '{}'", info.name);
                info.liveness = Liveness::Destroyed(end);
            }
        }
    }

    /// Re-points `target` at whatever `source` refers to.
    pub(crate) fn capture(&mut self, target: &str, source: &str, pos: Pos) -> Result<Annotation, Diagnostic> {
        let t = self.bindings.lookup(&self.scopes, target, pos)?;
        let s = self.bindings.lookup(&self.scopes, source, pos)?;
        if t == s {
            return Ok(self.base());
        }
        let referent = self.bindings.get(s).referent;
        let target_scope = self.bindings.get(t).scope;

        let container = match referent {
            Referent::Poisoned => return Ok(self.base()),
            Referent::View(record) => {
                let Some(record) = self.ledger.get(record) else {
                    return Ok(self.base());
                };
                if !self.scopes.outlives(record.scope, target_scope) {
                    return Err(Diagnostic::lifetime(
                        format!(
                            "'{}' borrows from a scope that ends before '{}' goes out of scope",
                            source, target
                        ),
                        pos,
                    )
                    .with_related(record.pos, "borrowed here"));
                }
                record.container
            }
            Referent::Direct(container) => {
                self.registry.get(container).ensure_usable(pos)?;
                container
            }
        };

        if let Some(current) = self.access_of(t) {
            let want = self.registry.get(current.container);
            let got = self.registry.get(container);
            if want.element != got.element || want.key != got.key {
                return Err(Diagnostic::type_mismatch(
                    want.element,
                    got.element,
                    format!("cannot capture '{}' into '{}': element or key types differ", source, target),
                    pos,
                ));
            }
        }

        let binding = self.bindings.get_mut(t);
        binding.referent = referent;
        binding.captured_at = Some(pos);
        let access = self.access_of(t);
        Ok(match access {
            Some(access) => self.describe_access(&access),
            None => self.base(),
        })
    }

    /// Checks what each capture hands to a new task.
    pub(crate) fn spawn(&mut self, captures: &[Capture], pos: Pos) -> Result<Annotation, Diagnostic> {
        let mut failures = Vec::new();
        let mut moves = Vec::new();
        for capture in captures {
            match self.check_spawn_capture(capture, pos) {
                Ok(Some(container)) => moves.push(container),
                Ok(None) => {}
                Err(diagnostic) => failures.push(diagnostic),
            }
        }
        let ok = failures.is_empty();
        if ok {
            for container in moves {
                log::debug!("{} moved into task", container);
                self.registry.mark_moved(container, pos);
            }
        }
        for diagnostic in failures {
            self.reporter.report(diagnostic);
        }
        Ok(Annotation { ok, ..self.base() })
    }

    /// Returns the container a `take` capture moves into the task.
    fn check_spawn_capture(&self, capture: &Capture, pos: Pos) -> Result<Option<ContainerId>, Diagnostic> {
        let binding = self.bindings.lookup(&self.scopes, &capture.binding, pos)?;
        match self.bindings.get(binding).referent {
            Referent::Poisoned => Ok(None),
            Referent::View(record) => {
                let Some(record) = self.ledger.get(record) else {
                    return Ok(None);
                };
                let info = self.registry.get(record.container);
                if info.mode == OwnershipMode::Shared && !capture.take {
                    return Ok(None);
                }
                Err(Diagnostic::lifetime(
                    format!(
                        "view '{}' into '{}' cannot cross a task boundary; capture a shared container or take ownership",
                        capture.binding, info.name
                    ),
                    pos,
                )
                .with_related(record.pos, "borrowed here"))
            }
            Referent::Direct(container) => {
                let info = self.registry.get(container);
                info.ensure_usable(pos)?;
                match (info.mode, capture.take) {
                    (OwnershipMode::Shared, false) => Ok(None),
                    (OwnershipMode::Shared, true) => Err(Diagnostic::ownership(
                        format!("shared container '{}' cannot be taken; capture it without take", info.name),
                        pos,
                    )),
                    (mode, true) if !mode.can_take() => Err(Diagnostic::ownership(
                        format!("only an owned container can be taken into a task; '{}' is {}", info.name, mode),
                        pos,
                    )),
                    (_, true) => match self.ledger.first_on(container, None) {
                        Some(record) => Err(Diagnostic::conflict(
                            format!("cannot move '{}' into a task while it is borrowed", info.name),
                            pos,
                            record.pos,
                        )),
                        None => Ok(Some(container)),
                    },
                    (mode, false) => Err(Diagnostic::lifetime(
                        format!(
                            "'{}' is {} and must be captured with take to cross a task boundary",
                            info.name, mode
                        ),
                        pos,
                    )
                    .with_related(info.decl, "declared here")),
                }
            }
        }
    }

    /// Ends a shared container's life explicitly.
    pub(crate) fn release(&mut self, binding: &str, pos: Pos) -> Result<Annotation, Diagnostic> {
        let Some(access) = self.access(binding, pos)? else {
            return Ok(self.base());
        };
        let info = self.registry.get(access.container);
        info.ensure_usable(pos)?;
        if info.mode != OwnershipMode::Shared {
            return Err(Diagnostic::ownership(
                format!("only shared containers can be released; '{}' is {}", info.name, info.mode),
                pos,
            ));
        }
        if access.view.is_some() {
            return Err(Diagnostic::ownership(
                format!("cannot release '{}' through a view", info.name),
                pos,
            ));
        }
        self.registry.get_mut(access.container).liveness = Liveness::Released(pos);
        self.deferred.retain(|c| *c != access.container);
        Ok(self.describe_access(&access))
    }
}

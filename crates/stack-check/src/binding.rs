//! Named handles onto containers.
//!
//! A binding refers either directly to a container or to a borrow record (a
//! view). Bindings whose declaration failed are kept as [`Referent::Poisoned`]
//! so later uses of the name are skipped instead of cascading into more
//! diagnostics.

use crate::diagnostics::Diagnostic;
use crate::ledger::RecordId;
use crate::perspective::PerspectiveState;
use crate::registry::ContainerId;
use crate::scope::{ScopeId, ScopeTree};
use crate::token::Pos;
use serde::{Deserialize, Serialize};
use stack_val::{Perspective, StackStr};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BindingId(pub usize);

impl fmt::Display for BindingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "binding#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Referent {
    Direct(ContainerId),
    View(RecordId),
    Poisoned,
}

#[derive(Debug, Clone)]
pub struct Binding {
    pub id: BindingId,
    pub name: StackStr,
    pub scope: ScopeId,
    pub referent: Referent,
    pub perspective: PerspectiveState,
    pub decl: Pos,
    /// Set when a capture re-pointed this binding.
    pub captured_at: Option<Pos>,
}

#[derive(Default)]
pub struct Bindings {
    bindings: Vec<Binding>,
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Checks that `name` is free in the current scope.
    pub fn ensure_free(&self, scopes: &ScopeTree, name: &str, pos: Pos) -> Result<(), Diagnostic> {
        match scopes.get(scopes.current()).bindings.get(name) {
            Some(existing) => Err(Diagnostic::duplicate(name, pos)
                .with_related(self.get(*existing).decl, "first declared here")),
            None => Ok(()),
        }
    }

    pub fn declare(
        &mut self,
        scopes: &mut ScopeTree,
        name: &StackStr,
        referent: Referent,
        perspective: Perspective,
        pos: Pos,
    ) -> Result<BindingId, Diagnostic> {
        self.ensure_free(scopes, name, pos)?;
        let id = BindingId(self.bindings.len());
        self.bindings.push(Binding {
            id,
            name: name.clone(),
            scope: scopes.current(),
            referent,
            perspective: PerspectiveState::new(perspective),
            decl: pos,
            captured_at: None,
        });
        scopes.current_mut().bindings.insert(name.clone(), id);
        Ok(id)
    }

    pub fn lookup(&self, scopes: &ScopeTree, name: &str, pos: Pos) -> Result<BindingId, Diagnostic> {
        scopes
            .find_binding(name)
            .ok_or_else(|| Diagnostic::unknown(name, pos))
    }

    pub fn get(&self, id: BindingId) -> &Binding {
        &self.bindings[id.0]
    }

    pub fn get_mut(&mut self, id: BindingId) -> &mut Binding {
        &mut self.bindings[id.0]
    }

    /// Bindings whose scope is still open.
    pub fn live<'a>(&'a self, scopes: &'a ScopeTree) -> impl Iterator<Item = &'a Binding> + 'a {
        self.bindings.iter().filter(move |b| scopes.is_open(b.scope))
    }

    pub fn poison(&mut self, id: BindingId) {
        self.bindings[id.0].referent = Referent::Poisoned;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DiagnosticKind;
    use crate::op::ScopeKind;

    #[test]
    fn test_declare_and_shadow() {
        let mut scopes = ScopeTree::new();
        let mut bindings = Bindings::new();
        let name: StackStr = "x".into();
        let outer = bindings
            .declare(&mut scopes, &name, Referent::Direct(ContainerId(0)), Perspective::Lifo, Pos::default())
            .unwrap();
        let err = bindings
            .declare(&mut scopes, &name, Referent::Direct(ContainerId(0)), Perspective::Fifo, Pos::default())
            .unwrap_err();
        assert_eq!(err.kind(), DiagnosticKind::DuplicateDeclarationError);

        scopes.enter(ScopeKind::Block, Pos::default());
        let inner = bindings
            .declare(&mut scopes, &name, Referent::Direct(ContainerId(1)), Perspective::Fifo, Pos::default())
            .unwrap();
        assert_eq!(bindings.lookup(&scopes, "x", Pos::default()).unwrap(), inner);
        assert_eq!(bindings.live(&scopes).count(), 2);
        scopes.exit();
        assert_eq!(bindings.lookup(&scopes, "x", Pos::default()).unwrap(), outer);
        assert_eq!(bindings.live(&scopes).count(), 1);
    }
}

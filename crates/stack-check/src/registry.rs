//! Type & mode registry.
//!
//! Owns every container declared in the compilation unit. Names are resolved
//! through the scope tree; the registry itself is an arena indexed by
//! [`ContainerId`].

use crate::diagnostics::Diagnostic;
use crate::scope::{ScopeId, ScopeTree};
use crate::shadow::Shadow;
use crate::token::Pos;
use serde::{Deserialize, Serialize};
use stack_val::{ElementType, MoveState, OwnershipMode, StackStr};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContainerId(pub usize);

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "container#{}", self.0)
    }
}

/// Where a container is in its life cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    Live,
    /// Destroyed at scope exit or teardown.
    Destroyed(Pos),
    /// Borrowed container whose scope exited; the data lives on elsewhere.
    Forgotten(Pos),
    /// Shared container released explicitly.
    Released(Pos),
}

#[derive(Debug, Clone)]
pub struct ContainerInfo {
    pub id: ContainerId,
    pub name: StackStr,
    pub element: ElementType,
    pub key: Option<ElementType>,
    pub mode: OwnershipMode,
    pub scope: ScopeId,
    pub decl: Pos,
    pub state: MoveState,
    pub moved_at: Option<Pos>,
    pub liveness: Liveness,
    pub content: Shadow,
}

impl ContainerInfo {
    pub fn len(&self) -> usize {
        self.content.len()
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    pub fn is_keyed(&self) -> bool {
        self.key.is_some()
    }

    /// Rejects any use of a moved, destroyed or released container.
    pub fn ensure_usable(&self, pos: Pos) -> Result<(), Diagnostic> {
        if let (MoveState::Moved, Some(at)) = (self.state, self.moved_at) {
            return Err(Diagnostic::ownership(format!("'{}' was moved and cannot be used", self.name), pos)
                .with_related(at, "moved here"));
        }
        match self.liveness {
            Liveness::Live | Liveness::Forgotten(_) => Ok(()),
            Liveness::Destroyed(at) => Err(Diagnostic::ownership(
                format!("'{}' was destroyed when its scope exited", self.name),
                pos,
            )
            .with_related(at, "destroyed here")),
            Liveness::Released(at) => Err(Diagnostic::ownership(
                format!("shared container '{}' was released", self.name),
                pos,
            )
            .with_related(at, "released here")),
        }
    }
}

#[derive(Default)]
pub struct Registry {
    containers: Vec<ContainerInfo>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a container in the current scope.
    ///
    /// A name already declared in the same scope is a duplicate, unless the
    /// earlier container was moved away: then the declaration re-initializes
    /// the name. Names from enclosing scopes are shadowed.
    pub fn register(
        &mut self,
        scopes: &mut ScopeTree,
        name: &StackStr,
        element: ElementType,
        key: Option<ElementType>,
        mode: OwnershipMode,
        pos: Pos,
    ) -> Result<ContainerId, Diagnostic> {
        if let Some(existing) = scopes.current_mut().containers.get(name.as_str()).copied() {
            let prior = &self.containers[existing.0];
            if !prior.state.is_moved() {
                return Err(Diagnostic::duplicate(name, pos).with_related(prior.decl, "first declared here"));
            }
            log::debug!("re-declaring moved container '{}'", name);
        }
        let scope = scopes.current();
        let id = ContainerId(self.containers.len());
        self.containers.push(ContainerInfo {
            id,
            name: name.clone(),
            element,
            key,
            mode,
            scope,
            decl: pos,
            state: MoveState::Available,
            moved_at: None,
            liveness: Liveness::Live,
            content: Shadow::new(),
        });
        let current = scopes.current_mut();
        current.containers.insert(name.clone(), id);
        current.declared.push(id);
        Ok(id)
    }

    pub fn lookup(&self, scopes: &ScopeTree, name: &str, pos: Pos) -> Result<ContainerId, Diagnostic> {
        scopes
            .find_container(name)
            .ok_or_else(|| Diagnostic::unknown(name, pos))
    }

    pub fn get(&self, id: ContainerId) -> &ContainerInfo {
        &self.containers[id.0]
    }

    pub fn get_mut(&mut self, id: ContainerId) -> &mut ContainerInfo {
        &mut self.containers[id.0]
    }

    pub fn mark_moved(&mut self, id: ContainerId, pos: Pos) {
        let info = &mut self.containers[id.0];
        info.state = MoveState::Moved;
        info.moved_at = Some(pos);
        info.content.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &ContainerInfo> {
        self.containers.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DiagnosticKind;
    use crate::op::ScopeKind;

    fn pos(line: usize) -> Pos {
        Pos::new(line, 0, line * 10, 1)
    }

    #[test]
    fn test_register_and_lookup() {
        let mut scopes = ScopeTree::new();
        let mut registry = Registry::new();
        let x = registry
            .register(&mut scopes, &"X".into(), ElementType::Integer, None, OwnershipMode::Owned, pos(1))
            .unwrap();
        assert_eq!(registry.lookup(&scopes, "X", pos(2)).unwrap(), x);
        let err = registry.lookup(&scopes, "Y", pos(2)).unwrap_err();
        assert_eq!(err.kind(), DiagnosticKind::UnknownContainerError);
    }

    #[test]
    fn test_duplicate_in_same_scope() {
        let mut scopes = ScopeTree::new();
        let mut registry = Registry::new();
        let name: StackStr = "X".into();
        registry
            .register(&mut scopes, &name, ElementType::Integer, None, OwnershipMode::Owned, pos(1))
            .unwrap();
        let err = registry
            .register(&mut scopes, &name, ElementType::Float, None, OwnershipMode::Owned, pos(2))
            .unwrap_err();
        assert_eq!(err.kind(), DiagnosticKind::DuplicateDeclarationError);
        assert_eq!(err.related.as_ref().map(|r| r.pos), Some(pos(1)));

        scopes.enter(ScopeKind::Block, pos(3));
        let inner = registry
            .register(&mut scopes, &name, ElementType::Float, None, OwnershipMode::Owned, pos(4))
            .unwrap();
        assert_eq!(registry.lookup(&scopes, "X", pos(5)).unwrap(), inner);
    }

    #[test]
    fn test_redeclare_after_move() {
        let mut scopes = ScopeTree::new();
        let mut registry = Registry::new();
        let name: StackStr = "S".into();
        let first = registry
            .register(&mut scopes, &name, ElementType::String, None, OwnershipMode::Owned, pos(1))
            .unwrap();
        registry.mark_moved(first, pos(2));
        assert!(registry.get(first).ensure_usable(pos(3)).is_err());
        let second = registry
            .register(&mut scopes, &name, ElementType::String, None, OwnershipMode::Owned, pos(4))
            .unwrap();
        assert_ne!(first, second);
        assert!(registry.get(second).ensure_usable(pos(5)).is_ok());
    }
}

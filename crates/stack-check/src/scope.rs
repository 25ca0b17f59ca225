//! Lexical scope tree.
//!
//! Scopes are created and closed by the operation stream in strict LIFO order,
//! so the open scopes always form a single path from the global root. Closed
//! scopes stay in the arena so that ids recorded in annotations and borrow
//! records keep resolving.

use crate::binding::BindingId;
use crate::op::ScopeKind;
use crate::registry::ContainerId;
use crate::token::Pos;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use stack_val::StackStr;
use std::fmt;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScopeId(pub usize);

impl ScopeId {
    pub const GLOBAL: ScopeId = ScopeId(0);
}

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "scope#{}", self.0)
    }
}

#[derive(Debug, Clone)]
pub struct Scope {
    pub id: ScopeId,
    pub parent: Option<ScopeId>,
    pub kind: ScopeKind,
    pub depth: usize,
    pub pos: Pos,
    pub open: bool,
    /// Visible container names. A re-declaration replaces the entry.
    pub containers: IndexMap<StackStr, ContainerId>,
    pub bindings: IndexMap<StackStr, BindingId>,
    /// Every container declared here, in declaration order, including ones
    /// whose name was later re-declared.
    pub declared: Vec<ContainerId>,
}

impl Scope {
    fn new(id: ScopeId, parent: Option<ScopeId>, kind: ScopeKind, depth: usize, pos: Pos) -> Self {
        Self {
            id,
            parent,
            kind,
            depth,
            pos,
            open: true,
            containers: IndexMap::new(),
            bindings: IndexMap::new(),
            declared: Vec::new(),
        }
    }
}

pub struct ScopeTree {
    scopes: Vec<Scope>,
    stack: Vec<ScopeId>,
}

impl ScopeTree {
    pub fn new() -> Self {
        Self {
            scopes: vec![Scope::new(ScopeId::GLOBAL, None, ScopeKind::Global, 0, Pos::default())],
            stack: vec![ScopeId::GLOBAL],
        }
    }

    pub fn enter(&mut self, kind: ScopeKind, pos: Pos) -> ScopeId {
        let parent = self.current();
        let depth = self.get(parent).depth + 1;
        let id = ScopeId(self.scopes.len());
        self.scopes.push(Scope::new(id, Some(parent), kind, depth, pos));
        self.stack.push(id);
        log::debug!("enter {} ({}) at depth {}", id, kind, depth);
        id
    }

    /// Closes the innermost open scope. The global root is only closed by
    /// [`ScopeTree::close_root`].
    pub fn exit(&mut self) -> Option<ScopeId> {
        if self.stack.len() <= 1 {
            return None;
        }
        let id = self.stack.pop()?;
        self.scopes[id.0].open = false;
        Some(id)
    }

    pub fn close_root(&mut self) -> Option<ScopeId> {
        if self.stack.len() != 1 {
            return None;
        }
        let id = self.stack.pop()?;
        self.scopes[id.0].open = false;
        Some(id)
    }

    pub fn current(&self) -> ScopeId {
        self.stack.last().copied().unwrap_or(ScopeId::GLOBAL)
    }

    pub fn depth(&self) -> usize {
        self.stack.len().saturating_sub(1)
    }

    pub fn get(&self, id: ScopeId) -> &Scope {
        &self.scopes[id.0]
    }

    pub fn get_mut(&mut self, id: ScopeId) -> &mut Scope {
        &mut self.scopes[id.0]
    }

    pub fn current_mut(&mut self) -> &mut Scope {
        let id = self.current();
        self.get_mut(id)
    }

    pub fn is_open(&self, id: ScopeId) -> bool {
        self.scopes.get(id.0).map(|s| s.open).unwrap_or(false)
    }

    /// True if `outer` lives at least as long as `inner`: it is `inner` itself
    /// or one of its ancestors.
    pub fn outlives(&self, outer: ScopeId, inner: ScopeId) -> bool {
        let mut cursor = Some(inner);
        while let Some(id) = cursor {
            if id == outer {
                return true;
            }
            cursor = self.scopes[id.0].parent;
        }
        false
    }

    /// Innermost-first walk over the open scopes.
    pub fn visible(&self) -> impl Iterator<Item = &Scope> {
        self.stack.iter().rev().map(|id| &self.scopes[id.0])
    }

    pub fn find_container(&self, name: &str) -> Option<ContainerId> {
        self.visible().find_map(|s| s.containers.get(name).copied())
    }

    pub fn find_binding(&self, name: &str) -> Option<BindingId> {
        self.visible().find_map(|s| s.bindings.get(name).copied())
    }
}

impl Default for ScopeTree {
    fn default() -> Self {
        Self::new()
    }
}

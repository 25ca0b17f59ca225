//! The operation stream consumed by the verifier.
//!
//! Front-ends lower their surface syntax into a flat list of [`OpNode`]s. Each
//! node is one checkpoint; scopes are delimited by `ScopeEnter` / `ScopeExit`
//! nodes rather than by nesting.

use crate::token::Pos;
use serde::{Deserialize, Serialize};
use stack_val::{
    BorrowMode, ConversionKind, ElementType, Extent, OwnershipMode, Perspective, StackStr, Value,
};
use strum_macros::{Display, EnumString, IntoStaticStr};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, EnumString, IntoStaticStr, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ScopeKind {
    Global,
    Function,
    #[default]
    Block,
    /// Body of a spawned task.
    Task,
}

/// Ownership effect of a container-to-container push.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, EnumString, IntoStaticStr, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Effect {
    /// Pop the source head and push it onto the target.
    #[default]
    Move,
    /// Move the whole source container into the target.
    Take,
    /// Push a read-only reference to the source head.
    Borrow,
    /// Push a mutable reference to the source head.
    BorrowMut,
}

impl Effect {
    pub fn borrow_mode(&self) -> Option<BorrowMode> {
        match self {
            Effect::Borrow => Some(BorrowMode::ReadOnly),
            Effect::BorrowMut => Some(BorrowMode::Mutable),
            _ => None,
        }
    }
}

/// What a push puts onto its target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operand {
    Value(Value),
    Binding { name: StackStr, effect: Effect },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Capture {
    pub binding: StackStr,
    #[serde(default)]
    pub take: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Op {
    Declare {
        container: StackStr,
        element: ElementType,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        key: Option<ElementType>,
        mode: OwnershipMode,
    },
    Bind {
        binding: StackStr,
        container: StackStr,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        perspective: Option<Perspective>,
    },
    Push {
        binding: StackStr,
        operand: Operand,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        key: Option<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        conversion: Option<ConversionKind>,
    },
    Pop {
        binding: StackStr,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        extent: Option<Extent>,
    },
    Peek {
        binding: StackStr,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        extent: Option<Extent>,
    },
    Borrow {
        binding: StackStr,
        source: StackStr,
        extent: Extent,
        mode: BorrowMode,
    },
    SetPerspective {
        binding: StackStr,
        perspective: Perspective,
    },
    Flip {
        binding: StackStr,
    },
    /// Re-points an existing binding at whatever `source` refers to.
    Capture {
        target: StackStr,
        source: StackStr,
    },
    Release {
        binding: StackStr,
    },
    Match {
        binding: StackStr,
        arms: Vec<Perspective>,
        #[serde(default)]
        default: bool,
    },
    ScopeEnter {
        #[serde(default)]
        kind: ScopeKind,
    },
    ScopeExit,
    Spawn {
        captures: Vec<Capture>,
    },
}

impl Op {
    pub fn name(&self) -> &'static str {
        match self {
            Op::Declare { .. } => "declare",
            Op::Bind { .. } => "bind",
            Op::Push { .. } => "push",
            Op::Pop { .. } => "pop",
            Op::Peek { .. } => "peek",
            Op::Borrow { .. } => "borrow",
            Op::SetPerspective { .. } => "perspective",
            Op::Flip { .. } => "flip",
            Op::Capture { .. } => "capture",
            Op::Release { .. } => "release",
            Op::Match { .. } => "match",
            Op::ScopeEnter { .. } => "scope_enter",
            Op::ScopeExit => "scope_exit",
            Op::Spawn { .. } => "spawn",
        }
    }
}

/// One operation with its source location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpNode {
    #[serde(flatten)]
    pub op: Op,
    #[serde(default)]
    pub pos: Pos,
}

impl OpNode {
    pub fn new(op: Op, pos: Pos) -> Self {
        Self { op, pos }
    }
}

impl From<Op> for OpNode {
    fn from(op: Op) -> Self {
        OpNode::new(op, Pos::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_shape() {
        let node = OpNode::new(
            Op::Push {
                binding: "t".into(),
                operand: Operand::Binding {
                    name: "s".into(),
                    effect: Effect::Take,
                },
                key: None,
                conversion: None,
            },
            Pos::new(3, 0, 20, 16),
        );
        let json = serde_json::to_value(&node).unwrap();
        assert_eq!(json["op"], "push");
        assert_eq!(json["operand"]["binding"]["effect"], "take");
        assert_eq!(json["pos"]["line"], 3);
        let back: OpNode = serde_json::from_value(json).unwrap();
        assert_eq!(back, node);
    }

    #[test]
    fn test_json_defaults() {
        let node: OpNode = serde_json::from_str(r#"{"op":"scope_enter"}"#).unwrap();
        assert_eq!(node.op, Op::ScopeEnter { kind: ScopeKind::Block });
        assert_eq!(node.pos, Pos::default());
        let node: OpNode =
            serde_json::from_str(r#"{"op":"bind","binding":"x","container":"X"}"#).unwrap();
        assert!(matches!(node.op, Op::Bind { perspective: None, .. }));
    }
}

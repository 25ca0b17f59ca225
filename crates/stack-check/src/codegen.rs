//! Code generator seam.
//!
//! Back-ends implement [`CodeGenerator`] and write into a [`Sink`]. They are
//! only ever handed a program without fatal diagnostics: [`emit`] refuses
//! with [`StackError::Blocked`] otherwise.

use crate::error::{StackError, StackResult};
use crate::op::{Effect, Op, OpNode, Operand, ScopeKind};
use crate::verifier::VerifiedProgram;
use stack_val::{BorrowMode, StackStr};
use std::io::Write;

pub struct Sink {
    pub name: StackStr,
    pub body: Vec<u8>,
}

impl Sink {
    pub fn new(name: impl Into<StackStr>) -> Self {
        Self {
            name: name.into(),
            body: Vec::new(),
        }
    }

    pub fn print(&mut self, data: &[u8]) -> StackResult<()> {
        self.body.write_all(data)?;
        Ok(())
    }

    pub fn println(&mut self, data: &[u8]) -> StackResult<()> {
        self.body.write_all(data)?;
        self.body.write_all(b"\n")?;
        Ok(())
    }

    pub fn done(self) -> StackResult<String> {
        String::from_utf8(self.body).map_err(|e| StackError::Msg(format!("{}: {}", self.name, e)))
    }
}

pub trait CodeGenerator {
    fn generate(&mut self, program: &VerifiedProgram, sink: &mut Sink) -> StackResult<()>;
}

/// Runs `generator` on a clean program.
pub fn emit(generator: &mut dyn CodeGenerator, program: &VerifiedProgram, sink: &mut Sink) -> StackResult<()> {
    let count = program.fatal_count();
    if count > 0 {
        log::debug!("code generation for {} blocked by {} diagnostic(s)", sink.name, count);
        return Err(StackError::Blocked { count });
    }
    generator.generate(program, sink)
}

/// The annotated stream as a JSON array.
#[derive(Default)]
pub struct JsonEmitter {
    pub pretty: bool,
}

impl CodeGenerator for JsonEmitter {
    fn generate(&mut self, program: &VerifiedProgram, sink: &mut Sink) -> StackResult<()> {
        let json = if self.pretty {
            serde_json::to_string_pretty(&program.ops)?
        } else {
            serde_json::to_string(&program.ops)?
        };
        sink.println(json.as_bytes())
    }
}

/// The stream in canonical text form.
#[derive(Default)]
pub struct TextEmitter;

impl CodeGenerator for TextEmitter {
    fn generate(&mut self, program: &VerifiedProgram, sink: &mut Sink) -> StackResult<()> {
        let nodes: Vec<OpNode> = program.ops.iter().map(|o| o.node.clone()).collect();
        sink.print(format_stream(&nodes).as_bytes())
    }
}

/// Canonical text of a stream, indented by scope depth.
pub fn format_stream(ops: &[OpNode]) -> String {
    let mut out = String::new();
    let mut depth = 0usize;
    for node in ops {
        if matches!(node.op, Op::ScopeExit) {
            depth = depth.saturating_sub(1);
        }
        out.push_str(&"    ".repeat(depth));
        out.push_str(&format_op(&node.op));
        out.push('\n');
        if matches!(node.op, Op::ScopeEnter { .. }) {
            depth += 1;
        }
    }
    out
}

pub fn format_op(op: &Op) -> String {
    match op {
        Op::Declare {
            container,
            element,
            key,
            mode,
        } => match key {
            Some(key) => format!("declare {}: {}[{}] {}", container, element, key, mode),
            None => format!("declare {}: {} {}", container, element, mode),
        },
        Op::Bind {
            binding,
            container,
            perspective,
        } => match perspective {
            Some(p) => format!("bind {} = {} {}", binding, container, p),
            None => format!("bind {} = {}", binding, container),
        },
        Op::Push {
            binding,
            operand,
            key,
            conversion,
        } => {
            let mut out = match operand {
                Operand::Value(value) => format!("push {} {}", binding, value),
                Operand::Binding {
                    name,
                    effect: Effect::Move,
                } => format!("push {} <- {}", binding, name),
                Operand::Binding { name, effect } => format!("push {} <- {} {}", binding, effect, name),
            };
            if let Some(key) = key {
                out.push_str(&format!(" key {}", key));
            }
            if let Some(kind) = conversion {
                out.push_str(&format!(" as {}", kind));
            }
            out
        }
        Op::Pop { binding, extent } => match extent {
            Some(extent) => format!("pop {} {}", binding, extent),
            None => format!("pop {}", binding),
        },
        Op::Peek { binding, extent } => match extent {
            Some(extent) => format!("peek {} {}", binding, extent),
            None => format!("peek {}", binding),
        },
        Op::Borrow {
            binding,
            source,
            extent,
            mode,
        } => format!(
            "borrow {} = {} {} {}",
            binding,
            source,
            extent,
            match mode {
                BorrowMode::ReadOnly => "read",
                BorrowMode::Mutable => "mut",
            }
        ),
        Op::SetPerspective {
            binding,
            perspective,
        } => format!("perspective {} {}", binding, perspective),
        Op::Flip { binding } => format!("flip {}", binding),
        Op::Capture { target, source } => format!("capture {} = {}", target, source),
        Op::Release { binding } => format!("release {}", binding),
        Op::Match {
            binding,
            arms,
            default,
        } => {
            let mut out = format!("match {}", binding);
            for arm in arms {
                out.push_str(&format!(" {}", arm));
            }
            if *default {
                out.push_str(" _");
            }
            out
        }
        Op::ScopeEnter { kind } => match kind {
            ScopeKind::Block => "{".to_string(),
            ScopeKind::Function => "fn {".to_string(),
            ScopeKind::Task => "task {".to_string(),
            ScopeKind::Global => "global {".to_string(),
        },
        Op::ScopeExit => "}".to_string(),
        Op::Spawn { captures } => {
            let captures: Vec<String> = captures
                .iter()
                .map(|c| {
                    if c.take {
                        format!("take {}", c.binding)
                    } else {
                        c.binding.to_string()
                    }
                })
                .collect();
            format!("spawn {}", captures.join(", "))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;
    use crate::verifier::{Verifier, VerifyOptions};
    use pretty_assertions::assert_eq;

    const SOURCE: &str = "\
declare X: integer owned
bind x = X fifo
{
    push x 1
    push x 2.5 as truncate
    borrow v = x [0..1] read
    pop x
}
declare M: string[integer] mutable
bind m = M hashed
push m \"a\" key 1
push m <- take x
spawn take m
match x lifo fifo _
";

    #[test]
    fn test_text_round_trip() {
        let ops = parse(SOURCE, 0).unwrap();
        let text = format_stream(&ops);
        assert_eq!(text, SOURCE);
        let again = parse(&text, 0).unwrap();
        let a: Vec<_> = ops.iter().map(|n| &n.op).collect();
        let b: Vec<_> = again.iter().map(|n| &n.op).collect();
        assert_eq!(a, b);
    }

    #[test]
    fn test_blocked_on_fatal() {
        let ops = parse("push nowhere 1", 0).unwrap();
        let program = Verifier::verify(&ops, VerifyOptions::default());
        let mut sink = Sink::new("a.stk");
        let err = emit(&mut JsonEmitter::default(), &program, &mut sink).unwrap_err();
        assert!(matches!(err, StackError::Blocked { count: 1 }));
        assert!(sink.body.is_empty());
    }

    #[test]
    fn test_json_emitter_on_clean_program() {
        let ops = parse("declare X: integer owned\nbind x = X\npush x 4\npop x", 0).unwrap();
        let program = Verifier::verify(&ops, VerifyOptions::default());
        let mut sink = Sink::new("a.stk");
        emit(&mut JsonEmitter::default(), &program, &mut sink).unwrap();
        let json: serde_json::Value = serde_json::from_str(&sink.done().unwrap()).unwrap();
        assert_eq!(json[3]["op"], "pop");
        assert_eq!(json[3]["annotation"]["values"][0]["value"], 4);
    }
}

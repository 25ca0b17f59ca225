use super::{kinds, session, verify};
use crate::error::DiagnosticKind;
use crate::parser::parse;
use pretty_assertions::assert_eq;
use stack_val::Value;

#[test]
fn test_inner_container_captured_outward() {
    let program = verify(
        "\
declare X: int owned
bind outer = X
{
    declare Y: int owned
    bind y = Y
    capture outer = y
}
push outer 1
peek outer
",
    );
    // reported once, at the exit that destroys Y; later uses are quiet
    assert_eq!(kinds(&program), vec![DiagnosticKind::LifetimeViolationError]);
    let diagnostic = &program.diagnostics[0];
    assert_eq!(diagnostic.pos.line, 7);
    assert_eq!(diagnostic.related.as_ref().map(|r| r.pos.line), Some(6));
    assert!(!program.ops[7].annotation.ok);
}

#[test]
fn test_borrowed_container_is_forgotten() {
    let program = verify(
        "\
declare X: int borrowed
bind outer = X
{
    declare B: int borrowed
    bind b = B
    capture outer = b
}
",
    );
    assert!(kinds(&program).is_empty());
}

#[test]
fn test_shared_container_survives_its_scope() {
    let program = verify(
        "\
declare X: int shared
bind outer = X
{
    declare S: int shared
    bind s = S
    capture outer = s
}
push outer 5
peek outer
release outer
",
    );
    assert!(kinds(&program).is_empty());
    assert_eq!(program.ops[8].annotation.values, vec![Some(Value::Int(5))]);
}

#[test]
fn test_capture_needs_matching_types() {
    let program = verify(
        "\
declare X: int owned
bind x = X
declare F: float owned
bind f = F
capture x = f
capture x = x
",
    );
    assert_eq!(kinds(&program), vec![DiagnosticKind::TypeMismatchError]);
}

#[test]
fn test_borrows_end_with_their_scope() {
    let mut verifier = session(
        "\
declare X: int owned
bind x = X
push x 1
{
    borrow r = x [0..0] read
",
    );
    let node = parse("borrow w = x [0..0] mut", 0).unwrap().remove(0);
    assert_eq!(verifier.step(&node).len(), 1);
    assert!(verifier.dump_state().contains("read_only [0..0] of 'X'"));

    for line in ["}", "borrow w = x [0..0] mut", "pop w"] {
        let node = parse(line, 0).unwrap().remove(0);
        assert!(verifier.step(&node).is_empty(), "{}", line);
    }
    let program = verifier.finish();
    assert_eq!(kinds(&program), vec![DiagnosticKind::BorrowConflictError]);
}

#[test]
fn test_unbalanced_scopes() {
    let program = verify(
        "\
}
fn {
    declare X: int owned
    bind x = X
    push x 1
",
    );
    assert_eq!(kinds(&program), vec![DiagnosticKind::MalformedStreamError]);
    assert_eq!(program.ops[1].annotation.depth, 1);
    assert_eq!(program.ops[4].annotation.depth, 1);
}

#[test]
fn test_release_rules() {
    let program = verify(
        "\
declare S: int shared
bind s = S
push s 1
release s
release s
push s 2
declare O: int owned
bind o = O
release o
",
    );
    assert_eq!(
        kinds(&program),
        vec![
            DiagnosticKind::OwnershipViolationError,
            DiagnosticKind::OwnershipViolationError,
            DiagnosticKind::OwnershipViolationError,
        ]
    );
    assert_eq!(program.diagnostics[0].related.as_ref().map(|r| r.pos.line), Some(4));
}

#[test]
fn test_spawn_captures() {
    let program = verify(
        "\
declare S: int shared
bind s = S
declare O: int owned
bind o = O
push o 1
spawn s, take o
push o 2
spawn take s
declare M: int mutable
bind m = M
spawn m
spawn take m
",
    );
    assert_eq!(
        kinds(&program),
        vec![
            DiagnosticKind::OwnershipViolationError,
            DiagnosticKind::OwnershipViolationError,
            DiagnosticKind::LifetimeViolationError,
            DiagnosticKind::OwnershipViolationError,
        ]
    );
    assert!(program.ops[5].annotation.ok);
    assert_eq!(program.diagnostics[0].pos.line, 7);
    assert_eq!(program.diagnostics[0].related.as_ref().map(|r| r.pos.line), Some(6));
    // the mutable container crossing without take points at its declaration
    assert_eq!(program.diagnostics[2].pos.line, 11);
    assert_eq!(program.diagnostics[2].related.as_ref().map(|r| r.pos.line), Some(9));
}

#[test]
fn test_spawn_of_borrowed_owner() {
    let program = verify(
        "\
declare P: int owned
bind p = P
push p 1
borrow r = p [0..0] read
spawn take p
declare S: int shared
bind s = S
push s 1
borrow sv = s [0..0] read
spawn sv
",
    );
    assert_eq!(kinds(&program), vec![DiagnosticKind::BorrowConflictError]);
    assert_eq!(program.diagnostics[0].related.as_ref().map(|r| r.pos.line), Some(4));
}

#[test]
fn test_failed_spawn_moves_nothing() {
    let program = verify(
        "\
declare O: int owned
bind o = O
declare M: int mutable
bind m = M
spawn take o, m
push o 1
",
    );
    assert_eq!(kinds(&program), vec![DiagnosticKind::LifetimeViolationError]);
    assert!(!program.ops[4].annotation.ok);
    assert_eq!(program.ops[5].annotation.len, Some(1));
}

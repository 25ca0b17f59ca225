use crate::config::Config;
use crate::error::StackError;
use crate::repl::Session;

fn session() -> Session {
    Session::new(Config {
        color: false,
        file_history: false,
        ..Config::default()
    })
}

#[test]
fn test_eval_line_by_line() {
    let mut s = session();
    for line in ["declare X: int owned", "bind x = X", "push x 1", "borrow r = x [0..0] read"] {
        assert_eq!(s.eval(line).unwrap(), "", "{}", line);
    }
    let out = s.eval("pop x").unwrap();
    assert!(out.contains("stack_borrow_E0401"));
    assert!(out.contains("[<repl>:"), "{}", out);
    // the conflicting borrow was entered on an earlier line
    assert!(out.contains("conflicting borrow created here"), "{}", out);
    assert!(out.contains("borrow r = x [0..0] read"), "{}", out);
    assert_eq!(s.buffer().lines().count(), 5);
    let conflict = &s.verifier().diagnostics()[0];
    assert_eq!(conflict.pos.line, 5);
    assert_eq!(conflict.related.as_ref().map(|r| r.pos.line), Some(4));
    assert_eq!(s.verifier().diagnostics().len(), 1);
    assert!(s.verifier().dump_state().contains("x -> X (lifo)"));
}

#[test]
fn test_eval_parse_error() {
    let mut s = session();
    assert!(matches!(s.eval("declare X int"), Err(StackError::Parse(_))));
    assert!(s.verifier().diagnostics().is_empty());
}

#[test]
fn test_reset() {
    let mut s = session();
    s.eval("declare X: int owned").unwrap();
    s.reset();
    assert!(s.buffer().is_empty());
    assert_eq!(s.eval("declare X: int owned").unwrap(), "");
    assert!(s.verifier().diagnostics().is_empty());
}

#[test]
fn test_load_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("setup.stk");
    std::fs::write(&path, "declare S: string owned\nbind s = S\npush s \"hi\"\n").unwrap();

    let mut s = session();
    let out = s.load(&path).unwrap();
    assert!(out.contains("loaded 3 operation(s)"));
    assert_eq!(s.eval("peek s").unwrap(), "");
    assert!(s.eval("push s 1").unwrap().contains("stack_type_E0201"));
}

#[test]
fn test_load_then_conflict_points_into_the_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("borrows.stk");
    std::fs::write(&path, "declare X: int owned\nbind x = X\npush x 1\nborrow r = x [0..0] read").unwrap();

    let mut s = session();
    assert!(s.load(&path).unwrap().contains("loaded 4 operation(s)"));
    let out = s.eval("pop x").unwrap();
    assert!(out.contains("[<repl>:"), "{}", out);
    assert!(out.contains("conflicting borrow created here"), "{}", out);
    let related = s.verifier().diagnostics()[0].related.as_ref().map(|r| r.pos.line);
    assert_eq!(related, Some(4));
}

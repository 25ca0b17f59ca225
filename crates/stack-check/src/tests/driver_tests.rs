use crate::codegen::{emit, format_stream, Sink, TextEmitter};
use crate::config::{Config, OutputFormat};
use crate::error::StackError;
use crate::parser::parse;
use crate::{annotate, check, format_source, Source, StreamFormat};
use pretty_assertions::assert_eq;
use std::path::Path;

const CONFLICT: &str = "\
declare X: int owned
bind x = X
push x 1
push x 2
push x 3
borrow r = x [0..1] read
borrow w = x [2..2] mut
borrow bad = x [1..2] mut
";

const CLEAN: &str = "\
declare X: integer owned
bind x = X
push x 1
{
    borrow r = x [0..0] read
    peek r
}
";

fn plain() -> Config {
    Config {
        color: false,
        ..Config::default()
    }
}

#[test]
fn test_check_file_and_render() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("conflict.stk");
    std::fs::write(&path, CONFLICT).unwrap();

    let source = Source::from_file(&path).unwrap();
    assert_eq!(source.format, StreamFormat::Text);
    let report = check(&source, &plain()).unwrap();
    assert!(report.has_fatal());

    let human = report.render(&plain()).unwrap();
    assert!(human.contains("stack_borrow_E0401"));
    assert!(human.contains("borrow bad = x [1..2] mut"));

    let config = Config {
        format: OutputFormat::Json,
        ..plain()
    };
    let json = report.render(&config).unwrap();
    let lines: Vec<serde_json::Value> = json.lines().map(|l| serde_json::from_str(l).unwrap()).collect();
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0]["kind"], "BorrowConflictError");
    assert_eq!(lines[0]["line"], 8);
    assert_eq!(lines[0]["related"]["line"], 6);
}

#[test]
fn test_json_stream_matches_text_stream() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("conflict.json");
    let ops = parse(CONFLICT, 0).unwrap();
    std::fs::write(&path, serde_json::to_string(&ops).unwrap()).unwrap();

    let source = Source::from_file(&path).unwrap();
    assert_eq!(source.format, StreamFormat::Json);
    let from_json = check(&source, &plain()).unwrap();
    let from_text = check(&Source::new("conflict.stk", CONFLICT, StreamFormat::Text), &plain()).unwrap();
    let kinds = |r: &crate::CheckReport| r.program.diagnostics.iter().map(|d| (d.kind(), d.pos)).collect::<Vec<_>>();
    assert_eq!(kinds(&from_json), kinds(&from_text));
}

#[test]
fn test_annotate() {
    let blocked = check(&Source::new("a.stk", CONFLICT, StreamFormat::Text), &plain()).unwrap();
    assert!(matches!(annotate(&blocked), Err(StackError::Blocked { count: 1 })));

    let clean = check(&Source::new("b.stk", CLEAN, StreamFormat::Text), &plain()).unwrap();
    let json: serde_json::Value = serde_json::from_str(&annotate(&clean).unwrap()).unwrap();
    let ops = json.as_array().unwrap();
    assert_eq!(ops.len(), 7);
    assert_eq!(ops[2]["annotation"]["len"], 1);
    assert_eq!(ops[4]["annotation"]["depth"], 1);
    assert_eq!(ops[4]["annotation"]["record"], 0);
    assert_eq!(ops[5]["annotation"]["values"][0]["value"], 1);
}

#[test]
fn test_warnings_as_errors_blocks_annotation() {
    let code = "declare X: int owned\nbind x = X\nmatch x lifo\n";
    let source = Source::new("m.stk", code, StreamFormat::Text);
    let lenient = check(&source, &plain()).unwrap();
    assert!(!lenient.has_fatal());
    assert!(annotate(&lenient).is_ok());

    let strict = Config {
        warnings_as_errors: true,
        ..plain()
    };
    let report = check(&source, &strict).unwrap();
    assert!(report.has_fatal());
    assert!(annotate(&report).is_err());
}

#[test]
fn test_parse_errors_stop_at_the_limit() {
    let code = "declare X int owned\nbind\npush x 1 2\n";
    let source = Source::new("bad.stk", code, StreamFormat::Text);
    match check(&source, &plain()) {
        Err(StackError::Parse(errors)) => assert_eq!(errors.errors.len(), 3),
        other => panic!("expected parse errors, got {:?}", other.map(|r| r.name)),
    }
    let limited = Config {
        error_limit: 1,
        ..plain()
    };
    match check(&source, &limited) {
        Err(StackError::Parse(errors)) => assert_eq!(errors.errors.len(), 1),
        other => panic!("expected parse errors, got {:?}", other.map(|r| r.name)),
    }
}

#[test]
fn test_missing_file() {
    let err = Source::from_file(Path::new("/nonexistent/stream.stk")).unwrap_err();
    assert!(matches!(err, StackError::Io(_)));
}

#[test]
fn test_format_source() {
    let messy = "declare   X :  int  owned\n{\npush x 1   as widen\n  }\n";
    let source = Source::new("f.stk", messy, StreamFormat::Text);
    let formatted = format_source(&source, &plain()).unwrap();
    assert_eq!(formatted, "declare X: integer owned\n{\n    push x 1 as widen\n}\n");
}

#[test]
fn test_text_emitter_reproduces_the_stream() {
    let ops = parse(CLEAN, 0).unwrap();
    let program = crate::Verifier::verify(&ops, Default::default());
    let mut sink = Sink::new("b.stk");
    emit(&mut TextEmitter, &program, &mut sink).unwrap();
    assert_eq!(sink.done().unwrap(), format_stream(&ops));
    assert_eq!(format_stream(&ops), CLEAN);
}

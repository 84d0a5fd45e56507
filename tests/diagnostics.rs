use quill::{Diagnostic, DiagnosticKind, Flow, Handler, Interpreter, TypeMismatch, Value};

fn failure(name: &str, source: &str) -> Diagnostic {
    let mut interpreter = Interpreter::new();
    match interpreter.execute_named(name, source) {
        Ok(outcome) => panic!("expected an error, got {outcome:?}"),
        Err(err) => err.diagnostic().cloned().expect("diagnostic error"),
    }
}

#[test]
fn rendered_report_shows_an_excerpt() {
    let diag = failure("demo.qs", "a = 1\nb = a + missing\nc = 3");
    let report = diag.excerpt.clone().expect("excerpt is rendered on abort");
    assert!(report.starts_with("NameError: undefined variable `missing`"));
    assert!(report.contains("--> demo.qs, line 2"));
    assert!(report.contains("  1 | a = 1"));
    assert!(report.contains("> 2 | b = a + missing"));
    assert!(report.contains("  3 | c = 3"));
    assert_eq!(diag.to_string(), report.trim_end());
}

#[test]
fn lex_errors_are_rendered_too() {
    let diag = failure("broken.qs", "x = `open\nmore");
    assert_eq!(diag.kind, DiagnosticKind::Lex);
    let report = diag.excerpt.expect("excerpt");
    assert!(report.contains("> 1 | x = `open"));
}

#[test]
fn strict_mode_reports_structured_fields() {
    let diag = failure("strict.qs", "__strict__ = true\ny = \"5\" * 2");
    assert_eq!(diag.kind, DiagnosticKind::Typed);
    let report = diag.excerpt.clone().expect("excerpt");
    assert!(report.contains("= expected: number"));
    assert!(report.contains("= got: string"));
    assert!(report.contains("= operator: *"));
    assert!(report.contains("= help: convert explicitly with num(...)"));
}

#[test]
fn stack_overflow_carries_a_note() {
    let diag = Diagnostic::stack_overflow(50);
    assert_eq!(diag.kind, DiagnosticKind::StackOverflow);
    let rendered = diag.render("<script>", "");
    assert!(rendered.contains("call depth exceeded 50"));
    assert!(rendered.contains("= note: check for a function that calls itself"));
}

#[test]
fn error_objects_expose_normalized_fields() {
    let diag = Diagnostic::new(DiagnosticKind::Typed, "bad operand")
        .with_line(4)
        .with_mismatch(TypeMismatch {
            expected: "number".to_string(),
            got: "string".to_string(),
            value: "\"x\"".to_string(),
            operator: "-".to_string(),
            suggestion: None,
        });
    let value = diag.to_value();
    assert_eq!(value.get_field("message"), Some(Value::string("bad operand")));
    assert_eq!(value.get_field("type"), Some(Value::string("TypedError")));
    assert_eq!(value.get_field("line"), Some(Value::Number(4.0)));
    assert_eq!(value.get_field("raw"), Some(Value::string("bad operand")));
    assert_eq!(value.get_field("expected"), Some(Value::string("number")));
    assert_eq!(value.get_field("operator"), Some(Value::string("-")));
    assert_eq!(value.get_field("suggestion"), None);
}

#[test]
fn at_line_keeps_the_innermost_location() {
    let diag = Diagnostic::new(DiagnosticKind::Name, "x").with_line(7).at_line(2);
    assert_eq!(diag.line, Some(7));
}

#[test]
fn display_without_excerpt_is_a_single_line() {
    let diag = Diagnostic::new(DiagnosticKind::Type, "cannot index into null").with_line(3);
    assert_eq!(diag.to_string(), "TypeError: cannot index into null (line 3)");
}

fn interpreter_with_include() -> Interpreter {
    let mut interpreter = Interpreter::new();
    interpreter.register_handler(
        "include",
        Handler::function(|interp, args, scope| {
            let text = args.first().and_then(Value::as_str).unwrap_or_default().to_string();
            match interp.execute_nested("lib.qs", &text, scope)? {
                Flow::Suspend(marker) => Ok(marker.into()),
                _ => Ok(Value::Null),
            }
        }),
    );
    interpreter
}

#[test]
fn nested_sources_share_the_calling_scope() {
    let mut interpreter = interpreter_with_include();
    interpreter
        .execute("include(\"shared = 40\")\ntotal = shared + 2")
        .expect("run");
    assert_eq!(interpreter.get_global("total"), Some(Value::Number(42.0)));
}

#[test]
fn errors_in_nested_sources_point_at_that_source() {
    let mut interpreter = interpreter_with_include();
    let err = interpreter
        .execute_named("main.qs", "a = 1\ninclude(\"x = 1\\ny = nope\")")
        .expect_err("nested error propagates");
    let diag = err.diagnostic().expect("diagnostic error");
    assert_eq!(diag.source.as_deref(), Some("lib.qs"));
    assert_eq!(diag.line, Some(2));
    let report = diag.excerpt.clone().expect("excerpt");
    assert!(report.contains("--> lib.qs, line 2"));
    assert!(report.contains("> 2 | y = nope"));
    assert!(interpreter.execution_state().source_text("lib.qs").is_some());
}

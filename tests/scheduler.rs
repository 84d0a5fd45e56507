use std::{cell::Cell, rc::Rc, time::Duration};

use quill::{DiagnosticKind, Handler, Interpreter, RunOutcome, Value};

/// Interpreter with `suspendNow()` (pauses without a wake-up time) and
/// `mark()` (counts its calls) registered.
fn interpreter_with_probes() -> (Interpreter, Rc<Cell<usize>>) {
    let marks = Rc::new(Cell::new(0));
    let counter = Rc::clone(&marks);
    let mut interpreter = Interpreter::new();
    interpreter.register_handler(
        "suspendNow",
        Handler::function(|interp, _, _| Ok(interp.suspend().into())),
    );
    interpreter.register_handler(
        "mark",
        Handler::function(move |_, _, _| {
            counter.set(counter.get() + 1);
            Ok(Value::Null)
        }),
    );
    (interpreter, marks)
}

fn expect_paused(outcome: quill::Result<RunOutcome>) {
    match outcome {
        Ok(RunOutcome::Paused) => {}
        Ok(other) => panic!("expected the run to pause, got {other:?}"),
        Err(err) => panic!("run failed: {err}"),
    }
}

#[test]
fn suspension_unwinds_through_calls_branches_and_spreads() {
    let (mut interpreter, marks) = interpreter_with_probes();
    let source = r#"
        log = []
        function probe() {
            if (true) {
                return [1, ...[suspendNow()], mark()]
            }
        }
        result = probe()
        log.push("after")
    "#;
    expect_paused(interpreter.execute(source));
    assert!(interpreter.is_paused());
    assert_eq!(marks.get(), 0, "elements after the suspension must not run");
    assert!(interpreter.get_global("result").is_none());
    assert_eq!(
        interpreter.get_global("log"),
        Some(Value::array(Vec::new()))
    );

    let outcome = interpreter.resume().expect("resume");
    assert!(matches!(outcome, RunOutcome::Completed(_)));
    assert!(!interpreter.is_paused());
    assert_eq!(
        interpreter.get_global("log"),
        Some(Value::array(vec![Value::string("after")]))
    );
    assert_eq!(marks.get(), 0);
}

#[test]
fn suspension_skips_remaining_call_arguments() {
    let (mut interpreter, marks) = interpreter_with_probes();
    expect_paused(interpreter.execute("len([suspendNow(), mark()])\nmark()"));
    assert_eq!(marks.get(), 0);
    interpreter.resume().expect("resume");
    assert_eq!(marks.get(), 1);
}

#[test]
fn suspension_in_an_assignment_target_pauses_the_run() {
    let (mut interpreter, marks) = interpreter_with_probes();
    let source = "items = [0]\nitems[suspendNow()] = mark()\nsuspendNow().field = mark()\nmark()";
    expect_paused(interpreter.execute(source));
    assert_eq!(marks.get(), 0, "the assigned value must not be evaluated");
    assert_eq!(
        interpreter.get_global("items"),
        Some(Value::array(vec![Value::Number(0.0)]))
    );

    expect_paused(interpreter.resume());
    assert_eq!(marks.get(), 0);
    let outcome = interpreter.resume().expect("resume");
    assert!(matches!(outcome, RunOutcome::Completed(_)));
    assert_eq!(marks.get(), 1);
}

#[test]
fn wait_records_a_wake_up_time() {
    let mut interpreter = Interpreter::new();
    expect_paused(interpreter.execute("a = 1\nwait(25)\nb = 2"));
    assert_eq!(interpreter.pending_wake(), Some(Duration::from_millis(25)));
    assert_eq!(interpreter.get_global("a"), Some(Value::Number(1.0)));
    assert!(interpreter.get_global("b").is_none());
    assert_eq!(interpreter.execution_state().remaining(), 1);

    let outcome = interpreter.resume().expect("resume");
    assert_eq!(outcome.value(), Some(&Value::Number(2.0)));
    assert_eq!(interpreter.pending_wake(), None);
    assert_eq!(interpreter.get_global("b"), Some(Value::Number(2.0)));
}

#[test]
fn pause_inside_a_loop_resumes_after_the_loop() {
    let mut interpreter = Interpreter::new();
    let source = r#"
        count = 0
        while (count < 10) {
            count++
            if (count == 3) { pause() }
        }
        after = count
    "#;
    expect_paused(interpreter.execute(source));
    assert_eq!(interpreter.get_global("count"), Some(Value::Number(3.0)));
    interpreter.resume().expect("resume");
    assert_eq!(interpreter.get_global("after"), Some(Value::Number(3.0)));
}

#[test]
fn execute_discards_a_paused_run() {
    let mut interpreter = Interpreter::new();
    expect_paused(interpreter.execute("pause()\nskipped = 1"));
    let outcome = interpreter.execute("fresh = 2").expect("second run");
    assert!(matches!(outcome, RunOutcome::Completed(_)));
    assert!(interpreter.get_global("skipped").is_none());
    assert_eq!(interpreter.get_global("fresh"), Some(Value::Number(2.0)));
}

#[test]
fn suspension_skips_finally_blocks() {
    let mut interpreter = Interpreter::new();
    let source = r#"
        cleaned = false
        try {
            pause()
        } finally {
            cleaned = true
        }
    "#;
    expect_paused(interpreter.execute(source));
    interpreter.resume().expect("resume");
    assert_eq!(interpreter.get_global("cleaned"), Some(Value::Bool(false)));
}

#[test]
fn top_level_return_ends_the_run() {
    let mut interpreter = Interpreter::new();
    let outcome = interpreter
        .execute("x = 1\nreturn x + 1\ny = 2")
        .expect("run");
    assert_eq!(outcome.value(), Some(&Value::Number(2.0)));
    assert!(interpreter.get_global("y").is_none());
}

#[test]
fn errors_discard_the_rest_of_the_run() {
    let mut interpreter = Interpreter::new();
    let err = interpreter
        .execute("a = 1\nundefinedThing\nb = 2")
        .expect_err("undefined name");
    assert_eq!(err.kind(), Some(DiagnosticKind::Name));
    assert_eq!(err.diagnostic().and_then(|diag| diag.line), Some(2));
    assert_eq!(interpreter.execution_state().remaining(), 0);

    let outcome = interpreter.resume().expect("nothing left to run");
    assert_eq!(outcome.value(), Some(&Value::Null));
    assert!(interpreter.get_global("b").is_none());
}

#[test]
fn error_handler_can_swallow_uncaught_errors() {
    let mut interpreter = Interpreter::new();
    let source = r#"
        seen = null
        onError(function(err) { seen = err.message; return true })
        missing()
        after = 1
    "#;
    match interpreter.execute(source).expect("handled") {
        RunOutcome::Handled(diag) => assert_eq!(diag.kind, DiagnosticKind::Name),
        other => panic!("expected Handled, got {other:?}"),
    }
    assert_eq!(
        interpreter.get_global("seen"),
        Some(Value::string("undefined function `missing`"))
    );
    assert!(interpreter.get_global("after").is_none());

    // The handler stays installed for later runs.
    let outcome = interpreter.execute("alsoMissing").expect("handled again");
    assert!(matches!(outcome, RunOutcome::Handled(_)));
}

#[test]
fn error_handler_returning_false_propagates() {
    let mut interpreter = Interpreter::new();
    let source = r#"
        calls = 0
        onError(function(err) { calls = calls + 1 })
        missing
    "#;
    let err = interpreter.execute(source).expect_err("not handled");
    assert_eq!(err.kind(), Some(DiagnosticKind::Name));
    assert_eq!(interpreter.get_global("calls"), Some(Value::Number(1.0)));
}

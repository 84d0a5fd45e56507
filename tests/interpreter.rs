use std::{cell::Cell, rc::Rc};

use quill::{
    ast::{ExtensionNode, NodePart, StmtKind},
    DiagnosticKind, Flow, Handler, Interpreter, QuillError, RunOutcome, RuntimeConfig,
    ScopePolicy, TokenKind, Value,
};

fn run(source: &str) -> Interpreter {
    let mut interpreter = Interpreter::new();
    match interpreter.execute(source) {
        Ok(RunOutcome::Completed(_)) => interpreter,
        Ok(other) => panic!("expected the script to complete, got {other:?}"),
        Err(err) => panic!("script failed: {err}"),
    }
}

fn eval(source: &str) -> Value {
    let mut interpreter = Interpreter::new();
    match interpreter.execute(source) {
        Ok(RunOutcome::Completed(value)) => value,
        Ok(other) => panic!("expected a value, got {other:?}"),
        Err(err) => panic!("script failed: {err}"),
    }
}

fn eval_error(source: &str) -> QuillError {
    let mut interpreter = Interpreter::new();
    match interpreter.execute(source) {
        Ok(outcome) => panic!("expected an error, got {outcome:?}"),
        Err(err) => err,
    }
}

fn global(interpreter: &Interpreter, name: &str) -> Value {
    interpreter
        .get_global(name)
        .unwrap_or_else(|| panic!("global `{name}` is not defined"))
}

fn numbers(values: &[f64]) -> Value {
    Value::array(values.iter().copied().map(Value::Number).collect())
}

#[test]
fn evaluates_basic_arithmetic() {
    assert_eq!(eval("2 + 2"), Value::Number(4.0));
    assert_eq!(eval("10 - 4 * 2"), Value::Number(2.0));
    assert_eq!(eval("(10 - 4) * 2"), Value::Number(12.0));
    assert_eq!(eval("7 % 4"), Value::Number(3.0));
}

#[test]
fn classic_for_loop_leaves_counter_in_scope() {
    let interpreter = run(
        r#"
        sum = 0
        for (i = 0; i < 5; i = i + 1) {
            sum = sum + i
        }
        "#,
    );
    assert_eq!(global(&interpreter, "sum"), Value::Number(10.0));
    assert_eq!(global(&interpreter, "i"), Value::Number(5.0));
}

#[test]
fn for_of_iterates_arrays_and_honors_break() {
    let interpreter = run(
        r#"
        seen = []
        for (item of [1, 2, 3, 4]) {
            if (item == 3) { break }
            seen.push(item)
        }
        "#,
    );
    assert_eq!(global(&interpreter, "seen"), numbers(&[1.0, 2.0]));
}

#[test]
fn while_loop_with_continue() {
    let interpreter = run(
        r#"
        n = 0
        odd = 0
        while (n < 6) {
            n++
            if (n % 2 == 0) { continue }
            odd += n
        }
        "#,
    );
    assert_eq!(global(&interpreter, "odd"), Value::Number(9.0));
}

#[test]
fn assignment_mutates_the_scope_that_owns_the_name() {
    let interpreter = run(
        r#"
        counter = 0
        function bump() { counter = counter + 1 }
        bump()
        bump()
        "#,
    );
    assert_eq!(global(&interpreter, "counter"), Value::Number(2.0));
}

#[test]
fn assignment_to_unknown_name_stays_in_the_function() {
    let interpreter = run(
        r#"
        function make() { fresh = 42 }
        make()
        "#,
    );
    assert!(interpreter.get_global("fresh").is_none());
}

#[test]
fn equality_does_not_coerce() {
    assert_eq!(eval(r#"1 == "1""#), Value::Bool(false));
    assert_eq!(eval("1 === 1"), Value::Bool(true));
    assert_eq!(eval("[1] == [1]"), Value::Bool(false));
    assert_eq!(eval("a = [1]\na == a"), Value::Bool(false));
    assert_eq!(eval("a = [1]\na === a"), Value::Bool(true));
    assert_eq!(eval("null == null"), Value::Bool(true));
}

#[test]
fn truthiness_and_short_circuit() {
    assert_eq!(eval(r#"0 || "fallback""#), Value::string("fallback"));
    assert_eq!(eval(r#""" && missing()"#), Value::string(""));
    assert_eq!(eval("[] ? 1 : 2"), Value::Number(1.0));
    assert_eq!(eval("!null"), Value::Bool(true));
}

#[test]
fn non_strict_arithmetic_coerces_strings() {
    assert_eq!(eval(r#""5" - 2"#), Value::Number(3.0));
    assert_eq!(eval(r#""a" + 1"#), Value::string("a1"));
}

#[test]
fn strict_mode_raises_typed_error() {
    let err = eval_error("__strict__ = true\nx = 1 + \"a\"");
    let diag = err.diagnostic().expect("diagnostic");
    assert_eq!(diag.kind, DiagnosticKind::Typed);
    assert_eq!(diag.line, Some(2));
    let mismatch = diag.mismatch.as_ref().expect("mismatch details");
    assert_eq!(mismatch.expected, "string");
    assert_eq!(mismatch.got, "number");
    assert_eq!(mismatch.operator, "+");
}

#[test]
fn strict_mode_checks_every_arithmetic_operator() {
    for op in ["-", "*", "/", "%"] {
        let err = eval_error(&format!("__strict__ = true\nx = 8 {op} \"2\""));
        let diag = err.diagnostic().expect("diagnostic");
        assert_eq!(diag.kind, DiagnosticKind::Typed);
        let mismatch = diag.mismatch.as_ref().expect("mismatch details");
        assert_eq!(mismatch.expected, "number");
        assert_eq!(mismatch.got, "string");
        assert_eq!(mismatch.operator, op);
    }
}

#[test]
fn non_numeric_strings_fail_arithmetic() {
    let err = eval_error(r#"x = "abc" - 1"#);
    assert_eq!(err.kind(), Some(DiagnosticKind::Type));
    let diag = err.diagnostic().expect("diagnostic");
    assert!(diag.message.contains("cannot convert string"), "{}", diag.message);
    assert!(diag.message.contains("`-`"));
}

#[test]
fn bigint_arithmetic_stays_exact() {
    let value = eval("9007199254740993n * 2n");
    assert_eq!(format!("{value:?}"), "18014398509481986n");
    assert_eq!(eval_error("1n + 1").kind(), Some(DiagnosticKind::Type));
}

#[test]
fn template_literals_interpolate_expressions() {
    let value = eval(
        r#"
        name = "Ada"
        `Hello ${name}, ${1 + 2}!`
        "#,
    );
    assert_eq!(value, Value::string("Hello Ada, 3!"));
}

#[test]
fn functions_support_defaults_and_rest_parameters() {
    let value = eval(
        r#"
        function collect(first, second = 10, ...rest) {
            return [first, second, len(rest)]
        }
        collect(1)
        "#,
    );
    assert_eq!(value, numbers(&[1.0, 10.0, 0.0]));
    let value = eval(
        r#"
        function collect(first, second = 10, ...rest) { return rest }
        collect(1, 2, 3, 4)
        "#,
    );
    assert_eq!(value, numbers(&[3.0, 4.0]));
}

#[test]
fn arrow_functions_and_array_methods() {
    assert_eq!(
        eval("[1, 2, 3].map(x => x * 2)"),
        numbers(&[2.0, 4.0, 6.0])
    );
    assert_eq!(
        eval("[1, 2, 3, 4].filter((x) => { return x % 2 == 0 })"),
        numbers(&[2.0, 4.0])
    );
    assert_eq!(eval(r#"["a", "b"].join("-")"#), Value::string("a-b"));
    assert_eq!(eval("[1, 2, 3].length"), Value::Number(3.0));
}

#[test]
fn dual_handlers_work_as_function_and_method() {
    assert_eq!(eval(r#""abc".upper()"#), Value::string("ABC"));
    assert_eq!(eval(r#"upper("abc")"#), Value::string("ABC"));
    assert_eq!(eval(r#"trim("  x ")"#), Value::string("x"));
}

#[test]
fn objects_spread_and_index() {
    let interpreter = run(
        r#"
        base = { a: 1, b: 2 }
        merged = { ...base, b: 3, 4: "four" }
        first = merged["a"]
        numeric = merged[4]
        merged.c = first + merged.b
        "#,
    );
    let merged = global(&interpreter, "merged");
    assert_eq!(merged.get_field("b"), Some(Value::Number(3.0)));
    assert_eq!(merged.get_field("c"), Some(Value::Number(4.0)));
    assert_eq!(global(&interpreter, "numeric"), Value::string("four"));
}

#[test]
fn array_assignment_past_the_end_pads_with_null() {
    let value = eval("items = [1]\nitems[3] = 4\nitems");
    assert_eq!(
        value,
        Value::array(vec![
            Value::Number(1.0),
            Value::Null,
            Value::Null,
            Value::Number(4.0),
        ])
    );
}

#[test]
fn array_assignment_far_past_the_end_is_a_type_error() {
    for index in ["1e300", "1e12"] {
        let err = eval_error(&format!("items = []\nitems[{index}] = 1"));
        assert_eq!(err.kind(), Some(DiagnosticKind::Type));
        let diag = err.diagnostic().expect("diagnostic");
        assert!(diag.message.contains("too far past the end"), "{}", diag.message);
    }
    let interpreter = run("items = [1]\nitems[1000] = 2\nn = len(items)");
    assert_eq!(global(&interpreter, "n"), Value::Number(1001.0));
}

#[test]
fn compound_assignment_evaluates_its_target_once() {
    let interpreter = run(
        r#"
        calls = 0
        counts = [5]
        function slot() {
            calls = calls + 1
            return 0
        }
        counts[slot()] += 2
        counts[slot()]++
        "#,
    );
    assert_eq!(global(&interpreter, "counts"), numbers(&[8.0]));
    assert_eq!(global(&interpreter, "calls"), Value::Number(2.0));
}

#[test]
fn cyclic_containers_render_and_compare() {
    let interpreter = run(
        r#"
        a = []
        a.push(a)
        text = str(a)
        o = { name: "loop" }
        o.self = o
        shown = `${o}`
        b = []
        b.push(b)
        "#,
    );
    assert_eq!(global(&interpreter, "text"), Value::string("[[...]]"));
    assert_eq!(
        global(&interpreter, "shown"),
        Value::string("{ name: \"loop\", self: {...} }")
    );
    assert_eq!(global(&interpreter, "a"), global(&interpreter, "b"));
}

#[test]
fn try_catch_finally_runs_every_clause() {
    let interpreter = run(
        r#"
        try {
            throw "x"
        } catch (e) {
            result = e.message
        } finally {
            ran = true
        }
        "#,
    );
    assert_eq!(global(&interpreter, "result"), Value::string("x"));
    assert_eq!(global(&interpreter, "ran"), Value::Bool(true));
}

#[test]
fn catch_receives_normalized_runtime_errors() {
    let interpreter = run(
        r#"
        try {
            missing + 1
        } catch (err) {
            kind = err.type
            where = err.line
        }
        "#,
    );
    assert_eq!(global(&interpreter, "kind"), Value::string("NameError"));
    assert_eq!(global(&interpreter, "where"), Value::Number(3.0));
}

#[test]
fn thrown_objects_keep_their_payload() {
    let interpreter = run(
        r#"
        try {
            throw { message: "bad input", code: 7 }
        } catch (err) {
            message = err.message
            code = err.raw.code
        }
        "#,
    );
    assert_eq!(global(&interpreter, "message"), Value::string("bad input"));
    assert_eq!(global(&interpreter, "code"), Value::Number(7.0));
}

#[test]
fn uncaught_throw_surfaces_as_user_throw() {
    let err = eval_error(r#"throw "boom""#);
    let diag = err.diagnostic().expect("diagnostic");
    assert_eq!(diag.kind, DiagnosticKind::UserThrow);
    assert_eq!(diag.message, "boom");
}

#[test]
fn subclasses_inherit_fields_and_methods() {
    let interpreter = run(
        r#"
        class A {
            base = 1
            constructor(x) { base = x }
            describe() { return base + extra }
        }
        class B extends A {
            extra = 10
            bump() { extra = extra + 5 }
        }
        b = new B(3)
        b.bump()
        total = b.describe()
        "#,
    );
    let instance = global(&interpreter, "b");
    assert_eq!(instance.get_field("base"), Some(Value::Number(3.0)));
    assert_eq!(instance.get_field("extra"), Some(Value::Number(15.0)));
    assert_eq!(global(&interpreter, "total"), Value::Number(18.0));
}

#[test]
fn methods_can_use_this() {
    let value = eval(
        r#"
        class Point {
            x = 0
            y = 0
            constructor(x, y) {
                this.x = x
                this.y = y
            }
            sum() { return this.x + this.y }
        }
        p = new Point(2, 5)
        p.sum()
        "#,
    );
    assert_eq!(value, Value::Number(7.0));
}

#[test]
fn dynamic_scope_is_the_default() {
    let source = r#"
        x = "global"
        function show() { return x }
        function run(x) { return show() }
        run("param")
    "#;
    assert_eq!(eval(source), Value::string("param"));

    let mut lexical = Interpreter::with_config(RuntimeConfig {
        scope_policy: ScopePolicy::Lexical,
        ..RuntimeConfig::default()
    });
    let outcome = lexical.execute(source).expect("lexical run");
    assert_eq!(outcome.value(), Some(&Value::string("global")));
}

#[test]
fn infinite_recursion_is_reported() {
    let err = eval_error("function f(n) { return f(n + 1) }\nf(0)");
    let diag = err.diagnostic().expect("diagnostic");
    assert_eq!(diag.kind, DiagnosticKind::StackOverflow);
    assert!(diag.message.contains("infinite recursion"));
}

#[test]
fn self_instantiating_class_is_reported() {
    let err = eval_error("class A {\n  next = new A()\n}\nx = new A()");
    let diag = err.diagnostic().expect("diagnostic");
    assert_eq!(diag.kind, DiagnosticKind::StackOverflow);
    assert!(diag.message.contains("infinite recursion"));
}

#[test]
fn call_depth_limit_is_configurable() {
    let mut interpreter = Interpreter::with_config(RuntimeConfig {
        max_call_depth: 10,
        ..RuntimeConfig::default()
    });
    let source = r#"
        function depth(n) {
            if (n == 0) { return 0 }
            return depth(n - 1)
        }
        depth(5)
    "#;
    assert!(interpreter.execute(source).is_ok());
    let err = interpreter
        .execute("depth(20)")
        .expect_err("depth 20 exceeds the limit");
    assert_eq!(err.kind(), Some(DiagnosticKind::StackOverflow));
}

#[test]
fn undefined_names_raise_name_errors() {
    assert_eq!(eval_error("nope").kind(), Some(DiagnosticKind::Name));
    assert_eq!(eval_error("nope()").kind(), Some(DiagnosticKind::Name));
    assert_eq!(eval_error("x = null\nx.y").kind(), Some(DiagnosticKind::Type));
}

#[test]
fn globals_persist_across_executions() {
    let mut interpreter = Interpreter::new();
    interpreter.execute("total = 1").expect("first run");
    interpreter.execute("total += 41").expect("second run");
    assert_eq!(interpreter.get_global("total"), Some(Value::Number(42.0)));
}

#[test]
fn host_values_are_visible_to_scripts() {
    let mut interpreter = Interpreter::new();
    interpreter.set_global("limit", Value::Number(3.0));
    interpreter.register_handler("answer", Handler::value(Value::Number(42.0)));
    let outcome = interpreter.execute("limit + answer").expect("run");
    assert_eq!(outcome.value(), Some(&Value::Number(45.0)));
}

#[test]
fn math_value_is_installed() {
    assert_eq!(eval("Math.max(3, 9, 4)"), Value::Number(9.0));
    assert_eq!(eval("Math.floor(Math.PI)"), Value::Number(3.0));
}

#[test]
fn print_writes_to_captured_output() {
    let mut interpreter = Interpreter::new();
    interpreter.capture_output();
    interpreter
        .execute("print(\"a\", 1)\nprintln(1 + 2)")
        .expect("run");
    assert_eq!(interpreter.take_output(), "a 13\n");
}

#[test]
fn disabling_the_prelude_leaves_control_flow() {
    let mut interpreter = Interpreter::with_config(RuntimeConfig {
        prelude: false,
        ..RuntimeConfig::default()
    });
    let outcome = interpreter
        .execute("x = 0\nif (true) { x = 1 }\nx")
        .expect("control flow is always available");
    assert_eq!(outcome.value(), Some(&Value::Number(1.0)));
    let err = interpreter.execute("print(x)").expect_err("print is not installed");
    assert_eq!(err.kind(), Some(DiagnosticKind::Name));
}

#[test]
fn hosts_can_register_statement_keywords() {
    let mut interpreter = Interpreter::new();
    interpreter.register_keyword("repeat");
    interpreter.register_handler(
        "repeat",
        Handler::statement(|parser, keyword| {
            parser.expect(TokenKind::LParen, "expected `(` after `repeat`")?;
            let times = parser.parse_expression()?;
            parser.expect(TokenKind::RParen, "expected `)`")?;
            let body = parser.parse_block()?;
            let node = ExtensionNode::new("repeat")
                .part(NodePart::Expr(times))
                .part(NodePart::Block(body));
            Ok(parser.stmt(StmtKind::Extension(node), keyword.line))
        }),
    );
    interpreter.register_handler(
        "repeat",
        Handler::executor(|interp, node, scope| {
            let [NodePart::Expr(times), NodePart::Block(body)] = node.parts.as_slice() else {
                panic!("malformed repeat node");
            };
            let times = interp.evaluate(times, scope)?.as_number().unwrap_or(0.0);
            for _ in 0..times as usize {
                if let Flow::Suspend(marker) = interp.execute_block(body, scope)? {
                    return Ok(Flow::Suspend(marker));
                }
            }
            Ok(Flow::Normal(Value::Null))
        }),
    );

    let outcome = interpreter
        .execute("count = 0\nrepeat (3) { count = count + 2 }\ncount")
        .expect("run");
    assert_eq!(outcome.value(), Some(&Value::Number(6.0)));
}

#[test]
fn registered_functions_shadow_script_bindings() {
    let calls = Rc::new(Cell::new(0));
    let counter = Rc::clone(&calls);
    let mut interpreter = Interpreter::new();
    interpreter.register_handler(
        "tick",
        Handler::function(move |_, _, _| {
            counter.set(counter.get() + 1);
            Ok(Value::Null)
        }),
    );
    interpreter
        .execute("function tick() { return 1 }\ntick()\ntick()")
        .expect("run");
    assert_eq!(calls.get(), 2);
}

#[test]
fn continue_in_classic_for_still_runs_the_update() {
    let interpreter = run(
        r#"
        evens = []
        for (i = 0; i < 6; i++) {
            if (i % 2 == 1) { continue }
            evens.push(i)
        }
        "#,
    );
    assert_eq!(global(&interpreter, "evens"), numbers(&[0.0, 2.0, 4.0]));
    assert_eq!(global(&interpreter, "i"), Value::Number(6.0));
}

#[test]
fn classes_can_be_called_without_new() {
    let value = eval(
        r#"
        class Box {
            value = 1
        }
        b = Box()
        b.value
        "#,
    );
    assert_eq!(value, Value::Number(1.0));
}

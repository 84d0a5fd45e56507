use quill::{
    ast::{ExprKind, Stmt, StmtKind, UnaryOp},
    parse_source, DiagnosticKind, Interpreter,
};

/// Parses with the keywords and statement forms a default interpreter
/// installs.
fn parse(source: &str) -> Vec<Stmt> {
    let interpreter = Interpreter::new();
    parse_source(source, interpreter.registry())
        .unwrap_or_else(|diag| panic!("parse failed: {diag}"))
}

fn parse_error(source: &str) -> quill::Diagnostic {
    let interpreter = Interpreter::new();
    match parse_source(source, interpreter.registry()) {
        Ok(program) => panic!("expected a parse error, got {program:?}"),
        Err(diag) => diag,
    }
}

fn expression(stmt: &Stmt) -> &ExprKind {
    match &stmt.kind {
        StmtKind::Expr(expr) => &expr.kind,
        other => panic!("expected an expression statement, got {other:?}"),
    }
}

#[test]
fn operator_on_a_new_line_starts_a_new_statement() {
    let program = parse("a = 1\n-1");
    assert_eq!(program.len(), 2);
    assert!(matches!(program[0].kind, StmtKind::Assign { .. }));
    assert!(matches!(
        expression(&program[1]),
        ExprKind::Unary {
            op: UnaryOp::Negate,
            ..
        }
    ));
}

#[test]
fn binary_operator_on_the_same_line_continues() {
    let program = parse("total = 1 +\n2");
    assert_eq!(program.len(), 1);
}

#[test]
fn call_parentheses_must_share_the_callee_line() {
    let program = parse("f\n(1)");
    assert_eq!(program.len(), 2);
    assert!(matches!(expression(&program[0]), ExprKind::Identifier(_)));

    let program = parse("f(1)");
    assert!(matches!(expression(&program[0]), ExprKind::Call { .. }));
}

#[test]
fn return_value_must_end_its_line() {
    let diag = parse_error("function f() { return 1 2 }");
    assert_eq!(diag.kind, DiagnosticKind::Parse);
    assert!(diag.message.contains("return value"));
}

#[test]
fn bare_return_before_a_line_break() {
    let program = parse("function f() {\n  return\n  42\n}");
    let StmtKind::Function(def) = &program[0].kind else {
        panic!("expected a function declaration");
    };
    assert_eq!(def.body.len(), 2);
    assert!(matches!(def.body[0].kind, StmtKind::Return(None)));
}

#[test]
fn parenthesized_parameters_backtrack_when_not_an_arrow() {
    let program = parse("(a, b) => a + b\n(a + b)\n(a)");
    assert!(matches!(expression(&program[0]), ExprKind::Function(_)));
    assert!(matches!(expression(&program[1]), ExprKind::Binary { .. }));
    assert!(matches!(expression(&program[2]), ExprKind::Identifier(_)));
}

#[test]
fn functions_record_defaults_and_rest() {
    let program = parse("function f(a, b = 2, ...rest) { return a }");
    let StmtKind::Function(def) = &program[0].kind else {
        panic!("expected a function declaration");
    };
    assert_eq!(def.name.as_deref(), Some("f"));
    assert_eq!(def.params.len(), 2);
    assert!(def.params[1].default.is_some());
    assert_eq!(def.rest.as_deref(), Some("rest"));
}

#[test]
fn annotations_attach_to_the_next_statement() {
    let program = parse("@inline\n@hot\nfunction f() {}");
    assert_eq!(program[0].annotations, vec!["inline", "hot"]);
}

#[test]
fn class_bodies_split_fields_methods_and_constructor() {
    let program = parse(
        r#"
        class Counter extends Base {
            count = 0
            label
            constructor(start) { count = start }
            increment() { count = count + 1 }
            reset() { count = 0 }
        }
        "#,
    );
    let StmtKind::Class(def) = &program[0].kind else {
        panic!("expected a class declaration");
    };
    assert_eq!(def.name, "Counter");
    assert_eq!(def.superclass.as_deref(), Some("Base"));
    assert!(def.constructor.is_some());
    let fields: Vec<&str> = def.fields.iter().map(|(name, _)| name.as_str()).collect();
    assert_eq!(fields, vec!["count", "label"]);
    assert_eq!(def.methods.len(), 2);
}

#[test]
fn object_literals_accept_shorthand_methods_and_spreads() {
    let program = parse("o = { a: 1, 2: \"two\", greet() { return 1 }, ...rest }");
    let StmtKind::Assign { value, .. } = &program[0].kind else {
        panic!("expected an assignment");
    };
    let ExprKind::Object(entries) = &value.kind else {
        panic!("expected an object literal");
    };
    assert_eq!(entries.len(), 4);
}

#[test]
fn registered_statements_become_extension_nodes() {
    let program = parse("if (x) { y = 1 } else if (z) { y = 2 } else { y = 3 }");
    let StmtKind::Extension(node) = &program[0].kind else {
        panic!("expected an extension node");
    };
    assert_eq!(node.keyword, "if");
    assert_eq!(node.parts.len(), 5);
}

#[test]
fn for_headers_accept_both_forms() {
    let program = parse("for (i = 0; i < 3; i++) {}\nfor (item of items) {}");
    for stmt in &program {
        let StmtKind::Extension(node) = &stmt.kind else {
            panic!("expected a for statement");
        };
        assert_eq!(node.keyword, "for");
    }
    let StmtKind::Extension(classic) = &program[0].kind else {
        unreachable!()
    };
    assert_eq!(classic.parts.len(), 4);
}

#[test]
fn invalid_assignment_targets_are_rejected() {
    let diag = parse_error("1 = 2");
    assert!(diag.message.contains("invalid assignment target"));
    assert_eq!(diag.line, Some(1));
}

#[test]
fn errors_name_the_offending_token() {
    let diag = parse_error("x = (1 + )");
    assert_eq!(diag.kind, DiagnosticKind::Parse);
    assert!(diag.message.contains("found `)`"));
}

#[test]
fn statements_remember_their_line() {
    let program = parse("a = 1\n\nb = 2");
    assert_eq!(program[0].line, 1);
    assert_eq!(program[1].line, 3);
}

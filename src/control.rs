//! Control-flow statements, installed through the handler registry the same
//! way any third-party statement form would be.

use std::rc::Rc;

use crate::{
    ast::{ExtensionNode, NodePart, Stmt, StmtKind},
    diagnostics::{Diagnostic, DiagnosticKind, QuillError, Result},
    environment::{Environment, EnvironmentRef, ScopeKind},
    lexer::{Token, TokenKind},
    parser::Parser,
    registry::{Handler, HandlerRegistry},
    runtime::{settle, type_error, Flow, Interpreter},
    value::Value,
};

type ParseResult = std::result::Result<Stmt, Diagnostic>;

pub fn install(registry: &mut HandlerRegistry) {
    for keyword in ["else", "catch", "finally"] {
        registry.register_keyword(keyword);
    }
    registry.register_handler("if", Handler::statement(parse_if));
    registry.register_handler("if", Handler::executor(execute_if));
    registry.register_handler("while", Handler::statement(parse_while));
    registry.register_handler("while", Handler::executor(execute_while));
    registry.register_handler("for", Handler::statement(parse_for));
    registry.register_handler("for", Handler::executor(execute_for));
    registry.register_handler("break", Handler::statement(|p, kw| Ok(bare(p, kw))));
    registry.register_handler("break", Handler::executor(|_, _, _| Ok(Flow::Break)));
    registry.register_handler("continue", Handler::statement(|p, kw| Ok(bare(p, kw))));
    registry.register_handler("continue", Handler::executor(|_, _, _| Ok(Flow::Continue)));
    registry.register_handler("try", Handler::statement(parse_try));
    registry.register_handler("try", Handler::executor(execute_try));
    registry.register_handler("throw", Handler::statement(parse_throw));
    registry.register_handler("throw", Handler::executor(execute_throw));
}

fn extension(parser: &Parser<'_>, node: ExtensionNode, keyword: &Token) -> Stmt {
    parser.stmt(StmtKind::Extension(node), keyword.line)
}

fn bare(parser: &mut Parser<'_>, keyword: Token) -> Stmt {
    extension(parser, ExtensionNode::new(keyword.lexeme.as_str()), &keyword)
}

fn parse_condition(parser: &mut Parser<'_>, keyword: &str) -> std::result::Result<NodePart, Diagnostic> {
    parser.expect(TokenKind::LParen, &format!("expected `(` after `{keyword}`"))?;
    let condition = parser.parse_expression()?;
    parser.expect(TokenKind::RParen, &format!("expected `)` after `{keyword}` condition"))?;
    Ok(NodePart::Expr(condition))
}

// ----- if ---------------------------------------------------------------------

/// Parts: condition/body pairs, then an optional trailing else body.
fn parse_if(parser: &mut Parser<'_>, keyword: Token) -> ParseResult {
    let mut node = ExtensionNode::new("if");
    loop {
        node = node
            .part(parse_condition(parser, "if")?)
            .part(NodePart::Block(parser.parse_body()?));
        if !parser.matches_keyword("else") {
            break;
        }
        if !parser.matches_keyword("if") {
            node = node.part(NodePart::Block(parser.parse_body()?));
            break;
        }
    }
    Ok(extension(parser, node, &keyword))
}

fn execute_if(interp: &mut Interpreter, node: &ExtensionNode, scope: &EnvironmentRef) -> Result<Flow> {
    for pair in node.parts.chunks(2) {
        match pair {
            [NodePart::Expr(condition), NodePart::Block(body)] => {
                let condition = settle!(interp.evaluate(condition, scope)?);
                if condition.is_truthy() {
                    return interp.execute_block(body, scope);
                }
            }
            [NodePart::Block(otherwise)] => return interp.execute_block(otherwise, scope),
            _ => return Err(malformed("if")),
        }
    }
    Ok(Flow::Normal(Value::Null))
}

// ----- loops ------------------------------------------------------------------

fn parse_while(parser: &mut Parser<'_>, keyword: Token) -> ParseResult {
    let node = ExtensionNode::new("while")
        .part(parse_condition(parser, "while")?)
        .part(NodePart::Block(parser.parse_body()?));
    Ok(extension(parser, node, &keyword))
}

fn execute_while(interp: &mut Interpreter, node: &ExtensionNode, scope: &EnvironmentRef) -> Result<Flow> {
    let [NodePart::Expr(condition), NodePart::Block(body)] = node.parts.as_slice() else {
        return Err(malformed("while"));
    };
    loop {
        let value = settle!(interp.evaluate(condition, scope)?);
        if !value.is_truthy() {
            break;
        }
        match interp.execute_block(body, scope)? {
            Flow::Normal(_) | Flow::Continue => {}
            Flow::Break => break,
            exit @ (Flow::Return(_) | Flow::Suspend(_)) => return Ok(exit),
        }
    }
    Ok(Flow::Normal(Value::Null))
}

/// `for (x of items) body` produces `[Name, Expr, Block]`; the classic form
/// produces `[init, condition, update, Block]` with `Empty` for left-out
/// clauses.
fn parse_for(parser: &mut Parser<'_>, keyword: Token) -> ParseResult {
    parser.expect(TokenKind::LParen, "expected `(` after `for`")?;
    let is_for_of = parser.check(TokenKind::Identifier)
        && parser.peek_next().kind == TokenKind::Identifier
        && parser.peek_next().lexeme == "of";
    let node = if is_for_of {
        let name = parser.next().lexeme;
        parser.next();
        let iterable = parser.parse_expression()?;
        parser.expect(TokenKind::RParen, "expected `)` after `for ... of` iterable")?;
        ExtensionNode::new("for")
            .part(NodePart::Name(name))
            .part(NodePart::Expr(iterable))
            .part(NodePart::Block(parser.parse_body()?))
    } else {
        let init = if parser.check(TokenKind::Semicolon) {
            NodePart::Empty
        } else {
            NodePart::Stmt(Box::new(parser.parse_simple_statement()?))
        };
        parser.expect(TokenKind::Semicolon, "expected `;` after `for` initializer")?;
        let condition = if parser.check(TokenKind::Semicolon) {
            NodePart::Empty
        } else {
            NodePart::Expr(parser.parse_expression()?)
        };
        parser.expect(TokenKind::Semicolon, "expected `;` after `for` condition")?;
        let update = if parser.check(TokenKind::RParen) {
            NodePart::Empty
        } else {
            NodePart::Stmt(Box::new(parser.parse_simple_statement()?))
        };
        parser.expect(TokenKind::RParen, "expected `)` after `for` clauses")?;
        ExtensionNode::new("for")
            .part(init)
            .part(condition)
            .part(update)
            .part(NodePart::Block(parser.parse_body()?))
    };
    Ok(extension(parser, node, &keyword))
}

fn execute_for(interp: &mut Interpreter, node: &ExtensionNode, scope: &EnvironmentRef) -> Result<Flow> {
    match node.parts.as_slice() {
        [NodePart::Name(name), NodePart::Expr(iterable), NodePart::Block(body)] => {
            let iterable = settle!(interp.evaluate(iterable, scope)?);
            for item in iterate(&iterable)? {
                Environment::set(scope, name, item);
                match interp.execute_block(body, scope)? {
                    Flow::Normal(_) | Flow::Continue => {}
                    Flow::Break => break,
                    exit @ (Flow::Return(_) | Flow::Suspend(_)) => return Ok(exit),
                }
            }
            Ok(Flow::Normal(Value::Null))
        }
        [init, condition, update, NodePart::Block(body)] => {
            if let NodePart::Stmt(init) = init {
                if let Flow::Suspend(marker) = interp.execute_statement(init, scope)? {
                    return Ok(Flow::Suspend(marker));
                }
            }
            loop {
                if let NodePart::Expr(condition) = condition {
                    let value = settle!(interp.evaluate(condition, scope)?);
                    if !value.is_truthy() {
                        break;
                    }
                }
                match interp.execute_block(body, scope)? {
                    Flow::Normal(_) | Flow::Continue => {}
                    Flow::Break => break,
                    exit @ (Flow::Return(_) | Flow::Suspend(_)) => return Ok(exit),
                }
                if let NodePart::Stmt(update) = update {
                    if let Flow::Suspend(marker) = interp.execute_statement(update, scope)? {
                        return Ok(Flow::Suspend(marker));
                    }
                }
            }
            Ok(Flow::Normal(Value::Null))
        }
        _ => Err(malformed("for")),
    }
}

/// Items visited by `for ... of`. Arrays are snapshotted first.
fn iterate(value: &Value) -> Result<Vec<Value>> {
    match value {
        Value::Array(items) => Ok(items.borrow().clone()),
        Value::String(text) => Ok(text.chars().map(|c| Value::string(c.to_string())).collect()),
        Value::Object(fields) => Ok(fields
            .borrow()
            .keys()
            .map(|key| Value::string(key.as_str()))
            .collect()),
        other => Err(type_error(format!("{} is not iterable", other.type_name()))),
    }
}

// ----- try / throw --------------------------------------------------------------

/// Parts: `[body, binding, catch body, finally body]`.
fn parse_try(parser: &mut Parser<'_>, keyword: Token) -> ParseResult {
    let body = parser.parse_block()?;
    let mut binding = NodePart::Empty;
    let mut handler = NodePart::Empty;
    let mut finalizer = NodePart::Empty;
    if parser.matches_keyword("catch") {
        if parser.matches(TokenKind::LParen) {
            let name = parser.expect_identifier("expected error binding name in `catch`")?;
            parser.expect(TokenKind::RParen, "expected `)` after `catch` binding")?;
            binding = NodePart::Name(name.lexeme);
        }
        handler = NodePart::Block(parser.parse_block()?);
    }
    if parser.matches_keyword("finally") {
        finalizer = NodePart::Block(parser.parse_block()?);
    }
    if matches!((&handler, &finalizer), (NodePart::Empty, NodePart::Empty)) {
        return Err(parser.error(&keyword, "`try` needs a `catch` or `finally` clause"));
    }
    let node = ExtensionNode::new("try")
        .part(NodePart::Block(body))
        .part(binding)
        .part(handler)
        .part(finalizer);
    Ok(extension(parser, node, &keyword))
}

fn execute_try(interp: &mut Interpreter, node: &ExtensionNode, scope: &EnvironmentRef) -> Result<Flow> {
    let [NodePart::Block(body), binding, handler, finalizer] = node.parts.as_slice() else {
        return Err(malformed("try"));
    };
    let result = match (interp.execute_block(body, scope), handler) {
        (Err(QuillError::Diagnostic(diag)), NodePart::Block(handler)) => {
            tracing::debug!(kind = diag.kind.label(), line = ?diag.line, "caught error");
            let catch_scope = Environment::with_parent(Rc::clone(scope), ScopeKind::Catch);
            if let NodePart::Name(name) = binding {
                catch_scope.borrow_mut().define(name.as_str(), diag.to_value());
            }
            interp.execute_block(handler, &catch_scope)
        }
        (other, _) => other,
    };
    if matches!(result, Ok(Flow::Suspend(_))) {
        return result;
    }
    if let NodePart::Block(finalizer) = finalizer {
        match interp.execute_block(finalizer, scope)? {
            Flow::Normal(_) => {}
            abrupt => return Ok(abrupt),
        }
    }
    result
}

fn parse_throw(parser: &mut Parser<'_>, keyword: Token) -> ParseResult {
    let value = parser.parse_expression()?;
    let node = ExtensionNode::new("throw").part(NodePart::Expr(value));
    Ok(extension(parser, node, &keyword))
}

fn execute_throw(interp: &mut Interpreter, node: &ExtensionNode, scope: &EnvironmentRef) -> Result<Flow> {
    let [NodePart::Expr(value)] = node.parts.as_slice() else {
        return Err(malformed("throw"));
    };
    let value = settle!(interp.evaluate(value, scope)?);
    let message = match value.get_field("message") {
        Some(Value::String(message)) => message.to_string(),
        _ => value.to_string(),
    };
    Err(Diagnostic::new(DiagnosticKind::UserThrow, message)
        .with_payload(value)
        .into())
}

fn malformed(keyword: &str) -> QuillError {
    Diagnostic::new(
        DiagnosticKind::Parse,
        format!("malformed `{keyword}` statement"),
    )
    .into()
}

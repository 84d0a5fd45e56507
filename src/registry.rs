//! Extension table through which every non-core language feature is added.
//!
//! Control flow, the standard prelude and any host integration register
//! keywords and handlers here; the parser and interpreter consult it at each
//! extensible point.

use std::{fmt, rc::Rc};

use indexmap::{IndexMap, IndexSet};

use crate::{
    ast::{ExtensionNode, Stmt},
    diagnostics::{Diagnostic, Result},
    environment::EnvironmentRef,
    lexer::Token,
    parser::Parser,
    runtime::{Flow, Interpreter},
    value::Value,
};

pub type KeywordSet = IndexSet<String>;

/// Parses the statement introduced by `keyword`, which has already been
/// consumed.
pub type StatementParser = Rc<dyn Fn(&mut Parser<'_>, Token) -> std::result::Result<Stmt, Diagnostic>>;

/// Executes an [`ExtensionNode`] built by the matching statement parser.
pub type StatementExecutor =
    Rc<dyn Fn(&mut Interpreter, &ExtensionNode, &EnvironmentRef) -> Result<Flow>>;

/// Native callable. Methods receive their receiver as the first argument.
pub type NativeCallback = Rc<dyn Fn(&mut Interpreter, Vec<Value>, &EnvironmentRef) -> Result<Value>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerKind {
    Statement,
    Executor,
    Function,
    Method,
    Dual,
    Value,
}

#[derive(Clone)]
pub enum Handler {
    Statement(StatementParser),
    Executor(StatementExecutor),
    Function(NativeCallback),
    Method(NativeCallback),
    /// Callable both as `name(x, ...)` and as `x.name(...)`.
    Dual(NativeCallback),
    Value(Value),
}

impl Handler {
    pub fn statement(
        parse: impl Fn(&mut Parser<'_>, Token) -> std::result::Result<Stmt, Diagnostic> + 'static,
    ) -> Self {
        Handler::Statement(Rc::new(parse))
    }

    pub fn executor(
        run: impl Fn(&mut Interpreter, &ExtensionNode, &EnvironmentRef) -> Result<Flow> + 'static,
    ) -> Self {
        Handler::Executor(Rc::new(run))
    }

    pub fn function(
        call: impl Fn(&mut Interpreter, Vec<Value>, &EnvironmentRef) -> Result<Value> + 'static,
    ) -> Self {
        Handler::Function(Rc::new(call))
    }

    pub fn method(
        call: impl Fn(&mut Interpreter, Vec<Value>, &EnvironmentRef) -> Result<Value> + 'static,
    ) -> Self {
        Handler::Method(Rc::new(call))
    }

    pub fn dual(
        call: impl Fn(&mut Interpreter, Vec<Value>, &EnvironmentRef) -> Result<Value> + 'static,
    ) -> Self {
        Handler::Dual(Rc::new(call))
    }

    pub fn value(value: Value) -> Self {
        Handler::Value(value)
    }

    pub fn kind(&self) -> HandlerKind {
        match self {
            Handler::Statement(_) => HandlerKind::Statement,
            Handler::Executor(_) => HandlerKind::Executor,
            Handler::Function(_) => HandlerKind::Function,
            Handler::Method(_) => HandlerKind::Method,
            Handler::Dual(_) => HandlerKind::Dual,
            Handler::Value(_) => HandlerKind::Value,
        }
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{:?} handler>", self.kind())
    }
}

#[derive(Default, Clone)]
pub struct HandlerRegistry {
    keywords: KeywordSet,
    statements: IndexMap<String, StatementParser>,
    executors: IndexMap<String, StatementExecutor>,
    functions: IndexMap<String, NativeCallback>,
    methods: IndexMap<String, NativeCallback>,
    values: IndexMap<String, Value>,
}

impl HandlerRegistry {
    /// Registry holding only the keywords the core grammar itself reads.
    pub fn with_core_keywords() -> Self {
        let mut registry = Self::default();
        for keyword in [
            "function", "return", "class", "extends", "new", "true", "false", "null", "this",
        ] {
            registry.register_keyword(keyword);
        }
        registry
    }

    pub fn register_keyword(&mut self, name: impl Into<String>) {
        self.keywords.insert(name.into());
    }

    /// Installs `handler` under `name`. Statement parsers also reserve the
    /// name as a keyword so the lexer classifies it.
    pub fn register_handler(&mut self, name: impl Into<String>, handler: Handler) {
        let name = name.into();
        tracing::trace!(name = %name, kind = ?handler.kind(), "registering handler");
        match handler {
            Handler::Statement(parse) => {
                self.keywords.insert(name.clone());
                self.statements.insert(name, parse);
            }
            Handler::Executor(run) => {
                self.executors.insert(name, run);
            }
            Handler::Function(call) => {
                self.functions.insert(name, call);
            }
            Handler::Method(call) => {
                self.methods.insert(name, call);
            }
            Handler::Dual(call) => {
                self.functions.insert(name.clone(), Rc::clone(&call));
                self.methods.insert(name, call);
            }
            Handler::Value(value) => {
                self.values.insert(name, value);
            }
        }
    }

    pub fn keywords(&self) -> &KeywordSet {
        &self.keywords
    }

    pub fn is_keyword(&self, name: &str) -> bool {
        self.keywords.contains(name)
    }

    pub fn statement_parser(&self, name: &str) -> Option<StatementParser> {
        self.statements.get(name).cloned()
    }

    pub fn executor(&self, name: &str) -> Option<StatementExecutor> {
        self.executors.get(name).cloned()
    }

    pub fn function(&self, name: &str) -> Option<NativeCallback> {
        self.functions.get(name).cloned()
    }

    pub fn method(&self, name: &str) -> Option<NativeCallback> {
        self.methods.get(name).cloned()
    }

    pub fn value(&self, name: &str) -> Option<Value> {
        self.values.get(name).cloned()
    }
}

use std::{cell::RefCell, rc::Rc};

use indexmap::IndexMap;

use crate::{
    ast::{
        ArrayElement, BinaryOp, Expr, ExprKind, Literal, LogicalOp, ObjectEntry, Stmt,
        StmtKind, UpdateOp,
    },
    diagnostics::{Diagnostic, DiagnosticKind, QuillError, Result},
    environment::{Environment, EnvironmentRef, ScopeKind},
    lexer::{Lexer, TemplatePart},
    operators::{self, STRICT_FLAG},
    parser::Parser,
    registry::{Handler, HandlerRegistry},
    scheduler::ExecutionState,
    stack::ensure_sufficient_stack,
    value::{format_number, ClassValue, Closure, ClosureKind, SuspensionMarker, Value},
};

/// Unwraps a value, returning early with the suspension marker if the
/// value is one.
macro_rules! settle {
    ($value:expr) => {
        match $value {
            $crate::value::Value::Suspended(marker) => return Ok(marker.into()),
            value => value,
        }
    };
}

/// Like [`settle!`] for helpers that return [`Settled`].
macro_rules! settled {
    ($result:expr) => {
        match $result {
            Ok(value) => value,
            Err(marker) => return Ok(marker.into()),
        }
    };
}

pub(crate) use settle;
pub(crate) use settled;

/// Outcome of evaluation that may have been cut short by a suspension.
pub type Settled<T> = std::result::Result<T, SuspensionMarker>;

/// Completion of a statement.
#[derive(Debug, Clone)]
pub enum Flow {
    Normal(Value),
    Return(Value),
    Break,
    Continue,
    Suspend(SuspensionMarker),
}

impl From<SuspensionMarker> for Flow {
    fn from(marker: SuspensionMarker) -> Self {
        Flow::Suspend(marker)
    }
}

/// Which scope becomes the parent of a user function's activation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScopePolicy {
    /// The caller's scope at the call site.
    #[default]
    Dynamic,
    /// The scope the function was defined in.
    Lexical,
}

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Name shown in diagnostics for scripts run through `execute`.
    pub source_name: String,
    pub scope_policy: ScopePolicy,
    pub max_call_depth: usize,
    /// Installs the standard functions, methods and `Math`.
    pub prelude: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            source_name: "<script>".to_string(),
            scope_policy: ScopePolicy::Dynamic,
            max_call_depth: 2000,
            prelude: true,
        }
    }
}

pub struct Interpreter {
    env: EnvironmentRef,
    registry: HandlerRegistry,
    config: RuntimeConfig,
    pub(crate) state: ExecutionState,
    depth: usize,
    captured: Option<String>,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl Interpreter {
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    pub fn with_config(config: RuntimeConfig) -> Self {
        let mut registry = HandlerRegistry::with_core_keywords();
        crate::control::install(&mut registry);
        if config.prelude {
            crate::stdlib::install(&mut registry);
        }
        let state = ExecutionState::new(&config.source_name);
        Self {
            env: Environment::new(),
            registry,
            config,
            state,
            depth: 0,
            captured: None,
        }
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    pub fn register_keyword(&mut self, name: impl Into<String>) {
        self.registry.register_keyword(name);
    }

    pub fn register_handler(&mut self, name: impl Into<String>, handler: Handler) {
        self.registry.register_handler(name, handler);
    }

    /// The global scope; it persists across `execute` calls.
    pub fn globals(&self) -> EnvironmentRef {
        Rc::clone(&self.env)
    }

    pub fn get_global(&self, name: &str) -> Option<Value> {
        Environment::get(&self.env, name)
    }

    pub fn set_global(&mut self, name: &str, value: Value) {
        self.env.borrow_mut().define(name, value);
    }

    /// Collects printed output in memory instead of writing to stdout.
    pub fn capture_output(&mut self) {
        self.captured = Some(String::new());
    }

    pub fn take_output(&mut self) -> String {
        self.captured.as_mut().map(std::mem::take).unwrap_or_default()
    }

    pub fn write_output(&mut self, text: &str) {
        match &mut self.captured {
            Some(buffer) => buffer.push_str(text),
            None => print!("{text}"),
        }
    }

    pub fn is_strict(&self, scope: &EnvironmentRef) -> bool {
        Environment::get(scope, STRICT_FLAG).is_some_and(|flag| flag.is_truthy())
    }

    // ----- statements -------------------------------------------------------

    pub fn execute_statement(&mut self, stmt: &Stmt, scope: &EnvironmentRef) -> Result<Flow> {
        self.state.current_line = stmt.line;
        ensure_sufficient_stack(|| self.execute_kind(stmt, scope))
            .map_err(|err| err.at_line(stmt.line).at_source(stmt.origin.as_ref()))
    }

    fn execute_kind(&mut self, stmt: &Stmt, scope: &EnvironmentRef) -> Result<Flow> {
        match &stmt.kind {
            StmtKind::Expr(expr) => {
                let value = settle!(self.evaluate(expr, scope)?);
                Ok(Flow::Normal(value))
            }
            StmtKind::Assign { target, op, value } => {
                let place = settled!(self.resolve_place(target, scope)?);
                let value = match op.binary() {
                    Some(binary) => {
                        let current = self.read_place(&place, scope)?;
                        let value = settle!(self.evaluate(value, scope)?);
                        let strict = self.is_strict(scope);
                        operators::binary(binary, &current, &value, strict)?
                    }
                    None => settle!(self.evaluate(value, scope)?),
                };
                self.write_place(place, value.clone(), scope)?;
                Ok(Flow::Normal(value))
            }
            StmtKind::Block(statements) => self.execute_block(statements, scope),
            StmtKind::Function(def) => {
                let name = def.name.clone().unwrap_or_default();
                let closure = Closure {
                    name: def.name.clone(),
                    def: Rc::clone(def),
                    env: Rc::clone(scope),
                    kind: ClosureKind::Function,
                };
                Environment::declare(scope, &name, Value::Closure(Rc::new(closure)));
                Ok(Flow::Normal(Value::Null))
            }
            StmtKind::Return(expr) => {
                let value = match expr {
                    Some(expr) => settle!(self.evaluate(expr, scope)?),
                    None => Value::Null,
                };
                Ok(Flow::Return(value))
            }
            StmtKind::Class(def) => {
                let superclass = match &def.superclass {
                    Some(name) => match self.resolve_identifier(name, scope)? {
                        Value::Class(class) => Some(class),
                        other => {
                            return Err(type_error(format!(
                                "`{name}` is a {}, not a class",
                                other.type_name()
                            )))
                        }
                    },
                    None => None,
                };
                let class = ClassValue {
                    name: def.name.clone(),
                    def: Rc::clone(def),
                    superclass,
                    env: Rc::clone(scope),
                };
                Environment::declare(scope, &def.name, Value::Class(Rc::new(class)));
                Ok(Flow::Normal(Value::Null))
            }
            StmtKind::Extension(node) => {
                let executor = self.registry.executor(&node.keyword).ok_or_else(|| {
                    Diagnostic::new(
                        DiagnosticKind::Name,
                        format!("no executor registered for `{}`", node.keyword),
                    )
                })?;
                executor(self, node, scope)
            }
        }
    }

    /// Runs statements in order in `scope`; blocks do not open scopes.
    pub fn execute_block(&mut self, statements: &[Stmt], scope: &EnvironmentRef) -> Result<Flow> {
        let mut last = Value::Null;
        for stmt in statements {
            match self.execute_statement(stmt, scope)? {
                Flow::Normal(value) => last = value,
                other => return Ok(other),
            }
        }
        Ok(Flow::Normal(last))
    }

    /// Evaluates the owner and index of an assignment target once.
    fn resolve_place(&mut self, target: &Expr, scope: &EnvironmentRef) -> Result<Settled<Place>> {
        let place = match &target.kind {
            ExprKind::Identifier(name) => Place::Name(name.clone()),
            ExprKind::Member { target: owner, property } => match self.evaluate(owner, scope)? {
                Value::Suspended(marker) => return Ok(Err(marker)),
                owner => Place::Field(owner, property.clone()),
            },
            ExprKind::Index { target: owner, index } => {
                let owner = match self.evaluate(owner, scope)? {
                    Value::Suspended(marker) => return Ok(Err(marker)),
                    owner => owner,
                };
                match self.evaluate(index, scope)? {
                    Value::Suspended(marker) => return Ok(Err(marker)),
                    index => Place::Slot(owner, index),
                }
            }
            _ => return Err(type_error("invalid assignment target")),
        };
        Ok(Ok(place))
    }

    fn read_place(&self, place: &Place, scope: &EnvironmentRef) -> Result<Value> {
        match place {
            Place::Name(name) => self.resolve_identifier(name, scope),
            Place::Field(owner, property) => member(owner, property),
            Place::Slot(owner, index) => index_value(owner, index),
        }
    }

    fn write_place(&self, place: Place, value: Value, scope: &EnvironmentRef) -> Result<()> {
        match place {
            Place::Name(name) => {
                Environment::set(scope, &name, value);
                Ok(())
            }
            Place::Field(owner, property) => match owner {
                Value::Object(fields) => {
                    fields.borrow_mut().insert(property, value);
                    Ok(())
                }
                Value::Null => Err(type_error(format!(
                    "cannot set property `{property}` of null"
                ))),
                other => Err(type_error(format!(
                    "cannot set property `{property}` on {}",
                    other.type_name()
                ))),
            },
            Place::Slot(owner, index) => match (&owner, &index) {
                (Value::Array(items), Value::Number(n)) => {
                    let idx = array_index(*n)?;
                    let mut items = items.borrow_mut();
                    if idx >= items.len() {
                        let limit = items.len().saturating_add(MAX_ARRAY_GROWTH);
                        let Some(new_len) = idx.checked_add(1).filter(|len| *len <= limit) else {
                            return Err(type_error(format!(
                                "array index {} is too far past the end (length {})",
                                format_number(*n),
                                items.len()
                            )));
                        };
                        items.resize(new_len, Value::Null);
                    }
                    items[idx] = value;
                    Ok(())
                }
                (Value::Object(fields), key) => {
                    let key = property_key(key)?;
                    fields.borrow_mut().insert(key, value);
                    Ok(())
                }
                (Value::Null, _) => Err(type_error("cannot index into null")),
                _ => Err(type_error(format!(
                    "cannot assign through index on {} with {}",
                    owner.type_name(),
                    index.type_name()
                ))),
            },
        }
    }

    // ----- expressions ------------------------------------------------------

    pub fn evaluate(&mut self, expr: &Expr, scope: &EnvironmentRef) -> Result<Value> {
        ensure_sufficient_stack(|| self.evaluate_kind(expr, scope))
            .map_err(|err| err.at_line(expr.line))
    }

    fn evaluate_kind(&mut self, expr: &Expr, scope: &EnvironmentRef) -> Result<Value> {
        match &expr.kind {
            ExprKind::Literal(literal) => Ok(match literal {
                Literal::Null => Value::Null,
                Literal::Bool(b) => Value::Bool(*b),
                Literal::Number(n) => Value::Number(*n),
                Literal::BigInt(n) => Value::bigint(n.clone()),
                Literal::String(s) => Value::string(s.as_str()),
            }),
            ExprKind::Identifier(name) => self.resolve_identifier(name, scope),
            ExprKind::Keyword(name) => self
                .registry
                .value(name)
                .or_else(|| Environment::get(scope, name))
                .ok_or_else(|| {
                    QuillError::from(Diagnostic::new(
                        DiagnosticKind::Name,
                        format!("`{name}` is not bound here"),
                    ))
                }),
            ExprKind::Unary { op, expr: operand } => {
                let value = settle!(self.evaluate(operand, scope)?);
                Ok(operators::unary(*op, &value, self.is_strict(scope))?)
            }
            ExprKind::Binary { op, left, right } => {
                let left = settle!(self.evaluate(left, scope)?);
                let right = settle!(self.evaluate(right, scope)?);
                Ok(operators::binary(*op, &left, &right, self.is_strict(scope))?)
            }
            ExprKind::Logical { op, left, right } => {
                let left = settle!(self.evaluate(left, scope)?);
                match (op, left.is_truthy()) {
                    (LogicalOp::And, false) | (LogicalOp::Or, true) => Ok(left),
                    _ => self.evaluate(right, scope),
                }
            }
            ExprKind::Ternary {
                condition,
                then_branch,
                else_branch,
            } => {
                let condition = settle!(self.evaluate(condition, scope)?);
                if condition.is_truthy() {
                    self.evaluate(then_branch, scope)
                } else {
                    self.evaluate(else_branch, scope)
                }
            }
            ExprKind::Member { target, property } => {
                let target = settle!(self.evaluate(target, scope)?);
                member(&target, property)
            }
            ExprKind::Index { target, index } => {
                let target = settle!(self.evaluate(target, scope)?);
                let index = settle!(self.evaluate(index, scope)?);
                index_value(&target, &index)
            }
            ExprKind::Call { callee, args } => self.evaluate_call(callee, args, scope),
            ExprKind::MethodCall {
                receiver,
                method,
                args,
            } => self.evaluate_method_call(receiver, method, args, scope),
            ExprKind::New { class, args } => {
                let class = settle!(self.evaluate(class, scope)?);
                let args = settled!(self.evaluate_args(args, scope)?);
                match class {
                    Value::Class(class) => self.instantiate(&class, args, scope),
                    other => Err(type_error(format!(
                        "`new` expects a class, got {}",
                        other.type_name()
                    ))),
                }
            }
            ExprKind::Update { op, target } => {
                let place = settled!(self.resolve_place(target, scope)?);
                let old = self.read_place(&place, scope)?;
                let one = match old {
                    Value::BigInt(_) => Value::bigint(1.into()),
                    _ => Value::Number(1.0),
                };
                let binary = match op {
                    UpdateOp::Increment => BinaryOp::Add,
                    UpdateOp::Decrement => BinaryOp::Sub,
                };
                let updated = operators::binary(binary, &old, &one, self.is_strict(scope))?;
                self.write_place(place, updated, scope)?;
                Ok(old)
            }
            ExprKind::Array(elements) => {
                let mut items = Vec::with_capacity(elements.len());
                for element in elements {
                    match element {
                        ArrayElement::Item(expr) => {
                            items.push(settle!(self.evaluate(expr, scope)?));
                        }
                        ArrayElement::Spread(expr) => match settle!(self.evaluate(expr, scope)?) {
                            Value::Array(values) => items.extend(values.borrow().iter().cloned()),
                            Value::String(text) => {
                                items.extend(text.chars().map(|c| Value::string(c.to_string())))
                            }
                            other => {
                                return Err(type_error(format!(
                                    "cannot spread {} into an array",
                                    other.type_name()
                                )))
                            }
                        },
                    }
                }
                Ok(Value::array(items))
            }
            ExprKind::Object(entries) => {
                let mut fields = IndexMap::new();
                for entry in entries {
                    match entry {
                        ObjectEntry::Pair(key, expr) => {
                            let value = settle!(self.evaluate(expr, scope)?);
                            fields.insert(key.clone(), value);
                        }
                        ObjectEntry::Spread(expr) => match settle!(self.evaluate(expr, scope)?) {
                            Value::Object(source) => fields.extend(
                                source
                                    .borrow()
                                    .iter()
                                    .map(|(key, value)| (key.clone(), value.clone())),
                            ),
                            Value::Null => {}
                            other => {
                                return Err(type_error(format!(
                                    "cannot spread {} into an object",
                                    other.type_name()
                                )))
                            }
                        },
                    }
                }
                Ok(Value::object(fields))
            }
            ExprKind::Template(parts) => {
                let mut text = String::new();
                for part in parts {
                    match part {
                        TemplatePart::Text(chunk) => text.push_str(chunk),
                        TemplatePart::Code { source, line } => {
                            let value = settle!(self.evaluate_embedded(source, *line, scope)?);
                            text.push_str(&value.to_string());
                        }
                    }
                }
                Ok(Value::string(text))
            }
            ExprKind::Function(def) => Ok(Value::Closure(Rc::new(Closure {
                name: def.name.clone(),
                def: Rc::clone(def),
                env: Rc::clone(scope),
                kind: ClosureKind::Function,
            }))),
        }
    }

    /// Lexes, parses and evaluates a `${...}` section in the current scope.
    fn evaluate_embedded(
        &mut self,
        source: &str,
        line: usize,
        scope: &EnvironmentRef,
    ) -> Result<Value> {
        let tokens = Lexer::new(source, self.registry.keywords())
            .starting_at(line)
            .tokenize()?;
        let expr = Parser::new(tokens, &self.registry).parse_standalone_expression()?;
        self.evaluate(&expr, scope)
    }

    /// Registry functions and values take precedence over scope bindings.
    pub fn resolve_identifier(&self, name: &str, scope: &EnvironmentRef) -> Result<Value> {
        if let Some(callback) = self.registry.function(name) {
            return Ok(Value::native(name, callback));
        }
        if let Some(value) = self.registry.value(name) {
            return Ok(value);
        }
        Environment::get(scope, name).ok_or_else(|| {
            Diagnostic::new(DiagnosticKind::Name, format!("undefined variable `{name}`")).into()
        })
    }

    fn evaluate_args(&mut self, args: &[Expr], scope: &EnvironmentRef) -> Result<Settled<Vec<Value>>> {
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            match self.evaluate(arg, scope)? {
                Value::Suspended(marker) => return Ok(Err(marker)),
                value => values.push(value),
            }
        }
        Ok(Ok(values))
    }

    fn evaluate_call(&mut self, callee: &Expr, args: &[Expr], scope: &EnvironmentRef) -> Result<Value> {
        if let ExprKind::Identifier(name) = &callee.kind {
            if let Some(callback) = self.registry.function(name) {
                let args = settled!(self.evaluate_args(args, scope)?);
                return callback(self, args, scope);
            }
            let target = Environment::get(scope, name)
                .or_else(|| self.registry.value(name))
                .ok_or_else(|| {
                    Diagnostic::new(DiagnosticKind::Name, format!("undefined function `{name}`"))
                })?;
            let args = settled!(self.evaluate_args(args, scope)?);
            return self.call_value(&target, args, scope);
        }
        let target = settle!(self.evaluate(callee, scope)?);
        let args = settled!(self.evaluate_args(args, scope)?);
        self.call_value(&target, args, scope)
    }

    fn evaluate_method_call(
        &mut self,
        receiver: &Expr,
        method: &str,
        args: &[Expr],
        scope: &EnvironmentRef,
    ) -> Result<Value> {
        let receiver = settle!(self.evaluate(receiver, scope)?);
        let mut args = settled!(self.evaluate_args(args, scope)?);
        if let Some(callback) = self.registry.method(method) {
            args.insert(0, receiver);
            return callback(self, args, scope);
        }
        let member = match &receiver {
            Value::Object(fields) => fields.borrow().get(method).cloned(),
            Value::Null => {
                return Err(type_error(format!("cannot call `{method}` on null")));
            }
            _ => None,
        };
        match member {
            Some(Value::Closure(closure)) if closure.kind == ClosureKind::Method => {
                self.call_method(&closure, &receiver, args, scope)
            }
            Some(callable) if callable.is_callable() => self.call_value(&callable, args, scope),
            Some(other) => Err(type_error(format!(
                "`{method}` is a {}, not a function",
                other.type_name()
            ))),
            None => Err(Diagnostic::new(
                DiagnosticKind::Name,
                format!("undefined method `{method}` on {}", receiver.type_name()),
            )
            .into()),
        }
    }

    // ----- calls ------------------------------------------------------------

    /// Invokes any callable value. Handlers use this to run user closures.
    pub fn call_value(&mut self, callee: &Value, args: Vec<Value>, scope: &EnvironmentRef) -> Result<Value> {
        match callee {
            Value::Native(native) => {
                let callback = Rc::clone(&native.callback);
                callback(self, args, scope)
            }
            Value::Closure(closure) => self.call_function(closure, args, scope, None),
            Value::Class(class) => self.instantiate(class, args, scope),
            other => Err(type_error(format!("{} is not callable", other.type_name()))),
        }
    }

    /// Runs `closure` with `this` bound to `instance`, copying the
    /// instance's fields in and changed fields back out.
    pub fn call_method(
        &mut self,
        closure: &Rc<Closure>,
        instance: &Value,
        args: Vec<Value>,
        scope: &EnvironmentRef,
    ) -> Result<Value> {
        self.call_function(closure, args, scope, Some(instance))
    }

    fn call_function(
        &mut self,
        closure: &Rc<Closure>,
        args: Vec<Value>,
        caller: &EnvironmentRef,
        instance: Option<&Value>,
    ) -> Result<Value> {
        if self.depth >= self.config.max_call_depth {
            return Err(Diagnostic::stack_overflow(self.config.max_call_depth)
                .with_line(closure.def.line)
                .into());
        }
        self.depth += 1;
        let result = self.run_function(closure, args, caller, instance);
        self.depth -= 1;
        result
    }

    fn run_function(
        &mut self,
        closure: &Rc<Closure>,
        args: Vec<Value>,
        caller: &EnvironmentRef,
        instance: Option<&Value>,
    ) -> Result<Value> {
        let parent = match self.config.scope_policy {
            ScopePolicy::Dynamic => Rc::clone(caller),
            ScopePolicy::Lexical => Rc::clone(&closure.env),
        };
        let activation = Environment::with_parent(parent, ScopeKind::Function);
        let fields = instance.and_then(|instance| match instance {
            Value::Object(fields) => Some(Rc::clone(fields)),
            _ => None,
        });
        if let Some(fields) = &fields {
            let mut scope = activation.borrow_mut();
            for (name, value) in fields.borrow().iter() {
                if !value.is_callable() {
                    scope.define(name.as_str(), value.clone());
                }
            }
        }
        if let Some(instance) = instance {
            activation.borrow_mut().define("this", instance.clone());
        }

        let def = &closure.def;
        let mut args = args.into_iter();
        for param in &def.params {
            let value = match (args.next(), &param.default) {
                (Some(value), _) => value,
                (None, Some(default)) => settle!(self.evaluate(default, &activation)?),
                (None, None) => Value::Null,
            };
            activation.borrow_mut().define(param.name.as_str(), value);
        }
        if let Some(rest) = &def.rest {
            activation
                .borrow_mut()
                .define(rest.as_str(), Value::array(args.collect()));
        }

        let snapshot: Vec<(String, Value)> = match &fields {
            Some(fields) => fields
                .borrow()
                .keys()
                .filter_map(|name| {
                    let local = activation.borrow().get_local(name)?;
                    (!local.is_callable()).then(|| (name.clone(), local))
                })
                .collect(),
            None => Vec::new(),
        };

        let value = match self.execute_block(&def.body, &activation)? {
            Flow::Return(value) => value,
            Flow::Normal(_) | Flow::Break | Flow::Continue => Value::Null,
            Flow::Suspend(marker) => return Ok(Value::Suspended(marker)),
        };

        if let Some(fields) = fields {
            let scope = activation.borrow();
            let mut fields = fields.borrow_mut();
            for (name, before) in snapshot {
                if let Some(after) = scope.get_local(&name) {
                    if !operators::strict_equals(&before, &after) {
                        fields.insert(name, after);
                    }
                }
            }
        }
        Ok(value)
    }

    /// Builds an instance: superclass fields, own field initializers in
    /// order, methods, then the constructor. Counts against the call depth
    /// like a function call.
    pub fn instantiate(
        &mut self,
        class: &Rc<ClassValue>,
        args: Vec<Value>,
        scope: &EnvironmentRef,
    ) -> Result<Value> {
        if self.depth >= self.config.max_call_depth {
            return Err(Diagnostic::stack_overflow(self.config.max_call_depth).into());
        }
        self.depth += 1;
        let result = self.build_instance(class, args, scope);
        self.depth -= 1;
        result
    }

    fn build_instance(
        &mut self,
        class: &Rc<ClassValue>,
        args: Vec<Value>,
        scope: &EnvironmentRef,
    ) -> Result<Value> {
        let mut fields = IndexMap::new();
        if let Some(superclass) = &class.superclass {
            if let Value::Object(parent) = settle!(self.instantiate(superclass, args.clone(), scope)?) {
                fields.extend(
                    parent
                        .borrow()
                        .iter()
                        .map(|(key, value)| (key.clone(), value.clone())),
                );
            }
        }
        let fields = Rc::new(RefCell::new(fields));
        let instance = Value::Object(Rc::clone(&fields));

        let parent = match self.config.scope_policy {
            ScopePolicy::Dynamic => Rc::clone(scope),
            ScopePolicy::Lexical => Rc::clone(&class.env),
        };
        let init_scope = Environment::with_parent(parent, ScopeKind::Function);
        for (name, value) in fields.borrow().iter() {
            if !value.is_callable() {
                init_scope.borrow_mut().define(name.as_str(), value.clone());
            }
        }
        init_scope.borrow_mut().define("this", instance.clone());
        for (name, init) in &class.def.fields {
            let value = settle!(self.evaluate(init, &init_scope)?);
            init_scope.borrow_mut().define(name.as_str(), value.clone());
            fields.borrow_mut().insert(name.clone(), value);
        }

        for method in &class.def.methods {
            let closure = Closure {
                name: method.name.clone(),
                def: Rc::clone(method),
                env: Rc::clone(&class.env),
                kind: ClosureKind::Method,
            };
            let name = method.name.clone().unwrap_or_default();
            fields
                .borrow_mut()
                .insert(name, Value::Closure(Rc::new(closure)));
        }

        if let Some(constructor) = &class.def.constructor {
            let closure = Rc::new(Closure {
                name: Some(class.name.clone()),
                def: Rc::clone(constructor),
                env: Rc::clone(&class.env),
                kind: ClosureKind::Method,
            });
            settle!(self.call_method(&closure, &instance, args, scope)?);
        }
        Ok(instance)
    }
}

/// Property read; `length` is built in for strings and arrays.
/// How far past its end an array may be padded by one assignment.
const MAX_ARRAY_GROWTH: usize = 1 << 16;

/// An assignment target with its owner and index already evaluated.
enum Place {
    Name(String),
    Field(Value, String),
    Slot(Value, Value),
}

fn member(target: &Value, property: &str) -> Result<Value> {
    match target {
        Value::Null => Err(type_error(format!(
            "cannot read property `{property}` of null"
        ))),
        Value::Object(fields) => Ok(fields.borrow().get(property).cloned().unwrap_or(Value::Null)),
        Value::Array(items) if property == "length" => Ok(Value::Number(items.borrow().len() as f64)),
        Value::String(text) if property == "length" => {
            Ok(Value::Number(text.chars().count() as f64))
        }
        Value::Class(class) if property == "name" => Ok(Value::string(class.name.as_str())),
        _ => Ok(Value::Null),
    }
}

fn index_value(target: &Value, index: &Value) -> Result<Value> {
    match (target, index) {
        (Value::Array(items), Value::Number(n)) => Ok(array_index(*n)
            .ok()
            .and_then(|idx| items.borrow().get(idx).cloned())
            .unwrap_or(Value::Null)),
        (Value::String(text), Value::Number(n)) => Ok(array_index(*n)
            .ok()
            .and_then(|idx| text.chars().nth(idx))
            .map(|c| Value::string(c.to_string()))
            .unwrap_or(Value::Null)),
        (Value::Object(fields), key) => {
            let key = property_key(key)?;
            Ok(fields.borrow().get(&key).cloned().unwrap_or(Value::Null))
        }
        (Value::Null, _) => Err(type_error("cannot index into null")),
        _ => Err(type_error(format!(
            "cannot index {} with {}",
            target.type_name(),
            index.type_name()
        ))),
    }
}

fn array_index(n: f64) -> Result<usize> {
    if n >= 0.0 && n.fract() == 0.0 {
        Ok(n as usize)
    } else {
        Err(type_error(format!(
            "array index must be a non-negative integer, got {}",
            format_number(n)
        )))
    }
}

fn property_key(key: &Value) -> Result<String> {
    match key {
        Value::String(s) => Ok(s.to_string()),
        Value::Number(n) => Ok(format_number(*n)),
        other => Err(type_error(format!(
            "object keys must be strings or numbers, got {}",
            other.type_name()
        ))),
    }
}

pub(crate) fn type_error(message: impl Into<String>) -> QuillError {
    Diagnostic::new(DiagnosticKind::Type, message).into()
}

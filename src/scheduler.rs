//! Top-level driver: runs a script's statements one at a time and supports
//! cooperative suspension between them.
//!
//! A handler that needs to wait calls [`Interpreter::suspend`] and returns the
//! marker. The marker unwinds to [`Interpreter::drive`], which records the
//! cursor and reports [`RunOutcome::Paused`]. The host later calls
//! [`Interpreter::resume`], which continues with the next top-level statement.
//! Work interrupted inside a function or loop body is not restarted.

use std::{rc::Rc, time::Duration};

use indexmap::IndexMap;

use crate::{
    ast::Stmt,
    diagnostics::{Diagnostic, QuillError, Result},
    environment::EnvironmentRef,
    lexer::tokenize,
    parser::{parse_source, Parser},
    runtime::{Flow, Interpreter},
    value::{SuspensionMarker, Value},
};

/// Per-run state of the driver. Everything except the error handler and the
/// known sources is reset by each `execute`.
#[derive(Debug)]
pub struct ExecutionState {
    pub source_name: Rc<str>,
    sources: IndexMap<String, Rc<str>>,
    /// Line of the statement being executed.
    pub current_line: usize,
    queue: Rc<Vec<Stmt>>,
    cursor: usize,
    paused: bool,
    pending_wake: Option<Duration>,
    error_handler: Option<Value>,
}

impl ExecutionState {
    pub(crate) fn new(source_name: &str) -> Self {
        Self {
            source_name: Rc::from(source_name),
            sources: IndexMap::new(),
            current_line: 0,
            queue: Rc::new(Vec::new()),
            cursor: 0,
            paused: false,
            pending_wake: None,
            error_handler: None,
        }
    }

    fn reset(&mut self, source_name: &str, text: &str) {
        self.source_name = Rc::from(source_name);
        self.sources.insert(source_name.to_string(), Rc::from(text));
        self.current_line = 0;
        self.queue = Rc::new(Vec::new());
        self.cursor = 0;
        self.paused = false;
        self.pending_wake = None;
    }

    pub fn source_text(&self, name: &str) -> Option<Rc<str>> {
        self.sources.get(name).cloned()
    }

    /// Index of the next top-level statement to run.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn remaining(&self) -> usize {
        self.queue.len().saturating_sub(self.cursor)
    }
}

/// How a call to `execute` or `resume` ended.
#[derive(Debug)]
pub enum RunOutcome {
    /// Every statement ran. Holds the value of the last one.
    Completed(Value),
    /// A handler suspended the run; call `resume` to continue.
    Paused,
    /// An uncaught error was swallowed by the installed error handler.
    Handled(Diagnostic),
}

impl RunOutcome {
    pub fn is_paused(&self) -> bool {
        matches!(self, RunOutcome::Paused)
    }

    pub fn value(&self) -> Option<&Value> {
        match self {
            RunOutcome::Completed(value) => Some(value),
            _ => None,
        }
    }
}

impl Interpreter {
    /// Parses and runs `source` under the configured source name.
    pub fn execute(&mut self, source: &str) -> Result<RunOutcome> {
        let name = self.config().source_name.clone();
        self.execute_named(&name, source)
    }

    /// Discards any paused run, then parses and runs `source`.
    pub fn execute_named(&mut self, name: &str, source: &str) -> Result<RunOutcome> {
        if self.state.paused {
            tracing::debug!(
                discarded = self.state.remaining(),
                "discarding paused run"
            );
        }
        self.state.reset(name, source);
        tracing::debug!(source = name, "starting run");
        let program = match parse_source(source, self.registry()) {
            Ok(program) => program,
            Err(diag) => return self.abort(diag.into()),
        };
        self.state.queue = Rc::new(program);
        self.drive()
    }

    /// Continues a paused run from the next top-level statement.
    pub fn resume(&mut self) -> Result<RunOutcome> {
        tracing::debug!(cursor = self.state.cursor, "resuming run");
        self.state.paused = false;
        self.state.pending_wake = None;
        self.drive()
    }

    /// Marks the run as paused. Handlers return the marker (as a value) to
    /// unwind to the driver.
    pub fn suspend(&mut self) -> SuspensionMarker {
        self.state.paused = true;
        SuspensionMarker
    }

    /// Suspends and asks the host to resume after `millis`.
    pub fn suspend_for(&mut self, millis: u64) -> SuspensionMarker {
        self.state.pending_wake = Some(Duration::from_millis(millis));
        self.suspend()
    }

    pub fn is_paused(&self) -> bool {
        self.state.paused
    }

    /// Delay requested by the handler that paused the run, if any.
    pub fn pending_wake(&self) -> Option<Duration> {
        self.state.pending_wake
    }

    pub fn set_error_handler(&mut self, handler: Option<Value>) {
        self.state.error_handler = handler;
    }

    pub fn execution_state(&self) -> &ExecutionState {
        &self.state
    }

    /// Registers text for a named source so diagnostics raised by
    /// statements from it can show an excerpt.
    pub fn add_source(&mut self, name: &str, text: &str) {
        self.state
            .sources
            .insert(name.to_string(), Rc::from(text));
    }

    /// Parses `text` as its own named source and runs it in `scope`. Errors
    /// raised by its statements are reported against `name`.
    pub fn execute_nested(&mut self, name: &str, text: &str, scope: &EnvironmentRef) -> Result<Flow> {
        self.add_source(name, text);
        let origin: Rc<str> = Rc::from(name);
        let program = tokenize(text, self.registry().keywords())
            .and_then(|tokens| {
                Parser::new(tokens, self.registry())
                    .with_origin(Some(Rc::clone(&origin)))
                    .parse_program()
            })
            .map_err(|diag| diag.at_source(Some(&origin)))?;
        tracing::debug!(source = name, statements = program.len(), "running nested source");
        self.execute_block(&program, scope)
    }

    fn drive(&mut self) -> Result<RunOutcome> {
        let globals = self.globals();
        let queue = Rc::clone(&self.state.queue);
        let mut last = Value::Null;
        while let Some(stmt) = queue.get(self.state.cursor) {
            self.state.cursor += 1;
            match self.execute_statement(stmt, &globals) {
                Ok(Flow::Normal(value)) => last = value,
                Ok(Flow::Suspend(_)) => {
                    self.state.paused = true;
                    tracing::debug!(cursor = self.state.cursor, "run paused");
                    return Ok(RunOutcome::Paused);
                }
                Ok(Flow::Return(value)) => {
                    last = value;
                    break;
                }
                Ok(Flow::Break | Flow::Continue) => {}
                Err(err) => return self.abort(err),
            }
            if self.state.paused {
                tracing::debug!(cursor = self.state.cursor, "run paused");
                return Ok(RunOutcome::Paused);
            }
        }
        self.state.queue = Rc::new(Vec::new());
        self.state.cursor = 0;
        tracing::debug!("run completed");
        Ok(RunOutcome::Completed(last))
    }

    /// Discards the queue, renders the error and offers it to the
    /// installed error handler.
    fn abort(&mut self, err: QuillError) -> Result<RunOutcome> {
        self.state.queue = Rc::new(Vec::new());
        self.state.cursor = 0;
        self.state.paused = false;
        let QuillError::Diagnostic(mut diag) = err else {
            return Err(err);
        };
        let name = diag
            .source
            .clone()
            .unwrap_or_else(|| Rc::clone(&self.state.source_name));
        let text = self.state.source_text(&name).unwrap_or_else(|| Rc::from(""));
        diag.excerpt = Some(diag.render(&name, &text));
        tracing::debug!(kind = diag.kind.label(), line = ?diag.line, "run aborted");

        if let Some(handler) = self.state.error_handler.clone() {
            tracing::debug!("invoking error handler");
            let globals = self.globals();
            match self.call_value(&handler, vec![diag.to_value()], &globals) {
                Ok(Value::Bool(true)) => return Ok(RunOutcome::Handled(diag)),
                Ok(_) => {}
                Err(handler_err) => {
                    tracing::warn!(error = %handler_err, "error handler failed");
                }
            }
        }
        Err(diag.into())
    }
}

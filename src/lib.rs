//! Quill: an embeddable scripting language runtime.
//!
//! Source text is lexed and parsed against a live [`HandlerRegistry`], then
//! run statement by statement by a tree-walking [`Interpreter`]. Control flow
//! and the standard prelude are installed through the same registry hosts
//! use to add their own statements, functions and values.

pub mod ast;
pub mod control;
pub mod diagnostics;
pub mod environment;
pub mod lexer;
pub mod operators;
pub mod parser;
pub mod registry;
pub mod repl;
pub mod runtime;
pub mod scheduler;
mod stack;
pub mod stdlib;
pub mod value;

pub use diagnostics::{Diagnostic, DiagnosticKind, QuillError, Result, TypeMismatch};
pub use environment::{Environment, EnvironmentRef};
pub use lexer::{tokenize, Token, TokenKind};
pub use parser::{parse, parse_source};
pub use registry::{Handler, HandlerKind, HandlerRegistry};
pub use repl::Repl;
pub use runtime::{Flow, Interpreter, RuntimeConfig, ScopePolicy};
pub use scheduler::RunOutcome;
pub use value::Value;

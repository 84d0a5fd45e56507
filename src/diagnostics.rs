use std::{fmt, rc::Rc};

use indexmap::IndexMap;
use thiserror::Error;

use crate::value::Value;

/// Classification of a diagnostic event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticKind {
    Lex,
    Parse,
    Name,
    Type,
    Typed,
    StackOverflow,
    UserThrow,
}

impl DiagnosticKind {
    /// Name exposed to scripts as the `type` field of a caught error.
    pub fn label(self) -> &'static str {
        match self {
            DiagnosticKind::Lex => "LexError",
            DiagnosticKind::Parse => "ParseError",
            DiagnosticKind::Name => "NameError",
            DiagnosticKind::Type => "TypeError",
            DiagnosticKind::Typed => "TypedError",
            DiagnosticKind::StackOverflow => "StackOverflow",
            DiagnosticKind::UserThrow => "UserThrow",
        }
    }
}

/// Structured payload of a strict-mode type violation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TypeMismatch {
    pub expected: String,
    pub got: String,
    pub value: String,
    pub operator: String,
    pub suggestion: Option<String>,
}

/// Rich diagnostic information surfaced to end users.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub message: String,
    /// 1-based line of the failing construct, when known.
    pub line: Option<usize>,
    /// Origin source for diagnostics raised outside the active script.
    pub source: Option<Rc<str>>,
    pub mismatch: Option<TypeMismatch>,
    pub notes: Vec<String>,
    /// Original value of a `throw`.
    pub payload: Option<Value>,
    /// Rendered report, attached once the error reaches the scheduler.
    pub excerpt: Option<String>,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            line: None,
            source: None,
            mismatch: None,
            notes: Vec::new(),
            payload: None,
            excerpt: None,
        }
    }

    pub fn stack_overflow(depth: usize) -> Self {
        Self::new(
            DiagnosticKind::StackOverflow,
            format!("infinite recursion detected: call depth exceeded {depth}"),
        )
        .with_note("check for a function that calls itself without a base case")
    }

    pub fn with_line(mut self, line: usize) -> Self {
        self.line = Some(line);
        self
    }

    /// Sets the line only if a more precise one was not recorded already.
    pub fn at_line(mut self, line: usize) -> Self {
        if self.line.is_none() {
            self.line = Some(line);
        }
        self
    }

    pub fn at_source(mut self, source: Option<&Rc<str>>) -> Self {
        if self.source.is_none() {
            self.source = source.cloned();
        }
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }

    pub fn with_mismatch(mut self, mismatch: TypeMismatch) -> Self {
        self.mismatch = Some(mismatch);
        self
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Normalized `{message, type, line, raw}` object handed to `catch`
    /// clauses and installed error handlers.
    pub fn to_value(&self) -> Value {
        let mut fields = IndexMap::new();
        fields.insert("message".to_string(), Value::string(self.message.as_str()));
        fields.insert("type".to_string(), Value::string(self.kind.label()));
        fields.insert(
            "line".to_string(),
            self.line
                .map(|line| Value::Number(line as f64))
                .unwrap_or(Value::Null),
        );
        let raw = self
            .payload
            .clone()
            .unwrap_or_else(|| Value::string(self.message.as_str()));
        fields.insert("raw".to_string(), raw);
        if let Some(mismatch) = &self.mismatch {
            fields.insert("expected".into(), Value::string(mismatch.expected.as_str()));
            fields.insert("got".into(), Value::string(mismatch.got.as_str()));
            fields.insert("operator".into(), Value::string(mismatch.operator.as_str()));
            if let Some(suggestion) = &mismatch.suggestion {
                fields.insert("suggestion".into(), Value::string(suggestion.as_str()));
            }
        }
        Value::object(fields)
    }

    /// Formats the report: header, source location, a three line excerpt
    /// centered on the failing line, then structured fields and notes.
    pub fn render(&self, source_name: &str, text: &str) -> String {
        let mut out = format!("{}: {}\n", self.kind.label(), self.message);
        let lines: Vec<&str> = text.lines().collect();
        match self.line {
            Some(line) => {
                out.push_str(&format!("  --> {source_name}, line {line}\n"));
                let first = line.saturating_sub(1).max(1);
                let last = (line + 1).min(lines.len());
                let width = last.max(line).to_string().len();
                for number in first..=last {
                    let Some(content) = lines.get(number - 1) else {
                        continue;
                    };
                    let marker = if number == line { '>' } else { ' ' };
                    out.push_str(&format!("{marker} {number:>width$} | {content}\n"));
                }
            }
            None => out.push_str(&format!("  --> {source_name}\n")),
        }
        if let Some(mismatch) = &self.mismatch {
            out.push_str(&format!("  = expected: {}\n", mismatch.expected));
            out.push_str(&format!("  = got: {}\n", mismatch.got));
            out.push_str(&format!("  = value: {}\n", mismatch.value));
            out.push_str(&format!("  = operator: {}\n", mismatch.operator));
            if let Some(suggestion) = &mismatch.suggestion {
                out.push_str(&format!("  = help: {suggestion}\n"));
            }
        }
        for note in &self.notes {
            out.push_str(&format!("  = note: {note}\n"));
        }
        out
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(excerpt) = &self.excerpt {
            return write!(f, "{}", excerpt.trim_end());
        }
        write!(f, "{}: {}", self.kind.label(), self.message)?;
        if let Some(line) = self.line {
            write!(f, " (line {line})")?;
        }
        for note in &self.notes {
            write!(f, "\n  note: {note}")?;
        }
        Ok(())
    }
}

impl std::error::Error for Diagnostic {}

/// Unified error type for the Quill runtime.
#[derive(Debug, Error)]
pub enum QuillError {
    #[error("{0}")]
    Diagnostic(#[from] Diagnostic),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl QuillError {
    pub fn diagnostic(&self) -> Option<&Diagnostic> {
        match self {
            QuillError::Diagnostic(diag) => Some(diag),
            QuillError::Io(_) => None,
        }
    }

    pub fn kind(&self) -> Option<DiagnosticKind> {
        self.diagnostic().map(|diag| diag.kind)
    }

    pub(crate) fn at_line(self, line: usize) -> Self {
        match self {
            QuillError::Diagnostic(diag) => QuillError::Diagnostic(diag.at_line(line)),
            other => other,
        }
    }

    pub(crate) fn at_source(self, origin: Option<&Rc<str>>) -> Self {
        match self {
            QuillError::Diagnostic(diag) => QuillError::Diagnostic(diag.at_source(origin)),
            other => other,
        }
    }
}

pub type Result<T> = std::result::Result<T, QuillError>;

use std::{cell::RefCell, fmt, rc::Rc};

use indexmap::IndexMap;
use num_bigint::BigInt;

use crate::{
    ast::{ClassDef, FunctionDef},
    environment::EnvironmentRef,
    registry::NativeCallback,
};

pub type ArrayRef = Rc<RefCell<Vec<Value>>>;
pub type ObjectRef = Rc<RefCell<IndexMap<String, Value>>>;

/// A runtime value. Arrays and objects are shared by reference; everything
/// else behaves as a plain value.
#[derive(Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Number(f64),
    BigInt(Rc<BigInt>),
    String(Rc<str>),
    Array(ArrayRef),
    Object(ObjectRef),
    Closure(Rc<Closure>),
    Class(Rc<ClassValue>),
    Native(NativeRef),
    /// Produced by a handler that paused the run; unwinds every enclosing
    /// evaluation up to the scheduler.
    Suspended(SuspensionMarker),
}

impl Value {
    pub fn string(value: impl Into<Rc<str>>) -> Self {
        Value::String(value.into())
    }

    pub fn array(values: Vec<Value>) -> Self {
        Value::Array(Rc::new(RefCell::new(values)))
    }

    pub fn object(entries: IndexMap<String, Value>) -> Self {
        Value::Object(Rc::new(RefCell::new(entries)))
    }

    pub fn bigint(value: BigInt) -> Self {
        Value::BigInt(Rc::new(value))
    }

    pub fn native(name: impl Into<Rc<str>>, callback: NativeCallback) -> Self {
        Value::Native(NativeRef {
            name: name.into(),
            callback,
        })
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null | Value::Suspended(_) => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::BigInt(n) => n.sign() != num_bigint::Sign::NoSign,
            Value::String(s) => !s.is_empty(),
            Value::Array(_)
            | Value::Object(_)
            | Value::Closure(_)
            | Value::Class(_)
            | Value::Native(_) => true,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::BigInt(_) => "bigint",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
            Value::Closure(_) | Value::Native(_) => "function",
            Value::Class(_) => "class",
            Value::Suspended(_) => "suspended",
        }
    }

    pub fn is_suspended(&self) -> bool {
        matches!(self, Value::Suspended(_))
    }

    pub fn is_callable(&self) -> bool {
        matches!(self, Value::Closure(_) | Value::Class(_) | Value::Native(_))
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Field read on an object, `None` for anything else.
    pub fn get_field(&self, name: &str) -> Option<Value> {
        match self {
            Value::Object(fields) => fields.borrow().get(name).cloned(),
            _ => None,
        }
    }
}

/// Formats a number the way scripts print it: integral values without a
/// fractional part.
pub fn format_number(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value.is_infinite() {
        let sign = if value > 0.0 { "" } else { "-" };
        format!("{sign}Infinity")
    } else if value == 0.0 {
        "0".to_string()
    } else if value.fract() == 0.0 && value.abs() < 1e16 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

impl PartialEq for Value {
    /// Structural equality. Script-level `===` lives in the operators module.
    fn eq(&self, other: &Self) -> bool {
        structural_eq(self, other, &mut Vec::new())
    }
}

/// Pairs of containers already being compared count as equal, so cyclic
/// values terminate.
fn structural_eq(a: &Value, b: &Value, comparing: &mut Vec<(*const (), *const ())>) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (Value::Number(a), Value::Number(b)) => a == b,
        (Value::BigInt(a), Value::BigInt(b)) => a == b,
        (Value::String(a), Value::String(b)) => a == b,
        (Value::Array(a), Value::Array(b)) => {
            if Rc::ptr_eq(a, b) {
                return true;
            }
            let pair = (Rc::as_ptr(a).cast::<()>(), Rc::as_ptr(b).cast::<()>());
            if comparing.contains(&pair) {
                return true;
            }
            comparing.push(pair);
            let (a, b) = (a.borrow(), b.borrow());
            let equal = a.len() == b.len()
                && a.iter().zip(b.iter()).all(|(x, y)| structural_eq(x, y, comparing));
            comparing.pop();
            equal
        }
        (Value::Object(a), Value::Object(b)) => {
            if Rc::ptr_eq(a, b) {
                return true;
            }
            let pair = (Rc::as_ptr(a).cast::<()>(), Rc::as_ptr(b).cast::<()>());
            if comparing.contains(&pair) {
                return true;
            }
            comparing.push(pair);
            let (a, b) = (a.borrow(), b.borrow());
            let equal = a.len() == b.len()
                && a.iter().all(|(key, x)| {
                    b.get(key).is_some_and(|y| structural_eq(x, y, comparing))
                });
            comparing.pop();
            equal
        }
        (Value::Closure(a), Value::Closure(b)) => Rc::ptr_eq(a, b),
        (Value::Class(a), Value::Class(b)) => Rc::ptr_eq(a, b),
        (Value::Native(a), Value::Native(b)) => Rc::ptr_eq(&a.callback, &b.callback),
        (Value::Suspended(_), Value::Suspended(_)) => true,
        _ => false,
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Number(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::string(value)
    }
}

impl From<SuspensionMarker> for Value {
    fn from(marker: SuspensionMarker) -> Self {
        Value::Suspended(marker)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => write!(f, "{s}"),
            other => write_value(f, other, &mut Vec::new()),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::BigInt(n) => write!(f, "{n}n"),
            other => write_value(f, other, &mut Vec::new()),
        }
    }
}

/// Shared rendering; strings nested in containers are quoted. A container
/// reached again while it is being rendered prints as `[...]` or `{...}`.
fn write_value(f: &mut fmt::Formatter<'_>, value: &Value, open: &mut Vec<*const ()>) -> fmt::Result {
    match value {
        Value::Null => write!(f, "null"),
        Value::Bool(b) => write!(f, "{b}"),
        Value::Number(n) => write!(f, "{}", format_number(*n)),
        Value::BigInt(n) => write!(f, "{n}"),
        Value::String(s) => write!(f, "{s:?}"),
        Value::Array(values) => {
            let ptr = Rc::as_ptr(values).cast::<()>();
            if open.contains(&ptr) {
                return write!(f, "[...]");
            }
            open.push(ptr);
            write!(f, "[")?;
            for (idx, value) in values.borrow().iter().enumerate() {
                if idx > 0 {
                    write!(f, ", ")?;
                }
                write_value(f, value, open)?;
            }
            open.pop();
            write!(f, "]")
        }
        Value::Object(fields) => {
            let ptr = Rc::as_ptr(fields).cast::<()>();
            if open.contains(&ptr) {
                return write!(f, "{{...}}");
            }
            let fields = fields.borrow();
            if fields.is_empty() {
                return write!(f, "{{}}");
            }
            open.push(ptr);
            write!(f, "{{ ")?;
            for (idx, (key, value)) in fields.iter().enumerate() {
                if idx > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{key}: ")?;
                write_value(f, value, open)?;
            }
            open.pop();
            write!(f, " }}")
        }
        Value::Closure(closure) => write!(
            f,
            "<function {}>",
            closure.name.as_deref().unwrap_or("anonymous")
        ),
        Value::Class(class) => write!(f, "<class {}>", class.name),
        Value::Native(native) => write!(f, "<native {}>", native.name),
        Value::Suspended(_) => write!(f, "<suspended>"),
    }
}

/// Token handed out by `Interpreter::suspend`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SuspensionMarker;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClosureKind {
    Function,
    /// Attached to a class instance; called with `this` bound.
    Method,
}

pub struct Closure {
    pub name: Option<String>,
    pub def: Rc<FunctionDef>,
    /// Scope the closure was created in.
    pub env: EnvironmentRef,
    pub kind: ClosureKind,
}

pub struct ClassValue {
    pub name: String,
    pub def: Rc<ClassDef>,
    pub superclass: Option<Rc<ClassValue>>,
    pub env: EnvironmentRef,
}

#[derive(Clone)]
pub struct NativeRef {
    pub name: Rc<str>,
    pub callback: NativeCallback,
}

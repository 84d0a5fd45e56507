//! Operator semantics shared by the evaluator and compound assignment.

use std::cmp::Ordering;

use num_bigint::BigInt;
use num_traits::{ToPrimitive, Zero};

use crate::{
    ast::{BinaryOp, UnaryOp},
    diagnostics::{Diagnostic, DiagnosticKind, TypeMismatch},
    value::Value,
};

/// Scope-resident flag that switches arithmetic into strict mode.
pub const STRICT_FLAG: &str = "__strict__";

pub fn binary(op: BinaryOp, left: &Value, right: &Value, strict: bool) -> Result<Value, Diagnostic> {
    match op {
        BinaryOp::Add => add(left, right, strict),
        BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => {
            arithmetic(op, left, right, strict)
        }
        BinaryOp::StrictEqual => Ok(Value::Bool(strict_equals(left, right))),
        BinaryOp::StrictNotEqual => Ok(Value::Bool(!strict_equals(left, right))),
        BinaryOp::Equal => Ok(Value::Bool(loose_equals(left, right))),
        BinaryOp::NotEqual => Ok(Value::Bool(!loose_equals(left, right))),
        BinaryOp::Less | BinaryOp::LessEqual | BinaryOp::Greater | BinaryOp::GreaterEqual => {
            relational(op, left, right)
        }
    }
}

pub fn unary(op: UnaryOp, value: &Value, strict: bool) -> Result<Value, Diagnostic> {
    let symbol = match op {
        UnaryOp::Not => return Ok(Value::Bool(!value.is_truthy())),
        UnaryOp::Negate => "-",
        UnaryOp::Plus => "+",
    };
    match value {
        Value::Number(n) => Ok(Value::Number(if op == UnaryOp::Negate { -n } else { *n })),
        Value::BigInt(n) if op == UnaryOp::Negate => Ok(Value::bigint(-(**n).clone())),
        Value::BigInt(_) => Err(type_error(format!(
            "unary `{symbol}` is not supported for bigint"
        ))),
        other if strict => Err(mismatch("number", other, symbol)),
        other => {
            let n = coerce(other, symbol)?;
            Ok(Value::Number(if op == UnaryOp::Negate { -n } else { n }))
        }
    }
}

/// `===`: primitives by value, containers and callables by identity.
pub fn strict_equals(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Array(a), Value::Array(b)) => std::rc::Rc::ptr_eq(a, b),
        (Value::Object(a), Value::Object(b)) => std::rc::Rc::ptr_eq(a, b),
        (Value::Closure(a), Value::Closure(b)) => std::rc::Rc::ptr_eq(a, b),
        (Value::Class(a), Value::Class(b)) => std::rc::Rc::ptr_eq(a, b),
        (Value::Native(a), Value::Native(b)) => std::rc::Rc::ptr_eq(&a.callback, &b.callback),
        _ => loose_equals(left, right),
    }
}

/// `==`: same-typed primitives only. There is no cross-type coercion and
/// containers never compare equal, not even to themselves.
pub fn loose_equals(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Null, Value::Null) => true,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (Value::Number(a), Value::Number(b)) => a == b,
        (Value::BigInt(a), Value::BigInt(b)) => a == b,
        (Value::String(a), Value::String(b)) => a == b,
        _ => false,
    }
}

fn add(left: &Value, right: &Value, strict: bool) -> Result<Value, Diagnostic> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => Ok(Value::Number(a + b)),
        (Value::BigInt(a), Value::BigInt(b)) => Ok(Value::bigint(&**a + &**b)),
        (Value::String(_), other) | (other, Value::String(_)) => {
            if strict && !matches!(other, Value::String(_)) {
                return Err(mismatch("string", other, "+"));
            }
            Ok(Value::string(format!("{left}{right}")))
        }
        (Value::Array(a), Value::Array(b)) => {
            let mut joined = a.borrow().clone();
            joined.extend(b.borrow().iter().cloned());
            Ok(Value::array(joined))
        }
        _ => Err(type_error(format!(
            "cannot apply `+` to {} and {}",
            left.type_name(),
            right.type_name()
        ))),
    }
}

fn arithmetic(op: BinaryOp, left: &Value, right: &Value, strict: bool) -> Result<Value, Diagnostic> {
    let symbol = op.symbol();
    match (left, right) {
        (Value::BigInt(a), Value::BigInt(b)) => bigint_arithmetic(op, a, b),
        (Value::BigInt(_), other) | (other, Value::BigInt(_)) => Err(type_error(format!(
            "cannot mix bigint and {} in `{symbol}`",
            other.type_name()
        ))),
        _ => {
            let (a, b) = if strict {
                (strict_number(left, symbol)?, strict_number(right, symbol)?)
            } else {
                (coerce(left, symbol)?, coerce(right, symbol)?)
            };
            let result = match op {
                BinaryOp::Sub => a - b,
                BinaryOp::Mul => a * b,
                BinaryOp::Div => a / b,
                _ => a % b,
            };
            Ok(Value::Number(result))
        }
    }
}

fn bigint_arithmetic(op: BinaryOp, a: &BigInt, b: &BigInt) -> Result<Value, Diagnostic> {
    let result = match op {
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div | BinaryOp::Mod if b.is_zero() => {
            return Err(type_error("bigint division by zero"));
        }
        BinaryOp::Div => a / b,
        _ => a % b,
    };
    Ok(Value::bigint(result))
}

fn relational(op: BinaryOp, left: &Value, right: &Value) -> Result<Value, Diagnostic> {
    let ordering = match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.partial_cmp(b),
        (Value::BigInt(a), Value::BigInt(b)) => Some(a.cmp(b)),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::BigInt(a), Value::Number(b)) => a.to_f64().and_then(|a| a.partial_cmp(b)),
        (Value::Number(a), Value::BigInt(b)) => b.to_f64().and_then(|b| a.partial_cmp(&b)),
        _ => {
            let symbol = op.symbol();
            coerce(left, symbol)?.partial_cmp(&coerce(right, symbol)?)
        }
    };
    // NaN compares false on every relation.
    let Some(ordering) = ordering else {
        return Ok(Value::Bool(false));
    };
    let result = match op {
        BinaryOp::Less => ordering == Ordering::Less,
        BinaryOp::LessEqual => ordering != Ordering::Greater,
        BinaryOp::Greater => ordering == Ordering::Greater,
        _ => ordering != Ordering::Less,
    };
    Ok(Value::Bool(result))
}

fn strict_number(value: &Value, operator: &str) -> Result<f64, Diagnostic> {
    value
        .as_number()
        .ok_or_else(|| mismatch("number", value, operator))
}

/// Non-strict numeric conversion.
fn coerce(value: &Value, operator: &str) -> Result<f64, Diagnostic> {
    to_number(value).ok_or_else(|| {
        type_error(format!(
            "cannot convert {} {value:?} to a number for `{operator}`",
            value.type_name()
        ))
    })
}

/// Numeric parsing used by coercion and `num()`.
pub fn to_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => Some(*n),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::Null => Some(0.0),
        Value::BigInt(n) => n.to_f64(),
        Value::String(text) => parse_number(text),
        _ => None,
    }
}

pub fn parse_number(text: &str) -> Option<f64> {
    let text = text.trim();
    if text.is_empty() {
        return Some(0.0);
    }
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };
    let radix = match digits.get(..2) {
        Some("0x" | "0X") => Some(16),
        Some("0o" | "0O") => Some(8),
        Some("0b" | "0B") => Some(2),
        _ => None,
    };
    let magnitude = match radix {
        Some(radix) => i64::from_str_radix(&digits[2..], radix).ok()? as f64,
        None if digits == "Infinity" => f64::INFINITY,
        None if digits.chars().all(|c| c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '+' | '-')) => {
            digits.parse::<f64>().ok()?
        }
        None => return None,
    };
    Some(if negative { -magnitude } else { magnitude })
}

fn type_error(message: impl Into<String>) -> Diagnostic {
    Diagnostic::new(DiagnosticKind::Type, message)
}

fn mismatch(expected: &str, got: &Value, operator: &str) -> Diagnostic {
    let suggestion = match got {
        Value::String(_) => Some("convert explicitly with num(...)".to_string()),
        Value::Number(_) | Value::BigInt(_) => Some("convert explicitly with str(...)".to_string()),
        _ => None,
    };
    Diagnostic::new(
        DiagnosticKind::Typed,
        format!(
            "`{operator}` expected {expected} but got {} in strict mode",
            got.type_name()
        ),
    )
    .with_mismatch(TypeMismatch {
        expected: expected.to_string(),
        got: got.type_name().to_string(),
        value: format!("{got:?}"),
        operator: operator.to_string(),
        suggestion,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_numeric_strings() {
        assert_eq!(parse_number(" 42 "), Some(42.0));
        assert_eq!(parse_number("-0x10"), Some(-16.0));
        assert_eq!(parse_number("1.5e2"), Some(150.0));
        assert_eq!(parse_number("abc"), None);
    }

    #[test]
    fn bigint_only_mixes_with_bigint() {
        let big = Value::bigint(BigInt::from(3));
        let err = binary(BinaryOp::Mul, &big, &Value::Number(2.0), false).unwrap_err();
        assert_eq!(err.kind, DiagnosticKind::Type);
    }
}

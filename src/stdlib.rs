//! The standard prelude, registered through the handler registry exactly as
//! a host integration would register its own functions.

use std::rc::Rc;

use indexmap::IndexMap;

use crate::{
    diagnostics::{Diagnostic, DiagnosticKind, Result},
    environment::EnvironmentRef,
    operators,
    registry::{Handler, HandlerRegistry, NativeCallback},
    runtime::Interpreter,
    value::Value,
};

type NativeFn = fn(&mut Interpreter, Vec<Value>, &EnvironmentRef) -> Result<Value>;

pub fn install(registry: &mut HandlerRegistry) {
    let functions: [(&str, NativeFn); 11] = [
        ("print", io_print),
        ("println", io_println),
        ("len", core_len),
        ("str", core_str),
        ("num", core_num),
        ("type", core_type),
        ("keys", core_keys),
        ("range", core_range),
        ("onError", runtime_on_error),
        ("wait", runtime_wait),
        ("pause", runtime_pause),
    ];
    for (name, callback) in functions {
        registry.register_handler(name, Handler::function(callback));
    }

    let methods: [(&str, NativeFn); 6] = [
        ("push", array_push),
        ("pop", array_pop),
        ("join", array_join),
        ("map", array_map),
        ("filter", array_filter),
        ("includes", collection_includes),
    ];
    for (name, callback) in methods {
        registry.register_handler(name, Handler::method(callback));
    }

    let duals: [(&str, NativeFn); 3] = [
        ("upper", string_upper),
        ("lower", string_lower),
        ("trim", string_trim),
    ];
    for (name, callback) in duals {
        registry.register_handler(name, Handler::dual(callback));
    }

    registry.register_handler("Math", Handler::value(math_namespace()));
}

fn math_namespace() -> Value {
    let natives: [(&str, NativeFn); 7] = [
        ("abs", math_abs),
        ("floor", math_floor),
        ("ceil", math_ceil),
        ("sqrt", math_sqrt),
        ("pow", math_pow),
        ("max", math_max),
        ("min", math_min),
    ];
    let mut math = IndexMap::new();
    math.insert("PI".to_string(), Value::Number(std::f64::consts::PI));
    math.insert("E".to_string(), Value::Number(std::f64::consts::E));
    for (name, callback) in natives {
        let callback: NativeCallback = Rc::new(callback);
        math.insert(name.to_string(), Value::native(name, callback));
    }
    Value::object(math)
}

fn ensure_exact(args: &[Value], expected: usize, name: &str) -> Result<()> {
    if args.len() != expected {
        return Err(usage_error(format!(
            "`{name}` expected {expected} arguments but received {}",
            args.len()
        )));
    }
    Ok(())
}

fn ensure_min(args: &[Value], min: usize, name: &str) -> Result<()> {
    if args.len() < min {
        return Err(usage_error(format!(
            "`{name}` expected at least {min} arguments but received {}",
            args.len()
        )));
    }
    Ok(())
}

fn usage_error(message: String) -> crate::QuillError {
    Diagnostic::new(DiagnosticKind::Type, message).into()
}

fn expect_string<'v>(value: &'v Value, name: &str) -> Result<&'v str> {
    value.as_str().ok_or_else(|| {
        usage_error(format!(
            "`{name}` expected a string but found {}",
            value.type_name()
        ))
    })
}

fn expect_number(value: &Value, name: &str) -> Result<f64> {
    value.as_number().ok_or_else(|| {
        usage_error(format!(
            "`{name}` expected a number but found {}",
            value.type_name()
        ))
    })
}

fn expect_array(value: &Value, name: &str) -> Result<crate::value::ArrayRef> {
    match value {
        Value::Array(items) => Ok(Rc::clone(items)),
        other => Err(usage_error(format!(
            "`{name}` expected an array but found {}",
            other.type_name()
        ))),
    }
}

// ----- output -----------------------------------------------------------------

fn io_print(interp: &mut Interpreter, args: Vec<Value>, _: &EnvironmentRef) -> Result<Value> {
    let line = args
        .iter()
        .map(|arg| arg.to_string())
        .collect::<Vec<_>>()
        .join(" ");
    interp.write_output(&line);
    Ok(Value::Null)
}

fn io_println(interp: &mut Interpreter, args: Vec<Value>, scope: &EnvironmentRef) -> Result<Value> {
    io_print(interp, args, scope)?;
    interp.write_output("\n");
    Ok(Value::Null)
}

// ----- conversions --------------------------------------------------------------

fn core_len(_: &mut Interpreter, args: Vec<Value>, _: &EnvironmentRef) -> Result<Value> {
    ensure_exact(&args, 1, "len")?;
    let len = match &args[0] {
        Value::String(s) => s.chars().count(),
        Value::Array(items) => items.borrow().len(),
        Value::Object(fields) => fields.borrow().len(),
        other => {
            return Err(usage_error(format!(
                "`len` expects a string, array or object, found {}",
                other.type_name()
            )))
        }
    };
    Ok(Value::Number(len as f64))
}

fn core_str(_: &mut Interpreter, args: Vec<Value>, _: &EnvironmentRef) -> Result<Value> {
    ensure_exact(&args, 1, "str")?;
    Ok(Value::string(args[0].to_string()))
}

fn core_num(_: &mut Interpreter, args: Vec<Value>, _: &EnvironmentRef) -> Result<Value> {
    ensure_exact(&args, 1, "num")?;
    operators::to_number(&args[0])
        .map(Value::Number)
        .ok_or_else(|| {
            usage_error(format!(
                "`num` cannot convert {:?} to a number",
                args[0]
            ))
        })
}

fn core_type(_: &mut Interpreter, args: Vec<Value>, _: &EnvironmentRef) -> Result<Value> {
    ensure_exact(&args, 1, "type")?;
    Ok(Value::string(args[0].type_name()))
}

fn core_keys(_: &mut Interpreter, args: Vec<Value>, _: &EnvironmentRef) -> Result<Value> {
    ensure_exact(&args, 1, "keys")?;
    match &args[0] {
        Value::Object(fields) => Ok(Value::array(
            fields
                .borrow()
                .keys()
                .map(|key| Value::string(key.as_str()))
                .collect(),
        )),
        other => Err(usage_error(format!(
            "`keys` expects an object, found {}",
            other.type_name()
        ))),
    }
}

/// `range(end)`, `range(start, end)` or `range(start, end, step)`.
fn core_range(_: &mut Interpreter, args: Vec<Value>, _: &EnvironmentRef) -> Result<Value> {
    ensure_min(&args, 1, "range")?;
    let numbers = args
        .iter()
        .map(|arg| expect_number(arg, "range"))
        .collect::<Result<Vec<_>>>()?;
    let (start, end, step) = match numbers.as_slice() {
        [end] => (0.0, *end, 1.0),
        [start, end] => (*start, *end, if start <= end { 1.0 } else { -1.0 }),
        [start, end, step] => (*start, *end, *step),
        _ => return Err(usage_error("`range` takes at most 3 arguments".to_string())),
    };
    if step == 0.0 {
        return Err(usage_error("range step must be non-zero".to_string()));
    }
    let mut values = Vec::new();
    let mut current = start;
    while (step > 0.0 && current < end) || (step < 0.0 && current > end) {
        values.push(Value::Number(current));
        current += step;
    }
    Ok(Value::array(values))
}

// ----- runtime hooks -----------------------------------------------------------

fn runtime_on_error(interp: &mut Interpreter, args: Vec<Value>, _: &EnvironmentRef) -> Result<Value> {
    ensure_exact(&args, 1, "onError")?;
    match &args[0] {
        Value::Null => interp.set_error_handler(None),
        handler if handler.is_callable() => interp.set_error_handler(Some(handler.clone())),
        other => {
            return Err(usage_error(format!(
                "`onError` expects a function, found {}",
                other.type_name()
            )))
        }
    }
    Ok(Value::Null)
}

/// Suspends the run; the host resumes it once `ms` milliseconds passed.
fn runtime_wait(interp: &mut Interpreter, args: Vec<Value>, _: &EnvironmentRef) -> Result<Value> {
    ensure_exact(&args, 1, "wait")?;
    let millis = expect_number(&args[0], "wait")?;
    if millis < 0.0 || millis.is_nan() {
        return Err(usage_error(
            "wait duration must be non-negative".to_string(),
        ));
    }
    Ok(interp.suspend_for(millis as u64).into())
}

fn runtime_pause(interp: &mut Interpreter, args: Vec<Value>, _: &EnvironmentRef) -> Result<Value> {
    ensure_exact(&args, 0, "pause")?;
    Ok(interp.suspend().into())
}

// ----- array methods -------------------------------------------------------------

fn array_push(_: &mut Interpreter, args: Vec<Value>, _: &EnvironmentRef) -> Result<Value> {
    ensure_min(&args, 2, "push")?;
    let items = expect_array(&args[0], "push")?;
    let mut items = items.borrow_mut();
    items.extend(args[1..].iter().cloned());
    Ok(Value::Number(items.len() as f64))
}

fn array_pop(_: &mut Interpreter, args: Vec<Value>, _: &EnvironmentRef) -> Result<Value> {
    ensure_exact(&args, 1, "pop")?;
    let items = expect_array(&args[0], "pop")?;
    let popped = items.borrow_mut().pop();
    Ok(popped.unwrap_or(Value::Null))
}

fn array_join(_: &mut Interpreter, args: Vec<Value>, _: &EnvironmentRef) -> Result<Value> {
    ensure_min(&args, 1, "join")?;
    let items = expect_array(&args[0], "join")?;
    let separator = match args.get(1) {
        Some(separator) => expect_string(separator, "join")?,
        None => ",",
    };
    let joined = items
        .borrow()
        .iter()
        .map(|item| item.to_string())
        .collect::<Vec<_>>()
        .join(separator);
    Ok(Value::string(joined))
}

/// Calls `callback(item, index)` for each element, stopping early if the
/// callback suspends.
fn array_map(interp: &mut Interpreter, args: Vec<Value>, scope: &EnvironmentRef) -> Result<Value> {
    ensure_exact(&args, 2, "map")?;
    let items = expect_array(&args[0], "map")?.borrow().clone();
    let mut mapped = Vec::with_capacity(items.len());
    for (index, item) in items.into_iter().enumerate() {
        let result = interp.call_value(&args[1], vec![item, Value::Number(index as f64)], scope)?;
        if result.is_suspended() {
            return Ok(result);
        }
        mapped.push(result);
    }
    Ok(Value::array(mapped))
}

fn array_filter(interp: &mut Interpreter, args: Vec<Value>, scope: &EnvironmentRef) -> Result<Value> {
    ensure_exact(&args, 2, "filter")?;
    let items = expect_array(&args[0], "filter")?.borrow().clone();
    let mut kept = Vec::new();
    for (index, item) in items.into_iter().enumerate() {
        let verdict =
            interp.call_value(&args[1], vec![item.clone(), Value::Number(index as f64)], scope)?;
        if verdict.is_suspended() {
            return Ok(verdict);
        }
        if verdict.is_truthy() {
            kept.push(item);
        }
    }
    Ok(Value::array(kept))
}

fn collection_includes(_: &mut Interpreter, args: Vec<Value>, _: &EnvironmentRef) -> Result<Value> {
    ensure_exact(&args, 2, "includes")?;
    let found = match (&args[0], &args[1]) {
        (Value::Array(items), needle) => items
            .borrow()
            .iter()
            .any(|item| operators::strict_equals(item, needle)),
        (Value::String(text), Value::String(needle)) => text.contains(&**needle),
        (other, _) => {
            return Err(usage_error(format!(
                "`includes` expects an array or string, found {}",
                other.type_name()
            )))
        }
    };
    Ok(Value::Bool(found))
}

// ----- strings -----------------------------------------------------------------

fn string_upper(_: &mut Interpreter, args: Vec<Value>, _: &EnvironmentRef) -> Result<Value> {
    ensure_exact(&args, 1, "upper")?;
    Ok(Value::string(expect_string(&args[0], "upper")?.to_uppercase()))
}

fn string_lower(_: &mut Interpreter, args: Vec<Value>, _: &EnvironmentRef) -> Result<Value> {
    ensure_exact(&args, 1, "lower")?;
    Ok(Value::string(expect_string(&args[0], "lower")?.to_lowercase()))
}

fn string_trim(_: &mut Interpreter, args: Vec<Value>, _: &EnvironmentRef) -> Result<Value> {
    ensure_exact(&args, 1, "trim")?;
    Ok(Value::string(expect_string(&args[0], "trim")?.trim()))
}

// ----- Math --------------------------------------------------------------------

fn math_unary(args: &[Value], name: &str, op: fn(f64) -> f64) -> Result<Value> {
    ensure_exact(args, 1, name)?;
    Ok(Value::Number(op(expect_number(&args[0], name)?)))
}

fn math_abs(_: &mut Interpreter, args: Vec<Value>, _: &EnvironmentRef) -> Result<Value> {
    math_unary(&args, "Math.abs", f64::abs)
}

fn math_floor(_: &mut Interpreter, args: Vec<Value>, _: &EnvironmentRef) -> Result<Value> {
    math_unary(&args, "Math.floor", f64::floor)
}

fn math_ceil(_: &mut Interpreter, args: Vec<Value>, _: &EnvironmentRef) -> Result<Value> {
    math_unary(&args, "Math.ceil", f64::ceil)
}

fn math_sqrt(_: &mut Interpreter, args: Vec<Value>, _: &EnvironmentRef) -> Result<Value> {
    math_unary(&args, "Math.sqrt", f64::sqrt)
}

fn math_pow(_: &mut Interpreter, args: Vec<Value>, _: &EnvironmentRef) -> Result<Value> {
    ensure_exact(&args, 2, "Math.pow")?;
    let base = expect_number(&args[0], "Math.pow")?;
    let exponent = expect_number(&args[1], "Math.pow")?;
    Ok(Value::Number(base.powf(exponent)))
}

fn math_extreme(args: &[Value], name: &str, pick: fn(f64, f64) -> f64) -> Result<Value> {
    ensure_min(args, 1, name)?;
    let mut best = expect_number(&args[0], name)?;
    for arg in &args[1..] {
        best = pick(best, expect_number(arg, name)?);
    }
    Ok(Value::Number(best))
}

fn math_max(_: &mut Interpreter, args: Vec<Value>, _: &EnvironmentRef) -> Result<Value> {
    math_extreme(&args, "Math.max", f64::max)
}

fn math_min(_: &mut Interpreter, args: Vec<Value>, _: &EnvironmentRef) -> Result<Value> {
    math_extreme(&args, "Math.min", f64::min)
}

use std::cmp::Ordering;

use chariot_core::{ChariotError, Value};

use super::{arg, num_arg};
use crate::registry::{FunctionRegistry, FunctionSpec};

/// Ordering for the comparison builtins. Numbers and strings compare among
/// themselves; anything else, null included, is unordered.
fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            if (x - y).abs() <= chariot_core::value::NUMBER_EPSILON {
                Some(Ordering::Equal)
            } else {
                x.partial_cmp(y)
            }
        }
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn comparison(
    name: &'static str,
    usage: &'static str,
    accept: fn(Ordering) -> bool,
) -> FunctionSpec {
    FunctionSpec::new(name, 2, Some(2), usage, move |_, args| {
        let ordering = compare(arg(name, &args, 0)?, arg(name, &args, 1)?);
        Ok(Value::Bool(ordering.is_some_and(accept)))
    })
}

pub(super) fn register(registry: &mut FunctionRegistry) {
    // ── Equality and ordering ──
    registry.register(FunctionSpec::new("equal", 2, Some(2), "equal(a, b)", |_, args| {
        Ok(Value::Bool(args[0].equals(&args[1])))
    }));
    registry.register(FunctionSpec::new("unequal", 2, Some(2), "unequal(a, b)", |_, args| {
        Ok(Value::Bool(!args[0].equals(&args[1])))
    }));
    registry.register(comparison("bigger", "bigger(a, b)", Ordering::is_gt));
    registry.register(comparison("smaller", "smaller(a, b)", Ordering::is_lt));
    registry.register(comparison("biggerEq", "biggerEq(a, b)", Ordering::is_ge));
    registry.register(comparison("smallerEq", "smallerEq(a, b)", Ordering::is_le));

    // ── Boolean logic ──
    registry.register(FunctionSpec::new("and", 1, None, "and(a, b, ...)", |_, args| {
        Ok(Value::Bool(args.iter().all(Value::is_truthy)))
    }));
    registry.register(FunctionSpec::new("or", 1, None, "or(a, b, ...)", |_, args| {
        Ok(Value::Bool(args.iter().any(Value::is_truthy)))
    }));
    registry.register(FunctionSpec::new("not", 1, Some(1), "not(value)", |_, args| {
        Ok(Value::Bool(!args[0].is_truthy()))
    }));

    // ── Arithmetic ──
    registry.register(FunctionSpec::new("add", 2, None, "add(a, b, ...)", |_, args| {
        let mut sum = 0.0;
        for i in 0..args.len() {
            sum += num_arg("add", &args, i)?;
        }
        Ok(Value::Number(sum))
    }));
    registry.register(FunctionSpec::new("sub", 2, Some(2), "sub(a, b)", |_, args| {
        Ok(Value::Number(num_arg("sub", &args, 0)? - num_arg("sub", &args, 1)?))
    }));
    registry.register(FunctionSpec::new("mul", 2, None, "mul(a, b, ...)", |_, args| {
        let mut product = 1.0;
        for i in 0..args.len() {
            product *= num_arg("mul", &args, i)?;
        }
        Ok(Value::Number(product))
    }));
    registry.register(FunctionSpec::new("div", 2, Some(2), "div(a, b)", |_, args| {
        let divisor = num_arg("div", &args, 1)?;
        if divisor == 0.0 {
            return Err(ChariotError::InvalidArgument("div: division by zero".into()));
        }
        Ok(Value::Number(num_arg("div", &args, 0)? / divisor))
    }));
}

//! The built-in function library.
//!
//! Enough to declare and mutate variables, compute and
//! compare, build collections and tree documents, log, and drive plans and
//! agents.

use chariot_core::{ChariotError, Result, Value};

use crate::registry::FunctionRegistry;

mod collections;
mod logic;
mod plans;
mod tree;
mod values;

pub fn register_all(registry: &mut FunctionRegistry) {
    values::register(registry);
    logic::register(registry);
    collections::register(registry);
    tree::register(registry);
    plans::register(registry);
}

/// Argument `i` as a string, or a type mismatch naming `function`.
pub(crate) fn str_arg<'a>(function: &str, args: &'a [Value], i: usize) -> Result<&'a str> {
    arg(function, args, i)?.expect_str(function)
}

pub(crate) fn num_arg(function: &str, args: &[Value], i: usize) -> Result<f64> {
    arg(function, args, i)?.expect_number(function)
}

pub(crate) fn arg<'a>(function: &str, args: &'a [Value], i: usize) -> Result<&'a Value> {
    args.get(i).ok_or_else(|| {
        ChariotError::InvalidArgument(format!("{function}: missing argument {}", i + 1))
    })
}

/// Index argument: a non-negative whole number.
pub(crate) fn index_arg(function: &str, args: &[Value], i: usize) -> Result<usize> {
    let n = num_arg(function, args, i)?;
    if n < 0.0 || n.fract() != 0.0 {
        return Err(ChariotError::OutOfBounds(format!(
            "{function}: index {n} is not a valid position"
        )));
    }
    Ok(n as usize)
}

use std::collections::HashMap;

use chariot_core::value::ArrayRef;
use chariot_core::{ChariotError, Result, Value};

use super::{arg, index_arg, str_arg};
use crate::registry::{FunctionRegistry, FunctionSpec};

pub(super) fn register(registry: &mut FunctionRegistry) {
    registry.register(FunctionSpec::new("array", 0, None, "array(items...)", |_, args| {
        Ok(Value::array(args))
    }));

    registry.register(FunctionSpec::new(
        "map",
        0,
        None,
        "map(key, value, ...)",
        |_, args| {
            if args.len() % 2 != 0 {
                return Err(ChariotError::InvalidArgument(
                    "map: expects key/value pairs".into(),
                ));
            }
            let mut entries = HashMap::with_capacity(args.len() / 2);
            for pair in args.chunks(2) {
                let key = pair[0].expect_str("map")?.to_string();
                entries.insert(key, pair[1].clone());
            }
            Ok(Value::map(entries))
        },
    ));

    registry.register(FunctionSpec::new("length", 1, Some(1), "length(value)", |_, args| {
        let n = match &args[0] {
            Value::Array(items) => items.read().len(),
            Value::Map(entries) => entries.read().len(),
            Value::String(s) => s.chars().count(),
            Value::Tree(t) => t.read().children.len(),
            other => {
                return Err(ChariotError::type_mismatch(
                    "length",
                    format!("{} has no length", other.type_tag().name()),
                ));
            }
        };
        Ok(Value::Number(n as f64))
    }));

    registry.register(FunctionSpec::new(
        "getAt",
        2,
        Some(2),
        "getAt(array, index)",
        |_, args| {
            let items = array_arg("getAt", &args)?;
            let index = index_arg("getAt", &args, 1)?;
            let items = items.read();
            items.get(index).cloned().ok_or_else(|| {
                ChariotError::OutOfBounds(format!(
                    "getAt: index {index} out of range for length {}",
                    items.len()
                ))
            })
        },
    ));

    registry.register(FunctionSpec::new(
        "setAt",
        3,
        Some(3),
        "setAt(array, index, value)",
        |_, args| {
            let items = array_arg("setAt", &args)?;
            let index = index_arg("setAt", &args, 1)?;
            args[0].ensure_acyclic("setAt", &args[2])?;
            let mut items = items.write();
            let len = items.len();
            let slot = items.get_mut(index).ok_or_else(|| {
                ChariotError::OutOfBounds(format!(
                    "setAt: index {index} out of range for length {len}"
                ))
            })?;
            *slot = args[2].clone();
            Ok(args[2].clone())
        },
    ));

    registry.register(FunctionSpec::new(
        "append",
        2,
        None,
        "append(array, items...)",
        |_, args| {
            let items = array_arg("append", &args)?;
            for item in &args[1..] {
                args[0].ensure_acyclic("append", item)?;
            }
            items.write().extend(args[1..].iter().cloned());
            Ok(args[0].clone())
        },
    ));

    registry.register(FunctionSpec::new("keys", 1, Some(1), "keys(map)", |_, args| {
        let Value::Map(entries) = &args[0] else {
            return Err(ChariotError::type_mismatch(
                "keys",
                format!("expected map, got {}", args[0].type_tag().name()),
            ));
        };
        let mut keys: Vec<String> = entries.read().keys().cloned().collect();
        keys.sort();
        Ok(Value::array(keys.into_iter().map(Value::String).collect()))
    }));

    registry.register(FunctionSpec::new(
        "concat",
        1,
        None,
        "concat(values...)",
        |_, args| {
            // Strings are joined raw; everything else uses its display form.
            let joined: String = args.iter().map(|v| v.to_string()).collect();
            Ok(Value::String(joined))
        },
    ));

    registry.register(FunctionSpec::new(
        "hasKey",
        2,
        Some(2),
        "hasKey(map, key)",
        |_, args| {
            let key = str_arg("hasKey", &args, 1)?;
            match arg("hasKey", &args, 0)? {
                Value::Map(entries) => Ok(Value::Bool(entries.read().contains_key(key))),
                other => Err(ChariotError::type_mismatch(
                    "hasKey",
                    format!("expected map, got {}", other.type_tag().name()),
                )),
            }
        },
    ));
}

fn array_arg(function: &str, args: &[Value]) -> Result<ArrayRef> {
    match arg(function, args, 0)? {
        Value::Array(items) => Ok(items.clone()),
        other => Err(ChariotError::type_mismatch(
            function,
            format!("expected array, got {}", other.type_tag().name()),
        )),
    }
}

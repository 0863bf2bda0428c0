use tracing::{debug, error, info, warn};

use chariot_core::{ChariotError, Result, ScopeEntry, TypeTag, Value};

use super::{arg, str_arg};
use crate::log::{LogEntry, LogLevel};
use crate::registry::{FunctionRegistry, FunctionSpec};

pub(super) fn register(registry: &mut FunctionRegistry) {
    registry.register(
        FunctionSpec::new("declare", 2, Some(3), "declare(name, type[, value])", |ev, args| {
            let (name, entry) = declaration("declare", &args)?;
            let value = entry.value.clone();
            ev.scope().declare(name, entry)?;
            Ok(value)
        })
        .quoted(),
    );

    registry.register(
        FunctionSpec::new(
            "declareGlobal",
            2,
            Some(3),
            "declareGlobal(name, type[, value])",
            |ev, args| {
                let (name, entry) = declaration("declareGlobal", &args)?;
                let value = entry.value.clone();
                ev.runtime().globals().declare(name, entry)?;
                Ok(value)
            },
        )
        .quoted(),
    );

    registry.register(
        FunctionSpec::new("setq", 2, Some(2), "setq(name, value)", |ev, mut args| {
            let value = args.pop().unwrap_or_default();
            let name = str_arg("setq", &args, 0)?;
            if !ev.scope().assign(name, value.clone())? {
                ev.scope().bind(name, value.clone());
            }
            Ok(value)
        })
        .quoted(),
    );

    registry.register(FunctionSpec::new(
        "getVariable",
        1,
        Some(1),
        "getVariable(name)",
        |ev, args| ev.resolve(str_arg("getVariable", &args, 0)?),
    ));

    registry.register(FunctionSpec::new("typeOf", 1, Some(1), "typeOf(value)", |_, args| {
        Ok(Value::String(arg("typeOf", &args, 0)?.type_code().to_string()))
    }));

    registry.register(FunctionSpec::new("isNull", 1, Some(1), "isNull(value)", |_, args| {
        Ok(Value::Bool(arg("isNull", &args, 0)?.is_null()))
    }));

    registry.register(FunctionSpec::new(
        "getProp",
        2,
        Some(2),
        "getProp(target, property)",
        |_, args| arg("getProp", &args, 0)?.get_prop(str_arg("getProp", &args, 1)?),
    ));

    registry.register(FunctionSpec::new(
        "setProp",
        3,
        Some(3),
        "setProp(target, property, value)",
        |_, mut args| {
            let value = args.pop().unwrap_or_default();
            let target = arg("setProp", &args, 0)?;
            target.set_prop(str_arg("setProp", &args, 1)?, value)?;
            Ok(target.clone())
        },
    ));

    registry.register(FunctionSpec::new(
        "call",
        1,
        None,
        "call(function, args...)",
        |ev, mut args| {
            let closure = args.remove(0).expect_closure("call")?;
            ev.call_closure(&closure, args)
        },
    ));

    registry.register(FunctionSpec::new(
        "logPrint",
        1,
        Some(2),
        "logPrint(message[, level])",
        |ev, args| {
            let message = arg("logPrint", &args, 0)?.to_string();
            let level = match args.get(1) {
                Some(v) => LogLevel::parse(v.expect_str("logPrint")?),
                None => LogLevel::Info,
            };
            match level {
                LogLevel::Debug => debug!(target: "chariot::program", "{message}"),
                LogLevel::Info => info!(target: "chariot::program", "{message}"),
                LogLevel::Warn => warn!(target: "chariot::program", "{message}"),
                LogLevel::Error => error!(target: "chariot::program", "{message}"),
            }
            ev.runtime().sink().append(LogEntry::new(level, message));
            Ok(Value::Bool(true))
        },
    ));
}

/// Shared argument handling for `declare` and `declareGlobal`.
fn declaration<'a>(function: &str, args: &'a [Value]) -> Result<(&'a str, ScopeEntry)> {
    let name = str_arg(function, args, 0)?;
    let code = str_arg(function, args, 1)?;
    let tag = TypeTag::from_code(code).ok_or_else(|| {
        ChariotError::InvalidArgument(format!("{function}: unknown type code '{code}'"))
    })?;
    let value = args.get(2).cloned().unwrap_or_default();
    if tag != TypeTag::Null && !value.is_null() && value.type_tag() != tag {
        return Err(ChariotError::type_mismatch(
            function,
            format!("cannot declare {name} as {tag}: value is {}", value.type_tag()),
        ));
    }
    Ok((name, ScopeEntry::typed(value, tag)))
}

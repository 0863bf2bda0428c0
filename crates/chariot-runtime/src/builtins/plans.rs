use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chariot_core::{ChariotError, Plan, Result, Value};

use super::{arg, str_arg};
use crate::agent::StartOptions;
use crate::engine::{self, CycleOutcome, PlanRun, RunMode};
use crate::evaluator::Evaluator;
use crate::registry::{FunctionRegistry, FunctionSpec};

/// Snapshot of plan argument `i`, so no lock is held while it runs.
fn plan_arg(function: &str, args: &[Value], i: usize) -> Result<Plan> {
    Ok(arg(function, args, i)?.expect_plan(function)?.read().clone())
}

/// Optional run mode and transient vars, in either order.
fn run_options(function: &str, args: &[Value]) -> Result<(RunMode, HashMap<String, Value>)> {
    let mut mode = RunMode::Bdi;
    let mut vars = HashMap::new();
    for extra in args.iter().skip(1) {
        match extra {
            Value::String(s) => mode = RunMode::parse(s),
            Value::Map(m) => vars = m.read().clone(),
            Value::Null => {}
            other => {
                return Err(ChariotError::type_mismatch(
                    function,
                    format!("expected mode or vars map, got {}", other.type_tag().name()),
                ));
            }
        }
    }
    Ok((mode, vars))
}

/// One pass on the caller's own runtime. The caller already holds its
/// execution lock, so the run is not serialized again.
fn run_in_place(
    ev: &mut Evaluator<'_>,
    plan: &Plan,
    mode: RunMode,
    vars: HashMap<String, Value>,
) -> Result<CycleOutcome> {
    let scope = engine::instance_scope(ev.runtime(), plan, &vars);
    let layered = ev.layered_beliefs(vars);
    let saved = ev.replace_beliefs(layered);
    let outcome = PlanRun::new(plan, mode, scope).run(ev);
    ev.replace_beliefs(saved);
    outcome
}

/// One pass on a session clone of the caller's runtime, with the plan's
/// closures rebound to the clone.
fn run_on_clone(
    ev: &Evaluator<'_>,
    plan: &Plan,
    mode: RunMode,
    vars: HashMap<String, Value>,
) -> Result<CycleOutcome> {
    let rt = ev.runtime().clone_for_session();
    let plan = plan.rebind(rt.globals());
    let scope = engine::instance_scope(&rt, &plan, &vars);
    let _guard = rt.lock_exec();
    let mut sub = Evaluator::new(&rt, Arc::clone(rt.globals()));
    sub.replace_beliefs(ev.layered_beliefs(vars));
    PlanRun::new(&plan, mode, scope).run(&mut sub)
}

fn agent_info_value(info: crate::agent::AgentInfo) -> Value {
    let entries = HashMap::from([
        ("name".to_string(), Value::String(info.name)),
        ("plan".to_string(), Value::String(info.plan)),
        ("running".to_string(), Value::Number(info.running as f64)),
        ("maxConcurrent".to_string(), Value::Number(info.max_concurrent as f64)),
        ("pollIntervalMs".to_string(), Value::Number(info.poll_interval_ms as f64)),
        ("beliefCount".to_string(), Value::Number(info.belief_count as f64)),
        ("cycles".to_string(), Value::Number(info.cycles as f64)),
        ("failures".to_string(), Value::Number(info.failures as f64)),
    ]);
    Value::map(entries)
}

pub(super) fn register(registry: &mut FunctionRegistry) {
    // ── Plans ──
    registry.register(FunctionSpec::new(
        "plan",
        6,
        Some(6),
        "plan(name, params, trigger, guard, steps, drop)",
        |_, args| {
            let [name, params, trigger, guard, steps, drop_cond] = &args[..] else {
                return Err(ChariotError::InvalidArgument("plan: expected 6 arguments".into()));
            };
            let plan = Plan::from_values(name, params, trigger, guard, steps, drop_cond)?;
            Ok(Value::plan(plan))
        },
    ));

    registry.register(FunctionSpec::new(
        "runPlanOnce",
        1,
        Some(1),
        "runPlanOnce(plan)",
        |ev, args| {
            let plan = plan_arg("runPlanOnce", &args, 0)?;
            let outcome = run_in_place(ev, &plan, RunMode::Bdi, HashMap::new())?;
            Ok(Value::Bool(outcome.succeeded()))
        },
    ));

    registry.register(FunctionSpec::new(
        "runPlanOnceEx",
        1,
        Some(3),
        "runPlanOnceEx(plan[, mode][, vars])",
        |ev, args| {
            let plan = plan_arg("runPlanOnceEx", &args, 0)?;
            let (mode, vars) = run_options("runPlanOnceEx", &args)?;
            let outcome = run_on_clone(ev, &plan, mode, vars)?;
            Ok(Value::Bool(outcome.succeeded()))
        },
    ));

    registry.register(FunctionSpec::new(
        "runPlanOnceBDI",
        1,
        Some(2),
        "runPlanOnceBDI(plan[, vars])",
        |ev, args| {
            let plan = plan_arg("runPlanOnceBDI", &args, 0)?;
            let (_, vars) = run_options("runPlanOnceBDI", &args)?;
            let outcome = run_on_clone(ev, &plan, RunMode::Bdi, vars)?;
            Ok(Value::Bool(outcome.succeeded()))
        },
    ));

    // ── Agents ──
    registry.register(FunctionSpec::new(
        "agentStartNamed",
        2,
        Some(4),
        "agentStartNamed(name, plan[, maxConcurrent][, pollIntervalMs])",
        |ev, args| {
            let name = str_arg("agentStartNamed", &args, 0)?;
            let plan = plan_arg("agentStartNamed", &args, 1)?;
            let options = StartOptions {
                max_concurrent: optional_count("agentStartNamed", args.get(2))?,
                poll_interval: optional_count("agentStartNamed", args.get(3))?
                    .map(|ms| Duration::from_millis(ms as u64)),
            };
            let rt = ev.runtime();
            let started = rt.agents().start(name, rt, &plan, options)?;
            Ok(Value::Bool(started))
        },
    ));

    registry.register(FunctionSpec::new(
        "agentStopNamed",
        1,
        Some(1),
        "agentStopNamed(name)",
        |ev, args| {
            let name = str_arg("agentStopNamed", &args, 0)?;
            Ok(Value::Bool(ev.runtime().agents().stop(name, "stopped by program")))
        },
    ));

    registry.register(FunctionSpec::new("agentList", 0, Some(0), "agentList()", |ev, _| {
        let names = ev.runtime().agents().list();
        Ok(Value::array(names.into_iter().map(Value::String).collect()))
    }));

    registry.register(FunctionSpec::new(
        "agentBelief",
        3,
        Some(3),
        "agentBelief(name, key, value)",
        |ev, args| {
            let name = str_arg("agentBelief", &args, 0)?;
            let key = str_arg("agentBelief", &args, 1)?;
            ev.runtime()
                .agents()
                .publish_belief(name, key, args[2].clone())?;
            Ok(args[2].clone())
        },
    ));

    registry.register(FunctionSpec::new(
        "agentPublish",
        1,
        Some(1),
        "agentPublish(name)",
        |ev, args| {
            ev.runtime().agents().nudge(str_arg("agentPublish", &args, 0)?)?;
            Ok(Value::Bool(true))
        },
    ));

    registry.register(FunctionSpec::new(
        "belief",
        2,
        Some(2),
        "belief(name, key)",
        |ev, args| {
            let name = str_arg("belief", &args, 0)?;
            let key = str_arg("belief", &args, 1)?;
            if let Some(v) = ev.belief_override(key) {
                return Ok(v);
            }
            Ok(ev.runtime().agents().belief(name, key))
        },
    ));

    registry.register(FunctionSpec::new(
        "agentBeliefs",
        1,
        Some(1),
        "agentBeliefs(name)",
        |ev, args| {
            let name = str_arg("agentBeliefs", &args, 0)?;
            Ok(ev
                .runtime()
                .agents()
                .beliefs(name)
                .map(Value::map)
                .unwrap_or_default())
        },
    ));

    registry.register(FunctionSpec::new(
        "agentInfo",
        1,
        Some(1),
        "agentInfo(name)",
        |ev, args| {
            let name = str_arg("agentInfo", &args, 0)?;
            Ok(ev
                .runtime()
                .agents()
                .info(name)
                .map(agent_info_value)
                .unwrap_or_default())
        },
    ));
}

/// A positive whole number, or `None` for an absent or null argument.
fn optional_count(function: &str, value: Option<&Value>) -> Result<Option<usize>> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(v) => {
            let n = v.expect_number(function)?;
            if n < 1.0 || n.fract() != 0.0 {
                return Err(ChariotError::InvalidArgument(format!(
                    "{function}: expected a positive whole number, got {n}"
                )));
            }
            Ok(Some(n as usize))
        }
    }
}

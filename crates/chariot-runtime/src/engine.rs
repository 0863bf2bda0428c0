//! Single-pass plan execution: drop → trigger → guard → steps.
//!
//! Both the one-shot `runPlanOnce*` builtins and the agent runners drive
//! plans through [`PlanRun`]; they differ only in locking, cancellation, and
//! whether lifecycle events are published.

use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use chariot_core::{
    AgentEvent, Closure, EventBus, EventStatus, Plan, Result, Scope, ScopeRef, Value,
};

use crate::evaluator::Evaluator;
use crate::runtime::Runtime;

/// Which checks a single pass honours.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunMode {
    /// Trigger and guard must both hold; drop aborts.
    #[default]
    Bdi,
    /// Skip the trigger.
    GuardOnly,
    /// Skip trigger and guard.
    Force,
    /// Skip trigger and guard and ignore drop.
    ForceAll,
    /// Evaluate drop, trigger, and guard only; run no steps.
    DryRun,
}

impl RunMode {
    /// Unknown modes fall back to [`RunMode::Bdi`].
    pub fn parse(mode: &str) -> Self {
        match mode.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "bdi" | "" => Self::Bdi,
            "guard-only" | "guardonly" => Self::GuardOnly,
            "force" => Self::Force,
            "force-all" | "forceall" => Self::ForceAll,
            "dry-run" | "dryrun" => Self::DryRun,
            other => {
                debug!(mode = %other, "unknown plan run mode, using bdi");
                Self::Bdi
            }
        }
    }

    fn checks_trigger(self) -> bool {
        matches!(self, Self::Bdi | Self::DryRun)
    }

    fn checks_guard(self) -> bool {
        matches!(self, Self::Bdi | Self::GuardOnly | Self::DryRun)
    }

    fn honours_drop(self) -> bool {
        self != Self::ForceAll
    }
}

/// Result of the pre-step checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    Proceed,
    Dropped,
    NotTriggered,
    GuardFailed,
}

/// How one pass through a plan ended. `Dropped` is an ordinary outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    Completed { steps: usize },
    Dropped { completed_steps: usize },
    NotTriggered,
    GuardFailed,
    Cancelled { completed_steps: usize },
    DryRun { would_run: bool },
}

impl CycleOutcome {
    /// What the one-shot builtins return: the run completed, or it reached a
    /// drop boundary after at least one step.
    pub fn succeeded(&self) -> bool {
        match *self {
            Self::Completed { .. } => true,
            Self::Dropped { completed_steps } => completed_steps > 0,
            Self::DryRun { would_run } => would_run,
            Self::NotTriggered | Self::GuardFailed | Self::Cancelled { .. } => false,
        }
    }
}

/// Per-run scope for `plan`: a child of the trigger's defining scope holding
/// the plan's parameters (from `vars`, else null) and every transient var.
pub fn instance_scope(rt: &Runtime, plan: &Plan, vars: &HashMap<String, Value>) -> ScopeRef {
    let parent = plan
        .trigger
        .scope
        .clone()
        .unwrap_or_else(|| Arc::clone(rt.globals()));
    let scope = Scope::child(&parent);
    for param in &plan.params {
        scope.bind(param, vars.get(param).cloned().unwrap_or_default());
    }
    for (name, value) in vars {
        scope.bind(name, value.clone());
    }
    scope
}

struct Observer {
    agent: String,
    events: EventBus,
}

/// One pass of a plan against an evaluator.
pub struct PlanRun<'p> {
    plan: &'p Plan,
    mode: RunMode,
    scope: ScopeRef,
    serialize: bool,
    cancel: Option<CancellationToken>,
    observer: Option<Observer>,
}

impl<'p> PlanRun<'p> {
    pub fn new(plan: &'p Plan, mode: RunMode, scope: ScopeRef) -> Self {
        Self {
            plan,
            mode,
            scope,
            serialize: false,
            cancel: None,
            observer: None,
        }
    }

    /// Take the runtime's execution lock around each closure evaluation.
    /// Callers already inside an evaluation must not set this.
    pub fn serialized(mut self) -> Self {
        self.serialize = true;
        self
    }

    pub fn cancellable(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Publish lifecycle events for `agent` on `events`.
    pub fn observed(mut self, agent: &str, events: EventBus) -> Self {
        self.observer = Some(Observer {
            agent: agent.to_string(),
            events,
        });
        self
    }

    /// Drop, trigger, and guard checks in that order, per the run mode.
    pub fn check_gates(&self, ev: &mut Evaluator<'_>) -> Result<Gate> {
        if self.mode.honours_drop() && self.holds(ev, &self.plan.drop)? {
            return Ok(Gate::Dropped);
        }
        if self.mode.checks_trigger() && !self.holds(ev, &self.plan.trigger)? {
            return Ok(Gate::NotTriggered);
        }
        if self.mode.checks_guard() && !self.holds(ev, &self.plan.guard)? {
            return Ok(Gate::GuardFailed);
        }
        Ok(Gate::Proceed)
    }

    /// Gates, then steps.
    pub fn run(&self, ev: &mut Evaluator<'_>) -> Result<CycleOutcome> {
        let gate = self.check_gates(ev)?;
        if self.mode == RunMode::DryRun {
            return Ok(CycleOutcome::DryRun {
                would_run: gate == Gate::Proceed,
            });
        }
        match gate {
            Gate::Proceed => self.execute_steps(ev),
            Gate::Dropped => Ok(CycleOutcome::Dropped { completed_steps: 0 }),
            Gate::NotTriggered => Ok(CycleOutcome::NotTriggered),
            Gate::GuardFailed => Ok(CycleOutcome::GuardFailed),
        }
    }

    /// Run the steps in order. Drop is checked before every step, and
    /// cancellation before and after every step.
    pub fn execute_steps(&self, ev: &mut Evaluator<'_>) -> Result<CycleOutcome> {
        self.emit(|agent, plan| AgentEvent::plan(agent, plan, EventStatus::Start));
        match self.steps(ev) {
            Ok(outcome) => {
                let status = match outcome {
                    CycleOutcome::Dropped { .. } => EventStatus::Drop,
                    CycleOutcome::Cancelled { .. } => EventStatus::Cancel,
                    _ => EventStatus::Finish,
                };
                self.emit(|agent, plan| AgentEvent::plan(agent, plan, status));
                Ok(outcome)
            }
            Err(e) => {
                self.emit(|agent, plan| {
                    AgentEvent::plan(agent, plan, EventStatus::Error).with_error(&e)
                });
                Err(e)
            }
        }
    }

    fn steps(&self, ev: &mut Evaluator<'_>) -> Result<CycleOutcome> {
        for (i, step) in self.plan.steps.iter().enumerate() {
            if self.cancelled() {
                return Ok(CycleOutcome::Cancelled { completed_steps: i });
            }
            if self.mode.honours_drop() && self.holds(ev, &self.plan.drop)? {
                debug!(plan = %self.plan.name, step = i, "drop condition met");
                return Ok(CycleOutcome::Dropped { completed_steps: i });
            }

            self.emit(|agent, plan| AgentEvent::step(agent, plan, i, EventStatus::Start));
            if let Err(e) = self.invoke(ev, step) {
                self.emit(|agent, plan| {
                    AgentEvent::step(agent, plan, i, EventStatus::Error).with_error(&e)
                });
                debug!(plan = %self.plan.name, step = i, error = %e, "plan step failed");
                return Err(e);
            }
            self.emit(|agent, plan| AgentEvent::step(agent, plan, i, EventStatus::Finish));

            if self.cancelled() {
                return Ok(CycleOutcome::Cancelled {
                    completed_steps: i + 1,
                });
            }
        }
        Ok(CycleOutcome::Completed {
            steps: self.plan.steps.len(),
        })
    }

    fn invoke(&self, ev: &mut Evaluator<'_>, closure: &Closure) -> Result<Value> {
        let _guard = self.serialize.then(|| ev.runtime().lock_exec());
        ev.call_closure_in(closure, &self.scope)
    }

    fn holds(&self, ev: &mut Evaluator<'_>, closure: &Closure) -> Result<bool> {
        Ok(self.invoke(ev, closure)?.is_truthy())
    }

    fn cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|c| c.is_cancelled())
    }

    fn emit(&self, make: impl FnOnce(&str, &str) -> AgentEvent) {
        if let Some(obs) = &self.observer {
            obs.events.publish(make(&obs.agent, &self.plan.name));
        }
    }
}

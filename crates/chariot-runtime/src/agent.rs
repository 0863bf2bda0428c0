use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{Semaphore, mpsc};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use chariot_core::{AgentEvent, ChariotError, EventBus, EventStatus, Plan, Value};

use crate::belief::BeliefStore;
use crate::engine::{self, Gate, PlanRun, RunMode};
use crate::evaluator::Evaluator;
use crate::log::{LogEntry, LogLevel};
use crate::runtime::Runtime;

/// Name under which a running plan can see which agent it belongs to.
pub const AGENT_NAME_VAR: &str = "agentName";

/// Per-start overrides for the manager's defaults.
#[derive(Debug, Clone, Copy, Default)]
pub struct StartOptions {
    pub max_concurrent: Option<usize>,
    pub poll_interval: Option<Duration>,
}

/// Counters shared between a runner and its registry entry.
#[derive(Debug, Default)]
pub struct AgentStats {
    pub cycles: AtomicU64,
    pub runs: AtomicU64,
    pub failures: AtomicU64,
    pub in_flight: AtomicUsize,
}

/// Introspection view of one registered agent.
#[derive(Debug, Clone, serde::Serialize)]
pub struct AgentInfo {
    pub name: String,
    pub plan: String,
    pub running: usize,
    pub max_concurrent: usize,
    pub poll_interval_ms: u64,
    pub belief_count: usize,
    pub cycles: u64,
    pub runs: u64,
    pub failures: u64,
    pub started_at: DateTime<Utc>,
}

/// What the manager keeps for a running agent.
pub(crate) struct AgentHandle {
    pub plan_name: String,
    pub beliefs: BeliefStore,
    pub wake: mpsc::Sender<()>,
    pub cancel: CancellationToken,
    pub stats: Arc<AgentStats>,
    pub max_concurrent: usize,
    pub poll_interval: Duration,
    pub started_at: DateTime<Utc>,
}

impl AgentHandle {
    pub fn info(&self, name: &str) -> AgentInfo {
        AgentInfo {
            name: name.to_string(),
            plan: self.plan_name.clone(),
            running: self.stats.in_flight.load(Ordering::Relaxed),
            max_concurrent: self.max_concurrent,
            poll_interval_ms: self.poll_interval.as_millis() as u64,
            belief_count: self.beliefs.len(),
            cycles: self.stats.cycles.load(Ordering::Relaxed),
            runs: self.stats.runs.load(Ordering::Relaxed),
            failures: self.stats.failures.load(Ordering::Relaxed),
            started_at: self.started_at,
        }
    }
}

/// The scheduling loop for one agent. Wakes on its tick or on a belief
/// publish, evaluates the plan's gates, and admits a step run when a permit
/// is free.
pub(crate) struct AgentRunner {
    pub name: String,
    pub runtime: Arc<Runtime>,
    pub plan: Arc<Plan>,
    pub limiter: Arc<Semaphore>,
    pub cancel: CancellationToken,
    pub wake: mpsc::Receiver<()>,
    pub poll_interval: Duration,
    pub events: EventBus,
    pub stats: Arc<AgentStats>,
}

impl AgentRunner {
    pub async fn run(mut self) {
        info!(agent = %self.name, plan = %self.plan.name, "agent runner started");

        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                woke = self.wake.recv() => {
                    if woke.is_none() {
                        break;
                    }
                }
                _ = ticker.tick() => {}
            }
            if self.cancel.is_cancelled() {
                break;
            }
            self.cycle().await;
        }

        info!(agent = %self.name, "agent runner stopped");
    }

    async fn cycle(&self) {
        self.stats.cycles.fetch_add(1, Ordering::Relaxed);

        let rt = Arc::clone(&self.runtime);
        let plan = Arc::clone(&self.plan);
        let name = self.name.clone();
        let gate = tokio::task::spawn_blocking(move || {
            let scope = engine::instance_scope(&rt, &plan, &agent_vars(&name));
            let run = PlanRun::new(&plan, RunMode::Bdi, scope).serialized();
            let mut ev = Evaluator::new(&rt, Arc::clone(rt.globals()));
            run.check_gates(&mut ev)
        })
        .await;

        let gate = match gate {
            Ok(Ok(gate)) => gate,
            Ok(Err(e)) => {
                self.events.publish(
                    AgentEvent::plan(&self.name, &self.plan.name, EventStatus::Error)
                        .with_error(&e),
                );
                report_failure(&self.runtime, &self.stats, &self.name, &self.plan.name, &e);
                return;
            }
            Err(join) => {
                let e = ChariotError::Agent(format!("gate evaluation panicked: {join}"));
                report_failure(&self.runtime, &self.stats, &self.name, &self.plan.name, &e);
                return;
            }
        };

        if gate != Gate::Proceed {
            debug!(agent = %self.name, ?gate, "plan not scheduled this cycle");
            return;
        }

        let Ok(permit) = Arc::clone(&self.limiter).try_acquire_owned() else {
            debug!(agent = %self.name, "agent at capacity, skipping cycle");
            return;
        };

        let rt = Arc::clone(&self.runtime);
        let plan = Arc::clone(&self.plan);
        let name = self.name.clone();
        let cancel = self.cancel.clone();
        let events = self.events.clone();
        let stats = Arc::clone(&self.stats);
        tokio::task::spawn_blocking(move || {
            let _permit = permit;
            stats.in_flight.fetch_add(1, Ordering::Relaxed);
            stats.runs.fetch_add(1, Ordering::Relaxed);

            let scope = engine::instance_scope(&rt, &plan, &agent_vars(&name));
            let run = PlanRun::new(&plan, RunMode::Bdi, scope)
                .serialized()
                .cancellable(cancel)
                .observed(&name, events);
            let mut ev = Evaluator::new(&rt, Arc::clone(rt.globals()));
            match run.execute_steps(&mut ev) {
                Ok(outcome) => debug!(agent = %name, ?outcome, "plan run finished"),
                Err(e) => report_failure(&rt, &stats, &name, &plan.name, &e),
            }

            stats.in_flight.fetch_sub(1, Ordering::Relaxed);
        });
    }
}

fn agent_vars(name: &str) -> HashMap<String, Value> {
    HashMap::from([(AGENT_NAME_VAR.to_string(), Value::string(name))])
}

/// A failed cycle is logged and counted; the runner keeps going.
fn report_failure(rt: &Runtime, stats: &AgentStats, agent: &str, plan: &str, e: &ChariotError) {
    stats.failures.fetch_add(1, Ordering::Relaxed);
    error!(agent = %agent, plan = %plan, error = %e, "agent cycle failed");
    rt.sink().append(LogEntry::new(
        LogLevel::Error,
        format!("agent '{agent}' plan '{plan}' failed: {e}"),
    ));
}

use chrono::Utc;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{Semaphore, broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use chariot_config::AgentsConfig;
use chariot_core::{AgentEvent, ChariotError, EventBus, Plan, Result, Value};

use crate::agent::{AgentHandle, AgentInfo, AgentRunner, AgentStats, StartOptions};
use crate::belief::BeliefStore;
use crate::runtime::Runtime;

/// Registry of running agents, keyed by name. Cheap to clone; every clone
/// sees the same agents.
#[derive(Clone)]
pub struct AgentManager {
    inner: Arc<ManagerInner>,
}

struct ManagerInner {
    agents: RwLock<HashMap<String, AgentHandle>>,
    settings: AgentsConfig,
    events: EventBus,
}

impl Default for AgentManager {
    fn default() -> Self {
        Self::new(AgentsConfig::default())
    }
}

impl AgentManager {
    pub fn new(settings: AgentsConfig) -> Self {
        let events = EventBus::new(settings.event_bus_capacity);
        Self {
            inner: Arc::new(ManagerInner {
                agents: RwLock::new(HashMap::new()),
                settings,
                events,
            }),
        }
    }

    pub fn settings(&self) -> &AgentsConfig {
        &self.inner.settings
    }

    /// Start `plan` under `name` on a session clone of `runtime`. Returns
    /// `false` without touching anything if `name` is already running.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(
        &self,
        name: &str,
        runtime: &Runtime,
        plan: &Plan,
        options: StartOptions,
    ) -> Result<bool> {
        let handle = tokio::runtime::Handle::try_current().map_err(|_| {
            ChariotError::Agent(format!(
                "cannot start agent '{name}' outside of a tokio runtime"
            ))
        })?;

        let mut agents = self.inner.agents.write();
        if agents.contains_key(name) {
            debug!(agent = %name, "agent already running, start ignored");
            return Ok(false);
        }

        let settings = &self.inner.settings;
        let max_concurrent = options
            .max_concurrent
            .unwrap_or(settings.max_concurrent)
            .max(1);
        let poll_interval = options
            .poll_interval
            .filter(|d| !d.is_zero())
            .unwrap_or_else(|| settings.poll_interval());

        let agent_rt = runtime.clone_for_session();
        let plan = Arc::new(plan.rebind(agent_rt.globals()));
        let (wake_tx, wake_rx) = mpsc::channel(settings.event_queue_capacity.max(1));
        let cancel = CancellationToken::new();
        let stats = Arc::new(AgentStats::default());

        let runner = AgentRunner {
            name: name.to_string(),
            runtime: agent_rt,
            plan: Arc::clone(&plan),
            limiter: Arc::new(Semaphore::new(max_concurrent)),
            cancel: cancel.clone(),
            wake: wake_rx,
            poll_interval,
            events: self.inner.events.clone(),
            stats: Arc::clone(&stats),
        };
        handle.spawn(runner.run());

        agents.insert(
            name.to_string(),
            AgentHandle {
                plan_name: plan.name.clone(),
                beliefs: BeliefStore::new(),
                wake: wake_tx,
                cancel,
                stats,
                max_concurrent,
                poll_interval,
                started_at: Utc::now(),
            },
        );

        info!(
            agent = %name,
            plan = %plan.name,
            max_concurrent,
            poll_ms = poll_interval.as_millis() as u64,
            "agent started"
        );
        Ok(true)
    }

    /// Cancel and unregister `name`. In-flight steps finish; no new step
    /// starts afterwards.
    pub fn stop(&self, name: &str, reason: &str) -> bool {
        let Some(handle) = self.inner.agents.write().remove(name) else {
            return false;
        };
        handle.cancel.cancel();
        info!(agent = %name, reason = %reason, "agent stopped");
        true
    }

    /// Stop every agent. Returns how many were running.
    pub fn shutdown(&self) -> usize {
        let drained: Vec<(String, AgentHandle)> = self.inner.agents.write().drain().collect();
        for (name, handle) in &drained {
            handle.cancel.cancel();
            debug!(agent = %name, "agent stopped on shutdown");
        }
        if !drained.is_empty() {
            info!(count = drained.len(), "all agents stopped");
        }
        drained.len()
    }

    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.agents.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner.agents.read().contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.inner.agents.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.agents.read().is_empty()
    }

    // ── Beliefs ────────────────────────────────────────────────

    /// Store a belief on `name` and wake its runner.
    pub fn publish_belief(&self, name: &str, key: &str, value: Value) -> Result<()> {
        let agents = self.inner.agents.read();
        let handle = agents
            .get(name)
            .ok_or_else(|| ChariotError::Agent(format!("agent '{name}' not found")))?;
        handle.beliefs.set(key, value);
        wake(name, &handle.wake);
        Ok(())
    }

    /// Wake `name`'s runner without changing its beliefs.
    pub fn nudge(&self, name: &str) -> Result<()> {
        let agents = self.inner.agents.read();
        let handle = agents
            .get(name)
            .ok_or_else(|| ChariotError::Agent(format!("agent '{name}' not found")))?;
        wake(name, &handle.wake);
        Ok(())
    }

    /// Belief `key` of agent `name`; null if either is unknown.
    pub fn belief(&self, name: &str, key: &str) -> Value {
        self.inner
            .agents
            .read()
            .get(name)
            .map(|h| h.beliefs.get(key))
            .unwrap_or_default()
    }

    pub fn beliefs(&self, name: &str) -> Option<HashMap<String, Value>> {
        self.inner
            .agents
            .read()
            .get(name)
            .map(|h| h.beliefs.snapshot())
    }

    // ── Introspection ──────────────────────────────────────────

    pub fn info(&self, name: &str) -> Option<AgentInfo> {
        self.inner.agents.read().get(name).map(|h| h.info(name))
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AgentEvent> {
        self.inner.events.subscribe()
    }

    pub fn events(&self) -> &EventBus {
        &self.inner.events
    }
}

/// A full queue already guarantees the runner will wake, so extra publishes
/// coalesce.
fn wake(name: &str, tx: &mpsc::Sender<()>) {
    match tx.try_send(()) {
        Ok(()) => {}
        Err(TrySendError::Full(())) => debug!(agent = %name, "wake queue full, coalesced"),
        Err(TrySendError::Closed(())) => debug!(agent = %name, "runner gone, wake dropped"),
    }
}

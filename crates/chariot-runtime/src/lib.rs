//! # chariot-runtime
//!
//! The evaluator and the agent scheduler built on it.
//!
//! ## Architecture
//!
//! ```text
//!   Program ──▶ Runtime ──▶ Evaluator ──▶ FunctionRegistry (builtins)
//!                  │            │
//!                  │            └──▶ PlanRun: drop → trigger → guard → steps
//!                  │
//!                  ├──▶ clone_for_session ──▶ SessionManager
//!                  │
//!                  └──▶ AgentManager ──▶ AgentRunner (one task per agent)
//!                                          │  tick / belief wake-up
//!                                          ├──▶ gates   (spawn_blocking, runtime lock)
//!                                          └──▶ steps   (semaphore permit, per-step lock)
//! ```
//!
//! Each agent owns a session clone of the runtime that started it, so agents
//! never share scopes. Within one runtime, evaluation is serialized by an
//! execution lock.

pub mod agent;
pub mod belief;
pub mod builtins;
pub mod engine;
pub mod evaluator;
pub mod log;
pub mod manager;
pub mod persist;
pub mod registry;
pub mod runtime;
pub mod session;

pub use agent::{AGENT_NAME_VAR, AgentInfo, StartOptions};
pub use belief::BeliefStore;
pub use engine::{CycleOutcome, Gate, PlanRun, RunMode};
pub use evaluator::Evaluator;
pub use log::{LogEntry, LogLevel, LogSink, MemoryLogSink};
pub use manager::AgentManager;
pub use registry::{BuiltinFn, FunctionRegistry, FunctionSpec};
pub use runtime::{Runtime, RuntimeBuilder, RuntimeSnapshot};
pub use session::{Session, SessionManager};

//! # chariot-core
//!
//! Core vocabulary for the Chariot plan/agent runtime: the tagged [`Value`]
//! model, lexical [`Scope`] chain, program [`ast`], the first-class [`Plan`]
//! value, tree nodes, agent lifecycle events, and the unified error type.

pub mod ast;
pub mod error;
pub mod event;
pub mod plan;
pub mod scope;
pub mod tree;
pub mod value;

pub use ast::{Node, Program};
pub use error::{ChariotError, ErrorKind, Result};
pub use event::{AgentEvent, EventBus, EventScope, EventStatus};
pub use plan::{Plan, PlanRef};
pub use scope::{Scope, ScopeEntry, ScopeRef};
pub use tree::{TreeNode, TreeRef};
pub use value::{Closure, ClosureBody, HostObject, TypeTag, Value};

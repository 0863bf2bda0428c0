//! # chariot-config
//!
//! Configuration system for the Chariot runtime. Reads from `chariot.toml`,
//! environment variables, and CLI overrides, in that precedence order.

pub mod loader;
pub mod schema;

pub use loader::ConfigLoader;
pub use schema::ChariotConfig;
pub use schema::{
    AgentsConfig, ConfigWarning, LoggingConfig, RuntimeConfig, SessionsConfig, WarningSeverity,
};

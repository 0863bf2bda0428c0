//! # chariot-cli
//!
//! Command-line interface for the Chariot plan runtime.
//!
//! ## Commands
//!
//! - `chariot run` executes a JSON program, optionally keeping its agents alive
//! - `chariot check` parses a program without running it
//! - `chariot config` prints the effective configuration
//! - `chariot version` prints build info

pub mod commands;

pub use commands::Cli;

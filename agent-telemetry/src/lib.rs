//! Observability utilities for agents.
//!
//! Everything in the workspace logs through [`tracing`]; this crate installs
//! the process-wide subscriber that renders those events.

#![warn(missing_docs, clippy::pedantic)]

pub mod tracing_support;

pub use tracing_support::{LogFormat, TelemetryError, TelemetryResult, init, init_with};

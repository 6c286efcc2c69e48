//! Agents that discover their own tools.
//!
//! Instead of handing a model every function up front, a session starts with a
//! single bootstrap tool. The model describes the capability it needs, the
//! runtime finds the closest catalog entry by semantic similarity, and that
//! function becomes callable for the rest of the session.
//!
//! This crate bundles the runtime crates behind feature flags so downstream
//! users can enable only the components they need.

#![warn(missing_docs, clippy::pedantic)]

/// Re-export shared primitives for convenience.
pub use agent_primitives as primitives;

/// Sessions, resolver and dispatch loop (enabled by `kernel` feature).
#[cfg(feature = "kernel")]
pub use agent_kernel as kernel;

/// Model and embedding adapters (enabled by `adapters` feature).
#[cfg(feature = "adapters")]
pub use agent_adapters as adapters;

/// Tool catalog, validation and session registry (enabled by `tools` feature).
#[cfg(feature = "tools")]
pub use agent_tools as tools;

/// Embeddings and the semantic index (enabled by `memory` feature).
#[cfg(feature = "memory")]
pub use agent_memory as memory;

/// Logging setup (enabled by `telemetry` feature).
#[cfg(feature = "telemetry")]
pub use agent_telemetry as telemetry;

/// Prompt templates (enabled by `prompts` feature).
#[cfg(feature = "prompts")]
pub use agent_prompts as prompts;

/// Configuration management (enabled by `config` feature).
#[cfg(feature = "config")]
pub use agent_config as config;

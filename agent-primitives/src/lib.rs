//! Core shared types for capability-discovering agents.

#![warn(missing_docs, clippy::pedantic)]

mod error;
mod ids;
mod run;
mod schema;
mod tool_id;

/// Error type and result alias shared across the SDK.
pub use error::{Error, Result};
/// Unique identifier for an agent conversation session.
pub use ids::SessionId;
/// Status values reported by hosted assistant runs.
pub use run::RunStatus;
/// Parameter and tool schema descriptions advertised to models.
pub use schema::{ParameterSpec, ToolSchema, TypeHint};
/// Identifier of a catalog entry.
pub use tool_id::ToolId;

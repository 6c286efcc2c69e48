//! Configuration for function-factory agents.
//!
//! [`AgentConfig`] collects model, embedding, dispatch, index, and polling
//! settings. It is loaded from an optional JSON file, then overridden from
//! `AGENT_*` environment variables (see [`loader`]), then validated.
//! Credentials are never part of the configuration: the model section only
//! names the environment variable that holds the API key.

#![warn(missing_docs, clippy::pedantic)]

pub mod error;
pub mod loader;
pub mod schema;

pub use error::{ConfigError, ConfigResult};
pub use schema::{
    AgentConfig, DispatchConfig, EmbeddingConfig, EmbeddingProvider, IndexConfig, ModelConfig,
    ModelProvider, PollPolicy,
};

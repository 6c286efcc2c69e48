//! Model and embedding adapters used by agents.
//!
//! Each module exposes implementations for a specific provider while sharing a
//! common trait-based interface defined in [`traits`]. Adapters speak the
//! function-calling dialect of their provider and normalise tool calls into
//! [`traits::ToolCallRequest`] values.

#![warn(missing_docs, clippy::pedantic)]

pub mod ollama;
pub mod openai;
pub mod traits;

mod http_client;

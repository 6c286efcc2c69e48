//! Prompt utilities for agents.
//!
//! [`template`] provides `{{variable}}` templates; [`system`] renders the
//! instruction that teaches a model to discover its tools by description.

#![warn(missing_docs, clippy::pedantic)]

pub mod system;
pub mod template;

pub use system::{DISCOVERY_INSTRUCTION, SystemInstruction, SystemInstructionBuilder};
pub use template::{PromptTemplate, TemplateBuilder, TemplateError, TemplateResult};

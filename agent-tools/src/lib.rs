//! Tool catalog, argument validation, and per-session registration.
//!
//! A [`ToolCatalog`] holds every capability the process knows about. Sessions
//! expose a subset of it to the model through a [`ToolRegistry`], which starts
//! with only the bootstrap registration tool and grows as the model asks for
//! capabilities by description.

#![warn(missing_docs, clippy::pedantic)]

pub mod bootstrap;
pub mod catalog;
pub mod error;
pub mod registry;
pub mod validation;

pub use bootstrap::{BOOTSTRAP_PARAMETER, BOOTSTRAP_TOOL_NAME};
pub use catalog::{
    Tool, ToolArguments, ToolArgumentsExt, ToolCatalog, ToolCatalogBuilder, ToolDescriptor,
    ToolDescriptorBuilder,
};
pub use error::{ToolError, ToolResult};
pub use registry::{Binding, Registration, ToolRegistry};
pub use validation::{ValidationError, decode_arguments, is_valid, validate};

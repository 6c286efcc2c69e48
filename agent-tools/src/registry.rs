//! Per-session registry of the tools exposed to a conversation.
//!
//! The registry keeps two mirrored views: the ordered schema list advertised
//! to the model and the name-to-executor map used at dispatch time. Both are
//! updated together under a single `&mut self` borrow, so a name is either in
//! both views or in neither.

use std::collections::HashMap;
use std::sync::Arc;

use agent_primitives::ToolSchema;
use tracing::{debug, info};

use crate::bootstrap::{BOOTSTRAP_TOOL_NAME, bootstrap_schema};
use crate::catalog::ToolDescriptor;
use crate::error::{ToolError, ToolResult};

/// Execution-side binding for an advertised name.
#[derive(Clone, Debug)]
pub enum Binding {
    /// The capability-registration tool, handled by the runtime itself.
    Bootstrap,
    /// A catalog tool resolved earlier in the session.
    Tool(Arc<ToolDescriptor>),
}

/// Outcome of [`ToolRegistry::register`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Registration {
    /// The name was not registered before.
    Added,
    /// The name was already registered; its binding was replaced in place.
    Replaced,
}

/// Tools exposed to one session.
#[derive(Debug, Default)]
pub struct ToolRegistry {
    schemas: Vec<ToolSchema>,
    bindings: HashMap<String, Binding>,
}

impl ToolRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry seeded with the bootstrap tool.
    #[must_use]
    pub fn with_bootstrap() -> Self {
        let mut registry = Self::new();
        registry.seed_bootstrap();
        registry
    }

    fn seed_bootstrap(&mut self) {
        self.schemas.push(bootstrap_schema());
        self.bindings
            .insert(BOOTSTRAP_TOOL_NAME.to_owned(), Binding::Bootstrap);
    }

    /// Exposes `descriptor` under its name.
    ///
    /// Registering a name twice replaces the binding and schema without
    /// duplicating either.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::ReservedName`] if the descriptor would shadow the
    /// bootstrap tool.
    pub fn register(&mut self, descriptor: Arc<ToolDescriptor>) -> ToolResult<Registration> {
        let name = descriptor.name().to_owned();
        if name == BOOTSTRAP_TOOL_NAME {
            return Err(ToolError::ReservedName { name });
        }

        let schema = descriptor.schema();
        let outcome = match self.schemas.iter_mut().find(|existing| existing.name() == name) {
            Some(existing) => {
                *existing = schema;
                Registration::Replaced
            }
            None => {
                self.schemas.push(schema);
                Registration::Added
            }
        };
        self.bindings.insert(name.clone(), Binding::Tool(descriptor));

        match outcome {
            Registration::Added => info!(tool = %name, "tool registered"),
            Registration::Replaced => debug!(tool = %name, "tool re-registered"),
        }
        Ok(outcome)
    }

    /// Drops every registration and re-seeds the bootstrap tool.
    pub fn reset(&mut self) {
        self.schemas.clear();
        self.bindings.clear();
        self.seed_bootstrap();
    }

    /// Returns the schemas advertised to the model, in registration order.
    #[must_use]
    pub fn schemas(&self) -> &[ToolSchema] {
        &self.schemas
    }

    /// Returns the binding for `name`.
    #[must_use]
    pub fn binding(&self, name: &str) -> Option<&Binding> {
        self.bindings.get(name)
    }

    /// Returns `true` when `name` is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.bindings.contains_key(name)
    }

    /// Returns the registered names in registration order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.schemas.iter().map(ToolSchema::name).collect()
    }

    /// Returns the number of registered tools, bootstrap included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// Returns `true` when nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

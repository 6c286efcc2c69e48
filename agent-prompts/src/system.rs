//! System instructions for tool-discovering agents.

use std::collections::HashMap;

use crate::template::{PromptTemplate, TemplateResult};

/// Default instruction: the model starts with only the bootstrap tool and must
/// ask for everything else by description.
pub const DISCOVERY_INSTRUCTION: &str = "\
Only use the functions you have been provided with. Do not answer on your own and do not guess.
For tasks that need user resources, call the provided functions instead of writing code.
If you don't have a function for the next step, call '{{bootstrap_tool}}' with a brief description of the capability you need, e.g. 'get insurance policy'.
If you need to save content to or read content from a file, call '{{bootstrap_tool}}' to register functions that can do so.
Reply {{termination_marker}} when the task is done.";

/// Represents a system instruction applied to every task of a session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SystemInstruction {
    content: String,
}

/// Builder for [`SystemInstruction`].
#[derive(Debug)]
pub struct SystemInstructionBuilder {
    template: String,
    variables: HashMap<String, String>,
}

impl Default for SystemInstructionBuilder {
    fn default() -> Self {
        Self {
            template: DISCOVERY_INSTRUCTION.to_owned(),
            variables: HashMap::new(),
        }
    }
}

impl SystemInstructionBuilder {
    /// Creates a builder starting from [`DISCOVERY_INSTRUCTION`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the instruction template.
    #[must_use]
    pub fn template(mut self, template: impl Into<String>) -> Self {
        self.template = template.into();
        self
    }

    /// Sets the name of the bootstrap registration tool.
    #[must_use]
    pub fn bootstrap_tool(self, name: impl Into<String>) -> Self {
        self.variable("bootstrap_tool", name)
    }

    /// Sets the marker the model emits to finish a task.
    #[must_use]
    pub fn termination_marker(self, marker: impl Into<String>) -> Self {
        self.variable("termination_marker", marker)
    }

    /// Sets an arbitrary template variable.
    #[must_use]
    pub fn variable(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.variables.insert(name.into(), value.into());
        self
    }

    /// Renders the instruction.
    ///
    /// # Errors
    ///
    /// Returns [`TemplateError`](crate::template::TemplateError) if the
    /// template is malformed or a referenced variable was not supplied.
    pub fn build(self) -> TemplateResult<SystemInstruction> {
        let mut builder = PromptTemplate::builder(self.template);
        for (name, value) in self.variables {
            builder = builder.with_variable(name, value);
        }
        let template = builder.build()?;

        // every placeholder in a system instruction must be filled
        for name in template.variable_names() {
            if template.get_variable(name).is_none() {
                return Err(crate::template::TemplateError::MissingVariable {
                    name: name.to_owned(),
                });
            }
        }

        Ok(SystemInstruction {
            content: template.render()?,
        })
    }
}

impl SystemInstruction {
    /// Returns a builder.
    #[must_use]
    pub fn builder() -> SystemInstructionBuilder {
        SystemInstructionBuilder::new()
    }

    /// Wraps literal instruction text.
    #[must_use]
    pub fn from_text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
        }
    }

    /// Returns the textual content.
    #[must_use]
    pub fn content(&self) -> &str {
        &self.content
    }
}

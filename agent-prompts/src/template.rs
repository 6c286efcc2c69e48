//! Prompt templates with `{{variable}}` substitution.
//!
//! Templates are parsed once at build time into literal and variable
//! segments, so malformed placeholders are reported before any rendering.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Result alias for template operations.
pub type TemplateResult<T> = Result<T, TemplateError>;

/// Errors that can occur during template operations.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TemplateError {
    /// A required variable was not provided.
    #[error("missing required variable: {name}")]
    MissingVariable {
        /// Name of the missing variable.
        name: String,
    },

    /// The template text could not be parsed.
    #[error("malformed template at byte {offset}: {reason}")]
    Malformed {
        /// Byte offset of the offending placeholder.
        offset: usize,
        /// Reason for the failure.
        reason: String,
    },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
enum Segment {
    Text(String),
    Variable(String),
}

/// A parsed prompt template.
///
/// ```
/// use agent_prompts::template::PromptTemplate;
///
/// let template = PromptTemplate::builder("Reply {{marker}} when done.")
///     .with_variable("marker", "TERMINATE")
///     .build()
///     .unwrap();
///
/// assert_eq!(template.render().unwrap(), "Reply TERMINATE when done.");
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PromptTemplate {
    source: String,
    segments: Vec<Segment>,
    defaults: HashMap<String, String>,
    required: Vec<String>,
}

impl PromptTemplate {
    /// Returns a builder for `source`.
    #[must_use]
    pub fn builder(source: impl Into<String>) -> TemplateBuilder {
        TemplateBuilder::new(source)
    }

    /// Sets a default variable value.
    pub fn set_variable(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.defaults.insert(name.into(), value.into());
    }

    /// Returns the default value of a variable if set.
    #[must_use]
    pub fn get_variable(&self, name: &str) -> Option<&str> {
        self.defaults.get(name).map(String::as_str)
    }

    /// Returns the variable names referenced by the template, in order of
    /// first appearance.
    #[must_use]
    pub fn variable_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for segment in &self.segments {
            if let Segment::Variable(name) = segment {
                if !names.contains(&name.as_str()) {
                    names.push(name);
                }
            }
        }
        names
    }

    /// Renders the template with its default variables.
    ///
    /// # Errors
    ///
    /// Returns [`TemplateError::MissingVariable`] if a required variable is not set.
    pub fn render(&self) -> TemplateResult<String> {
        self.render_with(&HashMap::new())
    }

    /// Renders the template, letting `overrides` take precedence over the
    /// defaults. Unset optional variables render as empty strings.
    ///
    /// # Errors
    ///
    /// Returns [`TemplateError::MissingVariable`] if a required variable is not set.
    pub fn render_with(&self, overrides: &HashMap<String, String>) -> TemplateResult<String> {
        let mut rendered = String::with_capacity(self.source.len());
        for segment in &self.segments {
            match segment {
                Segment::Text(text) => rendered.push_str(text),
                Segment::Variable(name) => {
                    match overrides.get(name).or_else(|| self.defaults.get(name)) {
                        Some(value) => rendered.push_str(value),
                        None if self.required.contains(name) => {
                            return Err(TemplateError::MissingVariable { name: name.clone() });
                        }
                        None => {}
                    }
                }
            }
        }
        Ok(rendered)
    }

    /// Returns the raw template string.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }
}

impl fmt::Display for PromptTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// Builder for [`PromptTemplate`].
pub struct TemplateBuilder {
    source: String,
    defaults: HashMap<String, String>,
    required: Vec<String>,
}

impl TemplateBuilder {
    /// Creates a new builder with the supplied template text.
    #[must_use]
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            defaults: HashMap::new(),
            required: Vec::new(),
        }
    }

    /// Sets a variable with a default value.
    #[must_use]
    pub fn with_variable(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.defaults.insert(name.into(), value.into());
        self
    }

    /// Declares a required variable.
    #[must_use]
    pub fn with_required_variable(mut self, name: impl Into<String>) -> Self {
        self.required.push(name.into());
        self
    }

    /// Parses the template.
    ///
    /// # Errors
    ///
    /// Returns [`TemplateError::Malformed`] for an unterminated or empty
    /// placeholder.
    pub fn build(self) -> TemplateResult<PromptTemplate> {
        let segments = parse(&self.source)?;
        Ok(PromptTemplate {
            source: self.source,
            segments,
            defaults: self.defaults,
            required: self.required,
        })
    }
}

fn parse(source: &str) -> TemplateResult<Vec<Segment>> {
    let mut segments = Vec::new();
    let mut rest = source;
    let mut offset = 0;

    while let Some(start) = rest.find("{{") {
        if start > 0 {
            segments.push(Segment::Text(rest[..start].to_owned()));
        }
        let after_open = &rest[start + 2..];
        let end = after_open.find("}}").ok_or_else(|| TemplateError::Malformed {
            offset: offset + start,
            reason: "unterminated placeholder".into(),
        })?;
        let name = after_open[..end].trim();
        if name.is_empty() {
            return Err(TemplateError::Malformed {
                offset: offset + start,
                reason: "empty placeholder".into(),
            });
        }
        segments.push(Segment::Variable(name.to_owned()));

        let consumed = start + 2 + end + 2;
        offset += consumed;
        rest = &rest[consumed..];
    }

    if !rest.is_empty() {
        segments.push(Segment::Text(rest.to_owned()));
    }
    Ok(segments)
}

//! Parameter declarations and the model-facing tool schema built from them.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::error::{Error, Result};

/// Coarse type annotation attached to a parameter or return value.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeHint {
    /// UTF-8 text.
    #[default]
    String,
    /// Whole number.
    Integer,
    /// Floating point number.
    Number,
    /// `true` / `false`.
    Boolean,
    /// JSON array.
    Array,
    /// JSON object.
    Object,
    /// Unconstrained value.
    Any,
}

impl TypeHint {
    /// Returns the JSON-schema `type` keyword, or `None` for [`TypeHint::Any`].
    #[must_use]
    pub const fn json_type(self) -> Option<&'static str> {
        match self {
            Self::String => Some("string"),
            Self::Integer => Some("integer"),
            Self::Number => Some("number"),
            Self::Boolean => Some("boolean"),
            Self::Array => Some("array"),
            Self::Object => Some("object"),
            Self::Any => None,
        }
    }
}

impl fmt::Display for TypeHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.json_type().unwrap_or("any"))
    }
}

/// Declared parameter of a callable.
///
/// A parameter is required exactly when it has no default value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParameterSpec {
    name: String,
    #[serde(default)]
    type_hint: TypeHint,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    default: Option<Value>,
}

impl ParameterSpec {
    /// Declares a required parameter.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidParameter`] when the name is empty or contains
    /// whitespace.
    pub fn new(name: impl Into<String>, type_hint: TypeHint) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(Error::InvalidParameter {
                name,
                reason: "parameter name cannot be empty".into(),
            });
        }
        if name.chars().any(char::is_whitespace) {
            return Err(Error::InvalidParameter {
                name,
                reason: "parameter name cannot contain whitespace".into(),
            });
        }

        Ok(Self {
            name,
            type_hint,
            description: None,
            default: None,
        })
    }

    /// Attaches a human-readable description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Supplies a default value, making the parameter optional.
    #[must_use]
    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    /// Returns the parameter name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the declared type.
    #[must_use]
    pub const fn type_hint(&self) -> TypeHint {
        self.type_hint
    }

    /// Returns the optional description.
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Returns the default value, if any.
    #[must_use]
    pub fn default_value(&self) -> Option<&Value> {
        self.default.as_ref()
    }

    /// Returns `true` when callers must supply this parameter.
    #[must_use]
    pub const fn is_required(&self) -> bool {
        self.default.is_none()
    }

    fn json_property(&self) -> Value {
        let mut property = Map::new();
        if let Some(kind) = self.type_hint.json_type() {
            property.insert("type".into(), Value::from(kind));
        }
        if let Some(description) = &self.description {
            property.insert("description".into(), Value::from(description.clone()));
        }
        if let Some(default) = &self.default {
            property.insert("default".into(), default.clone());
        }
        Value::Object(property)
    }
}

/// Tool description advertised to a model: name, description, and a JSON
/// schema for the argument object.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolSchema {
    name: String,
    description: String,
    parameters: Value,
}

impl ToolSchema {
    /// Builds a schema from an ordered parameter list.
    #[must_use]
    pub fn from_parameters(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: &[ParameterSpec],
    ) -> Self {
        let mut properties = Map::new();
        let mut required = Vec::new();
        for parameter in parameters {
            properties.insert(parameter.name().to_owned(), parameter.json_property());
            if parameter.is_required() {
                required.push(Value::from(parameter.name()));
            }
        }

        Self {
            name: name.into(),
            description: description.into(),
            parameters: json!({
                "type": "object",
                "properties": properties,
                "required": required,
            }),
        }
    }

    /// Returns the tool name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the tool description.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Returns the JSON schema of the argument object.
    #[must_use]
    pub fn parameters(&self) -> &Value {
        &self.parameters
    }
}

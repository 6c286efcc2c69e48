//! Shape validation for model-supplied arguments.
//!
//! Only names are checked: an argument map is well-formed when every key is a
//! declared parameter and every parameter without a default is present. Values
//! are never coerced or type-checked.

use agent_primitives::ParameterSpec;
use serde_json::Value;
use thiserror::Error;

use crate::catalog::ToolArguments;

/// Reason an argument payload was rejected before execution.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// The raw argument text was not a JSON object.
    #[error("arguments must be a JSON object: {reason}")]
    Malformed {
        /// Decoder message.
        reason: String,
    },

    /// Argument names did not match the declared parameters.
    #[error("{}", describe_mismatch(unknown, missing))]
    Mismatch {
        /// Keys that are not declared parameters, in argument order.
        unknown: Vec<String>,
        /// Required parameters that were omitted, in declaration order.
        missing: Vec<String>,
    },
}

impl ValidationError {
    /// Returns the unknown argument names, if any.
    #[must_use]
    pub fn unknown(&self) -> &[String] {
        match self {
            Self::Mismatch { unknown, .. } => unknown,
            Self::Malformed { .. } => &[],
        }
    }

    /// Returns the missing required parameter names, if any.
    #[must_use]
    pub fn missing(&self) -> &[String] {
        match self {
            Self::Mismatch { missing, .. } => missing,
            Self::Malformed { .. } => &[],
        }
    }
}

fn describe_mismatch(unknown: &[String], missing: &[String]) -> String {
    let mut parts = Vec::with_capacity(2);
    if !unknown.is_empty() {
        parts.push(format!("unknown arguments: {}", unknown.join(", ")));
    }
    if !missing.is_empty() {
        parts.push(format!("missing required arguments: {}", missing.join(", ")));
    }
    parts.join("; ")
}

/// Checks `args` against `params`.
///
/// # Errors
///
/// Returns [`ValidationError::Mismatch`] naming every unknown key and every
/// omitted required parameter.
pub fn validate(params: &[ParameterSpec], args: &ToolArguments) -> Result<(), ValidationError> {
    let unknown: Vec<String> = args
        .keys()
        .filter(|key| !params.iter().any(|param| param.name() == key.as_str()))
        .cloned()
        .collect();

    let missing: Vec<String> = params
        .iter()
        .filter(|param| param.is_required() && !args.contains_key(param.name()))
        .map(|param| param.name().to_owned())
        .collect();

    if unknown.is_empty() && missing.is_empty() {
        Ok(())
    } else {
        Err(ValidationError::Mismatch { unknown, missing })
    }
}

/// Returns `true` when `args` is well-formed for `params`.
#[must_use]
pub fn is_valid(params: &[ParameterSpec], args: &ToolArguments) -> bool {
    validate(params, args).is_ok()
}

/// Decodes the raw argument string produced by a model.
///
/// Blank input decodes to an empty map, since some providers send `""` for
/// calls without arguments.
///
/// # Errors
///
/// Returns [`ValidationError::Malformed`] when the text is not valid JSON or
/// not an object.
pub fn decode_arguments(raw: &str) -> Result<ToolArguments, ValidationError> {
    if raw.trim().is_empty() {
        return Ok(ToolArguments::new());
    }
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(ValidationError::Malformed {
            reason: format!("expected an object, found `{other}`"),
        }),
        Err(err) => Err(ValidationError::Malformed {
            reason: err.to_string(),
        }),
    }
}

//! The bootstrap capability-registration tool.
//!
//! `register_functions` is the only tool a model is given up front. Calling
//! it with a natural-language description resolves and registers one concrete
//! tool; the runtime handles it directly instead of through a [`Tool`]
//! executor because it writes to the session registry.
//!
//! [`Tool`]: crate::catalog::Tool

use agent_primitives::{ParameterSpec, ToolSchema, TypeHint};

/// Name under which the bootstrap tool is advertised.
pub const BOOTSTRAP_TOOL_NAME: &str = "register_functions";

/// The bootstrap tool's single parameter.
pub const BOOTSTRAP_PARAMETER: &str = "function_description";

const BOOTSTRAP_DESCRIPTION: &str = "register the function for agent based on the given description of the function";

/// Declared parameters of the bootstrap tool.
///
/// # Panics
///
/// Panics if the built-in parameter name is rejected, which cannot happen for
/// the constant above.
#[must_use]
pub fn bootstrap_parameters() -> Vec<ParameterSpec> {
    let parameter = ParameterSpec::new(BOOTSTRAP_PARAMETER, TypeHint::String)
        .expect("bootstrap parameter name is valid")
        .with_description("natural-language description of the capability to register");
    vec![parameter]
}

/// Model-facing schema of the bootstrap tool.
#[must_use]
pub fn bootstrap_schema() -> ToolSchema {
    ToolSchema::from_parameters(BOOTSTRAP_TOOL_NAME, BOOTSTRAP_DESCRIPTION, &bootstrap_parameters())
}

/// Tool-result text reported after a successful registration.
#[must_use]
pub fn registration_message(name: &str, description: &str) -> String {
    format!("registering: {name} for: '{description}'")
}

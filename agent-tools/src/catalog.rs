//! Static catalog of callable tools.
//!
//! A [`ToolDescriptor`] pairs an executor with the metadata a model needs to
//! call it: a unique id, the advertised function name, a natural-language
//! description, and the ordered parameter list. Descriptors are immutable once
//! built; a [`ToolCatalog`] is an ordered, read-only set of them.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use agent_primitives::{ParameterSpec, ToolId, ToolSchema, TypeHint};
use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::bootstrap::BOOTSTRAP_TOOL_NAME;
use crate::error::{ToolError, ToolResult};
use crate::validation::{self, ValidationError};

/// Named arguments supplied to a tool.
pub type ToolArguments = Map<String, Value>;

/// Typed accessors over [`ToolArguments`].
pub trait ToolArgumentsExt {
    /// Returns the string argument `name`.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::InvalidArgument`] if the argument is absent or not a
    /// string.
    fn required_str(&self, name: &str) -> ToolResult<&str>;

    /// Returns the string argument `name` when present.
    fn optional_str(&self, name: &str) -> Option<&str>;
}

impl ToolArgumentsExt for ToolArguments {
    fn required_str(&self, name: &str) -> ToolResult<&str> {
        match self.get(name) {
            Some(Value::String(value)) => Ok(value),
            Some(other) => Err(ToolError::invalid_argument(
                name,
                format!("expected a string, found {other}"),
            )),
            None => Err(ToolError::invalid_argument(name, "argument is missing")),
        }
    }

    fn optional_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_str)
    }
}

/// Trait implemented by tool executors.
///
/// Tools receive their named arguments and answer with text; the runtime never
/// interprets the returned string.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Invokes the tool with the given arguments.
    async fn invoke(&self, args: ToolArguments) -> ToolResult<String>;
}

#[async_trait]
impl<F, Fut> Tool for F
where
    F: Send + Sync + Fn(ToolArguments) -> Fut,
    Fut: Future<Output = ToolResult<String>> + Send,
{
    async fn invoke(&self, args: ToolArguments) -> ToolResult<String> {
        (self)(args).await
    }
}

/// Immutable description of one callable capability.
#[derive(Clone)]
pub struct ToolDescriptor {
    id: ToolId,
    name: String,
    description: String,
    parameters: Vec<ParameterSpec>,
    returns: TypeHint,
    executor: Arc<dyn Tool>,
}

impl fmt::Debug for ToolDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolDescriptor")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("description", &self.description)
            .field("parameters", &self.parameters)
            .field("returns", &self.returns)
            .finish_non_exhaustive()
    }
}

impl ToolDescriptor {
    /// Starts building a descriptor for `id` advertised under `name`.
    #[must_use]
    pub fn builder(id: ToolId, name: impl Into<String>) -> ToolDescriptorBuilder {
        ToolDescriptorBuilder {
            id,
            name: name.into(),
            description: String::new(),
            parameters: Vec::new(),
            returns: TypeHint::String,
            executor: None,
        }
    }

    /// Returns the catalog id.
    #[must_use]
    pub fn id(&self) -> &ToolId {
        &self.id
    }

    /// Returns the function name advertised to the model.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the description used as the semantic key.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Returns the declared parameters in declaration order.
    #[must_use]
    pub fn parameters(&self) -> &[ParameterSpec] {
        &self.parameters
    }

    /// Returns the return-type hint.
    #[must_use]
    pub const fn returns(&self) -> TypeHint {
        self.returns
    }

    /// Builds the model-facing schema for this tool.
    #[must_use]
    pub fn schema(&self) -> ToolSchema {
        ToolSchema::from_parameters(&self.name, &self.description, &self.parameters)
    }

    /// Checks the shape of `args` against the declared parameters.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] listing unknown and missing names.
    pub fn validate(&self, args: &ToolArguments) -> Result<(), ValidationError> {
        validation::validate(&self.parameters, args)
    }

    /// Executes the tool. Arguments are not validated here.
    ///
    /// # Errors
    ///
    /// Propagates any error returned by the executor.
    pub async fn invoke(&self, args: ToolArguments) -> ToolResult<String> {
        self.executor.invoke(args).await
    }
}

/// Builder returned by [`ToolDescriptor::builder`].
pub struct ToolDescriptorBuilder {
    id: ToolId,
    name: String,
    description: String,
    parameters: Vec<ParameterSpec>,
    returns: TypeHint,
    executor: Option<Arc<dyn Tool>>,
}

impl ToolDescriptorBuilder {
    /// Sets the natural-language description.
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Appends a declared parameter.
    #[must_use]
    pub fn parameter(mut self, parameter: ParameterSpec) -> Self {
        self.parameters.push(parameter);
        self
    }

    /// Sets the return-type hint (defaults to string).
    #[must_use]
    pub fn returns(mut self, returns: TypeHint) -> Self {
        self.returns = returns;
        self
    }

    /// Attaches the executor.
    #[must_use]
    pub fn executor<T>(mut self, tool: T) -> Self
    where
        T: Tool + 'static,
    {
        self.executor = Some(Arc::new(tool));
        self
    }

    /// Finalises the descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::InvalidMetadata`] when the name is not a valid
    /// function name, the description is blank, a parameter is declared twice,
    /// or no executor was attached.
    pub fn build(self) -> ToolResult<ToolDescriptor> {
        validate_function_name(&self.name)?;

        if self.description.trim().is_empty() {
            return Err(ToolError::invalid_metadata(format!(
                "tool `{}` requires a description",
                self.name
            )));
        }

        for (index, parameter) in self.parameters.iter().enumerate() {
            if self.parameters[..index]
                .iter()
                .any(|earlier| earlier.name() == parameter.name())
            {
                return Err(ToolError::invalid_metadata(format!(
                    "tool `{}` declares parameter `{}` twice",
                    self.name,
                    parameter.name()
                )));
            }
        }

        let executor = self.executor.ok_or_else(|| {
            ToolError::invalid_metadata(format!("tool `{}` has no executor", self.name))
        })?;

        Ok(ToolDescriptor {
            id: self.id,
            name: self.name,
            description: self.description,
            parameters: self.parameters,
            returns: self.returns,
            executor,
        })
    }
}

/// Function names must be accepted by every supported provider.
pub(crate) fn validate_function_name(name: &str) -> ToolResult<()> {
    if name.is_empty() || name.len() > 64 {
        return Err(ToolError::invalid_metadata(
            "tool name must be between 1 and 64 characters",
        ));
    }
    if !name
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || ch == '_' || ch == '-')
    {
        return Err(ToolError::invalid_metadata(format!(
            "tool name `{name}` may only contain ASCII letters, digits, `_` and `-`"
        )));
    }
    Ok(())
}

/// Ordered, read-only set of tool descriptors.
#[derive(Clone, Debug, Default)]
pub struct ToolCatalog {
    descriptors: Vec<Arc<ToolDescriptor>>,
    by_id: HashMap<String, usize>,
    by_name: HashMap<String, usize>,
}

impl ToolCatalog {
    /// Starts building a catalog.
    #[must_use]
    pub fn builder() -> ToolCatalogBuilder {
        ToolCatalogBuilder::default()
    }

    /// Returns every descriptor in insertion order.
    #[must_use]
    pub fn list(&self) -> &[Arc<ToolDescriptor>] {
        &self.descriptors
    }

    /// Looks up a descriptor by catalog id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Arc<ToolDescriptor>> {
        self.by_id.get(id).map(|&index| &self.descriptors[index])
    }

    /// Looks up a descriptor by advertised function name.
    #[must_use]
    pub fn find_by_name(&self, name: &str) -> Option<&Arc<ToolDescriptor>> {
        self.by_name.get(name).map(|&index| &self.descriptors[index])
    }

    /// Returns the number of descriptors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    /// Returns `true` when the catalog holds no descriptors.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

/// Builder returned by [`ToolCatalog::builder`].
#[derive(Default)]
pub struct ToolCatalogBuilder {
    descriptors: Vec<ToolDescriptor>,
}

impl ToolCatalogBuilder {
    /// Appends a descriptor.
    #[must_use]
    pub fn with(mut self, descriptor: ToolDescriptor) -> Self {
        self.descriptors.push(descriptor);
        self
    }

    /// Finalises the catalog.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::DuplicateTool`] when two descriptors share an id or
    /// a name, and [`ToolError::ReservedName`] when a descriptor uses the
    /// bootstrap tool's name.
    pub fn build(self) -> ToolResult<ToolCatalog> {
        let mut catalog = ToolCatalog::default();
        for descriptor in self.descriptors {
            if descriptor.name() == BOOTSTRAP_TOOL_NAME {
                return Err(ToolError::ReservedName {
                    name: descriptor.name().to_owned(),
                });
            }
            let index = catalog.descriptors.len();
            if catalog
                .by_id
                .insert(descriptor.id().as_str().to_owned(), index)
                .is_some()
            {
                return Err(ToolError::DuplicateTool {
                    name: descriptor.id().to_string(),
                });
            }
            if catalog
                .by_name
                .insert(descriptor.name().to_owned(), index)
                .is_some()
            {
                return Err(ToolError::DuplicateTool {
                    name: descriptor.name().to_owned(),
                });
            }
            catalog.descriptors.push(Arc::new(descriptor));
        }
        Ok(catalog)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn echo(id: &str, name: &str, description: &str) -> ToolDescriptor {
        ToolDescriptor::builder(ToolId::new(id).unwrap(), name)
            .description(description)
            .parameter(ParameterSpec::new("text", TypeHint::String).unwrap())
            .executor(|args: ToolArguments| async move {
                args.required_str("text").map(ToOwned::to_owned)
            })
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn descriptor_invokes_executor() {
        let descriptor = echo("echo", "echo", "echo the supplied text");
        let mut args = ToolArguments::new();
        args.insert("text".into(), json!("hello"));

        assert_eq!(descriptor.invoke(args).await.unwrap(), "hello");
        assert_eq!(descriptor.returns(), TypeHint::String);
    }

    #[tokio::test]
    async fn required_str_reports_wrong_type() {
        let descriptor = echo("echo", "echo", "echo the supplied text");
        let mut args = ToolArguments::new();
        args.insert("text".into(), json!(42));

        let err = descriptor.invoke(args).await.expect_err("number is not text");
        assert!(matches!(err, ToolError::InvalidArgument { name, .. } if name == "text"));
    }

    #[test]
    fn builder_rejects_incomplete_metadata() {
        let id = ToolId::new("t").unwrap();
        let err = ToolDescriptor::builder(id.clone(), "t")
            .executor(|_: ToolArguments| async { Ok::<_, ToolError>(String::new()) })
            .build()
            .expect_err("description required");
        assert!(matches!(err, ToolError::InvalidMetadata { .. }));

        let err = ToolDescriptor::builder(id.clone(), "t")
            .description("does things")
            .build()
            .expect_err("executor required");
        assert!(matches!(err, ToolError::InvalidMetadata { .. }));

        let err = ToolDescriptor::builder(id, "has space")
            .description("does things")
            .executor(|_: ToolArguments| async { Ok::<_, ToolError>(String::new()) })
            .build()
            .expect_err("invalid name");
        assert!(matches!(err, ToolError::InvalidMetadata { .. }));
    }

    #[test]
    fn builder_rejects_repeated_parameter() {
        let err = ToolDescriptor::builder(ToolId::new("t").unwrap(), "t")
            .description("does things")
            .parameter(ParameterSpec::new("a", TypeHint::String).unwrap())
            .parameter(ParameterSpec::new("a", TypeHint::Integer).unwrap())
            .executor(|_: ToolArguments| async { Ok::<_, ToolError>(String::new()) })
            .build()
            .expect_err("duplicate parameter");
        assert!(matches!(err, ToolError::InvalidMetadata { .. }));
    }

    #[test]
    fn catalog_preserves_order_and_lookups() {
        let catalog = ToolCatalog::builder()
            .with(echo("b", "beta", "second tool"))
            .with(echo("a", "alpha", "first tool"))
            .build()
            .unwrap();

        let names: Vec<_> = catalog.list().iter().map(|d| d.name()).collect();
        assert_eq!(names, ["beta", "alpha"]);
        assert_eq!(catalog.get("a").unwrap().name(), "alpha");
        assert_eq!(catalog.find_by_name("beta").unwrap().id().as_str(), "b");
        assert!(catalog.get("missing").is_none());
        assert_eq!(catalog.len(), 2);
    }

    #[test]
    fn catalog_rejects_duplicates() {
        let err = ToolCatalog::builder()
            .with(echo("same", "one", "first"))
            .with(echo("same", "two", "second"))
            .build()
            .expect_err("duplicate id");
        assert!(matches!(err, ToolError::DuplicateTool { name } if name == "same"));

        let err = ToolCatalog::builder()
            .with(echo("one", "shared", "first"))
            .with(echo("two", "shared", "second"))
            .build()
            .expect_err("duplicate name");
        assert!(matches!(err, ToolError::DuplicateTool { name } if name == "shared"));
    }

    #[test]
    fn catalog_rejects_bootstrap_name() {
        let err = ToolCatalog::builder()
            .with(echo("boot", BOOTSTRAP_TOOL_NAME, "shadow the bootstrap tool"))
            .build()
            .expect_err("reserved");
        assert!(matches!(err, ToolError::ReservedName { .. }));
    }

    #[test]
    fn schema_lists_parameters() {
        let schema = echo("echo", "echo", "echo the supplied text").schema();
        assert_eq!(schema.name(), "echo");
        assert_eq!(schema.parameters()["required"], json!(["text"]));
    }
}

//! `OpenAI` and Azure `OpenAI` chat-completions adapter with function calling.

use std::{env, fmt, time::Duration};

use async_trait::async_trait;
use futures::stream;
use hyper::Uri;
use hyper::header::{AUTHORIZATION, HeaderName};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::http_client::{HyperClient, build_https_client, parse_endpoint, post_json, sanitize_base_url};
use crate::traits::{
    AdapterError, AdapterMetadata, AdapterResult, AdapterStream, EmbeddingAdapter, InferenceChunk,
    InferenceRequest, MessageRole, ModelAdapter, PromptMessage, ToolCallRequest,
};

/// Environment variable used when loading configuration automatically.
pub const OPENAI_API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Environment variable holding the Azure `OpenAI` key.
pub const AZURE_OPENAI_API_KEY_ENV: &str = "AZURE_OPENAI_API_KEY";

const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";

/// Azure deployment coordinates.
#[derive(Clone, Debug, PartialEq, Eq)]
struct AzureDeployment {
    deployment: String,
    api_version: String,
}

/// Configuration for the `OpenAI` adapter.
#[derive(Clone, Debug)]
pub struct OpenAiConfig {
    api_key: Option<String>,
    model: String,
    embedding_model: String,
    base_url: String,
    azure: Option<AzureDeployment>,
    timeout: Duration,
    default_temperature: Option<f32>,
}

impl OpenAiConfig {
    /// Creates a configuration using the supplied model identifier.
    #[must_use]
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            api_key: None,
            model: model.into(),
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_owned(),
            base_url: "https://api.openai.com/".to_owned(),
            azure: None,
            timeout: Duration::from_secs(60),
            default_temperature: None,
        }
    }

    /// Loads the API key from the `OPENAI_API_KEY` environment variable.
    #[must_use]
    pub fn from_env(model: impl Into<String>) -> Self {
        Self::new(model).with_api_key_from(OPENAI_API_KEY_ENV)
    }

    /// Reads the API key from the named environment variable, if set.
    #[must_use]
    pub fn with_api_key_from(mut self, variable: &str) -> Self {
        self.api_key = env::var(variable).ok().or(self.api_key);
        self
    }

    /// Overrides the base URL used for API calls.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Configuration`] if the supplied URL is invalid.
    pub fn with_base_url(mut self, base_url: impl AsRef<str>) -> AdapterResult<Self> {
        self.base_url = sanitize_base_url(base_url.as_ref(), "OpenAI")?;
        Ok(self)
    }

    /// Targets an Azure `OpenAI` deployment instead of the public API.
    ///
    /// The base URL must point at the Azure resource, e.g.
    /// `https://my-resource.openai.azure.com/`.
    #[must_use]
    pub fn with_azure_deployment(
        mut self,
        deployment: impl Into<String>,
        api_version: impl Into<String>,
    ) -> Self {
        self.azure = Some(AzureDeployment {
            deployment: deployment.into(),
            api_version: api_version.into(),
        });
        self
    }

    /// Sets the model (or Azure deployment) used for embeddings.
    #[must_use]
    pub fn with_embedding_model(mut self, model: impl Into<String>) -> Self {
        self.embedding_model = model.into();
        self
    }

    /// Sets the default sampling temperature used when requests omit it.
    #[must_use]
    pub fn with_default_temperature(mut self, temperature: f32) -> Self {
        self.default_temperature = Some(temperature);
        self
    }

    /// Sets the HTTP request timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Supplies an explicit API key.
    #[must_use]
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    fn chat_url(&self) -> String {
        match &self.azure {
            Some(azure) => format!(
                "{}openai/deployments/{}/chat/completions?api-version={}",
                self.base_url, azure.deployment, azure.api_version
            ),
            None => format!("{}v1/chat/completions", self.base_url),
        }
    }

    fn embeddings_url(&self) -> String {
        match &self.azure {
            Some(azure) => format!(
                "{}openai/deployments/{}/embeddings?api-version={}",
                self.base_url, self.embedding_model, azure.api_version
            ),
            None => format!("{}v1/embeddings", self.base_url),
        }
    }
}

/// `OpenAI` adapter that calls the official (or Azure) API over HTTPS.
pub struct OpenAiAdapter {
    client: HyperClient,
    chat_endpoint: Uri,
    embeddings_endpoint: Uri,
    metadata: AdapterMetadata,
    embedding_metadata: AdapterMetadata,
    auth_header: (HeaderName, String),
    timeout: Duration,
    default_temperature: Option<f32>,
}

impl fmt::Debug for OpenAiAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiAdapter")
            .field("provider", &self.metadata.provider())
            .field("model", &self.metadata.model())
            .field("endpoint", &self.chat_endpoint)
            .finish_non_exhaustive()
    }
}

impl OpenAiAdapter {
    /// Constructs a new adapter with the provided configuration.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Configuration`] if the API key is missing or an
    /// endpoint cannot be parsed.
    pub fn new(config: OpenAiConfig) -> AdapterResult<Self> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| AdapterError::configuration("OpenAI adapter requires an API key"))?;

        let (provider, auth_header) = if config.azure.is_some() {
            ("azure-openai", (HeaderName::from_static("api-key"), api_key))
        } else {
            ("openai", (AUTHORIZATION, format!("Bearer {api_key}")))
        };

        let chat_endpoint = parse_endpoint(&config.chat_url(), "OpenAI")?;
        let embeddings_endpoint = parse_endpoint(&config.embeddings_url(), "OpenAI")?;
        let client = build_https_client()?;

        Ok(Self {
            client,
            chat_endpoint,
            embeddings_endpoint,
            metadata: AdapterMetadata::new(provider, config.model.clone()),
            embedding_metadata: AdapterMetadata::new(provider, config.embedding_model.clone()),
            auth_header,
            timeout: config.timeout,
            default_temperature: config.default_temperature,
        })
    }

    fn build_request(&self, request: &InferenceRequest) -> ChatCompletionRequest {
        let mut messages = Vec::with_capacity(request.messages().len() + 1);
        if let Some(system) = request.system_prompt() {
            messages.push(OpenAiMessage::text("system", system));
        }
        messages.extend(request.messages().iter().map(map_prompt_message));

        let tools: Vec<OpenAiTool> = request
            .tools()
            .iter()
            .map(|schema| OpenAiTool {
                kind: "function",
                function: OpenAiFunctionDef {
                    name: schema.name().to_owned(),
                    description: schema.description().to_owned(),
                    parameters: schema.parameters().clone(),
                },
            })
            .collect();
        let tool_choice = (!tools.is_empty()).then_some("auto");

        ChatCompletionRequest {
            model: self.metadata.model().to_owned(),
            messages,
            tools,
            tool_choice,
            temperature: request.temperature().or(self.default_temperature),
            max_tokens: request.max_output_tokens(),
            stream: false,
        }
    }

    fn headers(&self) -> [(HeaderName, String); 1] {
        [self.auth_header.clone()]
    }
}

#[async_trait]
impl ModelAdapter for OpenAiAdapter {
    fn metadata(&self) -> &AdapterMetadata {
        &self.metadata
    }

    async fn infer(&self, request: InferenceRequest) -> AdapterResult<AdapterStream> {
        let payload = self.build_request(&request);
        let response: ChatCompletionResponse = post_json(
            &self.client,
            &self.chat_endpoint,
            &self.headers(),
            &payload,
            self.timeout,
            self.metadata.provider(),
        )
        .await?;

        let chunk = response.into_chunk()?;
        debug!(
            provider = self.metadata.provider(),
            tool_calls = chunk.tool_calls.len(),
            "chat completion received"
        );

        let stream = stream::once(async move { Ok(chunk) });
        Ok(Box::pin(stream))
    }
}

#[async_trait]
impl EmbeddingAdapter for OpenAiAdapter {
    fn embedding_metadata(&self) -> &AdapterMetadata {
        &self.embedding_metadata
    }

    async fn embed(&self, inputs: &[String]) -> AdapterResult<Vec<Vec<f32>>> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }

        let payload = EmbeddingRequest {
            model: self.embedding_metadata.model(),
            input: inputs,
        };
        let response: EmbeddingResponse = post_json(
            &self.client,
            &self.embeddings_endpoint,
            &self.headers(),
            &payload,
            self.timeout,
            self.embedding_metadata.provider(),
        )
        .await?;

        response.into_vectors(inputs.len())
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<OpenAiMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<OpenAiTool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none", rename = "max_tokens")]
    max_tokens: Option<u32>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct OpenAiMessage {
    role: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<OpenAiToolCall>,
}

impl OpenAiMessage {
    fn text(role: &'static str, content: &str) -> Self {
        Self {
            role,
            content: Some(content.to_owned()),
            name: None,
            tool_call_id: None,
            tool_calls: Vec::new(),
        }
    }
}

#[derive(Debug, Serialize)]
struct OpenAiTool {
    #[serde(rename = "type")]
    kind: &'static str,
    function: OpenAiFunctionDef,
}

#[derive(Debug, Serialize)]
struct OpenAiFunctionDef {
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAiToolCall {
    id: String,
    #[serde(rename = "type", default = "function_kind")]
    kind: String,
    function: OpenAiFunctionCall,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAiFunctionCall {
    name: String,
    #[serde(default)]
    arguments: String,
}

fn function_kind() -> String {
    "function".to_owned()
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

impl ChatCompletionResponse {
    fn into_chunk(self) -> AdapterResult<InferenceChunk> {
        let message = self
            .choices
            .into_iter()
            .find_map(|choice| choice.message)
            .ok_or_else(|| AdapterError::response("OpenAI response contained no choices"))?;

        let tool_calls = message
            .tool_calls
            .into_iter()
            .map(|call| ToolCallRequest::new(call.id, call.function.name, call.function.arguments))
            .collect();

        Ok(InferenceChunk::new(message.content.unwrap_or_default(), true).with_tool_calls(tool_calls))
    }
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    #[serde(default)]
    message: Option<ChoiceMessage>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<OpenAiToolCall>,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    #[serde(default)]
    data: Vec<EmbeddingDatum>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingDatum {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

impl EmbeddingResponse {
    fn into_vectors(mut self, expected: usize) -> AdapterResult<Vec<Vec<f32>>> {
        if self.data.len() != expected {
            return Err(AdapterError::response(format!(
                "expected {expected} embeddings, received {}",
                self.data.len()
            )));
        }
        self.data.sort_by_key(|datum| datum.index);
        Ok(self.data.into_iter().map(|datum| datum.embedding).collect())
    }
}

fn map_prompt_message(message: &PromptMessage) -> OpenAiMessage {
    match message.role() {
        MessageRole::Tool => OpenAiMessage {
            role: "tool",
            content: Some(message.content().to_owned()),
            name: message.name().map(ToOwned::to_owned),
            tool_call_id: message.tool_call_id().map(ToOwned::to_owned),
            tool_calls: Vec::new(),
        },
        MessageRole::Assistant if !message.tool_calls().is_empty() => OpenAiMessage {
            role: "assistant",
            content: (!message.content().is_empty()).then(|| message.content().to_owned()),
            name: None,
            tool_call_id: None,
            tool_calls: message
                .tool_calls()
                .iter()
                .map(|call| OpenAiToolCall {
                    id: call.id.clone(),
                    kind: function_kind(),
                    function: OpenAiFunctionCall {
                        name: call.name.clone(),
                        arguments: call.arguments.clone(),
                    },
                })
                .collect(),
        },
        MessageRole::Assistant => OpenAiMessage::text("assistant", message.content()),
        MessageRole::User => OpenAiMessage::text("user", message.content()),
        MessageRole::System => OpenAiMessage::text("system", message.content()),
    }
}

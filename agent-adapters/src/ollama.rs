//! `Ollama` adapter implementation.

use std::sync::atomic::{AtomicU64, Ordering};
use std::{fmt, time::Duration};

use async_trait::async_trait;
use futures::stream;
use hyper::Uri;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::http_client::{HyperClient, build_https_client, parse_endpoint, post_json, sanitize_base_url};
use crate::traits::{
    AdapterError, AdapterMetadata, AdapterResult, AdapterStream, EmbeddingAdapter, InferenceChunk,
    InferenceRequest, MessageRole, ModelAdapter, PromptMessage, ToolCallRequest,
};

const DEFAULT_EMBEDDING_MODEL: &str = "nomic-embed-text";

/// Configuration for the `Ollama` adapter.
#[derive(Clone, Debug)]
pub struct OllamaConfig {
    base_url: String,
    model: String,
    embedding_model: String,
    default_temperature: Option<f32>,
    timeout: Duration,
}

impl OllamaConfig {
    /// Creates a configuration for the supplied model using default settings.
    #[must_use]
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            base_url: "http://127.0.0.1:11434/".to_owned(),
            model: model.into(),
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_owned(),
            default_temperature: None,
            timeout: Duration::from_secs(120),
        }
    }

    /// Overrides the base URL of the local Ollama daemon.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Configuration`] if the supplied URL is invalid.
    pub fn with_base_url(mut self, base_url: impl AsRef<str>) -> AdapterResult<Self> {
        self.base_url = sanitize_base_url(base_url.as_ref(), "Ollama")?;
        Ok(self)
    }

    /// Sets the model used by `/api/embed`.
    #[must_use]
    pub fn with_embedding_model(mut self, model: impl Into<String>) -> Self {
        self.embedding_model = model.into();
        self
    }

    /// Sets the default sampling temperature used when the request does not
    /// provide one explicitly.
    #[must_use]
    pub fn with_default_temperature(mut self, temperature: f32) -> Self {
        self.default_temperature = Some(temperature);
        self
    }

    /// Sets the HTTP timeout for requests to the Ollama daemon.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// `Ollama` adapter that calls the local Ollama daemon over HTTP/HTTPS.
///
/// Ollama does not assign ids to tool calls, so the adapter synthesises
/// `call_<n>` ids from a per-adapter counter.
pub struct OllamaAdapter {
    client: HyperClient,
    chat_endpoint: Uri,
    embed_endpoint: Uri,
    metadata: AdapterMetadata,
    embedding_metadata: AdapterMetadata,
    timeout: Duration,
    default_temperature: Option<f32>,
    next_call_id: AtomicU64,
}

impl fmt::Debug for OllamaAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OllamaAdapter")
            .field("model", &self.metadata.model())
            .field("endpoint", &self.chat_endpoint)
            .finish_non_exhaustive()
    }
}

impl OllamaAdapter {
    /// Constructs a new adapter from the supplied configuration.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Configuration`] if the endpoint is invalid or the HTTP
    /// client cannot be constructed.
    #[allow(clippy::needless_pass_by_value)]
    pub fn new(config: OllamaConfig) -> AdapterResult<Self> {
        let chat_endpoint = parse_endpoint(&format!("{}api/chat", config.base_url), "Ollama")?;
        let embed_endpoint = parse_endpoint(&format!("{}api/embed", config.base_url), "Ollama")?;
        let client = build_https_client()?;

        Ok(Self {
            client,
            chat_endpoint,
            embed_endpoint,
            metadata: AdapterMetadata::new("ollama", config.model.clone()),
            embedding_metadata: AdapterMetadata::new("ollama", config.embedding_model.clone()),
            timeout: config.timeout,
            default_temperature: config.default_temperature,
            next_call_id: AtomicU64::new(1),
        })
    }

    fn build_request(&self, request: &InferenceRequest) -> ChatRequest {
        let mut messages = Vec::with_capacity(request.messages().len() + 1);
        if let Some(system) = request.system_prompt() {
            messages.push(ChatMessage::text("system", system));
        }
        messages.extend(request.messages().iter().map(map_prompt_message));

        let options = if request.temperature().is_some()
            || self.default_temperature.is_some()
            || request.max_output_tokens().is_some()
        {
            Some(ChatOptions {
                temperature: request.temperature().or(self.default_temperature),
                max_output_tokens: request.max_output_tokens(),
            })
        } else {
            None
        };

        let tools = request
            .tools()
            .iter()
            .map(|schema| ChatTool {
                kind: "function",
                function: ChatFunctionDef {
                    name: schema.name().to_owned(),
                    description: schema.description().to_owned(),
                    parameters: schema.parameters().clone(),
                },
            })
            .collect();

        ChatRequest {
            model: self.metadata.model().to_owned(),
            stream: false,
            messages,
            tools,
            options,
        }
    }

    fn into_chunk(&self, response: ChatResponse) -> AdapterResult<InferenceChunk> {
        if let Some(error) = response.error {
            return Err(AdapterError::response(error));
        }

        let Some(message) = response.message else {
            return Ok(InferenceChunk::new(response.response.unwrap_or_default(), true));
        };

        let tool_calls = message
            .tool_calls
            .into_iter()
            .map(|call| {
                let id = self.next_call_id.fetch_add(1, Ordering::Relaxed);
                let arguments = match call.function.arguments {
                    Value::String(raw) => raw,
                    other => other.to_string(),
                };
                ToolCallRequest::new(format!("call_{id}"), call.function.name, arguments)
            })
            .collect();

        Ok(InferenceChunk::new(message.content, true).with_tool_calls(tool_calls))
    }
}

#[async_trait]
impl ModelAdapter for OllamaAdapter {
    fn metadata(&self) -> &AdapterMetadata {
        &self.metadata
    }

    async fn infer(&self, request: InferenceRequest) -> AdapterResult<AdapterStream> {
        let payload = self.build_request(&request);
        let response: ChatResponse = post_json(
            &self.client,
            &self.chat_endpoint,
            &[],
            &payload,
            self.timeout,
            "Ollama",
        )
        .await?;

        let chunk = self.into_chunk(response)?;
        let stream = stream::once(async move { Ok(chunk) });
        Ok(Box::pin(stream))
    }
}

#[async_trait]
impl EmbeddingAdapter for OllamaAdapter {
    fn embedding_metadata(&self) -> &AdapterMetadata {
        &self.embedding_metadata
    }

    async fn embed(&self, inputs: &[String]) -> AdapterResult<Vec<Vec<f32>>> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }

        let payload = EmbedRequest {
            model: self.embedding_metadata.model(),
            input: inputs,
        };
        let response: EmbedResponse = post_json(
            &self.client,
            &self.embed_endpoint,
            &[],
            &payload,
            self.timeout,
            "Ollama",
        )
        .await?;

        if let Some(error) = response.error {
            return Err(AdapterError::response(error));
        }
        if response.embeddings.len() != inputs.len() {
            return Err(AdapterError::response(format!(
                "expected {} embeddings, received {}",
                inputs.len(),
                response.embeddings.len()
            )));
        }
        Ok(response.embeddings)
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    stream: bool,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ChatTool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<ChatOptions>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    #[serde(default)]
    content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<ChatToolCall>,
}

impl ChatMessage {
    fn text(role: &str, content: &str) -> Self {
        Self {
            role: role.to_owned(),
            content: content.to_owned(),
            tool_calls: Vec::new(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatToolCall {
    function: ChatFunctionCall,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatFunctionCall {
    name: String,
    #[serde(default)]
    arguments: Value,
}

#[derive(Debug, Serialize)]
struct ChatTool {
    #[serde(rename = "type")]
    kind: &'static str,
    function: ChatFunctionDef,
}

#[derive(Debug, Serialize)]
struct ChatFunctionDef {
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Debug, Serialize)]
struct ChatOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none", rename = "num_predict")]
    max_output_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    message: Option<ChatMessage>,
    #[serde(default)]
    response: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    #[serde(default)]
    embeddings: Vec<Vec<f32>>,
    #[serde(default)]
    error: Option<String>,
}

fn map_prompt_message(message: &PromptMessage) -> ChatMessage {
    let tool_calls = message
        .tool_calls()
        .iter()
        .map(|call| ChatToolCall {
            function: ChatFunctionCall {
                name: call.name.clone(),
                // Ollama expects the arguments as a JSON object, not a string.
                arguments: serde_json::from_str(&call.arguments)
                    .unwrap_or_else(|_| Value::String(call.arguments.clone())),
            },
        })
        .collect();

    ChatMessage {
        role: message.role().to_string(),
        content: message.content().to_owned(),
        tool_calls,
    }
}

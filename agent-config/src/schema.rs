//! Strongly typed configuration schema.
//!
//! Every section deserialises from a partial JSON object; omitted fields take
//! the defaults documented on each field.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use agent_primitives::RunStatus;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};

/// Chat model provider.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelProvider {
    /// `OpenAI` public API.
    #[default]
    #[serde(rename = "openai")]
    OpenAi,
    /// Azure `OpenAI` deployment.
    #[serde(rename = "azure_openai")]
    AzureOpenAi,
    /// Local Ollama daemon.
    #[serde(rename = "ollama")]
    Ollama,
}

impl ModelProvider {
    /// Returns the configuration spelling.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::AzureOpenAi => "azure_openai",
            Self::Ollama => "ollama",
        }
    }

    /// Environment variable holding the API key when none is configured.
    #[must_use]
    pub const fn default_api_key_env(self) -> Option<&'static str> {
        match self {
            Self::OpenAi => Some("OPENAI_API_KEY"),
            Self::AzureOpenAi => Some("AZURE_OPENAI_API_KEY"),
            Self::Ollama => None,
        }
    }
}

impl fmt::Display for ModelProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> ConfigResult<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "azure_openai" | "azure" => Ok(Self::AzureOpenAi),
            "ollama" => Ok(Self::Ollama),
            other => Err(ConfigError::invalid_value(
                "model.provider",
                format!("unknown provider `{other}`"),
            )),
        }
    }
}

/// Embedding backend used by the semantic index.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum EmbeddingProvider {
    /// Local TF-IDF embedder fitted on the catalog; needs no network.
    #[default]
    #[serde(rename = "lexical")]
    Lexical,
    /// `OpenAI` (or Azure) embeddings endpoint.
    #[serde(rename = "openai")]
    OpenAi,
    /// Ollama `/api/embed`.
    #[serde(rename = "ollama")]
    Ollama,
}

impl FromStr for EmbeddingProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> ConfigResult<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "lexical" => Ok(Self::Lexical),
            "openai" => Ok(Self::OpenAi),
            "ollama" => Ok(Self::Ollama),
            other => Err(ConfigError::invalid_value(
                "embeddings.provider",
                format!("unknown embedding provider `{other}`"),
            )),
        }
    }
}

/// Chat model settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ModelConfig {
    /// Provider (default `openai`).
    pub provider: ModelProvider,
    /// Model name (default `gpt-4o`).
    pub model: String,
    /// Base URL override.
    pub base_url: Option<String>,
    /// Environment variable holding the API key; defaults per provider.
    pub api_key_env: Option<String>,
    /// Azure deployment name, required for `azure_openai`.
    pub azure_deployment: Option<String>,
    /// Azure API version (default `2024-06-01`).
    pub azure_api_version: String,
    /// HTTP timeout in milliseconds (default 60000).
    pub timeout_ms: u64,
    /// Sampling temperature.
    pub temperature: Option<f32>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: ModelProvider::OpenAi,
            model: "gpt-4o".to_owned(),
            base_url: None,
            api_key_env: None,
            azure_deployment: None,
            azure_api_version: "2024-06-01".to_owned(),
            timeout_ms: 60_000,
            temperature: None,
        }
    }
}

impl ModelConfig {
    /// Returns the environment variable to read the API key from.
    #[must_use]
    pub fn api_key_env(&self) -> Option<&str> {
        self.api_key_env
            .as_deref()
            .or_else(|| self.provider.default_api_key_env())
    }

    /// Returns the HTTP timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Embedding settings.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EmbeddingConfig {
    /// Backend (default `lexical`).
    pub provider: EmbeddingProvider,
    /// Embedding model; providers fall back to their own default.
    pub model: Option<String>,
}

/// Dispatch loop settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DispatchConfig {
    /// Maximum model turns per task (default 10).
    pub max_steps: usize,
    /// Text the model emits to finish a task (default `TERMINATE`).
    pub termination_marker: String,
    /// Deadline for one model call in milliseconds (default 120000).
    pub turn_timeout_ms: u64,
    /// Retries of a transiently failing model call (default 2).
    pub max_turn_retries: u32,
    /// Base delay between retries in milliseconds (default 500).
    pub retry_backoff_ms: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_steps: 10,
            termination_marker: "TERMINATE".to_owned(),
            turn_timeout_ms: 120_000,
            max_turn_retries: 2,
            retry_backoff_ms: 500,
        }
    }
}

impl DispatchConfig {
    /// Sets the step budget.
    #[must_use]
    pub const fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    /// Sets the termination marker.
    #[must_use]
    pub fn with_termination_marker(mut self, marker: impl Into<String>) -> Self {
        self.termination_marker = marker.into();
        self
    }

    /// Sets the per-turn deadline.
    #[must_use]
    pub fn with_turn_timeout(mut self, timeout: Duration) -> Self {
        self.turn_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Sets the retry budget and base backoff.
    #[must_use]
    pub fn with_retries(mut self, retries: u32, backoff: Duration) -> Self {
        self.max_turn_retries = retries;
        self.retry_backoff_ms = u64::try_from(backoff.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Returns the per-turn deadline.
    #[must_use]
    pub const fn turn_timeout(&self) -> Duration {
        Duration::from_millis(self.turn_timeout_ms)
    }

    /// Returns the delay before retry number `attempt` (1-based), doubling
    /// each time.
    #[must_use]
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        let factor = 1_u64 << attempt.saturating_sub(1).min(16);
        Duration::from_millis(self.retry_backoff_ms.saturating_mul(factor))
    }
}

/// Semantic index settings.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IndexConfig {
    /// Minimum cosine similarity for a match. `None` always accepts the
    /// nearest entry.
    pub min_similarity: Option<f32>,
}

/// Polling policy for hosted assistant runs.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PollPolicy {
    /// Status checks before giving up (default 10).
    pub max_attempts: u32,
    /// First delay between checks in milliseconds (default 3000).
    pub interval_ms: u64,
    /// Multiplier applied to the delay after each check (default 1.0).
    pub backoff_factor: f64,
    /// Upper bound on the delay in milliseconds (default 30000).
    pub max_interval_ms: u64,
    /// Deadline for one backend call in milliseconds (default 30000).
    pub request_timeout_ms: u64,
    /// Statuses that end polling.
    pub terminal_statuses: Vec<RunStatus>,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            interval_ms: 3_000,
            backoff_factor: 1.0,
            max_interval_ms: 30_000,
            request_timeout_ms: 30_000,
            terminal_statuses: RunStatus::FINAL.to_vec(),
        }
    }
}

impl PollPolicy {
    /// Returns the deadline for one backend call.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Returns `true` when `status` ends polling.
    #[must_use]
    pub fn is_terminal(&self, status: RunStatus) -> bool {
        self.terminal_statuses.contains(&status)
    }

    /// Delay to wait after check number `attempt` (0-based).
    #[must_use]
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_possible_wrap
    )]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let scaled = self.interval_ms as f64 * self.backoff_factor.powi(attempt.min(64) as i32);
        let capped = scaled.min(self.max_interval_ms as f64).max(0.0);
        Duration::from_millis(capped as u64)
    }
}

/// Complete agent configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AgentConfig {
    /// Chat model.
    pub model: ModelConfig,
    /// Embedding backend.
    pub embeddings: EmbeddingConfig,
    /// Dispatch loop.
    pub dispatch: DispatchConfig,
    /// Semantic index.
    pub index: IndexConfig,
    /// Hosted-run polling.
    pub poll: PollPolicy,
    /// Sessions run concurrently by the kernel (default 4).
    pub scheduler_concurrency: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            model: ModelConfig::default(),
            embeddings: EmbeddingConfig::default(),
            dispatch: DispatchConfig::default(),
            index: IndexConfig::default(),
            poll: PollPolicy::default(),
            scheduler_concurrency: 4,
        }
    }
}

impl AgentConfig {
    /// Checks cross-field constraints.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] naming the first offending key.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.model.model.trim().is_empty() {
            return Err(ConfigError::invalid_value("model.model", "must not be empty"));
        }
        if self.model.provider == ModelProvider::AzureOpenAi
            && self.model.azure_deployment.as_deref().is_none_or(str::is_empty)
        {
            return Err(ConfigError::invalid_value(
                "model.azure_deployment",
                "required for the azure_openai provider",
            ));
        }
        if self.dispatch.max_steps == 0 {
            return Err(ConfigError::invalid_value(
                "dispatch.max_steps",
                "must be at least 1",
            ));
        }
        if self.dispatch.termination_marker.trim().is_empty() {
            return Err(ConfigError::invalid_value(
                "dispatch.termination_marker",
                "must not be empty",
            ));
        }
        if self.dispatch.turn_timeout_ms == 0 {
            return Err(ConfigError::invalid_value(
                "dispatch.turn_timeout_ms",
                "must be positive",
            ));
        }
        if let Some(threshold) = self.index.min_similarity {
            if !(-1.0..=1.0).contains(&threshold) {
                return Err(ConfigError::invalid_value(
                    "index.min_similarity",
                    format!("{threshold} is outside [-1, 1]"),
                ));
            }
        }
        if self.poll.max_attempts == 0 {
            return Err(ConfigError::invalid_value(
                "poll.max_attempts",
                "must be at least 1",
            ));
        }
        if !self.poll.backoff_factor.is_finite() || self.poll.backoff_factor < 1.0 {
            return Err(ConfigError::invalid_value(
                "poll.backoff_factor",
                "must be a finite number >= 1.0",
            ));
        }
        if self.poll.max_interval_ms < self.poll.interval_ms {
            return Err(ConfigError::invalid_value(
                "poll.max_interval_ms",
                "must not be smaller than poll.interval_ms",
            ));
        }
        if self.poll.request_timeout_ms == 0 {
            return Err(ConfigError::invalid_value(
                "poll.request_timeout_ms",
                "must be positive",
            ));
        }
        if self.poll.terminal_statuses.is_empty() {
            return Err(ConfigError::invalid_value(
                "poll.terminal_statuses",
                "must name at least one status",
            ));
        }
        if self.scheduler_concurrency == 0 {
            return Err(ConfigError::invalid_value(
                "scheduler_concurrency",
                "must be at least 1",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = AgentConfig::default();
        config.validate().unwrap();
        assert_eq!(config.dispatch.max_steps, 10);
        assert_eq!(config.dispatch.termination_marker, "TERMINATE");
        assert_eq!(config.embeddings.provider, EmbeddingProvider::Lexical);
        assert!(config.index.min_similarity.is_none());
        assert!(config.poll.is_terminal(RunStatus::Completed));
        assert!(!config.poll.is_terminal(RunStatus::RequiresAction));
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config: AgentConfig = serde_json::from_str(
            r#"{"model": {"provider": "ollama", "model": "llama3.1"},
                "dispatch": {"max_steps": 3},
                "index": {"min_similarity": 0.25}}"#,
        )
        .unwrap();
        assert_eq!(config.model.provider, ModelProvider::Ollama);
        assert_eq!(config.model.api_key_env(), None);
        assert_eq!(config.dispatch.max_steps, 3);
        assert_eq!(config.dispatch.turn_timeout_ms, 120_000);
        assert_eq!(config.index.min_similarity, Some(0.25));
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let result = serde_json::from_str::<AgentConfig>(r#"{"dispatch": {"max_stepz": 3}}"#);
        assert!(result.is_err());
    }

    #[test]
    fn validation_names_offending_key() {
        let mut config = AgentConfig::default();
        config.dispatch.max_steps = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { key, .. }) if key == "dispatch.max_steps"
        ));

        let mut config = AgentConfig::default();
        config.index.min_similarity = Some(1.5);
        assert!(config.validate().is_err());

        let mut config = AgentConfig::default();
        config.poll.request_timeout_ms = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { key, .. }) if key == "poll.request_timeout_ms"
        ));

        let mut config = AgentConfig::default();
        config.model.provider = ModelProvider::AzureOpenAi;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { key, .. }) if key == "model.azure_deployment"
        ));
        config.model.azure_deployment = Some("gpt4".into());
        config.validate().unwrap();
        assert_eq!(config.model.api_key_env(), Some("AZURE_OPENAI_API_KEY"));
    }

    #[test]
    fn poll_delay_grows_and_caps() {
        let policy = PollPolicy {
            interval_ms: 1_000,
            backoff_factor: 2.0,
            max_interval_ms: 5_000,
            ..PollPolicy::default()
        };
        assert_eq!(policy.delay_for(0), Duration::from_secs(1));
        assert_eq!(policy.delay_for(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for(2), Duration::from_secs(4));
        assert_eq!(policy.delay_for(3), Duration::from_secs(5));
    }

    #[test]
    fn retry_delay_doubles() {
        let dispatch = DispatchConfig::default();
        assert_eq!(dispatch.retry_delay(1), Duration::from_millis(500));
        assert_eq!(dispatch.retry_delay(2), Duration::from_millis(1_000));
    }

    #[test]
    fn provider_parsing() {
        assert_eq!("Azure".parse::<ModelProvider>().unwrap(), ModelProvider::AzureOpenAi);
        assert!("gemini".parse::<ModelProvider>().is_err());
        assert_eq!(
            "ollama".parse::<EmbeddingProvider>().unwrap(),
            EmbeddingProvider::Ollama
        );
    }
}

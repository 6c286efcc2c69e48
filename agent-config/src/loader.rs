//! Loading configuration from a JSON file and the environment.
//!
//! Recognised environment variables:
//!
//! - `AGENT_MODEL_PROVIDER` - `openai`, `azure_openai`, or `ollama`
//! - `AGENT_MODEL` - chat model or deployment name
//! - `AGENT_BASE_URL` - provider base URL
//! - `AGENT_MAX_STEPS` - step budget per task
//! - `AGENT_TERMINATION_MARKER` - marker that ends a task
//! - `AGENT_MIN_SIMILARITY` - semantic match threshold in `[-1, 1]`
//! - `AGENT_EMBEDDINGS_PROVIDER` - `lexical`, `openai`, or `ollama`

use std::env;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use tracing::debug;

use crate::error::{ConfigError, ConfigResult};
use crate::schema::{AgentConfig, EmbeddingProvider, ModelProvider};

/// Environment variable overriding [`ModelConfig::provider`](crate::ModelConfig).
pub const ENV_MODEL_PROVIDER: &str = "AGENT_MODEL_PROVIDER";
/// Environment variable overriding the model name.
pub const ENV_MODEL: &str = "AGENT_MODEL";
/// Environment variable overriding the provider base URL.
pub const ENV_BASE_URL: &str = "AGENT_BASE_URL";
/// Environment variable overriding the step budget.
pub const ENV_MAX_STEPS: &str = "AGENT_MAX_STEPS";
/// Environment variable overriding the termination marker.
pub const ENV_TERMINATION_MARKER: &str = "AGENT_TERMINATION_MARKER";
/// Environment variable overriding the semantic match threshold.
pub const ENV_MIN_SIMILARITY: &str = "AGENT_MIN_SIMILARITY";
/// Environment variable overriding the embedding backend.
pub const ENV_EMBEDDINGS_PROVIDER: &str = "AGENT_EMBEDDINGS_PROVIDER";

impl AgentConfig {
    /// Loads configuration from `path` (if given), applies process
    /// environment overrides, and validates the result.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the file cannot be read or parsed, an
    /// override is malformed, or validation fails.
    pub fn load(path: Option<&Path>) -> ConfigResult<Self> {
        Self::load_with(path, |key| env::var(key).ok())
    }

    /// Same as [`AgentConfig::load`] with an explicit variable lookup.
    ///
    /// # Errors
    ///
    /// See [`AgentConfig::load`].
    pub fn load_with<F>(path: Option<&Path>, lookup: F) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match path {
            Some(path) => {
                let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })?;
                Self::from_json_str(&text, &path.display().to_string())?
            }
            None => Self::default(),
        };
        config.apply_env(lookup)?;
        config.validate()?;
        debug!(
            provider = %config.model.provider,
            model = %config.model.model,
            max_steps = config.dispatch.max_steps,
            "configuration loaded"
        );
        Ok(config)
    }

    /// Parses JSON text; `origin` labels errors.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] on malformed JSON or unknown fields.
    pub fn from_json_str(text: &str, origin: &str) -> ConfigResult<Self> {
        serde_json::from_str(text).map_err(|source| ConfigError::Parse {
            origin: origin.to_owned(),
            source,
        })
    }

    /// Applies overrides from `lookup`. Unset variables leave values untouched.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] naming the variable whose value
    /// cannot be parsed.
    pub fn apply_env<F>(&mut self, lookup: F) -> ConfigResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(provider) = lookup(ENV_MODEL_PROVIDER) {
            self.model.provider = ModelProvider::from_str(&provider)
                .map_err(|err| rename_key(err, ENV_MODEL_PROVIDER))?;
        }
        if let Some(model) = lookup(ENV_MODEL) {
            self.model.model = model;
        }
        if let Some(base_url) = lookup(ENV_BASE_URL) {
            self.model.base_url = Some(base_url);
        }
        if let Some(steps) = parse_var::<usize>(&lookup, ENV_MAX_STEPS)? {
            self.dispatch.max_steps = steps;
        }
        if let Some(marker) = lookup(ENV_TERMINATION_MARKER) {
            self.dispatch.termination_marker = marker;
        }
        if let Some(threshold) = parse_var::<f32>(&lookup, ENV_MIN_SIMILARITY)? {
            self.index.min_similarity = Some(threshold);
        }
        if let Some(provider) = lookup(ENV_EMBEDDINGS_PROVIDER) {
            self.embeddings.provider = EmbeddingProvider::from_str(&provider)
                .map_err(|err| rename_key(err, ENV_EMBEDDINGS_PROVIDER))?;
        }
        Ok(())
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> ConfigResult<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|err| ConfigError::invalid_value(key, format!("`{raw}`: {err}"))),
        None => Ok(None),
    }
}

fn rename_key(err: ConfigError, key: &str) -> ConfigError {
    match err {
        ConfigError::InvalidValue { reason, .. } => ConfigError::invalid_value(key, reason),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::path::PathBuf;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| ((*key).to_owned(), (*value).to_owned()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn temp_file(name: &str, contents: &str) -> PathBuf {
        let path = env::temp_dir().join(format!("agent-config-{}-{name}", std::process::id()));
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn environment_overrides_defaults() {
        let config = AgentConfig::load_with(
            None,
            vars(&[
                (ENV_MODEL_PROVIDER, "ollama"),
                (ENV_MODEL, "llama3.1"),
                (ENV_MAX_STEPS, "3"),
                (ENV_MIN_SIMILARITY, "0.2"),
                (ENV_EMBEDDINGS_PROVIDER, "ollama"),
            ]),
        )
        .unwrap();

        assert_eq!(config.model.provider, ModelProvider::Ollama);
        assert_eq!(config.model.model, "llama3.1");
        assert_eq!(config.dispatch.max_steps, 3);
        assert_eq!(config.index.min_similarity, Some(0.2));
        assert_eq!(config.embeddings.provider, EmbeddingProvider::Ollama);
    }

    #[test]
    fn malformed_override_names_variable() {
        let err = AgentConfig::load_with(None, vars(&[(ENV_MAX_STEPS, "many")]))
            .expect_err("not a number");
        assert!(matches!(err, ConfigError::InvalidValue { key, .. } if key == ENV_MAX_STEPS));

        let err = AgentConfig::load_with(None, vars(&[(ENV_MODEL_PROVIDER, "gemini")]))
            .expect_err("unknown provider");
        assert!(matches!(err, ConfigError::InvalidValue { key, .. } if key == ENV_MODEL_PROVIDER));
    }

    #[test]
    fn overrides_are_validated() {
        let err = AgentConfig::load_with(None, vars(&[(ENV_MAX_STEPS, "0")]))
            .expect_err("zero steps");
        assert!(matches!(err, ConfigError::InvalidValue { key, .. } if key == "dispatch.max_steps"));
    }

    #[test]
    fn file_then_environment() {
        let path = temp_file(
            "layered.json",
            r#"{"model": {"model": "gpt-4o-mini"}, "dispatch": {"max_steps": 6}}"#,
        );
        let config =
            AgentConfig::load_with(Some(&path), vars(&[(ENV_TERMINATION_MARKER, "DONE")])).unwrap();
        fs::remove_file(&path).ok();

        assert_eq!(config.model.model, "gpt-4o-mini");
        assert_eq!(config.dispatch.max_steps, 6);
        assert_eq!(config.dispatch.termination_marker, "DONE");
    }

    #[test]
    fn missing_and_malformed_files() {
        let missing = env::temp_dir().join("agent-config-does-not-exist.json");
        assert!(matches!(
            AgentConfig::load_with(Some(&missing), vars(&[])),
            Err(ConfigError::Io { .. })
        ));

        let path = temp_file("broken.json", "{ not json");
        let result = AgentConfig::load_with(Some(&path), vars(&[]));
        fs::remove_file(&path).ok();
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }
}

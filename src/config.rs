use std::env;
use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::Duration;
use thiserror::Error;

use crate::llm::ModelClientConfig;

const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";
const DEFAULT_TEMPLATE_DIR: &str = "template";
const DEFAULT_MAX_CONCURRENT_CALLS: usize = 4;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;
const DEFAULT_HISTORY_LIMIT: usize = 20;

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

/// Runtime configuration for the summarization server and CLI.
#[derive(Debug, Clone)]
pub struct Config {
    /// Optional override for the HTTP server port.
    pub server_port: Option<u16>,
    /// API key used for `gpt*` models routed to OpenAI.
    pub openai_api_key: Option<String>,
    /// Base URL of the OpenAI-compatible endpoint for `gpt*` models.
    pub openai_base_url: String,
    /// API key used for every other model, routed through OpenRouter.
    pub openrouter_api_key: Option<String>,
    /// Base URL of the OpenRouter endpoint.
    pub openrouter_base_url: String,
    /// Directory holding the default prompt templates.
    pub template_dir: PathBuf,
    /// Upper bound on concurrent model calls within one pipeline run.
    pub max_concurrent_calls: usize,
    /// Per-request HTTP timeout applied to model calls.
    pub request_timeout_secs: u64,
    /// Optional wall-clock ceiling for a whole pipeline run.
    pub pipeline_timeout_secs: Option<u64>,
    /// Number of records returned by the history listing.
    pub history_limit: usize,
}

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            server_port: parse_optional("SERVER_PORT")?,
            openai_api_key: load_env_optional("OPENAI_API_KEY"),
            openai_base_url: load_env_optional("OPENAI_BASE_URL")
                .unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string()),
            openrouter_api_key: load_env_optional("OPENROUTER_API_KEY"),
            openrouter_base_url: load_env_optional("OPENROUTER_BASE_URL")
                .unwrap_or_else(|| DEFAULT_OPENROUTER_BASE_URL.to_string()),
            template_dir: load_env_optional("MMSUMMARY_TEMPLATE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_TEMPLATE_DIR)),
            max_concurrent_calls: parse_optional("MMSUMMARY_MAX_CONCURRENT_CALLS")?
                .unwrap_or(DEFAULT_MAX_CONCURRENT_CALLS)
                .max(1),
            request_timeout_secs: parse_optional("MMSUMMARY_REQUEST_TIMEOUT_SECS")?
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
            pipeline_timeout_secs: parse_optional("MMSUMMARY_PIPELINE_TIMEOUT_SECS")?,
            history_limit: parse_optional("MMSUMMARY_HISTORY_LIMIT")?
                .unwrap_or(DEFAULT_HISTORY_LIMIT),
        })
    }

    /// Resolve the credentials and endpoints handed to the model client.
    pub fn model_client_config(&self) -> ModelClientConfig {
        ModelClientConfig {
            openai_api_key: self.openai_api_key.clone(),
            openai_base_url: self.openai_base_url.clone(),
            openrouter_api_key: self.openrouter_api_key.clone(),
            openrouter_base_url: self.openrouter_base_url.clone(),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
        }
    }

    /// Pipeline-level timeout, when one is configured.
    pub fn pipeline_timeout(&self) -> Option<Duration> {
        self.pipeline_timeout_secs.map(Duration::from_secs)
    }
}

fn load_env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_optional<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    load_env_optional(key)
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue(key.to_string()))
        })
        .transpose()
}

/// Global configuration cache populated during process start.
pub static CONFIG: OnceLock<Config> = OnceLock::new();

/// Retrieve the loaded configuration, panicking if initialization has not occurred.
pub fn get_config() -> &'static Config {
    CONFIG.get().expect("Config not initialized")
}

/// Load configuration from the environment and install it in the global cache.
pub fn init_config() {
    dotenvy::dotenv().ok();
    let config = Config::from_env().expect("Failed to load config from environment");
    tracing::debug!(
        server_port = ?config.server_port,
        has_openai_key = config.openai_api_key.is_some(),
        has_openrouter_key = config.openrouter_api_key.is_some(),
        template_dir = %config.template_dir.display(),
        max_concurrent_calls = config.max_concurrent_calls,
        "Loaded configuration"
    );
    CONFIG.set(config).expect("Failed to set config");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_client_config_carries_resolved_credentials() {
        let config = Config {
            server_port: None,
            openai_api_key: Some("sk-openai".into()),
            openai_base_url: DEFAULT_OPENAI_BASE_URL.into(),
            openrouter_api_key: None,
            openrouter_base_url: DEFAULT_OPENROUTER_BASE_URL.into(),
            template_dir: PathBuf::from(DEFAULT_TEMPLATE_DIR),
            max_concurrent_calls: 2,
            request_timeout_secs: 30,
            pipeline_timeout_secs: Some(600),
            history_limit: 20,
        };

        let client_config = config.model_client_config();
        assert_eq!(client_config.openai_api_key.as_deref(), Some("sk-openai"));
        assert!(client_config.openrouter_api_key.is_none());
        assert_eq!(client_config.request_timeout, Duration::from_secs(30));
        assert_eq!(config.pipeline_timeout(), Some(Duration::from_secs(600)));
    }

    #[test]
    fn unparsable_values_name_the_variable() {
        let key = "MMSUMMARY_TEST_UNPARSABLE_LIMIT";
        unsafe { env::set_var(key, "twenty") };
        let error = parse_optional::<usize>(key).expect_err("not a number");
        assert!(matches!(&error, ConfigError::InvalidValue(name) if name == key));

        unsafe { env::set_var(key, " 12 ") };
        assert_eq!(parse_optional::<usize>(key).expect("number"), Some(12));
        unsafe { env::remove_var(key) };
        assert_eq!(parse_optional::<usize>(key).expect("unset"), None);
    }
}

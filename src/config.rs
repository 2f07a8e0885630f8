//! Configuration management
//!
//! All settings come from the environment (a `.env` file is loaded by the
//! binary first). The four connection settings are required: a missing or
//! blank value is a [`ConfigError`] and the process must not start.

use std::fmt;
use std::time::Duration;

/// Default chat-completion model on the Groq API
pub const DEFAULT_COMPLETION_MODEL: &str = "llama-3.1-8b-instant";

/// Default OpenAI-compatible base URL
pub const DEFAULT_COMPLETION_API_URL: &str = "https://api.groq.com/openai/v1";

/// Default upper bound on a single completion call
pub const DEFAULT_COMPLETION_TIMEOUT_SECS: u64 = 30;

/// Startup configuration errors (always fatal)
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} missing")]
    Missing(&'static str),

    #[error("{name} is invalid: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Bot configuration
#[derive(Clone)]
pub struct Config {
    /// Telegram bot token
    pub telegram_token: String,

    /// Completion backend API key
    pub completion_api_key: String,

    /// Source channel whose media posts are indexed
    pub channel_id: i64,

    /// Catalog persistence connection string
    pub database_url: String,

    /// Completion model name
    pub completion_model: String,

    /// Completion API base URL
    pub completion_api_url: String,

    /// Hard timeout on one completion call
    pub completion_timeout: Duration,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &'static str| -> Result<String, ConfigError> {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .ok_or(ConfigError::Missing(name))
        };

        let telegram_token = required("TELEGRAM_TOKEN")?;
        let completion_api_key = required("GROQ_API_KEY")?;

        let channel_id = required("CHANNEL_ID")?
            .parse::<i64>()
            .map_err(|e| ConfigError::Invalid {
                name: "CHANNEL_ID",
                reason: e.to_string(),
            })?;

        let database_url = required("DATABASE_URL")?;

        let completion_model = lookup("COMPLETION_MODEL")
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_COMPLETION_MODEL.to_string());

        let completion_api_url = lookup("COMPLETION_API_URL")
            .filter(|v| !v.trim().is_empty())
            .map(|v| v.trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_COMPLETION_API_URL.to_string());

        let timeout_secs = match lookup("COMPLETION_TIMEOUT_SECS") {
            Some(raw) => match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => secs,
                _ => {
                    return Err(ConfigError::Invalid {
                        name: "COMPLETION_TIMEOUT_SECS",
                        reason: format!("expected a positive integer, got {:?}", raw),
                    })
                }
            },
            None => DEFAULT_COMPLETION_TIMEOUT_SECS,
        };

        Ok(Self {
            telegram_token,
            completion_api_key,
            channel_id,
            database_url,
            completion_model,
            completion_api_url,
            completion_timeout: Duration::from_secs(timeout_secs),
        })
    }
}

// Secrets stay out of logs
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("telegram_token", &"<redacted>")
            .field("completion_api_key", &"<redacted>")
            .field("channel_id", &self.channel_id)
            .field("database_url", &self.database_url)
            .field("completion_model", &self.completion_model)
            .field("completion_api_url", &self.completion_api_url)
            .field("completion_timeout", &self.completion_timeout)
            .finish()
    }
}

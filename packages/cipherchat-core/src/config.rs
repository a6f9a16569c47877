//! Runtime configuration for the messaging core.

use serde::{Deserialize, Serialize};

use crate::crypto::PBKDF2_ITERATIONS;
use crate::error::{Error, Result};

/// Maximum text message size (64KB)
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 64 * 1024;

/// Maximum file attachment size (10MB)
pub const DEFAULT_MAX_FILE_SIZE: usize = 10 * 1024 * 1024;

/// Configuration for the messaging core
///
/// Every field has a default, so a partial JSON document is enough:
///
/// ```
/// use cipherchat_core::CoreConfig;
///
/// let config = CoreConfig::from_json_str(r#"{ "api_base_url": "https://chat.example/api/" }"#).unwrap();
/// assert_eq!(config.pbkdf2_iterations, 100_000);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// Base URL of the backend REST API
    pub api_base_url: String,
    /// PBKDF2-SHA256 iterations used to wrap the account private key
    pub pbkdf2_iterations: u32,
    /// Timeout for each backend request, in seconds
    pub request_timeout_secs: u64,
    /// Largest plaintext accepted for a text message
    pub max_message_size: usize,
    /// Largest plaintext accepted for a file attachment
    pub max_file_size: usize,
    /// Derived session keys to keep per login; 0 re-derives on every call
    pub key_cache_capacity: usize,
    /// How many recent push deliveries to remember for de-duplication
    pub push_dedup_window: usize,
    /// Log per-message transport details (IDs and sizes, never content)
    pub verbose_logging: bool,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:8000/".to_string(),
            pbkdf2_iterations: PBKDF2_ITERATIONS,
            request_timeout_secs: 30,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            key_cache_capacity: 0,
            push_dedup_window: 1024,
            verbose_logging: false,
        }
    }
}

impl CoreConfig {
    /// Parse a JSON configuration document and validate it
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| Error::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the core cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.pbkdf2_iterations == 0 {
            return Err(Error::InvalidConfig("pbkdf2_iterations must be at least 1".into()));
        }
        if self.request_timeout_secs == 0 {
            return Err(Error::InvalidConfig("request_timeout_secs must be at least 1".into()));
        }
        if self.max_message_size == 0 || self.max_file_size == 0 {
            return Err(Error::InvalidConfig("size limits must be non-zero".into()));
        }
        let url = &self.api_base_url;
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(Error::InvalidConfig(format!(
                "api_base_url must be an http(s) URL, got {}",
                self.api_base_url
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = CoreConfig::default();
        config.validate().unwrap();
        assert_eq!(config.pbkdf2_iterations, 100_000);
        assert_eq!(config.key_cache_capacity, 0);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = CoreConfig::from_json_str(r#"{ "key_cache_capacity": 64 }"#).unwrap();
        assert_eq!(config.key_cache_capacity, 64);
        assert_eq!(config.max_message_size, DEFAULT_MAX_MESSAGE_SIZE);
    }

    #[test]
    fn test_zero_iterations_rejected() {
        let result = CoreConfig::from_json_str(r#"{ "pbkdf2_iterations": 0 }"#);
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_non_http_base_url_rejected() {
        let result = CoreConfig::from_json_str(r#"{ "api_base_url": "ftp://example" }"#);
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }
}

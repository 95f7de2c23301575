use crate::error::{GenerationError, Result};
use std::env;
use std::time::Duration;

pub const DEFAULT_API_BASE: &str = "https://api.apicore.ai/v1/chat/completions";
pub const DEFAULT_IMAGE_MODEL: &str = "gemini-2.5-flash-image";
pub const DEFAULT_TEXT_MODEL: &str = "gemini-2.5-flash";

#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        RetryConfig {
            max_attempts: 3,
            initial_delay: Duration::from_millis(1000),
        }
    }
}

impl RetryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_env() -> Self {
        let defaults = Self::default();
        let max_attempts = env::var("DECADEGEN_MAX_ATTEMPTS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.max_attempts);
        let initial_delay = env::var("DECADEGEN_INITIAL_DELAY_MS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_millis)
            .unwrap_or(defaults.initial_delay);

        RetryConfig {
            max_attempts,
            initial_delay,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_initial_delay(mut self, initial_delay: Duration) -> Self {
        self.initial_delay = initial_delay;
        self
    }
}

#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    pub api_base: String,
    pub api_key: Option<String>,
    pub image_model: String,
    pub text_model: String,
    pub request_timeout: Option<Duration>,
    pub retry: RetryConfig,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        GeneratorConfig {
            api_base: DEFAULT_API_BASE.to_string(),
            api_key: None,
            image_model: DEFAULT_IMAGE_MODEL.to_string(),
            text_model: DEFAULT_TEXT_MODEL.to_string(),
            request_timeout: Some(Duration::from_secs(120)),
            retry: RetryConfig::default(),
        }
    }
}

impl GeneratorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_env() -> Self {
        let defaults = Self::default();
        let api_base = env::var("DECADEGEN_API_BASE").unwrap_or(defaults.api_base);
        let api_key = env::var("DECADEGEN_API_KEY").ok();
        let image_model = env::var("DECADEGEN_IMAGE_MODEL").unwrap_or(defaults.image_model);
        let text_model = env::var("DECADEGEN_TEXT_MODEL").unwrap_or(defaults.text_model);
        let request_timeout = env::var("DECADEGEN_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .or(defaults.request_timeout);

        GeneratorConfig {
            api_base,
            api_key,
            image_model,
            text_model,
            request_timeout,
            retry: RetryConfig::from_env(),
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    pub fn with_image_model(mut self, model: impl Into<String>) -> Self {
        self.image_model = model.into();
        self
    }

    pub fn with_text_model(mut self, model: impl Into<String>) -> Self {
        self.text_model = model.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.api_base.trim().is_empty() {
            return Err(GenerationError::ConfigError("API base URL is empty".into()));
        }
        match self.api_key.as_deref().map(str::trim) {
            Some(key) if !key.is_empty() => {}
            _ => {
                return Err(GenerationError::ConfigError(
                    "API key is required (set DECADEGEN_API_KEY)".into(),
                ))
            }
        }
        if self.image_model.trim().is_empty() {
            return Err(GenerationError::ConfigError("Image model is empty".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_defaults() {
        let retry = RetryConfig::default();
        assert_eq!(retry.max_attempts, 3);
        assert_eq!(retry.initial_delay, Duration::from_millis(1000));
    }

    #[test]
    fn test_builder() {
        let config = GeneratorConfig::new()
            .with_api_key("sk-test")
            .with_api_base("http://localhost:9000/v1/chat/completions")
            .with_image_model("custom-image")
            .with_retry(RetryConfig::new().with_max_attempts(5));

        assert_eq!(config.api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.image_model, "custom-image");
        assert_eq!(config.text_model, DEFAULT_TEXT_MODEL);
        assert_eq!(config.retry.max_attempts, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_requires_api_key() {
        let config = GeneratorConfig::new();
        assert!(matches!(
            config.validate(),
            Err(GenerationError::ConfigError(_))
        ));

        let blank = GeneratorConfig::new().with_api_key("   ");
        assert!(blank.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_empty_base() {
        let config = GeneratorConfig::new().with_api_key("k").with_api_base("");
        assert!(config.validate().is_err());
    }
}

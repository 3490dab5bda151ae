//! OpenRouter analysis capability.
//!
//! This module provides the [`OpenRouterCapability`] which implements the
//! [`AnalysisCapability`] trait for the OpenRouter chat completions API
//! (<https://openrouter.ai/>), giving access to many hosted models through
//! one endpoint.

use super::AnalysisCapability;
use anyhow::{Result, anyhow};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default OpenRouter API endpoint.
const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1/chat/completions";

/// Default model to use for analysis.
const DEFAULT_MODEL: &str = "deepseek/deepseek-chat";

/// Default timeout for API requests in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Default temperature for model responses.
const DEFAULT_TEMPERATURE: f32 = 0.2;

/// Default max tokens for responses.
const DEFAULT_MAX_TOKENS: u32 = 2048;

#[derive(Debug, Serialize)]
struct OpenRouterRequest {
    model: String,
    messages: Vec<Message>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize, Deserialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct OpenRouterResponse {
    choices: Option<Vec<Choice>>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Option<Message>,
}

/// Configuration for the OpenRouter capability.
#[derive(Debug, Clone)]
pub struct OpenRouterConfig {
    /// The model to use (e.g., "deepseek/deepseek-chat", "openai/gpt-4o").
    pub model: String,
    /// Temperature for response generation.
    pub temperature: f32,
    /// Maximum tokens in the response.
    pub max_tokens: u32,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
    /// Base URL for the API.
    pub base_url: String,
}

impl Default for OpenRouterConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }
}

impl OpenRouterConfig {
    /// Create a new configuration builder.
    pub fn builder() -> OpenRouterConfigBuilder {
        OpenRouterConfigBuilder::default()
    }
}

/// Builder for [`OpenRouterConfig`].
#[derive(Default)]
pub struct OpenRouterConfigBuilder {
    model: Option<String>,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
    timeout_secs: Option<u64>,
    base_url: Option<String>,
}

impl OpenRouterConfigBuilder {
    /// Set the model to use.
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Set the temperature.
    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Set the maximum tokens.
    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Set the request timeout in seconds.
    pub fn timeout_secs(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = Some(timeout_secs);
        self
    }

    /// Set a custom base URL.
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Build the configuration.
    pub fn build(self) -> OpenRouterConfig {
        OpenRouterConfig {
            model: self.model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            temperature: self.temperature.unwrap_or(DEFAULT_TEMPERATURE),
            max_tokens: self.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            timeout_secs: self.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS),
            base_url: self.base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        }
    }
}

/// OpenRouter analysis capability.
///
/// # Example
///
/// ```rust,ignore
/// use autodata::ai::{OpenRouterCapability, OpenRouterConfig};
///
/// let config = OpenRouterConfig::builder()
///     .model("openai/gpt-4o-mini")
///     .build();
/// let capability = OpenRouterCapability::with_config("your-api-key", config)?;
/// ```
pub struct OpenRouterCapability {
    api_key: String,
    config: OpenRouterConfig,
    client: Client,
}

impl OpenRouterCapability {
    /// Create a new OpenRouter capability with default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        Self::with_config(api_key, OpenRouterConfig::default())
    }

    /// Create a new OpenRouter capability with custom configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn with_config(api_key: impl Into<String>, config: OpenRouterConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| anyhow!("Failed to build HTTP client: {}", e))?;

        Ok(Self {
            api_key: api_key.into(),
            config,
            client,
        })
    }

    fn call_api(&self, prompt: &str) -> Result<String> {
        let request = OpenRouterRequest {
            model: self.config.model.clone(),
            messages: vec![Message {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        };

        let response = self
            .client
            .post(&self.config.base_url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .header("X-Title", "autodata")
            .json(&request)
            .send()?;

        if !response.status().is_success() {
            return Err(anyhow!(
                "OpenRouter API Error {}: {}",
                response.status(),
                response.text()?
            ));
        }

        let result: OpenRouterResponse = response.json()?;
        extract_text(result)
    }
}

/// Content of the first choice's message; blank content is an error.
fn extract_text(result: OpenRouterResponse) -> Result<String> {
    let text = result
        .choices
        .and_then(|choices| choices.into_iter().next())
        .and_then(|choice| choice.message)
        .map(|msg| msg.content)
        .ok_or_else(|| anyhow!("No response content from OpenRouter API"))?;

    if text.trim().is_empty() {
        return Err(anyhow!("OpenRouter returned an empty message"));
    }
    Ok(text)
}

impl AnalysisCapability for OpenRouterCapability {
    fn run(&self, prompt: &str) -> Result<String> {
        self.call_api(prompt)
    }

    fn name(&self) -> &str {
        "OpenRouter"
    }

    fn model(&self) -> Option<&str> {
        Some(&self.config.model)
    }
}

// ============================================================================
// Tests
// ============================================================================

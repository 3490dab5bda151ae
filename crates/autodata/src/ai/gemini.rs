//! Google Gemini analysis capability.
//!
//! This module provides the [`GeminiCapability`] which implements the
//! [`AnalysisCapability`] trait for Google's Gemini `generateContent` API
//! (<https://ai.google.dev/>).

use std::time::Duration;

use super::AnalysisCapability;
use anyhow::{Result, anyhow};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};

/// Default Gemini API endpoint.
const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models/";

/// Default model to use for analysis.
const DEFAULT_MODEL: &str = "gemini-1.5-flash";

/// Default timeout for API requests in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Default temperature for model responses.
const DEFAULT_TEMPERATURE: f32 = 0.2;

/// Default max tokens for responses. Batch reports have five sections.
const DEFAULT_MAX_TOKENS: u32 = 2048;

// Gemini API request structures
#[derive(Serialize)]
struct GeminiRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Serialize, Deserialize)]
struct Content {
    role: String,
    parts: Vec<Part>,
}

#[derive(Serialize, Deserialize)]
struct Part {
    text: String,
}

#[derive(Serialize)]
struct GenerationConfig {
    temperature: f32,
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: u32,
}

// Gemini API response structures
#[derive(Deserialize)]
struct GeminiResponse {
    candidates: Option<Vec<Candidate>>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
    #[serde(rename = "finishReason")]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct CandidateContent {
    parts: Option<Vec<Part>>,
}

/// Configuration for the Gemini capability.
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    /// The model to use (e.g., "gemini-1.5-flash", "gemini-2.0-flash").
    pub model: String,
    /// Temperature for response generation (0.0 - 2.0).
    pub temperature: f32,
    /// Maximum tokens in the response.
    pub max_tokens: u32,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
    /// Base URL for the API (useful for proxies or custom endpoints).
    pub base_url: String,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_owned(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            base_url: DEFAULT_BASE_URL.to_owned(),
        }
    }
}

impl GeminiConfig {
    /// Create a new configuration builder.
    pub fn builder() -> GeminiConfigBuilder {
        GeminiConfigBuilder::default()
    }
}

/// Builder for [`GeminiConfig`].
#[derive(Default)]
pub struct GeminiConfigBuilder {
    model: Option<String>,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
    timeout_secs: Option<u64>,
    base_url: Option<String>,
}

impl GeminiConfigBuilder {
    /// Set the model to use.
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Set the temperature (0.0 - 2.0).
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
    pub fn build(self) -> GeminiConfig {
        GeminiConfig {
            model: self.model.unwrap_or_else(|| DEFAULT_MODEL.to_owned()),
            temperature: self.temperature.unwrap_or(DEFAULT_TEMPERATURE),
            max_tokens: self.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            timeout_secs: self.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS),
            base_url: self.base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_owned()),
        }
    }
}

/// Google Gemini analysis capability.
///
/// # Example
///
/// ```rust,ignore
/// use autodata::ai::{GeminiCapability, GeminiConfig};
///
/// // Simple usage with defaults
/// let capability = GeminiCapability::new("your-api-key")?;
///
/// // With custom configuration
/// let config = GeminiConfig::builder()
///     .model("gemini-2.0-flash")
///     .timeout_secs(30)
///     .build();
/// let capability = GeminiCapability::with_config("your-api-key", config)?;
/// ```
pub struct GeminiCapability {
    api_key: String,
    config: GeminiConfig,
    client: Client,
}

impl GeminiCapability {
    /// Create a new Gemini capability with default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        Self::with_config(api_key, GeminiConfig::default())
    }

    /// Create a new Gemini capability with custom configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn with_config(api_key: impl Into<String>, config: GeminiConfig) -> Result<Self> {
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
        let request = GeminiRequest {
            contents: vec![Content {
                role: "user".to_owned(),
                parts: vec![Part {
                    text: prompt.to_owned(),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: self.config.temperature,
                max_output_tokens: self.config.max_tokens,
            },
        };

        // {base_url}{model}:generateContent?key={api_key}
        let url = format!(
            "{}{}:generateContent?key={}",
            self.config.base_url, self.config.model, self.api_key
        );

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(&request)
            .send()?;

        if !response.status().is_success() {
            return Err(anyhow!(
                "Gemini API error {}: {}",
                response.status(),
                response.text()?
            ));
        }

        let result: GeminiResponse = response.json()?;
        extract_text(result)
    }
}

/// Concatenate the first candidate's text parts.
///
/// Fails when there is no candidate, the candidate was blocked, or the text
/// is blank.
fn extract_text(result: GeminiResponse) -> Result<String> {
    let candidate = result
        .candidates
        .and_then(|candidates| candidates.into_iter().next())
        .ok_or_else(|| anyhow!("No candidates in Gemini response"))?;

    if let Some(reason) = &candidate.finish_reason
        && (reason == "SAFETY" || reason == "BLOCKED")
    {
        return Err(anyhow!("Gemini response blocked ({})", reason));
    }

    let text: String = candidate
        .content
        .and_then(|content| content.parts)
        .unwrap_or_default()
        .into_iter()
        .map(|p| p.text)
        .collect();

    if text.trim().is_empty() {
        return Err(anyhow!("No response content from Gemini API"));
    }
    Ok(text)
}

impl AnalysisCapability for GeminiCapability {
    fn run(&self, prompt: &str) -> Result<String> {
        self.call_api(prompt)
    }

    fn name(&self) -> &str {
        "Gemini"
    }

    fn model(&self) -> Option<&str> {
        Some(&self.config.model)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> GeminiResponse {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_extract_text_joins_parts() {
        let response = parse(
            r#"{
                "candidates": [{
                    "content": {"parts": [{"text": "1. Quality: "}, {"text": "good"}]},
                    "finishReason": "STOP"
                }]
            }"#,
        );
        assert_eq!(extract_text(response).unwrap(), "1. Quality: good");
    }

    #[test]
    fn test_extract_text_empty_candidates() {
        assert!(extract_text(parse(r#"{"candidates": []}"#)).is_err());
        assert!(extract_text(parse(r#"{"candidates": null}"#)).is_err());
    }

    #[test]
    fn test_extract_text_missing_content() {
        let response = parse(r#"{"candidates": [{"content": null, "finishReason": "STOP"}]}"#);
        assert!(extract_text(response).is_err());
    }

    #[test]
    fn test_extract_text_blank_is_error() {
        let response = parse(r#"{"candidates": [{"content": {"parts": [{"text": "  \n"}]}}]}"#);
        assert!(extract_text(response).is_err());
    }

    #[test]
    fn test_extract_text_safety_blocked() {
        let response = parse(
            r#"{"candidates": [{"content": {"parts": [{"text": "x"}]}, "finishReason": "SAFETY"}]}"#,
        );
        let err = extract_text(response).unwrap_err();
        assert!(err.to_string().contains("SAFETY"));
    }

    #[test]
    fn test_request_serialization() {
        let request = GeminiRequest {
            contents: vec![Content {
                role: "user".to_owned(),
                parts: vec![Part {
                    text: "hello".to_owned(),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: 0.2,
                max_output_tokens: 10,
            },
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["contents"][0]["parts"][0]["text"], "hello");
        assert_eq!(json["generationConfig"]["maxOutputTokens"], 10);
    }

    #[test]
    fn test_config_builder() {
        let config = GeminiConfig::builder()
            .model("gemini-2.0-flash")
            .timeout_secs(5)
            .build();
        assert_eq!(config.model, "gemini-2.0-flash");
        assert_eq!(config.timeout_secs, 5);
        assert_eq!(config.max_tokens, DEFAULT_MAX_TOKENS);
    }

    #[test]
    fn test_capability_identity() {
        let capability = GeminiCapability::new("test-key").unwrap();
        assert_eq!(capability.name(), "Gemini");
        assert_eq!(capability.model(), Some(DEFAULT_MODEL));
    }
}

//! AI module: the analysis capability boundary.
//!
//! The orchestrator talks to language models only through the
//! [`AnalysisCapability`] trait, a one-shot `prompt -> text` call that may
//! fail. Concrete implementations:
//!
//! - [`GeminiCapability`] - Google Gemini API (requires `ai` feature)
//! - [`OpenRouterCapability`] - OpenRouter API (requires `ai` feature)
//! - [`MockCapability`] - scripted responses for tests and offline runs
//!
//! # Feature Flag
//!
//! The HTTP-backed capabilities need the `ai` feature (on by default).
//! The trait and the mock are always available.
//!
//! ```toml
//! # Disable HTTP capabilities for a smaller binary
//! autodata = { version = "0.1", default-features = false }
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use autodata::ai::{AnalysisCapability, GeminiCapability};
//! use autodata::Pipeline;
//! use std::sync::Arc;
//!
//! let capability = Arc::new(GeminiCapability::new("your-api-key")?);
//!
//! let result = Pipeline::builder()
//!     .capability(capability)
//!     .build()?
//!     .process(table)?;
//! ```

mod mock;
mod provider;
pub use mock::MockCapability;
pub use provider::AnalysisCapability;

#[cfg(feature = "ai")]
mod gemini;
#[cfg(feature = "ai")]
mod openrouter;

#[cfg(feature = "ai")]
pub use gemini::{GeminiCapability, GeminiConfig, GeminiConfigBuilder};

#[cfg(feature = "ai")]
pub use openrouter::{OpenRouterCapability, OpenRouterConfig, OpenRouterConfigBuilder};

//! Analysis capability trait for abstracting LLM interactions.
//!
//! This module defines the [`AnalysisCapability`] trait: a one-shot
//! text-in/text-out service that may fail. The orchestrator only depends on
//! this contract, so any backend (Gemini, OpenRouter, a local model, a test
//! double) can be plugged in without touching the batching logic.
//!
//! # Implementing a New Capability
//!
//! 1. Create a new file in `src/ai/` (e.g., `ollama.rs`)
//! 2. Implement the [`AnalysisCapability`] trait for your struct
//! 3. Export it in `src/ai/mod.rs`
//!
//! # Example
//!
//! ```rust,ignore
//! use autodata::ai::{AnalysisCapability, GeminiCapability};
//! use std::sync::Arc;
//!
//! let capability: Arc<dyn AnalysisCapability> = Arc::new(GeminiCapability::new("your-api-key")?);
//! let text = capability.run("Summarize: ...")?;
//! ```

use anyhow::Result;

/// One-shot text inference service.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`: the orchestrator shares one
/// capability across worker threads as `Arc<dyn AnalysisCapability>`.
///
/// # Error Handling
///
/// Return an error for network/service failures and for responses without
/// usable text. The orchestrator records the error on the affected batch and
/// carries on with the rest.
pub trait AnalysisCapability: Send + Sync {
    /// Run the prompt and return the generated text.
    fn run(&self, prompt: &str) -> Result<String>;

    /// Get the capability name for logging and debugging.
    fn name(&self) -> &str;

    /// Get the model being used by this capability.
    ///
    /// Returns `None` if the capability doesn't expose model information.
    fn model(&self) -> Option<&str> {
        None
    }
}

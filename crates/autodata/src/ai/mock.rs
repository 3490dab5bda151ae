//! Scripted analysis capability for tests and offline runs.

use std::collections::HashSet;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use super::AnalysisCapability;
use anyhow::{Result, anyhow};

const DEFAULT_RESPONSE: &str = "Mock analysis: no issues detected.";

/// Capability that answers from a script instead of a remote model.
///
/// Responses cycle through the configured list. Failures can be injected by
/// 1-based call number or by prompt content; the latter is stable when
/// batches run concurrently and call order is not.
///
/// ```rust,ignore
/// let mock = MockCapability::new()
///     .with_response("looks fine")
///     .fail_on_call(2);
/// ```
#[derive(Debug, Default)]
pub struct MockCapability {
    responses: Vec<String>,
    fail_calls: HashSet<usize>,
    fail_patterns: Vec<String>,
    delays: Vec<(String, Duration)>,
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl MockCapability {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a scripted response.
    pub fn with_response(mut self, response: impl Into<String>) -> Self {
        self.responses.push(response.into());
        self
    }

    /// Fail the `n`th call (1-based).
    pub fn fail_on_call(mut self, n: usize) -> Self {
        self.fail_calls.insert(n);
        self
    }

    /// Fail any call whose prompt contains `pattern`.
    pub fn fail_when_contains(mut self, pattern: impl Into<String>) -> Self {
        self.fail_patterns.push(pattern.into());
        self
    }

    /// Sleep before answering prompts containing `pattern`.
    pub fn delay_when_contains(mut self, pattern: impl Into<String>, delay: Duration) -> Self {
        self.delays.push((pattern.into(), delay));
        self
    }

    /// Number of `run` invocations so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Prompts received, in arrival order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl AnalysisCapability for MockCapability {
    fn run(&self, prompt: &str) -> Result<String> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.prompts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(prompt.to_owned());

        if let Some((_, delay)) = self.delays.iter().find(|(p, _)| prompt.contains(p.as_str())) {
            std::thread::sleep(*delay);
        }

        if self.fail_calls.contains(&call) {
            return Err(anyhow!("Injected failure on call {}", call));
        }
        if let Some(pattern) = self.fail_patterns.iter().find(|p| prompt.contains(p.as_str())) {
            return Err(anyhow!("Injected failure for prompt containing '{}'", pattern));
        }

        if self.responses.is_empty() {
            return Ok(DEFAULT_RESPONSE.to_owned());
        }
        Ok(self.responses[(call - 1) % self.responses.len()].clone())
    }

    fn name(&self) -> &str {
        "Mock"
    }
}

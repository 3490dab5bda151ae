//! AI-assisted analysis of a table.
//!
//! [`BatchAnalysisOrchestrator`] splits the table into contiguous row batches
//! and sends each one through an [`AnalysisCapability`](crate::ai::AnalysisCapability).
//! [`PromptFormatter`] owns the textual format of those requests.

mod orchestrator;
mod prompt;

pub use orchestrator::{BatchAnalysisOrchestrator, BatchAnalysisOrchestratorBuilder};
pub use prompt::{DEFAULT_COLUMN_SAMPLE, DEFAULT_REPORT_SAMPLE_ROWS, PromptFormatter};

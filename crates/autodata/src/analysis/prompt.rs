//! Prompt construction for batch, column and report analysis.
//!
//! Formats are fixed for the lifetime of a formatter so that results from
//! different batches of one run are comparable.

use crate::error::Result;
use crate::table::{Record, TableStats};

/// Non-null values shown to the capability per column.
pub const DEFAULT_COLUMN_SAMPLE: usize = 10;

/// Leading rows included in the data quality report prompt.
pub const DEFAULT_REPORT_SAMPLE_ROWS: usize = 3;

/// Builds the textual prompts sent to an [`AnalysisCapability`](crate::ai::AnalysisCapability).
#[derive(Debug, Clone)]
pub struct PromptFormatter {
    column_sample: usize,
    report_sample_rows: usize,
}

impl Default for PromptFormatter {
    fn default() -> Self {
        Self {
            column_sample: DEFAULT_COLUMN_SAMPLE,
            report_sample_rows: DEFAULT_REPORT_SAMPLE_ROWS,
        }
    }
}

impl PromptFormatter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override how many non-null values a column prompt shows.
    pub fn with_column_sample(mut self, n: usize) -> Self {
        self.column_sample = n;
        self
    }

    /// Override how many leading rows the report prompt shows.
    pub fn with_report_sample_rows(mut self, n: usize) -> Self {
        self.report_sample_rows = n;
        self
    }

    pub fn column_sample(&self) -> usize {
        self.column_sample
    }

    pub fn report_sample_rows(&self) -> usize {
        self.report_sample_rows
    }

    /// Prompt for one batch. `first_row` is the table position of `rows[0]`.
    pub fn batch_prompt(&self, first_row: usize, rows: &[Record]) -> Result<String> {
        let mut prompt = String::from("You are an AI Data Cleaning Agent. Analyze the dataset:\n");

        for (offset, record) in rows.iter().enumerate() {
            let fields = serde_json::to_string(record)?;
            prompt.push_str(&format!("Row {}: {}\n", first_row + offset, fields));
        }

        prompt.push_str(
            "\nPlease provide:\n\
            1. Data quality assessment\n\
            2. Missing value analysis\n\
            3. Outlier detection\n\
            4. Recommended cleaning steps\n\
            5. Data type corrections needed\n\n\
            Format your response as structured text with clear sections.",
        );
        Ok(prompt)
    }

    /// Prompt asking for cleaning recommendations for a single column.
    pub fn column_prompt(&self, column: &str, samples: &[String]) -> String {
        format!(
            "Analyze this column data and suggest cleaning operations:\n\
            Column: {}\n\
            Sample values: {:?}\n\n\
            Provide specific cleaning recommendations:\n\
            1. Data type conversion needed\n\
            2. Pattern standardization\n\
            3. Invalid value handling\n\
            4. Missing value strategy",
            column, samples
        )
    }

    /// Prompt for the whole-table data quality report.
    pub fn report_prompt(&self, stats: &TableStats) -> Result<String> {
        let column_types: Vec<String> = stats
            .column_types
            .iter()
            .map(|(name, dtype)| format!("{}: {}", name, dtype))
            .collect();
        let column_names: Vec<&str> = stats.column_types.iter().map(|(n, _)| n.as_str()).collect();
        let sample = serde_json::to_string_pretty(&stats.sample)?;

        Ok(format!(
            "Generate a comprehensive data quality report:\n\n\
            Dataset Statistics:\n\
            - Total rows: {}\n\
            - Total columns: {}\n\
            - Missing values: {}\n\
            - Duplicate rows: {}\n\
            - Column types: {}\n\n\
            Column Names: {}\n\n\
            Sample Data (first {} rows):\n{}\n\n\
            Provide:\n\
            1. Executive Summary\n\
            2. Data Quality Score (1-10)\n\
            3. Critical Issues Found\n\
            4. Recommended Actions\n\
            5. Priority Cleaning Steps",
            stats.total_rows,
            stats.total_columns,
            stats.missing_cells,
            stats.duplicate_rows,
            column_types.join(", "),
            column_names.join(", "),
            stats.sample.len(),
            sample
        ))
    }
}

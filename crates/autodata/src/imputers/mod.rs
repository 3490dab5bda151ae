//! Imputation module for handling missing values.
//!
//! This module provides the statistical strategies (mean, median, mode)
//! and the positional ones (forward fill, backward fill).

mod statistical;

pub use statistical::StatisticalImputer;

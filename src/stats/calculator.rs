//! Statistics Calculator Module
//! Descriptive statistics over numeric columns.

use crate::stats::aggregator::AggregateError;
use polars::prelude::*;
use serde::Serialize;
use statrs::statistics::Statistics;

/// Descriptive statistics for one numeric column.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NumericSummary {
    pub column: String,
    pub count: usize,
    pub missing: usize,
    pub sum: f64,
    pub mean: f64,
    pub median: f64,
    pub std: f64,
    pub min: f64,
    pub max: f64,
    pub p05: f64,
    pub p95: f64,
}

impl NumericSummary {
    fn empty(column: &str, missing: usize) -> Self {
        Self {
            column: column.to_string(),
            count: 0,
            missing,
            sum: 0.0,
            mean: f64::NAN,
            median: f64::NAN,
            std: f64::NAN,
            min: f64::NAN,
            max: f64::NAN,
            p05: f64::NAN,
            p95: f64::NAN,
        }
    }
}

/// Handles statistical calculations.
pub struct StatsCalculator;

impl StatsCalculator {
    /// Summarize the non-missing values of a numeric column.
    pub fn describe(df: &DataFrame, column: &str) -> Result<NumericSummary, AggregateError> {
        let source = df
            .column(column)
            .map_err(|_| AggregateError::ColumnNotFound(column.to_string()))?;
        if matches!(source.dtype(), DataType::String | DataType::Boolean) {
            return Err(AggregateError::NotNumeric(column.to_string()));
        }

        let floats = source.cast(&DataType::Float64)?;
        let values: Vec<f64> = floats
            .f64()?
            .into_iter()
            .flatten()
            .filter(|v| !v.is_nan())
            .collect();
        let missing = df.height() - values.len();

        Ok(Self::compute_descriptive_stats(column, &values, missing))
    }

    /// Compute descriptive statistics for an array of values.
    pub fn compute_descriptive_stats(column: &str, values: &[f64], missing: usize) -> NumericSummary {
        let n = values.len();
        if n == 0 {
            return NumericSummary::empty(column, missing);
        }

        let mut sorted = values.to_vec();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        let median = if n % 2 == 0 {
            (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
        } else {
            sorted[n / 2]
        };

        let std = if n > 1 { values.iter().std_dev() } else { 0.0 };

        NumericSummary {
            column: column.to_string(),
            count: n,
            missing,
            sum: values.iter().sum(),
            mean: values.iter().mean(),
            median,
            std,
            min: sorted[0],
            max: sorted[n - 1],
            p05: Self::percentile(&sorted, 5.0),
            p95: Self::percentile(&sorted, 95.0),
        }
    }

    /// Calculate percentile using linear interpolation (NumPy compatible).
    fn percentile(sorted_values: &[f64], p: f64) -> f64 {
        let n = sorted_values.len();
        if n == 0 {
            return f64::NAN;
        }
        if n == 1 {
            return sorted_values[0];
        }

        let rank = (p / 100.0) * (n - 1) as f64;
        let lower = rank.floor() as usize;
        let upper = (rank.ceil() as usize).min(n - 1);
        let frac = rank - lower as f64;

        if lower == upper {
            sorted_values[lower]
        } else {
            sorted_values[lower] * (1.0 - frac) + sorted_values[upper] * frac
        }
    }
}

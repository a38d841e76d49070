//! Summarizer Module
//! Single-value facts for narrative display.

use crate::stats::aggregator::Aggregator;
use polars::prelude::*;
use serde::Serialize;

/// Sentinel shown when a column has nothing to summarize.
pub const NO_DATA: &str = "No data";

/// Most frequent value of a column and how often it occurs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModeSummary {
    pub value: String,
    pub count: usize,
}

impl ModeSummary {
    pub fn no_data() -> Self {
        Self {
            value: NO_DATA.to_string(),
            count: 0,
        }
    }

    pub fn is_no_data(&self) -> bool {
        self.count == 0
    }
}

pub struct Summarizer;

impl Summarizer {
    /// Most frequent non-missing value of `column`.
    ///
    /// Ties go to the value that appears first in row order. An absent or
    /// fully missing column yields [`ModeSummary::no_data`].
    pub fn most_common(df: &DataFrame, column: &str) -> ModeSummary {
        let Ok(counts) = Aggregator::count_by(df, &[column]) else {
            return ModeSummary::no_data();
        };

        counts
            .rows
            .iter()
            .filter_map(|row| Some((row.key.first()?.as_deref()?, row.value)))
            .fold(None::<(&str, f64)>, |best, candidate| match best {
                Some(best) if best.1 >= candidate.1 => Some(best),
                _ => Some(candidate),
            })
            .map(|(value, count)| ModeSummary {
                value: value.to_string(),
                count: count as usize,
            })
            .unwrap_or_else(ModeSummary::no_data)
    }

    /// Number of missing cells in `column`, or `None` if it is absent.
    pub fn missing_count(df: &DataFrame, column: &str) -> Option<usize> {
        df.column(column).ok().map(|c| c.null_count())
    }
}

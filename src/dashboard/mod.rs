//! Dashboard module - Page view models built from the preparation pipeline
//!
//! Each page is a pure function of (source table, config, selection); the
//! `*Dashboard` wrappers add the table cache and view memo.

mod accidents;
mod contracts;

pub use accidents::{AccidentsConfig, AccidentsDashboard, AccidentsView};
pub use contracts::{ContractsConfig, ContractsDashboard, ContractsView};

use crate::data::{column_names, CoercionReport, LoaderError, NormalizeError, ProcessorError};
use crate::stats::{AggregateError, GroupedTable};
use polars::prelude::*;
use serde::Serialize;
use thiserror::Error;

/// Label used for a missing group key.
pub const MISSING_LABEL: &str = "(missing)";

#[derive(Error, Debug)]
pub enum PageError {
    #[error(transparent)]
    Loader(#[from] LoaderError),
    #[error(transparent)]
    Normalize(#[from] NormalizeError),
    #[error(transparent)]
    Processor(#[from] ProcessorError),
    #[error(transparent)]
    Aggregate(#[from] AggregateError),
    #[error("Polars error: {0}")]
    PolarsError(#[from] PolarsError),
}

/// Non-fatal conditions surfaced next to a rendered page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PageWarning {
    /// The selection removed every row.
    EmptyResult { message: String },
    /// Some cells of a column could not be coerced and are shown as missing.
    CoercionFailures { column: String, count: usize },
}

impl PageWarning {
    pub fn empty_result() -> Self {
        PageWarning::EmptyResult {
            message: "No rows match the current selection".to_string(),
        }
    }

    fn from_reports(reports: &[CoercionReport]) -> Vec<Self> {
        reports
            .iter()
            .filter(|r| r.failures > 0)
            .map(|r| PageWarning::CoercionFailures {
                column: r.column.clone(),
                count: r.failures,
            })
            .collect()
    }
}

/// Bar / line chart payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartData {
    pub title: String,
    /// Grouping column(s), joined with " / ".
    pub label: String,
    pub labels: Vec<String>,
    pub values: Vec<f64>,
}

impl ChartData {
    pub fn from_grouped(title: &str, grouped: &GroupedTable) -> Self {
        let labels = grouped
            .rows
            .iter()
            .map(|row| {
                row.key
                    .iter()
                    .map(|k| k.as_deref().unwrap_or(MISSING_LABEL))
                    .collect::<Vec<_>>()
                    .join(" / ")
            })
            .collect();

        Self {
            title: title.to_string(),
            label: grouped.group_columns.join(" / "),
            labels,
            values: grouped.rows.iter().map(|r| r.value).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Shape, column list and leading rows of a table.
#[derive(Debug, Clone)]
pub struct TableOverview {
    pub rows: usize,
    pub columns: usize,
    pub column_names: Vec<String>,
    pub preview: DataFrame,
}

impl TableOverview {
    pub fn of(df: &DataFrame, preview_rows: usize) -> Self {
        Self {
            rows: df.height(),
            columns: df.width(),
            column_names: column_names(df),
            preview: df.head(Some(preview_rows)),
        }
    }
}

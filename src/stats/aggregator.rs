//! Aggregator Module
//! Grouped counts and sums, value counts and top-N rankings.

use crate::data::is_numeric;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AggregateError {
    #[error("Polars error: {0}")]
    PolarsError(#[from] PolarsError),
    #[error("Column not found: {0}")]
    ColumnNotFound(String),
    #[error("Column '{0}' is not numeric")]
    NotNumeric(String),
    #[error("At least one grouping column is required")]
    NoGroupColumns,
}

/// What is computed per group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AggregateKind {
    /// Number of rows.
    Count,
    /// Sum of a numeric column, skipping missing values.
    Sum { column: String },
}

impl AggregateKind {
    pub fn sum(column: impl Into<String>) -> Self {
        AggregateKind::Sum {
            column: column.into(),
        }
    }

    /// Name of the value column in the aggregate table.
    pub fn value_name(&self) -> &'static str {
        match self {
            AggregateKind::Count => "count",
            AggregateKind::Sum { .. } => "sum",
        }
    }
}

/// One group: its key (one entry per grouping column, `None` = missing) and value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupRow {
    pub key: Vec<Option<String>>,
    pub value: f64,
}

/// Aggregate result, one row per retained group.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupedTable {
    pub group_columns: Vec<String>,
    pub kind: AggregateKind,
    pub rows: Vec<GroupRow>,
}

impl GroupedTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Sum of all group values.
    pub fn total(&self) -> f64 {
        self.rows.iter().map(|r| r.value).sum()
    }

    /// Value of the group whose key is `key` (one entry per grouping column).
    pub fn value_of(&self, key: &[Option<&str>]) -> Option<f64> {
        self.rows
            .iter()
            .find(|row| {
                row.key.len() == key.len()
                    && row.key.iter().zip(key).all(|(a, b)| a.as_deref() == *b)
            })
            .map(|row| row.value)
    }

    /// Stable sort by value, largest first; NaN sorts last.
    pub fn sort_descending(&mut self) {
        self.rows.sort_by(|a, b| match (a.value.is_nan(), b.value.is_nan()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Greater,
            (false, true) => Ordering::Less,
            (false, false) => b.value.partial_cmp(&a.value).unwrap_or(Ordering::Equal),
        });
    }

    /// Sort by key text, missing keys first.
    pub fn sort_by_key(&mut self) {
        self.rows.sort_by(|a, b| a.key.cmp(&b.key));
    }

    pub fn truncate(&mut self, n: usize) {
        self.rows.truncate(n);
    }

    /// Key columns followed by the value column (`count` as UInt64, `sum` as Float64).
    pub fn to_dataframe(&self) -> PolarsResult<DataFrame> {
        let mut columns: Vec<Column> = self
            .group_columns
            .iter()
            .enumerate()
            .map(|(i, name)| {
                let keys: Vec<Option<String>> =
                    self.rows.iter().map(|row| row.key[i].clone()).collect();
                Column::new(name.as_str().into(), keys)
            })
            .collect();

        let value_name = self.kind.value_name();
        let values = match self.kind {
            AggregateKind::Count => Column::new(
                value_name.into(),
                self.rows.iter().map(|r| r.value as u64).collect::<Vec<u64>>(),
            ),
            AggregateKind::Sum { .. } => Column::new(
                value_name.into(),
                self.rows.iter().map(|r| r.value).collect::<Vec<f64>>(),
            ),
        };
        columns.push(values);

        DataFrame::new(columns)
    }
}

/// Groups rows and computes counts or sums.
///
/// Groups appear in the order their key is first seen, which also breaks
/// ties in descending sorts. Missing keys form their own group.
pub struct Aggregator;

impl Aggregator {
    pub fn aggregate<S: AsRef<str>>(
        df: &DataFrame,
        group_by: &[S],
        kind: &AggregateKind,
    ) -> Result<GroupedTable, AggregateError> {
        if group_by.is_empty() {
            return Err(AggregateError::NoGroupColumns);
        }

        let key_columns = group_by
            .iter()
            .map(|name| -> Result<Column, AggregateError> {
                let name = name.as_ref();
                let column = df
                    .column(name)
                    .map_err(|_| AggregateError::ColumnNotFound(name.to_string()))?;
                Ok(column.cast(&DataType::String)?)
            })
            .collect::<Result<Vec<_>, _>>()?;
        let key_values = key_columns
            .iter()
            .map(|column| Ok(column.str()?.into_iter().collect::<Vec<Option<&str>>>()))
            .collect::<PolarsResult<Vec<_>>>()?;

        let sum_values: Option<Vec<Option<f64>>> = match kind {
            AggregateKind::Count => None,
            AggregateKind::Sum { column } => {
                let source = df
                    .column(column)
                    .map_err(|_| AggregateError::ColumnNotFound(column.clone()))?;
                if !is_numeric(source.dtype()) {
                    return Err(AggregateError::NotNumeric(column.clone()));
                }
                let floats = source.cast(&DataType::Float64)?;
                let values = floats.f64()?.into_iter().collect();
                Some(values)
            }
        };

        let mut index: HashMap<Vec<Option<&str>>, usize> = HashMap::new();
        let mut rows: Vec<GroupRow> = Vec::new();

        for i in 0..df.height() {
            let key: Vec<Option<&str>> = key_values.iter().map(|column| column[i]).collect();
            let slot = match index.get(&key) {
                Some(&slot) => slot,
                None => {
                    rows.push(GroupRow {
                        key: key.iter().map(|k| k.map(str::to_string)).collect(),
                        value: 0.0,
                    });
                    index.insert(key, rows.len() - 1);
                    rows.len() - 1
                }
            };

            rows[slot].value += match &sum_values {
                None => 1.0,
                Some(values) => values[i].filter(|v| !v.is_nan()).unwrap_or(0.0),
            };
        }

        Ok(GroupedTable {
            group_columns: group_by.iter().map(|s| s.as_ref().to_string()).collect(),
            kind: kind.clone(),
            rows,
        })
    }

    pub fn count_by<S: AsRef<str>>(df: &DataFrame, group_by: &[S]) -> Result<GroupedTable, AggregateError> {
        Self::aggregate(df, group_by, &AggregateKind::Count)
    }

    pub fn sum_by<S: AsRef<str>>(
        df: &DataFrame,
        group_by: &[S],
        value_column: &str,
    ) -> Result<GroupedTable, AggregateError> {
        Self::aggregate(df, group_by, &AggregateKind::sum(value_column))
    }

    /// The `n` groups with the largest values, largest first.
    pub fn top_n<S: AsRef<str>>(
        df: &DataFrame,
        group_by: &[S],
        kind: &AggregateKind,
        n: usize,
    ) -> Result<GroupedTable, AggregateError> {
        let mut grouped = Self::aggregate(df, group_by, kind)?;
        grouped.sort_descending();
        grouped.truncate(n);
        Ok(grouped)
    }

    /// Row count per value of one column, most frequent first.
    pub fn value_counts(df: &DataFrame, column: &str) -> Result<GroupedTable, AggregateError> {
        let mut grouped = Self::count_by(df, &[column])?;
        grouped.sort_descending();
        Ok(grouped)
    }
}

//! Data Processor Module
//! Row filtering (null-dropping and allowed-value selections) and derived columns.

use chrono::{DateTime, Datelike};
use log::debug;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProcessorError {
    #[error("Polars error: {0}")]
    PolarsError(#[from] PolarsError),
    #[error("Column not found: {0}")]
    ColumnNotFound(String),
    #[error("Column '{0}' is not a timestamp column")]
    NotTemporal(String),
}

/// Column → allowed values, as chosen by the user.
///
/// A row passes when its value in every constrained column is one of the
/// allowed values. Values are compared in their text form; missing cells
/// never pass. A constraint with an empty set rejects every row.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FilterSelection {
    constraints: BTreeMap<String, BTreeSet<String>>,
}

impl FilterSelection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`FilterSelection::set`].
    pub fn allow<I, S>(mut self, column: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.set(column, values);
        self
    }

    /// Replace the allowed values of `column`.
    pub fn set<I, S>(&mut self, column: impl Into<String>, values: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.constraints
            .insert(column.into(), values.into_iter().map(Into::into).collect());
    }

    pub fn remove(&mut self, column: &str) {
        self.constraints.remove(column);
    }

    /// Selection allowing every observed value of each column.
    pub fn all_observed(df: &DataFrame, columns: &[&str]) -> Result<Self, ProcessorError> {
        let mut selection = Self::new();
        for column in columns {
            selection.set(*column, DataProcessor::observed_values(df, column)?);
        }
        Ok(selection)
    }

    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }

    pub fn allowed(&self, column: &str) -> Option<&BTreeSet<String>> {
        self.constraints.get(column)
    }

    pub fn constraints(&self) -> impl Iterator<Item = (&String, &BTreeSet<String>)> {
        self.constraints.iter()
    }

    /// Canonical key for memoization; equal selections give equal keys.
    pub fn cache_key(&self) -> String {
        serde_json::to_string(&self.constraints).unwrap_or_default()
    }
}

/// Drop-mode and keep-mode filtering applied together.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RowFilter {
    /// Rows missing a value in any of these columns are removed.
    pub required: Vec<String>,
    pub selection: FilterSelection,
}

/// Handles row filtering and column derivation.
pub struct DataProcessor;

impl DataProcessor {
    fn column<'a>(df: &'a DataFrame, name: &str) -> Result<&'a Column, ProcessorError> {
        df.column(name)
            .map_err(|_| ProcessorError::ColumnNotFound(name.to_string()))
    }

    /// Remove rows with a missing value in any of `required`.
    pub fn drop_missing<S: AsRef<str>>(
        df: &DataFrame,
        required: &[S],
    ) -> Result<DataFrame, ProcessorError> {
        let mut mask = BooleanChunked::full("mask".into(), true, df.height());
        for name in required {
            let present = Self::column(df, name.as_ref())?
                .as_materialized_series()
                .is_not_null();
            mask = &mask & &present;
        }

        let filtered = df.filter(&mask)?;
        debug!(
            "Dropped {} row(s) with missing key values",
            df.height() - filtered.height()
        );
        Ok(filtered)
    }

    /// Keep rows whose values satisfy every constraint of `selection`.
    pub fn keep_matching(
        df: &DataFrame,
        selection: &FilterSelection,
    ) -> Result<DataFrame, ProcessorError> {
        let mut keep = vec![true; df.height()];
        for (name, allowed) in selection.constraints() {
            let text = Self::column(df, name)?.cast(&DataType::String)?;
            for (flag, value) in keep.iter_mut().zip(text.str()?.into_iter()) {
                *flag = *flag && value.is_some_and(|v| allowed.contains(v));
            }
        }

        let mask: BooleanChunked = keep.into_iter().collect();
        Ok(df.filter(&mask)?)
    }

    /// Drop mode followed by keep mode.
    pub fn apply(df: &DataFrame, filter: &RowFilter) -> Result<DataFrame, ProcessorError> {
        let complete = Self::drop_missing(df, &filter.required)?;
        Self::keep_matching(&complete, &filter.selection)
    }

    /// Sorted distinct non-missing values of a column, in text form.
    pub fn observed_values(df: &DataFrame, column: &str) -> Result<Vec<String>, ProcessorError> {
        let text = Self::column(df, column)?.cast(&DataType::String)?;
        let values: BTreeSet<&str> = text.str()?.into_iter().flatten().collect();
        Ok(values.into_iter().map(str::to_string).collect())
    }

    /// Add (or replace) `target` with the calendar year of timestamp column `source`.
    pub fn with_year(df: &DataFrame, source: &str, target: &str) -> Result<DataFrame, ProcessorError> {
        let column = Self::column(df, source)?;
        if !matches!(column.dtype(), DataType::Datetime(_, _)) {
            return Err(ProcessorError::NotTemporal(source.to_string()));
        }

        let millis = column.cast(&DataType::Datetime(TimeUnit::Milliseconds, None))?;
        let millis = millis.cast(&DataType::Int64)?;
        let years: Vec<Option<i32>> = millis
            .i64()?
            .into_iter()
            .map(|ms| DateTime::from_timestamp_millis(ms?).map(|dt| dt.year()))
            .collect();

        let mut out = df.clone();
        out.with_column(Series::new(target.into(), years))?;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn people() -> DataFrame {
        DataFrame::new(vec![
            Column::new("Sexo".into(), vec![Some("M"), Some("F"), None, Some("M")]),
            Column::new("Grav".into(), vec![Some("Heridos"), Some("Muertos"), Some("Heridos"), None]),
            Column::new("Edad".into(), vec![Some(30i64), None, Some(41), Some(25)]),
        ])
        .unwrap()
    }

    fn texts(df: &DataFrame, name: &str) -> Vec<Option<String>> {
        df.column(name)
            .unwrap()
            .str()
            .unwrap()
            .into_iter()
            .map(|v| v.map(str::to_string))
            .collect()
    }

    #[test]
    fn drop_mode_removes_rows_with_missing_keys() {
        let df = DataProcessor::drop_missing(&people(), &["Sexo", "Grav"]).unwrap();
        assert_eq!(
            texts(&df, "Sexo"),
            vec![Some("M".to_string()), Some("F".to_string())]
        );

        let untouched = DataProcessor::drop_missing::<&str>(&people(), &[]).unwrap();
        assert_eq!(untouched.height(), 4);
    }

    #[test]
    fn keep_mode_preserves_order() {
        let selection = FilterSelection::new().allow("Sexo", ["M"]);
        let df = DataProcessor::keep_matching(&people(), &selection).unwrap();

        assert_eq!(df.height(), 2);
        let ages: Vec<Option<i64>> = df.column("Edad").unwrap().i64().unwrap().into_iter().collect();
        assert_eq!(ages, vec![Some(30), Some(25)]);
    }

    #[test]
    fn numeric_columns_match_on_text() {
        let selection = FilterSelection::new().allow("Edad", ["41", "25"]);
        let df = DataProcessor::keep_matching(&people(), &selection).unwrap();
        assert_eq!(df.height(), 2);
    }

    #[test]
    fn empty_allowed_set_passes_nothing() {
        let selection = FilterSelection::new().allow("Sexo", Vec::<String>::new());
        let df = DataProcessor::keep_matching(&people(), &selection).unwrap();
        assert_eq!(df.height(), 0);
        assert_eq!(df.width(), 3);
    }

    #[test]
    fn unknown_column_is_an_error() {
        let selection = FilterSelection::new().allow("Comuna", ["10"]);
        assert!(matches!(
            DataProcessor::keep_matching(&people(), &selection),
            Err(ProcessorError::ColumnNotFound(c)) if c == "Comuna"
        ));
    }

    #[test]
    fn observed_values_are_sorted_and_exclude_missing() {
        assert_eq!(
            DataProcessor::observed_values(&people(), "Grav").unwrap(),
            vec!["Heridos", "Muertos"]
        );

        let all = FilterSelection::all_observed(&people(), &["Sexo"]).unwrap();
        let df = DataProcessor::keep_matching(&people(), &all).unwrap();
        assert_eq!(df.height(), 3);
    }

    #[test]
    fn apply_combines_both_modes() {
        let filter = RowFilter {
            required: vec!["Grav".to_string()],
            selection: FilterSelection::new().allow("Grav", ["Heridos"]),
        };
        let df = DataProcessor::apply(&people(), &filter).unwrap();
        assert_eq!(texts(&df, "Sexo"), vec![Some("M".to_string()), None]);
    }

    #[test]
    fn cache_key_is_canonical() {
        let a = FilterSelection::new().allow("b", ["2", "1"]).allow("a", ["x"]);
        let b = FilterSelection::new().allow("a", ["x"]).allow("b", ["1", "2"]);
        assert_eq!(a.cache_key(), b.cache_key());
        assert_eq!(a.cache_key(), r#"{"a":["x"],"b":["1","2"]}"#);
    }

    #[test]
    fn derives_year_from_timestamps() {
        let millis = Series::new("fecha".into(), vec![Some(1_546_300_800_000i64), None])
            .cast(&DataType::Datetime(TimeUnit::Milliseconds, None))
            .unwrap();
        let df = DataFrame::new(vec![millis.into()]).unwrap();

        let with_year = DataProcessor::with_year(&df, "fecha", "year").unwrap();
        let years: Vec<Option<i32>> = with_year
            .column("year")
            .unwrap()
            .i32()
            .unwrap()
            .into_iter()
            .collect();
        assert_eq!(years, vec![Some(2019), None]);

        assert!(matches!(
            DataProcessor::with_year(&people(), "Sexo", "year"),
            Err(ProcessorError::NotTemporal(_))
        ));
    }
}

//! Type Normalizer Module
//! Coerces raw text columns to timestamps, numbers and cleaned text.
//!
//! A cell that cannot be coerced becomes null and is counted in the
//! column's [`CoercionReport`]; only a missing column is an error.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use log::{debug, warn};
use polars::prelude::*;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Maximum number of failing raw values kept per report.
const MAX_FAILURE_SAMPLES: usize = 5;

/// Currency codes stripped from either end of a numeric cell.
const CURRENCY_CODES: [&str; 4] = ["COP", "USD", "EUR", "COL$"];

const DATETIME_FORMATS: [&str; 10] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
    "%d/%m/%Y %I:%M:%S %p",
    "%Y/%m/%d %H:%M:%S",
    "%d-%m-%Y %H:%M:%S",
];

const DATE_FORMATS: [&str; 4] = ["%Y-%m-%d", "%d/%m/%Y", "%Y/%m/%d", "%d-%m-%Y"];

#[derive(Error, Debug)]
pub enum NormalizeError {
    #[error("Column not found: {0}")]
    ColumnNotFound(String),
    #[error("Polars error: {0}")]
    PolarsError(#[from] PolarsError),
}

/// A single cell that could not be coerced to its target type.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("cannot coerce {raw:?} to {target}")]
pub struct CoercionFailure {
    pub raw: String,
    pub target: &'static str,
}

impl CoercionFailure {
    fn new(raw: &str, target: &'static str) -> Self {
        Self {
            raw: raw.to_string(),
            target,
        }
    }
}

/// Which characters separate thousands and decimals in numeric text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NumberFormat {
    /// Guess per cell from the position and count of `,` and `.`.
    #[default]
    Auto,
    /// `1,234.5`
    DotDecimal,
    /// `1.234,5`
    CommaDecimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextCase {
    #[default]
    Keep,
    Upper,
    Lower,
}

/// Semantic type a column is coerced to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TargetType {
    /// Millisecond timestamps; `format` is a chrono pattern, otherwise a
    /// list of common layouts is tried.
    Timestamp {
        #[serde(default)]
        format: Option<String>,
    },
    Numeric {
        #[serde(default)]
        format: NumberFormat,
    },
    /// Numeric coercion that also requires a whole number.
    Integer {
        #[serde(default)]
        format: NumberFormat,
    },
    /// Trimmed text with internal whitespace collapsed.
    Text {
        #[serde(default)]
        case: TextCase,
    },
}

impl TargetType {
    pub fn name(&self) -> &'static str {
        match self {
            TargetType::Timestamp { .. } => "timestamp",
            TargetType::Numeric { .. } => "numeric",
            TargetType::Integer { .. } => "integer",
            TargetType::Text { .. } => "text",
        }
    }
}

/// One (column, target type) instruction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Directive {
    pub column: String,
    pub target: TargetType,
    /// Sentinel strings treated as missing without counting as failures.
    #[serde(default)]
    pub null_tokens: Vec<String>,
}

impl Directive {
    pub fn new(column: impl Into<String>, target: TargetType) -> Self {
        Self {
            column: column.into(),
            target,
            null_tokens: Vec::new(),
        }
    }

    pub fn timestamp(column: impl Into<String>) -> Self {
        Self::new(column, TargetType::Timestamp { format: None })
    }

    pub fn timestamp_with_format(column: impl Into<String>, format: impl Into<String>) -> Self {
        Self::new(
            column,
            TargetType::Timestamp {
                format: Some(format.into()),
            },
        )
    }

    pub fn numeric(column: impl Into<String>) -> Self {
        Self::new(
            column,
            TargetType::Numeric {
                format: NumberFormat::Auto,
            },
        )
    }

    pub fn numeric_with_format(column: impl Into<String>, format: NumberFormat) -> Self {
        Self::new(column, TargetType::Numeric { format })
    }

    pub fn integer(column: impl Into<String>) -> Self {
        Self::new(
            column,
            TargetType::Integer {
                format: NumberFormat::Auto,
            },
        )
    }

    pub fn text(column: impl Into<String>) -> Self {
        Self::new(
            column,
            TargetType::Text {
                case: TextCase::Keep,
            },
        )
    }

    pub fn text_with_case(column: impl Into<String>, case: TextCase) -> Self {
        Self::new(column, TargetType::Text { case })
    }

    pub fn with_null_tokens<I, S>(mut self, tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.null_tokens = tokens.into_iter().map(Into::into).collect();
        self
    }

    fn is_null_token(&self, text: &str) -> bool {
        self.null_tokens
            .iter()
            .any(|token| token.trim().eq_ignore_ascii_case(text))
    }
}

/// Coercion diagnostics for one directive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CoercionReport {
    pub column: String,
    pub target: &'static str,
    /// Non-empty cells that failed to parse.
    pub failures: usize,
    /// Cells matching one of the directive's null tokens.
    pub null_tokens: usize,
    /// First few failing raw values.
    pub samples: Vec<String>,
}

impl CoercionReport {
    fn new(directive: &Directive) -> Self {
        Self {
            column: directive.column.clone(),
            target: directive.target.name(),
            failures: 0,
            null_tokens: 0,
            samples: Vec::new(),
        }
    }

    fn record(&mut self, failure: CoercionFailure) {
        self.failures += 1;
        if self.samples.len() < MAX_FAILURE_SAMPLES {
            self.samples.push(failure.raw);
        }
    }
}

/// A normalized table and the per-directive diagnostics.
#[derive(Debug, Clone)]
pub struct Normalized {
    pub table: DataFrame,
    pub reports: Vec<CoercionReport>,
}

impl Normalized {
    pub fn total_failures(&self) -> usize {
        self.reports.iter().map(|r| r.failures).sum()
    }
}

/// Parse a numeric cell, stripping currency symbols and separators.
pub fn coerce_number(raw: &str, format: NumberFormat) -> Result<f64, CoercionFailure> {
    let fail = || CoercionFailure::new(raw, "numeric");
    let trimmed = raw.trim();

    if is_plain_decimal(trimmed, format) {
        if let Ok(value) = trimmed.parse::<f64>() {
            return if value.is_finite() { Ok(value) } else { Err(fail()) };
        }
    }

    let canonical = canonical_number(trimmed, format).ok_or_else(fail)?;
    let value: f64 = canonical.parse().map_err(|_| fail())?;
    if !value.is_finite() {
        return Err(fail());
    }
    Ok(value)
}

/// Parse a whole-number cell.
///
/// Digits are parsed as `i64` directly, so large values keep full precision
/// and values outside the `i64` range fail instead of saturating.
pub fn coerce_integer(raw: &str, format: NumberFormat) -> Result<i64, CoercionFailure> {
    let fail = || CoercionFailure::new(raw, "integer");
    let trimmed = raw.trim();

    if let Ok(value) = trimmed.parse::<i64>() {
        return Ok(value);
    }
    if let Some(canonical) = canonical_number(trimmed, format) {
        return whole_number(&canonical).ok_or_else(fail);
    }

    // Exponent forms such as `1e3`.
    if !is_plain_decimal(trimmed, format) {
        return Err(fail());
    }
    let value: f64 = trimmed.parse().map_err(|_| fail())?;
    float_to_integer(value).ok_or_else(fail)
}

/// Parse a timestamp cell with an explicit pattern or the built-in layouts.
pub fn coerce_timestamp(raw: &str, format: Option<&str>) -> Result<NaiveDateTime, CoercionFailure> {
    let text = raw.trim();
    let parsed = match format {
        Some(pattern) => parse_with_pattern(text, pattern),
        None => DateTime::parse_from_rfc3339(text)
            .ok()
            .map(|dt| dt.naive_utc())
            .or_else(|| {
                DATETIME_FORMATS
                    .iter()
                    .find_map(|pattern| NaiveDateTime::parse_from_str(text, pattern).ok())
            })
            .or_else(|| {
                DATE_FORMATS.iter().find_map(|pattern| {
                    NaiveDate::parse_from_str(text, pattern)
                        .ok()
                        .and_then(|date| date.and_hms_opt(0, 0, 0))
                })
            }),
    };
    parsed.ok_or_else(|| CoercionFailure::new(raw, "timestamp"))
}

/// Trim, collapse internal whitespace and apply the requested casing.
pub fn normalize_text(raw: &str, case: TextCase) -> String {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    match case {
        TextCase::Keep => collapsed,
        TextCase::Upper => collapsed.to_uppercase(),
        TextCase::Lower => collapsed.to_lowercase(),
    }
}

fn parse_with_pattern(text: &str, pattern: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(text, pattern).ok().or_else(|| {
        NaiveDate::parse_from_str(text, pattern)
            .ok()
            .and_then(|date| date.and_hms_opt(0, 0, 0))
    })
}

fn strip_currency_codes(text: &str) -> &str {
    let mut text = text.trim();
    for code in CURRENCY_CODES {
        if text
            .get(..code.len())
            .is_some_and(|head| head.eq_ignore_ascii_case(code))
        {
            text = text[code.len()..].trim_start();
        }
        if let Some(tail_start) = text.len().checked_sub(code.len()) {
            if text
                .get(tail_start..)
                .is_some_and(|tail| tail.eq_ignore_ascii_case(code))
            {
                text = text[..tail_start].trim_end();
            }
        }
    }
    text
}

/// `[-]digits[.digits]` text of a numeric cell once currency marks and
/// thousands separators are removed.
fn canonical_number(trimmed: &str, format: NumberFormat) -> Option<String> {
    let stripped = strip_currency_codes(trimmed);
    let mut negative = false;
    let mut body = String::with_capacity(stripped.len());
    for ch in stripped.chars() {
        match ch {
            '0'..='9' | '.' | ',' => body.push(ch),
            '-' if body.is_empty() && !negative => negative = true,
            '$' | '€' | '£' | ' ' | '\u{a0}' | '\'' | '_' => {}
            _ => return None,
        }
    }

    if !body.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }

    let (thousands, decimal) = match format {
        NumberFormat::DotDecimal => (',', '.'),
        NumberFormat::CommaDecimal => ('.', ','),
        NumberFormat::Auto => guess_separators(&body),
    };

    let mut canonical = String::with_capacity(body.len() + 1);
    if negative {
        canonical.push('-');
    }
    let mut seen_decimal = false;
    for ch in body.chars() {
        if ch == thousands {
            continue;
        }
        if ch == decimal {
            if seen_decimal {
                return None;
            }
            seen_decimal = true;
            canonical.push('.');
        } else {
            canonical.push(ch);
        }
    }
    Some(canonical)
}

/// Whether `text` can go straight to the float parser: a dot is a decimal
/// mark unless it is a lone dot before exactly three digits in `Auto` mode.
fn is_plain_decimal(text: &str, format: NumberFormat) -> bool {
    match format {
        NumberFormat::DotDecimal => true,
        NumberFormat::Auto => !is_thousands_group(text, '.'),
        NumberFormat::CommaDecimal => false,
    }
}

/// A single `separator` followed by exactly three digits, as in `12.500` or `1,000`.
fn is_thousands_group(text: &str, separator: char) -> bool {
    let mut parts = text.split(separator);
    match (parts.next(), parts.next(), parts.next()) {
        (Some(_), Some(tail), None) => tail.len() == 3 && tail.bytes().all(|b| b.is_ascii_digit()),
        _ => false,
    }
}

/// `(thousands, decimal)` for an ASCII digit/separator body.
///
/// With both separators present the last one is the decimal mark. A lone
/// separator of either kind before exactly three digits groups thousands,
/// otherwise it is the decimal mark; repeated separators group thousands.
fn guess_separators(body: &str) -> (char, char) {
    match (body.rfind(','), body.rfind('.')) {
        (Some(comma), Some(dot)) if comma > dot => ('.', ','),
        (Some(_), Some(_)) => (',', '.'),
        (Some(_), None) => {
            if body.matches(',').count() == 1 && !is_thousands_group(body, ',') {
                ('.', ',')
            } else {
                (',', '.')
            }
        }
        (None, Some(_)) => {
            if body.matches('.').count() > 1 || is_thousands_group(body, '.') {
                ('.', ',')
            } else {
                (',', '.')
            }
        }
        (None, None) => (',', '.'),
    }
}

/// `i64` value of canonical `[-]digits[.zeros]` text; `None` for a non-zero
/// fraction or a value outside the `i64` range.
fn whole_number(canonical: &str) -> Option<i64> {
    let (whole, fraction) = canonical.split_once('.').unwrap_or((canonical, ""));
    if !fraction.bytes().all(|b| b == b'0') {
        return None;
    }
    match whole {
        "" | "-" => Some(0),
        _ => whole.parse().ok(),
    }
}

fn float_to_integer(value: f64) -> Option<i64> {
    // `i64::MAX as f64` rounds up to 2^63, which is already out of range.
    if value.fract() == 0.0 && value >= i64::MIN as f64 && value < i64::MAX as f64 {
        Some(value as i64)
    } else {
        None
    }
}

pub(crate) fn is_numeric(dtype: &DataType) -> bool {
    matches!(
        dtype,
        DataType::Float32
            | DataType::Float64
            | DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64
    )
}

/// Coerce every cell of a text column, routing failures into `report`.
fn coerce_cells<T>(
    text: &StringChunked,
    directive: &Directive,
    report: &mut CoercionReport,
    coerce: impl Fn(&str) -> Result<T, CoercionFailure>,
) -> Vec<Option<T>> {
    text.into_iter()
        .map(|raw| {
            let cell = raw?.trim();
            if cell.is_empty() {
                return None;
            }
            if directive.is_null_token(cell) {
                report.null_tokens += 1;
                return None;
            }
            match coerce(cell) {
                Ok(value) => Some(value),
                Err(failure) => {
                    report.record(failure);
                    None
                }
            }
        })
        .collect()
}

/// Applies coercion directives to a table.
pub struct TypeNormalizer;

impl TypeNormalizer {
    /// Normalize the directed columns, leaving every other column untouched.
    ///
    /// Columns are computed in parallel from the input table and then
    /// swapped in; with two directives on one column the later one wins.
    pub fn normalize(df: &DataFrame, directives: &[Directive]) -> Result<Normalized, NormalizeError> {
        if let Some(missing) = directives
            .iter()
            .find(|d| df.column(&d.column).is_err())
        {
            return Err(NormalizeError::ColumnNotFound(missing.column.clone()));
        }

        let outputs = directives
            .par_iter()
            .map(|directive| {
                let column = df
                    .column(&directive.column)
                    .map_err(|_| NormalizeError::ColumnNotFound(directive.column.clone()))?;
                Self::normalize_column(column, directive)
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut table = df.clone();
        let mut reports = Vec::with_capacity(outputs.len());
        for (series, report) in outputs {
            if report.failures > 0 {
                warn!(
                    "{} cell(s) in '{}' could not be coerced to {} (e.g. {:?})",
                    report.failures, report.column, report.target, report.samples
                );
            }
            table.with_column(series)?;
            reports.push(report);
        }

        debug!(
            "Normalized {} column(s) over {} rows",
            directives.len(),
            table.height()
        );
        Ok(Normalized { table, reports })
    }

    /// Normalize a single column.
    pub fn normalize_column(
        column: &Column,
        directive: &Directive,
    ) -> Result<(Series, CoercionReport), NormalizeError> {
        let name = column.name().clone();
        let mut report = CoercionReport::new(directive);

        let series = match &directive.target {
            TargetType::Timestamp { .. } if matches!(column.dtype(), DataType::Datetime(_, _)) => {
                column.as_materialized_series().clone()
            }
            TargetType::Timestamp { format } => {
                let text = column.cast(&DataType::String)?;
                let millis = coerce_cells(text.str()?, directive, &mut report, |cell| {
                    coerce_timestamp(cell, format.as_deref())
                        .map(|dt| dt.and_utc().timestamp_millis())
                });
                Series::new(name, millis)
                    .cast(&DataType::Datetime(TimeUnit::Milliseconds, None))?
            }
            TargetType::Numeric { .. } if is_numeric(column.dtype()) => column
                .cast(&DataType::Float64)?
                .as_materialized_series()
                .clone(),
            TargetType::Numeric { format } => {
                let text = column.cast(&DataType::String)?;
                let values = coerce_cells(text.str()?, directive, &mut report, |cell| {
                    coerce_number(cell, *format)
                });
                Series::new(name, values)
            }
            TargetType::Integer { .. } if column.dtype().is_integer() => {
                let whole = column.cast(&DataType::Int64)?;
                let text = column.cast(&DataType::String)?;
                let values: Vec<Option<i64>> = whole
                    .i64()?
                    .into_iter()
                    .zip(text.str()?)
                    .map(|(value, raw)| {
                        if let (None, Some(raw)) = (value, raw) {
                            report.record(CoercionFailure::new(raw, "integer"));
                        }
                        value
                    })
                    .collect();
                Series::new(name, values)
            }
            TargetType::Integer { .. } if is_numeric(column.dtype()) => {
                let floats = column.cast(&DataType::Float64)?;
                let values: Vec<Option<i64>> = floats
                    .f64()?
                    .into_iter()
                    .map(|value| {
                        let value = value?;
                        let whole = float_to_integer(value);
                        if whole.is_none() {
                            report.record(CoercionFailure::new(&value.to_string(), "integer"));
                        }
                        whole
                    })
                    .collect();
                Series::new(name, values)
            }
            TargetType::Integer { format } => {
                let text = column.cast(&DataType::String)?;
                let values = coerce_cells(text.str()?, directive, &mut report, |cell| {
                    coerce_integer(cell, *format)
                });
                Series::new(name, values)
            }
            TargetType::Text { case } => {
                let text = column.cast(&DataType::String)?;
                let values = coerce_cells(text.str()?, directive, &mut report, |cell| {
                    Ok(normalize_text(cell, *case))
                });
                Series::new(name, values)
            }
        };

        Ok((series, report))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn text_frame(name: &str, values: &[Option<&str>]) -> DataFrame {
        DataFrame::new(vec![Column::new(name.into(), values.to_vec())]).unwrap()
    }

    #[test]
    fn currency_strings() {
        let df = text_frame("Valor", &[Some("$1,000"), Some("$2,500"), Some("abc")]);
        let normalized = TypeNormalizer::normalize(&df, &[Directive::numeric("Valor")]).unwrap();

        let values: Vec<Option<f64>> = normalized
            .table
            .column("Valor")
            .unwrap()
            .f64()
            .unwrap()
            .into_iter()
            .collect();
        assert_eq!(values, vec![Some(1000.0), Some(2500.0), None]);
        assert_eq!(normalized.reports[0].failures, 1);
        assert_eq!(normalized.reports[0].samples, vec!["abc".to_string()]);
        assert_eq!(normalized.total_failures(), 1);
    }

    #[test]
    fn number_formats() {
        assert_eq!(coerce_number("1.234.567,89", NumberFormat::Auto), Ok(1_234_567.89));
        assert_eq!(coerce_number("6,2518", NumberFormat::Auto), Ok(6.2518));
        assert_eq!(coerce_number("COP 12.500.000", NumberFormat::Auto), Ok(12_500_000.0));
        assert_eq!(coerce_number("-75,563", NumberFormat::CommaDecimal), Ok(-75.563));
        assert_eq!(coerce_number("1,5", NumberFormat::DotDecimal), Ok(15.0));
        assert_eq!(coerce_number(" 42 ", NumberFormat::Auto), Ok(42.0));
        assert_eq!(coerce_number("1e3", NumberFormat::Auto), Ok(1000.0));
        assert!(coerce_number("NaN", NumberFormat::Auto).is_err());
        assert!(coerce_number("$", NumberFormat::Auto).is_err());
        assert!(coerce_number("1,2,3.4.5", NumberFormat::Auto).is_err());
    }

    #[test]
    fn integers_must_be_whole() {
        assert_eq!(coerce_integer("$1,000", NumberFormat::Auto), Ok(1000));
        assert_eq!(coerce_integer("1000.0", NumberFormat::DotDecimal), Ok(1000));
        assert_eq!(coerce_integer("1e3", NumberFormat::Auto), Ok(1000));
        assert!(coerce_integer("10.5", NumberFormat::Auto).is_err());
    }

    #[test]
    fn integers_keep_precision_and_reject_overflow() {
        assert_eq!(
            coerce_integer("9007199254740993", NumberFormat::Auto),
            Ok(9_007_199_254_740_993)
        );
        assert_eq!(
            coerce_integer("$9,007,199,254,740,993", NumberFormat::Auto),
            Ok(9_007_199_254_740_993)
        );
        assert_eq!(coerce_integer("-9223372036854775808", NumberFormat::Auto), Ok(i64::MIN));
        assert!(coerce_integer("9223372036854775808", NumberFormat::Auto).is_err());
        assert!(coerce_integer("$9,223,372,036,854,775,808", NumberFormat::Auto).is_err());
        assert!(coerce_integer("9.3e18", NumberFormat::Auto).is_err());
        assert_eq!(float_to_integer(9_223_372_036_854_775_808.0), None);
    }

    #[test]
    fn integer_columns_renormalize_exactly() {
        let df = DataFrame::new(vec![Column::new(
            "n".into(),
            vec![Some(9_007_199_254_740_993i64), None, Some(-4)],
        )])
        .unwrap();
        let normalized = TypeNormalizer::normalize(&df, &[Directive::integer("n")]).unwrap();

        let values: Vec<Option<i64>> = normalized
            .table
            .column("n")
            .unwrap()
            .i64()
            .unwrap()
            .into_iter()
            .collect();
        assert_eq!(values, vec![Some(9_007_199_254_740_993), None, Some(-4)]);
        assert_eq!(normalized.total_failures(), 0);

        let too_big = DataFrame::new(vec![Column::new("n".into(), vec![u64::MAX, 7])]).unwrap();
        let normalized = TypeNormalizer::normalize(&too_big, &[Directive::integer("n")]).unwrap();
        assert_eq!(normalized.reports[0].failures, 1);
        assert_eq!(normalized.table.column("n").unwrap().null_count(), 1);
    }

    #[test]
    fn lone_separator_before_three_digits_groups_thousands() {
        assert_eq!(coerce_number("$12.500", NumberFormat::Auto), Ok(12_500.0));
        assert_eq!(coerce_number("$12.500.000", NumberFormat::Auto), Ok(12_500_000.0));
        assert_eq!(coerce_number("12.500", NumberFormat::Auto), Ok(12_500.0));
        assert_eq!(coerce_number("$12,500", NumberFormat::Auto), Ok(12_500.0));
        assert_eq!(coerce_number("12.5", NumberFormat::Auto), Ok(12.5));
        assert_eq!(coerce_number("6.2518", NumberFormat::Auto), Ok(6.2518));
        assert_eq!(coerce_number("12.500", NumberFormat::DotDecimal), Ok(12.5));
    }

    #[test]
    fn timestamps() {
        let expected = NaiveDate::from_ymd_opt(2019, 3, 4)
            .unwrap()
            .and_hms_opt(13, 5, 0)
            .unwrap();
        assert_eq!(coerce_timestamp("2019-03-04 13:05:00", None), Ok(expected));
        assert_eq!(coerce_timestamp("04/03/2019 01:05:00 PM", None), Ok(expected));
        assert_eq!(coerce_timestamp("2019-03-04T13:05:00Z", None), Ok(expected));
        assert_eq!(
            coerce_timestamp("2019|03|04 13:05", Some("%Y|%m|%d %H:%M")),
            Ok(expected)
        );
        assert_eq!(
            coerce_timestamp("04/03/2019", None),
            Ok(expected.date().and_hms_opt(0, 0, 0).unwrap())
        );
        assert!(coerce_timestamp("yesterday", None).is_err());
    }

    #[test]
    fn null_tokens_are_missing_not_failures() {
        let df = text_frame("LATITUD", &[Some("6,25"), Some("Sin Inf"), None, Some("??")]);
        let directive = Directive::numeric_with_format("LATITUD", NumberFormat::CommaDecimal)
            .with_null_tokens(["Sin Inf"]);
        let normalized = TypeNormalizer::normalize(&df, &[directive]).unwrap();

        let report = &normalized.reports[0];
        assert_eq!(report.null_tokens, 1);
        assert_eq!(report.failures, 1);
        assert_eq!(normalized.table.column("LATITUD").unwrap().null_count(), 3);
    }

    #[test]
    fn text_is_trimmed_and_cased() {
        let df = text_frame("Ciudad", &[Some("  medellín  "), Some("   "), Some("Envigado   Sur")]);
        let directive = Directive::text_with_case("Ciudad", TextCase::Upper);
        let normalized = TypeNormalizer::normalize(&df, &[directive]).unwrap();

        let values: Vec<Option<&str>> = normalized
            .table
            .column("Ciudad")
            .unwrap()
            .str()
            .unwrap()
            .into_iter()
            .collect();
        assert_eq!(values, vec![Some("MEDELLÍN"), None, Some("ENVIGADO SUR")]);
    }

    #[test]
    fn absent_column_is_fatal() {
        let df = text_frame("a", &[Some("1")]);
        let err = TypeNormalizer::normalize(&df, &[Directive::numeric("b")]).unwrap_err();
        assert!(matches!(err, NormalizeError::ColumnNotFound(name) if name == "b"));
    }

    #[test]
    fn normalizing_twice_is_stable() {
        let df = DataFrame::new(vec![
            Column::new("fecha".into(), vec![Some("2020-01-02"), Some("bad"), None]),
            Column::new("valor".into(), vec![Some("$3,000"), Some("x"), Some("7")]),
            Column::new("n".into(), vec![Some("4"), Some("4.5"), Some("1,000")]),
            Column::new("t".into(), vec![Some(" a  b "), None, Some("c")]),
        ])
        .unwrap();
        let directives = vec![
            Directive::timestamp("fecha"),
            Directive::numeric("valor"),
            Directive::integer("n"),
            Directive::text("t"),
        ];

        let once = TypeNormalizer::normalize(&df, &directives).unwrap();
        let twice = TypeNormalizer::normalize(&once.table, &directives).unwrap();

        assert_eq!(once.table.height(), df.height());
        assert!(twice.table.equals_missing(&once.table));
        assert_eq!(twice.total_failures(), 0);
        assert_eq!(
            once.table.column("fecha").unwrap().dtype(),
            &DataType::Datetime(TimeUnit::Milliseconds, None)
        );
        assert_eq!(once.table.column("n").unwrap().dtype(), &DataType::Int64);
    }

    #[test]
    fn directives_deserialize_from_json() {
        let json = r#"[
            {"column": "Valor", "target": {"kind": "numeric"}},
            {"column": "LATITUD", "target": {"kind": "numeric", "format": "comma_decimal"}, "null_tokens": ["Sin Inf"]},
            {"column": "FECHA", "target": {"kind": "timestamp", "format": "%d/%m/%Y"}}
        ]"#;
        let directives: Vec<Directive> = serde_json::from_str(json).unwrap();

        assert_eq!(directives[0], Directive::numeric("Valor"));
        assert_eq!(
            directives[1],
            Directive::numeric_with_format("LATITUD", NumberFormat::CommaDecimal)
                .with_null_tokens(["Sin Inf"])
        );
        assert_eq!(directives[2], Directive::timestamp_with_format("FECHA", "%d/%m/%Y"));
    }
}

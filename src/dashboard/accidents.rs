//! Traffic incidents page
//! Incidents by severity, sex, class, year and commune, plus map points.

use crate::dashboard::{ChartData, PageError, PageWarning, TableOverview};
use crate::data::{
    CoercionReport, DataProcessor, Directive, FilterSelection, LoadOptions, NumberFormat,
    TableCache, TypeNormalizer, ViewMemo,
};
use crate::stats::{AggregateKind, Aggregator, GroupedTable, ModeSummary, Summarizer};
use log::warn;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Column names and page defaults for the incidents dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccidentsConfig {
    pub timestamp: String,
    /// chrono pattern for `timestamp`; common layouts are tried when unset.
    pub timestamp_format: Option<String>,
    /// Derived column holding the incident year.
    pub year: String,
    pub severity: String,
    pub class: String,
    pub commune: String,
    /// Demographic column, when the dataset has one.
    pub sex: Option<String>,
    pub latitude: String,
    pub longitude: String,
    /// Coordinates use a decimal comma (`6,2518`).
    pub coordinate_format: NumberFormat,
    /// Placeholder values meaning "no data" in any cleaned column.
    pub null_tokens: Vec<String>,
    pub top_communes: usize,
    pub preview_rows: usize,
    pub load: LoadOptions,
}

impl Default for AccidentsConfig {
    fn default() -> Self {
        Self {
            timestamp: "FECHA_ACCIDENTE".to_string(),
            timestamp_format: None,
            year: "AÑO".to_string(),
            severity: "GRAVEDAD_ACCIDENTE".to_string(),
            class: "CLASE_ACCIDENTE".to_string(),
            commune: "COMUNA".to_string(),
            sex: Some("SEXO".to_string()),
            latitude: "LATITUD".to_string(),
            longitude: "LONGITUD".to_string(),
            coordinate_format: NumberFormat::CommaDecimal,
            null_tokens: vec![
                "Sin Inf".to_string(),
                "Sin Informacion".to_string(),
                "No data".to_string(),
            ],
            top_communes: 10,
            preview_rows: 20,
            load: LoadOptions::default(),
        }
    }
}

impl AccidentsConfig {
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    pub fn directives(&self) -> Vec<Directive> {
        let timestamp = match &self.timestamp_format {
            Some(format) => Directive::timestamp_with_format(&self.timestamp, format),
            None => Directive::timestamp(&self.timestamp),
        };

        let mut directives = vec![
            timestamp,
            Directive::numeric_with_format(&self.latitude, self.coordinate_format),
            Directive::numeric_with_format(&self.longitude, self.coordinate_format),
            Directive::text(&self.severity),
            Directive::text(&self.class),
            Directive::text(&self.commune),
        ];
        if let Some(sex) = &self.sex {
            directives.push(Directive::text(sex));
        }

        directives
            .into_iter()
            .map(|d| d.with_null_tokens(self.null_tokens.iter().cloned()))
            .collect()
    }

    /// Rows without a timestamp or severity are not incidents we can place.
    pub fn required_columns(&self) -> [&str; 2] {
        [self.timestamp.as_str(), self.severity.as_str()]
    }

    /// Columns offered as filters on this page.
    pub fn filter_columns(&self) -> [&str; 4] {
        [
            self.year.as_str(),
            self.severity.as_str(),
            self.class.as_str(),
            self.commune.as_str(),
        ]
    }
}

/// Everything the incidents page shows for one selection.
#[derive(Debug, Clone)]
pub struct AccidentsView {
    /// Overview of the cleaned dataset before the selection.
    pub overview: TableOverview,
    /// Cleaned rows passing the selection.
    pub table: DataFrame,
    pub by_severity: GroupedTable,
    pub by_class: GroupedTable,
    /// `None` when the dataset has no sex column.
    pub by_sex: Option<GroupedTable>,
    /// Ascending by year.
    pub by_year: GroupedTable,
    pub top_communes: GroupedTable,
    /// Latitude, longitude, severity and class of every placeable incident.
    pub points: DataFrame,
    pub most_common_severity: ModeSummary,
    pub most_common_class: ModeSummary,
    pub most_common_sex: ModeSummary,
    pub coercion: Vec<CoercionReport>,
    pub warnings: Vec<PageWarning>,
}

impl AccidentsView {
    /// Cleaned incidents with the derived year column, before any selection.
    pub fn prepare(
        source: &DataFrame,
        config: &AccidentsConfig,
    ) -> Result<(DataFrame, Vec<CoercionReport>), PageError> {
        let normalized = TypeNormalizer::normalize(source, &config.directives())?;
        let complete = DataProcessor::drop_missing(&normalized.table, &config.required_columns())?;
        let table = DataProcessor::with_year(&complete, &config.timestamp, &config.year)?;
        Ok((table, normalized.reports))
    }

    /// Run the page pipeline over a raw (all-text) incidents table.
    pub fn build(
        source: &DataFrame,
        config: &AccidentsConfig,
        selection: &FilterSelection,
    ) -> Result<Self, PageError> {
        let (prepared, coercion) = Self::prepare(source, config)?;
        let overview = TableOverview::of(&prepared, config.preview_rows);
        let mut warnings = PageWarning::from_reports(&coercion);

        let table = DataProcessor::keep_matching(&prepared, selection)?;
        if table.height() == 0 {
            warn!("Incidents selection matched no rows");
            warnings.push(PageWarning::empty_result());
        }

        let mut by_year = Aggregator::count_by(&table, &[config.year.as_str()])?;
        by_year.sort_by_key();

        let by_sex = config
            .sex
            .as_deref()
            .map(|sex| Aggregator::value_counts(&table, sex))
            .transpose()?;
        let most_common_sex = config
            .sex
            .as_deref()
            .map(|sex| Summarizer::most_common(&table, sex))
            .unwrap_or_else(ModeSummary::no_data);

        Ok(Self {
            overview,
            by_severity: Aggregator::value_counts(&table, &config.severity)?,
            by_class: Aggregator::value_counts(&table, &config.class)?,
            by_sex,
            by_year,
            top_communes: Aggregator::top_n(
                &table,
                &[config.commune.as_str()],
                &AggregateKind::Count,
                config.top_communes,
            )?,
            points: Self::map_points(&table, config)?,
            most_common_severity: Summarizer::most_common(&table, &config.severity),
            most_common_class: Summarizer::most_common(&table, &config.class),
            most_common_sex,
            coercion,
            warnings,
            table,
        })
    }

    fn map_points(table: &DataFrame, config: &AccidentsConfig) -> PolarsResult<DataFrame> {
        let latitude = config.latitude.as_str();
        let longitude = config.longitude.as_str();

        table
            .clone()
            .lazy()
            .filter(col(latitude).is_not_null().and(col(longitude).is_not_null()))
            .select([
                col(latitude),
                col(longitude),
                col(config.severity.as_str()),
                col(config.class.as_str()),
            ])
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.table.height() == 0
    }

    pub fn charts(&self) -> Vec<ChartData> {
        let mut charts = vec![
            ChartData::from_grouped("Incidentes por gravedad", &self.by_severity),
            ChartData::from_grouped("Incidentes por clase", &self.by_class),
            ChartData::from_grouped("Incidentes por año", &self.by_year),
            ChartData::from_grouped("Comunas con más incidentes", &self.top_communes),
        ];
        if let Some(by_sex) = &self.by_sex {
            charts.push(ChartData::from_grouped("Incidentes por sexo", by_sex));
        }
        charts
    }
}

/// Incidents page with a shared table cache and memoized views.
pub struct AccidentsDashboard {
    config: AccidentsConfig,
    cache: TableCache,
    memo: ViewMemo<AccidentsView>,
}

impl AccidentsDashboard {
    pub fn new(config: AccidentsConfig) -> Self {
        Self {
            config,
            cache: TableCache::new(),
            memo: ViewMemo::default(),
        }
    }

    pub fn config(&self) -> &AccidentsConfig {
        &self.config
    }

    /// Render the page for `selection`, reusing work while file and selection are unchanged.
    pub fn render(
        &self,
        path: impl AsRef<Path>,
        selection: &FilterSelection,
    ) -> Result<AccidentsView, PageError> {
        let loaded = self.cache.get_or_load(path, &self.config.load)?;
        self.memo
            .get_or_compute(&loaded.digest, &selection.cache_key(), || {
                AccidentsView::build(&loaded.table, &self.config, selection)
            })
    }

    /// Selection with every observed year, severity, class and commune allowed.
    pub fn default_selection(&self, path: impl AsRef<Path>) -> Result<FilterSelection, PageError> {
        let loaded = self.cache.get_or_load(path, &self.config.load)?;
        let (prepared, _) = AccidentsView::prepare(&loaded.table, &self.config)?;
        Ok(FilterSelection::all_observed(
            &prepared,
            &self.config.filter_columns(),
        )?)
    }
}

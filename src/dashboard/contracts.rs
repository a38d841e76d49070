//! Public contracts page
//! Contracts by type, modality and city, and the top providers by awarded value.

use crate::dashboard::{ChartData, PageError, PageWarning, TableOverview};
use crate::data::{
    CoercionReport, DataProcessor, Directive, FilterSelection, LoadOptions, TableCache,
    TypeNormalizer, ViewMemo,
};
use crate::stats::{
    AggregateKind, Aggregator, GroupedTable, ModeSummary, NumericSummary, StatsCalculator,
    Summarizer,
};
use log::warn;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Column names and page defaults for the contracts dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContractsConfig {
    pub contract_type: String,
    pub modality: String,
    pub provider: String,
    pub value: String,
    pub city: String,
    pub top_providers: usize,
    pub preview_rows: usize,
    pub load: LoadOptions,
}

impl Default for ContractsConfig {
    fn default() -> Self {
        Self {
            contract_type: "Tipo de Contrato".to_string(),
            modality: "Modalidad de Contratacion".to_string(),
            provider: "Proveedor Adjudicado".to_string(),
            value: "Valor del Contrato".to_string(),
            city: "Ciudad".to_string(),
            top_providers: 10,
            preview_rows: 20,
            load: LoadOptions::default(),
        }
    }
}

impl ContractsConfig {
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    pub fn directives(&self) -> Vec<Directive> {
        vec![
            Directive::numeric(&self.value),
            Directive::text(&self.contract_type),
            Directive::text(&self.modality),
            Directive::text(&self.provider),
            Directive::text(&self.city),
        ]
    }

    /// Columns offered as filters on this page.
    pub fn filter_columns(&self) -> [&str; 2] {
        [self.city.as_str(), self.contract_type.as_str()]
    }
}

/// Everything the contracts page shows for one selection.
#[derive(Debug, Clone)]
pub struct ContractsView {
    /// Overview of the whole cleaned dataset.
    pub overview: TableOverview,
    /// Cleaned rows passing the selection.
    pub table: DataFrame,
    pub by_type: GroupedTable,
    pub by_modality: GroupedTable,
    pub top_providers: GroupedTable,
    pub by_city: GroupedTable,
    pub value_summary: NumericSummary,
    pub most_common_type: ModeSummary,
    pub most_common_modality: ModeSummary,
    pub coercion: Vec<CoercionReport>,
    pub warnings: Vec<PageWarning>,
}

impl ContractsView {
    /// Run the page pipeline over a raw (all-text) contracts table.
    pub fn build(
        source: &DataFrame,
        config: &ContractsConfig,
        selection: &FilterSelection,
    ) -> Result<Self, PageError> {
        let normalized = TypeNormalizer::normalize(source, &config.directives())?;
        let overview = TableOverview::of(&normalized.table, config.preview_rows);
        let mut warnings = PageWarning::from_reports(&normalized.reports);

        let table = DataProcessor::keep_matching(&normalized.table, selection)?;
        if table.height() == 0 {
            warn!("Contracts selection matched no rows");
            warnings.push(PageWarning::empty_result());
        }

        Ok(Self {
            overview,
            by_type: Aggregator::value_counts(&table, &config.contract_type)?,
            by_modality: Aggregator::value_counts(&table, &config.modality)?,
            top_providers: Aggregator::top_n(
                &table,
                &[config.provider.as_str()],
                &AggregateKind::sum(&config.value),
                config.top_providers,
            )?,
            by_city: Aggregator::value_counts(&table, &config.city)?,
            value_summary: StatsCalculator::describe(&table, &config.value)?,
            most_common_type: Summarizer::most_common(&table, &config.contract_type),
            most_common_modality: Summarizer::most_common(&table, &config.modality),
            coercion: normalized.reports,
            warnings,
            table,
        })
    }

    pub fn total_value(&self) -> f64 {
        self.value_summary.sum
    }

    pub fn is_empty(&self) -> bool {
        self.table.height() == 0
    }

    pub fn charts(&self) -> Vec<ChartData> {
        vec![
            ChartData::from_grouped("Contratos por tipo", &self.by_type),
            ChartData::from_grouped("Contratos por modalidad", &self.by_modality),
            ChartData::from_grouped("Top proveedores por valor total", &self.top_providers),
            ChartData::from_grouped("Distribución de contratos por ciudad", &self.by_city),
        ]
    }
}

/// Contracts page with a shared table cache and memoized views.
pub struct ContractsDashboard {
    config: ContractsConfig,
    cache: TableCache,
    memo: ViewMemo<ContractsView>,
}

impl ContractsDashboard {
    pub fn new(config: ContractsConfig) -> Self {
        Self {
            config,
            cache: TableCache::new(),
            memo: ViewMemo::default(),
        }
    }

    pub fn config(&self) -> &ContractsConfig {
        &self.config
    }

    /// Render the page for `selection`, reusing work while file and selection are unchanged.
    pub fn render(
        &self,
        path: impl AsRef<Path>,
        selection: &FilterSelection,
    ) -> Result<ContractsView, PageError> {
        let loaded = self.cache.get_or_load(path, &self.config.load)?;
        self.memo
            .get_or_compute(&loaded.digest, &selection.cache_key(), || {
                ContractsView::build(&loaded.table, &self.config, selection)
            })
    }

    /// Selection with every observed city and contract type allowed.
    pub fn default_selection(&self, path: impl AsRef<Path>) -> Result<FilterSelection, PageError> {
        let loaded = self.cache.get_or_load(path, &self.config.load)?;
        let normalized = TypeNormalizer::normalize(&loaded.table, &self.config.directives())?;
        Ok(FilterSelection::all_observed(
            &normalized.table,
            &self.config.filter_columns(),
        )?)
    }
}

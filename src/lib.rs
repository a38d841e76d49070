//! Medellín Dashboards - CSV Data Preparation Pipeline
//!
//! Loads the contracts and traffic-incident CSV files, coerces their columns
//! to typed values, filters rows by user selections and produces the grouped
//! tables, chart payloads and summary facts the dashboard pages display.
//!
//! ```no_run
//! use medellin_dashboards::dashboard::{ContractsConfig, ContractsDashboard};
//! use medellin_dashboards::data::FilterSelection;
//!
//! let dashboard = ContractsDashboard::new(ContractsConfig::default());
//! let view = dashboard.render("data/medellin_20250911.csv", &FilterSelection::new())?;
//! println!("{} contracts, most common type: {}", view.table.height(), view.most_common_type.value);
//! # Ok::<(), medellin_dashboards::dashboard::PageError>(())
//! ```

pub mod dashboard;
pub mod data;
pub mod stats;

pub use dashboard::{
    AccidentsConfig, AccidentsDashboard, AccidentsView, ChartData, ContractsConfig,
    ContractsDashboard, ContractsView, PageError, PageWarning, TableOverview,
};
pub use data::{
    DataLoader, DataProcessor, Directive, FilterSelection, LoadOptions, LoaderError, RowFilter,
    TypeNormalizer,
};
pub use stats::{AggregateKind, Aggregator, GroupedTable, ModeSummary, Summarizer, NO_DATA};

//! Stats module - Aggregation, summaries and descriptive statistics

mod aggregator;
mod calculator;
mod summarizer;

pub use aggregator::{AggregateError, AggregateKind, Aggregator, GroupRow, GroupedTable};
pub use calculator::{NumericSummary, StatsCalculator};
pub use summarizer::{ModeSummary, Summarizer, NO_DATA};

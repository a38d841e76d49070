//! Data module - CSV loading, type normalization and row filtering

mod cache;
mod loader;
mod normalizer;
mod processor;

pub use cache::{content_digest, LoadedTable, TableCache, ViewMemo, DEFAULT_MEMO_CAPACITY};
pub use loader::{column_names, DataLoader, LoadOptions, LoaderError};
pub use normalizer::{
    coerce_integer, coerce_number, coerce_timestamp, normalize_text, CoercionFailure,
    CoercionReport, Directive, NormalizeError, Normalized, NumberFormat, TargetType, TextCase,
    TypeNormalizer,
};
pub(crate) use normalizer::is_numeric;
pub use processor::{DataProcessor, FilterSelection, ProcessorError, RowFilter};

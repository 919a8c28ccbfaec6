//! Filter, aggregate and export pipeline for tabular dashboards.
//!
//! A dataset is loaded once per source (see [`DatasetLoader`]), then every
//! interaction calls [`recompute`] with the current [`FilterState`] to get the
//! filtered view, its KPIs and chart-ready aggregates.

pub mod aggregate;
pub mod cache;
pub mod clean;
pub mod config;
pub mod dataset;
pub mod describe;
pub mod error;
pub mod error_display;
pub mod estimator;
pub mod export;
pub mod filter;
pub mod histogram;
pub mod kpi;
pub mod loader;
pub mod persist;
pub mod pipeline;
pub mod schema;
pub mod source;
pub mod view;

/// Application name used for config and data directories
pub const APP_NAME: &str = "dashpipe";

pub use dashpipe_cli::{Args, CompressionFormat, FileFormat};

pub use aggregate::{
    aggregate, AggregateResult, AggregateRow, ChartKind, CrossTab, GroupKey, GroupOrder,
    GroupSpec, KeyValue, TimeBucket,
};
pub use cache::{CacheKey, DatasetCache};
pub use clean::{clean, run_clean_job, CleanReport, CleanStep, CleaningRules};
pub use config::{AppConfig, ConfigManager};
pub use dataset::{Dataset, FilterDomain};
pub use describe::{describe, ColumnSummary};
pub use error::{PipelineError, Result};
pub use estimator::{Estimate, EstimatorSpec, LinearFit};
pub use export::{
    resolve_export_path, to_csv_bytes, write_export, ExportOptions, ExportSnapshot,
};
pub use filter::{compose, FilterState, Selection};
pub use histogram::{Histogram, HistogramBin, HistogramSpec};
pub use kpi::{AggFunc, Kpi, KpiFormat, KpiSpec};
pub use loader::DatasetLoader;
pub use persist::{save_view, ParquetTableStore, SaveReport, TableStore};
pub use pipeline::{recompute, DashboardSpec, Figure, FigureData, Outcome, Recomputed};
pub use schema::{ColumnKind, ColumnSpec, SchemaDescriptor};
pub use source::{table_key, CsvOptions, DataSource, FileSource, SourceHandle, TableSource};
pub use view::{FilteredView, Preview};

//! Error types for the pipeline.
//!
//! `DataUnavailable` aborts a recompute, `InsufficientData` is scoped to the
//! single figure that needed more rows, and `PersistenceFailure` leaves the
//! in-memory view untouched so the save can be retried. `ExportFailure` is
//! likewise local to the export that failed.

use polars::prelude::PolarsError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    /// Source missing, unreadable, malformed, or not matching the schema hint
    #[error("Load failed for {source_name}: {message}")]
    DataUnavailable {
        source_name: String,
        message: String,
    },

    /// Too few usable rows for a statistical operation
    #[error("{operation}: needs at least {required} rows, found {available}")]
    InsufficientData {
        operation: String,
        required: usize,
        available: usize,
    },

    /// Writing the view back to a table failed
    #[error("Save to table '{table}' failed: {message}")]
    PersistenceFailure { table: String, message: String },

    /// Writing an exported view to disk failed
    #[error("Export to {path} failed: {message}")]
    ExportFailure { path: String, message: String },

    /// A filter or grouping referenced a column that is not declared with a usable kind
    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    /// Engine error while recomputing a view or aggregate
    #[error("Recompute failed: {}", crate::error_display::user_message_from_polars(.0))]
    Polars(#[from] PolarsError),
}

impl PipelineError {
    pub fn data_unavailable(source_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::DataUnavailable {
            source_name: source_name.into(),
            message: message.into(),
        }
    }

    pub fn persistence(table: impl Into<String>, message: impl Into<String>) -> Self {
        Self::PersistenceFailure {
            table: table.into(),
            message: message.into(),
        }
    }

    pub fn export(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ExportFailure {
            path: path.into(),
            message: message.into(),
        }
    }

    /// True for the errors that must halt the whole recompute pass.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::DataUnavailable { .. } | Self::Polars(_))
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;

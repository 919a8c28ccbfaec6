//! Schema descriptor: which columns are temporal, categorical or numeric.
//!
//! The descriptor is validated once when a dataset is loaded. After
//! [`SchemaDescriptor::conform`] succeeds every declared temporal column is a
//! `Date` or `Datetime`, every categorical column is a `String` and every
//! numeric column is `Float64`, so filters and aggregations never need to
//! re-inspect types.

use chrono::{Datelike, NaiveDate};
use polars::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnKind {
    Temporal,
    Categorical,
    Numeric,
}

impl ColumnKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnKind::Temporal => "temporal",
            ColumnKind::Categorical => "categorical",
            ColumnKind::Numeric => "numeric",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    pub kind: ColumnKind,
    /// strptime format used when a temporal column arrives as text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SchemaDescriptor {
    columns: Vec<ColumnSpec>,
}

impl SchemaDescriptor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn temporal(self, name: &str) -> Self {
        self.with(name, ColumnKind::Temporal, None)
    }

    pub fn temporal_with_format(self, name: &str, format: &str) -> Self {
        self.with(name, ColumnKind::Temporal, Some(format.to_string()))
    }

    pub fn categorical(self, name: &str) -> Self {
        self.with(name, ColumnKind::Categorical, None)
    }

    pub fn numeric(self, name: &str) -> Self {
        self.with(name, ColumnKind::Numeric, None)
    }

    fn with(mut self, name: &str, kind: ColumnKind, format: Option<String>) -> Self {
        // Redeclaring a column replaces the earlier declaration
        self.columns.retain(|c| c.name != name);
        self.columns.push(ColumnSpec {
            name: name.to_string(),
            kind,
            format,
        });
        self
    }

    pub fn columns(&self) -> &[ColumnSpec] {
        &self.columns
    }

    pub fn kind_of(&self, name: &str) -> Option<ColumnKind> {
        self.columns.iter().find(|c| c.name == name).map(|c| c.kind)
    }

    pub fn names_of(&self, kind: ColumnKind) -> impl Iterator<Item = &str> {
        self.columns
            .iter()
            .filter(move |c| c.kind == kind)
            .map(|c| c.name.as_str())
    }

    /// Fails with `InvalidFilter` unless `name` is declared as `kind`.
    pub fn require(&self, name: &str, kind: ColumnKind) -> Result<()> {
        match self.kind_of(name) {
            Some(k) if k == kind => Ok(()),
            Some(k) => Err(PipelineError::InvalidFilter(format!(
                "column '{}' is {}, expected {}",
                name,
                k.as_str(),
                kind.as_str()
            ))),
            None => Err(PipelineError::InvalidFilter(format!(
                "column '{}' is not declared in the schema",
                name
            ))),
        }
    }

    /// Validate `df` against the descriptor and normalize declared column types.
    ///
    /// Undeclared columns pass through untouched. Any missing column or failed
    /// conversion is reported as `DataUnavailable` for `source_name`.
    pub fn conform(&self, df: DataFrame, source_name: &str) -> Result<DataFrame> {
        let schema = df.schema().clone();
        let mut exprs = Vec::new();

        for spec in &self.columns {
            let name = spec.name.as_str();
            let dtype = schema.get(name).ok_or_else(|| {
                PipelineError::data_unavailable(
                    source_name,
                    format!("missing {} column '{}'", spec.kind.as_str(), name),
                )
            })?;

            let mismatch = || {
                PipelineError::data_unavailable(
                    source_name,
                    format!(
                        "column '{}' has type {} which cannot be used as {}",
                        name,
                        dtype,
                        spec.kind.as_str()
                    ),
                )
            };

            match spec.kind {
                ColumnKind::Temporal => match dtype {
                    DataType::Date | DataType::Datetime(_, _) => {}
                    DataType::String => exprs.push(parse_temporal(name, spec.format.as_deref())),
                    _ => return Err(mismatch()),
                },
                ColumnKind::Categorical => {
                    if !matches!(dtype, DataType::String) {
                        if !(dtype.is_numeric() || matches!(dtype, DataType::Boolean)) {
                            return Err(mismatch());
                        }
                        exprs.push(col(name).cast(DataType::String));
                    }
                }
                ColumnKind::Numeric => {
                    if !dtype.is_numeric() {
                        return Err(mismatch());
                    }
                    if !matches!(dtype, DataType::Float64) {
                        exprs.push(col(name).cast(DataType::Float64));
                    }
                }
            }
        }

        if exprs.is_empty() {
            return Ok(df);
        }

        df.lazy().with_columns(exprs).collect().map_err(|e| {
            PipelineError::data_unavailable(
                source_name,
                crate::error_display::user_message_from_polars(&e),
            )
        })
    }
}

/// Parse a text column into `Date` (date-only format) or `Datetime`.
fn parse_temporal(name: &str, format: Option<&str>) -> Expr {
    let opts = StrptimeOptions {
        format: format.map(Into::into),
        strict: true,
        ..Default::default()
    };
    match format {
        Some(f) if !has_time_component(f) => col(name).str().to_date(opts),
        _ => col(name).str().to_datetime(
            Some(TimeUnit::Microseconds),
            None,
            opts,
            lit("raise"),
        ),
    }
}

fn has_time_component(format: &str) -> bool {
    ["%H", "%M", "%S", "%T", "%R", "%I", "%p", "%s", "%c"]
        .iter()
        .any(|spec| format.contains(spec))
}

/// Expression yielding the calendar day of a conformed temporal column as
/// days since the Unix epoch.
pub(crate) fn day_number_expr(name: &str, dtype: &DataType) -> Expr {
    match dtype {
        DataType::Datetime(_, _) => col(name).cast(DataType::Date).cast(DataType::Int32),
        _ => col(name).cast(DataType::Int32),
    }
}

const UNIX_EPOCH_CE_DAYS: i32 = 719_163;

/// Days since the Unix epoch (the physical representation of a polars `Date`).
pub(crate) fn days_from_date(date: NaiveDate) -> i32 {
    date.num_days_from_ce() - UNIX_EPOCH_CE_DAYS
}

pub(crate) fn date_from_days(days: i32) -> Option<NaiveDate> {
    NaiveDate::from_num_days_from_ce_opt(UNIX_EPOCH_CE_DAYS.checked_add(days)?)
}

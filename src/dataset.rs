//! The loaded, immutable dataset and the filter domain observed in it.

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use polars::prelude::*;
use serde::Serialize;

use crate::error::Result;
use crate::schema::{date_from_days, day_number_expr, ColumnKind, SchemaDescriptor};

/// Observed value range of every filterable column, captured at load time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FilterDomain {
    /// Earliest and latest calendar day per temporal column. Columns with no
    /// non-null values are absent.
    pub dates: BTreeMap<String, (NaiveDate, NaiveDate)>,
    /// Sorted distinct values per categorical column (nulls excluded).
    pub categories: BTreeMap<String, BTreeSet<String>>,
}

impl FilterDomain {
    fn observe(frame: &DataFrame, schema: &SchemaDescriptor) -> Result<Self> {
        let mut domain = FilterDomain::default();

        for name in schema.names_of(ColumnKind::Temporal) {
            let Some(dtype) = frame.schema().get(name).cloned() else {
                continue;
            };
            let days = frame
                .clone()
                .lazy()
                .select([day_number_expr(name, &dtype).alias(name)])
                .collect()?;
            let days = days.column(name)?.i32()?;
            if let (Some(lo), Some(hi)) = (days.min(), days.max()) {
                if let (Some(lo), Some(hi)) = (date_from_days(lo), date_from_days(hi)) {
                    domain.dates.insert(name.to_string(), (lo, hi));
                }
            }
        }

        for name in schema.names_of(ColumnKind::Categorical) {
            let values: BTreeSet<String> = frame
                .column(name)?
                .str()?
                .into_iter()
                .flatten()
                .map(str::to_string)
                .collect();
            domain.categories.insert(name.to_string(), values);
        }

        Ok(domain)
    }

    pub fn date_bounds(&self, column: &str) -> Option<(NaiveDate, NaiveDate)> {
        self.dates.get(column).copied()
    }

    pub fn categories(&self, column: &str) -> Option<&BTreeSet<String>> {
        self.categories.get(column)
    }
}

/// A fully materialized dataset. Never mutated after construction; filtering
/// always produces a new [`crate::view::FilteredView`].
#[derive(Debug, Clone)]
pub struct Dataset {
    frame: DataFrame,
    schema: SchemaDescriptor,
    source: String,
    domain: FilterDomain,
}

impl Dataset {
    /// Conform `frame` to `schema` and capture the filter domain.
    pub fn new(frame: DataFrame, schema: SchemaDescriptor, source: impl Into<String>) -> Result<Self> {
        let source = source.into();
        let frame = schema.conform(frame, &source)?;
        let domain = FilterDomain::observe(&frame, &schema)?;
        Ok(Self {
            frame,
            schema,
            source,
            domain,
        })
    }

    pub fn frame(&self) -> &DataFrame {
        &self.frame
    }

    pub fn schema(&self) -> &SchemaDescriptor {
        &self.schema
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn domain(&self) -> &FilterDomain {
        &self.domain
    }

    pub fn height(&self) -> usize {
        self.frame.height()
    }

    pub fn column_names(&self) -> Vec<String> {
        self.frame
            .get_column_names()
            .iter()
            .map(|s| s.to_string())
            .collect()
    }
}

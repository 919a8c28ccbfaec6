//! Filter state and the predicate composer.
//!
//! A [`FilterState`] maps a dimension (column) name to a [`Selection`]. The
//! state is owned by the interaction layer; the pipeline only reads it and
//! turns it into one boolean polars expression with [`compose`].

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use polars::prelude::*;
use serde::{Deserialize, Serialize};

use crate::dataset::{Dataset, FilterDomain};
use crate::error::{PipelineError, Result};
use crate::schema::{day_number_expr, days_from_date, ColumnKind};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Selection {
    /// Inclusive closed interval of calendar days.
    DateRange { start: NaiveDate, end: NaiveDate },
    /// Rows whose value is one of these members. An empty set matches nothing.
    Members(BTreeSet<String>),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterState {
    selections: BTreeMap<String, Selection>,
}

impl FilterState {
    /// A state with no active predicates.
    pub fn new() -> Self {
        Self::default()
    }

    /// The default dashboard state: the full observed date range and every
    /// observed category selected.
    pub fn unfiltered(domain: &FilterDomain) -> Self {
        let mut state = Self::new();
        for (name, (start, end)) in &domain.dates {
            state.set_date_range(name, *start, *end);
        }
        for (name, members) in &domain.categories {
            state.select(name, members.iter().cloned());
        }
        state
    }

    pub fn set_date_range(&mut self, column: &str, start: NaiveDate, end: NaiveDate) -> &mut Self {
        self.selections
            .insert(column.to_string(), Selection::DateRange { start, end });
        self
    }

    pub fn select<I, S>(&mut self, column: &str, members: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let members = members.into_iter().map(Into::into).collect();
        self.selections
            .insert(column.to_string(), Selection::Members(members));
        self
    }

    pub fn clear_dimension(&mut self, column: &str) -> Option<Selection> {
        self.selections.remove(column)
    }

    pub fn get(&self, column: &str) -> Option<&Selection> {
        self.selections.get(column)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Selection)> {
        self.selections.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn is_empty(&self) -> bool {
        self.selections.is_empty()
    }

    /// Restrict every selection to values observed in `domain`.
    ///
    /// Date ranges are clamped to the observed min/max, members absent from
    /// the data are dropped. Dimensions the domain does not know are kept so
    /// that [`compose`] can report them.
    pub fn conform(&mut self, domain: &FilterDomain) {
        for (name, selection) in self.selections.iter_mut() {
            match selection {
                Selection::DateRange { start, end } => {
                    if let Some((lo, hi)) = domain.date_bounds(name) {
                        *start = (*start).max(lo);
                        *end = (*end).min(hi);
                    }
                }
                Selection::Members(members) => {
                    if let Some(observed) = domain.categories(name) {
                        members.retain(|m| observed.contains(m));
                    }
                }
            }
        }
    }
}

/// Build the conjunction of every active selection in `state`.
///
/// An empty state yields `lit(true)`. A date range whose start is after its
/// end, or an empty member set, yields `lit(false)` for that dimension. Rows
/// with a null in a filtered dimension never pass.
pub fn compose(state: &FilterState, dataset: &Dataset) -> Result<Expr> {
    let frame_schema = dataset.frame().schema();
    let mut predicate: Option<Expr> = None;

    for (name, selection) in state.iter() {
        let expr = match selection {
            Selection::DateRange { start, end } => {
                dataset.schema().require(name, ColumnKind::Temporal)?;
                let dtype = frame_schema.get(name).ok_or_else(|| {
                    PipelineError::InvalidFilter(format!("column '{}' is not loaded", name))
                })?;
                if start > end {
                    lit(false)
                } else {
                    let day = day_number_expr(name, dtype);
                    day.clone()
                        .gt_eq(lit(days_from_date(*start)))
                        .and(day.lt_eq(lit(days_from_date(*end))))
                }
            }
            Selection::Members(members) => {
                dataset.schema().require(name, ColumnKind::Categorical)?;
                members
                    .iter()
                    .map(|m| col(name).eq(lit(m.clone())))
                    .reduce(|acc, e| acc.or(e))
                    .unwrap_or_else(|| lit(false))
            }
        };
        predicate = Some(match predicate {
            Some(p) => p.and(expr),
            None => expr,
        });
    }

    Ok(predicate.unwrap_or_else(|| lit(true)))
}

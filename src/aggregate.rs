//! Grouped aggregation of a filtered view into chart-ready shapes.
//!
//! Grouping runs in polars; the (small) grouped result is then pulled into
//! plain Rust rows so ordering and pivoting are deterministic and every value
//! is either a finite number or `None`.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::NaiveDate;
use polars::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};
use crate::kpi::AggFunc;
use crate::schema::{date_from_days, day_number_expr, ColumnKind};
use crate::view::FilteredView;

const VALUE_COLUMN: &str = "__value";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeBucket {
    Day,
    /// ISO week, keyed by its Monday
    Week,
    /// Keyed by the first day of the month
    Month,
    /// 0..=23, datetime columns only
    HourOfDay,
    /// 0 = Monday .. 6 = Sunday
    Weekday,
}

impl TimeBucket {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeBucket::Day => "day",
            TimeBucket::Week => "week",
            TimeBucket::Month => "month",
            TimeBucket::HourOfDay => "hour_of_day",
            TimeBucket::Weekday => "weekday",
        }
    }

    fn yields_date(&self) -> bool {
        matches!(self, TimeBucket::Day | TimeBucket::Week | TimeBucket::Month)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupKey {
    pub column: String,
    /// Required shape for temporal columns; a temporal key without one is
    /// grouped by day. Not allowed on categorical columns.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bucket: Option<TimeBucket>,
}

impl GroupKey {
    pub fn column(name: &str) -> Self {
        Self {
            column: name.to_string(),
            bucket: None,
        }
    }

    pub fn bucketed(name: &str, bucket: TimeBucket) -> Self {
        Self {
            column: name.to_string(),
            bucket: Some(bucket),
        }
    }

    pub fn label(&self) -> String {
        match self.bucket {
            Some(b) => format!("{}_{}", self.column, b.as_str()),
            None => self.column.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartKind {
    Line,
    Bar,
    HeatMap,
    /// Binned counts of one column, declared with a `HistogramSpec`
    Histogram,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupOrder {
    #[default]
    KeyAscending,
    /// Largest value first, ties broken by key; `None` values last
    ValueDescending,
}

/// One requested grouping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupSpec {
    pub name: String,
    pub chart: ChartKind,
    pub keys: Vec<GroupKey>,
    pub value: String,
    pub func: AggFunc,
    #[serde(default)]
    pub order: GroupOrder,
}

/// A group key value. Variant order doubles as sort order, so `Null` sorts last.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(untagged)]
pub enum KeyValue {
    Text(String),
    Date(NaiveDate),
    Int(i64),
    Null,
}

impl fmt::Display for KeyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyValue::Text(s) => write!(f, "{}", s),
            KeyValue::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            KeyValue::Int(n) => write!(f, "{}", n),
            KeyValue::Null => write!(f, "(null)"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateRow {
    pub keys: Vec<KeyValue>,
    pub value: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateResult {
    pub key_names: Vec<String>,
    pub func: AggFunc,
    pub rows: Vec<AggregateRow>,
}

impl AggregateResult {
    /// Sum of all defined values.
    pub fn total(&self) -> f64 {
        self.rows.iter().filter_map(|r| r.value).sum()
    }

    pub fn get(&self, keys: &[KeyValue]) -> Option<f64> {
        self.rows
            .iter()
            .find(|r| r.keys == keys)
            .and_then(|r| r.value)
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[derive(Clone, Copy)]
enum KeyShape {
    Text,
    Date,
    Int,
}

fn key_expr(view: &FilteredView, key: &GroupKey) -> Result<(Expr, KeyShape)> {
    let name = key.column.as_str();
    let alias = key.label();
    let kind = view.schema().kind_of(name).ok_or_else(|| {
        PipelineError::InvalidFilter(format!("group key '{}' is not declared in the schema", name))
    })?;

    match (kind, key.bucket) {
        (ColumnKind::Categorical, None) => Ok((col(name).alias(alias.as_str()), KeyShape::Text)),
        (ColumnKind::Categorical, Some(b)) => Err(PipelineError::InvalidFilter(format!(
            "cannot bucket categorical column '{}' by {}",
            name,
            b.as_str()
        ))),
        (ColumnKind::Numeric, _) => Err(PipelineError::InvalidFilter(format!(
            "numeric column '{}' cannot be a group key",
            name
        ))),
        (ColumnKind::Temporal, bucket) => {
            let bucket = bucket.unwrap_or(TimeBucket::Day);
            let dtype = view.frame().schema().get(name).cloned().ok_or_else(|| {
                PipelineError::InvalidFilter(format!("column '{}' is not loaded", name))
            })?;
            let day = day_number_expr(name, &dtype);
            let weekday = col(name).dt().weekday().cast(DataType::Int32);
            let expr = match bucket {
                TimeBucket::Day => day,
                TimeBucket::Week => day - (weekday - lit(1)),
                TimeBucket::Month => {
                    day - (col(name).dt().day().cast(DataType::Int32) - lit(1))
                }
                TimeBucket::HourOfDay => {
                    if !matches!(dtype, DataType::Datetime(_, _)) {
                        return Err(PipelineError::InvalidFilter(format!(
                            "hour_of_day needs a datetime column, '{}' holds dates",
                            name
                        )));
                    }
                    col(name).dt().hour().cast(DataType::Int32)
                }
                TimeBucket::Weekday => weekday - lit(1),
            };
            let shape = if bucket.yields_date() {
                KeyShape::Date
            } else {
                KeyShape::Int
            };
            Ok((expr.alias(alias.as_str()), shape))
        }
    }
}

fn value_expr(view: &FilteredView, spec: &GroupSpec) -> Result<Expr> {
    let value = spec.value.as_str();
    let expr = match spec.func {
        AggFunc::Count => col(value).count(),
        AggFunc::Sum => {
            view.schema().require(value, ColumnKind::Numeric)?;
            col(value).sum()
        }
        AggFunc::Mean => {
            view.schema().require(value, ColumnKind::Numeric)?;
            col(value).mean()
        }
    };
    Ok(expr.cast(DataType::Float64).alias(VALUE_COLUMN))
}

fn key_values(frame: &DataFrame, name: &str, shape: KeyShape) -> Result<Vec<KeyValue>> {
    let column = frame.column(name)?;
    let values = match shape {
        KeyShape::Text => column
            .str()?
            .into_iter()
            .map(|v| v.map_or(KeyValue::Null, |s| KeyValue::Text(s.to_string())))
            .collect(),
        KeyShape::Date => column
            .i32()?
            .into_iter()
            .map(|v| v.and_then(date_from_days).map_or(KeyValue::Null, KeyValue::Date))
            .collect(),
        KeyShape::Int => column
            .i32()?
            .into_iter()
            .map(|v| v.map_or(KeyValue::Null, |n| KeyValue::Int(n as i64)))
            .collect(),
    };
    Ok(values)
}

/// Group `view` by `spec.keys` and aggregate `spec.value` with `spec.func`.
///
/// Sum and count of a group with only null values are 0; the mean of such a
/// group is `None`.
pub fn aggregate(view: &FilteredView, spec: &GroupSpec) -> Result<AggregateResult> {
    if spec.keys.is_empty() {
        return Err(PipelineError::InvalidFilter(format!(
            "grouping '{}' has no keys",
            spec.name
        )));
    }

    let mut key_exprs = Vec::with_capacity(spec.keys.len());
    let mut shapes = Vec::with_capacity(spec.keys.len());
    for key in &spec.keys {
        let (expr, shape) = key_expr(view, key)?;
        key_exprs.push(expr);
        shapes.push(shape);
    }

    let grouped = view
        .frame()
        .clone()
        .lazy()
        .group_by(key_exprs)
        .agg([value_expr(view, spec)?])
        .collect()?;

    let key_names: Vec<String> = spec.keys.iter().map(GroupKey::label).collect();
    let mut columns = Vec::with_capacity(key_names.len());
    for (name, shape) in key_names.iter().zip(shapes) {
        columns.push(key_values(&grouped, name, shape)?);
    }
    let values: Vec<Option<f64>> = grouped
        .column(VALUE_COLUMN)?
        .f64()?
        .into_iter()
        .map(|v| v.filter(|x| x.is_finite()))
        .collect();

    let mut rows: Vec<AggregateRow> = values
        .into_iter()
        .enumerate()
        .map(|(i, value)| AggregateRow {
            keys: columns.iter().map(|c| c[i].clone()).collect(),
            value,
        })
        .collect();

    match spec.order {
        GroupOrder::KeyAscending => rows.sort_by(|a, b| a.keys.cmp(&b.keys)),
        GroupOrder::ValueDescending => rows.sort_by(|a, b| {
            let by_value = match (a.value, b.value) {
                (Some(x), Some(y)) => y.partial_cmp(&x).unwrap_or(Ordering::Equal),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            };
            by_value.then_with(|| a.keys.cmp(&b.keys))
        }),
    }

    tracing::debug!(grouping = %spec.name, groups = rows.len(), "aggregated");
    Ok(AggregateResult {
        key_names,
        func: spec.func,
        rows,
    })
}

/// Dense two-key grid, e.g. hour of day by weekday.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CrossTab {
    pub row_key: String,
    pub column_key: String,
    pub rows: Vec<KeyValue>,
    pub columns: Vec<KeyValue>,
    /// `cells[r][c]`; a combination with no rows holds the function's empty value
    pub cells: Vec<Vec<Option<f64>>>,
}

impl CrossTab {
    pub fn from_result(result: &AggregateResult) -> Result<Self> {
        if result.key_names.len() != 2 {
            return Err(PipelineError::InvalidFilter(format!(
                "a cross-tabulation needs exactly two keys, got {}",
                result.key_names.len()
            )));
        }

        let mut lookup: BTreeMap<(&KeyValue, &KeyValue), Option<f64>> = BTreeMap::new();
        let mut rows = BTreeSet::new();
        let mut columns = BTreeSet::new();
        for row in &result.rows {
            rows.insert(row.keys[0].clone());
            columns.insert(row.keys[1].clone());
            lookup.insert((&row.keys[0], &row.keys[1]), row.value);
        }

        let empty = result.func.empty_value();
        let rows: Vec<KeyValue> = rows.into_iter().collect();
        let columns: Vec<KeyValue> = columns.into_iter().collect();
        let cells = rows
            .iter()
            .map(|r| {
                columns
                    .iter()
                    .map(|c| lookup.get(&(r, c)).copied().unwrap_or(empty))
                    .collect()
            })
            .collect();

        Ok(Self {
            row_key: result.key_names[0].clone(),
            column_key: result.key_names[1].clone(),
            rows,
            columns,
            cells,
        })
    }

    pub fn cell(&self, row: &KeyValue, column: &KeyValue) -> Option<f64> {
        let r = self.rows.iter().position(|k| k == row)?;
        let c = self.columns.iter().position(|k| k == column)?;
        self.cells[r][c]
    }
}

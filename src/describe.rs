//! Summary statistics (count, mean, std, quartiles) of a view's numeric columns.

use polars::polars_compute::rolling::QuantileMethod;
use polars::prelude::*;
use serde::Serialize;

use crate::error::Result;
use crate::schema::ColumnKind;
use crate::view::FilteredView;

/// Statistics of one numeric column. Every value except the counts is `None`
/// when the column has no non-null values; `std` is also `None` with one value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnSummary {
    pub column: String,
    pub count: usize,
    pub null_count: usize,
    pub mean: Option<f64>,
    pub std: Option<f64>,
    pub min: Option<f64>,
    pub q25: Option<f64>,
    pub median: Option<f64>,
    pub q75: Option<f64>,
    pub max: Option<f64>,
}

const STATS: [&str; 7] = ["mean", "std", "min", "q25", "median", "q75", "max"];

fn stat_name(column: &str, stat: &str) -> String {
    format!("{}::{}", column, stat)
}

fn describe_exprs(column: &str) -> Vec<Expr> {
    let c = col(column);
    let quantile = |q: f64| c.clone().quantile(lit(q), QuantileMethod::Linear);
    vec![
        c.clone().mean(),
        c.clone().std(1),
        c.clone().min(),
        quantile(0.25),
        quantile(0.5),
        quantile(0.75),
        c.clone().max(),
    ]
    .into_iter()
    .zip(STATS)
    .map(|(expr, stat)| expr.cast(DataType::Float64).alias(stat_name(column, stat)))
    .collect()
}

fn read_stat(row: &DataFrame, column: &str, stat: &str) -> Result<Option<f64>> {
    let value = row.column(&stat_name(column, stat))?.f64()?.get(0);
    Ok(value.filter(|v| v.is_finite()))
}

/// Describe every numeric column of `view`, in schema order.
///
/// All statistics come from one aggregation pass over the view. Quartiles use
/// linear interpolation between the closest ranks.
pub fn describe(view: &FilteredView) -> Result<Vec<ColumnSummary>> {
    let columns: Vec<&str> = view.schema().names_of(ColumnKind::Numeric).collect();
    if columns.is_empty() {
        return Ok(Vec::new());
    }

    let exprs: Vec<Expr> = columns.iter().flat_map(|c| describe_exprs(c)).collect();
    let row = view.frame().clone().lazy().select(exprs).collect()?;

    columns
        .iter()
        .map(|&name| {
            let column = view.frame().column(name)?;
            let null_count = column.null_count();
            Ok(ColumnSummary {
                column: name.to_string(),
                count: column.len() - null_count,
                null_count,
                mean: read_stat(&row, name, "mean")?,
                std: read_stat(&row, name, "std")?,
                min: read_stat(&row, name, "min")?,
                q25: read_stat(&row, name, "q25")?,
                median: read_stat(&row, name, "median")?,
                q75: read_stat(&row, name, "q75")?,
                max: read_stat(&row, name, "max")?,
            })
        })
        .collect()
}

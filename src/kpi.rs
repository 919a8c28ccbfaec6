//! Scalar KPIs over a filtered view.

use polars::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::schema::ColumnKind;
use crate::view::FilteredView;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggFunc {
    Sum,
    Mean,
    Count,
}

impl AggFunc {
    pub fn as_str(&self) -> &'static str {
        match self {
            AggFunc::Sum => "sum",
            AggFunc::Mean => "mean",
            AggFunc::Count => "count",
        }
    }

    /// Value of this function over a group with no rows.
    pub fn empty_value(&self) -> Option<f64> {
        match self {
            AggFunc::Sum | AggFunc::Count => Some(0.0),
            AggFunc::Mean => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KpiFormat {
    Currency,
    Integer,
    #[default]
    Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KpiSpec {
    pub label: String,
    pub column: String,
    pub func: AggFunc,
    #[serde(default)]
    pub format: KpiFormat,
    /// Digits after the decimal point when displayed
    #[serde(default)]
    pub decimals: u8,
}

impl KpiSpec {
    pub fn new(label: &str, column: &str, func: AggFunc) -> Self {
        Self {
            label: label.to_string(),
            column: column.to_string(),
            func,
            format: KpiFormat::Decimal,
            decimals: 0,
        }
    }

    pub fn formatted(mut self, format: KpiFormat, decimals: u8) -> Self {
        self.format = format;
        self.decimals = decimals;
        self
    }

    /// Evaluate over `view`. `Count` counts non-null values of the column.
    pub fn compute(&self, view: &FilteredView) -> Result<Kpi> {
        let column = view.frame().column(&self.column)?;
        let value = match self.func {
            AggFunc::Count => Some((column.len() - column.null_count()) as f64),
            AggFunc::Sum | AggFunc::Mean => {
                view.schema().require(&self.column, ColumnKind::Numeric)?;
                let values = column.f64()?;
                match self.func {
                    AggFunc::Sum => Some(values.sum().unwrap_or(0.0)),
                    _ => values.mean(),
                }
            }
        };
        Ok(Kpi {
            label: self.label.clone(),
            value: value.filter(|v| v.is_finite()),
            format: self.format,
            decimals: self.decimals,
        })
    }
}

/// A computed KPI. `value` is `None` when it is undefined (mean of nothing).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Kpi {
    pub label: String,
    pub value: Option<f64>,
    #[serde(skip)]
    pub format: KpiFormat,
    #[serde(skip)]
    pub decimals: u8,
}

impl Kpi {
    pub fn display(&self) -> String {
        let Some(value) = self.value else {
            return "n/a".to_string();
        };
        match self.format {
            KpiFormat::Currency => {
                let digits = group_thousands(value.abs(), self.decimals);
                if value < 0.0 && digits.chars().any(|c| c.is_ascii_digit() && c != '0') {
                    format!("-${}", digits)
                } else {
                    format!("${}", digits)
                }
            }
            KpiFormat::Integer => signed(value, 0),
            KpiFormat::Decimal => signed(value, self.decimals),
        }
    }
}

fn signed(value: f64, decimals: u8) -> String {
    let digits = group_thousands(value.abs(), decimals);
    if value < 0.0 && digits.chars().any(|c| c.is_ascii_digit() && c != '0') {
        format!("-{}", digits)
    } else {
        digits
    }
}

/// `1234567.891` with 2 decimals -> `1,234,567.89`
fn group_thousands(value: f64, decimals: u8) -> String {
    let text = format!("{:.*}", decimals as usize, value);
    let (int_part, frac_part) = match text.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (text.as_str(), None),
    };
    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, c) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    match frac_part {
        Some(f) => format!("{}.{}", grouped, f),
        None => grouped,
    }
}

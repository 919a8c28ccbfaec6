//! Batch cleaning: apply column rules to a raw file and write Parquet.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use color_eyre::eyre::eyre;
use polars::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};
use crate::error_display::{user_message_from_polars, user_message_from_write_io};
use crate::source::DataSource;

/// One cleaning step, applied in order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum CleanStep {
    /// Trim, then replace each label with its numeric code. Unmapped labels become null.
    Map {
        column: String,
        values: BTreeMap<String, f64>,
    },
    /// `(x - offset) / scale`
    Rescale {
        column: String,
        offset: f64,
        scale: f64,
    },
    /// Remove spaces (thousands separators such as `12 500`) and parse as a number.
    ParseNumber { column: String },
    /// Replace nulls with the column median.
    FillMedian { column: String },
}

impl CleanStep {
    pub fn column(&self) -> &str {
        match self {
            CleanStep::Map { column, .. }
            | CleanStep::Rescale { column, .. }
            | CleanStep::ParseNumber { column }
            | CleanStep::FillMedian { column } => column,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CleaningRules {
    #[serde(default)]
    pub steps: Vec<CleanStep>,
}

impl CleaningRules {
    pub fn from_file(path: &Path) -> color_eyre::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| eyre!("Failed to read cleaning rules at {}: {}", path.display(), e))?;
        let rules: Self = toml::from_str(&content)
            .map_err(|e| eyre!("Failed to parse cleaning rules at {}: {}", path.display(), e))?;
        for step in &rules.steps {
            if let CleanStep::Rescale { scale, column, .. } = step {
                if *scale == 0.0 {
                    return Err(eyre!("rescale of '{}' has a zero scale", column));
                }
            }
        }
        Ok(rules)
    }
}

fn bad_column(column: &str, message: impl Into<String>) -> PipelineError {
    PipelineError::data_unavailable(format!("column '{}'", column), message)
}

fn text_values(df: &DataFrame, column: &str) -> Result<Vec<Option<String>>> {
    let values = df.column(column)?.cast(&DataType::String)?;
    Ok(values
        .str()?
        .into_iter()
        .map(|v| v.map(str::to_string))
        .collect())
}

fn apply_step(mut df: DataFrame, step: &CleanStep) -> Result<DataFrame> {
    let name = step.column();
    if df.column(name).is_err() {
        return Err(bad_column(name, "not present in the input"));
    }

    match step {
        CleanStep::Map { values, .. } => {
            let mapped: Vec<Option<f64>> = text_values(&df, name)?
                .into_iter()
                .map(|v| v.and_then(|s| values.get(s.trim()).copied()))
                .collect();
            df.with_column(Series::new(name.into(), mapped))?;
            Ok(df)
        }
        CleanStep::Rescale { offset, scale, .. } => Ok(df
            .lazy()
            .with_column(
                ((col(name).cast(DataType::Float64) - lit(*offset)) / lit(*scale)).alias(name),
            )
            .collect()?),
        CleanStep::ParseNumber { .. } => {
            let mut parsed = Vec::with_capacity(df.height());
            for (row, value) in text_values(&df, name)?.into_iter().enumerate() {
                let number = match value {
                    None => None,
                    Some(s) => {
                        let compact: String = s.chars().filter(|c| !c.is_whitespace()).collect();
                        if compact.is_empty() {
                            None
                        } else {
                            Some(compact.parse::<f64>().map_err(|_| {
                                bad_column(name, format!("row {}: '{}' is not a number", row, s))
                            })?)
                        }
                    }
                };
                parsed.push(number);
            }
            df.with_column(Series::new(name.into(), parsed))?;
            Ok(df)
        }
        CleanStep::FillMedian { .. } => {
            let dtype = df.column(name)?.dtype().clone();
            if !dtype.is_numeric() {
                return Err(bad_column(
                    name,
                    format!("median fill needs a numeric column, found {}", dtype),
                ));
            }
            let values = col(name).cast(DataType::Float64);
            Ok(df
                .lazy()
                .with_column(values.clone().fill_null(values.median()).alias(name))
                .collect()?)
        }
    }
}

/// Apply `rules` to `df` in order.
pub fn clean(df: DataFrame, rules: &CleaningRules) -> Result<DataFrame> {
    rules.steps.iter().try_fold(df, apply_step)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanReport {
    pub rows: usize,
    pub columns: usize,
    pub output: PathBuf,
}

/// Read `source`, clean it and write the result to `output` as Parquet.
pub fn run_clean_job(
    source: &dyn DataSource,
    output: &Path,
    rules: &CleaningRules,
) -> Result<CleanReport> {
    let raw = source.read()?;
    let mut cleaned = clean(raw, rules)?;

    let target = output.display().to_string();
    let file = File::create(output)
        .map_err(|e| PipelineError::persistence(&target, user_message_from_write_io(&e)))?;
    let mut writer = BufWriter::new(file);
    ParquetWriter::new(&mut writer)
        .finish(&mut cleaned)
        .map_err(|e| PipelineError::persistence(&target, user_message_from_polars(&e)))?;
    writer
        .flush()
        .map_err(|e| PipelineError::persistence(&target, user_message_from_write_io(&e)))?;

    tracing::info!(
        source = %source.key(),
        output = %output.display(),
        rows = cleaned.height(),
        "cleaning job finished"
    );
    Ok(CleanReport {
        rows: cleaned.height(),
        columns: cleaned.width(),
        output: output.to_path_buf(),
    })
}

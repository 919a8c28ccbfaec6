//! Equal-width histograms of a numeric column.

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};
use crate::schema::ColumnKind;
use crate::view::FilteredView;

pub const DEFAULT_BINS: usize = 20;
pub const MIN_BINS: usize = 1;
pub const MAX_BINS: usize = 200;

fn default_bins() -> usize {
    DEFAULT_BINS
}

/// A histogram figure of one numeric column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistogramSpec {
    pub name: String,
    pub column: String,
    #[serde(default = "default_bins")]
    pub bins: usize,
}

impl HistogramSpec {
    pub fn new(name: &str, column: &str) -> Self {
        Self {
            name: name.to_string(),
            column: column.to_string(),
            bins: DEFAULT_BINS,
        }
    }

    pub fn with_bins(mut self, bins: usize) -> Self {
        self.bins = bins;
        self
    }
}

/// Half-open `[lower, upper)` interval; the last bin also holds `upper`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HistogramBin {
    pub lower: f64,
    pub upper: f64,
    pub count: usize,
}

impl HistogramBin {
    pub fn center(&self) -> f64 {
        (self.lower + self.upper) / 2.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Histogram {
    pub column: String,
    pub bins: Vec<HistogramBin>,
    /// Null or non-finite values left out of every bin
    pub skipped: usize,
}

impl Histogram {
    /// Bin the non-null values of `spec.column` in `view`.
    ///
    /// A column whose values are all equal gets a single bin. A column with no
    /// usable values gets no bins.
    pub fn compute(view: &FilteredView, spec: &HistogramSpec) -> Result<Self> {
        view.schema().require(&spec.column, ColumnKind::Numeric)?;
        if !(MIN_BINS..=MAX_BINS).contains(&spec.bins) {
            return Err(PipelineError::InvalidFilter(format!(
                "histogram '{}' needs between {} and {} bins, got {}",
                spec.name, MIN_BINS, MAX_BINS, spec.bins
            )));
        }

        let column = view.frame().column(&spec.column)?;
        let values: Vec<f64> = column
            .f64()?
            .into_iter()
            .flatten()
            .filter(|v| v.is_finite())
            .collect();
        let skipped = column.len() - values.len();

        Ok(Self {
            column: spec.column.clone(),
            bins: bin_values(&values, spec.bins),
            skipped,
        })
    }

    /// Number of values placed in a bin.
    pub fn total(&self) -> usize {
        self.bins.iter().map(|b| b.count).sum()
    }

    pub fn max_count(&self) -> usize {
        self.bins.iter().map(|b| b.count).max().unwrap_or(0)
    }
}

fn bin_values(values: &[f64], bins: usize) -> Vec<HistogramBin> {
    if values.is_empty() {
        return Vec::new();
    }
    let min = values.iter().fold(f64::INFINITY, |a, &b| a.min(b));
    let max = values.iter().fold(f64::NEG_INFINITY, |a, &b| a.max(b));
    let range = max - min;

    if range == 0.0 {
        return vec![HistogramBin {
            lower: min,
            upper: max,
            count: values.len(),
        }];
    }

    let width = range / bins as f64;
    let mut counts = vec![0usize; bins];
    for &v in values {
        let bin = (((v - min) / width) as usize).min(bins - 1);
        counts[bin] += 1;
    }

    counts
        .into_iter()
        .enumerate()
        .map(|(i, count)| HistogramBin {
            lower: min + width * i as f64,
            upper: if i + 1 == bins {
                max
            } else {
                min + width * (i + 1) as f64
            },
            count,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Dataset;
    use crate::filter::FilterState;
    use crate::schema::SchemaDescriptor;
    use polars::prelude::*;

    fn view(values: &[Option<f64>]) -> FilteredView {
        let df = df!("co" => values).unwrap();
        let ds = Dataset::new(df, SchemaDescriptor::new().numeric("co"), "memory").unwrap();
        FilteredView::apply(&ds, &FilterState::new()).unwrap()
    }

    #[test]
    fn test_equal_width_bins_include_the_maximum() {
        let bins = bin_values(&[0.0, 1.0, 2.5, 4.9, 5.0, 10.0], 2);
        assert_eq!(bins.len(), 2);
        assert_eq!((bins[0].lower, bins[0].upper), (0.0, 5.0));
        assert_eq!((bins[1].lower, bins[1].upper), (5.0, 10.0));
        assert_eq!(bins[0].count, 4);
        assert_eq!(bins[1].count, 2);
        assert_eq!(bins[1].center(), 7.5);
    }

    #[test]
    fn test_constant_column_has_one_bin() {
        let bins = bin_values(&[2.0, 2.0, 2.0], 10);
        assert_eq!(bins.len(), 1);
        assert_eq!(bins[0].count, 3);
        assert!(bin_values(&[], 10).is_empty());
    }

    #[test]
    fn test_nulls_are_skipped() {
        let v = view(&[Some(1.0), None, Some(3.0), Some(2.0)]);
        let hist = Histogram::compute(&v, &HistogramSpec::new("CO", "co").with_bins(4)).unwrap();
        assert_eq!(hist.bins.len(), 4);
        assert_eq!(hist.total(), 3);
        assert_eq!(hist.skipped, 1);
        assert_eq!(hist.max_count(), 1);
    }

    #[test]
    fn test_zero_bins_rejected() {
        let v = view(&[Some(1.0)]);
        assert!(matches!(
            Histogram::compute(&v, &HistogramSpec::new("CO", "co").with_bins(0)),
            Err(PipelineError::InvalidFilter(_))
        ));
    }

    #[test]
    fn test_bins_default_when_omitted() {
        let spec: HistogramSpec = toml::from_str(
            r#"
            name = "NO2 distribution"
            column = "NO2(GT)"
            "#,
        )
        .unwrap();
        assert_eq!(spec.bins, DEFAULT_BINS);
    }
}

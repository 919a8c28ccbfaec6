//! Ordinary least squares fit of one numeric column on another.
//!
//! Refit on every recompute; a fit is never stored across filter changes.

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};
use crate::schema::ColumnKind;
use crate::view::FilteredView;

const OPERATION: &str = "Linear fit";
const MIN_ROWS: usize = 2;

/// Which columns to fit and, optionally, the predictor value to estimate at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EstimatorSpec {
    pub predictor: String,
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub at: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LinearFit {
    slope: f64,
    intercept: f64,
    r_squared: Option<f64>,
    sample_size: usize,
}

impl LinearFit {
    /// Fit `target = slope * predictor + intercept` over rows where both are present.
    pub fn fit(view: &FilteredView, predictor: &str, target: &str) -> Result<Self> {
        view.schema().require(predictor, ColumnKind::Numeric)?;
        view.schema().require(target, ColumnKind::Numeric)?;

        let xs = view.frame().column(predictor)?.f64()?;
        let ys = view.frame().column(target)?.f64()?;
        let points: Vec<(f64, f64)> = xs
            .into_iter()
            .zip(ys.into_iter())
            .filter_map(|(x, y)| match (x, y) {
                (Some(x), Some(y)) if x.is_finite() && y.is_finite() => Some((x, y)),
                _ => None,
            })
            .collect();

        Self::from_points(&points)
    }

    pub fn from_points(points: &[(f64, f64)]) -> Result<Self> {
        let n = points.len();
        if n < MIN_ROWS {
            return Err(PipelineError::InsufficientData {
                operation: OPERATION.to_string(),
                required: MIN_ROWS,
                available: n,
            });
        }

        let nf = n as f64;
        let mean_x = points.iter().map(|p| p.0).sum::<f64>() / nf;
        let mean_y = points.iter().map(|p| p.1).sum::<f64>() / nf;
        let (mut sxx, mut sxy, mut syy) = (0.0, 0.0, 0.0);
        for (x, y) in points {
            let dx = x - mean_x;
            let dy = y - mean_y;
            sxx += dx * dx;
            sxy += dx * dy;
            syy += dy * dy;
        }

        // All predictor values equal: no line through them is determined
        if sxx == 0.0 {
            return Err(PipelineError::InsufficientData {
                operation: format!("{} (predictor has no variance)", OPERATION),
                required: MIN_ROWS,
                available: 1,
            });
        }

        let slope = sxy / sxx;
        let intercept = mean_y - slope * mean_x;
        let r_squared = if syy == 0.0 {
            None
        } else {
            Some((sxy * sxy) / (sxx * syy))
        };

        Ok(Self {
            slope,
            intercept,
            r_squared,
            sample_size: n,
        })
    }

    pub fn predict(&self, x: f64) -> f64 {
        self.slope * x + self.intercept
    }

    pub fn slope(&self) -> f64 {
        self.slope
    }

    pub fn intercept(&self) -> f64 {
        self.intercept
    }

    /// Coefficient of determination, `None` when the target is constant.
    pub fn r_squared(&self) -> Option<f64> {
        self.r_squared
    }

    pub fn sample_size(&self) -> usize {
        self.sample_size
    }
}

/// A fit plus the point estimate requested by the dashboard, if any.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Estimate {
    pub predictor: String,
    pub target: String,
    pub fit: LinearFit,
    pub at: Option<f64>,
    pub predicted: Option<f64>,
}

impl EstimatorSpec {
    pub fn estimate(&self, view: &FilteredView) -> Result<Estimate> {
        let fit = LinearFit::fit(view, &self.predictor, &self.target)?;
        Ok(Estimate {
            predictor: self.predictor.clone(),
            target: self.target.clone(),
            predicted: self.at.map(|x| fit.predict(x)),
            at: self.at,
            fit,
        })
    }
}

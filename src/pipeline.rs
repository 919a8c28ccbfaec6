//! Dashboard definitions and the recompute pass.
//!
//! [`recompute`] is a pure function of the dataset, the filter state and the
//! dashboard definition. Every interaction calls it again from scratch.

use std::path::Path;
use std::time::Instant;

use color_eyre::eyre::eyre;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::aggregate::{
    aggregate, AggregateResult, ChartKind, CrossTab, GroupKey, GroupOrder, GroupSpec, TimeBucket,
};
use crate::dataset::Dataset;
use crate::describe::{describe, ColumnSummary};
use crate::error::{PipelineError, Result};
use crate::estimator::{Estimate, EstimatorSpec};
use crate::filter::FilterState;
use crate::histogram::{Histogram, HistogramSpec, MAX_BINS, MIN_BINS};
use crate::kpi::{AggFunc, Kpi, KpiFormat, KpiSpec};
use crate::schema::{ColumnKind, SchemaDescriptor};
use crate::view::FilteredView;

/// What to compute for one dashboard. Deserializable from TOML.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardSpec {
    pub name: String,
    pub schema: SchemaDescriptor,
    #[serde(default)]
    pub kpis: Vec<KpiSpec>,
    #[serde(default)]
    pub figures: Vec<GroupSpec>,
    #[serde(default)]
    pub histograms: Vec<HistogramSpec>,
    /// Summary statistics of every numeric column
    #[serde(default)]
    pub describe: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimator: Option<EstimatorSpec>,
}

impl DashboardSpec {
    /// Sales analytics: revenue over time, ranked by category and by region.
    pub fn sales() -> Self {
        let revenue_by = |name: &str, column: &str| GroupSpec {
            name: name.to_string(),
            chart: ChartKind::Bar,
            keys: vec![GroupKey::column(column)],
            value: "revenue".to_string(),
            func: AggFunc::Sum,
            order: GroupOrder::ValueDescending,
        };
        Self {
            name: "sales".to_string(),
            schema: SchemaDescriptor::new()
                .temporal_with_format("date", "%Y-%m-%d")
                .categorical("category")
                .categorical("region")
                .numeric("revenue")
                .numeric("units")
                .numeric("price"),
            kpis: vec![
                KpiSpec::new("Total revenue", "revenue", AggFunc::Sum)
                    .formatted(KpiFormat::Currency, 0),
                KpiSpec::new("Total units", "units", AggFunc::Sum).formatted(KpiFormat::Integer, 0),
                KpiSpec::new("Average price", "price", AggFunc::Mean)
                    .formatted(KpiFormat::Currency, 2),
            ],
            figures: vec![
                GroupSpec {
                    name: "Revenue over time".to_string(),
                    chart: ChartKind::Line,
                    keys: vec![
                        GroupKey::bucketed("date", TimeBucket::Day),
                        GroupKey::column("category"),
                    ],
                    value: "revenue".to_string(),
                    func: AggFunc::Sum,
                    order: GroupOrder::KeyAscending,
                },
                revenue_by("Revenue by category", "category"),
                revenue_by("Revenue by region", "region"),
            ],
            histograms: Vec::new(),
            describe: false,
            estimator: None,
        }
    }

    /// Air quality: CO and NO2 trends and distributions, an hour-by-weekday CO
    /// heat map, summary statistics and a CO estimate from NO2.
    pub fn air_quality() -> Self {
        let trend = |name: &str, column: &str| GroupSpec {
            name: name.to_string(),
            chart: ChartKind::Line,
            keys: vec![GroupKey::bucketed("datetime", TimeBucket::Day)],
            value: column.to_string(),
            func: AggFunc::Mean,
            order: GroupOrder::KeyAscending,
        };
        Self {
            name: "air-quality".to_string(),
            schema: SchemaDescriptor::new()
                .temporal("datetime")
                .numeric("CO(GT)")
                .numeric("NO2(GT)"),
            kpis: vec![
                KpiSpec::new("Readings", "CO(GT)", AggFunc::Count).formatted(KpiFormat::Integer, 0),
                KpiSpec::new("Mean CO", "CO(GT)", AggFunc::Mean).formatted(KpiFormat::Decimal, 3),
                KpiSpec::new("Mean NO2", "NO2(GT)", AggFunc::Mean).formatted(KpiFormat::Decimal, 3),
            ],
            figures: vec![
                trend("CO trend", "CO(GT)"),
                trend("NO2 trend", "NO2(GT)"),
                GroupSpec {
                    name: "CO by hour and weekday".to_string(),
                    chart: ChartKind::HeatMap,
                    keys: vec![
                        GroupKey::bucketed("datetime", TimeBucket::HourOfDay),
                        GroupKey::bucketed("datetime", TimeBucket::Weekday),
                    ],
                    value: "CO(GT)".to_string(),
                    func: AggFunc::Mean,
                    order: GroupOrder::KeyAscending,
                },
            ],
            histograms: vec![
                HistogramSpec::new("CO distribution", "CO(GT)"),
                HistogramSpec::new("NO2 distribution", "NO2(GT)"),
            ],
            describe: true,
            estimator: Some(EstimatorSpec {
                predictor: "NO2(GT)".to_string(),
                target: "CO(GT)".to_string(),
                at: Some(0.5),
            }),
        }
    }

    /// Resolve a `--dashboard` argument: a preset name or a TOML file.
    pub fn resolve(name_or_path: &str) -> color_eyre::Result<Self> {
        match name_or_path {
            "sales" => Ok(Self::sales()),
            "air-quality" | "air_quality" => Ok(Self::air_quality()),
            other => Self::from_file(Path::new(other)),
        }
    }

    pub fn from_file(path: &Path) -> color_eyre::Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            eyre!(
                "Failed to read dashboard file at {}: {}",
                path.display(),
                e
            )
        })?;
        let spec: Self = toml::from_str(&content).map_err(|e| {
            eyre!(
                "Failed to parse dashboard file at {}: {}",
                path.display(),
                e
            )
        })?;
        spec.validate()?;
        Ok(spec)
    }

    /// Check every referenced column is declared with a usable kind.
    pub fn validate(&self) -> Result<()> {
        for kpi in &self.kpis {
            match kpi.func {
                AggFunc::Count => {
                    if self.schema.kind_of(&kpi.column).is_none() {
                        self.schema.require(&kpi.column, ColumnKind::Numeric)?;
                    }
                }
                _ => self.schema.require(&kpi.column, ColumnKind::Numeric)?,
            }
        }
        for figure in &self.figures {
            if figure.chart == ChartKind::Histogram {
                return Err(PipelineError::InvalidFilter(format!(
                    "figure '{}' is a histogram; declare it under [[histograms]]",
                    figure.name
                )));
            }
            if figure.keys.is_empty() {
                return Err(PipelineError::InvalidFilter(format!(
                    "figure '{}' has no group keys",
                    figure.name
                )));
            }
            if figure.chart == ChartKind::HeatMap && figure.keys.len() != 2 {
                return Err(PipelineError::InvalidFilter(format!(
                    "heat map '{}' needs exactly two keys",
                    figure.name
                )));
            }
            for key in &figure.keys {
                match key.bucket {
                    Some(_) => self.schema.require(&key.column, ColumnKind::Temporal)?,
                    None if self.schema.kind_of(&key.column) == Some(ColumnKind::Temporal) => {}
                    None => self.schema.require(&key.column, ColumnKind::Categorical)?,
                }
            }
            if figure.func != AggFunc::Count {
                self.schema.require(&figure.value, ColumnKind::Numeric)?;
            }
        }
        for hist in &self.histograms {
            self.schema.require(&hist.column, ColumnKind::Numeric)?;
            if !(MIN_BINS..=MAX_BINS).contains(&hist.bins) {
                return Err(PipelineError::InvalidFilter(format!(
                    "histogram '{}' needs between {} and {} bins, got {}",
                    hist.name, MIN_BINS, MAX_BINS, hist.bins
                )));
            }
        }
        if let Some(est) = &self.estimator {
            self.schema.require(&est.predictor, ColumnKind::Numeric)?;
            self.schema.require(&est.target, ColumnKind::Numeric)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FigureData {
    Grouped(AggregateResult),
    Grid(CrossTab),
    Bins(Histogram),
}

/// An aggregate tagged with the chart kind the presentation layer should draw.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Figure {
    pub name: String,
    pub chart: ChartKind,
    pub data: FigureData,
}

#[derive(Debug)]
pub enum Outcome {
    /// The filters exclude every row; nothing downstream was computed.
    NoData,
    Ready {
        kpis: Vec<Kpi>,
        figures: Vec<Figure>,
        /// `None` unless the dashboard asks for summary statistics
        description: Option<Vec<ColumnSummary>>,
        /// `None` when the dashboard has no estimator. An `InsufficientData`
        /// failure stays here and does not affect the other figures.
        estimate: Option<Result<Estimate>>,
    },
}

#[derive(Debug)]
pub struct Recomputed {
    pub view: FilteredView,
    pub outcome: Outcome,
}

impl Recomputed {
    pub fn is_no_data(&self) -> bool {
        matches!(self.outcome, Outcome::NoData)
    }

    /// Machine-readable summary (without the view rows).
    pub fn summary(&self, dashboard: &DashboardSpec) -> Value {
        match &self.outcome {
            Outcome::NoData => json!({
                "dashboard": dashboard.name,
                "rows": 0,
                "status": "no_data",
            }),
            Outcome::Ready {
                kpis,
                figures,
                description,
                estimate,
            } => {
                let kpis: Vec<Value> = kpis
                    .iter()
                    .map(|k| json!({ "label": k.label, "value": k.value, "display": k.display() }))
                    .collect();
                let estimate = match estimate {
                    None => Value::Null,
                    Some(Ok(e)) => json!(e),
                    Some(Err(err)) => json!({ "error": err.to_string() }),
                };
                json!({
                    "dashboard": dashboard.name,
                    "rows": self.view.height(),
                    "status": "ready",
                    "kpis": kpis,
                    "figures": figures,
                    "describe": description,
                    "estimate": estimate,
                })
            }
        }
    }
}

fn figure(view: &FilteredView, spec: &GroupSpec) -> Result<Figure> {
    let result = aggregate(view, spec)?;
    let data = match spec.chart {
        ChartKind::HeatMap => FigureData::Grid(CrossTab::from_result(&result)?),
        ChartKind::Line | ChartKind::Bar => FigureData::Grouped(result),
        ChartKind::Histogram => {
            return Err(PipelineError::InvalidFilter(format!(
                "figure '{}' has group keys but is drawn as a histogram",
                spec.name
            )))
        }
    };
    Ok(Figure {
        name: spec.name.clone(),
        chart: spec.chart,
        data,
    })
}

fn histogram_figure(view: &FilteredView, spec: &HistogramSpec) -> Result<Figure> {
    Ok(Figure {
        name: spec.name.clone(),
        chart: ChartKind::Histogram,
        data: FigureData::Bins(Histogram::compute(view, spec)?),
    })
}

/// Filter `dataset` with `state` and compute everything `dashboard` asks for.
///
/// Engine and definition errors abort the whole pass. An estimator that lacks
/// data reports `InsufficientData` inside the outcome instead.
pub fn recompute(
    dataset: &Dataset,
    state: &FilterState,
    dashboard: &DashboardSpec,
) -> Result<Recomputed> {
    let started = Instant::now();
    let view = FilteredView::apply(dataset, state)?;

    if view.is_empty() {
        tracing::debug!(dashboard = %dashboard.name, "no rows in range");
        return Ok(Recomputed {
            view,
            outcome: Outcome::NoData,
        });
    }

    let kpis = dashboard
        .kpis
        .iter()
        .map(|k| k.compute(&view))
        .collect::<Result<Vec<_>>>()?;
    let mut figures = dashboard
        .figures
        .iter()
        .map(|f| figure(&view, f))
        .collect::<Result<Vec<_>>>()?;
    for hist in &dashboard.histograms {
        figures.push(histogram_figure(&view, hist)?);
    }
    let description = if dashboard.describe {
        Some(describe(&view)?)
    } else {
        None
    };
    let estimate = match dashboard.estimator.as_ref().map(|e| e.estimate(&view)) {
        Some(Err(e)) if !matches!(e, PipelineError::InsufficientData { .. }) => return Err(e),
        other => other,
    };

    tracing::debug!(
        dashboard = %dashboard.name,
        rows = view.height(),
        elapsed_us = started.elapsed().as_micros() as u64,
        "recomputed"
    );
    Ok(Recomputed {
        view,
        outcome: Outcome::Ready {
            kpis,
            figures,
            description,
            estimate,
        },
    })
}

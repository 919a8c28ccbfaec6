use polars::prelude::*;
use serde::Serialize;

use crate::dataset::Dataset;
use crate::error::Result;
use crate::filter::{compose, FilterState};
use crate::schema::SchemaDescriptor;

/// The first rows of a view as display text, for tabular output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Preview {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
    /// Rows of the view not shown
    pub remaining: usize,
}

fn cell_text(value: AnyValue) -> String {
    match value {
        AnyValue::Null => String::new(),
        other => other.str_value().to_string(),
    }
}

/// The rows of a [`Dataset`] passing the current filter state.
///
/// Same columns and relative row order as the dataset. Rebuilt on every
/// recompute and never persisted.
#[derive(Debug, Clone)]
pub struct FilteredView {
    frame: DataFrame,
    schema: SchemaDescriptor,
}

impl FilteredView {
    pub fn apply(dataset: &Dataset, state: &FilterState) -> Result<Self> {
        let predicate = compose(state, dataset)?;
        let frame = dataset
            .frame()
            .clone()
            .lazy()
            .filter(predicate)
            .collect()?;
        Ok(Self {
            frame,
            schema: dataset.schema().clone(),
        })
    }

    pub fn frame(&self) -> &DataFrame {
        &self.frame
    }

    pub fn schema(&self) -> &SchemaDescriptor {
        &self.schema
    }

    pub fn height(&self) -> usize {
        self.frame.height()
    }

    pub fn is_empty(&self) -> bool {
        self.frame.height() == 0
    }

    pub fn column_names(&self) -> Vec<String> {
        self.frame
            .get_column_names()
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    /// Up to `n` rows from the top of the view, in view order.
    pub fn preview(&self, n: usize) -> Result<Preview> {
        let head = self.frame.head(Some(n));
        let mut rows = Vec::with_capacity(head.height());
        for i in 0..head.height() {
            let row = head
                .get_columns()
                .iter()
                .map(|c| c.get(i).map(cell_text))
                .collect::<PolarsResult<Vec<_>>>()?;
            rows.push(row);
        }
        Ok(Preview {
            columns: self.column_names(),
            remaining: self.height() - head.height(),
            rows,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn dataset() -> Dataset {
        let df = df!(
            "date" => &["2024-01-03", "2024-01-01", "2024-01-02"],
            "region" => &["X", "Y", "X"],
            "revenue" => &[3.0, 1.0, 2.0]
        )
        .unwrap();
        let schema = SchemaDescriptor::new()
            .temporal_with_format("date", "%Y-%m-%d")
            .categorical("region")
            .numeric("revenue");
        Dataset::new(df, schema, "memory").unwrap()
    }

    #[test]
    fn test_apply_preserves_order_and_columns() {
        let ds = dataset();
        let mut state = FilterState::new();
        state.select("region", ["X"]);
        let view = FilteredView::apply(&ds, &state).unwrap();
        assert_eq!(view.height(), 2);
        assert_eq!(view.column_names(), ds.column_names());
        let revenue: Vec<Option<f64>> = view
            .frame()
            .column("revenue")
            .unwrap()
            .f64()
            .unwrap()
            .into_iter()
            .collect();
        assert_eq!(revenue, vec![Some(3.0), Some(2.0)]);
    }

    #[test]
    fn test_preview_takes_rows_from_the_top() {
        let ds = dataset();
        let view = FilteredView::apply(&ds, &FilterState::new()).unwrap();
        let preview = view.preview(2).unwrap();
        assert_eq!(preview.columns, vec!["date", "region", "revenue"]);
        assert_eq!(preview.rows.len(), 2);
        assert_eq!(preview.rows[0][..2], ["2024-01-03", "X"]);
        assert!(preview.rows[0][2].starts_with('3'));
        assert_eq!(preview.remaining, 1);

        let all = view.preview(10).unwrap();
        assert_eq!(all.rows.len(), 3);
        assert_eq!(all.remaining, 0);
    }

    #[test]
    fn test_empty_view() {
        let ds = dataset();
        let mut state = FilterState::new();
        let day = NaiveDate::from_ymd_opt(2030, 1, 1).unwrap();
        state.set_date_range("date", day, day);
        let view = FilteredView::apply(&ds, &state).unwrap();
        assert!(view.is_empty());
        assert_eq!(view.frame().width(), 3);
    }
}

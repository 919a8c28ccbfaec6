#![allow(dead_code)]

use dashpipe::{DashboardSpec, DataSource, Dataset, PipelineError};
use polars::prelude::*;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

/// The three-row sales scenario used across the integration tests
pub fn sales_frame() -> DataFrame {
    df!(
        "date" => &["2024-01-01", "2024-01-02", "2024-01-05"],
        "category" => &["A", "B", "A"],
        "region" => &["X", "X", "Y"],
        "revenue" => &[100.0, 50.0, 30.0],
        "units" => &[10i64, 5, 3],
        "price" => &[10.0, 10.0, 10.0]
    )
    .unwrap()
}

pub fn sales_dataset() -> Dataset {
    Dataset::new(sales_frame(), DashboardSpec::sales().schema, "memory:sales").unwrap()
}

pub fn write_sales_csv(dir: &Path) -> PathBuf {
    let path = dir.join("sales_demo.csv");
    let mut df = sales_frame();
    let mut file = File::create(&path).unwrap();
    CsvWriter::new(&mut file).finish(&mut df).unwrap();
    path
}

pub fn day(y: i32, m: u32, d: u32) -> chrono::NaiveDate {
    chrono::NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// In-memory source that counts how often it is read
pub struct CountingSource {
    key: String,
    frame: DataFrame,
    reads: AtomicUsize,
    fail: bool,
}

impl CountingSource {
    pub fn new(key: &str, frame: DataFrame) -> Self {
        Self {
            key: key.to_string(),
            frame,
            reads: AtomicUsize::new(0),
            fail: false,
        }
    }

    pub fn failing(key: &str) -> Self {
        Self {
            fail: true,
            ..Self::new(key, DataFrame::empty())
        }
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

impl DataSource for CountingSource {
    fn key(&self) -> String {
        self.key.clone()
    }

    fn read(&self) -> dashpipe::Result<DataFrame> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(PipelineError::data_unavailable(&self.key, "connection refused"));
        }
        Ok(self.frame.clone())
    }
}

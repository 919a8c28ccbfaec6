use std::sync::Arc;

use dashpipe::{
    CsvOptions, DashboardSpec, DatasetCache, DatasetLoader, FileSource, PipelineError,
    SchemaDescriptor,
};

mod common;
use common::{day, sales_frame, write_sales_csv, CountingSource};

#[test]
fn test_second_load_reuses_the_first_read() {
    let source = CountingSource::new("memory:sales", sales_frame());
    let schema = DashboardSpec::sales().schema;
    let loader = DatasetLoader::default();

    let first = loader.load(&source, &schema).unwrap();
    let second = loader.load(&source, &schema).unwrap();

    assert_eq!(source.reads(), 1);
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(second.height(), 3);
}

#[test]
fn test_loaders_sharing_a_cache_share_datasets() {
    let cache = Arc::new(DatasetCache::new());
    let source = CountingSource::new("memory:sales", sales_frame());
    let schema = DashboardSpec::sales().schema;

    DatasetLoader::new(Arc::clone(&cache)).load(&source, &schema).unwrap();
    DatasetLoader::new(Arc::clone(&cache)).load(&source, &schema).unwrap();

    assert_eq!(source.reads(), 1);
    assert_eq!(cache.len(), 1);
}

#[test]
fn test_different_schema_is_a_different_entry() {
    let source = CountingSource::new("memory:sales", sales_frame());
    let loader = DatasetLoader::default();

    loader.load(&source, &DashboardSpec::sales().schema).unwrap();
    let narrow = SchemaDescriptor::new().categorical("region").numeric("revenue");
    let dataset = loader.load(&source, &narrow).unwrap();

    assert_eq!(source.reads(), 2);
    assert_eq!(dataset.schema(), &narrow);
}

#[test]
fn test_failed_load_is_not_cached() {
    let source = CountingSource::failing("db:orders");
    let schema = DashboardSpec::sales().schema;
    let loader = DatasetLoader::default();

    for _ in 0..2 {
        match loader.load(&source, &schema) {
            Err(PipelineError::DataUnavailable {
                source_name,
                message,
            }) => {
                assert_eq!(source_name, "db:orders");
                assert!(message.contains("connection refused"));
            }
            other => panic!("expected DataUnavailable, got {:?}", other.map(|d| d.height())),
        }
    }

    assert_eq!(source.reads(), 2);
    assert!(loader.cache().is_empty());
}

#[test]
fn test_missing_declared_column_fails_the_load() {
    let source = CountingSource::new("memory:partial", sales_frame().drop("units").unwrap());
    let loader = DatasetLoader::default();
    assert!(loader.load(&source, &DashboardSpec::sales().schema).is_err());
    assert!(loader.cache().is_empty());
}

#[test]
fn test_load_csv_file_and_derive_domain() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_sales_csv(dir.path());
    let source = FileSource::new(&path, CsvOptions::default());

    let loader = DatasetLoader::default();
    let dataset = loader.load(&source, &DashboardSpec::sales().schema).unwrap();

    assert_eq!(dataset.height(), 3);
    assert_eq!(
        dataset.domain().date_bounds("date"),
        Some((day(2024, 1, 1), day(2024, 1, 5)))
    );
    let regions: Vec<&str> = dataset
        .domain()
        .categories("region")
        .unwrap()
        .iter()
        .map(String::as_str)
        .collect();
    assert_eq!(regions, vec!["X", "Y"]);

    // The same path loads from the cache
    let again = loader
        .load(&FileSource::new(&path, CsvOptions::default()), &DashboardSpec::sales().schema)
        .unwrap();
    assert!(Arc::ptr_eq(&dataset, &again));
}

use std::sync::Arc;

use dashpipe::{
    save_view, DashboardSpec, DataSource, DatasetLoader, FilterState, FilteredView,
    ParquetTableStore, PipelineError, TableSource, TableStore,
};

mod common;
use common::{day, sales_dataset};

fn view_of(days: (u32, u32)) -> FilteredView {
    let ds = sales_dataset();
    let mut state = FilterState::unfiltered(ds.domain());
    state.set_date_range("date", day(2024, 1, days.0), day(2024, 1, days.1));
    FilteredView::apply(&ds, &state).unwrap()
}

#[test]
fn test_save_creates_then_replaces_table() {
    let dir = tempfile::tempdir().unwrap();
    let store = ParquetTableStore::new(dir.path().join("tables"));

    let created = save_view(&store, "global_temps", &view_of((1, 5))).unwrap();
    assert_eq!(created.rows_written, 3);
    assert_eq!(created.previous_rows, None);
    assert_eq!(created.rows_discarded(), 0);

    let replaced = save_view(&store, "global_temps", &view_of((1, 1))).unwrap();
    assert_eq!(replaced.rows_written, 1);
    assert_eq!(replaced.previous_rows, Some(3));
    assert_eq!(replaced.rows_discarded(), 2);

    assert_eq!(store.table_names().unwrap(), vec!["global_temps".to_string()]);
    assert_eq!(store.row_count("global_temps").unwrap(), Some(1));
}

#[test]
fn test_saved_table_loads_as_a_source() {
    let dir = tempfile::tempdir().unwrap();
    let store: Arc<dyn TableStore> = Arc::new(ParquetTableStore::new(dir.path()));
    save_view(store.as_ref(), "sales_q1", &view_of((1, 2))).unwrap();

    let source = TableSource::new(Arc::clone(&store), "sales_q1");
    assert!(source.key().ends_with("/sales_q1"));

    let dataset = DatasetLoader::default()
        .load(&source, &DashboardSpec::sales().schema)
        .unwrap();
    assert_eq!(dataset.height(), 2);
    assert_eq!(
        dataset.domain().date_bounds("date"),
        Some((day(2024, 1, 1), day(2024, 1, 2)))
    );
}

#[test]
fn test_missing_table_is_data_unavailable() {
    let dir = tempfile::tempdir().unwrap();
    let store: Arc<dyn TableStore> = Arc::new(ParquetTableStore::new(dir.path()));
    let source = TableSource::new(store, "nope");
    assert!(matches!(
        source.read(),
        Err(PipelineError::DataUnavailable { .. })
    ));
}

#[test]
fn test_invalid_table_name_is_persistence_failure() {
    let dir = tempfile::tempdir().unwrap();
    let store = ParquetTableStore::new(dir.path());
    match save_view(&store, "../escape", &view_of((1, 5))) {
        Err(PipelineError::PersistenceFailure { table, .. }) => assert_eq!(table, "../escape"),
        other => panic!("expected PersistenceFailure, got {:?}", other),
    }
    assert!(store.table_names().unwrap().is_empty());
}

#[test]
fn test_failed_save_leaves_view_intact() {
    let dir = tempfile::tempdir().unwrap();
    // A regular file where the store directory should be
    let blocker = dir.path().join("tables");
    std::fs::write(&blocker, b"not a directory").unwrap();
    let store = ParquetTableStore::new(&blocker);

    let view = view_of((1, 5));
    assert!(save_view(&store, "t", &view).is_err());
    assert_eq!(view.height(), 3);
}

#[test]
fn test_saving_through_the_loader_refreshes_cached_table() {
    let dir = tempfile::tempdir().unwrap();
    let store: Arc<dyn TableStore> = Arc::new(ParquetTableStore::new(dir.path()));
    let schema = DashboardSpec::sales().schema;
    let loader = DatasetLoader::default();
    save_view(store.as_ref(), "sales_q1", &view_of((1, 5))).unwrap();

    let source = TableSource::new(Arc::clone(&store), "sales_q1");
    assert_eq!(loader.load(&source, &schema).unwrap().height(), 3);

    let report = loader.save(store.as_ref(), "sales_q1", &view_of((1, 1))).unwrap();
    assert_eq!(report.rows_discarded(), 2);
    assert_eq!(loader.load(&source, &schema).unwrap().height(), 1);
}

#[test]
fn test_plain_save_leaves_cached_table_stale() {
    let dir = tempfile::tempdir().unwrap();
    let store: Arc<dyn TableStore> = Arc::new(ParquetTableStore::new(dir.path()));
    let schema = DashboardSpec::sales().schema;
    let loader = DatasetLoader::default();
    save_view(store.as_ref(), "sales_q1", &view_of((1, 5))).unwrap();

    let source = TableSource::new(Arc::clone(&store), "sales_q1");
    loader.load(&source, &schema).unwrap();
    save_view(store.as_ref(), "sales_q1", &view_of((1, 1))).unwrap();
    assert_eq!(loader.load(&source, &schema).unwrap().height(), 3);

    loader.cache().invalidate_source(&source.key());
    assert_eq!(loader.load(&source, &schema).unwrap().height(), 1);
}

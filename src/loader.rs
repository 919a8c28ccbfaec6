use std::sync::Arc;
use std::time::Instant;

use crate::cache::{CacheKey, DatasetCache};
use crate::dataset::Dataset;
use crate::error::Result;
use crate::persist::{save_view, SaveReport, TableStore};
use crate::schema::SchemaDescriptor;
use crate::source::{table_key, DataSource};
use crate::view::FilteredView;

/// Loads datasets through a shared [`DatasetCache`].
///
/// Repeated loads of the same source and schema return the same `Arc` without
/// reading the source again. Any failure is returned as-is and nothing is
/// cached.
#[derive(Clone, Default)]
pub struct DatasetLoader {
    cache: Arc<DatasetCache>,
}

impl DatasetLoader {
    pub fn new(cache: Arc<DatasetCache>) -> Self {
        Self { cache }
    }

    pub fn cache(&self) -> &Arc<DatasetCache> {
        &self.cache
    }

    pub fn load(&self, source: &dyn DataSource, schema: &SchemaDescriptor) -> Result<Arc<Dataset>> {
        let key = CacheKey::new(source.key(), schema);
        let started = Instant::now();
        let (dataset, hit) = self.cache.get_or_load(&key, || {
            let frame = source.read()?;
            Dataset::new(frame, schema.clone(), key.source.clone())
        })?;

        if hit {
            tracing::debug!(source = %key.source, "dataset cache hit");
        } else {
            tracing::info!(
                source = %key.source,
                rows = dataset.height(),
                columns = dataset.frame().width(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "dataset loaded"
            );
        }
        Ok(dataset)
    }

    /// [`save_view`], then forget any cached load of that table so the next
    /// [`load`](Self::load) reads the new contents.
    pub fn save(
        &self,
        store: &dyn TableStore,
        table: &str,
        view: &FilteredView,
    ) -> Result<SaveReport> {
        let report = save_view(store, table, view)?;
        let dropped = self
            .cache
            .invalidate_source(&table_key(&store.location(), table));
        tracing::debug!(table, dropped, "invalidated cached table loads");
        Ok(report)
    }
}

//! Table store and destructive write-back of a filtered view.
//!
//! Replacing a table discards every row of the previous contents that is not
//! in the view being saved. It is an overwrite, never a merge.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use polars::prelude::*;
use tempfile::NamedTempFile;

use crate::error::{PipelineError, Result};
use crate::error_display::{
    user_message_from_io, user_message_from_polars, user_message_from_write_io,
};
use crate::view::FilteredView;

const TABLE_EXTENSION: &str = "parquet";

/// A store of named tables.
pub trait TableStore: Send + Sync {
    /// Human-readable location, used in cache keys and messages.
    fn location(&self) -> String;

    fn table_names(&self) -> Result<Vec<String>>;

    /// Read a whole table. A missing table is `DataUnavailable`.
    fn read_table(&self, table: &str) -> Result<DataFrame>;

    /// Replace the table's entire contents with `frame`, creating it if needed.
    fn replace_table(&self, table: &str, frame: &mut DataFrame) -> Result<()>;

    /// Row count of an existing table, `None` if it does not exist.
    fn row_count(&self, table: &str) -> Result<Option<usize>> {
        if !self.table_names()?.iter().any(|t| t == table) {
            return Ok(None);
        }
        Ok(Some(self.read_table(table)?.height()))
    }
}

/// One Parquet file per table inside a directory.
#[derive(Debug, Clone)]
pub struct ParquetTableStore {
    dir: PathBuf,
}

impl ParquetTableStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Store under the user's data directory, e.g. `~/.local/share/dashpipe/tables`.
    pub fn default_location() -> Option<Self> {
        dirs::data_dir().map(|d| Self::new(d.join(crate::APP_NAME).join("tables")))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn table_path(&self, table: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", table, TABLE_EXTENSION))
    }

    fn lock_path(&self, table: &str) -> PathBuf {
        self.dir.join(format!(".{}.lock", table))
    }

    fn write_locked(&self, table: &str, frame: &mut DataFrame) -> std::result::Result<(), String> {
        fs::create_dir_all(&self.dir).map_err(|e| user_message_from_write_io(&e))?;

        let lock = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(self.lock_path(table))
            .map_err(|e| user_message_from_write_io(&e))?;
        fs2::FileExt::lock_exclusive(&lock).map_err(|e| user_message_from_write_io(&e))?;

        let result = self.write_atomic(table, frame);
        let _ = fs2::FileExt::unlock(&lock);
        result
    }

    fn write_atomic(&self, table: &str, frame: &mut DataFrame) -> std::result::Result<(), String> {
        let mut temp = NamedTempFile::new_in(&self.dir).map_err(|e| user_message_from_write_io(&e))?;
        {
            let mut writer = BufWriter::new(temp.as_file_mut());
            ParquetWriter::new(&mut writer)
                .finish(frame)
                .map_err(|e| user_message_from_polars(&e))?;
            writer.flush().map_err(|e| user_message_from_write_io(&e))?;
        }
        temp.persist(self.table_path(table))
            .map_err(|e| user_message_from_write_io(&e.error))?;
        Ok(())
    }
}

fn validate_table_name(table: &str) -> std::result::Result<(), String> {
    if table.is_empty() {
        return Err("table name is empty".to_string());
    }
    if !table
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(format!(
            "invalid table name '{}': use letters, digits, '_' or '-'",
            table
        ));
    }
    Ok(())
}

impl TableStore for ParquetTableStore {
    fn location(&self) -> String {
        self.dir.display().to_string()
    }

    fn table_names(&self) -> Result<Vec<String>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(PipelineError::data_unavailable(
                    self.location(),
                    user_message_from_io(&e, None),
                ))
            }
        };
        let mut names: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|p| p.extension().and_then(|e| e.to_str()) == Some(TABLE_EXTENSION))
            .filter_map(|p| p.file_stem().and_then(|s| s.to_str()).map(str::to_string))
            .collect();
        names.sort();
        Ok(names)
    }

    fn read_table(&self, table: &str) -> Result<DataFrame> {
        let source_name = format!("table '{}'", table);
        validate_table_name(table).map_err(|m| PipelineError::data_unavailable(&source_name, m))?;
        let file = File::open(self.table_path(table)).map_err(|e| {
            PipelineError::data_unavailable(
                &source_name,
                user_message_from_io(&e, Some(&format!("(store: {})", self.location()))),
            )
        })?;
        ParquetReader::new(file)
            .finish()
            .map_err(|e| PipelineError::data_unavailable(&source_name, user_message_from_polars(&e)))
    }

    fn replace_table(&self, table: &str, frame: &mut DataFrame) -> Result<()> {
        validate_table_name(table).map_err(|m| PipelineError::persistence(table, m))?;
        self.write_locked(table, frame)
            .map_err(|m| PipelineError::persistence(table, m))
    }
}

/// Outcome of [`save_view`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveReport {
    pub table: String,
    pub rows_written: usize,
    /// Rows the table held before the overwrite, `None` if it was created.
    pub previous_rows: Option<usize>,
}

impl SaveReport {
    /// Rows of the old table that are no longer present (by count).
    pub fn rows_discarded(&self) -> usize {
        self.previous_rows
            .map(|prev| prev.saturating_sub(self.rows_written))
            .unwrap_or(0)
    }
}

/// Overwrite `table` with the rows of `view`.
///
/// On failure the view is untouched and the caller may simply retry. This
/// does not touch any [`DatasetCache`](crate::cache::DatasetCache); use
/// [`DatasetLoader::save`](crate::loader::DatasetLoader::save) when the table
/// may be loaded again in the same session.
pub fn save_view(store: &dyn TableStore, table: &str, view: &FilteredView) -> Result<SaveReport> {
    let previous_rows = store
        .row_count(table)
        .map_err(|e| PipelineError::persistence(table, e.to_string()))?;

    tracing::warn!(
        table,
        store = %store.location(),
        previous_rows = ?previous_rows,
        rows = view.height(),
        "replacing entire table contents with the current view"
    );

    let mut frame = view.frame().clone();
    store.replace_table(table, &mut frame)?;

    tracing::info!(table, rows = view.height(), "table saved");
    Ok(SaveReport {
        table: table.to_string(),
        rows_written: view.height(),
        previous_rows,
    })
}

//! Data sources: local delimited/Parquet files and tables in a table store.

use std::fs::File;
use std::io::{BufReader, Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use polars::prelude::*;

use crate::error::{PipelineError, Result};
use crate::error_display::{user_message_from_io, user_message_from_polars};
use crate::persist::TableStore;
use crate::{CompressionFormat, FileFormat};

const TABLE_PREFIX: &str = "table:";

/// Cache identity of `table` in the store at `location`.
pub fn table_key(location: &str, table: &str) -> String {
    format!("{}{}/{}", TABLE_PREFIX, location, table)
}

/// Where a dataset comes from, as written by the user.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SourceHandle {
    File(PathBuf),
    Table(String),
}

impl SourceHandle {
    /// Classifies `table:<name>` as a store table and anything else as a local path
    /// (string parsing only, no filesystem calls).
    pub fn parse(s: &str) -> Self {
        match s.strip_prefix(TABLE_PREFIX) {
            Some(name) if !name.is_empty() => SourceHandle::Table(name.to_string()),
            _ => SourceHandle::File(PathBuf::from(s)),
        }
    }
}

/// A readable source of one tabular dataset.
pub trait DataSource: Send + Sync {
    /// Stable identity of the source; the dataset cache keys on it.
    fn key(&self) -> String;

    /// Read the full source. Called at most once per cache key.
    fn read(&self) -> Result<DataFrame>;
}

/// CSV reading options. Defaults match a plain comma-separated file with a header.
#[derive(Debug, Clone)]
pub struct CsvOptions {
    pub delimiter: Option<u8>,
    pub has_header: bool,
    pub infer_schema_length: usize,
    pub decimal_comma: bool,
    pub parse_dates: bool,
    pub compression: Option<CompressionFormat>,
    pub format: Option<FileFormat>,
}

impl Default for CsvOptions {
    fn default() -> Self {
        Self {
            delimiter: None,
            has_header: true,
            infer_schema_length: 1000,
            decimal_comma: false,
            parse_dates: true,
            compression: None,
            format: None,
        }
    }
}

impl CsvOptions {
    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = Some(delimiter);
        self
    }

    pub fn with_decimal_comma(mut self, decimal_comma: bool) -> Self {
        self.decimal_comma = decimal_comma;
        self
    }
}

pub struct FileSource {
    path: PathBuf,
    options: CsvOptions,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>, options: CsvOptions) -> Self {
        Self {
            path: path.into(),
            options,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn unavailable(&self, message: String) -> PipelineError {
        PipelineError::data_unavailable(self.path.display().to_string(), message)
    }

    fn read_csv(&self, format: FileFormat) -> Result<DataFrame> {
        let bytes = self.read_bytes().map_err(|e| self.unavailable(user_message_from_io(&e, None)))?;
        let separator = self
            .options
            .delimiter
            .or_else(|| format.default_delimiter())
            .unwrap_or(b',');
        let parse_dates = self.options.parse_dates;
        let decimal_comma = self.options.decimal_comma;

        let read_options = CsvReadOptions::default()
            .with_has_header(self.options.has_header)
            .with_infer_schema_length(Some(self.options.infer_schema_length))
            .map_parse_options(|opts| {
                opts.with_separator(separator)
                    .with_try_parse_dates(parse_dates)
                    .with_decimal_comma(decimal_comma)
            });

        CsvReader::new(Cursor::new(bytes))
            .with_options(read_options)
            .finish()
            .map_err(|e| self.unavailable(user_message_from_polars(&e)))
    }

    /// Read the whole file, decompressing when the extension or options say so.
    fn read_bytes(&self) -> std::io::Result<Vec<u8>> {
        let compression = self
            .options
            .compression
            .or_else(|| CompressionFormat::from_extension(&self.path));
        let file = BufReader::new(File::open(&self.path)?);
        let mut reader: Box<dyn Read> = match compression {
            None => Box::new(file),
            Some(CompressionFormat::Gzip) => Box::new(flate2::read::GzDecoder::new(file)),
            Some(CompressionFormat::Zstd) => Box::new(zstd::stream::read::Decoder::new(file)?),
            Some(CompressionFormat::Bzip2) => Box::new(bzip2::read::BzDecoder::new(file)),
            Some(CompressionFormat::Xz) => Box::new(xz2::read::XzDecoder::new(file)),
        };
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        Ok(bytes)
    }
}

impl DataSource for FileSource {
    fn key(&self) -> String {
        let path = std::fs::canonicalize(&self.path).unwrap_or_else(|_| self.path.clone());
        format!("file:{}", path.display())
    }

    fn read(&self) -> Result<DataFrame> {
        let format = self
            .options
            .format
            .or_else(|| FileFormat::from_path(&self.path))
            .unwrap_or(FileFormat::Csv);
        tracing::info!(path = %self.path.display(), ?format, "reading file source");
        match format {
            FileFormat::Parquet => {
                let file = File::open(&self.path)
                    .map_err(|e| self.unavailable(user_message_from_io(&e, None)))?;
                ParquetReader::new(file)
                    .finish()
                    .map_err(|e| self.unavailable(user_message_from_polars(&e)))
            }
            FileFormat::Csv | FileFormat::Tsv | FileFormat::Psv => self.read_csv(format),
        }
    }
}

/// A named table in a [`TableStore`].
pub struct TableSource {
    store: Arc<dyn TableStore>,
    table: String,
}

impl TableSource {
    pub fn new(store: Arc<dyn TableStore>, table: impl Into<String>) -> Self {
        Self {
            store,
            table: table.into(),
        }
    }
}

impl DataSource for TableSource {
    fn key(&self) -> String {
        table_key(&self.store.location(), &self.table)
    }

    fn read(&self) -> Result<DataFrame> {
        tracing::info!(table = %self.table, store = %self.store.location(), "reading table source");
        self.store.read_table(&self.table)
    }
}

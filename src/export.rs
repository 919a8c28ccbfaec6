//! CSV export of a filtered view.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use polars::prelude::*;
use serde::Serialize;

use crate::error::{PipelineError, Result};
use crate::error_display::{user_message_from_polars, user_message_from_write_io};
use crate::view::FilteredView;
use crate::CompressionFormat;

pub const EXPORT_FILE_NAME: &str = "filtered_data.csv";
pub const EXPORT_MIME: &str = "text/csv";

#[derive(Debug, Clone)]
pub struct ExportOptions {
    /// Name used for snapshots and when the export target is a directory
    pub file_name: String,
    pub delimiter: u8,
    pub include_header: bool,
    pub compression: Option<CompressionFormat>,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            file_name: EXPORT_FILE_NAME.to_string(),
            delimiter: b',',
            include_header: true,
            compression: None,
        }
    }
}

/// An on-demand serialized copy of a view, ready to hand to a download.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportSnapshot {
    pub file_name: String,
    pub mime: &'static str,
    #[serde(skip)]
    pub bytes: Vec<u8>,
}

impl ExportSnapshot {
    pub fn of(view: &FilteredView, options: &ExportOptions) -> Result<Self> {
        Ok(Self {
            file_name: options.file_name.clone(),
            mime: EXPORT_MIME,
            bytes: to_csv_bytes(view, options)?,
        })
    }
}

fn write_csv<W: Write>(writer: W, view: &FilteredView, options: &ExportOptions) -> Result<()> {
    let mut df = view.frame().clone();
    CsvWriter::new(writer)
        .with_separator(options.delimiter)
        .include_header(options.include_header)
        .finish(&mut df)?;
    Ok(())
}

/// Serialize `view` as delimited text. Column order follows the view.
pub fn to_csv_bytes(view: &FilteredView, options: &ExportOptions) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    write_csv(&mut buf, view, options)?;
    Ok(buf)
}

/// Where an export to `path` lands: `path` itself, or `options.file_name`
/// inside it when `path` is an existing directory.
pub fn resolve_export_path(path: &Path, options: &ExportOptions) -> PathBuf {
    if path.is_dir() {
        path.join(&options.file_name)
    } else {
        path.to_path_buf()
    }
}

/// Write `view` to `path`, compressed when `options.compression` is set.
///
/// Failures are reported as [`PipelineError::ExportFailure`] naming `path`.
pub fn write_export(path: &Path, view: &FilteredView, options: &ExportOptions) -> Result<()> {
    let target = path.display().to_string();
    let io_err = |e: std::io::Error| PipelineError::export(&target, user_message_from_write_io(&e));
    let csv_err = |e: PipelineError| match e {
        PipelineError::Polars(e) => PipelineError::export(&target, user_message_from_polars(&e)),
        other => other,
    };
    let file = File::create(path).map_err(io_err)?;

    match options.compression {
        None => {
            let mut writer = BufWriter::new(file);
            write_csv(&mut writer, view, options).map_err(csv_err)?;
            writer.flush().map_err(io_err)?;
        }
        Some(compression) => {
            let writer: Box<dyn Write> = match compression {
                CompressionFormat::Gzip => Box::new(flate2::write::GzEncoder::new(
                    file,
                    flate2::Compression::default(),
                )),
                CompressionFormat::Zstd => {
                    Box::new(zstd::Encoder::new(file, 0).map_err(io_err)?.auto_finish())
                }
                CompressionFormat::Bzip2 => Box::new(bzip2::write::BzEncoder::new(
                    file,
                    bzip2::Compression::default(),
                )),
                CompressionFormat::Xz => Box::new(xz2::write::XzEncoder::new(
                    file, 6, // compression level
                )),
            };
            write_csv(writer, view, options).map_err(csv_err)?;
        }
    }

    tracing::info!(path = %path.display(), rows = view.height(), "exported view");
    Ok(())
}

//! Shared CLI definitions for dashpipe.
//!
//! Used by the main application and by the build script (manpage) and
//! gen_docs binary (command-line-options markdown).

use clap::{CommandFactory, Parser, ValueEnum};
use std::path::{Path, PathBuf};

/// File format for data files (used to bypass extension-based detection).
/// When `--format` is not specified, format is auto-detected from the file extension.
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum FileFormat {
    /// Parquet columnar format
    Parquet,
    /// Comma-separated values
    Csv,
    /// Tab-separated values
    Tsv,
    /// Pipe-separated values
    Psv,
}

impl FileFormat {
    /// Detect file format from path extension. Compression suffixes are skipped,
    /// so `sales.csv.gz` is detected as CSV. Returns None when the extension is missing or unknown.
    pub fn from_path(path: &Path) -> Option<Self> {
        let path = if CompressionFormat::from_extension(path).is_some() {
            Path::new(path.file_stem()?)
        } else {
            path
        };
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }

    /// Parse format from extension string (e.g. "parquet", "csv").
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "parquet" => Some(Self::Parquet),
            "csv" => Some(Self::Csv),
            "tsv" => Some(Self::Tsv),
            "psv" => Some(Self::Psv),
            _ => None,
        }
    }

    /// Default field separator for the delimited formats.
    pub fn default_delimiter(&self) -> Option<u8> {
        match self {
            Self::Csv => Some(b','),
            Self::Tsv => Some(b'\t'),
            Self::Psv => Some(b'|'),
            Self::Parquet => None,
        }
    }
}

/// Compression format for data files
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum CompressionFormat {
    /// Gzip compression (.gz) - Most common, good balance of speed and compression
    Gzip,
    /// Zstandard compression (.zst) - Modern, fast compression with good ratios
    Zstd,
    /// Bzip2 compression (.bz2) - Good compression ratio, slower than gzip
    Bzip2,
    /// XZ compression (.xz) - Excellent compression ratio, slower than bzip2
    Xz,
}

impl CompressionFormat {
    /// Detect compression format from file extension
    pub fn from_extension(path: &Path) -> Option<Self> {
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            match ext.to_lowercase().as_str() {
                "gz" => Some(Self::Gzip),
                "zst" | "zstd" => Some(Self::Zstd),
                "bz2" | "bz" => Some(Self::Bzip2),
                "xz" => Some(Self::Xz),
                _ => None,
            }
        } else {
            None
        }
    }

    /// Get file extension for this compression format
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Gzip => "gz",
            Self::Zstd => "zst",
            Self::Bzip2 => "bz2",
            Self::Xz => "xz",
        }
    }

    /// Parse a compression name as written in the config file ("gzip", "zstd", ...).
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "gzip" | "gz" => Some(Self::Gzip),
            "zstd" | "zst" => Some(Self::Zstd),
            "bzip2" | "bz2" => Some(Self::Bzip2),
            "xz" => Some(Self::Xz),
            _ => None,
        }
    }
}

/// Command-line arguments for dashpipe
#[derive(Clone, Parser, Debug)]
#[command(
    name = "dashpipe",
    version,
    about = "Filter, summarize and export tabular data",
    long_about = include_str!("../long_about.txt")
)]
pub struct Args {
    /// Data source: a file path (csv, tsv, psv, parquet; optionally compressed) or table:<name>
    /// for a table in the table store (not required with --generate-config)
    #[arg(required_unless_present_any = ["generate_config"], value_name = "SOURCE")]
    pub source: Option<String>,

    /// Dashboard to compute: a built-in name (sales, air-quality) or a path to a dashboard TOML file
    #[arg(long = "dashboard", value_name = "NAME|FILE", default_value = "sales")]
    pub dashboard: String,

    /// First day of the date range (YYYY-MM-DD, inclusive). Defaults to the earliest date in the data
    #[arg(long = "from", value_name = "DATE")]
    pub from: Option<String>,

    /// Last day of the date range (YYYY-MM-DD, inclusive). Defaults to the latest date in the data
    #[arg(long = "to", value_name = "DATE")]
    pub to: Option<String>,

    /// Restrict a categorical column to the listed values. Use once per column: --select region=North,South.
    /// An empty list (--select region=) selects no rows
    #[arg(long = "select", value_name = "COLUMN=V1,V2")]
    pub select: Vec<String>,

    /// Predictor value for the dashboard's linear estimate
    #[arg(long = "predict", value_name = "X")]
    pub predict: Option<f64>,

    /// Print the recomputed dashboard as JSON instead of text tables
    #[arg(long = "json", action)]
    pub json: bool,

    /// Show the first N rows of the filtered view
    #[arg(long = "head", value_name = "N")]
    pub head: Option<usize>,

    /// Write the filtered rows as CSV to this path. When PATH is a directory the
    /// file is named after config [export] file_name
    #[arg(long = "export", value_name = "PATH")]
    pub export: Option<PathBuf>,

    /// Compress the CSV export (gzip, zstd, bzip2, xz)
    #[arg(long = "compress", value_enum, requires = "export")]
    pub compress: Option<CompressionFormat>,

    /// Replace the named table in the table store with the filtered rows.
    /// This is a destructive overwrite: rows outside the current filter are discarded
    #[arg(long = "save-table", value_name = "NAME")]
    pub save_table: Option<String>,

    /// Directory of the table store (overrides config [store] dir)
    #[arg(long = "store-dir", value_name = "DIR")]
    pub store_dir: Option<PathBuf>,

    /// Run the batch cleaning job with the rules in this TOML file instead of a dashboard
    #[arg(long = "clean", value_name = "RULES", requires = "output")]
    pub clean: Option<PathBuf>,

    /// Output Parquet path for --clean
    #[arg(long = "output", value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Specify that the file has no header
    #[arg(long = "no-header")]
    pub no_header: Option<bool>,

    /// Specify the delimiter to use when reading a delimited text file
    #[arg(long = "delimiter")]
    pub delimiter: Option<u8>,

    /// Parse numbers written with a decimal comma (e.g. 2,6)
    #[arg(long = "decimal-comma", action)]
    pub decimal_comma: bool,

    /// Number of rows to use when inferring CSV schema (default: 1000)
    #[arg(long = "infer-schema-length", value_name = "N")]
    pub infer_schema_length: Option<usize>,

    /// Specify the compression format explicitly (gzip, zstd, bzip2, xz)
    /// If not specified, compression is auto-detected from file extension.
    #[arg(long = "compression", value_enum)]
    pub compression: Option<CompressionFormat>,

    /// Force file format (parquet, csv, tsv, psv).
    /// By default format is auto-detected from the file extension.
    #[arg(long = "format", value_enum)]
    pub format: Option<FileFormat>,

    /// Enable debug logging on stderr
    #[arg(long = "debug", action)]
    pub debug: bool,

    /// Generate default configuration file at ~/.config/dashpipe/config.toml
    #[arg(long = "generate-config", action)]
    pub generate_config: bool,

    /// Force overwrite existing config file when using --generate-config
    #[arg(long = "force", requires = "generate_config", action)]
    pub force: bool,
}

/// Escape `|` and newlines for use in markdown table cells.
fn escape_table_cell(s: &str) -> String {
    s.replace('|', "\\|").replace(['\n', '\r'], " ")
}

/// Render command-line options as markdown.
///
/// Used by the gen_docs binary; output is written to stdout.
pub fn render_options_markdown() -> String {
    let mut cmd = Args::command();
    cmd.build();

    let mut out = String::from("# Command Line Options\n\n");

    out.push_str("## Usage\n\n```\n");
    let usage = cmd.render_usage();
    out.push_str(&usage.to_string());
    out.push_str("\n```\n\n");

    out.push_str("## Options\n\n");
    out.push_str("| Option | Description |\n");
    out.push_str("|--------|-------------|\n");

    for arg in cmd.get_arguments() {
        let id = arg.get_id().as_ref().to_string();
        if id == "help" || id == "version" {
            continue;
        }

        let placeholder: String = arg
            .get_value_names()
            .map(|names| {
                names
                    .iter()
                    .map(|n: &clap::builder::Str| format!("<{}>", n.as_ref() as &str))
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .unwrap_or_default();

        let option_str = if arg.is_positional() {
            if arg.is_required_set() {
                placeholder
            } else {
                format!("[{placeholder}]")
            }
        } else {
            let mut parts = Vec::new();
            if let Some(s) = arg.get_short() {
                parts.push(format!("-{s}"));
            }
            if let Some(l) = arg.get_long() {
                parts.push(format!("--{l}"));
            }
            let op = parts.join(", ");
            if placeholder.is_empty() || !arg.get_action().takes_values() {
                op
            } else {
                format!("{op} {placeholder}")
            }
        };

        let help = arg
            .get_help()
            .map(|h| escape_table_cell(&h.to_string()))
            .unwrap_or_else(|| "-".to_string());

        out.push_str(&format!("| `{option_str}` | {help} |\n"));
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compression_detection() {
        assert_eq!(
            CompressionFormat::from_extension(Path::new("file.csv.gz")),
            Some(CompressionFormat::Gzip)
        );
        assert_eq!(
            CompressionFormat::from_extension(Path::new("file.csv.zst")),
            Some(CompressionFormat::Zstd)
        );
        assert_eq!(
            CompressionFormat::from_extension(Path::new("file.csv.bz2")),
            Some(CompressionFormat::Bzip2)
        );
        assert_eq!(
            CompressionFormat::from_extension(Path::new("file.csv.xz")),
            Some(CompressionFormat::Xz)
        );
        assert_eq!(
            CompressionFormat::from_extension(Path::new("file.csv")),
            None
        );
        assert_eq!(CompressionFormat::from_extension(Path::new("file")), None);
    }

    #[test]
    fn test_compression_names() {
        assert_eq!(CompressionFormat::Gzip.extension(), "gz");
        assert_eq!(CompressionFormat::Xz.extension(), "xz");
        assert_eq!(
            CompressionFormat::from_name("ZSTD"),
            Some(CompressionFormat::Zstd)
        );
        assert_eq!(CompressionFormat::from_name("lz4"), None);
    }

    #[test]
    fn test_file_format_from_path() {
        assert_eq!(
            FileFormat::from_path(Path::new("data.parquet")),
            Some(FileFormat::Parquet)
        );
        assert_eq!(
            FileFormat::from_path(Path::new("data.csv")),
            Some(FileFormat::Csv)
        );
        assert_eq!(
            FileFormat::from_path(Path::new("sales.TSV.gz")),
            Some(FileFormat::Tsv)
        );
        assert_eq!(FileFormat::from_path(Path::new("noext")), None);
    }

    #[test]
    fn test_args_parse_selections() {
        let args = Args::parse_from([
            "dashpipe",
            "sales.csv",
            "--from",
            "2024-01-01",
            "--select",
            "region=X,Y",
            "--select",
            "category=",
        ]);
        assert_eq!(args.source.as_deref(), Some("sales.csv"));
        assert_eq!(args.dashboard, "sales");
        assert_eq!(args.select, vec!["region=X,Y", "category="]);
        assert!(args.to.is_none());
    }

    #[test]
    fn test_options_markdown_lists_flags() {
        let md = render_options_markdown();
        assert!(md.contains("--save-table"));
        assert!(md.contains("<SOURCE>"));
    }
}

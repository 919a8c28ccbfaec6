use color_eyre::eyre::eyre;
use color_eyre::Result;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use crate::export::{ExportOptions, EXPORT_FILE_NAME};
use crate::source::CsvOptions;
use crate::CompressionFormat;

const CONFIG_FILE: &str = "config.toml";

/// Manages config directory and config file operations
#[derive(Clone)]
pub struct ConfigManager {
    pub(crate) config_dir: PathBuf,
}

impl ConfigManager {
    /// Create a ConfigManager with a custom config directory (primarily for testing)
    pub fn with_dir(config_dir: PathBuf) -> Self {
        Self { config_dir }
    }

    /// Create a new ConfigManager for the given app name
    pub fn new(app_name: &str) -> Result<Self> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| eyre!("Could not determine config directory"))?
            .join(app_name);

        Ok(Self { config_dir })
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    /// Get path to a specific config file or subdirectory
    pub fn config_path(&self, path: &str) -> PathBuf {
        self.config_dir.join(path)
    }

    pub fn ensure_config_dir(&self) -> Result<()> {
        if !self.config_dir.exists() {
            std::fs::create_dir_all(&self.config_dir)?;
        }
        Ok(())
    }

    /// Generate the default configuration as a fully commented TOML template
    pub fn generate_default_config(&self) -> Result<String> {
        let toml_str = toml::to_string_pretty(&AppConfig::default())
            .map_err(|e| eyre!("Failed to serialize default config: {}", e))?;
        Ok(Self::comment_all_fields(toml_str, Self::collect_all_comments()))
    }

    /// Collect all field comments from the section constants into one map
    fn collect_all_comments() -> HashMap<String, String> {
        let mut comments = HashMap::new();
        for (field, comment) in APP_COMMENTS {
            comments.insert(field.to_string(), comment.to_string());
        }
        let sections: [(&str, &[(&str, &str)]); 4] = [
            ("file_loading", FILE_LOADING_COMMENTS),
            ("export", EXPORT_COMMENTS),
            ("store", STORE_COMMENTS),
            ("logging", LOGGING_COMMENTS),
        ];
        for (section, fields) in sections {
            for (field, comment) in fields {
                comments.insert(format!("{}.{}", section, field), comment.to_string());
            }
        }
        comments
    }

    /// Comment out every field, prefix each with its description, and add the
    /// `None` options that TOML serialization skipped as `# field = null`
    fn comment_all_fields(toml: String, comments: HashMap<String, String>) -> String {
        let mut result = String::new();
        result.push_str("# dashpipe configuration file\n");
        result
            .push_str("# This file uses TOML format. See https://toml.io/ for syntax reference.\n");
        result.push('\n');

        let mut current_section = String::new();
        let mut seen_fields: HashSet<String> = HashSet::new();

        for line in toml.lines() {
            if let Some(section) = Self::extract_section_name(line) {
                current_section = section.clone();
                if let Some((_, header)) = SECTION_HEADERS.iter().find(|(s, _)| *s == section) {
                    result.push_str(header);
                    result.push('\n');
                }
                result.push_str("# ");
                result.push_str(line);
                result.push('\n');
                continue;
            }

            if let Some(field_path) = Self::extract_field_path(line, &current_section) {
                if let Some(comment) = comments.get(&field_path) {
                    for comment_line in comment.lines() {
                        result.push_str("# ");
                        result.push_str(comment_line);
                        result.push('\n');
                    }
                }
                seen_fields.insert(field_path);
                result.push_str("# ");
                result.push_str(line);
                result.push('\n');
            } else {
                result.push_str(line);
                result.push('\n');
            }
        }

        Self::add_missing_option_fields(result, &comments, &seen_fields)
    }

    fn add_missing_option_fields(
        mut result: String,
        comments: &HashMap<String, String>,
        seen_fields: &HashSet<String>,
    ) -> String {
        let mut missing_by_section: HashMap<&str, Vec<&str>> = HashMap::new();
        for field_path in OPTION_FIELDS {
            if seen_fields.contains(*field_path) || !comments.contains_key(*field_path) {
                continue;
            }
            if let Some((section, _)) = field_path.split_once('.') {
                missing_by_section.entry(section).or_default().push(field_path);
            }
        }

        for (section, fields) in &missing_by_section {
            let section_header = format!("[{}]", section);
            let Some(section_pos) = result.find(&section_header) else {
                continue;
            };
            let after_header_start = section_pos + section_header.len();
            let newline_pos = result[after_header_start..].find('\n').unwrap_or(0);
            let insert_pos = after_header_start + newline_pos + 1;

            let mut new_content = String::new();
            for field_path in fields {
                if let Some(comment) = comments.get(*field_path) {
                    for comment_line in comment.lines() {
                        new_content.push_str("# ");
                        new_content.push_str(comment_line);
                        new_content.push('\n');
                    }
                }
                let field_name = field_path.rsplit('.').next().unwrap_or(field_path);
                new_content.push_str(&format!("# {} = null\n\n", field_name));
            }
            result.insert_str(insert_pos, &new_content);
        }

        result
    }

    /// Extract section name from TOML line like "[export]"
    fn extract_section_name(line: &str) -> Option<String> {
        let trimmed = line.trim();
        if trimmed.starts_with('[') && trimmed.ends_with(']') {
            Some(trimmed[1..trimmed.len() - 1].to_string())
        } else {
            None
        }
    }

    fn extract_field_path(line: &str, current_section: &str) -> Option<String> {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with('[') {
            return None;
        }
        let (field_name, _) = trimmed.split_once('=')?;
        let field_name = field_name.trim();
        if current_section.is_empty() {
            Some(field_name.to_string())
        } else {
            Some(format!("{}.{}", current_section, field_name))
        }
    }

    /// Write default configuration to config file
    pub fn write_default_config(&self, force: bool) -> Result<PathBuf> {
        let config_path = self.config_path(CONFIG_FILE);

        if config_path.exists() && !force {
            return Err(eyre!(
                "Config file already exists at {}. Use --force to overwrite.",
                config_path.display()
            ));
        }

        self.ensure_config_dir()?;
        std::fs::write(&config_path, self.generate_default_config()?)?;

        Ok(config_path)
    }
}

/// Complete application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Configuration format version (for future compatibility)
    pub version: String,
    pub file_loading: FileLoadingConfig,
    pub export: ExportConfig,
    pub store: StoreConfig,
    pub logging: LoggingConfig,
}

const APP_COMMENTS: &[(&str, &str)] = &[(
    "version",
    "Configuration format version (for future compatibility)",
)];

const SECTION_HEADERS: &[(&str, &str)] = &[
    (
        "file_loading",
        "# ============================================================================\n# File Loading Defaults\n# ============================================================================",
    ),
    (
        "export",
        "# ============================================================================\n# CSV Export\n# ============================================================================",
    ),
    (
        "store",
        "# ============================================================================\n# Table Store\n# ============================================================================\n# Tables named as `table:<name>` are read from and saved to this directory.",
    ),
    (
        "logging",
        "# ============================================================================\n# Logging\n# ============================================================================",
    ),
];

/// Option fields that are skipped when `None` but should still appear in the template
const OPTION_FIELDS: &[&str] = &[
    "file_loading.delimiter",
    "file_loading.has_header",
    "file_loading.infer_schema_length",
    "file_loading.decimal_comma",
    "file_loading.parse_dates",
    "export.compression",
    "store.dir",
];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileLoadingConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delimiter: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_header: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub infer_schema_length: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decimal_comma: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parse_dates: Option<bool>,
}

const FILE_LOADING_COMMENTS: &[(&str, &str)] = &[
    (
        "delimiter",
        "Field delimiter as an ASCII code (44 = ',', 59 = ';', 9 = tab)\nDefault: derived from the file extension",
    ),
    ("has_header", "Whether the first row holds column names\nDefault: true"),
    (
        "infer_schema_length",
        "Rows scanned to infer column types\nDefault: 1000",
    ),
    (
        "decimal_comma",
        "Parse numbers written with a decimal comma (2,6)\nDefault: false",
    ),
    (
        "parse_dates",
        "Try to parse date-looking text columns while reading\nDefault: true",
    ),
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub file_name: String,
    pub delimiter: u8,
    pub include_header: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compression: Option<String>,
}

const EXPORT_COMMENTS: &[(&str, &str)] = &[
    (
        "file_name",
        "File name used when --export names a directory\nDefault: filtered_data.csv",
    ),
    ("delimiter", "Field delimiter as an ASCII code"),
    ("include_header", "Write a header row"),
    (
        "compression",
        "Compress exports: \"gzip\", \"zstd\", \"bzip2\" or \"xz\"",
    ),
];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
}

const STORE_COMMENTS: &[(&str, &str)] = &[(
    "dir",
    "Directory holding one Parquet file per table\nDefault: the platform data directory, e.g. ~/.local/share/dashpipe/tables",
)];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub filter: String,
}

const LOGGING_COMMENTS: &[(&str, &str)] = &[(
    "filter",
    "Log filter directive (same syntax as RUST_LOG, which takes precedence)\nLogs are written to stderr",
)];

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            version: "0.1".to_string(),
            file_loading: FileLoadingConfig::default(),
            export: ExportConfig::default(),
            store: StoreConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            file_name: EXPORT_FILE_NAME.to_string(),
            delimiter: b',',
            include_header: true,
            compression: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "warn".to_string(),
        }
    }
}

// Configuration loading and merging
impl AppConfig {
    /// Load configuration from all layers (default → user)
    pub fn load(app_name: &str) -> Result<Self> {
        let manager = ConfigManager::new(app_name)?;
        Self::load_from(&manager)
    }

    /// Load configuration using the given manager's directory
    pub fn load_from(manager: &ConfigManager) -> Result<Self> {
        let mut config = AppConfig::default();
        let config_path = manager.config_path(CONFIG_FILE);
        if config_path.exists() {
            config.merge(Self::read_file(&config_path)?);
        }
        config.validate()?;
        Ok(config)
    }

    fn read_file(config_path: &Path) -> Result<AppConfig> {
        let content = std::fs::read_to_string(config_path).map_err(|e| {
            eyre!(
                "Failed to read config file at {}: {}",
                config_path.display(),
                e
            )
        })?;

        toml::from_str(&content).map_err(|e| {
            eyre!(
                "Failed to parse config file at {}: {}",
                config_path.display(),
                e
            )
        })
    }

    /// Merge another config into this one (other takes precedence)
    pub fn merge(&mut self, other: AppConfig) {
        if other.version != AppConfig::default().version {
            self.version = other.version;
        }
        self.file_loading.merge(other.file_loading);
        self.export.merge(other.export);
        self.store.merge(other.store);
        self.logging.merge(other.logging);
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if !self.version.starts_with("0.1") {
            return Err(eyre!(
                "Unsupported config version: {}. Expected 0.1.x",
                self.version
            ));
        }

        if self.file_loading.infer_schema_length == Some(0) {
            return Err(eyre!("infer_schema_length must be greater than 0"));
        }

        if self.export.file_name.trim().is_empty() {
            return Err(eyre!("export.file_name must not be empty"));
        }

        if let Some(name) = &self.export.compression {
            if CompressionFormat::from_name(name).is_none() {
                return Err(eyre!(
                    "Invalid export compression: {}. Must be 'gzip', 'zstd', 'bzip2' or 'xz'",
                    name
                ));
            }
        }

        tracing_subscriber::EnvFilter::try_new(&self.logging.filter)
            .map_err(|e| eyre!("Invalid logging filter '{}': {}", self.logging.filter, e))?;

        Ok(())
    }

    /// CSV reading options with config values applied over the defaults
    pub fn csv_options(&self) -> CsvOptions {
        let defaults = CsvOptions::default();
        let fl = &self.file_loading;
        CsvOptions {
            delimiter: fl.delimiter,
            has_header: fl.has_header.unwrap_or(defaults.has_header),
            infer_schema_length: fl
                .infer_schema_length
                .unwrap_or(defaults.infer_schema_length),
            decimal_comma: fl.decimal_comma.unwrap_or(defaults.decimal_comma),
            parse_dates: fl.parse_dates.unwrap_or(defaults.parse_dates),
            ..defaults
        }
    }

    pub fn export_options(&self) -> ExportOptions {
        ExportOptions {
            file_name: self.export.file_name.clone(),
            delimiter: self.export.delimiter,
            include_header: self.export.include_header,
            compression: self
                .export
                .compression
                .as_deref()
                .and_then(CompressionFormat::from_name),
        }
    }
}

impl FileLoadingConfig {
    pub fn merge(&mut self, other: Self) {
        if other.delimiter.is_some() {
            self.delimiter = other.delimiter;
        }
        if other.has_header.is_some() {
            self.has_header = other.has_header;
        }
        if other.infer_schema_length.is_some() {
            self.infer_schema_length = other.infer_schema_length;
        }
        if other.decimal_comma.is_some() {
            self.decimal_comma = other.decimal_comma;
        }
        if other.parse_dates.is_some() {
            self.parse_dates = other.parse_dates;
        }
    }
}

impl ExportConfig {
    pub fn merge(&mut self, other: Self) {
        let default = ExportConfig::default();
        if other.file_name != default.file_name {
            self.file_name = other.file_name;
        }
        if other.delimiter != default.delimiter {
            self.delimiter = other.delimiter;
        }
        if other.include_header != default.include_header {
            self.include_header = other.include_header;
        }
        if other.compression.is_some() {
            self.compression = other.compression;
        }
    }
}

impl StoreConfig {
    pub fn merge(&mut self, other: Self) {
        if other.dir.is_some() {
            self.dir = other.dir;
        }
    }
}

impl LoggingConfig {
    pub fn merge(&mut self, other: Self) {
        if other.filter != LoggingConfig::default().filter {
            self.filter = other.filter;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_field_path() {
        assert_eq!(
            ConfigManager::extract_field_path("delimiter = 44", "export"),
            Some("export.delimiter".to_string())
        );
        assert_eq!(
            ConfigManager::extract_field_path("version = \"0.1\"", ""),
            Some("version".to_string())
        );
        assert_eq!(ConfigManager::extract_field_path("# note", "export"), None);
        assert_eq!(
            ConfigManager::extract_section_name("[logging]"),
            Some("logging".to_string())
        );
    }

    #[test]
    fn test_csv_options_from_config() {
        let mut config = AppConfig::default();
        config.file_loading.delimiter = Some(b';');
        config.file_loading.decimal_comma = Some(true);
        let opts = config.csv_options();
        assert_eq!(opts.delimiter, Some(b';'));
        assert!(opts.decimal_comma);
        assert!(opts.has_header);
        assert_eq!(opts.infer_schema_length, 1000);
    }

    #[test]
    fn test_export_options_from_config() {
        let mut config = AppConfig::default();
        config.export.compression = Some("zstd".to_string());
        config.export.include_header = false;
        config.export.file_name = "air.csv".to_string();
        let opts = config.export_options();
        assert_eq!(opts.compression, Some(CompressionFormat::Zstd));
        assert!(!opts.include_header);
        assert_eq!(opts.file_name, "air.csv");
    }
}

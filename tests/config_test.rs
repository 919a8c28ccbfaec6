use dashpipe::config::{AppConfig, ConfigManager};
use dashpipe::CompressionFormat;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

// Helper to create a temporary config directory for testing
fn setup_test_config_dir() -> (TempDir, ConfigManager) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let config_manager = ConfigManager::with_dir(temp_dir.path().to_path_buf());
    (temp_dir, config_manager)
}

#[test]
fn test_default_config() {
    let config = AppConfig::default();

    assert_eq!(config.version, "0.1");

    assert_eq!(config.file_loading.delimiter, None);
    assert_eq!(config.file_loading.infer_schema_length, None);

    assert_eq!(config.export.file_name, "filtered_data.csv");
    assert_eq!(config.export.delimiter, b',');
    assert!(config.export.include_header);
    assert_eq!(config.export.compression, None);

    assert_eq!(config.store.dir, None);
    assert_eq!(config.logging.filter, "warn");
}

#[test]
fn test_generate_default_config() {
    let (_temp_dir, config_manager) = setup_test_config_dir();

    let template = config_manager.generate_default_config().unwrap();

    assert!(template.contains("[file_loading]"));
    assert!(template.contains("[export]"));
    assert!(template.contains("[logging]"));
    assert!(template.contains("version = \"0.1\""));

    // Options skipped by serialization still appear, commented out
    assert!(template.contains("# delimiter = null"));
    assert!(template.contains("# compression = null"));

    // Every value line is commented out
    for line in template.lines() {
        let trimmed = line.trim();
        assert!(
            trimmed.is_empty() || trimmed.starts_with('#'),
            "uncommented line: {}",
            line
        );
    }
}

#[test]
fn test_generated_template_loads_as_defaults() {
    let (_temp_dir, config_manager) = setup_test_config_dir();
    config_manager.write_default_config(false).unwrap();

    let config = AppConfig::load_from(&config_manager).unwrap();
    assert_eq!(config, AppConfig::default());
}

#[test]
fn test_write_config_without_force_fails_if_exists() {
    let (_temp_dir, config_manager) = setup_test_config_dir();

    config_manager.write_default_config(false).unwrap();
    let result = config_manager.write_default_config(false);

    assert!(result.is_err());
    assert!(result.unwrap_err().to_string().contains("already exists"));
}

#[test]
fn test_write_config_with_force_overwrites() {
    let (_temp_dir, config_manager) = setup_test_config_dir();

    let first_path = config_manager.write_default_config(false).unwrap();
    fs::write(&first_path, "garbage").unwrap();
    let second_path = config_manager.write_default_config(true).unwrap();

    assert_eq!(first_path, second_path);
    let content = fs::read_to_string(&second_path).unwrap();
    assert!(content.contains("[export]"));
}

#[test]
fn test_load_config_with_no_file() {
    let (_temp_dir, config_manager) = setup_test_config_dir();
    let config = AppConfig::load_from(&config_manager).unwrap();
    assert_eq!(config, AppConfig::default());
}

#[test]
fn test_load_and_parse_minimal_config() {
    let (_temp_dir, config_manager) = setup_test_config_dir();
    config_manager.ensure_config_dir().unwrap();

    let minimal = r#"
        [file_loading]
        delimiter = 59
        decimal_comma = true

        [store]
        dir = "/srv/dashpipe/tables"
    "#;
    fs::write(config_manager.config_path("config.toml"), minimal).unwrap();

    let config = AppConfig::load_from(&config_manager).unwrap();
    assert_eq!(config.file_loading.delimiter, Some(b';'));
    assert_eq!(config.store.dir, Some(PathBuf::from("/srv/dashpipe/tables")));

    // Defaults fill everything else
    assert_eq!(config.export.file_name, "filtered_data.csv");
    assert_eq!(config.logging.filter, "warn");

    let opts = config.csv_options();
    assert_eq!(opts.delimiter, Some(b';'));
    assert!(opts.decimal_comma);
    assert!(opts.has_header);
}

#[test]
fn test_unparseable_config_file_is_an_error() {
    let (_temp_dir, config_manager) = setup_test_config_dir();
    config_manager.ensure_config_dir().unwrap();
    fs::write(config_manager.config_path("config.toml"), "[export\nfile_name = ").unwrap();

    let err = AppConfig::load_from(&config_manager).unwrap_err();
    assert!(err.to_string().contains("Failed to parse config file"));
}

#[test]
fn test_merge_configs() {
    let mut base = AppConfig::default();
    let mut overlay = AppConfig::default();
    overlay.export.compression = Some("zstd".to_string());
    overlay.logging.filter = "dashpipe=debug".to_string();
    overlay.file_loading.has_header = Some(false);

    base.merge(overlay);

    assert_eq!(base.export.compression.as_deref(), Some("zstd"));
    assert_eq!(base.logging.filter, "dashpipe=debug");
    assert_eq!(base.file_loading.has_header, Some(false));
    // Still default
    assert_eq!(base.export.file_name, "filtered_data.csv");
    assert_eq!(base.file_loading.delimiter, None);

    assert_eq!(
        base.export_options().compression,
        Some(CompressionFormat::Zstd)
    );
}

#[test]
fn test_validate_config_valid() {
    assert!(AppConfig::default().validate().is_ok());
}

#[test]
fn test_validate_config_invalid_version() {
    let mut config = AppConfig::default();
    config.version = "2.0".to_string();
    let result = config.validate();
    assert!(result.is_err());
    assert!(result
        .unwrap_err()
        .to_string()
        .contains("Unsupported config version"));
}

#[test]
fn test_validate_config_zero_infer_schema_length() {
    let mut config = AppConfig::default();
    config.file_loading.infer_schema_length = Some(0);
    assert!(config
        .validate()
        .unwrap_err()
        .to_string()
        .contains("infer_schema_length"));
}

#[test]
fn test_validate_config_bad_compression() {
    let mut config = AppConfig::default();
    config.export.compression = Some("rar".to_string());
    assert!(config
        .validate()
        .unwrap_err()
        .to_string()
        .contains("Invalid export compression"));
}

#[test]
fn test_validate_config_empty_export_name() {
    let mut config = AppConfig::default();
    config.export.file_name = "  ".to_string();
    assert!(config.validate().is_err());
}

use chrono::NaiveDate;
use clap::Parser;
use color_eyre::eyre::{eyre, Report, WrapErr};
use color_eyre::Result;
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use dashpipe::error_display::user_message_from_report;
use dashpipe::{
    recompute, resolve_export_path, run_clean_job, write_export, AppConfig, Args, CleaningRules,
    ColumnKind, ColumnSummary, ConfigManager, CsvOptions, DashboardSpec, DataSource, Dataset,
    DatasetLoader, FigureData, FileSource, FilterState, Outcome, ParquetTableStore, Preview,
    Recomputed, SourceHandle, TableSource, TableStore,
};

/// File reading options: config values with command-line flags on top
fn csv_options(args: &Args, config: &AppConfig) -> CsvOptions {
    let mut opts = config.csv_options();
    if let Some(no_header) = args.no_header {
        opts.has_header = !no_header;
    }
    if let Some(delimiter) = args.delimiter {
        opts = opts.with_delimiter(delimiter);
    }
    if args.decimal_comma {
        opts = opts.with_decimal_comma(true);
    }
    if let Some(n) = args.infer_schema_length {
        opts.infer_schema_length = n;
    }
    opts.compression = args.compression;
    opts.format = args.format;
    opts
}

fn table_store(args: &Args, config: &AppConfig) -> Result<ParquetTableStore> {
    match args.store_dir.clone().or_else(|| config.store.dir.clone()) {
        Some(dir) => Ok(ParquetTableStore::new(dir)),
        None => ParquetTableStore::default_location()
            .ok_or_else(|| eyre!("Could not determine a table store directory; use --store-dir")),
    }
}

fn open_source(args: &Args, config: &AppConfig, source: &str) -> Result<Box<dyn DataSource>> {
    Ok(match SourceHandle::parse(source) {
        SourceHandle::File(path) => Box::new(FileSource::new(path, csv_options(args, config))),
        SourceHandle::Table(table) => {
            let store: Arc<dyn TableStore> = Arc::new(table_store(args, config)?);
            Box::new(TableSource::new(store, table))
        }
    })
}

fn parse_day(flag: &str, value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .wrap_err_with(|| format!("--{} expects YYYY-MM-DD, got '{}'", flag, value))
}

/// Default dashboard state narrowed by --from/--to/--select
fn filter_state(args: &Args, dataset: &Dataset) -> Result<FilterState> {
    let domain = dataset.domain();
    let mut state = FilterState::unfiltered(domain);

    if args.from.is_some() || args.to.is_some() {
        let column = dataset
            .schema()
            .names_of(ColumnKind::Temporal)
            .next()
            .ok_or_else(|| eyre!("--from/--to need a temporal column in the dashboard schema"))?;
        let (lo, hi) = domain
            .date_bounds(column)
            .ok_or_else(|| eyre!("Column '{}' has no dates to filter", column))?;
        let start = args.from.as_deref().map(|v| parse_day("from", v)).transpose()?;
        let end = args.to.as_deref().map(|v| parse_day("to", v)).transpose()?;
        state.set_date_range(column, start.unwrap_or(lo), end.unwrap_or(hi));
    }

    for selection in &args.select {
        let (column, values) = selection
            .split_once('=')
            .ok_or_else(|| eyre!("--select expects COLUMN=V1,V2, got '{}'", selection))?;
        let members: Vec<&str> = values
            .split(',')
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .collect();
        state.select(column.trim(), members);
    }

    state.conform(domain);
    Ok(state)
}

fn print_text(result: &Recomputed, dashboard: &DashboardSpec) {
    println!("Dashboard: {} ({} rows)", dashboard.name, result.view.height());
    let (kpis, figures, description, estimate) = match &result.outcome {
        Outcome::NoData => {
            println!("No data in the selected range.");
            return;
        }
        Outcome::Ready {
            kpis,
            figures,
            description,
            estimate,
        } => (kpis, figures, description, estimate),
    };

    println!();
    for kpi in kpis {
        println!("  {:<20} {}", kpi.label, kpi.display());
    }

    for figure in figures {
        println!();
        println!("{} [{:?}]", figure.name, figure.chart);
        match &figure.data {
            FigureData::Grouped(agg) => {
                println!("  {} | {}", agg.key_names.join(" | "), agg.func.as_str());
                for row in &agg.rows {
                    let keys: Vec<String> = row.keys.iter().map(|k| k.to_string()).collect();
                    let value = row.value.map_or("n/a".to_string(), |v| format!("{:.2}", v));
                    println!("  {} | {}", keys.join(" | "), value);
                }
            }
            FigureData::Grid(grid) => {
                let header: Vec<String> = grid.columns.iter().map(|c| format!("{:>8}", c.to_string())).collect();
                println!("  {:>8} {}", format!("{}\\{}", grid.row_key, grid.column_key), header.join(""));
                for (r, key) in grid.rows.iter().enumerate() {
                    let cells: Vec<String> = grid.cells[r]
                        .iter()
                        .map(|v| v.map_or(format!("{:>8}", "-"), |v| format!("{:>8.3}", v)))
                        .collect();
                    println!("  {:>8} {}", key.to_string(), cells.join(""));
                }
            }
            FigureData::Bins(hist) => {
                for bin in &hist.bins {
                    println!("  [{:>10.3}, {:>10.3}] {}", bin.lower, bin.upper, bin.count);
                }
                if hist.skipped > 0 {
                    println!("  ({} missing values not binned)", hist.skipped);
                }
            }
        }
    }

    if let Some(summary) = description {
        println!();
        print_description(summary);
    }

    match estimate {
        None => {}
        Some(Ok(e)) => {
            println!();
            let fit = &e.fit;
            println!(
                "Linear fit {} ~ {}: slope {:.4}, intercept {:.4}, n = {}",
                e.target,
                e.predictor,
                fit.slope(),
                fit.intercept(),
                fit.sample_size()
            );
            if let (Some(x), Some(y)) = (e.at, e.predicted) {
                println!("Estimated {} at {} = {:.3}", e.target, x, y);
            }
        }
        Some(Err(err)) => {
            println!();
            println!("Estimate unavailable: {}", err);
        }
    }
}

fn print_description(summary: &[ColumnSummary]) {
    let cell = |v: Option<f64>| v.map_or(format!("{:>10}", "n/a"), |v| format!("{:>10.3}", v));
    println!(
        "  {:<16} {:>8} {:>10} {:>10} {:>10} {:>10} {:>10} {:>10} {:>10}",
        "column", "count", "mean", "std", "min", "25%", "50%", "75%", "max"
    );
    for s in summary {
        let stats = [s.mean, s.std, s.min, s.q25, s.median, s.q75, s.max].map(cell);
        println!("  {:<16} {:>8} {}", s.column, s.count, stats.join(" "));
    }
}

fn print_preview(preview: &Preview) {
    println!();
    println!("  {}", preview.columns.join(" | "));
    for row in &preview.rows {
        println!("  {}", row.join(" | "));
    }
    if preview.remaining > 0 {
        println!("  ... {} more rows", preview.remaining);
    }
}

fn run_clean(args: &Args, config: &AppConfig, source: &str, rules: &Path) -> Result<()> {
    let output = args
        .output
        .as_ref()
        .ok_or_else(|| eyre!("--clean requires --output"))?;
    let rules = CleaningRules::from_file(rules)?;
    let source = open_source(args, config, source)?;
    let report = run_clean_job(source.as_ref(), output, &rules)?;
    println!(
        "Cleaned {} rows x {} columns into {}",
        report.rows,
        report.columns,
        report.output.display()
    );
    Ok(())
}

fn run(args: &Args, config: &AppConfig) -> Result<()> {
    let source_arg = args
        .source
        .as_deref()
        .ok_or_else(|| eyre!("A data source is required"))?;

    if let Some(rules) = &args.clean {
        return run_clean(args, config, source_arg, rules);
    }

    let mut dashboard = DashboardSpec::resolve(&args.dashboard)?;
    if let (Some(x), Some(est)) = (args.predict, dashboard.estimator.as_mut()) {
        est.at = Some(x);
    }

    let source = open_source(args, config, source_arg)?;
    let loader = DatasetLoader::default();
    let dataset = loader.load(source.as_ref(), &dashboard.schema)?;

    let state = filter_state(args, &dataset)?;
    let result = recompute(&dataset, &state, &dashboard)?;

    let preview = args.head.map(|n| result.view.preview(n)).transpose()?;
    if args.json {
        let mut summary = result.summary(&dashboard);
        if let Some(preview) = &preview {
            summary["preview"] = serde_json::to_value(preview)?;
        }
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_text(&result, &dashboard);
        if let Some(preview) = &preview {
            print_preview(preview);
        }
    }

    if let Some(path) = &args.export {
        let mut options = config.export_options();
        if args.compress.is_some() {
            options.compression = args.compress;
        }
        let path = resolve_export_path(path, &options);
        write_export(&path, &result.view, &options)?;
        eprintln!("Exported {} rows to {}", result.view.height(), path.display());
    }

    if let Some(table) = &args.save_table {
        let store = table_store(args, config)?;
        let report = loader.save(&store, table, &result.view)?;
        eprintln!(
            "Replaced table '{}' with {} rows ({} previous rows discarded)",
            report.table,
            report.rows_written,
            report.rows_discarded()
        );
    }

    Ok(())
}

/// Load failures already name their source, so no path is added here.
fn error_message(report: &Report) -> String {
    user_message_from_report(report, None)
}

fn init_logging(config: &AppConfig, debug: bool) {
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.filter))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn handle_early_exit_flags(args: &Args) -> Result<Option<()>> {
    if args.generate_config {
        let manager = ConfigManager::new(dashpipe::APP_NAME)?;
        let path = manager.write_default_config(args.force)?;
        println!("Wrote default configuration to {}", path.display());
        return Ok(Some(()));
    }
    Ok(None)
}

fn main() -> Result<()> {
    let args = Args::parse();
    color_eyre::install()?;

    if let Some(()) = handle_early_exit_flags(&args)? {
        return Ok(());
    }

    let config = AppConfig::load(dashpipe::APP_NAME)?;
    init_logging(&config, args.debug);

    if let Err(e) = run(&args, &config) {
        eprintln!("Error: {}", error_message(&e));
        std::process::exit(1);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(extra: &[&str]) -> Args {
        let mut argv = vec!["dashpipe", "sales.csv"];
        argv.extend_from_slice(extra);
        Args::parse_from(argv)
    }

    #[test]
    fn test_flags_override_config_csv_options() {
        let mut config = AppConfig::default();
        config.file_loading.delimiter = Some(b',');
        let opts = csv_options(
            &args(&["--delimiter", "59", "--no-header", "true", "--decimal-comma"]),
            &config,
        );
        assert_eq!(opts.delimiter, Some(b';'));
        assert!(!opts.has_header);
        assert!(opts.decimal_comma);
    }

    #[test]
    fn test_parse_day() {
        assert_eq!(
            parse_day("from", "2024-01-02").unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 2).unwrap()
        );
        assert!(parse_day("from", "02/01/2024").is_err());
    }

    #[test]
    fn test_argument_errors_are_not_reported_as_load_failures() {
        let err = parse_day("from", "02/01/2024").unwrap_err();
        assert_eq!(
            error_message(&err),
            "--from expects YYYY-MM-DD, got '02/01/2024'"
        );

        let err = DashboardSpec::resolve("/tmp/no-such-dashboard.toml").unwrap_err();
        let msg = error_message(&err);
        assert!(msg.starts_with("Failed to read dashboard file"), "{}", msg);
    }

    #[test]
    fn test_load_errors_keep_their_source_name() {
        let source = FileSource::new("/no/such/sales.csv", CsvOptions::default());
        let err = Report::new(source.read().unwrap_err());
        assert!(error_message(&err).starts_with("Load failed for"));
    }
}

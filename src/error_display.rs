//! User-facing error message formatting.
//!
//! Uses typed error matching (PolarsError variants, io::ErrorKind) rather than
//! string parsing to produce actionable, implementation-agnostic messages.

use polars::prelude::PolarsError;
use std::io;
use std::path::Path;

use crate::error::PipelineError;

/// Format a PolarsError as a user-facing message by matching on its variant.
pub fn user_message_from_polars(err: &PolarsError) -> String {
    use polars::prelude::PolarsError as PE;

    match err {
        PE::ColumnNotFound(msg) => format!(
            "Column not found: {}. Check spelling and that the column exists.",
            msg
        ),
        PE::Duplicate(msg) => format!("Duplicate column: {}", msg),
        PE::IO { error, msg } => {
            user_message_from_io(error.as_ref(), msg.as_ref().map(|m| m.as_ref()))
        }
        PE::NoData(msg) => format!("No data: {}", msg),
        PE::SchemaMismatch(msg) => format!("Schema mismatch: {}", msg),
        PE::ShapeMismatch(msg) => format!("Row shape mismatch: {}", msg),
        PE::InvalidOperation(msg) => format!("Operation not allowed: {}", msg),
        PE::OutOfBounds(msg) => format!("Index or row out of bounds: {}", msg),
        PE::SchemaFieldNotFound(msg) => format!("Schema field not found: {}", msg),
        PE::ComputeError(msg) => first_line(msg),
        PE::Context { error, msg } => {
            let inner = user_message_from_polars(error);
            format!("{}: {}", msg, inner)
        }
        #[allow(unreachable_patterns)]
        _ => first_line(&err.to_string()),
    }
}

/// Format an io::Error as a user-facing message by matching on ErrorKind.
pub fn user_message_from_io(err: &io::Error, context: Option<&str>) -> String {
    use std::io::ErrorKind;

    let base: String = match err.kind() {
        ErrorKind::NotFound => "File or directory not found.".to_string(),
        ErrorKind::PermissionDenied => "Permission denied. Check read access.".to_string(),
        ErrorKind::ConnectionRefused => "Connection refused.".to_string(),
        ErrorKind::InvalidData | ErrorKind::InvalidInput => {
            "Invalid or corrupted data.".to_string()
        }
        ErrorKind::UnexpectedEof => "Unexpected end of file.".to_string(),
        ErrorKind::OutOfMemory => "Out of memory.".to_string(),
        ErrorKind::Other => {
            let msg = err.to_string();
            if msg.contains("No space left") {
                return "No space left on device. Free up disk space and try again.".to_string();
            }
            if msg.contains("Is a directory") {
                return "Path is a directory, not a file.".to_string();
            }
            return if context.is_some() {
                format!("I/O error: {}", msg)
            } else {
                msg
            };
        }
        _ => err.to_string(),
    };

    match context {
        Some(ctx) if !ctx.is_empty() => format!("{} {}", base, ctx),
        _ => base,
    }
}

/// Like [`user_message_from_io`], for errors raised while creating or writing a file.
pub fn user_message_from_write_io(err: &io::Error) -> String {
    use std::io::ErrorKind;

    match err.kind() {
        ErrorKind::NotFound => "Directory not found.".to_string(),
        ErrorKind::PermissionDenied => "Permission denied. Check write access.".to_string(),
        _ => user_message_from_io(err, None),
    }
}

/// Format a color_eyre Report by downcasting to known error types.
/// Walks the cause chain to find PipelineError, PolarsError or io::Error.
pub fn user_message_from_report(report: &color_eyre::eyre::Report, path: Option<&Path>) -> String {
    for cause in report.chain() {
        if let Some(pe) = cause.downcast_ref::<PipelineError>() {
            return pe.to_string();
        }
        if let Some(pe) = cause.downcast_ref::<PolarsError>() {
            return with_path(user_message_from_polars(pe), path);
        }
        if let Some(io_err) = cause.downcast_ref::<io::Error>() {
            return with_path(user_message_from_io(io_err, None), path);
        }
    }

    // Fallback: use first line of display to avoid long tracebacks
    with_path(first_line(&report.to_string()), path)
}

fn with_path(msg: String, path: Option<&Path>) -> String {
    match path {
        Some(p) => format!("Failed to load {}: {}", p.display(), msg),
        None => msg,
    }
}

fn first_line(msg: &str) -> String {
    msg.lines()
        .next()
        .map(str::trim)
        .unwrap_or("An error occurred")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_message_from_io_not_found() {
        let err = io::Error::new(io::ErrorKind::NotFound, "No such file");
        let msg = user_message_from_io(&err, None);
        assert!(
            msg.contains("not found"),
            "expected 'not found', got: {}",
            msg
        );
    }

    #[test]
    fn test_user_message_from_io_permission_denied() {
        let err = io::Error::new(io::ErrorKind::PermissionDenied, "Permission denied");
        let msg = user_message_from_io(&err, Some("(sales.csv)"));
        assert_eq!(msg, "Permission denied. Check read access. (sales.csv)");
    }

    #[test]
    fn test_write_messages_do_not_mention_read_access() {
        let denied = io::Error::new(io::ErrorKind::PermissionDenied, "Permission denied");
        assert_eq!(
            user_message_from_write_io(&denied),
            "Permission denied. Check write access."
        );
        let missing = io::Error::new(io::ErrorKind::NotFound, "No such file");
        assert_eq!(user_message_from_write_io(&missing), "Directory not found.");
        let full = io::Error::new(io::ErrorKind::Other, "No space left on device");
        assert!(user_message_from_write_io(&full).starts_with("No space left"));
    }

    #[test]
    fn test_user_message_from_polars_column_not_found() {
        let err = PolarsError::ColumnNotFound("foo".into());
        let msg = user_message_from_polars(&err);
        assert!(msg.contains("foo"), "expected 'foo', got: {}", msg);
        assert!(msg.contains("Column not found"));
    }

    #[test]
    fn test_compute_error_keeps_first_line() {
        let err = PolarsError::ComputeError("could not parse `abc`\n\nhint: try strict=false".into());
        assert_eq!(user_message_from_polars(&err), "could not parse `abc`");
    }

    #[test]
    fn test_report_prefers_pipeline_error() {
        let report = color_eyre::eyre::Report::new(PipelineError::persistence("t", "locked"));
        let msg = user_message_from_report(&report, Some(Path::new("x.csv")));
        assert_eq!(msg, "Save to table 't' failed: locked");
    }

    #[test]
    fn test_report_io_error_with_path() {
        let report = color_eyre::eyre::Report::new(io::Error::new(io::ErrorKind::NotFound, "gone"));
        let msg = user_message_from_report(&report, Some(Path::new("x.csv")));
        assert_eq!(msg, "Failed to load x.csv: File or directory not found.");
    }
}

use std::path::PathBuf;
use thiserror::Error;

/// All errors produced by the QI dashboard crates.
#[derive(Error, Debug)]
pub enum QiError {
    /// A file could not be opened or read from disk.
    #[error("Failed to read file {path}: {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A JSON document could not be parsed.
    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// The file name does not end in a supported extension.
    #[error("Unsupported file format: {0}. Please use CSV or JSON.")]
    UnsupportedFormat(String),

    /// Parsing succeeded but produced zero rows.
    #[error("No data found in {0}")]
    EmptyDataset(String),

    /// JSON parsed but was not an array of flat objects.
    #[error("Invalid data shape: {0}")]
    InvalidShape(String),

    /// A date string did not match any recognised format.
    #[error("Invalid date: {0}")]
    DateParse(String),

    /// A project id was not found in the project store.
    #[error("Project not found: {0}")]
    ProjectNotFound(String),

    /// A user-supplied value failed validation.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A configuration value is missing or invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Pass-through for any raw I/O error that does not carry a path.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Catch-all for errors from third-party crates via `anyhow`.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Convenience alias used throughout the dashboard crates.
pub type Result<T> = std::result::Result<T, QiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_file_read() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
        let err = QiError::FileRead {
            path: PathBuf::from("/data/qi-data.csv"),
            source: io_err,
        };
        let msg = err.to_string();
        assert!(msg.contains("Failed to read file"));
        assert!(msg.contains("/data/qi-data.csv"));
        assert!(msg.contains("no such file"));
    }

    #[test]
    fn test_error_display_unsupported_format() {
        let err = QiError::UnsupportedFormat("report.xlsx".to_string());
        assert_eq!(
            err.to_string(),
            "Unsupported file format: report.xlsx. Please use CSV or JSON."
        );
    }

    #[test]
    fn test_error_display_empty_dataset() {
        let err = QiError::EmptyDataset("empty.csv".to_string());
        assert_eq!(err.to_string(), "No data found in empty.csv");
    }

    #[test]
    fn test_error_display_project_not_found() {
        let err = QiError::ProjectNotFound("abc".to_string());
        assert_eq!(err.to_string(), "Project not found: abc");
    }

    #[test]
    fn test_error_display_config() {
        let err = QiError::Config("bad rules file".to_string());
        assert_eq!(err.to_string(), "Configuration error: bad rules file");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: QiError = io_err.into();
        assert!(err.to_string().contains("denied"));
    }

    #[test]
    fn test_error_from_serde_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("{invalid}").unwrap_err();
        let err: QiError = json_err.into();
        assert!(err.to_string().contains("Failed to parse JSON"));
    }
}

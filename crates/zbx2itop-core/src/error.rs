//! Export error types.

use thiserror::Error;

/// Errors that can occur while exporting hosts.
#[derive(Debug, Error)]
pub enum ExportError {
    /// Invalid or incomplete configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(String),

    /// YAML parse error.
    #[error("YAML error: {0}")]
    Yaml(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(String),

    /// HTTP transport error.
    #[error("HTTP error: {0}")]
    Http(String),

    /// Error object returned by the Zabbix API.
    #[error("Zabbix API error {code}: {message} {data}")]
    Api {
        code: i64,
        message: String,
        data: String,
    },

    /// Template rendering error.
    #[error("Template error: {0}")]
    Template(String),

    /// CSV writing error.
    #[error("CSV error: {0}")]
    Csv(String),

    /// Import command could not be run.
    #[error("Import error: {0}")]
    Import(String),
}

pub type Result<T> = std::result::Result<T, ExportError>;

impl From<std::io::Error> for ExportError {
    fn from(e: std::io::Error) -> Self {
        ExportError::Io(e.to_string())
    }
}

impl From<serde_yaml::Error> for ExportError {
    fn from(e: serde_yaml::Error) -> Self {
        ExportError::Yaml(e.to_string())
    }
}

impl From<serde_json::Error> for ExportError {
    fn from(e: serde_json::Error) -> Self {
        ExportError::Json(e.to_string())
    }
}

impl From<reqwest::Error> for ExportError {
    fn from(e: reqwest::Error) -> Self {
        ExportError::Http(e.to_string())
    }
}

impl From<minijinja::Error> for ExportError {
    fn from(e: minijinja::Error) -> Self {
        ExportError::Template(e.to_string())
    }
}

impl From<csv::Error> for ExportError {
    fn from(e: csv::Error) -> Self {
        ExportError::Csv(e.to_string())
    }
}

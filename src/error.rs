//! Error types for sopsenv operations

use std::io;
use std::path::PathBuf;
use thiserror::Error;

// Internal use only
use sopsenv_core::ParseError;

/// The main error type for sopsenv operations
///
/// Every variant except the I/O and configuration ones is a per-file failure:
/// it aborts the affected file, and aborts the whole run only when
/// `fail_on_error` is set.
#[derive(Error, Debug)]
pub enum SopsEnvError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    Config(String),
    #[error("Refusing path with '..' traversal: {}", .0.display())]
    PathTraversal(PathBuf),
    #[error("Required file not found: {}", .0.display())]
    RequiredFileMissing(PathBuf),
    #[error("File {} is {size} bytes, larger than the {limit} byte limit", .path.display())]
    FileTooLarge { path: PathBuf, size: u64, limit: u64 },
    #[error("Failed to decrypt {}: {reason}", .path.display())]
    DecryptionFailed { path: PathBuf, reason: String },
    #[error("Unsupported format '{0}'. Supported formats: dotenv, json, yaml, ini")]
    UnsupportedFormat(String),
    #[error("Missing dependency: {0}")]
    MissingDependency(String),
    #[error("Invalid filter pattern '{pattern}': {source}")]
    InvalidFilter {
        pattern: String,
        #[source]
        source: regex::Error,
    },
    #[cfg(feature = "json")]
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A type alias for `Result<T, SopsEnvError>`
pub type Result<T> = std::result::Result<T, SopsEnvError>;

impl SopsEnvError {
    /// Short machine-readable name of the error kind, used in reports.
    pub fn kind(&self) -> &'static str {
        match self {
            SopsEnvError::Io(_) => "Io",
            SopsEnvError::Toml(_) => "Toml",
            SopsEnvError::Config(_) => "Config",
            SopsEnvError::PathTraversal(_) => "PathTraversal",
            SopsEnvError::RequiredFileMissing(_) => "RequiredFileMissing",
            SopsEnvError::FileTooLarge { .. } => "FileTooLarge",
            SopsEnvError::DecryptionFailed { .. } => "DecryptionFailed",
            SopsEnvError::UnsupportedFormat(_) => "UnsupportedFormat",
            SopsEnvError::MissingDependency(_) => "MissingDependency",
            SopsEnvError::InvalidFilter { .. } => "InvalidFilter",
            #[cfg(feature = "json")]
            SopsEnvError::Json(_) => "Json",
        }
    }
}

impl From<ParseError> for SopsEnvError {
    fn from(err: ParseError) -> Self {
        match err {
            ParseError::Io(io_err) => SopsEnvError::Io(io_err),
            ParseError::Toml(toml_err) => SopsEnvError::Toml(toml_err),
            ParseError::Validation(msg) => SopsEnvError::Config(msg),
        }
    }
}

//! Caller-facing error kinds.
//!
//! Each pipeline step returns its own module error; the conversions below
//! fold them into the kinds a caller reacts to. Nothing is retried and
//! nothing already written is rolled back.

use crate::config::ConfigError;
use crate::imaging::BackendError;
use crate::repository::RepositoryError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    /// Rejected request: missing fields, bad names, incompatible extensions.
    #[error("Validation error: {0}")]
    Validation(String),
    /// The upload scanner refused the payload.
    #[error("Security check failed: {0}")]
    Security(String),
    #[error("Cannot create directory {path}: {source}")]
    Directory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// Decode or encode failure.
    #[error("Image codec error at {path}: {message}")]
    Codec { path: PathBuf, message: String },
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),
    #[error("Arithmetic error: {0}")]
    Arithmetic(String),
}

impl PipelineError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PipelineError::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<BackendError> for PipelineError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::Io { path, source } => PipelineError::Io { path, source },
            BackendError::Decode { path, message } | BackendError::Encode { path, message } => {
                PipelineError::Codec { path, message }
            }
            BackendError::UnsupportedFormat(ext) => PipelineError::Codec {
                path: PathBuf::new(),
                message: format!("unsupported output format: {ext}"),
            },
            BackendError::ZeroDimension(e) => PipelineError::Arithmetic(e.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;

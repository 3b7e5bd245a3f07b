//! Image processing backend trait and shared types.
//!
//! The [`ImageBackend`] trait defines the three operations every backend must
//! support: identify, resize, and transcode.
//!
//! The production implementation is
//! [`RustBackend`](super::rust_backend::RustBackend), built on the `image`
//! crate's pure-Rust codecs.

use super::calculations::ZeroDimension;
use super::params::{ImageSource, ResizeParams};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to decode {path}: {message}")]
    Decode { path: PathBuf, message: String },
    #[error("Failed to encode {path}: {message}")]
    Encode { path: PathBuf, message: String },
    #[error("Unsupported output format: {0}")]
    UnsupportedFormat(String),
    #[error("Cannot scale image: {0}")]
    ZeroDimension(#[from] ZeroDimension),
}

impl BackendError {
    /// Path the failure is attached to, if any.
    pub fn path(&self) -> Option<&Path> {
        match self {
            BackendError::Io { path, .. }
            | BackendError::Decode { path, .. }
            | BackendError::Encode { path, .. } => Some(path),
            BackendError::UnsupportedFormat(_) | BackendError::ZeroDimension(_) => None,
        }
    }
}

/// Result of an identify operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

/// Trait for image processing backends.
///
/// Every operation is synchronous and runs to completion before returning.
pub trait ImageBackend {
    /// Get image dimensions without a full decode where the format allows it.
    fn identify(&self, source: &ImageSource<'_>) -> Result<Dimensions, BackendError>;

    /// Decode the source once and write every target in order.
    ///
    /// Stops at the first failing target; earlier targets stay on disk.
    fn resize(&self, params: &ResizeParams<'_>) -> Result<(), BackendError>;

    /// Decode `source` and re-encode it at `output` using the output's extension.
    fn transcode(&self, source: &Path, output: &Path) -> Result<(), BackendError>;
}

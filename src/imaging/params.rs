//! Parameter types for image operations.
//!
//! These structs describe *what* to do, not *how* to do it. They are the
//! interface between the high-level [`operations`](super::operations) module
//! (which decides what files to create) and the [`backend`](super::backend)
//! (which does the actual pixel work). This separation allows swapping backends
//! (e.g. for testing with a mock) without changing operation logic.
//!
//! ## Types
//!
//! - [`SizeSpec`]: A derivative target: size label plus the `width × height` box it names.
//! - [`ImageSource`]: Where the pixels come from: a stored file or an in-memory upload.
//! - [`ResizeTarget`]: One output raster: path, exact dimensions, output extension.
//! - [`ResizeParams`]: A source decoded once and written to one or more targets, in order.

use std::fmt;
use std::path::{Path, PathBuf};

/// A Derivative Descriptor: a size label and the bounding box it stands for.
///
/// The label is either a named preset (`"small"`) or an explicit `"WxH"`
/// literal (`"320x240"`). Either way the label is what ends up as the map
/// key in generated URL maps and thumbnail associations.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SizeSpec {
    pub label: String,
    pub width: u32,
    pub height: u32,
}

impl SizeSpec {
    pub fn new(label: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            label: label.into(),
            width,
            height,
        }
    }

    /// Parse an explicit `"WxH"` label, e.g. `"1024x768"`.
    ///
    /// Returns `None` for anything that is not two positive integers joined
    /// by `x` (case-insensitive).
    pub fn parse_literal(label: &str) -> Option<Self> {
        let lower = label.trim().to_ascii_lowercase();
        let (w, h) = lower.split_once('x')?;
        let width: u32 = w.parse().ok()?;
        let height: u32 = h.parse().ok()?;
        if width == 0 || height == 0 {
            return None;
        }
        Some(Self::new(label.trim(), width, height))
    }

    /// Bounding box as `(width, height)`.
    pub fn bounds(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

impl fmt::Display for SizeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}x{})", self.label, self.width, self.height)
    }
}

/// Origin of the pixels for a resize.
#[derive(Debug, Clone, Copy)]
pub enum ImageSource<'a> {
    /// A file already in the storage tree.
    File(&'a Path),
    /// Raw uploaded bytes, not yet (or never) written anywhere.
    Memory(&'a [u8]),
}

impl ImageSource<'_> {
    /// Path used in error messages and logs.
    pub fn describe(&self) -> PathBuf {
        match self {
            ImageSource::File(path) => path.to_path_buf(),
            ImageSource::Memory(_) => PathBuf::from("<upload>"),
        }
    }
}

/// A single output raster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResizeTarget {
    pub output: PathBuf,
    pub width: u32,
    pub height: u32,
    /// Extension (without dot) that selects the encoder, e.g. `"jpg"`.
    pub extension: String,
}

/// Decode `source` once, then resize and encode it to every target in order.
///
/// Targets are written sequentially. Two targets sharing an output path
/// leave only the later one on disk.
#[derive(Debug, Clone)]
pub struct ResizeParams<'a> {
    pub source: ImageSource<'a>,
    pub targets: Vec<ResizeTarget>,
}

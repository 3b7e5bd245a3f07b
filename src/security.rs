//! Upload scanning.
//!
//! Every uploaded byte stream is written to a staged temporary file and
//! handed to an [`UploadScanner`] before anything reaches the storage tree.
//! A `false` verdict is a rejection; an `Err` means the scanner itself could
//! not run.

use image::{ImageFormat, ImageReader};
use std::io::{self, Cursor};
use std::path::Path;
use tracing::{debug, warn};

pub trait UploadScanner {
    /// Decide whether the staged file is a genuine image.
    fn is_valid_image(&self, staged: &Path) -> io::Result<bool>;
}

/// Formats accepted by default.
const DEFAULT_ALLOWED: &[ImageFormat] = &[
    ImageFormat::Jpeg,
    ImageFormat::Png,
    ImageFormat::Gif,
    ImageFormat::Bmp,
    ImageFormat::Tiff,
    ImageFormat::WebP,
];

/// Leading bytes of executables and archives.
const EXECUTABLE_MAGIC: &[&[u8]] = &[b"MZ", b"\x7fELF", b"#!", b"PK\x03\x04", b"\xca\xfe\xba\xbe"];

/// Script markers that must not appear anywhere in an image (case-insensitive).
const SCRIPT_MARKERS: &[&[u8]] = &[b"<?php", b"<%@", b"<script", b"<html", b"eval("];

/// Signature-based scanner.
///
/// Accepts a file only when all of these hold:
/// 1. it does not start with an executable or archive signature;
/// 2. its magic bytes name one of the allowed image formats;
/// 3. the header parses to non-zero dimensions;
/// 4. no script marker appears in the payload.
#[derive(Debug, Clone)]
pub struct SignatureScanner {
    allowed: Vec<ImageFormat>,
}

impl SignatureScanner {
    pub fn new() -> Self {
        Self {
            allowed: DEFAULT_ALLOWED.to_vec(),
        }
    }

    pub fn with_allowed(allowed: Vec<ImageFormat>) -> Self {
        Self { allowed }
    }

    /// Verdict on an in-memory payload.
    pub fn check_bytes(&self, bytes: &[u8]) -> Verdict {
        if EXECUTABLE_MAGIC.iter().any(|magic| bytes.starts_with(magic)) {
            return Verdict::Rejected("executable signature");
        }
        let format = match image::guess_format(bytes) {
            Ok(format) => format,
            Err(_) => return Verdict::Rejected("unrecognised format"),
        };
        if !self.allowed.contains(&format) {
            return Verdict::Rejected("format not allowed");
        }
        let dims = ImageReader::with_format(Cursor::new(bytes), format).into_dimensions();
        match dims {
            Ok((w, h)) if w > 0 && h > 0 => {}
            _ => return Verdict::Rejected("unreadable image header"),
        }
        if contains_marker(bytes) {
            return Verdict::Rejected("embedded script");
        }
        Verdict::Accepted(format)
    }
}

impl Default for SignatureScanner {
    fn default() -> Self {
        Self::new()
    }
}

/// Outcome of [`SignatureScanner::check_bytes`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Accepted(ImageFormat),
    Rejected(&'static str),
}

fn contains_marker(bytes: &[u8]) -> bool {
    let lower = bytes.to_ascii_lowercase();
    SCRIPT_MARKERS
        .iter()
        .any(|marker| lower.windows(marker.len()).any(|w| w == *marker))
}

impl UploadScanner for SignatureScanner {
    fn is_valid_image(&self, staged: &Path) -> io::Result<bool> {
        let bytes = std::fs::read(staged)?;
        match self.check_bytes(&bytes) {
            Verdict::Accepted(format) => {
                debug!(path = %staged.display(), ?format, "upload accepted");
                Ok(true)
            }
            Verdict::Rejected(reason) => {
                warn!(path = %staged.display(), reason, "upload rejected");
                Ok(false)
            }
        }
    }
}

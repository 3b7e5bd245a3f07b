//! Shared test utilities for the catalog-images test suite.
//!
//! Provides synthetic image encoders and a storage-root fixture that bundles
//! a temp directory, an in-memory repository, and a matching config.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let env = TestEnv::new();
//! let bytes = jpeg_bytes(400, 300);
//! let backend = RustBackend::new();
//! let ctx = Context::new(&env.config, &backend, &env.repo);
//! ingest(&ctx, &SignatureScanner::new(), &request).unwrap();
//! assert_eq!(env.owner_files("P1"), vec!["photo-100.jpg", "photo.jpg"]);
//! ```

use std::io::Cursor;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use crate::config::ImagingConfig;
use crate::repository::FileRepository;

// =========================================================================
// Synthetic images
// =========================================================================

fn gradient_rgb(width: u32, height: u32) -> image::RgbImage {
    image::RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x % 256) as u8, (y % 256) as u8, 128])
    })
}

/// Encode a `width × height` RGB gradient as JPEG.
pub fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
    let mut buf = Vec::new();
    image::DynamicImage::ImageRgb8(gradient_rgb(width, height))
        .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Jpeg)
        .unwrap();
    buf
}

/// Encode a `width × height` half-transparent RGBA image as PNG.
pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbaImage::from_fn(width, height, |x, _| {
        image::Rgba([200, 40, (x % 256) as u8, 128])
    });
    let mut buf = Vec::new();
    image::DynamicImage::ImageRgba8(img)
        .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .unwrap();
    buf
}

/// Write a JPEG of the given size to `path`.
pub fn write_jpeg(path: &Path, width: u32, height: u32) {
    std::fs::write(path, jpeg_bytes(width, height)).unwrap();
}

// =========================================================================
// Storage fixture
// =========================================================================

/// Temp storage root with an in-memory catalog and a config pointing at it.
pub struct TestEnv {
    pub tmp: TempDir,
    pub config: ImagingConfig,
    pub repo: FileRepository,
}

impl TestEnv {
    pub fn new() -> Self {
        let tmp = TempDir::new().unwrap();
        let config = ImagingConfig {
            storage_root: tmp.path().join("images").to_string_lossy().into_owned(),
            ..ImagingConfig::default()
        };
        Self {
            tmp,
            config,
            repo: FileRepository::in_memory(),
        }
    }

    pub fn owner_dir(&self, product_id: &str) -> PathBuf {
        Path::new(&self.config.storage_root).join(product_id)
    }

    /// Sorted filenames under the owner directory; empty if it does not exist.
    pub fn owner_files(&self, product_id: &str) -> Vec<String> {
        let dir = self.owner_dir(product_id);
        let Ok(entries) = std::fs::read_dir(&dir) else {
            return Vec::new();
        };
        let mut names: Vec<String> = entries
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }
}

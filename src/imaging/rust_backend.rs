//! Pure Rust image processing backend.
//!
//! Everything is statically linked into the binary.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Decode (JPEG, PNG, GIF, BMP, TIFF, WebP) | `image` crate (pure Rust decoders) |
//! | Identify | `ImageReader::into_dimensions` (header only) |
//! | Resize | `DynamicImage::resize_exact` with `Lanczos3` filter |
//! | Pixel normalisation | `DynamicImage::to_rgba8` for 16-bit and float layouts |
//! | Encode | `DynamicImage::write_to`, format chosen from the output extension |

use super::backend::{BackendError, Dimensions, ImageBackend};
use super::params::{ImageSource, ResizeParams, ResizeTarget};
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, ImageReader};
use std::io::{BufWriter, Cursor};
use std::path::Path;
use tracing::debug;

/// Extensions whose encoders are compiled in.
const OUTPUT_FORMATS: &[(&str, ImageFormat)] = &[
    ("jpg", ImageFormat::Jpeg),
    ("jpeg", ImageFormat::Jpeg),
    ("jpe", ImageFormat::Jpeg),
    ("png", ImageFormat::Png),
    ("gif", ImageFormat::Gif),
    ("bmp", ImageFormat::Bmp),
    ("tif", ImageFormat::Tiff),
    ("tiff", ImageFormat::Tiff),
    ("webp", ImageFormat::WebP),
];

/// Map an extension (without dot, any case) to an encoder format.
pub fn output_format(extension: &str) -> Option<ImageFormat> {
    let ext = extension.to_ascii_lowercase();
    OUTPUT_FORMATS
        .iter()
        .find(|(candidate, _)| *candidate == ext)
        .map(|(_, fmt)| *fmt)
}

/// Pure Rust backend using the `image` crate ecosystem.
///
/// See the [module docs](self) for the crate-to-operation mapping.
pub struct RustBackend;

impl RustBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RustBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn decode_error(source: &ImageSource<'_>, e: impl std::fmt::Display) -> BackendError {
    BackendError::Decode {
        path: source.describe(),
        message: e.to_string(),
    }
}

/// Load and decode an image from disk or memory.
fn load_image(source: &ImageSource<'_>) -> Result<DynamicImage, BackendError> {
    match source {
        ImageSource::File(path) => ImageReader::open(path)
            .map_err(|e| BackendError::Io {
                path: path.to_path_buf(),
                source: e,
            })?
            .with_guessed_format()
            .map_err(|e| BackendError::Io {
                path: path.to_path_buf(),
                source: e,
            })?
            .decode()
            .map_err(|e| decode_error(source, e)),
        ImageSource::Memory(bytes) => ImageReader::new(Cursor::new(*bytes))
            .with_guessed_format()
            .map_err(|e| decode_error(source, e))?
            .decode()
            .map_err(|e| decode_error(source, e)),
    }
}

/// Force layouts outside the common 8-bit family onto RGBA8.
///
/// 16-bit and floating-point rasters take unpredictable paths (or none) through
/// several encoders; RGBA8 is accepted by all of them except JPEG, which
/// [`prepare_for_format`] handles.
fn normalize_pixels(img: DynamicImage) -> DynamicImage {
    match img {
        DynamicImage::ImageLuma8(_)
        | DynamicImage::ImageLumaA8(_)
        | DynamicImage::ImageRgb8(_)
        | DynamicImage::ImageRgba8(_) => img,
        other => DynamicImage::ImageRgba8(other.to_rgba8()),
    }
}

/// JPEG has no alpha channel.
fn prepare_for_format(img: DynamicImage, format: ImageFormat) -> DynamicImage {
    if format == ImageFormat::Jpeg && img.color().has_alpha() {
        DynamicImage::ImageRgb8(img.to_rgb8())
    } else {
        img
    }
}

/// Save a DynamicImage to `path`, encoder chosen from `extension`.
fn save_image(img: DynamicImage, path: &Path, extension: &str) -> Result<(), BackendError> {
    let format =
        output_format(extension).ok_or_else(|| BackendError::UnsupportedFormat(extension.into()))?;
    let img = prepare_for_format(img, format);

    let file = std::fs::File::create(path).map_err(|source| BackendError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut writer = BufWriter::new(file);
    img.write_to(&mut writer, format)
        .map_err(|e| BackendError::Encode {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
}

fn write_target(img: &DynamicImage, target: &ResizeTarget) -> Result<(), BackendError> {
    let resized = img.resize_exact(target.width, target.height, FilterType::Lanczos3);
    debug!(
        output = %target.output.display(),
        width = target.width,
        height = target.height,
        "writing resized image"
    );
    save_image(normalize_pixels(resized), &target.output, &target.extension)
}

impl ImageBackend for RustBackend {
    fn identify(&self, source: &ImageSource<'_>) -> Result<Dimensions, BackendError> {
        let (width, height) = match source {
            ImageSource::File(path) => ImageReader::open(path)
                .map_err(|e| BackendError::Io {
                    path: path.to_path_buf(),
                    source: e,
                })?
                .with_guessed_format()
                .map_err(|e| decode_error(source, e))?
                .into_dimensions()
                .map_err(|e| decode_error(source, e))?,
            ImageSource::Memory(bytes) => ImageReader::new(Cursor::new(*bytes))
                .with_guessed_format()
                .map_err(|e| decode_error(source, e))?
                .into_dimensions()
                .map_err(|e| decode_error(source, e))?,
        };
        Ok(Dimensions { width, height })
    }

    fn resize(&self, params: &ResizeParams<'_>) -> Result<(), BackendError> {
        let img = load_image(&params.source)?;
        for target in &params.targets {
            write_target(&img, target)?;
        }
        Ok(())
    }

    fn transcode(&self, source: &Path, output: &Path) -> Result<(), BackendError> {
        let extension = output
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();
        let img = load_image(&ImageSource::File(source))?;
        save_image(normalize_pixels(img), output, extension)
    }
}

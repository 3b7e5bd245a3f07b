//! High-level image operations.
//!
//! These functions combine calculations with backend execution.
//! They take configuration, compute parameters, and call the backend.

use super::backend::{BackendError, Dimensions, ImageBackend};
use super::calculations::fit_dimensions;
use super::params::{ImageSource, ResizeParams, ResizeTarget, SizeSpec};
use crate::naming;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Result type for image operations.
pub type Result<T> = std::result::Result<T, BackendError>;

/// Fixed thumbnail bounding box, `(width, height)`. Not part of the size list.
pub const THUMBNAIL_BOUNDS: (u32, u32) = (100, 100);

/// Map key recorded on the thumbnail association for [`THUMBNAIL_BOUNDS`].
pub const THUMBNAIL_MAP_KEY: &str = "100";

/// Get image dimensions using the backend.
pub fn get_dimensions(backend: &impl ImageBackend, source: &ImageSource<'_>) -> Result<(u32, u32)> {
    let Dimensions { width, height } = backend.identify(source)?;
    Ok((width, height))
}

/// How derivative files are named inside the owner directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DerivativeNaming {
    /// Every size is written over the original filename; only the last
    /// size in the list survives on disk.
    #[default]
    Overwrite,
    /// Each size gets `<base>-<label>.<ext>`.
    Distinct,
}

/// Inputs for a derivative batch.
#[derive(Debug, Clone)]
pub struct DerivativeConfig<'a> {
    pub sizes: &'a [SizeSpec],
    /// Public URL prefix for the owner directory, without trailing slash.
    pub url_prefix: &'a str,
    pub naming: DerivativeNaming,
}

/// One size of a derivative batch and the file it was written to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivativeFile {
    pub label: String,
    pub filename: String,
    pub path: PathBuf,
    pub url: String,
}

/// Generate one resized file per size, in list order.
///
/// The original is identified once and decoded once. With
/// [`DerivativeNaming::Overwrite`] every entry points at the original's file,
/// whose bytes are those of the last size processed. With
/// [`DerivativeNaming::Distinct`] a name already taken on disk or earlier in
/// the batch gets a `(n)` counter.
pub fn generate_derivatives(
    backend: &impl ImageBackend,
    original: &Path,
    output_dir: &Path,
    config: &DerivativeConfig<'_>,
) -> Result<Vec<DerivativeFile>> {
    let source = ImageSource::File(original);
    let dims = get_dimensions(backend, &source)?;
    let filename = naming::file_name(original);
    let (base, extension) = naming::split_extension(&filename);

    let mut targets = Vec::with_capacity(config.sizes.len());
    let mut files: Vec<DerivativeFile> = Vec::with_capacity(config.sizes.len());

    for size in config.sizes {
        let (width, height) = fit_dimensions(dims, size.bounds())?;
        let path = match config.naming {
            DerivativeNaming::Overwrite => original.to_path_buf(),
            DerivativeNaming::Distinct => {
                let desired =
                    output_dir.join(naming::derivative_filename(base, &size.label, extension));
                free_path(&desired, |p| files.iter().any(|f| f.path == p))?
            }
        };
        let out_name = naming::file_name(&path);
        debug!(size = %size, width, height, output = %out_name, "planned derivative");
        targets.push(ResizeTarget {
            output: path.clone(),
            width,
            height,
            extension: extension.unwrap_or_default().to_string(),
        });
        files.push(DerivativeFile {
            label: size.label.clone(),
            url: format!("{}/{}", config.url_prefix, out_name),
            filename: out_name,
            path,
        });
    }

    backend.resize(&ResizeParams { source, targets })?;
    info!(original = %original.display(), count = files.len(), "derivatives written");
    Ok(files)
}

/// `desired`, or the first `name(n).ext` that is neither on disk nor claimed.
fn free_path(desired: &Path, claimed: impl Fn(&Path) -> bool) -> Result<PathBuf> {
    naming::resolve_with(desired, |p| Ok(claimed(p) || p.try_exists()?)).map_err(|source| {
        BackendError::Io {
            path: desired.to_path_buf(),
            source,
        }
    })
}

/// Inputs for a thumbnail.
#[derive(Debug, Clone)]
pub struct ThumbnailConfig<'a> {
    /// Suffix appended to the parent's base name, e.g. `"-100"`.
    pub suffix: &'a str,
    /// Extension resolved from the content type; `None` leaves the name bare.
    pub extension: Option<&'a str>,
}

/// A thumbnail written to disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThumbnailFile {
    pub filename: String,
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
    pub bytes_written: u64,
}

/// Plan the thumbnail filename for a parent file name.
pub fn plan_thumbnail_name(parent_filename: &str, config: &ThumbnailConfig<'_>) -> String {
    let (base, _) = naming::split_extension(parent_filename);
    naming::thumbnail_filename(base, config.suffix, config.extension)
}

/// Create a thumbnail from the uploaded bytes.
///
/// The upload is decoded directly and fitted into [`THUMBNAIL_BOUNDS`];
/// no derivative from the size list is involved. When no extension was
/// resolved, the encoder follows the upload's own format. A planned name
/// that is already taken gets a `(n)` counter, so no live file is replaced.
pub fn create_thumbnail(
    backend: &impl ImageBackend,
    upload: &[u8],
    parent_filename: &str,
    output_dir: &Path,
    config: &ThumbnailConfig<'_>,
) -> Result<ThumbnailFile> {
    let source = ImageSource::Memory(upload);
    let dims = get_dimensions(backend, &source)?;
    let (width, height) = fit_dimensions(dims, THUMBNAIL_BOUNDS)?;

    let path = free_path(&output_dir.join(plan_thumbnail_name(parent_filename, config)), |_| false)?;
    let filename = naming::file_name(&path);
    let extension = match config.extension {
        Some(ext) => ext.to_string(),
        None => detected_extension(upload)
            .ok_or_else(|| BackendError::UnsupportedFormat(filename.clone()))?
            .to_string(),
    };

    backend.resize(&ResizeParams {
        source,
        targets: vec![ResizeTarget {
            output: path.clone(),
            width,
            height,
            extension,
        }],
    })?;

    let bytes_written = std::fs::metadata(&path)
        .map_err(|source| BackendError::Io {
            path: path.clone(),
            source,
        })?
        .len();

    Ok(ThumbnailFile {
        filename,
        path,
        width,
        height,
        bytes_written,
    })
}

/// Fit a stored image into a square box and write it to `output`.
///
/// Used by the maintenance operations that add a thumbnail size or shrink a
/// stored file in place.
pub fn fit_into_square(
    backend: &impl ImageBackend,
    source: &Path,
    output: &Path,
    side: u32,
) -> Result<(u32, u32)> {
    let src = ImageSource::File(source);
    let dims = get_dimensions(backend, &src)?;
    let (width, height) = fit_dimensions(dims, (side, side))?;
    let extension = naming::split_extension(&naming::file_name(output))
        .1
        .unwrap_or_default()
        .to_string();
    backend.resize(&ResizeParams {
        source: src,
        targets: vec![ResizeTarget {
            output: output.to_path_buf(),
            width,
            height,
            extension,
        }],
    })?;
    Ok((width, height))
}

fn detected_extension(bytes: &[u8]) -> Option<&'static str> {
    image::guess_format(bytes)
        .ok()
        .and_then(|fmt| fmt.extensions_str().first().copied())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::backend::tests::{MockBackend, RecordedOp};
    use tempfile::TempDir;

    fn dims(width: u32, height: u32) -> Dimensions {
        Dimensions { width, height }
    }

    #[test]
    fn get_dimensions_calls_backend() {
        let backend = MockBackend::with_dimensions(vec![dims(1920, 1080)]);
        let d = get_dimensions(&backend, &ImageSource::File(Path::new("/test.jpg"))).unwrap();
        assert_eq!(d, (1920, 1080));
    }

    // =========================================================================
    // Derivatives
    // =========================================================================

    #[test]
    fn derivatives_overwrite_share_original_filename() {
        let tmp = TempDir::new().unwrap();
        let original = tmp.path().join("photo.jpg");
        std::fs::write(&original, "orig").unwrap();
        let backend = MockBackend::with_dimensions(vec![dims(1600, 1200)]);
        let sizes = vec![
            SizeSpec::new("small", 100, 75),
            SizeSpec::new("640x480", 640, 480),
        ];

        let files = generate_derivatives(
            &backend,
            &original,
            tmp.path(),
            &DerivativeConfig {
                sizes: &sizes,
                url_prefix: "/images/P1",
                naming: DerivativeNaming::Overwrite,
            },
        )
        .unwrap();

        assert_eq!(files.len(), 2);
        assert_eq!(files[0].label, "small");
        assert_eq!(files[0].url, "/images/P1/photo.jpg");
        assert_eq!(files[1].url, "/images/P1/photo.jpg");
        assert_eq!(files[1].path, original);

        // Last size wins on disk
        assert_eq!(std::fs::read_to_string(&original).unwrap(), "640x480");

        let ops = backend.get_operations();
        assert_eq!(ops.len(), 3);
        assert!(matches!(&ops[0], RecordedOp::Identify(_)));
        assert!(matches!(
            &ops[1],
            RecordedOp::Resize { width: 100, height: 75, extension, .. } if extension == "jpg"
        ));
    }

    #[test]
    fn derivatives_distinct_names_per_label() {
        let tmp = TempDir::new().unwrap();
        let original = tmp.path().join("photo.png");
        std::fs::write(&original, "orig").unwrap();
        let backend = MockBackend::with_dimensions(vec![dims(800, 600)]);
        let sizes = vec![SizeSpec::new("100x75", 100, 75), SizeSpec::new("small", 50, 50)];

        let files = generate_derivatives(
            &backend,
            &original,
            tmp.path(),
            &DerivativeConfig {
                sizes: &sizes,
                url_prefix: "/img/P1",
                naming: DerivativeNaming::Distinct,
            },
        )
        .unwrap();

        assert_eq!(files[0].url, "/img/P1/photo-100x75.png");
        assert_eq!(files[1].filename, "photo-small.png");
        assert!(tmp.path().join("photo-100x75.png").exists());
        assert_eq!(std::fs::read_to_string(&original).unwrap(), "orig");
    }

    #[test]
    fn derivatives_distinct_skip_taken_names() {
        let tmp = TempDir::new().unwrap();
        let original = tmp.path().join("photo.jpg");
        std::fs::write(&original, "orig").unwrap();
        std::fs::write(tmp.path().join("photo-small.jpg"), "other upload").unwrap();
        let backend = MockBackend::with_dimensions(vec![dims(800, 600)]);
        let sizes = vec![SizeSpec::new("small", 50, 50), SizeSpec::new("small", 20, 20)];

        let files = generate_derivatives(
            &backend,
            &original,
            tmp.path(),
            &DerivativeConfig {
                sizes: &sizes,
                url_prefix: "",
                naming: DerivativeNaming::Distinct,
            },
        )
        .unwrap();

        let names: Vec<&str> = files.iter().map(|f| f.filename.as_str()).collect();
        assert_eq!(names, vec!["photo-small(1).jpg", "photo-small(2).jpg"]);
        assert_eq!(
            std::fs::read_to_string(tmp.path().join("photo-small.jpg")).unwrap(),
            "other upload"
        );
    }

    #[test]
    fn derivatives_zero_dimension_is_error() {
        let tmp = TempDir::new().unwrap();
        let original = tmp.path().join("photo.jpg");
        let backend = MockBackend::with_dimensions(vec![dims(0, 10)]);
        let sizes = vec![SizeSpec::new("small", 10, 10)];

        let result = generate_derivatives(
            &backend,
            &original,
            tmp.path(),
            &DerivativeConfig {
                sizes: &sizes,
                url_prefix: "",
                naming: DerivativeNaming::Overwrite,
            },
        );
        assert!(matches!(result, Err(BackendError::ZeroDimension(_))));
        // Nothing reached the backend's resize
        assert_eq!(backend.get_operations().len(), 1);
    }

    #[test]
    fn derivatives_failure_reports_target_path() {
        let tmp = TempDir::new().unwrap();
        let original = tmp.path().join("photo.jpg");
        let backend = MockBackend::failing_on("photo-b.jpg");
        backend.identify_results.lock().unwrap().push(dims(100, 100));
        let sizes = vec![
            SizeSpec::new("a", 10, 10),
            SizeSpec::new("b", 20, 20),
            SizeSpec::new("c", 30, 30),
        ];

        let err = generate_derivatives(
            &backend,
            &original,
            tmp.path(),
            &DerivativeConfig {
                sizes: &sizes,
                url_prefix: "",
                naming: DerivativeNaming::Distinct,
            },
        )
        .unwrap_err();

        assert_eq!(err.path(), Some(tmp.path().join("photo-b.jpg").as_path()));
        assert!(tmp.path().join("photo-a.jpg").exists());
        assert!(!tmp.path().join("photo-c.jpg").exists());
    }

    // =========================================================================
    // Thumbnails
    // =========================================================================

    #[test]
    fn plan_thumbnail_name_uses_suffix_and_extension() {
        let config = ThumbnailConfig {
            suffix: "-100",
            extension: Some("jpg"),
        };
        assert_eq!(plan_thumbnail_name("photo.JPG", &config), "photo-100.jpg");
    }

    #[test]
    fn plan_thumbnail_name_without_extension() {
        let config = ThumbnailConfig {
            suffix: "_thumb",
            extension: None,
        };
        assert_eq!(plan_thumbnail_name("photo.JPG", &config), "photo_thumb");
    }

    #[test]
    fn create_thumbnail_fits_hundred_box() {
        let tmp = TempDir::new().unwrap();
        let backend = MockBackend::with_dimensions(vec![dims(800, 600)]);

        let thumb = create_thumbnail(
            &backend,
            b"upload",
            "photo.JPG",
            tmp.path(),
            &ThumbnailConfig {
                suffix: "-100",
                extension: Some("jpg"),
            },
        )
        .unwrap();

        assert_eq!(thumb.filename, "photo-100.jpg");
        assert_eq!((thumb.width, thumb.height), (100, 75));
        assert!(thumb.bytes_written > 0);

        let ops = backend.get_operations();
        assert!(matches!(&ops[0], RecordedOp::Identify(p) if p == "<upload>"));
        assert!(matches!(
            &ops[1],
            RecordedOp::Resize { source, width: 100, height: 75, .. } if source == "<upload>"
        ));
    }

    #[test]
    fn create_thumbnail_never_replaces_a_live_file() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("photo-100.jpg"), "earlier primary").unwrap();
        let backend = MockBackend::with_dimensions(vec![dims(800, 600)]);

        let thumb = create_thumbnail(
            &backend,
            b"upload",
            "photo.jpg",
            tmp.path(),
            &ThumbnailConfig {
                suffix: "-100",
                extension: Some("jpg"),
            },
        )
        .unwrap();

        assert_eq!(thumb.filename, "photo-100(1).jpg");
        assert_eq!(thumb.path, tmp.path().join("photo-100(1).jpg"));
        assert_eq!(
            std::fs::read_to_string(tmp.path().join("photo-100.jpg")).unwrap(),
            "earlier primary"
        );
    }

    #[test]
    fn fit_into_square_uses_output_extension() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("a.png");
        std::fs::write(&src, "x").unwrap();
        let backend = MockBackend::with_dimensions(vec![dims(300, 600)]);

        let out = tmp.path().join("a-150.png");
        assert_eq!(fit_into_square(&backend, &src, &out, 150).unwrap(), (75, 150));
        assert!(matches!(
            &backend.get_operations()[1],
            RecordedOp::Resize { extension, .. } if extension == "png"
        ));
    }
}

//! Upload ingest pipeline.
//!
//! Turns one uploaded byte buffer into a stored original, an optional batch
//! of sized derivatives, a 100×100 thumbnail, and the catalog records that
//! tie them to their product.
//!
//! ## Stages
//!
//! ```text
//! ValidateInput → EnsureDirectories → SecurityScan → PersistOriginal
//!   → [GenerateDerivatives] → GenerateThumbnail → CreateContentRecords
//!   → AssociateThumbnail → AttachToOwner → AutoApprove
//! ```
//!
//! Stages run strictly in order and the first error ends the call. Nothing
//! written by earlier stages is undone: a repository failure after
//! `GenerateThumbnail`, for example, leaves both files on disk with no
//! records pointing at them. The security scan runs on a staged temp file,
//! so a rejected upload never touches the storage tree and creates no
//! records.

use crate::context::{Context, check_segment};
use crate::error::{PipelineError, Result};
use crate::imaging::{
    DerivativeConfig, ImageBackend, THUMBNAIL_MAP_KEY, ThumbnailConfig, create_thumbnail,
    generate_derivatives,
};
use crate::naming;
use crate::repository::{
    IMAGE_THUMBNAIL, ImageStatus, ObjectInfo, OwnerContent, Repository,
    create_content_and_data_resource,
};
use crate::security::UploadScanner;
use std::collections::BTreeMap;
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument};

/// Which derivatives an upload asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SizeRequest {
    /// One size label: a preset name or a `WxH` literal.
    Single(String),
    /// Every entry of the configured size list.
    Configured,
}

/// One uploaded image.
#[derive(Debug, Clone)]
pub struct UploadRequest<'a> {
    pub product_id: &'a str,
    pub filename: &'a str,
    /// Browser-reported content type, e.g. `image/pjpeg`.
    pub content_type: &'a str,
    pub bytes: &'a [u8],
    pub resize: Option<SizeRequest>,
}

/// A file written into the owner directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    pub filename: String,
    pub path: PathBuf,
    pub url: String,
}

/// Everything an ingest produced.
#[derive(Debug, Clone)]
pub struct IngestOutcome {
    pub product_id: String,
    pub content_id: String,
    pub thumbnail_content_id: String,
    pub original: StoredFile,
    pub thumbnail: StoredFile,
    /// Size label to URL; empty when no derivatives were requested.
    pub derivatives: BTreeMap<String, String>,
    /// Size label to content id, for derivatives stored under their own name.
    pub derivative_content_ids: BTreeMap<String, String>,
    /// Canonical mime type recorded on both data resources.
    pub mime_type: String,
    pub status: ImageStatus,
}

/// Pipeline stage, carried in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    ValidateInput,
    EnsureDirectories,
    SecurityScan,
    PersistOriginal,
    GenerateDerivatives,
    GenerateThumbnail,
    CreateContentRecords,
    AssociateThumbnail,
    AttachToOwner,
    AutoApprove,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Run the full ingest pipeline for one upload.
#[instrument(skip_all, fields(product_id = request.product_id, filename = request.filename))]
pub fn ingest<B: ImageBackend>(
    ctx: &Context<'_, B>,
    scanner: &dyn UploadScanner,
    request: &UploadRequest<'_>,
) -> Result<IngestOutcome> {
    let config = ctx.config;

    stage(Stage::ValidateInput);
    validate(request)?;
    let mime_type = naming::normalize_content_type(request.content_type);

    stage(Stage::EnsureDirectories);
    let owner_dir = config.owner_dir(request.product_id);
    ensure_dir(Path::new(&config.storage_root))?;
    ensure_dir(&owner_dir)?;

    stage(Stage::SecurityScan);
    scan_staged(scanner, request.bytes)?;

    stage(Stage::PersistOriginal);
    let original = persist_original(ctx, request, &owner_dir)?;

    let mut derivative_files = Vec::new();
    if let Some(resize) = &request.resize {
        stage(Stage::GenerateDerivatives);
        let requested = match resize {
            SizeRequest::Single(label) => Some(label.as_str()),
            SizeRequest::Configured => None,
        };
        let sizes = config.derivatives.resolve_sizes(requested)?;
        let url_prefix = config.owner_url(request.product_id);
        derivative_files = generate_derivatives(
            ctx.backend,
            &original.path,
            &owner_dir,
            &DerivativeConfig {
                sizes: &sizes,
                url_prefix: &url_prefix,
                naming: config.derivative_naming(),
            },
        )?;
    }

    stage(Stage::GenerateThumbnail);
    let extension = ctx
        .repo
        .query_file_extensions_by_mime_type(&mime_type)?
        .into_iter()
        .next();
    let thumb = create_thumbnail(
        ctx.backend,
        request.bytes,
        &original.filename,
        &owner_dir,
        &ThumbnailConfig {
            suffix: &config.thumbnail_suffix,
            extension: extension.as_deref(),
        },
    )?;
    debug!(thumbnail = %thumb.filename, bytes = thumb.bytes_written, "thumbnail written");
    let thumbnail = StoredFile {
        url: config.file_url(request.product_id, &thumb.filename),
        filename: thumb.filename,
        path: thumb.path,
    };

    stage(Stage::CreateContentRecords);
    let content_id = ctx.repo.create_content()?;
    let thumbnail_content_id = ctx.repo.create_content()?;
    create_content_and_data_resource(ctx.repo, &content_id, &object_info(&original), &mime_type)?;
    create_content_and_data_resource(
        ctx.repo,
        &thumbnail_content_id,
        &object_info(&thumbnail),
        &mime_type,
    )?;

    // Files of their own (distinct naming) are recorded so a rename finds them
    let mut derivative_content_ids = BTreeMap::new();
    for file in derivative_files.iter().filter(|f| f.path != original.path) {
        let id = ctx.repo.create_content()?;
        create_content_and_data_resource(
            ctx.repo,
            &id,
            &ObjectInfo {
                url: file.url.clone(),
                name: file.filename.clone(),
            },
            &mime_type,
        )?;
        derivative_content_ids.insert(file.label.clone(), id);
    }

    stage(Stage::AssociateThumbnail);
    ctx.repo.create_content_association(
        &content_id,
        &thumbnail_content_id,
        IMAGE_THUMBNAIL,
        THUMBNAIL_MAP_KEY,
    )?;
    for (label, id) in &derivative_content_ids {
        ctx.repo
            .create_content_association(&content_id, id, IMAGE_THUMBNAIL, label)?;
    }

    stage(Stage::AttachToOwner);
    ctx.repo.create_owner_content(&OwnerContent {
        product_id: request.product_id.to_string(),
        content_id: content_id.clone(),
        product_content_type: config.product_content_type.clone(),
        status: ImageStatus::Pending,
    })?;
    ctx.repo.create_image_approval(&content_id)?;

    let mut status = ImageStatus::Pending;
    if config.auto_approve {
        stage(Stage::AutoApprove);
        ctx.repo
            .update_image_status(&content_id, ImageStatus::Approved)?;
        status = ImageStatus::Approved;
    }

    info!(
        content_id = %content_id,
        original = %original.filename,
        thumbnail = %thumbnail.filename,
        derivatives = derivative_files.len(),
        "image ingested"
    );
    let derivatives = derivative_files
        .into_iter()
        .map(|f| (f.label, f.url))
        .collect();

    Ok(IngestOutcome {
        product_id: request.product_id.to_string(),
        content_id,
        thumbnail_content_id,
        original,
        thumbnail,
        derivatives,
        derivative_content_ids,
        mime_type,
        status,
    })
}

fn stage(stage: Stage) {
    debug!(%stage, "ingest stage");
}

fn validate(request: &UploadRequest<'_>) -> Result<()> {
    check_segment("product id", request.product_id)?;
    check_segment("filename", request.filename)?;
    if request.content_type.trim().is_empty() {
        return Err(PipelineError::Validation("content type is required".into()));
    }
    if request.bytes.is_empty() {
        return Err(PipelineError::Validation("uploaded file is empty".into()));
    }
    if matches!(&request.resize, Some(SizeRequest::Single(label)) if label.trim().is_empty()) {
        return Err(PipelineError::Validation("resize size is empty".into()));
    }
    Ok(())
}

fn ensure_dir(path: &Path) -> Result<()> {
    std::fs::create_dir_all(path).map_err(|source| PipelineError::Directory {
        path: path.to_path_buf(),
        source,
    })
}

/// Write the upload to a temp file outside the storage tree and scan it.
///
/// The temp file is removed when this returns, whatever the verdict.
fn scan_staged(scanner: &dyn UploadScanner, bytes: &[u8]) -> Result<()> {
    let mut staged =
        tempfile::NamedTempFile::new().map_err(|e| PipelineError::io(std::env::temp_dir(), e))?;
    staged
        .write_all(bytes)
        .map_err(|e| PipelineError::io(staged.path(), e))?;

    let valid = scanner
        .is_valid_image(staged.path())
        .map_err(|e| PipelineError::io(staged.path(), e))?;
    if valid {
        Ok(())
    } else {
        Err(PipelineError::Security(
            "uploaded file is not a supported image".into(),
        ))
    }
}

fn persist_original<B: ImageBackend>(
    ctx: &Context<'_, B>,
    request: &UploadRequest<'_>,
    owner_dir: &Path,
) -> Result<StoredFile> {
    let desired = owner_dir.join(request.filename);
    let path = naming::resolve(&desired).map_err(|e| PipelineError::io(&desired, e))?;
    std::fs::write(&path, request.bytes).map_err(|e| PipelineError::io(&path, e))?;

    let filename = naming::file_name(&path);
    if filename != request.filename {
        info!(requested = request.filename, stored = %filename, "filename taken, stored under new name");
    }
    Ok(StoredFile {
        url: ctx.config.file_url(request.product_id, &filename),
        filename,
        path,
    })
}

fn object_info(file: &StoredFile) -> ObjectInfo {
    ObjectInfo {
        url: file.url.clone(),
        name: file.filename.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigError;
    use crate::imaging::RustBackend;
    use crate::repository::data_resource_for_content;
    use crate::security::SignatureScanner;
    use crate::security::tests::FixedScanner;
    use crate::test_helpers::{TestEnv, jpeg_bytes, png_bytes};

    fn request<'a>(product_id: &'a str, filename: &'a str, bytes: &'a [u8]) -> UploadRequest<'a> {
        UploadRequest {
            product_id,
            filename,
            content_type: "image/jpeg",
            bytes,
            resize: None,
        }
    }

    fn run(env: &TestEnv, req: &UploadRequest<'_>) -> Result<IngestOutcome> {
        let backend = RustBackend::new();
        let ctx = Context::new(&env.config, &backend, &env.repo);
        ingest(&ctx, &SignatureScanner::new(), req)
    }

    // =========================================================================
    // Happy path
    // =========================================================================

    #[test]
    fn pjpeg_upload_stores_original_and_thumbnail() {
        let env = TestEnv::new();
        let bytes = jpeg_bytes(400, 300);
        let outcome = run(
            &env,
            &UploadRequest {
                content_type: "image/pjpeg",
                ..request("P1", "photo.JPG", &bytes)
            },
        )
        .unwrap();

        assert_eq!(outcome.original.filename, "photo.JPG");
        assert_eq!(outcome.thumbnail.filename, "photo-100.jpg");
        assert_eq!(outcome.original.url, "/images/P1/photo.JPG");
        assert_eq!(outcome.mime_type, "image/jpeg");
        assert_eq!(outcome.status, ImageStatus::Pending);
        assert_eq!(env.owner_files("P1"), vec!["photo-100.jpg", "photo.JPG"]);

        // Original bytes are stored verbatim
        assert_eq!(std::fs::read(&outcome.original.path).unwrap(), bytes);
        assert_eq!(
            image::image_dimensions(&outcome.thumbnail.path).unwrap(),
            (100, 75)
        );
    }

    #[test]
    fn records_and_association_created() {
        let env = TestEnv::new();
        let bytes = jpeg_bytes(120, 160);
        let outcome = run(&env, &request("P1", "shot.jpg", &bytes)).unwrap();

        assert_eq!(env.repo.content_count(), 2);
        let original = data_resource_for_content(&env.repo, &outcome.content_id)
            .unwrap()
            .unwrap();
        assert_eq!(original.name, "shot.jpg");
        assert_eq!(original.object_info, "/images/P1/shot.jpg");
        let thumb = data_resource_for_content(&env.repo, &outcome.thumbnail_content_id)
            .unwrap()
            .unwrap();
        assert_eq!(thumb.name, "shot-100.jpg");

        let assocs = env
            .repo
            .query_associations_by_type_and_parent(IMAGE_THUMBNAIL, &outcome.content_id)
            .unwrap();
        assert_eq!(assocs.len(), 1);
        assert_eq!(assocs[0].to_id, outcome.thumbnail_content_id);
        assert_eq!(assocs[0].map_key, "100");

        let link = env
            .repo
            .query_owner_content("P1", &outcome.content_id)
            .unwrap()
            .unwrap();
        assert_eq!(link.status, ImageStatus::Pending);
        assert_eq!(link.product_content_type, "IMAGE");
        assert_eq!(env.repo.approvals(), vec![outcome.content_id.clone()]);
    }

    #[test]
    fn auto_approve_moves_status() {
        let mut env = TestEnv::new();
        env.config.auto_approve = true;
        let bytes = jpeg_bytes(50, 50);
        let outcome = run(&env, &request("P1", "a.jpg", &bytes)).unwrap();
        assert_eq!(outcome.status, ImageStatus::Approved);
        let link = env
            .repo
            .query_owner_content("P1", &outcome.content_id)
            .unwrap()
            .unwrap();
        assert_eq!(link.status, ImageStatus::Approved);
    }

    #[test]
    fn second_upload_with_same_name_gets_counter() {
        let env = TestEnv::new();
        let bytes = jpeg_bytes(60, 40);
        run(&env, &request("P1", "photo.jpg", &bytes)).unwrap();
        let second = run(&env, &request("P1", "photo.jpg", &bytes)).unwrap();

        assert_eq!(second.original.filename, "photo(1).jpg");
        assert_eq!(second.thumbnail.filename, "photo(1)-100.jpg");
        assert_eq!(env.owner_files("P1").len(), 4);
    }

    #[test]
    fn thumbnail_does_not_replace_earlier_original() {
        let env = TestEnv::new();
        let big = jpeg_bytes(800, 600);
        let first = run(&env, &request("P1", "photo-100.jpg", &big)).unwrap();
        let second = run(&env, &request("P1", "photo.jpg", &jpeg_bytes(200, 200))).unwrap();

        assert_eq!(
            image::image_dimensions(&first.original.path).unwrap(),
            (800, 600)
        );
        assert_eq!(second.thumbnail.filename, "photo-100(1).jpg");
        let thumb = data_resource_for_content(&env.repo, &second.thumbnail_content_id)
            .unwrap()
            .unwrap();
        assert_eq!(thumb.name, "photo-100(1).jpg");
        assert_eq!(
            env.owner_files("P1"),
            vec!["photo-100(1).jpg", "photo-100-100.jpg", "photo-100.jpg", "photo.jpg"]
        );
    }

    #[test]
    fn unknown_mime_leaves_thumbnail_without_extension() {
        let env = TestEnv::new();
        let bytes = png_bytes(30, 30);
        let outcome = run(
            &env,
            &UploadRequest {
                content_type: "image/x-unknown",
                ..request("P1", "logo.png", &bytes)
            },
        )
        .unwrap();
        assert_eq!(outcome.thumbnail.filename, "logo-100");
        // Encoded in the upload's own format
        assert_eq!(
            image::guess_format(&std::fs::read(&outcome.thumbnail.path).unwrap()).unwrap(),
            image::ImageFormat::Png
        );
    }

    // =========================================================================
    // Derivatives
    // =========================================================================

    #[test]
    fn single_size_resize_overwrites_original_name() {
        let env = TestEnv::new();
        let bytes = jpeg_bytes(800, 600);
        let outcome = run(
            &env,
            &UploadRequest {
                resize: Some(SizeRequest::Single("small".into())),
                ..request("P1", "photo.jpg", &bytes)
            },
        )
        .unwrap();

        assert_eq!(outcome.derivatives["small"], "/images/P1/photo.jpg");
        assert_eq!(
            image::image_dimensions(&outcome.original.path).unwrap(),
            (100, 75)
        );
        // Thumbnail comes from the upload, not the shrunken original
        assert_eq!(
            image::image_dimensions(&outcome.thumbnail.path).unwrap(),
            (100, 75)
        );
        assert_eq!(env.owner_files("P1"), vec!["photo-100.jpg", "photo.jpg"]);
    }

    #[test]
    fn configured_sizes_with_distinct_names() {
        let mut env = TestEnv::new();
        env.config.derivatives.distinct_filenames = true;
        env.config.derivatives.size_list = vec!["small".into(), "40x40".into()];
        let bytes = jpeg_bytes(200, 100);
        let outcome = run(
            &env,
            &UploadRequest {
                resize: Some(SizeRequest::Configured),
                ..request("P1", "wide.jpg", &bytes)
            },
        )
        .unwrap();

        assert_eq!(outcome.derivatives.len(), 2);
        assert_eq!(outcome.derivatives["40x40"], "/images/P1/wide-40x40.jpg");
        assert_eq!(
            env.owner_files("P1"),
            vec!["wide-100.jpg", "wide-40x40.jpg", "wide-small.jpg", "wide.jpg"]
        );
        assert_eq!(
            image::image_dimensions(env.owner_dir("P1").join("wide-40x40.jpg")).unwrap(),
            (40, 20)
        );

        // Each derivative file is recorded and hangs off the primary
        assert_eq!(env.repo.content_count(), 4);
        let small = data_resource_for_content(&env.repo, &outcome.derivative_content_ids["small"])
            .unwrap()
            .unwrap();
        assert_eq!(small.name, "wide-small.jpg");
        let mut keys: Vec<String> = env
            .repo
            .query_associations_by_type_and_parent(IMAGE_THUMBNAIL, &outcome.content_id)
            .unwrap()
            .into_iter()
            .map(|a| a.map_key)
            .collect();
        keys.sort();
        assert_eq!(keys, vec!["100", "40x40", "small"]);

        let backend = RustBackend::new();
        let ctx = Context::new(&env.config, &backend, &env.repo);
        crate::rename::rename_primary(&ctx, "P1", &outcome.content_id, "beach.jpg").unwrap();
        assert_eq!(
            env.owner_files("P1"),
            vec!["beach-100.jpg", "beach-40x40.jpg", "beach-small.jpg", "beach.jpg"]
        );
    }

    #[test]
    fn overwrite_mode_records_no_derivative_files() {
        let mut env = TestEnv::new();
        env.config.derivatives.size_list = vec!["small".into(), "40x40".into()];
        let bytes = jpeg_bytes(300, 300);
        let outcome = run(
            &env,
            &UploadRequest {
                resize: Some(SizeRequest::Configured),
                ..request("P1", "sq.jpg", &bytes)
            },
        )
        .unwrap();
        assert!(outcome.derivative_content_ids.is_empty());
        assert_eq!(env.repo.content_count(), 2);
    }

    #[test]
    fn unknown_size_aborts_before_thumbnail() {
        let env = TestEnv::new();
        let bytes = jpeg_bytes(50, 50);
        let err = run(
            &env,
            &UploadRequest {
                resize: Some(SizeRequest::Single("gigantic".into())),
                ..request("P1", "a.jpg", &bytes)
            },
        )
        .unwrap_err();

        assert!(matches!(
            err,
            PipelineError::Configuration(ConfigError::Preset(_))
        ));
        // Original persisted, nothing after it
        assert_eq!(env.owner_files("P1"), vec!["a.jpg"]);
        assert_eq!(env.repo.content_count(), 0);
    }

    // =========================================================================
    // Rejections
    // =========================================================================

    #[test]
    fn scanner_rejection_writes_nothing() {
        let env = TestEnv::new();
        let backend = RustBackend::new();
        let ctx = Context::new(&env.config, &backend, &env.repo);
        let scanner = FixedScanner::rejecting();
        let bytes = jpeg_bytes(50, 50);

        let err = ingest(&ctx, &scanner, &request("P1", "a.jpg", &bytes)).unwrap_err();

        assert!(matches!(err, PipelineError::Security(_)));
        assert!(env.owner_files("P1").is_empty());
        assert_eq!(env.repo.content_count(), 0);
        // Staged copy lived outside the storage tree and is gone
        let seen = scanner.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert!(!seen[0].starts_with(&env.config.storage_root));
        assert!(!seen[0].exists());
    }

    #[test]
    fn accepted_upload_links_owner_with_registered_extension() {
        let env = TestEnv::new();
        env.repo.register_file_extension("image/x-logo", "png").unwrap();
        let backend = RustBackend::new();
        let ctx = Context::new(&env.config, &backend, &env.repo);
        let scanner = FixedScanner::accepting();
        let bytes = png_bytes(30, 30);

        let outcome = ingest(
            &ctx,
            &scanner,
            &UploadRequest {
                content_type: "image/x-logo",
                ..request("P2", "logo.png", &bytes)
            },
        )
        .unwrap();

        assert_eq!(outcome.thumbnail.filename, "logo-100.png");
        assert_eq!(scanner.seen.lock().unwrap().len(), 1);
        let links = env.repo.owner_contents();
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].product_id, "P2");
        assert_eq!(links[0].content_id, outcome.content_id);
    }

    #[test]
    fn disguised_executable_rejected() {
        let env = TestEnv::new();
        let mut bytes = b"MZ".to_vec();
        bytes.extend_from_slice(&[0u8; 128]);
        let err = run(&env, &request("P1", "cute.jpg", &bytes)).unwrap_err();
        assert!(matches!(err, PipelineError::Security(_)));
        assert!(env.owner_files("P1").is_empty());
    }

    #[test]
    fn validation_errors() {
        let env = TestEnv::new();
        let bytes = jpeg_bytes(10, 10);
        for req in [
            request("", "a.jpg", &bytes),
            request("P1", "../a.jpg", &bytes),
            request("P1", "a.jpg", &[]),
            UploadRequest {
                content_type: " ",
                ..request("P1", "a.jpg", &bytes)
            },
        ] {
            let err = run(&env, &req).unwrap_err();
            assert!(matches!(err, PipelineError::Validation(_)), "{req:?}");
        }
        assert!(!Path::new(&env.config.storage_root).exists());
    }

    #[test]
    fn unwritable_storage_root_is_directory_error() {
        let mut env = TestEnv::new();
        let blocker = env.tmp.path().join("blocker");
        std::fs::write(&blocker, "file, not dir").unwrap();
        env.config.storage_root = blocker.join("images").to_string_lossy().into_owned();

        let bytes = jpeg_bytes(10, 10);
        let err = run(&env, &request("P1", "a.jpg", &bytes)).unwrap_err();
        assert!(matches!(err, PipelineError::Directory { .. }));
    }
}

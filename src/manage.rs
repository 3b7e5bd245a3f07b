//! Maintenance operations on images already in the catalog.

use crate::config::ImagingConfig;
use crate::context::{Context, check_segment};
use crate::error::{PipelineError, Result};
use crate::imaging::{ImageBackend, fit_into_square};
use crate::naming;
use crate::repository::{IMAGE_THUMBNAIL, ObjectInfo, Repository, create_content_and_data_resource};
use std::path::PathBuf;
use tracing::{info, warn};

/// Mime type recorded for thumbnails added after upload.
pub const ADDED_THUMBNAIL_MIME: &str = "image/jpeg";

/// Extension used when the primary has none.
const FALLBACK_EXTENSION: &str = "jpg";

/// Delete one stored file of a product.
///
/// An empty `content_id` makes this a no-op. A failed delete is logged and
/// reported as `Ok(false)`, never as an error; records are left untouched.
pub fn remove_image_file(
    config: &ImagingConfig,
    product_id: &str,
    content_id: &str,
    data_resource_name: &str,
) -> Result<bool> {
    if content_id.trim().is_empty() {
        return Ok(false);
    }
    check_segment("product id", product_id)?;
    check_segment("filename", data_resource_name)?;

    let path = config.owner_dir(product_id).join(data_resource_name);
    match std::fs::remove_file(&path) {
        Ok(()) => {
            info!(path = %path.display(), content_id, "image file removed");
            Ok(true)
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "image file could not be deleted");
            Ok(false)
        }
    }
}

/// A thumbnail added to an existing image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddedThumbnail {
    pub content_id: String,
    pub filename: String,
    pub path: PathBuf,
    pub url: String,
    pub width: u32,
    pub height: u32,
}

/// Add a `width × width` thumbnail of a stored primary and link it.
///
/// The file is `<base>-<width>.<ext>` next to the primary (with a `(n)`
/// counter if that name is taken) and is associated to `content_id` with map
/// key `width`, so a later rename picks it up. A width the content already
/// has a thumbnail for is rejected.
pub fn create_new_thumbnail<B: ImageBackend>(
    ctx: &Context<'_, B>,
    product_id: &str,
    content_id: &str,
    data_resource_name: &str,
    width: u32,
) -> Result<AddedThumbnail> {
    check_segment("content id", content_id)?;
    check_width(width)?;
    let source = ctx.owner_file(product_id, data_resource_name)?;

    let (base, extension) = naming::split_extension(data_resource_name);
    let map_key = width.to_string();
    let taken = ctx
        .repo
        .query_associations_by_type_and_parent(IMAGE_THUMBNAIL, content_id)?
        .iter()
        .any(|a| a.map_key == map_key);
    if taken {
        return Err(PipelineError::Validation(format!(
            "content {content_id} already has a {width}px thumbnail"
        )));
    }
    let desired = ctx.owner_file(
        product_id,
        &naming::derivative_filename(base, &map_key, Some(extension.unwrap_or(FALLBACK_EXTENSION))),
    )?;
    let path = naming::resolve(&desired).map_err(|e| PipelineError::io(&desired, e))?;
    let filename = naming::file_name(&path);

    let (out_width, out_height) = fit_into_square(ctx.backend, &source, &path, width)?;

    let thumb_content_id = ctx.repo.create_content()?;
    let url = ctx.config.file_url(product_id, &filename);
    create_content_and_data_resource(
        ctx.repo,
        &thumb_content_id,
        &ObjectInfo {
            url: url.clone(),
            name: filename.clone(),
        },
        ADDED_THUMBNAIL_MIME,
    )?;
    ctx.repo
        .create_content_association(content_id, &thumb_content_id, IMAGE_THUMBNAIL, &map_key)?;

    info!(content_id, thumbnail = %filename, width = out_width, height = out_height, "thumbnail added");
    Ok(AddedThumbnail {
        content_id: thumb_content_id,
        filename,
        path,
        url,
        width: out_width,
        height: out_height,
    })
}

/// Shrink (or enlarge) a stored image to fit `width × width`, in place.
pub fn resize_in_place<B: ImageBackend>(
    ctx: &Context<'_, B>,
    product_id: &str,
    data_resource_name: &str,
    width: u32,
) -> Result<(u32, u32)> {
    check_width(width)?;
    let path = ctx.owner_file(product_id, data_resource_name)?;
    let dims = fit_into_square(ctx.backend, &path, &path, width)?;
    info!(path = %path.display(), width = dims.0, height = dims.1, "image resized in place");
    Ok(dims)
}

fn check_width(width: u32) -> Result<()> {
    if width == 0 {
        return Err(PipelineError::Validation("width must be positive".into()));
    }
    Ok(())
}

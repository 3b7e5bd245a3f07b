//! Rename cascade.
//!
//! Renaming a primary image moves its file, updates its records, and then
//! does the same for every `IMAGE_THUMBNAIL` child, whose new name is
//! `<newBase>-<mapKey>.<newExt>`.
//!
//! ## Re-running after a failure
//!
//! There is no rollback. Instead every step checks whether its effect is
//! already in place and skips itself if so:
//!
//! - a file whose target exists and whose source is gone is left alone;
//! - a record whose name already equals the target is not rewritten.
//!
//! Calling [`rename_primary`] again with the same arguments after a partial
//! failure therefore finishes the job without redoing completed steps.
//!
//! ## Collisions
//!
//! All targets are planned first and checked against the cascade's own
//! sources and against files already on disk. A rename that would land on
//! a live file fails before anything moves.

use crate::context::{Context, check_segment};
use crate::error::{PipelineError, Result};
use crate::imaging::ImageBackend;
use crate::imaging::rust_backend::output_format;
use crate::naming;
use crate::repository::{
    DataResourceRecord, IMAGE_THUMBNAIL, ObjectInfo, Repository, RepositoryError,
    data_resource_for_content,
};
use std::collections::HashSet;
use std::path::Path;
use tracing::{info, instrument, warn};

/// What happened to one file during a cascade.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenamedFile {
    pub content_id: String,
    pub from: String,
    pub to: String,
    /// Map key of the association; `None` for the primary.
    pub map_key: Option<String>,
    /// `false` when the file was already under its new name.
    pub moved: bool,
}

/// Result of a completed cascade: the primary first, then each child.
#[derive(Debug, Clone)]
pub struct RenameOutcome {
    pub product_id: String,
    pub primary: RenamedFile,
    pub derivatives: Vec<RenamedFile>,
}

impl RenameOutcome {
    /// Number of files that actually moved in this run.
    pub fn moved_count(&self) -> usize {
        std::iter::once(&self.primary)
            .chain(&self.derivatives)
            .filter(|f| f.moved)
            .count()
    }
}

/// Rename a product's primary image and cascade to its derivatives.
///
/// Every target name is checked before the first file moves. The call is
/// rejected with [`PipelineError::Validation`] when a target is the current
/// name of another file in the cascade, when two files would get the same
/// name, or when a target is already taken while its source still exists.
#[instrument(skip(ctx))]
pub fn rename_primary<B: ImageBackend>(
    ctx: &Context<'_, B>,
    product_id: &str,
    content_id: &str,
    new_filename: &str,
) -> Result<RenameOutcome> {
    check_segment("product id", product_id)?;
    check_segment("content id", content_id)?;
    check_segment("filename", new_filename)?;

    let link = ctx
        .repo
        .query_owner_content(product_id, content_id)?
        .filter(|l| l.product_content_type == ctx.config.product_content_type)
        .ok_or_else(|| not_found("product image", &format!("{product_id}/{content_id}")))?;
    let primary_resource = data_resource_for_content(ctx.repo, &link.content_id)?
        .ok_or_else(|| not_found("data resource for content", content_id))?;

    let (new_base, new_ext) = naming::split_extension(new_filename);
    let new_ext = new_ext.ok_or_else(|| {
        PipelineError::Validation(format!("new filename '{new_filename}' has no extension"))
    })?;
    let (_, old_ext) = naming::split_extension(&primary_resource.name);
    if !extensions_compatible(old_ext, new_ext) {
        return Err(PipelineError::Validation(format!(
            "cannot rename {} to {new_filename}: extension must stay {}",
            primary_resource.name,
            old_ext.unwrap_or("(none)")
        )));
    }

    let mut steps = vec![Step {
        content_id: content_id.to_string(),
        resource: primary_resource,
        target: new_filename.to_string(),
        map_key: None,
    }];
    for assoc in ctx
        .repo
        .query_associations_by_type_and_parent(IMAGE_THUMBNAIL, content_id)?
    {
        let resource = data_resource_for_content(ctx.repo, &assoc.to_id)?
            .ok_or_else(|| not_found("data resource for content", &assoc.to_id))?;
        steps.push(Step {
            target: naming::derivative_filename(new_base, &assoc.map_key, Some(new_ext)),
            content_id: assoc.to_id,
            resource,
            map_key: Some(assoc.map_key),
        });
    }
    check_targets(ctx, product_id, &steps)?;

    let primary = rename_one(ctx, product_id, &steps[0])?;
    let derivatives = steps[1..]
        .iter()
        .map(|step| rename_one(ctx, product_id, step))
        .collect::<Result<Vec<_>>>()?;
    let outcome = RenameOutcome {
        product_id: product_id.to_string(),
        primary,
        derivatives,
    };
    info!(
        moved = outcome.moved_count(),
        derivatives = outcome.derivatives.len(),
        "rename cascade complete"
    );
    Ok(outcome)
}

/// One file of the cascade: its records and the name it should end up with.
struct Step {
    content_id: String,
    resource: DataResourceRecord,
    target: String,
    map_key: Option<String>,
}

/// Same encoder on both sides (`jpg` and `jpeg` match); unknown extensions
/// must match exactly, ignoring case.
fn extensions_compatible(old: Option<&str>, new: &str) -> bool {
    let Some(old) = old else {
        return false;
    };
    match (output_format(old), output_format(new)) {
        (Some(a), Some(b)) => a == b,
        _ => old.eq_ignore_ascii_case(new),
    }
}

/// Reject the cascade if any move would land on a live file.
///
/// A step whose record already carries its target name is finished and is
/// not checked. A step whose source is gone and whose target exists is a
/// move completed by an earlier run and is allowed.
fn check_targets<B: ImageBackend>(
    ctx: &Context<'_, B>,
    product_id: &str,
    steps: &[Step],
) -> Result<()> {
    let sources: HashSet<&str> = steps.iter().map(|s| s.resource.name.as_str()).collect();
    let mut targets = HashSet::new();

    for step in steps {
        let from_name = step.resource.name.as_str();
        let to_name = step.target.as_str();
        if !targets.insert(to_name) {
            return Err(PipelineError::Validation(format!(
                "cannot rename: two files would both be named {to_name}"
            )));
        }
        if from_name == to_name {
            continue;
        }
        if sources.contains(to_name) {
            return Err(PipelineError::Validation(format!(
                "cannot rename {from_name} to {to_name}: that name belongs to another file of this image"
            )));
        }

        let from = ctx.owner_file(product_id, from_name)?;
        let to = ctx.owner_file(product_id, to_name)?;
        match (exists(&from)?, exists(&to)?) {
            (true, false) | (false, true) => {}
            (true, true) => {
                return Err(PipelineError::Validation(format!(
                    "cannot rename {from_name} to {to_name}: {to_name} already exists"
                )));
            }
            (false, false) => {
                return Err(PipelineError::io(
                    from,
                    std::io::Error::new(
                        std::io::ErrorKind::NotFound,
                        "neither old nor new file exists",
                    ),
                ));
            }
        }
    }
    Ok(())
}

fn exists(path: &Path) -> Result<bool> {
    path.try_exists().map_err(|e| PipelineError::io(path, e))
}

fn rename_one<B: ImageBackend>(
    ctx: &Context<'_, B>,
    product_id: &str,
    step: &Step,
) -> Result<RenamedFile> {
    let Step {
        content_id,
        resource,
        target,
        map_key,
    } = step;
    let from = ctx.owner_file(product_id, &resource.name)?;
    let to = ctx.owner_file(product_id, target)?;
    let moved = move_file(ctx.backend, &from, &to)?;

    let url = ctx.config.file_url(product_id, target);
    let content_name = ctx
        .repo
        .query_content_by_id(content_id)?
        .and_then(|c| c.name);
    if content_name.as_deref() != Some(target.as_str()) {
        ctx.repo.update_content(content_id, None, target)?;
    }
    if resource.name != *target || resource.object_info != url {
        ctx.repo.update_data_resource(
            &resource.data_resource_id,
            &ObjectInfo {
                url,
                name: target.clone(),
            },
        )?;
    }

    Ok(RenamedFile {
        content_id: content_id.clone(),
        from: resource.name.clone(),
        to: target.clone(),
        map_key: map_key.clone(),
        moved,
    })
}

/// Re-encode `from` as `to`, then delete `from`.
///
/// Returns `Ok(false)` when there was nothing to do: `from == to`, or a
/// previous run already produced `to` and removed `from`.
fn move_file(backend: &impl ImageBackend, from: &Path, to: &Path) -> Result<bool> {
    if from == to {
        return Ok(false);
    }
    if !exists(from)? {
        if exists(to)? {
            return Ok(false);
        }
        return Err(PipelineError::io(
            from,
            std::io::Error::new(std::io::ErrorKind::NotFound, "neither old nor new file exists"),
        ));
    }

    backend.transcode(from, to)?;
    std::fs::remove_file(from).map_err(|e| {
        warn!(path = %from.display(), error = %e, "old file could not be deleted");
        PipelineError::io(from, e)
    })?;
    Ok(true)
}

fn not_found(kind: &'static str, id: &str) -> PipelineError {
    RepositoryError::NotFound {
        kind,
        id: id.to_string(),
    }
    .into()
}

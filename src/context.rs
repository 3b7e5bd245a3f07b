//! Collaborators shared by every catalog operation.

use crate::config::ImagingConfig;
use crate::error::{PipelineError, Result};
use crate::imaging::ImageBackend;
use crate::repository::Repository;
use std::path::PathBuf;

/// Configuration, pixel backend, and repository for one invocation.
///
/// Borrowed, not owned: callers keep the repository and backend alive across
/// operations and hand a fresh `Context` to each call.
pub struct Context<'a, B: ImageBackend> {
    pub config: &'a ImagingConfig,
    pub backend: &'a B,
    pub repo: &'a dyn Repository,
}

impl<'a, B: ImageBackend> Context<'a, B> {
    pub fn new(config: &'a ImagingConfig, backend: &'a B, repo: &'a dyn Repository) -> Self {
        Self {
            config,
            backend,
            repo,
        }
    }

    /// Path of a file inside an owner directory, after checking both names
    /// are single path segments.
    pub fn owner_file(&self, product_id: &str, filename: &str) -> Result<PathBuf> {
        check_segment("product id", product_id)?;
        check_segment("filename", filename)?;
        Ok(self.config.owner_dir(product_id).join(filename))
    }
}

/// Reject empty names and anything that could step outside an owner directory.
pub fn check_segment(kind: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(PipelineError::Validation(format!("{kind} is required")));
    }
    if value == "." || value == ".." || value.contains(['/', '\\', '\0']) {
        return Err(PipelineError::Validation(format!(
            "{kind} '{value}' is not a plain name"
        )));
    }
    Ok(())
}

//! Imaging configuration module.
//!
//! Handles loading, validating, and merging `catalog-images.toml`. Stock
//! defaults are serialised to a TOML table and the user file is merged on top,
//! so a config file only needs the keys it wants to change.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! storage_root = "images"          # <storageRoot>/<productId>/<filename>
//! url_base = "/images"             # Public URL prefix for stored files
//! thumbnail_suffix = "-100"        # photo.jpg -> photo-100.jpg
//! auto_approve = false             # Approve new uploads immediately
//! product_content_type = "IMAGE"   # Owner association type
//!
//! [derivatives]
//! size_list = ["small", "100x75", "150x112", "320x240", "640x480",
//!              "800x600", "1024x768", "1280x1024", "1600x1200"]
//! distinct_filenames = false       # true: photo-<label>.jpg per size
//! # presets_file = "presets.toml"  # Extra presets, read when derivatives run
//!
//! [derivatives.presets]
//! small = { width = 100, height = 75 }
//! ```
//!
//! ## Size Labels
//!
//! Every entry of `size_list` (and the single size a caller may request) is
//! either the name of a preset or a `WxH` literal. Labels are resolved all at
//! once; every label that resolves to nothing is reported in one error before
//! any image work starts.
//!
//! Unknown keys are rejected to catch typos early.

use crate::imaging::{DerivativeNaming, SizeSpec};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Config filename looked up by [`load_config`].
pub const CONFIG_FILENAME: &str = "catalog-images.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
    #[error("Size preset error: {}", .0.join("; "))]
    Preset(Vec<String>),
}

/// Imaging configuration loaded from `catalog-images.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ImagingConfig {
    /// Root of the owner directories.
    pub storage_root: String,
    /// Public URL base; a file's URL is `<url_base>/<productId>/<filename>`.
    pub url_base: String,
    /// Appended to the parent's base name to form the thumbnail filename.
    pub thumbnail_suffix: String,
    /// Move new uploads straight from pending to approved.
    pub auto_approve: bool,
    /// Association type recorded when attaching an image to its owner.
    pub product_content_type: String,
    pub derivatives: DerivativesConfig,
}

impl Default for ImagingConfig {
    fn default() -> Self {
        Self {
            storage_root: "images".to_string(),
            url_base: "/images".to_string(),
            thumbnail_suffix: "-100".to_string(),
            auto_approve: false,
            product_content_type: "IMAGE".to_string(),
            derivatives: DerivativesConfig::default(),
        }
    }
}

impl ImagingConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.storage_root.trim().is_empty() {
            return Err(ConfigError::Validation(
                "storage_root must not be empty".into(),
            ));
        }
        if self.thumbnail_suffix.is_empty() {
            return Err(ConfigError::Validation(
                "thumbnail_suffix must not be empty".into(),
            ));
        }
        if self.thumbnail_suffix.contains(['/', '\\']) {
            return Err(ConfigError::Validation(
                "thumbnail_suffix must not contain path separators".into(),
            ));
        }
        if self.derivatives.size_list.is_empty() {
            return Err(ConfigError::Validation(
                "derivatives.size_list must not be empty".into(),
            ));
        }
        for (name, preset) in &self.derivatives.presets {
            if preset.width == 0 || preset.height == 0 {
                return Err(ConfigError::Validation(format!(
                    "derivatives.presets.{name} must have non-zero width and height"
                )));
            }
        }
        Ok(())
    }

    /// Directory holding every file of one owner.
    pub fn owner_dir(&self, product_id: &str) -> PathBuf {
        Path::new(&self.storage_root).join(product_id)
    }

    /// Public URL prefix of one owner directory, without trailing slash.
    pub fn owner_url(&self, product_id: &str) -> String {
        format!("{}/{}", self.url_base.trim_end_matches('/'), product_id)
    }

    /// Public URL of one stored file.
    pub fn file_url(&self, product_id: &str, filename: &str) -> String {
        format!("{}/{}", self.owner_url(product_id), filename)
    }

    pub fn derivative_naming(&self) -> DerivativeNaming {
        if self.derivatives.distinct_filenames {
            DerivativeNaming::Distinct
        } else {
            DerivativeNaming::Overwrite
        }
    }
}

/// Derivative batch settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DerivativesConfig {
    /// Sizes generated when a caller asks for derivatives without naming one.
    pub size_list: Vec<String>,
    /// Give every size its own `<base>-<label>.<ext>` file instead of
    /// writing each one over the original name.
    pub distinct_filenames: bool,
    /// Optional TOML file of extra presets (`name = { width, height }`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presets_file: Option<String>,
    /// Named presets.
    pub presets: BTreeMap<String, Preset>,
}

impl Default for DerivativesConfig {
    fn default() -> Self {
        Self {
            size_list: [
                "small", "100x75", "150x112", "320x240", "640x480", "800x600", "1024x768",
                "1280x1024", "1600x1200",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            distinct_filenames: false,
            presets_file: None,
            presets: BTreeMap::from([(
                "small".to_string(),
                Preset {
                    width: 100,
                    height: 75,
                },
            )]),
        }
    }
}

/// A named bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Preset {
    pub width: u32,
    pub height: u32,
}

impl DerivativesConfig {
    /// Resolve size labels into descriptors.
    ///
    /// `requested = Some(label)` resolves just that label; `None` resolves
    /// the whole `size_list`. The presets file, when configured, is read here
    /// and its entries take precedence over inline presets. Any malformed
    /// source or unresolvable label fails the whole call with one
    /// [`ConfigError::Preset`] listing every problem.
    pub fn resolve_sizes(&self, requested: Option<&str>) -> Result<Vec<SizeSpec>, ConfigError> {
        let mut problems = Vec::new();
        let mut presets = self.presets.clone();

        if let Some(file) = &self.presets_file {
            match load_presets_file(Path::new(file)) {
                Ok(extra) => presets.extend(extra),
                Err(e) => problems.push(format!("presets file {file}: {e}")),
            }
        }

        let labels: Vec<&str> = match requested {
            Some(label) => vec![label],
            None => self.size_list.iter().map(String::as_str).collect(),
        };

        let mut sizes = Vec::with_capacity(labels.len());
        for label in labels {
            match resolve_label(label, &presets) {
                Some(spec) => sizes.push(spec),
                None => problems.push(format!(
                    "size '{label}' is neither a preset nor a WxH literal"
                )),
            }
        }

        if problems.is_empty() {
            Ok(sizes)
        } else {
            Err(ConfigError::Preset(problems))
        }
    }
}

fn resolve_label(label: &str, presets: &BTreeMap<String, Preset>) -> Option<SizeSpec> {
    match presets.get(label) {
        Some(p) if p.width > 0 && p.height > 0 => Some(SizeSpec::new(label, p.width, p.height)),
        Some(_) => None,
        None => SizeSpec::parse_literal(label),
    }
}

/// Read an external presets table.
pub fn load_presets_file(path: &Path) -> Result<BTreeMap<String, Preset>, ConfigError> {
    let content = fs::read_to_string(path)?;
    let presets: BTreeMap<String, Preset> = toml::from_str(&content)?;
    Ok(presets)
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
///
/// This is the canonical representation of all default values, used as the
/// base layer for merging user overrides on top.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    Ok(toml::Value::try_from(ImagingConfig::default())?)
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Load a config file as a raw TOML value.
///
/// Returns `Ok(None)` if the file does not exist.
pub fn load_raw_config(path: &Path) -> Result<Option<toml::Value>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge an optional overlay onto the stock defaults, then deserialize and validate.
pub fn resolve_config(overlay: Option<toml::Value>) -> Result<ImagingConfig, ConfigError> {
    let base = stock_defaults_value()?;
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: ImagingConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load config from an explicit file, or from [`CONFIG_FILENAME`] in the
/// working directory when `path` is `None`.
///
/// A missing file yields the stock defaults.
pub fn load_config(path: Option<&Path>) -> Result<ImagingConfig, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new(CONFIG_FILENAME));
    resolve_config(load_raw_config(path)?)
}

/// Returns a fully-commented stock config with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# catalog-images configuration
# ============================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults. Unknown keys will cause an error.

# Directory holding one subdirectory per product: <storage_root>/<productId>/
storage_root = "images"

# Public URL base. A stored file is served as <url_base>/<productId>/<filename>.
url_base = "/images"

# Appended to the original's base name to name its thumbnail:
# photo.jpg -> photo-100.jpg
thumbnail_suffix = "-100"

# Approve new uploads immediately instead of leaving them pending review.
auto_approve = false

# Association type used when attaching an uploaded image to its product.
product_content_type = "IMAGE"

# ---------------------------------------------------------------------------
# Derivatives
# ---------------------------------------------------------------------------
[derivatives]
# Sizes generated when an upload asks for derivatives without naming one.
# Each entry is a preset name or a WxH bounding box.
size_list = ["small", "100x75", "150x112", "320x240", "640x480", "800x600", "1024x768", "1280x1024", "1600x1200"]

# false: every size is written over the original's filename, so only the
# last size survives on disk.
# true: each size is written as <base>-<label>.<ext>.
distinct_filenames = false

# Optional TOML file with more presets, one `name = { width, height }` per line.
# presets_file = "presets.toml"

# Named presets (bounding boxes, aspect ratio is always preserved).
[derivatives.presets]
small = { width = 100, height = 75 }
"##
}

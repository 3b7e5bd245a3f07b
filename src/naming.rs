//! File naming inside an owner directory.
//!
//! Two concerns live here:
//!
//! - **Collision resolution.** [`resolve`] turns a desired path into one that
//!   does not exist yet by inserting a parenthesised counter before the
//!   extension: `photo.jpg` → `photo(1).jpg` → `photo(2).jpg`. The counter
//!   lives on the stack of a single call; nothing is retained between calls.
//! - **Derived names.** Thumbnails are `<base><suffix>.<ext>` and sized
//!   derivatives are `<base>-<key>.<ext>`, where `<base>` is the parent's
//!   name with its extension removed.

use std::io;
use std::path::{Path, PathBuf};

/// Return `desired` if it does not exist, otherwise the first free
/// `name(n).ext` next to it, counting from 1.
pub fn resolve(desired: &Path) -> io::Result<PathBuf> {
    resolve_with(desired, |p| p.try_exists())
}

/// [`resolve`] with an injected existence check.
///
/// An error from `exists` aborts the search and is returned unchanged.
pub fn resolve_with<F>(desired: &Path, mut exists: F) -> io::Result<PathBuf>
where
    F: FnMut(&Path) -> io::Result<bool>,
{
    if !exists(desired)? {
        return Ok(desired.to_path_buf());
    }

    let filename = file_name(desired);
    let (base, extension) = split_extension(&filename);
    let parent = desired.parent().unwrap_or_else(|| Path::new(""));

    let mut counter: u64 = 1;
    loop {
        let candidate_name = match extension {
            Some(ext) => format!("{base}({counter}).{ext}"),
            None => format!("{base}({counter})"),
        };
        let candidate = parent.join(candidate_name);
        if !exists(&candidate)? {
            return Ok(candidate);
        }
        counter += 1;
    }
}

/// Final path component as an owned string (lossy for non-UTF-8 names).
pub fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Split `name.ext` at the last dot.
///
/// - `"photo.JPG"` → `("photo", Some("JPG"))`
/// - `"archive.tar.gz"` → `("archive.tar", Some("gz"))`
/// - `"README"` → `("README", None)`
/// - `".hidden"` → `(".hidden", None)`
pub fn split_extension(filename: &str) -> (&str, Option<&str>) {
    match filename.rfind('.') {
        Some(0) | None => (filename, None),
        Some(idx) => (&filename[..idx], Some(&filename[idx + 1..])),
    }
}

/// Thumbnail name: `<base><suffix>` plus `.<ext>` when an extension is known.
pub fn thumbnail_filename(base: &str, suffix: &str, extension: Option<&str>) -> String {
    match extension {
        Some(ext) => format!("{base}{suffix}.{ext}"),
        None => format!("{base}{suffix}"),
    }
}

/// Sized derivative name: `<base>-<key>` plus `.<ext>` when an extension is known.
pub fn derivative_filename(base: &str, key: &str, extension: Option<&str>) -> String {
    match extension {
        Some(ext) => format!("{base}-{key}.{ext}"),
        None => format!("{base}-{key}"),
    }
}

/// Canonical mime type for a browser-reported content type.
///
/// Legacy aliases are folded onto their standard names: `image/pjpeg` →
/// `image/jpeg` and `image/x-png` → `image/png`. Anything else passes
/// through trimmed and lower-cased.
pub fn normalize_content_type(content_type: &str) -> String {
    let lower = content_type.trim().to_ascii_lowercase();
    match lower.as_str() {
        "image/pjpeg" => "image/jpeg".to_string(),
        "image/x-png" => "image/png".to_string(),
        _ => lower,
    }
}

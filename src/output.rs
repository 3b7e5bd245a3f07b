//! CLI output formatting for every command.
//!
//! # Information-First Display
//!
//! The header line of each result names the catalog entity (content id and
//! stored filename); paths and URLs follow as indented context lines.
//!
//! # Output Format
//!
//! ## Ingest
//!
//! ```text
//! 10000 photo.JPG (pending)
//!     Path: images/P1/photo.JPG
//!     URL: /images/P1/photo.JPG
//!     Thumbnail: 10001 photo-100.jpg
//!     small: /images/P1/photo.JPG
//! ```
//!
//! ## Rename
//!
//! ```text
//! 10000 photo.JPG → beach.JPG
//!     100: photo-100.jpg → beach-100.JPG
//!     50: beach-50.JPG → beach-50.JPG (already renamed)
//! Renamed 2 of 3 files
//! ```
//!
//! # Architecture
//!
//! Each command has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format
//! functions are pure: no I/O, no side effects.

use crate::ingest::IngestOutcome;
use crate::manage::AddedThumbnail;
use crate::rename::{RenameOutcome, RenamedFile};
use crate::repository::ImageStatus;

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

fn status_label(status: ImageStatus) -> &'static str {
    match status {
        ImageStatus::Pending => "pending",
        ImageStatus::Approved => "approved",
    }
}

fn rename_line(file: &RenamedFile) -> String {
    let arrow = format!("{} → {}", file.from, file.to);
    if file.moved {
        arrow
    } else {
        format!("{arrow} (already renamed)")
    }
}

pub fn format_ingest_output(outcome: &IngestOutcome) -> Vec<String> {
    let mut lines = vec![
        format!(
            "{} {} ({})",
            outcome.content_id,
            outcome.original.filename,
            status_label(outcome.status)
        ),
        format!("{}Path: {}", indent(1), outcome.original.path.display()),
        format!("{}URL: {}", indent(1), outcome.original.url),
        format!(
            "{}Thumbnail: {} {}",
            indent(1),
            outcome.thumbnail_content_id,
            outcome.thumbnail.filename
        ),
    ];
    for (label, url) in &outcome.derivatives {
        lines.push(format!("{}{}: {}", indent(1), label, url));
    }
    lines
}

pub fn print_ingest_output(outcome: &IngestOutcome) {
    for line in format_ingest_output(outcome) {
        println!("{line}");
    }
}

pub fn format_rename_output(outcome: &RenameOutcome) -> Vec<String> {
    let mut lines = vec![format!(
        "{} {}",
        outcome.primary.content_id,
        rename_line(&outcome.primary)
    )];
    for file in &outcome.derivatives {
        lines.push(format!(
            "{}{}: {}",
            indent(1),
            file.map_key.as_deref().unwrap_or("?"),
            rename_line(file)
        ));
    }
    lines.push(format!(
        "Renamed {} of {} files",
        outcome.moved_count(),
        outcome.derivatives.len() + 1
    ));
    lines
}

pub fn print_rename_output(outcome: &RenameOutcome) {
    for line in format_rename_output(outcome) {
        println!("{line}");
    }
}

pub fn format_thumbnail_output(added: &AddedThumbnail) -> Vec<String> {
    vec![
        format!(
            "{} {} ({}x{})",
            added.content_id, added.filename, added.width, added.height
        ),
        format!("{}URL: {}", indent(1), added.url),
    ]
}

pub fn format_remove_output(filename: &str, removed: bool) -> String {
    if removed {
        format!("Removed {filename}")
    } else {
        format!("{filename} not removed")
    }
}

pub fn format_resize_output(filename: &str, (width, height): (u32, u32)) -> String {
    format!("Resized {filename} to {width}x{height}")
}

//! # catalog-images
//!
//! Storage and derivative management for product images. An upload becomes
//! an original file, a 100×100 thumbnail, optionally a batch of resized
//! copies, and catalog records linking all of them to the product.
//!
//! # Storage Layout
//!
//! ```text
//! <storage_root>/
//! └── <productId>/
//!     ├── photo.JPG          original (photo(1).JPG if the name was taken)
//!     ├── photo-100.jpg      thumbnail: <base><thumbnail_suffix>.<ext>
//!     └── photo-200.JPG      extra thumbnail: <base>-<width>.<ext>
//! ```
//!
//! Every stored file has one data resource record (URL, filename, mime type)
//! and one content record. Thumbnails hang off their parent's content record
//! through an `IMAGE_THUMBNAIL` association whose map key is the size.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`naming`] | Collision-free names (`name(n).ext`) and derived filename conventions |
//! | [`imaging`] | Scale-to-fit math, the `image`-crate backend, derivative and thumbnail generation |
//! | [`security`] | Upload scanner run on a staged copy before anything is stored |
//! | [`repository`] | Catalog record interface plus a JSON-file implementation |
//! | [`config`] | `catalog-images.toml` loading, size presets, validation |
//! | [`context`] | Config, backend, and repository bundled for one call |
//! | [`ingest`] | Upload pipeline: validate, scan, persist, derive, record |
//! | [`rename`] | Rename a primary image and cascade to every linked thumbnail |
//! | [`manage`] | Remove a file, add a thumbnail size, resize in place |
//! | [`error`] | Caller-facing error kinds |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## Injected Collaborators
//!
//! The repository, the upload scanner, and the pixel backend are traits
//! passed in by the caller. Tests run the whole pipeline against an in-memory
//! repository and a mock backend without global state.
//!
//! ## No Rollback
//!
//! Operations are sequences of file writes and repository calls with no
//! transaction around them. A failure stops at the failing step and leaves
//! earlier effects in place. The rename cascade is written so that running
//! it again finishes a partial run; ingest failures need manual cleanup.
//!
//! ## Single-Threaded
//!
//! Everything is synchronous. Two concurrent uploads of the same filename to
//! the same product can race between the existence check and the write.

pub mod config;
pub mod context;
pub mod error;
pub mod imaging;
pub mod ingest;
pub mod manage;
pub mod naming;
pub mod output;
pub mod rename;
pub mod repository;
pub mod security;

pub use error::PipelineError;

#[cfg(test)]
pub(crate) mod test_helpers;

//! Image processing in pure Rust, built on the `image` crate.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Identify** | `ImageReader::into_dimensions` |
//! | **Fit scale** | [`fit_scale`] (uniform factor into a bounding box) |
//! | **Derivatives** | one decode, Lanczos3 resize per size, encode by extension |
//! | **Thumbnail** | upload bytes fitted into a fixed 100×100 box |
//!
//! The module is split into:
//! - **Calculations**: Pure functions for dimension math (unit testable)
//! - **Parameters**: Data structures describing image operations
//! - **Backend**: [`ImageBackend`] trait + [`RustBackend`]
//! - **Operations**: High-level functions combining calculations + backend

pub mod backend;
mod calculations;
pub mod operations;
mod params;
pub mod rust_backend;

pub use backend::{BackendError, Dimensions, ImageBackend};
pub use calculations::{ZeroDimension, fit_dimensions, fit_scale, scaled_dimensions};
pub use operations::{
    DerivativeConfig, DerivativeFile, DerivativeNaming, THUMBNAIL_BOUNDS, THUMBNAIL_MAP_KEY,
    ThumbnailConfig, ThumbnailFile, create_thumbnail, fit_into_square, generate_derivatives,
    get_dimensions,
};
pub use params::{ImageSource, ResizeParams, ResizeTarget, SizeSpec};
pub use rust_backend::RustBackend;

//! Pure calculation functions for image dimensions.
//!
//! All functions here are pure and testable without any I/O or images.

use thiserror::Error;

/// A scale was requested for an image or box with a zero-length side.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("zero dimension: source {src_width}x{src_height}, box {box_width}x{box_height}")]
pub struct ZeroDimension {
    pub src_width: u32,
    pub src_height: u32,
    pub box_width: u32,
    pub box_height: u32,
}

/// Calculate the uniform scale factor that fits a source into a bounding box.
///
/// The longer source side is matched to its box side first. If the other side
/// would then overflow its box, the factor is tightened to that side instead.
/// The result keeps the aspect ratio, fits entirely inside the box, and touches
/// at least one box edge.
///
/// Arguments are ordered height first, as the box presets are.
///
/// # Examples
/// ```
/// # use catalog_images::imaging::fit_scale;
/// // 800x600 landscape into a 100x100 box → width bound, factor 0.125
/// assert_eq!(fit_scale(600, 800, 100, 100).unwrap(), 0.125);
/// ```
pub fn fit_scale(
    src_height: u32,
    src_width: u32,
    box_height: u32,
    box_width: u32,
) -> Result<f64, ZeroDimension> {
    if src_height == 0 || src_width == 0 || box_height == 0 || box_width == 0 {
        return Err(ZeroDimension {
            src_width,
            src_height,
            box_width,
            box_height,
        });
    }

    let (src_h, src_w) = (src_height as f64, src_width as f64);
    let (box_h, box_w) = (box_height as f64, box_width as f64);

    let scale = if src_h > src_w {
        // Portrait: height is the first constraint
        let scale = box_h / src_h;
        if src_w * scale > box_w {
            box_w / src_w
        } else {
            scale
        }
    } else {
        // Landscape or square: width is the first constraint
        let scale = box_w / src_w;
        if src_h * scale > box_h {
            box_h / src_h
        } else {
            scale
        }
    };

    Ok(scale)
}

/// Output dimensions `(width, height)` for a source scaled by `scale`.
///
/// Each side is rounded to the nearest pixel and never drops below 1, so a
/// very thin source still produces a drawable raster.
pub fn scaled_dimensions(source: (u32, u32), scale: f64) -> (u32, u32) {
    let (w, h) = source;
    let out_w = (w as f64 * scale).round().max(1.0) as u32;
    let out_h = (h as f64 * scale).round().max(1.0) as u32;
    (out_w, out_h)
}

/// Fit a source into a box in one step: `(width, height)` of the result.
pub fn fit_dimensions(source: (u32, u32), bounds: (u32, u32)) -> Result<(u32, u32), ZeroDimension> {
    let (src_w, src_h) = source;
    let (box_w, box_h) = bounds;
    let scale = fit_scale(src_h, src_w, box_h, box_w)?;
    Ok(scaled_dimensions(source, scale))
}

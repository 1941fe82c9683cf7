//! Output dimension selection.
//!
//! The Wan2.2 model only behaves well at a fixed catalog of sizes, and
//! every dimension fed to it must be a multiple of 8. Auto selection
//! scores each catalog entry against the input image by aspect ratio
//! (weighted double) plus relative pixel-count distance and takes the
//! minimum; the scoring is deterministic, so a given input size always
//! maps to the same pair.

use crate::settings::Resolution;

/// Dimensions the model is known to work well at. All multiples of 8.
pub const SUPPORTED_DIMENSIONS: &[(u32, u32)] = &[
    (512, 512),
    (640, 640),
    (768, 768),
    (1024, 1024),
    (512, 768),
    (768, 512),
    (640, 960),
    (960, 640),
    (1024, 768),
    (768, 1024),
];

/// Fallback when auto selection has no input dimensions to work from.
pub const DEFAULT_DIMENSIONS: (u32, u32) = (640, 640);

/// Round a dimension down to the nearest multiple of 8, never below 8.
pub fn snap_to_multiple_of_8(value: u32) -> u32 {
    let snapped = value - value % 8;
    snapped.max(8)
}

/// Pick the catalog entry closest to the input image.
///
/// Score per candidate: `2 * |aspect_in - aspect_cand| + |pixels_in - pixels_cand| / pixels_in`.
/// Aspect ratio is weighted double so a portrait input lands on a
/// portrait candidate even when a square one is closer in area.
pub fn select_auto(input_width: u32, input_height: u32) -> (u32, u32) {
    if input_width == 0 || input_height == 0 {
        return DEFAULT_DIMENSIONS;
    }

    let input_aspect = f64::from(input_width) / f64::from(input_height);
    let input_pixels = f64::from(input_width) * f64::from(input_height);

    let mut best = DEFAULT_DIMENSIONS;
    let mut best_score = f64::INFINITY;

    for &(width, height) in SUPPORTED_DIMENSIONS {
        let aspect = f64::from(width) / f64::from(height);
        let aspect_diff = (aspect - input_aspect).abs();
        let size_diff = (f64::from(width) * f64::from(height) - input_pixels).abs() / input_pixels;
        let score = aspect_diff * 2.0 + size_diff;

        if score < best_score {
            best_score = score;
            best = (width, height);
        }
    }

    best
}

/// Resolve a [`Resolution`] request to concrete dimensions.
///
/// `input_dimensions` are the measured dimensions of the input image,
/// if known; only `Auto` consults them.
pub fn resolve_dimensions(
    resolution: Resolution,
    input_dimensions: Option<(u32, u32)>,
) -> (u32, u32) {
    match resolution {
        Resolution::Auto => match input_dimensions {
            Some((w, h)) => select_auto(w, h),
            None => DEFAULT_DIMENSIONS,
        },
        Resolution::P720 => (640, 640),
        Resolution::P1080 => (1024, 1024),
        Resolution::Exact { width, height } => {
            (snap_to_multiple_of_8(width), snap_to_multiple_of_8(height))
        }
    }
}

//! Color preparation applied to a decoded image before packing.
//!
//! Chroma-subsampled YCbCr is converted to RGB first. An embedded ICC
//! profile then goes to an external color-management transform and is
//! dropped afterwards either way.

use crate::diagnostics::MessageSink;
use crate::error::{EngineError, Result, Stage};
use crate::image::{ColorSpace, ComponentImage, SamplePlane};

/// Color-management collaborator: applies an ICC profile to an image in place.
pub trait IccTransform {
    fn apply(&self, profile: &[u8], image: &mut ComponentImage) -> std::result::Result<(), EngineError>;
}

/// Guesses the color space from the plane layout.
///
/// Three planes where plane 0 is square-subsampled and plane 1 is
/// horizontally subsampled are taken as SYCC. One or two planes are GRAY.
pub fn resolve_color_space(image: &mut ComponentImage) {
    let planes = &image.planes;
    if image.color_space != ColorSpace::Sycc
        && planes.len() == 3
        && planes[0].dx == planes[0].dy
        && planes[1].dx != 1
    {
        image.color_space = ColorSpace::Sycc;
    } else if planes.len() <= 2 {
        image.color_space = ColorSpace::Gray;
    }
}

/// Chroma subsampling ratio of `chroma` relative to `luma`, if it is one of
/// 4:4:4, 4:2:2 or 4:2:0.
fn chroma_ratio(luma: &SamplePlane, chroma: &SamplePlane) -> Option<(u32, u32)> {
    if chroma.dx % luma.dx != 0 || chroma.dy % luma.dy != 0 {
        return None;
    }
    match (chroma.dx / luma.dx, chroma.dy / luma.dy) {
        ratio @ ((1, 1) | (2, 1) | (2, 2)) => Some(ratio),
        _ => None,
    }
}

#[inline]
fn sycc_to_rgb_sample(offset: i64, upb: i64, y: i32, cb: i32, cr: i32) -> (i32, i32, i32) {
    // Widened so full-scale 31-bit samples cannot overflow before the clamp.
    let y = i64::from(y);
    let cb = (i64::from(cb) - offset) as f64;
    let cr = (i64::from(cr) - offset) as f64;
    let r = y + (1.402 * cr) as i64;
    let g = y - (0.344 * cb + 0.714 * cr) as i64;
    let b = y + (1.772 * cb) as i64;
    (
        r.clamp(0, upb) as i32,
        g.clamp(0, upb) as i32,
        b.clamp(0, upb) as i32,
    )
}

/// Converts a three-plane SYCC image to SRGB at the luma plane's resolution.
///
/// Returns `false` and leaves the image untouched when the chroma layout is
/// not one of the supported ratios.
pub fn sycc_to_rgb(image: &mut ComponentImage, sink: &mut dyn MessageSink) -> bool {
    if image.planes.len() < 3 {
        sink.warning("sycc_to_rgb: fewer than three components");
        return false;
    }
    if let Some(Err(e)) = image.planes[..3]
        .iter()
        .map(|plane| plane.validate(Stage::Pack))
        .find(|result| result.is_err())
    {
        sink.warning(&format!("sycc_to_rgb: {}", e));
        return false;
    }
    let (luma, cb_plane, cr_plane) = (&image.planes[0], &image.planes[1], &image.planes[2]);
    let ratio = chroma_ratio(luma, cb_plane).filter(|_| cb_plane.same_geometry(cr_plane));
    let Some((rx, ry)) = ratio else {
        sink.warning(&format!(
            "sycc_to_rgb: invalid sub-sampling: dx=({}, {}, {}) dy=({}, {}, {})",
            luma.dx, cb_plane.dx, cr_plane.dx, luma.dy, cb_plane.dy, cr_plane.dy
        ));
        return false;
    };
    if cb_plane.width == 0 || cb_plane.height == 0 {
        sink.warning("sycc_to_rgb: empty chroma component");
        return false;
    }

    let offset = 1i64 << (luma.precision - 1);
    let upb = (1i64 << luma.precision) - 1;
    let (width, height) = (luma.width as usize, luma.height as usize);
    let chroma_width = cb_plane.width as usize;
    let chroma_height = cb_plane.height as usize;

    let mut red = Vec::with_capacity(width * height);
    let mut green = Vec::with_capacity(width * height);
    let mut blue = Vec::with_capacity(width * height);
    for row in 0..height {
        let chroma_row = (row / ry as usize).min(chroma_height - 1) * chroma_width;
        for col in 0..width {
            let c = chroma_row + (col / rx as usize).min(chroma_width - 1);
            let (r, g, b) = sycc_to_rgb_sample(
                offset,
                upb,
                luma.samples[row * width + col],
                cb_plane.samples[c],
                cr_plane.samples[c],
            );
            red.push(r);
            green.push(g);
            blue.push(b);
        }
    }

    let template = SamplePlane {
        samples: Vec::new(),
        ..luma.clone()
    };
    image.planes[0] = SamplePlane {
        samples: red,
        ..template.clone()
    };
    image.planes[1] = SamplePlane {
        samples: green,
        ..template.clone()
    };
    image.planes[2] = SamplePlane {
        samples: blue,
        ..template
    };
    image.color_space = ColorSpace::Srgb;
    true
}

/// Brings a decoded image into a packable color space, consuming its ICC profile.
pub fn prepare_for_display(
    image: &mut ComponentImage,
    icc: Option<&dyn IccTransform>,
    sink: &mut dyn MessageSink,
) -> Result<()> {
    for plane in &image.planes {
        plane.validate(Stage::Pack)?;
    }

    resolve_color_space(image);
    if image.color_space == ColorSpace::Sycc && sycc_to_rgb(image, sink) {
        tracing::debug!("converted SYCC image to SRGB");
    }

    if let Some(profile) = image.icc_profile.take() {
        match icc {
            Some(transform) => {
                if let Err(e) = transform.apply(&profile, image) {
                    tracing::warn!("ICC transform failed: {}", e);
                    sink.warning(&format!("ICC profile not applied: {}", e));
                }
            }
            None => sink.info("ICC profile ignored: no color transform installed"),
        }
    }
    Ok(())
}

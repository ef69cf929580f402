//! Host pixel buffers to sample planes for the encoder.

use crate::error::{BridgeError, Result, Stage};
use crate::image::{ColorSpace, ComponentImage, Geometry, PackedBuffer, PixelLayout, SamplePlane, try_allocate};

/// Deepest packed pixel accepted: three 8-bit channels.
pub const MAXIMUM_DEPTH: u32 = 24;

/// Layout a buffer of the given total bit depth must use.
pub fn layout_for_depth(depth: u32) -> PixelLayout {
    match depth {
        0..=8 => PixelLayout::Indexed8,
        9..=16 => PixelLayout::Gray16,
        _ => PixelLayout::Argb32,
    }
}

fn check_geometry(packed: &PackedBuffer, geometry: &Geometry) -> Result<usize> {
    let Geometry {
        width,
        height,
        depth,
        dx,
        dy,
        ..
    } = *geometry;
    if width == 0 || height == 0 || depth == 0 {
        return Err(BridgeError::geometry(
            Stage::Unpack,
            format!("width({}) height({}) depth({})", width, height, depth),
        ));
    }
    if depth > MAXIMUM_DEPTH {
        return Err(BridgeError::geometry(
            Stage::Unpack,
            format!("depth {} exceeds {}", depth, MAXIMUM_DEPTH),
        ));
    }
    if dx == 0 || dy == 0 {
        return Err(BridgeError::geometry(
            Stage::Unpack,
            format!("subsampling {}x{} must be non-zero", dx, dy),
        ));
    }

    let expected = layout_for_depth(depth);
    if packed.layout() != expected {
        return Err(BridgeError::geometry(
            Stage::Unpack,
            format!(
                "depth {} needs a {:?} buffer, got {:?}",
                depth,
                expected,
                packed.layout()
            ),
        ));
    }

    let count = (width as usize)
        .checked_mul(height as usize)
        .ok_or_else(|| BridgeError::geometry(Stage::Unpack, "pixel count overflows"))?;
    if packed.len() != count {
        return Err(BridgeError::geometry(
            Stage::Unpack,
            format!(
                "{}x{} image needs {} pixels, buffer holds {}",
                width,
                height,
                count,
                packed.len()
            ),
        ));
    }
    Ok(count)
}

/// Splits a packed host buffer into planes ready for encoding.
///
/// Depth up to 16 gives one GRAY plane with `precision = depth`. Deeper
/// buffers are `0x00RRGGBB` words split into three SRGB planes with
/// `precision = depth / 3`. Samples are copied unmodified and nothing is read
/// before the geometry has been checked against the buffer.
pub fn unpack(packed: &PackedBuffer, geometry: &Geometry) -> Result<ComponentImage> {
    let count = check_geometry(packed, geometry)?;

    let plane = |precision: u32, samples: Vec<i32>| SamplePlane {
        width: geometry.width,
        height: geometry.height,
        precision: precision as u8,
        signed: false,
        dx: geometry.dx,
        dy: geometry.dy,
        samples,
    };

    let (color_space, planes) = match packed {
        PackedBuffer::Indexed8(pixels) => {
            let mut gray = try_allocate(count, Stage::Unpack)?;
            gray.extend(pixels.iter().map(|&v| i32::from(v)));
            (ColorSpace::Gray, vec![plane(geometry.depth, gray)])
        }
        PackedBuffer::Gray16(pixels) => {
            let mut gray = try_allocate(count, Stage::Unpack)?;
            gray.extend(pixels.iter().map(|&v| i32::from(v)));
            (ColorSpace::Gray, vec![plane(geometry.depth, gray)])
        }
        PackedBuffer::Argb32(pixels) => {
            let mut red = try_allocate(count, Stage::Unpack)?;
            let mut green = try_allocate(count, Stage::Unpack)?;
            let mut blue = try_allocate(count, Stage::Unpack)?;
            for &v in pixels {
                red.push(((v >> 16) & 0xFF) as i32);
                green.push(((v >> 8) & 0xFF) as i32);
                blue.push((v & 0xFF) as i32);
            }
            let precision = geometry.depth / 3;
            (
                ColorSpace::Srgb,
                vec![
                    plane(precision, red),
                    plane(precision, green),
                    plane(precision, blue),
                ],
            )
        }
    };

    let x1 = reference_edge(geometry.x0, geometry.width, geometry.dx)?;
    let y1 = reference_edge(geometry.y0, geometry.height, geometry.dy)?;
    tracing::debug!(
        components = planes.len(),
        depth = geometry.depth,
        x1,
        y1,
        "unpacked host buffer"
    );
    Ok(ComponentImage {
        x0: geometry.x0,
        y0: geometry.y0,
        x1,
        y1,
        color_space,
        planes,
        icc_profile: None,
    })
}

/// Exclusive reference-grid edge of `size` samples spaced `step` apart.
fn reference_edge(origin: u32, size: u32, step: u32) -> Result<u32> {
    (size - 1)
        .checked_mul(step)
        .and_then(|span| span.checked_add(1))
        .and_then(|span| span.checked_add(origin))
        .ok_or_else(|| {
            BridgeError::geometry(
                Stage::Unpack,
                format!("image area {}+{}x{} leaves the reference grid", origin, size, step),
            )
        })
}

//! Decoded sample planes to host pixel layouts.
//!
//! Layout is chosen from the plane count and geometry:
//!
//! | planes | requirement | layout |
//! |---|---|---|
//! | 3 or 4 | same geometry and precision | `Argb32`, alpha 0xFF without a 4th plane |
//! | 2 | same geometry and precision | `Argb32` gray + alpha |
//! | 1 | precision <= 8 | `Indexed8` |
//! | 1 | precision > 8 | `Gray16`, left-justified |
//!
//! Anything else packs only the first plane and reports why.

use std::fmt::Write as _;

use crate::diagnostics::MessageSink;
use crate::error::{BridgeError, Result, Stage};
use crate::image::{ColorDescriptor, PackedBuffer, PackedImage, SamplePlane, try_allocate};

const OPAQUE: u32 = 0xFF;

/// Re-centers a sample and scales it down to `target_bits`, rounding to
/// nearest, then clamps it into the target range.
pub fn normalize(value: i32, bias: i32, precision: u8, target_bits: u8) -> u32 {
    let mut v = i64::from(value) + i64::from(bias);
    if precision > target_bits {
        let shift = precision - target_bits;
        v = (v >> shift) + ((v >> (shift - 1)) % 2);
    }
    v.clamp(0, (1i64 << target_bits) - 1) as u32
}

/// Widens a sample of 9 to 15 bits to 16 bits by replicating its top bits
/// into the low end, so full scale maps to `0xFFFF`.
pub fn left_justify16(value: i32, bias: i32, precision: u8) -> u16 {
    let v = i64::from(value) + i64::from(bias);
    let v = if precision < 16 {
        let up = 16 - precision;
        (v << up) + (v >> (precision - up))
    } else {
        v
    };
    v.clamp(0, i64::from(u16::MAX)) as u16
}

fn shares_layout(planes: &[SamplePlane]) -> bool {
    let first = &planes[0];
    planes[1..]
        .iter()
        .all(|p| p.same_geometry(first) && p.precision == first.precision)
}

/// Packs `planes` into one of the host layouts. The planes are not modified.
pub fn pack(
    planes: &[SamplePlane],
    color: &ColorDescriptor,
    sink: &mut dyn MessageSink,
) -> Result<PackedImage> {
    let Some(first) = planes.first() else {
        return Err(BridgeError::geometry(Stage::Pack, "image has no components"));
    };
    for plane in planes {
        plane.validate(Stage::Pack)?;
    }

    let buffer = match planes.len() {
        2..=4 if shares_layout(planes) => pack_argb(planes)?,
        1 => pack_single(first)?,
        _ => {
            let text = describe_unsupported(planes, color);
            tracing::warn!("{}", text);
            sink.warning(&text);
            pack_single(first)?
        }
    };

    tracing::debug!(
        width = first.width,
        height = first.height,
        layout = ?buffer.layout(),
        color_space = color.space.name(),
        "packed image"
    );
    Ok(PackedImage {
        width: first.width,
        height: first.height,
        buffer,
    })
}

fn pack_single(plane: &SamplePlane) -> Result<PackedBuffer> {
    let bias = plane.bias();
    let precision = plane.precision;
    if precision <= 8 {
        let mut pixels = try_allocate(plane.pixel_count(), Stage::Pack)?;
        pixels.extend(
            plane
                .samples
                .iter()
                .map(|&v| normalize(v, bias, precision, 8) as u8),
        );
        Ok(PackedBuffer::Indexed8(pixels))
    } else {
        let mut pixels = try_allocate(plane.pixel_count(), Stage::Pack)?;
        if precision <= 16 {
            pixels.extend(
                plane
                    .samples
                    .iter()
                    .map(|&v| left_justify16(v, bias, precision)),
            );
        } else {
            pixels.extend(
                plane
                    .samples
                    .iter()
                    .map(|&v| normalize(v, bias, precision, 16) as u16),
            );
        }
        Ok(PackedBuffer::Gray16(pixels))
    }
}

fn pack_argb(planes: &[SamplePlane]) -> Result<PackedBuffer> {
    let count = planes[0].pixel_count();
    let channel = |plane: &SamplePlane, i: usize| {
        normalize(plane.samples[i], plane.bias(), plane.precision, 8)
    };

    let (red, green, blue, alpha) = match planes {
        [gray, alpha] => (gray, gray, gray, Some(alpha)),
        [r, g, b] => (r, g, b, None),
        [r, g, b, a, ..] => (r, g, b, Some(a)),
        _ => {
            return Err(BridgeError::geometry(
                Stage::Pack,
                format!("{} components cannot form ARGB pixels", planes.len()),
            ));
        }
    };

    let mut pixels = try_allocate(count, Stage::Pack)?;
    for i in 0..count {
        let a = alpha.map_or(OPAQUE, |plane| channel(plane, i));
        let (r, g, b) = (channel(red, i), channel(green, i), channel(blue, i));
        pixels.push((a << 24) | (r << 16) | (g << 8) | b);
    }
    Ok(PackedBuffer::Argb32(pixels))
}

fn describe_unsupported(planes: &[SamplePlane], color: &ColorDescriptor) -> String {
    let mut text = format!(
        "Can show only first component of image: {} components, color space {}",
        planes.len(),
        color.space.name()
    );
    for (i, p) in planes.iter().enumerate() {
        let _ = write!(
            text,
            "\n  component {}: dx={} dy={} w={} h={} prec={} {}",
            i,
            p.dx,
            p.dy,
            p.width,
            p.height,
            p.precision,
            if p.signed { "signed" } else { "unsigned" }
        );
    }
    text
}

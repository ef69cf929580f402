//! Sample planes as the codec sees them, and packed buffers as the host sees them.

use crate::error::{BridgeError, Result, Stage};

/// Allocates an empty vector with room for exactly `count` elements,
/// reporting allocation failure instead of aborting.
pub(crate) fn try_allocate<T>(count: usize, stage: Stage) -> Result<Vec<T>> {
    let mut buffer = Vec::new();
    buffer
        .try_reserve_exact(count)
        .map_err(|_| BridgeError::ResourceAllocation {
            stage,
            bytes: count.saturating_mul(std::mem::size_of::<T>()),
        })?;
    Ok(buffer)
}

/// Highest sample precision a codec engine may report.
pub const MAXIMUM_PRECISION: u8 = 31;

/// One image component on the codec side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SamplePlane {
    /// Width of the component in samples (after subsampling).
    pub width: u32,
    /// Height of the component in samples (after subsampling).
    pub height: u32,
    /// Significant bits per sample.
    pub precision: u8,
    pub signed: bool,
    /// Horizontal subsampling factor relative to the reference grid.
    pub dx: u32,
    /// Vertical subsampling factor relative to the reference grid.
    pub dy: u32,
    /// Row-major samples, `width * height` of them.
    pub samples: Vec<i32>,
}

impl SamplePlane {
    pub fn new(
        width: u32,
        height: u32,
        precision: u8,
        signed: bool,
        samples: Vec<i32>,
    ) -> Result<Self> {
        let plane = Self {
            width,
            height,
            precision,
            signed,
            dx: 1,
            dy: 1,
            samples,
        };
        plane.validate(Stage::Decode)?;
        Ok(plane)
    }

    pub fn with_subsampling(mut self, dx: u32, dy: u32) -> Self {
        self.dx = dx;
        self.dy = dy;
        self
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Checks the sample count and precision, tagging failures with `stage`.
    pub fn validate(&self, stage: Stage) -> Result<()> {
        if self.precision == 0 || self.precision > MAXIMUM_PRECISION {
            return Err(BridgeError::geometry(
                stage,
                format!("precision {} outside 1..={}", self.precision, MAXIMUM_PRECISION),
            ));
        }
        if self.dx == 0 || self.dy == 0 {
            return Err(BridgeError::geometry(
                stage,
                format!("subsampling {}x{} must be non-zero", self.dx, self.dy),
            ));
        }
        if self.samples.len() != self.pixel_count() {
            return Err(BridgeError::geometry(
                stage,
                format!(
                    "{}x{} plane holds {} samples",
                    self.width,
                    self.height,
                    self.samples.len()
                ),
            ));
        }
        Ok(())
    }

    /// Same subsampling and the same sample grid size.
    pub fn same_geometry(&self, other: &SamplePlane) -> bool {
        self.dx == other.dx
            && self.dy == other.dy
            && self.width == other.width
            && self.height == other.height
    }

    /// Offset added to signed samples to move them into an unsigned range.
    pub fn bias(&self) -> i32 {
        if self.signed {
            1 << (self.precision - 1)
        } else {
            0
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColorSpace {
    #[default]
    Unknown,
    Gray,
    Srgb,
    Sycc,
}

impl ColorSpace {
    pub fn name(self) -> &'static str {
        match self {
            ColorSpace::Unknown => "UNKNOWN",
            ColorSpace::Gray => "GRAY",
            ColorSpace::Srgb => "SRGB",
            ColorSpace::Sycc => "SYCC",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ColorDescriptor {
    pub space: ColorSpace,
    pub has_icc_profile: bool,
}

/// A decoded (or about to be encoded) multi-component image.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ComponentImage {
    /// Horizontal offset of the image area on the reference grid.
    pub x0: u32,
    /// Vertical offset of the image area on the reference grid.
    pub y0: u32,
    /// Exclusive right edge of the image area on the reference grid.
    pub x1: u32,
    /// Exclusive bottom edge of the image area on the reference grid.
    pub y1: u32,
    pub color_space: ColorSpace,
    pub planes: Vec<SamplePlane>,
    /// Embedded ICC profile, if the container carried one.
    pub icc_profile: Option<Vec<u8>>,
}

impl ComponentImage {
    pub fn color_descriptor(&self) -> ColorDescriptor {
        ColorDescriptor {
            space: self.color_space,
            has_icc_profile: self.icc_profile.is_some(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelLayout {
    /// One byte per pixel, single intensity.
    Indexed8,
    /// One 16-bit word per pixel, single intensity, left-justified.
    Gray16,
    /// One 32-bit word per pixel, `A:R:G:B`.
    Argb32,
}

impl PixelLayout {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelLayout::Indexed8 => 1,
            PixelLayout::Gray16 => 2,
            PixelLayout::Argb32 => 4,
        }
    }
}

/// Flat host-visible pixel storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackedBuffer {
    Indexed8(Vec<u8>),
    Gray16(Vec<u16>),
    Argb32(Vec<u32>),
}

impl PackedBuffer {
    pub fn layout(&self) -> PixelLayout {
        match self {
            PackedBuffer::Indexed8(_) => PixelLayout::Indexed8,
            PackedBuffer::Gray16(_) => PixelLayout::Gray16,
            PackedBuffer::Argb32(_) => PixelLayout::Argb32,
        }
    }

    /// Number of pixels (elements) in the buffer.
    pub fn len(&self) -> usize {
        match self {
            PackedBuffer::Indexed8(pixels) => pixels.len(),
            PackedBuffer::Gray16(pixels) => pixels.len(),
            PackedBuffer::Argb32(pixels) => pixels.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackedImage {
    pub width: u32,
    pub height: u32,
    pub buffer: PackedBuffer,
}

/// Host-declared shape of a packed buffer handed in for encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    pub width: u32,
    pub height: u32,
    /// Total bits per pixel: up to 16 for gray, 24 for packed RGB.
    pub depth: u32,
    pub dx: u32,
    pub dy: u32,
    pub x0: u32,
    pub y0: u32,
}

impl Geometry {
    pub fn new(width: u32, height: u32, depth: u32) -> Self {
        Self {
            width,
            height,
            depth,
            dx: 1,
            dy: 1,
            x0: 0,
            y0: 0,
        }
    }
}

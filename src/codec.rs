//! The codec engine contract and its parameter sets.
//!
//! The bridge never decodes or encodes JPEG 2000 itself. A [`CodecEngine`]
//! implementation does, driven call by call by the session types in
//! [`crate::session`]. Engines report failure with [`EngineError`]; the
//! session tags it with the stage it happened in.

use crate::diagnostics::MessageSink;
use crate::error::{BridgeError, EngineError, Result, Stage};
use crate::format::FormatCode;
use crate::image::ComponentImage;
use crate::stream::{ByteStream, WriteStream};

pub type EngineResult<T> = std::result::Result<T, EngineError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Decompress,
    Compress,
}

/// Region of the reference grid to decode, `x1`/`y1` exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeArea {
    pub x0: u32,
    pub y0: u32,
    pub x1: u32,
    pub y1: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecoderParameters {
    /// Number of highest resolution levels to discard.
    pub reduce: u32,
    /// Maximum number of quality layers to decode; 0 decodes all of them.
    pub layers: u32,
    /// Decode only this area. Ignored when `tile_index` is set.
    pub decode_area: Option<DecodeArea>,
    /// Decode a single tile instead of the whole image.
    pub tile_index: Option<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EncoderParameters {
    /// Output format, J2K or JP2.
    pub format: FormatCode,
    /// Number of resolution levels.
    pub resolutions: u32,
    /// Compression ratio per quality layer. Empty means one lossless layer.
    pub rates: Vec<f32>,
    /// Text for the COM marker. `None` writes the bridge's own banner.
    pub comment: Option<String>,
    /// Multi-component transform. `None` enables it for three components.
    pub mct: Option<bool>,
    /// Size of the output region in bytes. `None` picks one from the image.
    pub output_capacity: Option<usize>,
}

impl Default for EncoderParameters {
    fn default() -> Self {
        Self {
            format: FormatCode::J2k,
            resolutions: 6,
            rates: Vec::new(),
            comment: None,
            mct: None,
            output_capacity: None,
        }
    }
}

/// Encoder parameters resolved against a concrete image.
#[derive(Debug, Clone, PartialEq)]
pub struct EncoderSettings {
    pub format: FormatCode,
    pub resolutions: u32,
    /// Never empty; a single `0.0` means lossless.
    pub rates: Vec<f32>,
    pub comment: String,
    pub mct: bool,
}

impl EncoderSettings {
    pub fn is_lossless(&self) -> bool {
        self.rates == [0.0]
    }
}

pub fn default_comment() -> String {
    format!("Created by jp2bridge-rs version {}", env!("CARGO_PKG_VERSION"))
}

/// Slack added to the estimated output size for markers and headers.
const OUTPUT_SLACK: usize = 4096;

impl EncoderParameters {
    pub fn resolve(&self, image: &ComponentImage) -> Result<EncoderSettings> {
        if !matches!(self.format, FormatCode::J2k | FormatCode::Jp2) {
            return Err(BridgeError::UnsupportedFormat);
        }
        if self.resolutions == 0 {
            return Err(BridgeError::Codec {
                stage: Stage::Configure,
                message: "at least one resolution level is required".to_owned(),
            });
        }
        let rates = if self.rates.is_empty() {
            vec![0.0]
        } else {
            self.rates.clone()
        };
        Ok(EncoderSettings {
            format: self.format,
            resolutions: self.resolutions,
            rates,
            comment: self.comment.clone().unwrap_or_else(default_comment),
            mct: self.mct.unwrap_or(image.planes.len() == 3),
        })
    }

    /// Output region size: the requested capacity, or twice the raw sample
    /// size plus header slack.
    pub fn output_capacity_for(&self, image: &ComponentImage) -> usize {
        self.output_capacity.unwrap_or_else(|| {
            let raw = image.planes.iter().fold(0usize, |total, plane| {
                let bytes = usize::from(plane.precision).div_ceil(8);
                total.saturating_add(plane.pixel_count().saturating_mul(bytes))
            });
            raw.saturating_mul(2).saturating_add(OUTPUT_SLACK)
        })
    }
}

/// A JPEG 2000 codec driven through explicit calls.
///
/// Each call receives the sink diagnostics should go to. Decoding runs
/// `open`, `configure_decoder`, `read_header`, then `set_decode_area` +
/// `decode` or `decode_tile`, then `end_decompress`. Encoding runs `open`,
/// `configure_encoder`, `start_compress`, `encode`, `end_compress`. `close`
/// is called exactly once per opened handle, whatever happened before it.
pub trait CodecEngine {
    type Handle;

    fn open(&mut self, format: FormatCode, direction: Direction) -> EngineResult<Self::Handle>;

    fn configure_decoder(
        &mut self,
        handle: &mut Self::Handle,
        params: &DecoderParameters,
        sink: &mut dyn MessageSink,
    ) -> EngineResult<()>;

    fn configure_encoder(
        &mut self,
        handle: &mut Self::Handle,
        settings: &EncoderSettings,
        image: &ComponentImage,
        sink: &mut dyn MessageSink,
    ) -> EngineResult<()>;

    /// Reads the main header and returns the image description with empty
    /// sample planes.
    fn read_header(
        &mut self,
        handle: &mut Self::Handle,
        stream: &mut dyn ByteStream,
        sink: &mut dyn MessageSink,
    ) -> EngineResult<ComponentImage>;

    fn set_decode_area(
        &mut self,
        handle: &mut Self::Handle,
        image: &mut ComponentImage,
        area: DecodeArea,
        sink: &mut dyn MessageSink,
    ) -> EngineResult<()>;

    fn decode(
        &mut self,
        handle: &mut Self::Handle,
        stream: &mut dyn ByteStream,
        image: &mut ComponentImage,
        sink: &mut dyn MessageSink,
    ) -> EngineResult<()>;

    fn decode_tile(
        &mut self,
        handle: &mut Self::Handle,
        stream: &mut dyn ByteStream,
        image: &mut ComponentImage,
        tile_index: u32,
        sink: &mut dyn MessageSink,
    ) -> EngineResult<()>;

    fn end_decompress(
        &mut self,
        handle: &mut Self::Handle,
        stream: &mut dyn ByteStream,
        sink: &mut dyn MessageSink,
    ) -> EngineResult<()>;

    fn start_compress(
        &mut self,
        handle: &mut Self::Handle,
        image: &ComponentImage,
        stream: &mut dyn WriteStream,
        sink: &mut dyn MessageSink,
    ) -> EngineResult<()>;

    fn encode(
        &mut self,
        handle: &mut Self::Handle,
        stream: &mut dyn WriteStream,
        sink: &mut dyn MessageSink,
    ) -> EngineResult<()>;

    fn end_compress(
        &mut self,
        handle: &mut Self::Handle,
        stream: &mut dyn WriteStream,
        sink: &mut dyn MessageSink,
    ) -> EngineResult<()>;

    fn close(&mut self, handle: Self::Handle);
}

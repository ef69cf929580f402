//! Memory-to-memory bridge between host pixel buffers and a JPEG 2000 codec.
//!
//! The crate does no wavelet or entropy coding itself. It classifies
//! compressed buffers ([`format`]), exposes them to a codec engine as
//! bounded in-memory streams ([`stream`]), drives the engine stage by stage
//! ([`session`]), and converts between the engine's sample planes and three
//! flat host layouts ([`pack`], [`unpack`]).
//!
//! ```no_run
//! use jp2bridge_rs::{detect_format, FormatCode};
//!
//! let head = [0x00, 0x00, 0x00, 0x0C, 0x6A, 0x50, 0x20, 0x20, 0x0D, 0x0A, 0x87, 0x0A];
//! assert_eq!(detect_format(&head), Ok(FormatCode::Jp2));
//! ```

pub mod codec;
pub mod color;
pub mod cursor;
pub mod diagnostics;
pub mod error;
pub mod format;
pub mod image;
pub mod pack;
pub mod session;
pub mod stream;
pub mod unpack;

pub use codec::{CodecEngine, DecodeArea, DecoderParameters, Direction, EncoderParameters, EncoderSettings};
pub use color::IccTransform;
pub use cursor::BufferCursor;
pub use diagnostics::{Message, MessageSink, NullSink, Severity, TracingSink};
pub use error::{BridgeError, EngineError, Result, Stage};
pub use format::{FormatCode, detect_format, detect_format_with_path, format_from_extension};
pub use image::{
    ColorDescriptor, ColorSpace, ComponentImage, Geometry, PackedBuffer, PackedImage, PixelLayout,
    SamplePlane,
};
pub use pack::pack;
pub use session::{DecodeSession, EncodeSession, SessionState, decode_to_packed, encode_from_packed};
pub use stream::{ByteStream, MemoryStream, ReadStatus, WriteStream};
pub use unpack::unpack;

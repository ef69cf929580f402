//! Stage-by-stage drivers around a [`CodecEngine`].
//!
//! A session owns one engine handle and one memory stream for the duration
//! of a single decode or encode. The handle sits in a guard that closes it
//! exactly once: explicitly on success or failure, or on drop when the
//! session is abandoned part way. Any failure moves the session to
//! [`SessionState::Failed`] and every later call is refused.

use std::mem;
use std::path::Path;

use crate::codec::{CodecEngine, DecoderParameters, Direction, EncoderParameters, EncoderSettings, EngineResult};
use crate::color::{IccTransform, prepare_for_display};
use crate::diagnostics::MessageSink;
use crate::error::{BridgeError, EngineError, Result, Stage};
use crate::format::{FormatCode, detect_format_with_path};
use crate::image::{ComponentImage, Geometry, MAXIMUM_PRECISION, PackedBuffer, PackedImage, try_allocate};
use crate::pack::pack;
use crate::stream::MemoryStream;
use crate::unpack::unpack;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Created,
    Configured,
    HeaderRead,
    Decoding,
    Encoding,
    Finished,
    Failed,
}

fn codec_error(stage: Stage, err: EngineError) -> BridgeError {
    BridgeError::Codec {
        stage,
        message: err.message,
    }
}

/// An open engine handle, closed exactly once.
struct HandleGuard<'a, E: CodecEngine> {
    engine: &'a mut E,
    handle: Option<E::Handle>,
}

impl<'a, E: CodecEngine> HandleGuard<'a, E> {
    fn open(engine: &'a mut E, format: FormatCode, direction: Direction) -> Result<Self> {
        let handle = engine
            .open(format, direction)
            .map_err(|e| codec_error(Stage::Configure, e))?;
        tracing::debug!(%format, ?direction, "opened codec handle");
        Ok(Self {
            engine,
            handle: Some(handle),
        })
    }

    fn parts(&mut self, stage: Stage) -> Result<(&mut E, &mut E::Handle)> {
        match self.handle.as_mut() {
            Some(handle) => Ok((&mut *self.engine, handle)),
            None => Err(BridgeError::Codec {
                stage,
                message: "codec handle already closed".to_owned(),
            }),
        }
    }

    fn close(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.engine.close(handle);
            tracing::debug!("closed codec handle");
        }
    }
}

impl<E: CodecEngine> Drop for HandleGuard<'_, E> {
    fn drop(&mut self) {
        self.close();
    }
}

/// Checks the parts of a header the packer relies on.
fn validate_header(image: &ComponentImage) -> Result<()> {
    if image.planes.is_empty() {
        return Err(BridgeError::geometry(Stage::Header, "header declares no components"));
    }
    for (i, plane) in image.planes.iter().enumerate() {
        if plane.precision == 0 || plane.precision > MAXIMUM_PRECISION {
            return Err(BridgeError::geometry(
                Stage::Header,
                format!("component {} has precision {}", i, plane.precision),
            ));
        }
        if plane.dx == 0 || plane.dy == 0 {
            return Err(BridgeError::geometry(
                Stage::Header,
                format!("component {} has subsampling {}x{}", i, plane.dx, plane.dy),
            ));
        }
    }
    Ok(())
}

pub struct DecodeSession<'a, E: CodecEngine> {
    // Declared before `stream` so the handle is closed before the stream goes.
    guard: HandleGuard<'a, E>,
    stream: MemoryStream<&'a [u8]>,
    sink: &'a mut dyn MessageSink,
    state: SessionState,
    format: FormatCode,
    params: DecoderParameters,
    image: ComponentImage,
}

impl<'a, E: CodecEngine> DecodeSession<'a, E> {
    pub fn open(
        engine: &'a mut E,
        format: FormatCode,
        data: &'a [u8],
        sink: &'a mut dyn MessageSink,
    ) -> Result<Self> {
        let guard = HandleGuard::open(engine, format, Direction::Decompress)?;
        Ok(Self {
            guard,
            stream: MemoryStream::reader(data),
            sink,
            state: SessionState::Created,
            format,
            params: DecoderParameters::default(),
            image: ComponentImage::default(),
        })
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn format(&self) -> FormatCode {
        self.format
    }

    /// The image as far as it has been read.
    pub fn image(&self) -> &ComponentImage {
        &self.image
    }

    fn fail(&mut self) {
        self.state = SessionState::Failed;
        self.guard.close();
    }

    fn enter(&mut self, stage: Stage, expected: SessionState) -> Result<()> {
        if self.state == expected {
            return Ok(());
        }
        let err = BridgeError::InvalidState {
            stage,
            state: self.state,
        };
        self.fail();
        Err(err)
    }

    fn settle<T>(&mut self, stage: Stage, result: EngineResult<T>) -> Result<T> {
        result.map_err(|e| {
            tracing::debug!(%stage, "decode failed: {}", e);
            self.fail();
            codec_error(stage, e)
        })
    }

    fn check(&mut self, result: Result<()>) -> Result<()> {
        if result.is_err() {
            self.fail();
        }
        result
    }

    pub fn configure(&mut self, params: &DecoderParameters) -> Result<()> {
        self.enter(Stage::Configure, SessionState::Created)?;
        let (engine, handle) = self.guard.parts(Stage::Configure)?;
        let result = engine.configure_decoder(handle, params, &mut *self.sink);
        self.settle(Stage::Configure, result)?;
        self.params = params.clone();
        self.state = SessionState::Configured;
        Ok(())
    }

    pub fn read_header(&mut self) -> Result<&ComponentImage> {
        self.enter(Stage::Header, SessionState::Configured)?;
        let (engine, handle) = self.guard.parts(Stage::Header)?;
        let result = engine.read_header(handle, &mut self.stream, &mut *self.sink);
        let image = self.settle(Stage::Header, result)?;
        self.check(validate_header(&image))?;
        tracing::debug!(
            components = image.planes.len(),
            x1 = image.x1,
            y1 = image.y1,
            "read header"
        );
        self.image = image;
        self.state = SessionState::HeaderRead;
        Ok(&self.image)
    }

    /// Decodes the whole image, the configured area, or a single tile.
    pub fn decode(&mut self) -> Result<()> {
        self.enter(Stage::Decode, SessionState::HeaderRead)?;
        let (engine, handle) = self.guard.parts(Stage::Decode)?;
        let sink = &mut *self.sink;
        let stream = &mut self.stream;
        let image = &mut self.image;
        let result = match (self.params.tile_index, self.params.decode_area) {
            (Some(tile), _) => engine.decode_tile(handle, stream, image, tile, sink),
            (None, Some(area)) => engine
                .set_decode_area(handle, image, area, sink)
                .and_then(|()| engine.decode(handle, stream, image, sink)),
            (None, None) => engine.decode(handle, stream, image, sink),
        };
        self.settle(Stage::Decode, result)?;

        let planes_ok = self
            .image
            .planes
            .iter()
            .try_for_each(|plane| plane.validate(Stage::Decode));
        self.check(planes_ok)?;
        self.state = SessionState::Decoding;
        Ok(())
    }

    /// Completes decompression, closes the handle and hands over the image.
    pub fn finish(mut self) -> Result<ComponentImage> {
        self.enter(Stage::Finish, SessionState::Decoding)?;
        let (engine, handle) = self.guard.parts(Stage::Finish)?;
        let result = engine.end_decompress(handle, &mut self.stream, &mut *self.sink);
        self.settle(Stage::Finish, result)?;
        self.guard.close();
        self.state = SessionState::Finished;
        Ok(mem::take(&mut self.image))
    }
}

/// Compression into a preallocated output region.
///
/// The engine may skip ahead to reserve a header and seek back to fill it
/// in, anywhere inside the region; only the bytes up to the furthest point
/// reached are returned.
pub struct EncodeSession<'a, E: CodecEngine> {
    guard: HandleGuard<'a, E>,
    stream: MemoryStream<Vec<u8>>,
    sink: &'a mut dyn MessageSink,
    state: SessionState,
    image: ComponentImage,
}

impl<'a, E: CodecEngine> EncodeSession<'a, E> {
    /// Allocates an output region of `capacity` bytes and opens a compressor.
    pub fn open(
        engine: &'a mut E,
        format: FormatCode,
        image: ComponentImage,
        capacity: usize,
        sink: &'a mut dyn MessageSink,
    ) -> Result<Self> {
        let mut region = try_allocate::<u8>(capacity, Stage::Encode)?;
        region.resize(capacity, 0);
        let guard = HandleGuard::open(engine, format, Direction::Compress)?;
        Ok(Self {
            guard,
            stream: MemoryStream::writer(region),
            sink,
            state: SessionState::Created,
            image,
        })
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    fn fail(&mut self) {
        self.state = SessionState::Failed;
        self.guard.close();
    }

    fn enter(&mut self, stage: Stage, expected: SessionState) -> Result<()> {
        if self.state == expected {
            return Ok(());
        }
        let err = BridgeError::InvalidState {
            stage,
            state: self.state,
        };
        self.fail();
        Err(err)
    }

    fn settle<T>(&mut self, stage: Stage, result: EngineResult<T>) -> Result<T> {
        result.map_err(|e| {
            tracing::debug!(%stage, "encode failed: {}", e);
            self.fail();
            codec_error(stage, e)
        })
    }

    pub fn configure(&mut self, settings: &EncoderSettings) -> Result<()> {
        self.enter(Stage::Configure, SessionState::Created)?;
        let (engine, handle) = self.guard.parts(Stage::Configure)?;
        let result = engine.configure_encoder(handle, settings, &self.image, &mut *self.sink);
        self.settle(Stage::Configure, result)?;
        self.state = SessionState::Configured;
        Ok(())
    }

    pub fn encode(&mut self) -> Result<()> {
        self.enter(Stage::Encode, SessionState::Configured)?;
        let (engine, handle) = self.guard.parts(Stage::Encode)?;
        let sink = &mut *self.sink;
        let stream = &mut self.stream;
        let result = engine
            .start_compress(handle, &self.image, stream, sink)
            .and_then(|()| engine.encode(handle, stream, sink));
        self.settle(Stage::Encode, result)?;
        self.state = SessionState::Encoding;
        Ok(())
    }

    /// Flushes the codestream, closes the handle and returns the bytes written.
    pub fn finish(mut self) -> Result<Vec<u8>> {
        self.enter(Stage::Finish, SessionState::Encoding)?;
        let (engine, handle) = self.guard.parts(Stage::Finish)?;
        let result = engine.end_compress(handle, &mut self.stream, &mut *self.sink);
        self.settle(Stage::Finish, result)?;
        self.guard.close();
        self.state = SessionState::Finished;

        let length = self.stream.written().len();
        let mut bytes = self.stream.into_inner();
        bytes.truncate(length);
        tracing::debug!(bytes = length, "encoded codestream");
        Ok(bytes)
    }
}

/// Classifies, decodes, color-prepares and packs a compressed buffer.
///
/// `path` is only used as a format hint. The ICC profile, if any, goes to
/// `icc` and is dropped afterwards.
pub fn decode_to_packed<E: CodecEngine>(
    engine: &mut E,
    data: &[u8],
    path: Option<&Path>,
    params: &DecoderParameters,
    icc: Option<&dyn IccTransform>,
    sink: &mut dyn MessageSink,
) -> Result<PackedImage> {
    let format = detect_format_with_path(data, path, sink)?;
    let mut image = {
        let mut session = DecodeSession::open(engine, format, data, &mut *sink)?;
        session.configure(params)?;
        session.read_header()?;
        session.decode()?;
        session.finish()?
    };
    prepare_for_display(&mut image, icc, sink)?;
    pack(&image.planes, &image.color_descriptor(), sink)
}

/// Unpacks a host buffer and encodes it, returning the compressed bytes.
pub fn encode_from_packed<E: CodecEngine>(
    engine: &mut E,
    packed: &PackedBuffer,
    geometry: &Geometry,
    params: &EncoderParameters,
    sink: &mut dyn MessageSink,
) -> Result<Vec<u8>> {
    let image = unpack(packed, geometry)?;
    let settings = params.resolve(&image)?;
    let capacity = params.output_capacity_for(&image);
    let mut session = EncodeSession::open(engine, settings.format, image, capacity, sink)?;
    session.configure(&settings)?;
    session.encode()?;
    session.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::DecodeArea;
    use crate::diagnostics::Message;
    use crate::image::{ColorSpace, SamplePlane};
    use crate::stream::{ByteStream, ReadStatus, WriteStream};

    const J2K: &[u8] = &[0xFF, 0x4F, 0xFF, 0x51, 0x00, 0x29, 0x00, 0x00];

    /// Engine that plays back a fixed image and records every call.
    #[derive(Default)]
    struct ScriptedEngine {
        fail_at: Option<&'static str>,
        calls: Vec<&'static str>,
        closed: usize,
        header: ComponentImage,
        decoded: Vec<Vec<i32>>,
        output: Vec<u8>,
        // Written in front of `output` once it is complete, like a JP2 box header.
        box_header: Vec<u8>,
        settings: Option<EncoderSettings>,
    }

    impl ScriptedEngine {
        fn gray(width: u32, height: u32, samples: Vec<i32>) -> Self {
            let header = ComponentImage {
                x1: width,
                y1: height,
                planes: vec![SamplePlane {
                    width,
                    height,
                    precision: 8,
                    signed: false,
                    dx: 1,
                    dy: 1,
                    samples: Vec::new(),
                }],
                ..Default::default()
            };
            Self {
                header,
                decoded: vec![samples],
                ..Default::default()
            }
        }

        fn failing_at(mut self, call: &'static str) -> Self {
            self.fail_at = Some(call);
            self
        }

        fn step(&mut self, call: &'static str) -> EngineResult<()> {
            self.calls.push(call);
            if self.fail_at == Some(call) {
                Err(EngineError::new(format!("{} failed", call)))
            } else {
                Ok(())
            }
        }
    }

    impl CodecEngine for ScriptedEngine {
        type Handle = u32;

        fn open(&mut self, _format: FormatCode, _direction: Direction) -> EngineResult<u32> {
            self.step("open").map(|()| 7)
        }

        fn configure_decoder(
            &mut self,
            _handle: &mut u32,
            _params: &DecoderParameters,
            sink: &mut dyn MessageSink,
        ) -> EngineResult<()> {
            sink.info("decoder configured");
            self.step("configure_decoder")
        }

        fn configure_encoder(
            &mut self,
            _handle: &mut u32,
            settings: &EncoderSettings,
            _image: &ComponentImage,
            _sink: &mut dyn MessageSink,
        ) -> EngineResult<()> {
            self.settings = Some(settings.clone());
            self.step("configure_encoder")
        }

        fn read_header(
            &mut self,
            _handle: &mut u32,
            stream: &mut dyn ByteStream,
            _sink: &mut dyn MessageSink,
        ) -> EngineResult<ComponentImage> {
            self.step("read_header")?;
            let mut soc = [0u8; 4];
            match stream.read(&mut soc) {
                ReadStatus::Bytes(4) => Ok(self.header.clone()),
                _ => Err(EngineError::new("truncated main header")),
            }
        }

        fn set_decode_area(
            &mut self,
            _handle: &mut u32,
            _image: &mut ComponentImage,
            _area: DecodeArea,
            _sink: &mut dyn MessageSink,
        ) -> EngineResult<()> {
            self.step("set_decode_area")
        }

        fn decode(
            &mut self,
            _handle: &mut u32,
            _stream: &mut dyn ByteStream,
            image: &mut ComponentImage,
            _sink: &mut dyn MessageSink,
        ) -> EngineResult<()> {
            self.step("decode")?;
            for (plane, samples) in image.planes.iter_mut().zip(&self.decoded) {
                plane.samples = samples.clone();
            }
            Ok(())
        }

        fn decode_tile(
            &mut self,
            handle: &mut u32,
            stream: &mut dyn ByteStream,
            image: &mut ComponentImage,
            _tile_index: u32,
            sink: &mut dyn MessageSink,
        ) -> EngineResult<()> {
            self.step("decode_tile")?;
            self.decode(handle, stream, image, sink)
        }

        fn end_decompress(
            &mut self,
            _handle: &mut u32,
            _stream: &mut dyn ByteStream,
            _sink: &mut dyn MessageSink,
        ) -> EngineResult<()> {
            self.step("end_decompress")
        }

        fn start_compress(
            &mut self,
            _handle: &mut u32,
            _image: &ComponentImage,
            stream: &mut dyn WriteStream,
            _sink: &mut dyn MessageSink,
        ) -> EngineResult<()> {
            self.step("start_compress")?;
            stream
                .skip(self.box_header.len())
                .map(|_| ())
                .map_err(|e| EngineError::new(e.to_string()))
        }

        fn encode(
            &mut self,
            _handle: &mut u32,
            stream: &mut dyn WriteStream,
            _sink: &mut dyn MessageSink,
        ) -> EngineResult<()> {
            self.step("encode")?;
            stream
                .write(&self.output)
                .map(|_| ())
                .map_err(|e| EngineError::new(e.to_string()))
        }

        fn end_compress(
            &mut self,
            _handle: &mut u32,
            stream: &mut dyn WriteStream,
            _sink: &mut dyn MessageSink,
        ) -> EngineResult<()> {
            self.step("end_compress")?;
            let end = stream.position();
            stream
                .seek(0)
                .and_then(|()| stream.write(&self.box_header))
                .and_then(|_| stream.seek(end))
                .map_err(|e| EngineError::new(e.to_string()))
        }

        fn close(&mut self, handle: u32) {
            assert_eq!(handle, 7);
            self.closed += 1;
        }
    }

    fn decode(engine: &mut ScriptedEngine, params: &DecoderParameters) -> Result<PackedImage> {
        let mut sink = Vec::<Message>::new();
        decode_to_packed(engine, J2K, None, params, None, &mut sink)
    }

    #[test]
    fn test_decode_pipeline_runs_every_stage_once() {
        let mut engine = ScriptedEngine::gray(2, 2, vec![1, 2, 3, 4]);
        let packed = decode(&mut engine, &DecoderParameters::default()).unwrap();
        assert_eq!(packed.buffer, PackedBuffer::Indexed8(vec![1, 2, 3, 4]));
        assert_eq!(
            engine.calls,
            vec!["open", "configure_decoder", "read_header", "decode", "end_decompress"]
        );
        assert_eq!(engine.closed, 1);
    }

    #[test]
    fn test_decode_failure_closes_once_at_every_stage() {
        let cases = [
            ("configure_decoder", Stage::Configure),
            ("read_header", Stage::Header),
            ("decode", Stage::Decode),
            ("end_decompress", Stage::Finish),
        ];
        for (call, stage) in cases {
            let mut engine = ScriptedEngine::gray(1, 1, vec![0]).failing_at(call);
            let err = decode(&mut engine, &DecoderParameters::default()).unwrap_err();
            assert_eq!(err.stage(), stage, "failing at {}", call);
            assert!(matches!(err, BridgeError::Codec { .. }));
            assert_eq!(engine.closed, 1, "failing at {}", call);
        }
    }

    #[test]
    fn test_failed_open_has_nothing_to_close() {
        let mut engine = ScriptedEngine::gray(1, 1, vec![0]).failing_at("open");
        let err = decode(&mut engine, &DecoderParameters::default()).unwrap_err();
        assert_eq!(err.stage(), Stage::Configure);
        assert_eq!(engine.closed, 0);
    }

    #[test]
    fn test_unknown_data_never_reaches_engine() {
        let mut engine = ScriptedEngine::gray(1, 1, vec![0]);
        let mut sink = Vec::<Message>::new();
        let err = decode_to_packed(
            &mut engine,
            b"GIF89a",
            None,
            &DecoderParameters::default(),
            None,
            &mut sink,
        )
        .unwrap_err();
        assert_eq!(err, BridgeError::UnsupportedFormat);
        assert!(engine.calls.is_empty());
    }

    #[test]
    fn test_tile_index_takes_precedence_over_area() {
        let mut engine = ScriptedEngine::gray(1, 1, vec![9]);
        let params = DecoderParameters {
            tile_index: Some(3),
            decode_area: Some(DecodeArea {
                x0: 0,
                y0: 0,
                x1: 1,
                y1: 1,
            }),
            ..Default::default()
        };
        decode(&mut engine, &params).unwrap();
        assert!(engine.calls.contains(&"decode_tile"));
        assert!(!engine.calls.contains(&"set_decode_area"));
    }

    #[test]
    fn test_decode_area_is_set_before_decoding() {
        let mut engine = ScriptedEngine::gray(1, 1, vec![9]);
        let params = DecoderParameters {
            decode_area: Some(DecodeArea {
                x0: 0,
                y0: 0,
                x1: 1,
                y1: 1,
            }),
            ..Default::default()
        };
        decode(&mut engine, &params).unwrap();
        assert_eq!(engine.calls[3..5], ["set_decode_area", "decode"]);
    }

    #[test]
    fn test_short_decode_output_is_rejected() {
        let mut engine = ScriptedEngine::gray(2, 2, vec![1, 2, 3]);
        let err = decode(&mut engine, &DecoderParameters::default()).unwrap_err();
        assert!(matches!(err, BridgeError::GeometryMismatch { stage: Stage::Decode, .. }));
        assert_eq!(engine.closed, 1);
        assert!(!engine.calls.contains(&"end_decompress"));
    }

    #[test]
    fn test_empty_header_is_rejected() {
        let mut engine = ScriptedEngine::gray(1, 1, vec![0]);
        engine.header.planes.clear();
        let err = decode(&mut engine, &DecoderParameters::default()).unwrap_err();
        assert_eq!(err.stage(), Stage::Header);
        assert_eq!(engine.closed, 1);
    }

    #[test]
    fn test_out_of_order_call_fails_session() {
        let mut engine = ScriptedEngine::gray(1, 1, vec![0]);
        let mut sink = Vec::<Message>::new();
        {
            let mut session =
                DecodeSession::open(&mut engine, FormatCode::J2k, J2K, &mut sink).unwrap();
            session.configure(&DecoderParameters::default()).unwrap();
            let err = session.decode().unwrap_err();
            assert_eq!(
                err,
                BridgeError::InvalidState {
                    stage: Stage::Decode,
                    state: SessionState::Configured,
                }
            );
            assert_eq!(session.state(), SessionState::Failed);
            assert!(session.read_header().is_err());
        }
        assert_eq!(engine.closed, 1);
        assert_eq!(sink[0].text, "decoder configured");
    }

    #[test]
    fn test_abandoned_session_closes_on_drop() {
        let mut engine = ScriptedEngine::gray(1, 1, vec![0]);
        let mut sink = Vec::<Message>::new();
        {
            let mut session =
                DecodeSession::open(&mut engine, FormatCode::J2k, J2K, &mut sink).unwrap();
            session.configure(&DecoderParameters::default()).unwrap();
            session.read_header().unwrap();
        }
        assert_eq!(engine.closed, 1);
    }

    #[test]
    fn test_decode_converts_gray_pair_with_alpha() {
        let mut engine = ScriptedEngine::gray(1, 1, vec![0x10]);
        let alpha = engine.header.planes[0].clone();
        engine.header.planes.push(alpha);
        engine.decoded.push(vec![0x20]);
        let packed = decode(&mut engine, &DecoderParameters::default()).unwrap();
        assert_eq!(packed.buffer, PackedBuffer::Argb32(vec![0x2010_1010]));
    }

    fn rgb_pixels() -> (PackedBuffer, Geometry) {
        (
            PackedBuffer::Argb32(vec![0x00FF_0000, 0x0000_FF00, 0x0000_00FF, 0x00FF_FFFF]),
            Geometry::new(2, 2, 24),
        )
    }

    #[test]
    fn test_encode_pipeline_returns_written_bytes() {
        let mut engine = ScriptedEngine {
            output: vec![0xFF, 0x4F, 0xFF, 0x51, 0xFF, 0xD9],
            ..Default::default()
        };
        let (packed, geometry) = rgb_pixels();
        let mut sink = Vec::<Message>::new();
        let bytes = encode_from_packed(
            &mut engine,
            &packed,
            &geometry,
            &EncoderParameters::default(),
            &mut sink,
        )
        .unwrap();
        assert_eq!(bytes, vec![0xFF, 0x4F, 0xFF, 0x51, 0xFF, 0xD9]);
        assert_eq!(
            engine.calls,
            vec!["open", "configure_encoder", "start_compress", "encode", "end_compress"]
        );
        assert_eq!(engine.closed, 1);

        let settings = engine.settings.unwrap();
        assert!(settings.mct);
        assert!(settings.is_lossless());
    }

    #[test]
    fn test_encoder_can_back_patch_reserved_header() {
        let mut engine = ScriptedEngine {
            output: vec![0xFF, 0x4F, 0xFF, 0x51, 0xFF, 0xD9],
            box_header: vec![0, 0, 0, 14, b'j', b'p', b'2', b'c'],
            ..Default::default()
        };
        let (packed, geometry) = rgb_pixels();
        let params = EncoderParameters {
            format: FormatCode::Jp2,
            ..Default::default()
        };
        let mut sink = Vec::<Message>::new();
        let bytes = encode_from_packed(&mut engine, &packed, &geometry, &params, &mut sink)
            .unwrap();
        assert_eq!(
            bytes,
            vec![0, 0, 0, 14, b'j', b'p', b'2', b'c', 0xFF, 0x4F, 0xFF, 0x51, 0xFF, 0xD9]
        );
        assert_eq!(engine.closed, 1);
    }

    #[test]
    fn test_encode_failure_closes_once_at_every_stage() {
        let cases = [
            ("configure_encoder", Stage::Configure),
            ("start_compress", Stage::Encode),
            ("encode", Stage::Encode),
            ("end_compress", Stage::Finish),
        ];
        for (call, stage) in cases {
            let mut engine = ScriptedEngine::default().failing_at(call);
            let (packed, geometry) = rgb_pixels();
            let mut sink = Vec::<Message>::new();
            let err = encode_from_packed(
                &mut engine,
                &packed,
                &geometry,
                &EncoderParameters::default(),
                &mut sink,
            )
            .unwrap_err();
            assert_eq!(err.stage(), stage, "failing at {}", call);
            assert_eq!(engine.closed, 1, "failing at {}", call);
        }
    }

    #[test]
    fn test_encode_output_overflow_is_codec_failure() {
        let mut engine = ScriptedEngine {
            output: vec![0; 16],
            ..Default::default()
        };
        let (packed, geometry) = rgb_pixels();
        let params = EncoderParameters {
            output_capacity: Some(8),
            ..Default::default()
        };
        let mut sink = Vec::<Message>::new();
        let err = encode_from_packed(&mut engine, &packed, &geometry, &params, &mut sink)
            .unwrap_err();
        assert!(matches!(err, BridgeError::Codec { stage: Stage::Encode, .. }));
        assert_eq!(engine.closed, 1);
    }

    #[test]
    fn test_bad_geometry_never_opens_engine() {
        let mut engine = ScriptedEngine::default();
        let packed = PackedBuffer::Indexed8(vec![0; 3]);
        let mut sink = Vec::<Message>::new();
        let err = encode_from_packed(
            &mut engine,
            &packed,
            &Geometry::new(2, 2, 8),
            &EncoderParameters::default(),
            &mut sink,
        )
        .unwrap_err();
        assert_eq!(err.stage(), Stage::Unpack);
        assert!(engine.calls.is_empty());
        assert_eq!(engine.closed, 0);
    }

    #[test]
    fn test_encoder_sees_unpacked_planes() {
        let mut engine = ScriptedEngine::default();
        let (packed, geometry) = rgb_pixels();
        let image = unpack(&packed, &geometry).unwrap();
        assert_eq!(image.color_space, ColorSpace::Srgb);
        let mut sink = Vec::<Message>::new();
        let mut session =
            EncodeSession::open(&mut engine, FormatCode::Jp2, image, 64, &mut sink).unwrap();
        assert_eq!(session.state(), SessionState::Created);
        let err = session.encode().unwrap_err();
        assert_eq!(err.stage(), Stage::Encode);
        assert_eq!(session.state(), SessionState::Failed);
    }
}

//! Codestream/container classification by magic bytes and file extension.

use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::diagnostics::MessageSink;
use crate::error::{BridgeError, Result};

/// Number of leading bytes the detector looks at.
pub const SIGNATURE_WINDOW: usize = 12;

/// Format codes, numbered the way hosts already number them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(i32)]
pub enum FormatCode {
    /// Raw JPEG 2000 codestream.
    J2k = 0,
    /// JP2 box container.
    Jp2 = 1,
    /// JPIP stream; carries no fixed magic prefix.
    Jpt = 2,
    /// PNM family (pnm, pgm, ppm).
    Pxm = 10,
    Pgx = 11,
    Bmp = 12,
    Tif = 14,
    Raw = 15,
    Tga = 16,
    Png = 17,
}

impl FormatCode {
    pub const ALL: [FormatCode; 10] = [
        FormatCode::J2k,
        FormatCode::Jp2,
        FormatCode::Jpt,
        FormatCode::Pxm,
        FormatCode::Pgx,
        FormatCode::Bmp,
        FormatCode::Tif,
        FormatCode::Raw,
        FormatCode::Tga,
        FormatCode::Png,
    ];

    pub fn name(self) -> &'static str {
        match self {
            FormatCode::J2k => "J2K",
            FormatCode::Jp2 => "JP2",
            FormatCode::Jpt => "JPT",
            FormatCode::Pxm => "PXM",
            FormatCode::Pgx => "PGX",
            FormatCode::Bmp => "BMP",
            FormatCode::Tif => "TIF",
            FormatCode::Raw => "RAW",
            FormatCode::Tga => "TGA",
            FormatCode::Png => "PNG",
        }
    }

    /// True for formats the codec engine reads or writes directly.
    pub fn is_codestream(self) -> bool {
        matches!(self, FormatCode::J2k | FormatCode::Jp2 | FormatCode::Jpt)
    }

    pub fn extensions(self) -> impl Iterator<Item = &'static str> {
        EXTENSIONS
            .iter()
            .filter(move |(_, format)| *format == self)
            .map(|(ext, _)| *ext)
    }
}

impl fmt::Display for FormatCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

pub struct Signature {
    pub bytes: &'static [u8],
    pub format: FormatCode,
}

/// Checked in order; the boxed JP2 signature must precede the bare one.
pub const SIGNATURES: [Signature; 3] = [
    Signature {
        bytes: b"\x00\x00\x00\x0CjP  \r\n\x87\n",
        format: FormatCode::Jp2,
    },
    Signature {
        bytes: b"\r\n\x87\n",
        format: FormatCode::Jp2,
    },
    Signature {
        bytes: b"\xFF\x4F\xFF\x51",
        format: FormatCode::J2k,
    },
];

pub static EXTENSIONS: [(&str, FormatCode); 14] = [
    ("j2k", FormatCode::J2k),
    ("j2c", FormatCode::J2k),
    ("jpc", FormatCode::J2k),
    ("jp2", FormatCode::Jp2),
    ("jpt", FormatCode::Jpt),
    ("pgx", FormatCode::Pgx),
    ("pnm", FormatCode::Pxm),
    ("pgm", FormatCode::Pxm),
    ("ppm", FormatCode::Pxm),
    ("bmp", FormatCode::Bmp),
    ("tif", FormatCode::Tif),
    ("raw", FormatCode::Raw),
    ("tga", FormatCode::Tga),
    ("png", FormatCode::Png),
];

/// Classifies `data` by its leading bytes alone.
pub fn detect_format(data: &[u8]) -> Result<FormatCode> {
    let window = &data[..data.len().min(SIGNATURE_WINDOW)];
    SIGNATURES
        .iter()
        .find(|signature| window.starts_with(signature.bytes))
        .map(|signature| signature.format)
        .ok_or(BridgeError::UnsupportedFormat)
}

/// Classifies a path by the first three characters of its extension,
/// ignoring case.
pub fn format_from_extension(path: &Path) -> Option<FormatCode> {
    let ext = path.extension()?.to_str()?;
    let prefix = ext.get(..3)?;
    EXTENSIONS
        .iter()
        .find(|(candidate, _)| candidate.eq_ignore_ascii_case(prefix))
        .map(|(_, format)| *format)
}

/// Classifies `data`, using `path` as a secondary hint.
///
/// A `jpt` extension wins outright. Otherwise the leading bytes decide and a
/// disagreeing extension only produces a warning. Unrecognized leading bytes
/// are [`BridgeError::UnsupportedFormat`] whatever the extension says.
pub fn detect_format_with_path(
    data: &[u8],
    path: Option<&Path>,
    sink: &mut dyn MessageSink,
) -> Result<FormatCode> {
    let extension = path.and_then(format_from_extension);
    if extension == Some(FormatCode::Jpt) {
        return Ok(FormatCode::Jpt);
    }

    let detected = detect_format(data)?;

    if let Some(ext) = extension.filter(|ext| *ext != detected) {
        let mismatch = BridgeError::FormatMismatch {
            detected,
            extension: ext,
        };
        tracing::warn!(path = ?path, "{}", mismatch);
        sink.warning(&mismatch.to_string());
    }
    Ok(detected)
}

/// Reads at most [`SIGNATURE_WINDOW`] bytes from the start of a file.
pub fn read_signature(path: &Path) -> std::io::Result<Vec<u8>> {
    let mut head = Vec::with_capacity(SIGNATURE_WINDOW);
    File::open(path)?
        .take(SIGNATURE_WINDOW as u64)
        .read_to_end(&mut head)?;
    Ok(head)
}

use std::fmt;

use thiserror::Error;

use crate::format::FormatCode;
use crate::session::SessionState;

/// The step of a decode or encode operation an error was raised in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Detect,
    Configure,
    Header,
    Decode,
    Encode,
    Finish,
    Pack,
    Unpack,
    Stream,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Detect => "detect",
            Stage::Configure => "configure",
            Stage::Header => "header",
            Stage::Decode => "decode",
            Stage::Encode => "encode",
            Stage::Finish => "finish",
            Stage::Pack => "pack",
            Stage::Unpack => "unpack",
            Stage::Stream => "stream",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BridgeError {
    #[error("Stream bounds exceeded: {requested} bytes requested at position {position} of {length}")]
    StreamBounds {
        position: usize,
        requested: usize,
        length: usize,
    },
    #[error("Unsupported format")]
    UnsupportedFormat,
    /// Never returned as a failure; raised as a warning when the extension
    /// and the leading bytes disagree.
    #[error("File extension says {extension} but content is {detected}")]
    FormatMismatch {
        detected: FormatCode,
        extension: FormatCode,
    },
    #[error("Geometry mismatch during {stage}: {reason}")]
    GeometryMismatch { stage: Stage, reason: String },
    #[error("Codec failure during {stage}: {message}")]
    Codec { stage: Stage, message: String },
    #[error("Could not allocate {bytes} bytes during {stage}")]
    ResourceAllocation { stage: Stage, bytes: usize },
    #[error("Cannot run {stage} while session is {state:?}")]
    InvalidState { stage: Stage, state: SessionState },
}

impl BridgeError {
    pub fn stage(&self) -> Stage {
        match self {
            BridgeError::StreamBounds { .. } => Stage::Stream,
            BridgeError::UnsupportedFormat | BridgeError::FormatMismatch { .. } => Stage::Detect,
            BridgeError::GeometryMismatch { stage, .. }
            | BridgeError::Codec { stage, .. }
            | BridgeError::ResourceAllocation { stage, .. }
            | BridgeError::InvalidState { stage, .. } => *stage,
        }
    }

    pub(crate) fn geometry(stage: Stage, reason: impl Into<String>) -> Self {
        BridgeError::GeometryMismatch {
            stage,
            reason: reason.into(),
        }
    }
}

/// Failure reported by a codec engine implementation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct EngineError {
    pub message: String,
}

impl EngineError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;

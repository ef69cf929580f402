//! Memory-backed stream handed to the codec engine in place of a file.
//!
//! [`ByteStream`] is the read side of the codec stream contract and
//! [`WriteStream`] adds the write callback used while encoding. Both are
//! object safe; the engine only ever sees `&mut dyn ByteStream` or
//! `&mut dyn WriteStream`.

use crate::cursor::BufferCursor;
use crate::error::Result;

/// Outcome of [`ByteStream::read`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadStatus {
    Bytes(usize),
    /// Nothing was left to read. Never combined with a partial copy.
    EndOfStream,
}

pub trait ByteStream {
    fn read(&mut self, buf: &mut [u8]) -> ReadStatus;

    /// Relative move. Fails and parks the stream at its end when
    /// `position() + count` is not strictly inside the stream. A write
    /// stream may instead move anywhere up to its capacity.
    fn skip(&mut self, count: usize) -> Result<usize>;

    /// Absolute move, under the same rule as [`skip`](Self::skip).
    fn seek(&mut self, offset: usize) -> Result<()>;

    fn position(&self) -> usize;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub trait WriteStream: ByteStream {
    /// Writes all of `bytes` at the current position; the backing region is
    /// never reallocated, so running out of room is an error.
    fn write(&mut self, bytes: &[u8]) -> Result<usize>;
}

#[derive(Debug, Clone)]
pub struct MemoryStream<B> {
    cursor: BufferCursor<B>,
}

impl<B: AsRef<[u8]>> MemoryStream<B> {
    /// Stream over the complete contents of `base`.
    pub fn reader(base: B) -> Self {
        Self {
            cursor: BufferCursor::new(base),
        }
    }

    /// Empty stream whose capacity is the size of `base`. Skipping past the
    /// written bytes reserves room that a later seek back can fill in.
    pub fn writer(base: B) -> Self {
        Self {
            cursor: BufferCursor::for_writing(base),
        }
    }

    pub fn cursor(&self) -> &BufferCursor<B> {
        &self.cursor
    }

    pub fn written(&self) -> &[u8] {
        self.cursor.data()
    }

    pub fn into_inner(self) -> B {
        self.cursor.into_inner()
    }
}

impl<B: AsRef<[u8]>> ByteStream for MemoryStream<B> {
    fn read(&mut self, buf: &mut [u8]) -> ReadStatus {
        if self.cursor.remaining() == 0 {
            return ReadStatus::EndOfStream;
        }
        ReadStatus::Bytes(self.cursor.read_into(buf))
    }

    fn skip(&mut self, count: usize) -> Result<usize> {
        self.cursor.advance(count).map(|()| count).inspect_err(|e| {
            tracing::debug!("memory stream skip failed: {}", e);
        })
    }

    fn seek(&mut self, offset: usize) -> Result<()> {
        self.cursor.set_position(offset).inspect_err(|e| {
            tracing::debug!("memory stream seek failed: {}", e);
        })
    }

    fn position(&self) -> usize {
        self.cursor.position()
    }

    fn len(&self) -> usize {
        self.cursor.len()
    }
}

impl<B: AsRef<[u8]> + AsMut<[u8]>> WriteStream for MemoryStream<B> {
    fn write(&mut self, bytes: &[u8]) -> Result<usize> {
        self.cursor.write_from(bytes)
    }
}

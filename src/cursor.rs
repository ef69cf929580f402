//! Bounds-tracked cursor over a fixed byte region.
//!
//! The region is never resized. A cursor created with [`BufferCursor::new`]
//! exposes the whole region for reading; one created with
//! [`BufferCursor::for_writing`] starts empty and grows `len()` as bytes are
//! written, up to the region's capacity. A writing cursor may also skip or
//! seek anywhere up to the capacity, so a header can be reserved and patched
//! once the body behind it is known; bytes jumped over keep whatever the
//! region already held.

use crate::error::{BridgeError, Result};

#[derive(Debug, Clone)]
pub struct BufferCursor<B> {
    base: B,
    length: usize,
    position: usize,
    writable: bool,
}

impl<B: AsRef<[u8]>> BufferCursor<B> {
    pub fn new(base: B) -> Self {
        let length = base.as_ref().len();
        Self {
            base,
            length,
            position: 0,
            writable: false,
        }
    }

    pub fn for_writing(base: B) -> Self {
        Self {
            base,
            length: 0,
            position: 0,
            writable: true,
        }
    }

    pub fn len(&self) -> usize {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn capacity(&self) -> usize {
        self.base.as_ref().len()
    }

    pub fn remaining(&self) -> usize {
        self.length - self.position
    }

    /// Bytes between the start of the region and `len()`.
    pub fn data(&self) -> &[u8] {
        &self.base.as_ref()[..self.length]
    }

    pub fn remaining_data(&self) -> &[u8] {
        &self.base.as_ref()[self.position..self.length]
    }

    pub fn into_inner(self) -> B {
        self.base
    }

    /// Copies `min(buf.len(), remaining())` bytes into `buf` and advances.
    pub fn read_into(&mut self, buf: &mut [u8]) -> usize {
        let count = buf.len().min(self.remaining());
        let start = self.position;
        buf[..count].copy_from_slice(&self.base.as_ref()[start..start + count]);
        self.position += count;
        count
    }

    /// Moves forward by `count` bytes. For reading, the target must lie
    /// strictly before `len()`. For writing, it may be anything up to
    /// `capacity()` and `len()` grows to cover it. Otherwise the cursor is
    /// parked at `len()` and an error is returned.
    pub fn advance(&mut self, count: usize) -> Result<()> {
        match self.position.checked_add(count) {
            Some(target) if self.reachable(target) => {
                self.move_to(target);
                Ok(())
            }
            _ => Err(self.park_at_end(count)),
        }
    }

    /// Moves to absolute `offset`, under the same rule as [`advance`](Self::advance).
    pub fn set_position(&mut self, offset: usize) -> Result<()> {
        if self.reachable(offset) {
            self.move_to(offset);
            Ok(())
        } else {
            Err(self.park_at_end(offset.saturating_sub(self.position)))
        }
    }

    fn reachable(&self, target: usize) -> bool {
        if self.writable {
            target <= self.capacity()
        } else {
            target < self.length
        }
    }

    fn move_to(&mut self, target: usize) {
        self.position = target;
        self.length = self.length.max(target);
    }

    fn park_at_end(&mut self, requested: usize) -> BridgeError {
        let error = BridgeError::StreamBounds {
            position: self.position,
            requested,
            length: self.length,
        };
        self.position = self.length;
        error
    }
}

impl<B: AsRef<[u8]> + AsMut<[u8]>> BufferCursor<B> {
    /// Writes all of `bytes` at the current position or nothing at all.
    pub fn write_from(&mut self, bytes: &[u8]) -> Result<usize> {
        let capacity = self.capacity();
        let end = match self.position.checked_add(bytes.len()) {
            Some(end) if end <= capacity => end,
            _ => {
                return Err(BridgeError::StreamBounds {
                    position: self.position,
                    requested: bytes.len(),
                    length: capacity,
                });
            }
        };
        self.base.as_mut()[self.position..end].copy_from_slice(bytes);
        self.position = end;
        self.length = self.length.max(end);
        Ok(bytes.len())
    }
}

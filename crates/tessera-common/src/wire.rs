//! Little-endian session message encoding.
//!
//! Messages are flat byte strings made of:
//! - `u8`, `u16` and `i32` integers, little-endian
//! - coordinates, written as two `i32`
//! - strings, UTF-8 terminated by a single NUL byte

use crate::coords::Coord;
use crate::error::{WireError, WireResult};

/// Cursor over a received message.
#[derive(Debug, Clone)]
pub struct MessageReader<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> MessageReader<'a> {
    /// Creates a reader positioned at the start of `data`.
    #[must_use]
    pub const fn new(data: &'a [u8]) -> Self {
        Self { data, offset: 0 }
    }

    /// Current read position.
    #[must_use]
    pub const fn offset(&self) -> usize {
        self.offset
    }

    /// Returns true once every byte has been consumed.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.offset >= self.data.len()
    }

    /// Bytes not yet consumed.
    #[must_use]
    pub fn remaining(&self) -> &'a [u8] {
        &self.data[self.offset.min(self.data.len())..]
    }

    fn take(&mut self, needed: usize) -> WireResult<&'a [u8]> {
        let available = self.data.len().saturating_sub(self.offset);
        if available < needed {
            return Err(WireError::Truncated {
                offset: self.offset,
                needed,
                available,
            });
        }
        let bytes = &self.data[self.offset..self.offset + needed];
        self.offset += needed;
        Ok(bytes)
    }

    /// Reads an unsigned byte.
    pub fn u8(&mut self) -> WireResult<u8> {
        Ok(self.take(1)?[0])
    }

    /// Reads an unsigned 16-bit integer.
    pub fn u16(&mut self) -> WireResult<u16> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    /// Reads a signed 32-bit integer.
    pub fn i32(&mut self) -> WireResult<i32> {
        let b = self.take(4)?;
        Ok(i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Reads a coordinate.
    pub fn coord(&mut self) -> WireResult<Coord> {
        let x = self.i32()?;
        let y = self.i32()?;
        Ok(Coord::new(x, y))
    }

    /// Reads a NUL-terminated string.
    pub fn string(&mut self) -> WireResult<&'a str> {
        let start = self.offset;
        let rest = self.remaining();
        let len = rest
            .iter()
            .position(|&b| b == 0)
            .ok_or(WireError::UnterminatedString(start))?;
        let s = std::str::from_utf8(&rest[..len]).map_err(|_| WireError::InvalidString(start))?;
        self.offset += len + 1;
        Ok(s)
    }

    /// Consumes and returns every remaining byte.
    pub fn rest(&mut self) -> &'a [u8] {
        let rest = self.remaining();
        self.offset = self.data.len();
        rest
    }
}

/// Builder for an outbound message.
#[derive(Debug, Clone, Default)]
pub struct MessageWriter {
    buf: Vec<u8>,
}

impl MessageWriter {
    /// Starts a message with the given type byte.
    #[must_use]
    pub fn with_type(kind: u8) -> Self {
        Self { buf: vec![kind] }
    }

    /// Starts an untyped message body.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an unsigned byte.
    pub fn u8(&mut self, v: u8) -> &mut Self {
        self.buf.push(v);
        self
    }

    /// Appends an unsigned 16-bit integer.
    pub fn u16(&mut self, v: u16) -> &mut Self {
        self.buf.extend_from_slice(&v.to_le_bytes());
        self
    }

    /// Appends a signed 32-bit integer.
    pub fn i32(&mut self, v: i32) -> &mut Self {
        self.buf.extend_from_slice(&v.to_le_bytes());
        self
    }

    /// Appends a coordinate.
    pub fn coord(&mut self, c: Coord) -> &mut Self {
        self.i32(c.x).i32(c.y)
    }

    /// Appends a NUL-terminated string.
    pub fn string(&mut self, s: &str) -> &mut Self {
        self.buf.extend_from_slice(s.as_bytes());
        self.buf.push(0);
        self
    }

    /// Appends raw bytes.
    pub fn bytes(&mut self, b: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(b);
        self
    }

    /// Finishes the message.
    #[must_use]
    pub fn finish(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.buf)
    }
}

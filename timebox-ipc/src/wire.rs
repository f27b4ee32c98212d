//! Big-endian Field Cursors
//!
//! Bounds-checked readers and writers over byte slices. Every fixed or
//! variable-length field checks the remaining length before touching the
//! buffer, so a truncated frame fails with `CodecError::BufferTooSmall`
//! instead of reading out of bounds.

use crate::messages::Command;
use thiserror::Error;

/// Size of the fixed frame header (1 byte command + 3 bytes total length)
pub const HEADER_LEN: usize = 4;

/// Largest total length the 24-bit header field can carry (16 MiB - 1)
pub const MAX_FRAME_LEN: usize = 0x00FF_FFFF;

/// Largest payload of a variable-length short string
pub const MAX_SHORT_STRING_LEN: usize = u8::MAX as usize;

/// Errors raised while encoding or decoding a single frame
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("buffer too small: need {needed} bytes at offset {offset}, {available} available")]
    BufferTooSmall {
        offset: usize,
        needed: usize,
        available: usize,
    },

    #[error("wrong message type: expected {expected}, got {got}")]
    WrongMessageType { expected: Command, got: Command },

    #[error("frame length {0} exceeds maximum of {MAX_FRAME_LEN} bytes")]
    FrameTooLarge(usize),

    #[error("invalid frame length {0}")]
    InvalidLength(usize),

    #[error("short string of {0} bytes exceeds {MAX_SHORT_STRING_LEN} bytes")]
    StringTooLong(usize),

    #[error("short string at offset {0} is not valid UTF-8")]
    InvalidUtf8(usize),
}

/// Read cursor over an encoded frame
pub struct WireReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> WireReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    /// Fail unless at least `needed` bytes remain
    pub fn ensure(&self, needed: usize) -> Result<(), CodecError> {
        if self.remaining() < needed {
            return Err(CodecError::BufferTooSmall {
                offset: self.pos,
                needed,
                available: self.remaining(),
            });
        }
        Ok(())
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        self.ensure(n)?;
        let bytes = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(bytes)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], CodecError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub fn u8(&mut self) -> Result<u8, CodecError> {
        Ok(self.array::<1>()?[0])
    }

    pub fn u24(&mut self) -> Result<u32, CodecError> {
        let [a, b, c] = self.array::<3>()?;
        Ok(u32::from_be_bytes([0, a, b, c]))
    }

    pub fn u32(&mut self) -> Result<u32, CodecError> {
        Ok(u32::from_be_bytes(self.array::<4>()?))
    }

    pub fn i64(&mut self) -> Result<i64, CodecError> {
        Ok(i64::from_be_bytes(self.array::<8>()?))
    }

    /// Variable-length short string: 1 length byte followed by raw bytes
    pub fn short_string(&mut self) -> Result<String, CodecError> {
        let len = self.u8()? as usize;
        let start = self.pos;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| CodecError::InvalidUtf8(start))
    }
}

/// Write cursor over a caller-provided buffer
pub struct WireWriter<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> WireWriter<'a> {
    pub fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn put(&mut self, bytes: &[u8]) -> Result<(), CodecError> {
        let available = self.buf.len() - self.pos;
        if available < bytes.len() {
            return Err(CodecError::BufferTooSmall {
                offset: self.pos,
                needed: bytes.len(),
                available,
            });
        }
        self.buf[self.pos..self.pos + bytes.len()].copy_from_slice(bytes);
        self.pos += bytes.len();
        Ok(())
    }

    pub fn u8(&mut self, value: u8) -> Result<(), CodecError> {
        self.put(&[value])
    }

    pub fn u24(&mut self, value: u32) -> Result<(), CodecError> {
        if value as usize > MAX_FRAME_LEN {
            return Err(CodecError::FrameTooLarge(value as usize));
        }
        self.put(&value.to_be_bytes()[1..])
    }

    pub fn u32(&mut self, value: u32) -> Result<(), CodecError> {
        self.put(&value.to_be_bytes())
    }

    pub fn i64(&mut self, value: i64) -> Result<(), CodecError> {
        self.put(&value.to_be_bytes())
    }

    pub fn short_string(&mut self, value: &str) -> Result<(), CodecError> {
        let len = value.len();
        if len > MAX_SHORT_STRING_LEN {
            return Err(CodecError::StringTooLong(len));
        }
        self.u8(len as u8)?;
        self.put(value.as_bytes())
    }
}

/// Encoded size of a short string field
pub(crate) fn short_string_len(value: &str) -> usize {
    1 + value.len()
}

//! Frame Reader/Writer
//!
//! Reads and writes whole frames over a byte stream. A frame is delimited by
//! the total length in its header, so the reader pulls the 4 header bytes
//! first and then exactly `total_length - 4` body bytes.

use crate::messages::{Command, MessageHeader, WireMessage};
use crate::wire::{CodecError, HEADER_LEN};
use std::io::{self, Read, Write};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FrameError {
    /// Peer closed the stream cleanly between frames
    #[error("end of stream")]
    EndOfStream,

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
}

/// Read one complete frame, header included.
///
/// EOF before the first header byte is `EndOfStream`; EOF anywhere later is
/// an `UnexpectedEof` I/O error.
pub fn read_frame<R: Read>(reader: &mut R) -> Result<Vec<u8>, FrameError> {
    let mut header_bytes = [0u8; HEADER_LEN];
    if !read_exact_or_eof(reader, &mut header_bytes)? {
        return Err(FrameError::EndOfStream);
    }

    let header = MessageHeader::decode(&header_bytes)?;
    let total = header.total_length as usize;
    if total < HEADER_LEN {
        return Err(CodecError::InvalidLength(total).into());
    }

    let mut frame = vec![0u8; total];
    frame[..HEADER_LEN].copy_from_slice(&header_bytes);
    reader.read_exact(&mut frame[HEADER_LEN..])?;
    Ok(frame)
}

/// Encode `message` and write it as a single frame
pub fn write_frame<W: Write, M: WireMessage>(writer: &mut W, message: &M) -> Result<(), FrameError> {
    let bytes = message.encode()?;
    writer.write_all(&bytes)?;
    writer.flush()?;
    Ok(())
}

/// Command of an already-read frame
pub fn frame_command(frame: &[u8]) -> Result<Command, CodecError> {
    Ok(MessageHeader::decode(frame)?.command)
}

fn read_exact_or_eof<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<bool> {
    let mut off = 0usize;
    while off < buf.len() {
        match reader.read(&mut buf[off..]) {
            Ok(0) if off == 0 => return Ok(false),
            Ok(0) => {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "stream closed inside frame header",
                ))
            }
            Ok(n) => off += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(true)
}

/// Frame reader over any byte stream
pub struct FrameReader<R> {
    inner: R,
}

impl<R: Read> FrameReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    pub fn read_frame(&mut self) -> Result<Vec<u8>, FrameError> {
        read_frame(&mut self.inner)
    }

    /// Read one frame and decode it as `M`
    pub fn read<M: WireMessage>(&mut self) -> Result<M, FrameError> {
        let frame = self.read_frame()?;
        Ok(M::decode(&frame)?)
    }

    pub fn get_ref(&self) -> &R {
        &self.inner
    }
}

/// Frame writer over any byte stream
pub struct FrameWriter<W> {
    inner: W,
}

impl<W: Write> FrameWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    pub fn write<M: WireMessage>(&mut self, message: &M) -> Result<(), FrameError> {
        write_frame(&mut self.inner, message)
    }
}

//! Connection Errors

use crate::framing::FrameError;
use crate::wire::CodecError;
use std::io;
use thiserror::Error;

/// Failure on either end of a supervisor-worker connection
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("pong sequence mismatch: expected {expected:#010x}, got {got:#010x}")]
    PongMismatch { expected: u32, got: u32 },

    #[error("no address to connect to")]
    NoAddress,

    /// Worker side only: the execution half of the handoff is gone
    #[error("handoff channel closed")]
    HandoffClosed,
}

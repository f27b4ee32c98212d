//! Timebox IPC Protocol
//!
//! Binary request/response protocol between the supervisor and a worker
//! process. Every frame starts with a 4-byte header (command byte plus 24-bit
//! big-endian total length); bodies use fixed-width big-endian integers and
//! length-prefixed short strings.

mod client;
mod error;
mod framing;
mod listener;
mod messages;
mod wire;

pub use client::Client;
pub use error::ConnectionError;
pub use framing::{frame_command, read_frame, write_frame, FrameError, FrameReader, FrameWriter};
pub use listener::{Handoff, WorkerConn};
pub use messages::{
    duration_nanos, Command, MessageHeader, PingMessage, PongMessage, ResultFlags, ResultItem,
    ResultMessage, RunMessage, WireMessage, PONG_MASK,
};
pub use wire::{
    CodecError, WireReader, WireWriter, HEADER_LEN, MAX_FRAME_LEN, MAX_SHORT_STRING_LEN,
};

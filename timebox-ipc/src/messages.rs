//! IPC Message Types
//!
//! Every frame starts with a fixed 4-byte header:
//!
//! ```text
//! +-----+-----+-----+-----+
//! |  0  |  1  |  2  |  3  |
//! +-----+-----+-----+-----+
//! | CMD |  total length   |
//! +-----+-----+-----+-----+
//! ```
//!
//! The total length covers the header itself and is big-endian. Bodies:
//!
//! - Ping/Pong: `u32` sequence
//! - Run: `i64` problem timeout ns, `i64` method timeout ns, `u32` problem id,
//!   short string method (empty means every registered method)
//! - Result: `u32` item count, items, short string message
//!
//! A result item is `u32` flags, `u32` problem id, short string method,
//! `i64` result and `i64` duration ns.

use crate::wire::{
    short_string_len, CodecError, WireReader, WireWriter, HEADER_LEN, MAX_FRAME_LEN,
};
use std::fmt;
use std::time::Duration;

/// Command byte carried in the frame header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Unknown,
    Invalid,
    Ping,
    Pong,
    Run,
    Result,
}

impl Command {
    pub const fn to_byte(self) -> u8 {
        match self {
            Command::Unknown => 0,
            Command::Invalid => 1,
            Command::Ping => 2,
            Command::Pong => 3,
            Command::Run => 4,
            Command::Result => 5,
        }
    }

    /// Unassigned command bytes decode as `Unknown`
    pub const fn from_byte(byte: u8) -> Self {
        match byte {
            1 => Command::Invalid,
            2 => Command::Ping,
            3 => Command::Pong,
            4 => Command::Run,
            5 => Command::Result,
            _ => Command::Unknown,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Command::Unknown => "UNKNOWN",
            Command::Invalid => "INVALID",
            Command::Ping => "PING",
            Command::Pong => "PONG",
            Command::Run => "RUN",
            Command::Result => "RESULT",
        };
        f.write_str(label)
    }
}

/// Fixed frame header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader {
    pub command: Command,
    /// Length of the whole frame including these 4 bytes
    pub total_length: u32,
}

impl MessageHeader {
    pub fn new(command: Command, total_length: u32) -> Self {
        Self {
            command,
            total_length,
        }
    }

    pub fn encode_to(&self, buf: &mut [u8]) -> Result<usize, CodecError> {
        let mut writer = WireWriter::new(buf);
        self.write(&mut writer)?;
        Ok(writer.position())
    }

    pub fn decode(buf: &[u8]) -> Result<Self, CodecError> {
        Self::read(&mut WireReader::new(buf))
    }

    fn write(&self, writer: &mut WireWriter<'_>) -> Result<(), CodecError> {
        let mut bytes = [0u8; HEADER_LEN];
        bytes[0] = self.command.to_byte();
        WireWriter::new(&mut bytes[1..]).u24(self.total_length)?;
        writer.put(&bytes)
    }

    fn read(reader: &mut WireReader<'_>) -> Result<Self, CodecError> {
        reader.ensure(HEADER_LEN)?;
        let command = Command::from_byte(reader.u8()?);
        let total_length = reader.u24()?;
        Ok(Self {
            command,
            total_length,
        })
    }
}

/// A message that travels as one frame
pub trait WireMessage: Sized {
    /// Command byte this message is framed with
    const COMMAND: Command;

    /// Encoded size of the body, excluding the header
    fn body_len(&self) -> usize;

    /// Write the body fields after the header
    fn encode_body(&self, writer: &mut WireWriter<'_>) -> Result<(), CodecError>;

    /// Read the body fields; `reader` is bounded to this frame
    fn decode_body(reader: &mut WireReader<'_>) -> Result<Self, CodecError>;

    /// Total frame length including the header
    fn encoded_len(&self) -> usize {
        HEADER_LEN + self.body_len()
    }

    /// Header with the true total length of this message
    fn header(&self) -> Result<MessageHeader, CodecError> {
        let len = self.encoded_len();
        if len > MAX_FRAME_LEN {
            return Err(CodecError::FrameTooLarge(len));
        }
        Ok(MessageHeader::new(Self::COMMAND, len as u32))
    }

    /// Encode into `buf`, returning the number of bytes written.
    ///
    /// The length is computed up front, so a short buffer fails before any
    /// byte is written.
    fn encode_to(&self, buf: &mut [u8]) -> Result<usize, CodecError> {
        let header = self.header()?;
        let len = header.total_length as usize;
        if buf.len() < len {
            return Err(CodecError::BufferTooSmall {
                offset: 0,
                needed: len,
                available: buf.len(),
            });
        }

        let mut writer = WireWriter::new(&mut buf[..len]);
        header.write(&mut writer)?;
        self.encode_body(&mut writer)?;
        Ok(writer.position())
    }

    /// Encode into a freshly allocated frame
    fn encode(&self) -> Result<Vec<u8>, CodecError> {
        let mut buf = vec![0u8; self.encoded_len()];
        let written = self.encode_to(&mut buf)?;
        buf.truncate(written);
        Ok(buf)
    }

    /// Decode one frame of this message type from the start of `buf`
    fn decode(buf: &[u8]) -> Result<Self, CodecError> {
        let mut reader = WireReader::new(buf);
        let header = MessageHeader::read(&mut reader)?;
        if header.command != Self::COMMAND {
            return Err(CodecError::WrongMessageType {
                expected: Self::COMMAND,
                got: header.command,
            });
        }

        let total = header.total_length as usize;
        if total < HEADER_LEN {
            return Err(CodecError::InvalidLength(total));
        }
        if buf.len() < total {
            return Err(CodecError::BufferTooSmall {
                offset: 0,
                needed: total,
                available: buf.len(),
            });
        }

        let mut body = WireReader::new(&buf[HEADER_LEN..total]);
        Self::decode_body(&mut body)
    }
}

/// Liveness probe; answered with a `PongMessage`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PingMessage {
    pub sequence: u32,
}

/// Reply to a `PingMessage`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PongMessage {
    pub sequence: u32,
}

/// Mask applied to a ping sequence to produce its pong
pub const PONG_MASK: u32 = 0xFFFF_FFFF;

impl PingMessage {
    pub fn new(sequence: u32) -> Self {
        Self { sequence }
    }

    pub fn make_pong(&self) -> PongMessage {
        PongMessage {
            sequence: PONG_MASK ^ self.sequence,
        }
    }
}

impl PongMessage {
    /// Whether this pong answers `ping`
    pub fn answers(&self, ping: &PingMessage) -> bool {
        self.sequence == PONG_MASK ^ ping.sequence
    }
}

impl WireMessage for PingMessage {
    const COMMAND: Command = Command::Ping;

    fn body_len(&self) -> usize {
        4
    }

    fn encode_body(&self, writer: &mut WireWriter<'_>) -> Result<(), CodecError> {
        writer.u32(self.sequence)
    }

    fn decode_body(reader: &mut WireReader<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            sequence: reader.u32()?,
        })
    }
}

impl WireMessage for PongMessage {
    const COMMAND: Command = Command::Pong;

    fn body_len(&self) -> usize {
        4
    }

    fn encode_body(&self, writer: &mut WireWriter<'_>) -> Result<(), CodecError> {
        writer.u32(self.sequence)
    }

    fn decode_body(reader: &mut WireReader<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            sequence: reader.u32()?,
        })
    }
}

/// Request to run one method, or every method, of a problem
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunMessage {
    /// Budget for running every method of the problem; `<= 0` means none
    pub problem_timeout_ns: i64,
    /// Budget for a single method; `<= 0` means none
    pub method_timeout_ns: i64,
    pub problem_id: u32,
    /// Method name; empty runs every registered method
    pub method: String,
}

impl RunMessage {
    pub fn new(problem_id: u32, method: impl Into<String>) -> Self {
        Self {
            problem_timeout_ns: 0,
            method_timeout_ns: 0,
            problem_id,
            method: method.into(),
        }
    }

    pub fn with_timeouts(mut self, problem: Option<Duration>, method: Option<Duration>) -> Self {
        self.problem_timeout_ns = duration_to_nanos(problem);
        self.method_timeout_ns = duration_to_nanos(method);
        self
    }

    pub fn problem_timeout(&self) -> Option<Duration> {
        nanos_to_duration(self.problem_timeout_ns)
    }

    pub fn method_timeout(&self) -> Option<Duration> {
        nanos_to_duration(self.method_timeout_ns)
    }

    pub fn is_all_methods(&self) -> bool {
        self.method.is_empty()
    }
}

impl WireMessage for RunMessage {
    const COMMAND: Command = Command::Run;

    fn body_len(&self) -> usize {
        8 + 8 + 4 + short_string_len(&self.method)
    }

    fn encode_body(&self, writer: &mut WireWriter<'_>) -> Result<(), CodecError> {
        writer.i64(self.problem_timeout_ns)?;
        writer.i64(self.method_timeout_ns)?;
        writer.u32(self.problem_id)?;
        writer.short_string(&self.method)
    }

    fn decode_body(reader: &mut WireReader<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            problem_timeout_ns: reader.i64()?,
            method_timeout_ns: reader.i64()?,
            problem_id: reader.u32()?,
            method: reader.short_string()?,
        })
    }
}

/// Status bits of a result item. Unknown bits are carried through untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ResultFlags(u32);

impl ResultFlags {
    pub const FINISHED: ResultFlags = ResultFlags(1);
    pub const TIMEOUT: ResultFlags = ResultFlags(1 << 1);
    pub const ERROR: ResultFlags = ResultFlags(1 << 2);

    pub const fn empty() -> Self {
        ResultFlags(0)
    }

    pub const fn from_bits(bits: u32) -> Self {
        ResultFlags(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn contains(self, other: ResultFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn set(&mut self, other: ResultFlags, value: bool) {
        if value {
            self.0 |= other.0;
        } else {
            self.0 &= !other.0;
        }
    }
}

impl std::ops::BitOr for ResultFlags {
    type Output = ResultFlags;

    fn bitor(self, rhs: ResultFlags) -> ResultFlags {
        ResultFlags(self.0 | rhs.0)
    }
}

/// One method outcome inside a `ResultMessage`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultItem {
    pub flags: ResultFlags,
    pub problem_id: u32,
    pub method: String,
    pub result: i64,
    pub duration_ns: i64,
}

impl ResultItem {
    /// Smallest possible encoding: empty method string
    pub const MIN_ENCODED_LEN: usize = 4 + 4 + 1 + 8 + 8;

    pub fn encoded_len(&self) -> usize {
        4 + 4 + short_string_len(&self.method) + 8 + 8
    }

    pub fn duration(&self) -> Duration {
        nanos_to_duration(self.duration_ns).unwrap_or(Duration::ZERO)
    }

    fn write(&self, writer: &mut WireWriter<'_>) -> Result<(), CodecError> {
        writer.u32(self.flags.bits())?;
        writer.u32(self.problem_id)?;
        writer.short_string(&self.method)?;
        writer.i64(self.result)?;
        writer.i64(self.duration_ns)
    }

    fn read(reader: &mut WireReader<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            flags: ResultFlags::from_bits(reader.u32()?),
            problem_id: reader.u32()?,
            method: reader.short_string()?,
            result: reader.i64()?,
            duration_ns: reader.i64()?,
        })
    }
}

/// Reply to a `RunMessage`
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResultMessage {
    pub items: Vec<ResultItem>,
    /// Diagnostic text; empty when the run succeeded
    pub message: String,
}

impl ResultMessage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, item: ResultItem) {
        self.items.push(item);
    }
}

impl WireMessage for ResultMessage {
    const COMMAND: Command = Command::Result;

    fn body_len(&self) -> usize {
        4 + self
            .items
            .iter()
            .map(ResultItem::encoded_len)
            .sum::<usize>()
            + short_string_len(&self.message)
    }

    fn encode_body(&self, writer: &mut WireWriter<'_>) -> Result<(), CodecError> {
        let count = u32::try_from(self.items.len())
            .map_err(|_| CodecError::FrameTooLarge(self.encoded_len()))?;
        writer.u32(count)?;
        for item in &self.items {
            item.write(writer)?;
        }
        writer.short_string(&self.message)
    }

    fn decode_body(reader: &mut WireReader<'_>) -> Result<Self, CodecError> {
        let count = reader.u32()? as usize;

        // Reject impossible counts before allocating for them
        reader.ensure(count.saturating_mul(ResultItem::MIN_ENCODED_LEN))?;

        let mut items = Vec::with_capacity(count);
        for _ in 0..count {
            items.push(ResultItem::read(reader)?);
        }
        let message = reader.short_string()?;
        Ok(Self { items, message })
    }
}

fn duration_to_nanos(duration: Option<Duration>) -> i64 {
    match duration {
        Some(d) => i64::try_from(d.as_nanos()).unwrap_or(i64::MAX),
        None => 0,
    }
}

fn nanos_to_duration(nanos: i64) -> Option<Duration> {
    if nanos > 0 {
        Some(Duration::from_nanos(nanos as u64))
    } else {
        None
    }
}

/// Convert an elapsed duration to the signed nanoseconds carried on the wire
pub fn duration_nanos(duration: Duration) -> i64 {
    duration_to_nanos(Some(duration))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_result() -> ResultMessage {
        ResultMessage {
            items: vec![
                ResultItem {
                    flags: ResultFlags::FINISHED,
                    problem_id: 10,
                    method: "naive".to_string(),
                    result: 142_913_828_922,
                    duration_ns: 1_500_000,
                },
                ResultItem {
                    flags: ResultFlags::TIMEOUT | ResultFlags::ERROR,
                    problem_id: 10,
                    method: String::new(),
                    result: -1,
                    duration_ns: 50_000_000,
                },
            ],
            message: "timed out".to_string(),
        }
    }

    #[test]
    fn test_header_encode() {
        let header = MessageHeader::new(Command::Run, 0x1a2b3c);
        let mut buf = [0u8; 4];
        assert_eq!(header.encode_to(&mut buf).unwrap(), 4);
        assert_eq!(buf, [0x04, 0x1a, 0x2b, 0x3c]);
        assert_eq!(MessageHeader::decode(&buf).unwrap(), header);
    }

    #[test]
    fn test_header_truncated() {
        let header = MessageHeader::new(Command::Run, 0x1a2b3c);
        for len in 0..HEADER_LEN {
            let mut buf = vec![0u8; len];
            assert!(matches!(
                header.encode_to(&mut buf),
                Err(CodecError::BufferTooSmall { .. })
            ));
            assert!(matches!(
                MessageHeader::decode(&[0x01, 0x1a, 0x2b][..len.min(3)]),
                Err(CodecError::BufferTooSmall { .. })
            ));
        }
    }

    #[test]
    fn test_header_unknown_command() {
        let header = MessageHeader::decode(&[0x7f, 0, 0, 4]).unwrap();
        assert_eq!(header.command, Command::Unknown);
    }

    #[test]
    fn test_ping_encode() {
        let ping = PingMessage::new(0x1a2b3c4d);
        let bytes = ping.encode().unwrap();
        assert_eq!(bytes, vec![0x02, 0x00, 0x00, 0x08, 0x1a, 0x2b, 0x3c, 0x4d]);
        assert_eq!(PingMessage::decode(&bytes).unwrap(), ping);
    }

    #[test]
    fn test_ping_pong_sequence() {
        let pong = PingMessage::new(0xcacacaca).make_pong();
        assert_eq!(pong.sequence, 0x35353535);

        for sequence in [0u32, 1, 0x8000_0000, 0xdead_beef, u32::MAX] {
            let ping = PingMessage::new(sequence);
            let pong = ping.make_pong();
            assert_eq!(pong.sequence, 0xFFFF_FFFF ^ sequence);
            assert!(pong.answers(&ping));
        }
    }

    #[test]
    fn test_pong_is_not_ping() {
        let bytes = PingMessage::new(1).make_pong().encode().unwrap();
        assert_eq!(
            PingMessage::decode(&bytes).unwrap_err(),
            CodecError::WrongMessageType {
                expected: Command::Ping,
                got: Command::Pong
            }
        );
    }

    #[test]
    fn test_run_encode_layout() {
        let run = RunMessage::new(0x1a2b3c4d, "lorem")
            .with_timeouts(Some(Duration::from_secs(5)), Some(Duration::from_secs(3)));

        let expected = vec![
            0x04, 0x00, 0x00, 0x1e, // header
            0x00, 0x00, 0x00, 0x01, 0x2a, 0x05, 0xf2, 0x00, // problem timeout
            0x00, 0x00, 0x00, 0x00, 0xb2, 0xd0, 0x5e, 0x00, // method timeout
            0x1a, 0x2b, 0x3c, 0x4d, // problem
            0x05, 0x6c, 0x6f, 0x72, 0x65, 0x6d, // method
        ];
        assert_eq!(run.encode().unwrap(), expected);
        assert_eq!(run.encoded_len(), 30);
        assert_eq!(RunMessage::decode(&expected).unwrap(), run);
    }

    #[test]
    fn test_run_round_trip_empty_method() {
        let run = RunMessage::new(42, "");
        assert!(run.is_all_methods());
        let bytes = run.encode().unwrap();
        assert_eq!(bytes.len(), 25);
        let decoded = RunMessage::decode(&bytes).unwrap();
        assert_eq!(decoded, run);
        assert_eq!(decoded.method_timeout(), None);
    }

    #[test]
    fn test_run_negative_timeout_means_none() {
        let mut run = RunMessage::new(1, "a");
        run.problem_timeout_ns = -5;
        let decoded = RunMessage::decode(&run.encode().unwrap()).unwrap();
        assert_eq!(decoded.problem_timeout_ns, -5);
        assert_eq!(decoded.problem_timeout(), None);
    }

    #[test]
    fn test_run_truncated_at_every_offset() {
        let run = RunMessage::new(7, "naive")
            .with_timeouts(Some(Duration::from_millis(5)), Some(Duration::from_millis(1)));
        let bytes = run.encode().unwrap();

        for len in 0..bytes.len() {
            let mut short = vec![0u8; len];
            assert!(
                matches!(run.encode_to(&mut short), Err(CodecError::BufferTooSmall { .. })),
                "encode into {} bytes should fail",
                len
            );
            assert!(
                matches!(
                    RunMessage::decode(&bytes[..len]),
                    Err(CodecError::BufferTooSmall { .. })
                ),
                "decode of {} bytes should fail",
                len
            );
        }
    }

    #[test]
    fn test_run_wrong_type() {
        let bytes = sample_result().encode().unwrap();
        let err = RunMessage::decode(&bytes).unwrap_err();
        assert_eq!(
            err,
            CodecError::WrongMessageType {
                expected: Command::Run,
                got: Command::Result
            }
        );
    }

    #[test]
    fn test_decode_rejects_short_total_length() {
        let err = RunMessage::decode(&[0x04, 0x00, 0x00, 0x02]).unwrap_err();
        assert_eq!(err, CodecError::InvalidLength(2));
    }

    #[test]
    fn test_result_round_trip() {
        let result = sample_result();
        let bytes = result.encode().unwrap();
        assert_eq!(bytes.len(), result.encoded_len());
        assert_eq!(ResultMessage::decode(&bytes).unwrap(), result);
    }

    #[test]
    fn test_result_round_trip_empty() {
        let result = ResultMessage::new();
        let bytes = result.encode().unwrap();
        assert_eq!(bytes, vec![0x05, 0x00, 0x00, 0x09, 0, 0, 0, 0, 0]);
        assert_eq!(ResultMessage::decode(&bytes).unwrap(), result);
    }

    #[test]
    fn test_result_preserves_unknown_flag_bits() {
        let mut result = ResultMessage::new();
        result.push(ResultItem {
            flags: ResultFlags::from_bits(0x8000_0003),
            problem_id: 1,
            method: "m".to_string(),
            result: 0,
            duration_ns: 0,
        });
        let decoded = ResultMessage::decode(&result.encode().unwrap()).unwrap();
        assert_eq!(decoded.items[0].flags.bits(), 0x8000_0003);
        assert!(decoded.items[0].flags.contains(ResultFlags::TIMEOUT));
        assert!(decoded.items[0].flags.contains(ResultFlags::FINISHED));
        assert!(!decoded.items[0].flags.contains(ResultFlags::ERROR));
    }

    #[test]
    fn test_result_truncated_at_every_offset() {
        let result = sample_result();
        let bytes = result.encode().unwrap();

        for len in 0..bytes.len() {
            let mut short = vec![0u8; len];
            assert!(matches!(
                result.encode_to(&mut short),
                Err(CodecError::BufferTooSmall { .. })
            ));
            assert!(matches!(
                ResultMessage::decode(&bytes[..len]),
                Err(CodecError::BufferTooSmall { .. })
            ));
        }
    }

    #[test]
    fn test_result_body_truncated_under_valid_header() {
        // Header claims the frame ends inside the last item
        let mut bytes = sample_result().encode().unwrap();
        let cut = bytes.len() - 15;
        bytes[1..4].copy_from_slice(&(cut as u32).to_be_bytes()[1..]);
        assert!(matches!(
            ResultMessage::decode(&bytes),
            Err(CodecError::BufferTooSmall { .. })
        ));
    }

    #[test]
    fn test_result_huge_count_rejected() {
        let bytes = [0x05, 0x00, 0x00, 0x09, 0xff, 0xff, 0xff, 0xff, 0x00];
        assert!(matches!(
            ResultMessage::decode(&bytes),
            Err(CodecError::BufferTooSmall { .. })
        ));
    }

    #[test]
    fn test_encode_to_larger_buffer() {
        let run = RunMessage::new(3, "x");
        let mut buf = vec![0xaau8; 64];
        let written = run.encode_to(&mut buf).unwrap();
        assert_eq!(written, run.encoded_len());
        assert_eq!(buf[written], 0xaa);
        assert_eq!(RunMessage::decode(&buf).unwrap(), run);
    }

    #[test]
    fn test_method_too_long() {
        let run = RunMessage::new(1, "m".repeat(256));
        assert_eq!(run.encode().unwrap_err(), CodecError::StringTooLong(256));
    }

    #[test]
    fn test_result_too_large() {
        let mut result = ResultMessage::new();
        let item = ResultItem {
            flags: ResultFlags::FINISHED,
            problem_id: 1,
            method: "m".repeat(255),
            result: 0,
            duration_ns: 0,
        };
        for _ in 0..(MAX_FRAME_LEN / item.encoded_len() + 1) {
            result.push(item.clone());
        }
        assert!(matches!(result.encode(), Err(CodecError::FrameTooLarge(_))));
    }
}

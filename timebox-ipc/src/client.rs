//! Synchronous Client
//!
//! One TCP connection per client, strictly request/response: one frame
//! written, then a blocking read of exactly one reply frame. `&mut self` on
//! every call keeps a second request from sharing the connection.

use crate::error::ConnectionError;
use crate::framing::{FrameReader, FrameWriter};
use crate::messages::{PingMessage, PongMessage, ResultMessage, RunMessage};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

pub struct Client {
    reader: FrameReader<TcpStream>,
    writer: FrameWriter<TcpStream>,
    peer: SocketAddr,
}

impl Client {
    /// Connect to the first reachable resolved address
    pub fn connect<A: ToSocketAddrs>(addr: A) -> Result<Self, ConnectionError> {
        let mut last_error = None;
        for candidate in addr.to_socket_addrs()? {
            match TcpStream::connect(candidate) {
                Ok(stream) => return Self::from_stream(stream),
                Err(e) => last_error = Some(e),
            }
        }
        Err(last_error.map_or(ConnectionError::NoAddress, ConnectionError::Io))
    }

    pub fn connect_timeout(addr: &SocketAddr, timeout: Duration) -> Result<Self, ConnectionError> {
        let stream = TcpStream::connect_timeout(addr, timeout)?;
        Self::from_stream(stream)
    }

    fn from_stream(stream: TcpStream) -> Result<Self, ConnectionError> {
        stream.set_nodelay(true)?;
        let peer = stream.peer_addr()?;
        let writer = FrameWriter::new(stream.try_clone()?);
        Ok(Self {
            reader: FrameReader::new(stream),
            writer,
            peer,
        })
    }

    /// Bound how long a reply may take; `None` blocks indefinitely
    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<(), ConnectionError> {
        self.reader.get_ref().set_read_timeout(timeout)?;
        Ok(())
    }

    /// Send one run request and wait for its result frame
    pub fn run(&mut self, request: &RunMessage) -> Result<ResultMessage, ConnectionError> {
        self.writer.write(request)?;
        let result = self.reader.read::<ResultMessage>()?;
        tracing::debug!(
            peer = %self.peer,
            problem = request.problem_id,
            items = result.items.len(),
            "received result"
        );
        Ok(result)
    }

    /// Round-trip a ping and check the pong sequence
    pub fn ping(&mut self, sequence: u32) -> Result<(), ConnectionError> {
        let ping = PingMessage::new(sequence);
        self.writer.write(&ping)?;
        let pong = self.reader.read::<PongMessage>()?;
        if !pong.answers(&ping) {
            return Err(ConnectionError::PongMismatch {
                expected: ping.make_pong().sequence,
                got: pong.sequence,
            });
        }
        Ok(())
    }

    pub fn close(self) {
        let _ = self.reader.get_ref().shutdown(Shutdown::Both);
    }
}

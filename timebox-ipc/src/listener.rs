//! Worker-side Connection
//!
//! Listens for supervisor connections and hands each decoded run request to
//! the execution side over a rendezvous channel, then blocks on a second
//! rendezvous channel for the reply. Both channels have zero capacity, so a
//! connection never has more than one request in flight and the next frame is
//! not read until the previous reply has been written.
//!
//! `WorkerConn` is the I/O half and runs on its own thread; `Handoff` is the
//! execution half owned by the worker service. Dropping either half closes
//! the channel ends it holds.

use crate::error::ConnectionError;
use crate::framing::{frame_command, FrameError, FrameReader, FrameWriter};
use crate::messages::{Command, PingMessage, ResultMessage, RunMessage, WireMessage};
use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::sync::mpsc::{self, Receiver, SyncSender};
use tracing::{debug, info, warn};

/// I/O half: owns the listener and the network ends of both channels
pub struct WorkerConn {
    listener: TcpListener,
    requests: SyncSender<RunMessage>,
    results: Receiver<ResultMessage>,
}

/// Execution half: receives run requests and sends back results
pub struct Handoff {
    requests: Receiver<RunMessage>,
    results: SyncSender<ResultMessage>,
}

impl WorkerConn {
    /// Bind the listener and create both rendezvous channels
    pub fn bind<A: ToSocketAddrs>(addr: A) -> Result<(WorkerConn, Handoff), ConnectionError> {
        let listener = TcpListener::bind(addr)?;
        let (request_tx, request_rx) = mpsc::sync_channel(0);
        let (result_tx, result_rx) = mpsc::sync_channel(0);

        let conn = WorkerConn {
            listener,
            requests: request_tx,
            results: result_rx,
        };
        let handoff = Handoff {
            requests: request_rx,
            results: result_tx,
        };
        Ok((conn, handoff))
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections forever, serving one at a time.
    ///
    /// A failing connection is logged and dropped; the listener keeps
    /// accepting. Returns only when accepting fails or the execution side has
    /// gone away.
    pub fn run_loop(&self) -> Result<(), ConnectionError> {
        loop {
            let (stream, peer) = self.listener.accept()?;
            info!(%peer, "accepted connection");

            match self.serve_connection(stream) {
                Ok(()) => debug!(%peer, "connection closed by peer"),
                Err(ConnectionError::HandoffClosed) => {
                    warn!(%peer, "execution side closed, stopping listener");
                    return Err(ConnectionError::HandoffClosed);
                }
                Err(e) => warn!(%peer, error = %e, "connection aborted"),
            }
        }
    }

    fn serve_connection(&self, stream: TcpStream) -> Result<(), ConnectionError> {
        stream.set_nodelay(true)?;
        let mut reader = FrameReader::new(stream.try_clone()?);
        let mut writer = FrameWriter::new(stream);

        loop {
            let frame = match reader.read_frame() {
                Ok(frame) => frame,
                Err(FrameError::EndOfStream) => return Ok(()),
                Err(e) => return Err(e.into()),
            };

            if frame_command(&frame)? == Command::Ping {
                let ping = PingMessage::decode(&frame)?;
                writer.write(&ping.make_pong())?;
                continue;
            }

            let request = RunMessage::decode(&frame)?;
            debug!(problem = request.problem_id, method = %request.method, "handing off run request");
            self.requests
                .send(request)
                .map_err(|_| ConnectionError::HandoffClosed)?;

            let result = self
                .results
                .recv()
                .map_err(|_| ConnectionError::HandoffClosed)?;
            writer.write(&result)?;
        }
    }

    /// Close the listener and the channel ends held by this half
    pub fn close(self) {
        drop(self);
    }
}

impl Handoff {
    /// Next run request; `None` once the I/O half is gone
    pub fn recv_run(&self) -> Option<RunMessage> {
        self.requests.recv().ok()
    }

    /// Hand a result back to the connection that sent the request
    pub fn send_result(&self, result: ResultMessage) -> Result<(), ConnectionError> {
        self.results
            .send(result)
            .map_err(|_| ConnectionError::HandoffClosed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::Client;
    use crate::framing::write_frame;
    use crate::messages::{ResultFlags, ResultItem};
    use std::io::Write;
    use std::thread;

    /// Spawn the I/O loop plus an echo executor that answers every request
    fn spawn_echo_worker() -> SocketAddr {
        let (conn, handoff) = WorkerConn::bind("127.0.0.1:0").unwrap();
        let addr = conn.local_addr().unwrap();
        thread::spawn(move || conn.run_loop());
        thread::spawn(move || {
            while let Some(request) = handoff.recv_run() {
                let mut result = ResultMessage::new();
                result.push(ResultItem {
                    flags: ResultFlags::FINISHED,
                    problem_id: request.problem_id,
                    method: request.method.clone(),
                    result: i64::from(request.problem_id) * 2,
                    duration_ns: 1,
                });
                if handoff.send_result(result).is_err() {
                    break;
                }
            }
        });
        addr
    }

    #[test]
    fn test_request_response() {
        let addr = spawn_echo_worker();
        let mut client = Client::connect(addr).unwrap();

        for id in 1..=3u32 {
            let result = client.run(&RunMessage::new(id, "naive")).unwrap();
            assert_eq!(result.items.len(), 1);
            assert_eq!(result.items[0].problem_id, id);
            assert_eq!(result.items[0].result, i64::from(id) * 2);
        }
        client.close();
    }

    #[test]
    fn test_ping_answered_by_connection_layer() {
        let addr = spawn_echo_worker();
        let mut client = Client::connect(addr).unwrap();
        client.ping(0x1234_5678).unwrap();
        client.ping(0).unwrap();
    }

    #[test]
    fn test_bad_frame_drops_only_that_connection() {
        let addr = spawn_echo_worker();

        let mut bad = TcpStream::connect(addr).unwrap();
        write_frame(&mut bad, &ResultMessage::new()).unwrap();
        bad.flush().unwrap();
        let mut reader = FrameReader::new(bad);
        assert!(reader.read_frame().is_err());

        let mut client = Client::connect(addr).unwrap();
        let result = client.run(&RunMessage::new(4, "")).unwrap();
        assert_eq!(result.items[0].result, 8);
    }

    #[test]
    fn test_run_loop_stops_when_handoff_dropped() {
        let (conn, handoff) = WorkerConn::bind("127.0.0.1:0").unwrap();
        let addr = conn.local_addr().unwrap();
        drop(handoff);
        let io = thread::spawn(move || conn.run_loop());

        let mut client = Client::connect(addr).unwrap();
        assert!(client.run(&RunMessage::new(1, "a")).is_err());
        assert!(matches!(io.join().unwrap(), Err(ConnectionError::HandoffClosed)));
    }
}

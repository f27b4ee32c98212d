//! Run Client
//!
//! Supervisor-side wrapper over the raw connection: carries the timeouts to
//! send with every request and converts replies into `RunResult`s.

use crate::result::RunResult;
use std::net::SocketAddr;
use std::time::Duration;
use timebox_ipc::{Client, ConnectionError, RunMessage};

pub struct RunClient {
    client: Client,
    problem_timeout: Option<Duration>,
    method_timeout: Option<Duration>,
    sequence: u32,
}

impl RunClient {
    pub fn connect(host: &str, port: u16) -> Result<Self, ConnectionError> {
        Ok(Self::from_client(Client::connect((host, port))?))
    }

    pub fn connect_timeout(addr: &SocketAddr, timeout: Duration) -> Result<Self, ConnectionError> {
        Ok(Self::from_client(Client::connect_timeout(addr, timeout)?))
    }

    fn from_client(client: Client) -> Self {
        Self {
            client,
            problem_timeout: None,
            method_timeout: None,
            sequence: 0,
        }
    }

    pub fn set_timeouts(&mut self, problem: Option<Duration>, method: Option<Duration>) {
        self.problem_timeout = problem;
        self.method_timeout = method;
    }

    /// Bound the wait for any single reply
    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<(), ConnectionError> {
        self.client.set_read_timeout(timeout)
    }

    /// Run `method` of `problem_id`; an empty method runs all of them
    pub fn run(&mut self, problem_id: u32, method: &str) -> Result<RunResult, ConnectionError> {
        let request = RunMessage::new(problem_id, method)
            .with_timeouts(self.problem_timeout, self.method_timeout);
        let reply = self.client.run(&request)?;
        Ok(RunResult::from(reply))
    }

    pub fn ping(&mut self) -> Result<(), ConnectionError> {
        self.sequence = self.sequence.wrapping_add(1);
        self.client.ping(self.sequence)
    }

    pub fn close(self) {
        self.client.close();
    }
}

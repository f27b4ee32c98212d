//! Worker Service
//!
//! The worker side of the supervisor-worker architecture. One thread owns the
//! TCP listener (`WorkerConn::run_loop`); the calling thread pulls run requests
//! off the handoff channel, runs them under the requested deadlines and hands
//! exactly one result back per request.

use crate::registry::ProblemRegistry;
use crate::result::{ResultItem, RunResult};
use crate::run_info::ProblemRunInfo;
use crate::runner::{RunError, Runner, TimeoutLimits};
use std::io;
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use thiserror::Error;
use timebox_ipc::{ConnectionError, Handoff, RunMessage, WorkerConn};
use tracing::{error, info, warn};

/// Time given to the I/O thread to flush the last reply before a fail-fast exit
pub const FAIL_FAST_GRACE: Duration = Duration::from_millis(100);

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("connection error: {0}")]
    Connection(#[from] ConnectionError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("worker is already serving")]
    AlreadyServing,
}

/// Why `process` returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerExit {
    /// The connection side went away
    Closed,
    /// A method failed unexpectedly; the process should exit non-zero
    FailFast,
}

pub struct Worker {
    conn: Option<WorkerConn>,
    handoff: Handoff,
    runner: Runner,
    local_addr: SocketAddr,
}

impl Worker {
    /// Bind the listener; nothing is accepted until `serve`
    pub fn bind<A: ToSocketAddrs>(addr: A, registry: Arc<ProblemRegistry>) -> Result<Self, WorkerError> {
        let (conn, handoff) = WorkerConn::bind(addr)?;
        let local_addr = conn.local_addr()?;
        Ok(Self {
            conn: Some(conn),
            handoff,
            runner: Runner::new(registry),
            local_addr,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Start the accept loop on its own thread
    pub fn serve(&mut self) -> Result<JoinHandle<Result<(), ConnectionError>>, WorkerError> {
        let conn = self.conn.take().ok_or(WorkerError::AlreadyServing)?;
        info!(addr = %self.local_addr, "waiting for connection");
        let handle = thread::Builder::new()
            .name("timebox-io".to_string())
            .spawn(move || conn.run_loop())?;
        Ok(handle)
    }

    /// Answer run requests until the connection side closes or a method fails
    pub fn process(&self) -> WorkerExit {
        while let Some(request) = self.handoff.recv_run() {
            info!(
                problem = request.problem_id,
                method = %request.method,
                problem_timeout = ?request.problem_timeout(),
                method_timeout = ?request.method_timeout(),
                "run problem"
            );

            let outcome = self.handle_run(&request);
            let fail_fast = matches!(&outcome, Err(e) if e.is_internal());
            let reply = reply_for(&request, outcome);

            if let Err(e) = self.handoff.send_result(reply.to_message()) {
                warn!(error = %e, "could not hand back result");
                return WorkerExit::Closed;
            }

            if fail_fast {
                error!(message = %reply.message, "method failed, worker exiting");
                thread::sleep(FAIL_FAST_GRACE);
                return WorkerExit::FailFast;
            }
        }
        WorkerExit::Closed
    }

    /// Run one request under the deadlines it carries
    pub fn handle_run(&self, request: &RunMessage) -> Result<RunResult, RunError> {
        let info = ProblemRunInfo::new(request.problem_id, request.method.clone());
        let limits = TimeoutLimits::new(request.problem_timeout(), request.method_timeout());
        self.runner.run_problem_with_timeout(&info, limits)
    }

    /// `serve` followed by `process`
    pub fn run(mut self) -> Result<WorkerExit, WorkerError> {
        let _io = self.serve()?;
        Ok(self.process())
    }
}

/// Build the single reply for a request, whatever its outcome
fn reply_for(request: &RunMessage, outcome: Result<RunResult, RunError>) -> RunResult {
    let err = match outcome {
        Ok(result) => return result,
        Err(e) => e,
    };
    warn!(problem = request.problem_id, method = %request.method, error = %err, "run failed");

    let message = err.to_string();
    let mut reply = match err {
        RunError::Timeout { partial, .. } => partial,
        RunError::MethodPanicked { problem, method, .. } => {
            let mut reply = RunResult::new();
            reply.push(ResultItem::error(problem, method, Duration::ZERO));
            reply
        }
        RunError::Spawn(_) => {
            let mut reply = RunResult::new();
            reply.push(ResultItem::error(request.problem_id, request.method.as_str(), Duration::ZERO));
            reply
        }
        RunError::NoSuchProblem(_) | RunError::NoSuchSolution { .. } => RunResult::new(),
    };
    reply.message = message;
    reply
}

//! Supervisor Process
//!
//! Spawns a worker process listening on a local TCP port, sends it run
//! requests, and replaces it whenever a request times out. A timed-out
//! computation cannot be stopped inside the worker, so the whole process is
//! killed and a fresh one started before the next request.

use crate::config::SupervisorConfig;
use crate::plan::{build_plan, ExecutionPlan, PlanEntry};
use crate::report::ProblemOutcome;
use std::ffi::OsString;
use std::io;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;
use timebox_core::{ProblemRegistry, ProblemRunInfo, RunClient, RunError, RunResult};
use timebox_ipc::ConnectionError;
use tracing::{debug, info, warn};

/// Interval between liveness checks while a fresh worker starts up
const STARTUP_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Interval between connection attempts to a started worker
const CONNECT_RETRY_INTERVAL: Duration = Duration::from_millis(20);

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("failed to spawn worker: {0}")]
    SpawnFailed(#[from] io::Error),

    #[error("no worker started after {attempts} attempts (last port {last_port})")]
    NoWorkerStarted { attempts: u32, last_port: u16 },

    #[error("could not connect to worker on port {port}: {source}")]
    Connect {
        port: u16,
        #[source]
        source: ConnectionError,
    },

    #[error("IPC error: {0}")]
    Ipc(#[from] ConnectionError),
}

/// How to launch a worker process
#[derive(Debug, Clone)]
pub struct WorkerCommand {
    program: PathBuf,
    extra_args: Vec<OsString>,
}

impl WorkerCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            extra_args: Vec::new(),
        }
    }

    /// The running executable, re-invoked in worker mode
    pub fn current_exe() -> io::Result<Self> {
        Ok(Self::new(std::env::current_exe()?))
    }

    /// Argument placed before the `worker` subcommand
    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.extra_args.push(arg.into());
        self
    }

    fn command(&self, host: &str, port: u16, debug: bool) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(&self.extra_args)
            .arg("worker")
            .arg("--host")
            .arg(host)
            .arg("--port")
            .arg(port.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(if debug { Stdio::inherit() } else { Stdio::null() });
        command
    }
}

/// Worker process handle
pub struct WorkerProcess {
    child: Child,
    port: u16,
}

impl WorkerProcess {
    pub fn spawn(command: &WorkerCommand, host: &str, port: u16, debug: bool) -> io::Result<Self> {
        let child = command.command(host, port, debug).spawn()?;
        Ok(Self { child, port })
    }

    pub fn pid(&self) -> u32 {
        self.child.id()
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Check if worker process is still running
    pub fn is_alive(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    /// Kill and reap; calling it again is a no-op
    pub fn kill(&mut self) -> io::Result<()> {
        if self.child.try_wait()?.is_some() {
            return Ok(());
        }
        self.child.kill()?;
        self.child.wait()?;
        Ok(())
    }
}

impl Drop for WorkerProcess {
    fn drop(&mut self) {
        if self.is_alive() {
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}

/// Drives one worker at a time, respawning it after every timeout
pub struct Supervisor {
    config: SupervisorConfig,
    command: WorkerCommand,
    registry: Arc<ProblemRegistry>,
    port: u16,
    worker: Option<WorkerProcess>,
    client: Option<RunClient>,
}

impl Supervisor {
    pub fn new(config: SupervisorConfig, command: WorkerCommand, registry: Arc<ProblemRegistry>) -> Self {
        let port = config.port_range_start;
        Self {
            config,
            command,
            registry,
            port,
            worker: None,
            client: None,
        }
    }

    /// Port of the current (or next) worker
    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn worker_pid(&self) -> Option<u32> {
        self.worker.as_ref().map(WorkerProcess::pid)
    }

    pub fn registry(&self) -> &Arc<ProblemRegistry> {
        &self.registry
    }

    /// Spawn a worker on `port` and wait out the startup grace.
    ///
    /// `None` means the process exited during the grace period, usually
    /// because the port was already taken.
    pub fn start_worker(&self, port: u16) -> Result<Option<WorkerProcess>, SupervisorError> {
        let mut worker = WorkerProcess::spawn(&self.command, &self.config.host, port, self.config.debug)?;
        let grace = self.config.startup_grace();
        let start = Instant::now();

        while start.elapsed() < grace {
            if !worker.is_alive() {
                warn!(port, pid = worker.pid(), "failed to start background worker");
                return Ok(None);
            }
            thread::sleep(STARTUP_POLL_INTERVAL.min(grace.saturating_sub(start.elapsed())));
        }

        if !worker.is_alive() {
            warn!(port, pid = worker.pid(), "failed to start background worker");
            return Ok(None);
        }

        info!(port, pid = worker.pid(), "started background worker");
        Ok(Some(worker))
    }

    /// Start a worker, rotating through the port range, and connect to it
    pub fn connect(&mut self) -> Result<(), SupervisorError> {
        let mut attempts = 0;
        let mut worker = loop {
            attempts += 1;
            if let Some(worker) = self.start_worker(self.port)? {
                break worker;
            }

            let last_port = self.port;
            self.port = self.config.next_port(last_port);
            if attempts >= self.config.max_spawn_attempts {
                return Err(SupervisorError::NoWorkerStarted { attempts, last_port });
            }
        };

        match self.connect_client() {
            Ok(client) => {
                self.worker = Some(worker);
                self.client = Some(client);
                Ok(())
            }
            Err(source) => {
                let _ = worker.kill();
                let port = self.port;
                self.port = self.config.next_port(port);
                Err(SupervisorError::Connect { port, source })
            }
        }
    }

    fn connect_client(&self) -> Result<RunClient, ConnectionError> {
        let deadline = Instant::now() + self.config.connect_timeout();
        let mut client = loop {
            match RunClient::connect(&self.config.host, self.port) {
                Ok(client) => break client,
                Err(e) if Instant::now() >= deadline => return Err(e),
                Err(e) => {
                    debug!(port = self.port, error = %e, "worker not accepting yet");
                    thread::sleep(CONNECT_RETRY_INTERVAL);
                }
            }
        };

        // A worker that stops answering fails the request instead of blocking the batch
        client.set_read_timeout(self.config.reply_timeout())?;
        client.ping()?;
        client.set_timeouts(self.config.problem_timeout(), self.config.method_timeout());
        Ok(client)
    }

    /// Close the connection and kill the worker, if any
    pub fn shutdown(&mut self) {
        if let Some(client) = self.client.take() {
            client.close();
        }
        if let Some(mut worker) = self.worker.take() {
            if let Err(e) = worker.kill() {
                warn!(pid = worker.pid(), error = %e, "failed to stop worker");
            }
        }
    }

    /// Replace the current worker with a fresh one
    pub fn restart(&mut self) -> Result<(), SupervisorError> {
        info!(port = self.port, pid = ?self.worker_pid(), "restarting worker");
        self.shutdown();
        thread::sleep(self.config.respawn_pause());
        self.connect()
    }

    /// Run one method on the worker, retrying once on a fresh worker if the
    /// transport fails
    pub fn run_method(&mut self, problem_id: u32, method: &str) -> Result<RunResult, SupervisorError> {
        match self.try_run(problem_id, method) {
            Ok(result) => Ok(result),
            Err(e) => {
                warn!(problem = problem_id, method, error = %e, "run failed, retrying on a fresh worker");
                self.restart()?;
                self.try_run(problem_id, method)
            }
        }
    }

    fn try_run(&mut self, problem_id: u32, method: &str) -> Result<RunResult, SupervisorError> {
        if self.client.is_none() {
            self.connect()?;
        }
        match self.client.as_mut() {
            Some(client) => Ok(client.run(problem_id, method)?),
            None => Err(SupervisorError::NoWorkerStarted {
                attempts: 0,
                last_port: self.port,
            }),
        }
    }

    /// Run every planned method of one problem, restarting after timeouts
    pub fn run_entry(&mut self, entry: &PlanEntry) -> Result<ProblemOutcome, SupervisorError> {
        let mut result = RunResult::new();

        for method in &entry.methods {
            let run = self.run_method(entry.problem_id, method)?;
            let timed_out = run.has_timeout();
            let failed = run.has_error();
            result.append(run);

            if timed_out {
                info!(problem = entry.problem_id, method = %method, "timeout detected");
                self.restart()?;
            } else if failed {
                debug!(problem = entry.problem_id, method = %method, "worker reported an error");
            }
        }

        Ok(match self.registry.get(entry.problem_id) {
            Some(problem) => ProblemOutcome::new(problem, result),
            None => ProblemOutcome::missing(
                entry.problem_id,
                RunError::NoSuchProblem(entry.problem_id).to_string(),
            ),
        })
    }

    /// Run a whole batch; no selectors means every registered problem
    pub fn run_batch(&mut self, infos: &[ProblemRunInfo]) -> Result<Vec<ProblemOutcome>, SupervisorError> {
        let plan = build_plan(&self.registry, infos);
        self.run_plan(&plan, |_| {})
    }

    /// Run every entry of `plan` in order, calling `on_outcome` as each
    /// problem completes. Unknown ids are reported last.
    pub fn run_plan<F>(
        &mut self,
        plan: &ExecutionPlan,
        mut on_outcome: F,
    ) -> Result<Vec<ProblemOutcome>, SupervisorError>
    where
        F: FnMut(&ProblemOutcome),
    {
        let mut outcomes = Vec::with_capacity(plan.entries.len() + plan.unknown.len());

        for entry in &plan.entries {
            let outcome = self.run_entry(entry)?;
            on_outcome(&outcome);
            outcomes.push(outcome);
        }
        for &id in &plan.unknown {
            outcomes.push(ProblemOutcome::missing(id, RunError::NoSuchProblem(id).to_string()));
        }

        Ok(outcomes)
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

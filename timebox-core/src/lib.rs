//! Timebox Core
//!
//! Problem model, registry, timeout-racing runner and the worker service that
//! answers run requests arriving over the IPC connection.

mod client;
mod problem;
mod registry;
mod result;
mod run_info;
mod runner;
mod worker;

pub use client::RunClient;
pub use problem::{Answer, Problem, Solution};
pub use registry::{ProblemRegistry, RegistryError};
pub use result::{ResultItem, RunResult};
pub use run_info::{ParseRunInfoError, ProblemRunInfo};
pub use runner::{RunError, Runner, TimeoutLimits};
pub use worker::{Worker, WorkerError, WorkerExit, FAIL_FAST_GRACE};

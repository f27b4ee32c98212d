#![allow(dead_code)]

#[path = "../../src/bin/timebox-fixture-worker/fixtures.rs"]
pub mod fixtures;

use std::net::TcpListener;
use std::sync::Arc;
use timebox_cli::{SupervisorConfig, WorkerCommand};
use timebox_core::ProblemRegistry;

pub const FIXTURE_BIN: &str = env!("CARGO_BIN_EXE_timebox-fixture-worker");

/// A port that was free a moment ago
pub fn free_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .and_then(|l| l.local_addr())
        .map(|a| a.port())
        .unwrap()
}

pub fn registry() -> Arc<ProblemRegistry> {
    Arc::new(ProblemRegistry::import(fixtures::problems()).unwrap())
}

pub fn worker_command() -> WorkerCommand {
    WorkerCommand::new(FIXTURE_BIN)
}

/// Config over a small private port range with tight timeouts
pub fn test_config(method_timeout_ms: u64) -> SupervisorConfig {
    let start = free_port();
    SupervisorConfig {
        port_range_start: start,
        port_range_end: start.saturating_add(20),
        max_spawn_attempts: 10,
        connect_timeout_ms: 5000,
        problem_timeout_ms: 0,
        method_timeout_ms,
        ..SupervisorConfig::default()
    }
}

//! Timebox CLI - Problem Supervisor
//!
//! The supervisor process that runs problems in disposable workers.

fn main() -> anyhow::Result<()> {
    timebox_cli::run()
}

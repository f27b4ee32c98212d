//! Test fixture: the timebox CLI over a problem set with known-bad methods.
//!
//! Integration tests spawn this binary in worker mode so that hanging and
//! crashing methods can be exercised without touching the real catalogue.

mod fixtures;

use timebox_cli::{Cli, Parser};

fn main() -> anyhow::Result<()> {
    timebox_cli::run_with_cli(Cli::parse(), fixtures::problems())
}

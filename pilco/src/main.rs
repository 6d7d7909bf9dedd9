//! # PILCO Runtime
//!
//! Entry point for the learning binary. Loads a scenario (the built-in
//! cart-pole swing-up unless `--scenario` is given), applies command-line
//! overrides and runs the learning loop.

mod app;

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

/// Learn a cart-pole swing-up controller from a few trials.
#[derive(Parser, Debug)]
#[command(version, about)]
pub struct Args {
    /// Scenario JSON file; the built-in cart-pole scenario when omitted.
    #[arg(long)]
    scenario: Option<PathBuf>,
    /// Number of policy-learning iterations after the random rollouts.
    #[arg(long)]
    iterations: Option<usize>,
    /// Seed for the initial policy, rollouts and measurement noise.
    #[arg(long)]
    seed: Option<u64>,
    /// Line searches per policy optimisation.
    #[arg(long)]
    line_searches: Option<usize>,
    /// Print the resolved scenario as JSON and exit.
    #[arg(long)]
    dump_config: bool,
    /// Write the per-iteration reports to this file as JSON.
    #[arg(long)]
    report: Option<PathBuf>,
}

fn main() -> Result<()> {
    app::run(Args::parse())
}

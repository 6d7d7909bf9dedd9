//! # Application Logic
//!
//! Resolves the scenario, drives the [`rl::Learner`] and reports what each
//! iteration predicted against what the plant did.

use anyhow::{Context, Result};
use rl::{Learner, Scenario};

use crate::Args;

fn load_scenario(args: &Args) -> Result<Scenario> {
    let mut scenario = match &args.scenario {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("reading scenario {}", path.display()))?;
            Scenario::from_json(&json).with_context(|| format!("parsing scenario {}", path.display()))?
        }
        None => Scenario::cart_pole(),
    };
    if let Some(iterations) = args.iterations {
        scenario.learning.iterations = iterations;
    }
    if let Some(seed) = args.seed {
        scenario.seed = seed;
    }
    if let Some(line_searches) = args.line_searches {
        scenario.learning.policy_line_searches = line_searches;
    }
    Ok(scenario)
}

/// Runs the random rollouts and every learning iteration of the scenario.
///
/// # Errors
///
/// Returns any error raised while loading the scenario, learning or writing
/// the report.
pub fn run(args: Args) -> Result<()> {
    tracing_subscriber::fmt::init();

    let scenario = load_scenario(&args)?;
    if args.dump_config {
        println!("{}", scenario.to_json()?);
        return Ok(());
    }

    tracing::info!(
        iterations = scenario.learning.iterations,
        horizon = scenario.learning.horizon,
        seed = scenario.seed,
        "starting policy search"
    );
    let mut learner = Learner::new(scenario)?;
    let reports = learner.run()?;

    for report in &reports {
        tracing::info!(
            "Iteration {}: predicted cost {:.3}, realized cost {:.3}",
            report.iteration,
            report.predicted_total(),
            report.realized_total()
        );
    }

    if let Some(path) = &args.report {
        std::fs::write(path, serde_json::to_string_pretty(&reports)?)
            .with_context(|| format!("writing report {}", path.display()))?;
        tracing::info!("Report written to {}", path.display());
    }
    Ok(())
}

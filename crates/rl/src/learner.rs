use ml::{minimize, MinimizeOptions, RbfPolicy};
use moments::Gaussian;
use nalgebra::DVector;
use tracing::{info, warn};

use crate::error::PilcoError;
use crate::propagate::TrajectoryPropagator;

/// Outcome of one policy search.
#[derive(Clone, Debug)]
pub struct LearnReport {
    pub policy: RbfPolicy,
    /// Predicted cost after every successful line search.
    pub values: Vec<f64>,
    pub evaluations: usize,
    pub line_searches: usize,
    /// Candidate points rejected as numerically infeasible.
    pub rejected: usize,
}

impl LearnReport {
    pub fn value(&self) -> f64 {
        self.values.last().copied().unwrap_or(f64::INFINITY)
    }
}

/// Minimises the predicted cost over the policy parameters.
pub struct PolicyLearner<'a> {
    propagator: &'a TrajectoryPropagator<'a>,
    starts: &'a [Gaussian],
    options: MinimizeOptions,
}

impl<'a> PolicyLearner<'a> {
    pub fn new(
        propagator: &'a TrajectoryPropagator<'a>,
        starts: &'a [Gaussian],
        line_searches: usize,
        evals_per_search: usize,
    ) -> Self {
        let options = MinimizeOptions {
            length: i64::try_from(line_searches).unwrap_or(i64::MAX),
            evals_per_search,
            ..MinimizeOptions::default()
        };
        Self { propagator, starts, options }
    }

    /// Predicted cost of `policy` with its parameters replaced by `theta`,
    /// and the gradient.
    ///
    /// # Errors
    /// Any propagation failure, and `DimensionMismatch` for a wrongly sized
    /// `theta`.
    pub fn value(&self, policy: &RbfPolicy, theta: &DVector<f64>) -> Result<(f64, DVector<f64>), PilcoError> {
        let candidate = policy.with_parameters(theta)?;
        self.propagator.expected_cost(&candidate, self.starts)
    }

    /// Searches from the current parameters of `policy`.
    ///
    /// Infeasible candidates (an invalid belief or a singular kernel along
    /// the way) count as infinite cost so the line search backs off.
    ///
    /// # Errors
    /// The first error that does not mark an infeasible point, and
    /// `InvalidStart` when the current parameters are infeasible.
    pub fn learn(&self, policy: &RbfPolicy) -> Result<LearnReport, PilcoError> {
        let mut fatal = None;
        let mut rejected = 0;
        let result = minimize(
            policy.parameters(),
            |theta| match self.value(policy, theta) {
                Ok(v) => v,
                Err(e) if e.is_invalid_point() => {
                    warn!(error = %e, "rejected policy parameters");
                    rejected += 1;
                    (f64::INFINITY, DVector::zeros(theta.len()))
                }
                Err(e) => {
                    fatal.get_or_insert(e);
                    (f64::NAN, DVector::zeros(theta.len()))
                }
            },
            &self.options,
        );
        if let Some(e) = fatal {
            return Err(e);
        }
        let found = result?;
        let learned = policy.with_parameters(&found.x)?;
        info!(
            value = found.value(),
            line_searches = found.line_searches,
            evaluations = found.evaluations,
            rejected,
            "learned policy"
        );
        Ok(LearnReport {
            policy: learned,
            values: found.values,
            evaluations: found.evaluations,
            line_searches: found.line_searches,
            rejected,
        })
    }
}

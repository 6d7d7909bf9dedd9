//! Moment-matched prediction of the closed loop over the horizon, with the
//! derivative of the accumulated cost with respect to the policy parameters.

use ml::{GpDynamics, RbfPolicy};
use moments::{symmetrize, AngleAugment, Gaussian, Tangent};
use nalgebra::{DMatrix, DVector};
use rayon::prelude::*;
use tracing::debug;

use crate::cost::CostModel;
use crate::error::PilcoError;
use crate::scenario::{IndexSets, CONTROL_DIM, STATE_DIM};

/// Predicted closed loop from one start belief.
#[derive(Clone, Debug)]
pub struct Trajectory {
    /// `H + 1` beliefs over the raw state, the start belief first.
    pub beliefs: Vec<Gaussian>,
    /// Expected immediate cost of every belief, undiscounted.
    pub costs: Vec<f64>,
    pub cost_variances: Vec<f64>,
    /// `Σ_t γ^t E[c(x_t)]`
    pub total: f64,
    /// Derivative of `total` with respect to the policy parameters.
    pub gradient: DVector<f64>,
}

impl Trajectory {
    pub fn cost_std(&self) -> Vec<f64> {
        self.cost_variances.iter().map(|v| v.max(0.0).sqrt()).collect()
    }
}

pub struct TrajectoryPropagator<'a> {
    dynamics: &'a GpDynamics,
    cost: &'a CostModel,
    indices: &'a IndexSets,
    augment: AngleAugment,
    horizon: usize,
    gamma: f64,
}

impl<'a> TrajectoryPropagator<'a> {
    /// # Errors
    /// `Configuration` when the dynamics model or cost do not match the
    /// index sets.
    pub fn new(
        dynamics: &'a GpDynamics,
        cost: &'a CostModel,
        indices: &'a IndexSets,
        horizon: usize,
        gamma: f64,
    ) -> Result<Self, PilcoError> {
        if dynamics.input_dim() != indices.dynamics_inputs.len() + CONTROL_DIM || dynamics.output_dim() != STATE_DIM {
            return Err(PilcoError::Configuration(format!(
                "dynamics model maps {} inputs to {} outputs, index sets need {} to {STATE_DIM}",
                dynamics.input_dim(),
                dynamics.output_dim(),
                indices.dynamics_inputs.len() + CONTROL_DIM
            )));
        }
        if cost.state_dim() != STATE_DIM {
            return Err(PilcoError::Configuration(format!("cost over {} coordinates", cost.state_dim())));
        }
        Ok(Self { dynamics, cost, indices, augment: AngleAugment::new(indices.angles.clone()), horizon, gamma })
    }

    pub fn horizon(&self) -> usize {
        self.horizon
    }

    /// Maps `[x; sin/cos; u; Δ]` to the next raw state, adding `Δ` to the
    /// current value for difference targets.
    fn next_state_map(&self, dim: usize) -> DMatrix<f64> {
        let delta = self.indices.augmented_dim() + CONTROL_DIM;
        let mut a = DMatrix::zeros(STATE_DIM, dim);
        for i in 0..STATE_DIM {
            a[(i, delta + i)] = 1.0;
        }
        for &i in &self.indices.difference_targets {
            a[(i, i)] = 1.0;
        }
        a
    }

    /// Advances `belief` by one control interval and carries the tangents of
    /// the belief along every policy parameter.
    ///
    /// # Errors
    /// Any failure of the augmentation, the policy or the dynamics model.
    pub fn step(
        &self,
        policy: &RbfPolicy,
        belief: &Gaussian,
        tangents: &[Tangent],
    ) -> Result<(Gaussian, Vec<Tangent>), PilcoError> {
        let poli = &self.indices.policy_inputs;
        let dyni = self.indices.dynamics_with_control();

        let (joint, joint_jacobian) = self.augment.joint(belief)?;
        let control = policy.evaluate(&joint.marginal(poli))?;
        let with_control = joint.augment(poli, &control.moments);
        let delta = self.dynamics.predict(&with_control.marginal(&dyni))?;
        let full = with_control.augment(&dyni, &delta.moments);

        let a = self.next_state_map(full.dim());
        let next = Gaussian { mean: &a * &full.mean, cov: symmetrize(&(&a * &full.cov * a.transpose())) };

        let next_tangents = tangents
            .iter()
            .zip(&control.parameter_tangents)
            .map(|(t, direct)| {
                let t_joint = joint_jacobian.push(t).as_tangent();
                let mut d_control = control.jacobian.push(&t_joint.select(poli));
                d_control.accumulate(direct);
                let t_control = joint.augment_tangent(poli, &control.moments, &t_joint, &d_control);
                let d_delta = delta.jacobian.push(&t_control.select(&dyni));
                let t_full = with_control.augment_tangent(&dyni, &delta.moments, &t_control, &d_delta);
                Tangent { mean: &a * &t_full.mean, cov: symmetrize(&(&a * &t_full.cov * a.transpose())) }
            })
            .collect();
        Ok((next, next_tangents))
    }

    /// Predicts `horizon` steps from `start` and accumulates the discounted
    /// expected cost of every belief, the start belief included:
    /// `total = sum over t in 0..=H of gamma^t E[c(B_t)]`, where `B_0` is
    /// `start` and `B_{t+1}` is the prediction from `B_t`.
    ///
    /// # Errors
    /// `Propagation` wrapping the first failure, tagged with its step.
    pub fn run(&self, policy: &RbfPolicy, start: &Gaussian) -> Result<Trajectory, PilcoError> {
        let p = policy.parameter_count();
        let mut belief = start.clone();
        let mut tangents = vec![Tangent::zeros(start.dim()); p];
        let mut out = Trajectory {
            beliefs: Vec::with_capacity(self.horizon + 1),
            costs: Vec::with_capacity(self.horizon + 1),
            cost_variances: Vec::with_capacity(self.horizon + 1),
            total: 0.0,
            gradient: DVector::zeros(p),
        };
        let mut discount = 1.0;
        for t in 0..=self.horizon {
            let at_step = |e: PilcoError| PilcoError::Propagation { step: t, source: Box::new(e) };
            belief.validate().map_err(|e| at_step(e.into()))?;
            let c = self.cost.evaluate(&belief).map_err(at_step)?;
            out.total += discount * c.mean;
            for (g, tangent) in out.gradient.iter_mut().zip(&tangents) {
                *g += discount * c.gradient.dot(tangent);
            }
            debug!(step = t, cost = c.mean, variance = c.variance, "propagated belief");
            out.costs.push(c.mean);
            out.cost_variances.push(c.variance);
            if t < self.horizon {
                let (next, next_tangents) = self.step(policy, &belief, &tangents).map_err(at_step)?;
                out.beliefs.push(std::mem::replace(&mut belief, next));
                tangents = next_tangents;
            }
            discount *= self.gamma;
        }
        out.beliefs.push(belief);
        Ok(out)
    }

    /// Average of [`TrajectoryPropagator::run`] over several start beliefs,
    /// evaluated in parallel. Returns the total cost and its gradient.
    ///
    /// # Errors
    /// The first failing run's error, or `Configuration` without starts.
    pub fn expected_cost(&self, policy: &RbfPolicy, starts: &[Gaussian]) -> Result<(f64, DVector<f64>), PilcoError> {
        if starts.is_empty() {
            return Err(PilcoError::Configuration("no start beliefs to predict from".into()));
        }
        let runs: Vec<Trajectory> =
            starts.par_iter().map(|start| self.run(policy, start)).collect::<Result<_, _>>()?;
        #[allow(clippy::cast_precision_loss)]
        let n = runs.len() as f64;
        let total = runs.iter().map(|r| r.total).sum::<f64>() / n;
        let gradient =
            runs.iter().fold(DVector::<f64>::zeros(policy.parameter_count()), |acc, r| acc + &r.gradient) / n;
        Ok((total, gradient))
    }
}

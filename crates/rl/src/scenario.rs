//! Static configuration of a learning run, loaded once and validated before
//! any rollout starts.

use ml::{RbfPolicyConfig, TrainOptions};
use moments::Gaussian;
use nalgebra::{DMatrix, DVector};
use physics::{CartPole, CartPoleParams};
use serde::{Deserialize, Serialize};

use crate::error::PilcoError;

/// Dimension of the cart-pole state `[x, v, dθ, θ]`.
pub const STATE_DIM: usize = 4;
/// Dimension of the cart-pole control (horizontal force).
pub const CONTROL_DIM: usize = 1;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    pub plant: PlantConfig,
    pub indices: IndexSets,
    /// Initial state beliefs. The first one is also the distribution real
    /// rollouts start from; the predicted cost averages over all of them.
    pub starts: Vec<BeliefConfig>,
    pub policy: RbfPolicyConfig,
    pub cost: CostConfig,
    pub learning: LearningConfig,
    #[serde(default)]
    pub seed: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlantConfig {
    /// Sampling interval in seconds.
    pub dt: f64,
    /// RK4 substeps per sampling interval.
    pub substeps: usize,
    pub cart_mass: f64,
    pub pole_mass: f64,
    pub pole_length: f64,
    pub friction: f64,
    pub gravity: f64,
    /// Standard deviation of the measurement noise per state coordinate.
    pub noise_std: Vec<f64>,
}

/// Index sets into the augmented state `[x; sin/cos of every angle]`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IndexSets {
    /// Raw state coordinates represented by `(sin, cos)`.
    pub angles: Vec<usize>,
    /// Augmented coordinates fed to the dynamics model, before the control.
    pub dynamics_inputs: Vec<usize>,
    /// Augmented coordinates fed to the policy.
    pub policy_inputs: Vec<usize>,
    /// Raw coordinates learned as differences rather than next values.
    pub difference_targets: Vec<usize>,
}

impl IndexSets {
    pub fn augmented_dim(&self) -> usize {
        STATE_DIM + 2 * self.angles.len()
    }

    /// Dynamics-model inputs within `[x; sin/cos; u]`, the control last.
    pub fn dynamics_with_control(&self) -> Vec<usize> {
        let mut idx = self.dynamics_inputs.clone();
        idx.extend(self.augmented_dim()..self.augmented_dim() + CONTROL_DIM);
        idx
    }
}

/// Gaussian with diagonal covariance.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BeliefConfig {
    pub mean: Vec<f64>,
    pub std: Vec<f64>,
}

impl BeliefConfig {
    pub fn to_gaussian(&self) -> Gaussian {
        let var = DVector::from_iterator(self.std.len(), self.std.iter().map(|s| s * s));
        Gaussian { mean: DVector::from_column_slice(&self.mean), cov: DMatrix::from_diagonal(&var) }
    }
}

fn default_widths() -> Vec<f64> {
    vec![1.0]
}

fn default_gamma() -> f64 {
    1.0
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CostConfig {
    /// Pendulum length used to measure the tip distance.
    pub pendulum_length: f64,
    /// Widths of the saturating cost; the cost averages over all of them.
    #[serde(default = "default_widths")]
    pub widths: Vec<f64>,
    /// Weight of the `sqrt(var)` exploration term; zero disables it.
    #[serde(default)]
    pub exploration: f64,
    pub target: Vec<f64>,
    #[serde(default = "default_gamma")]
    pub gamma: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LearningConfig {
    /// Prediction and rollout horizon in steps.
    pub horizon: usize,
    /// Policy-learning iterations after the random rollouts.
    pub iterations: usize,
    pub random_rollouts: usize,
    pub policy_line_searches: usize,
    pub policy_evals_per_search: usize,
    #[serde(default)]
    pub dynamics: TrainOptions,
}

impl Scenario {
    /// Swing-up of the cart-pole from hanging down to upright.
    pub fn cart_pole() -> Self {
        let dt: f64 = 0.1;
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let horizon = (4.0 / dt).ceil() as usize;
        Self {
            plant: PlantConfig {
                dt,
                substeps: 10,
                cart_mass: 0.5,
                pole_mass: 0.5,
                pole_length: 0.5,
                friction: 0.1,
                gravity: 9.82,
                noise_std: vec![0.01; STATE_DIM],
            },
            indices: IndexSets {
                angles: vec![3],
                dynamics_inputs: vec![0, 1, 2, 4, 5],
                policy_inputs: vec![0, 1, 2, 4, 5],
                difference_targets: vec![0, 1, 2, 3],
            },
            starts: vec![BeliefConfig { mean: vec![0.0; STATE_DIM], std: vec![0.1; STATE_DIM] }],
            policy: RbfPolicyConfig {
                basis_functions: 10,
                lengthscales: vec![1.0, 1.0, 1.0, 0.7, 0.7],
                signal_std: 1.0,
                noise_std: 0.01,
                max_u: vec![10.0],
            },
            cost: CostConfig {
                pendulum_length: 0.5,
                widths: vec![0.25],
                exploration: 0.0,
                target: vec![0.0, 0.0, 0.0, std::f64::consts::PI],
                gamma: 1.0,
            },
            learning: LearningConfig {
                horizon,
                iterations: 15,
                random_rollouts: 1,
                policy_line_searches: 150,
                policy_evals_per_search: 30,
                dynamics: TrainOptions::default(),
            },
            seed: 1,
        }
    }

    /// # Errors
    /// `Json` when `json` does not describe a scenario. The result is not
    /// validated.
    pub fn from_json(json: &str) -> Result<Self, PilcoError> {
        Ok(serde_json::from_str(json)?)
    }

    /// # Errors
    /// `Json` if serialisation fails.
    pub fn to_json(&self) -> Result<String, PilcoError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn cart_pole_plant(&self) -> CartPole {
        let params = CartPoleParams {
            cart_mass: self.plant.cart_mass,
            pole_mass: self.plant.pole_mass,
            pole_length: self.plant.pole_length,
            friction: self.plant.friction,
            gravity: self.plant.gravity,
        };
        CartPole::new(params, self.plant.dt, self.plant.substeps)
    }

    pub fn start_beliefs(&self) -> Vec<Gaussian> {
        self.starts.iter().map(BeliefConfig::to_gaussian).collect()
    }

    /// Checks every dimension and index set against the cart-pole state.
    ///
    /// # Errors
    /// `Configuration` naming the first inconsistency.
    pub fn validate(&self) -> Result<(), PilcoError> {
        let fail = |msg: String| Err(PilcoError::Configuration(msg));
        let positive = |v: f64| v.is_finite() && v > 0.0;

        let p = &self.plant;
        if !(positive(p.dt) && p.substeps > 0) {
            return fail("plant.dt must be positive and plant.substeps non-zero".into());
        }
        if ![p.cart_mass, p.pole_mass, p.pole_length, p.gravity].into_iter().all(positive)
            || !(p.friction.is_finite() && p.friction >= 0.0)
        {
            return fail("plant masses, length and gravity must be positive, friction non-negative".into());
        }
        check_std("plant.noise_std", &p.noise_std, STATE_DIM)?;

        let idx = &self.indices;
        let aug = idx.augmented_dim();
        check_indices("indices.angles", &idx.angles, STATE_DIM, true)?;
        check_indices("indices.dynamics_inputs", &idx.dynamics_inputs, aug, false)?;
        check_indices("indices.policy_inputs", &idx.policy_inputs, aug, false)?;
        check_indices("indices.difference_targets", &idx.difference_targets, STATE_DIM, true)?;

        if self.starts.is_empty() {
            return fail("at least one start belief is required".into());
        }
        for (k, start) in self.starts.iter().enumerate() {
            if start.mean.len() != STATE_DIM || !start.mean.iter().all(|v| v.is_finite()) {
                return fail(format!("starts[{k}].mean must hold {STATE_DIM} finite values"));
            }
            check_std(&format!("starts[{k}].std"), &start.std, STATE_DIM)?;
        }

        let pol = &self.policy;
        if pol.basis_functions == 0 {
            return fail("policy.basis_functions must be non-zero".into());
        }
        if pol.lengthscales.len() != idx.policy_inputs.len() || !pol.lengthscales.iter().copied().all(positive) {
            return fail(format!(
                "policy.lengthscales must hold {} positive values, one per policy input",
                idx.policy_inputs.len()
            ));
        }
        if !(positive(pol.signal_std) && positive(pol.noise_std)) {
            return fail("policy signal and noise levels must be positive".into());
        }
        if pol.max_u.len() != CONTROL_DIM || !pol.max_u.iter().copied().all(positive) {
            return fail(format!("policy.max_u must hold {CONTROL_DIM} positive bound"));
        }

        let cost = &self.cost;
        if cost.target.len() != STATE_DIM || !cost.target.iter().all(|v| v.is_finite()) {
            return fail(format!("cost.target must hold {STATE_DIM} finite values"));
        }
        if cost.widths.is_empty() || !cost.widths.iter().copied().all(positive) {
            return fail("cost.widths must be non-empty and positive".into());
        }
        if !positive(cost.pendulum_length) || !cost.exploration.is_finite() {
            return fail("cost.pendulum_length must be positive and cost.exploration finite".into());
        }
        if !(cost.gamma > 0.0 && cost.gamma <= 1.0) {
            return fail("cost.gamma must lie in (0, 1]".into());
        }
        if idx.angles.is_empty() {
            return fail("the cost needs the pole angle in indices.angles".into());
        }

        let learn = &self.learning;
        // A zero-step rollout records no transitions, so the dynamics model
        // could never be trained.
        if learn.horizon == 0 {
            return fail("learning.horizon must be at least one step".into());
        }
        if learn.policy_line_searches == 0 || learn.policy_evals_per_search == 0 {
            return fail("policy optimisation budgets must be non-zero".into());
        }
        if learn.random_rollouts == 0 {
            return fail("at least one random rollout is needed to train the dynamics".into());
        }
        Ok(())
    }
}

fn check_std(what: &str, std: &[f64], dim: usize) -> Result<(), PilcoError> {
    if std.len() != dim || !std.iter().all(|s| s.is_finite() && *s >= 0.0) {
        return Err(PilcoError::Configuration(format!("{what} must hold {dim} non-negative values")));
    }
    Ok(())
}

fn check_indices(what: &str, idx: &[usize], dim: usize, allow_empty: bool) -> Result<(), PilcoError> {
    if idx.is_empty() && !allow_empty {
        return Err(PilcoError::Configuration(format!("{what} is empty")));
    }
    for (k, &i) in idx.iter().enumerate() {
        if i >= dim {
            return Err(PilcoError::Configuration(format!("{what} holds {i}, outside 0..{dim}")));
        }
        if idx[..k].contains(&i) {
            return Err(PilcoError::Configuration(format!("{what} lists {i} twice")));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cart_pole_is_valid() {
        let s = Scenario::cart_pole();
        s.validate().unwrap();
        assert_eq!(s.learning.horizon, 40);
        assert_eq!(s.indices.dynamics_with_control(), vec![0, 1, 2, 4, 5, 6]);
    }

    #[test]
    fn optional_cost_fields_take_defaults() {
        let cost: CostConfig =
            serde_json::from_str(r#"{"pendulum_length": 0.5, "target": [0, 0, 0, 3.14]}"#).unwrap();
        assert_eq!(cost.widths, vec![1.0]);
        assert_eq!(cost.exploration, 0.0);
        assert_eq!(cost.gamma, 1.0);
    }
}

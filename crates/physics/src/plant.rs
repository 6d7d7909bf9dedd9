//! Interaction with a simulated plant: sampling start states, measurement
//! noise and closed-loop rollouts.

use moments::Gaussian;
use nalgebra::DVector;
use tracing::debug;

use crate::error::PlantError;

/// A deterministic system advanced one control interval at a time.
pub trait Plant {
    fn state_dim(&self) -> usize;

    fn control_dim(&self) -> usize;

    /// Advances `state` by one control interval, holding `control` constant.
    ///
    /// # Errors
    /// `DimensionMismatch` when the state or control has the wrong size.
    fn simulate(&self, state: &DVector<f64>, control: &DVector<f64>) -> Result<DVector<f64>, PlantError>;
}

/// Maps a (noisy) observation of the plant state to a control.
pub trait Controller {
    /// # Errors
    /// Implementations wrap their own failures in `PlantError::Controller`.
    fn control(&mut self, observation: &DVector<f64>) -> Result<DVector<f64>, PlantError>;
}

/// Immediate cost of a latent state.
pub trait StageCost {
    fn stage_cost(&self, state: &DVector<f64>) -> f64;
}

/// Uniformly random controls in `[-limit, limit]`, used to collect the first
/// transitions before any policy has been learned.
#[derive(Clone, Debug)]
pub struct RandomController {
    limits: DVector<f64>,
    rng: fastrand::Rng,
}

impl RandomController {
    pub fn new(limits: DVector<f64>, seed: u64) -> Self {
        Self { limits, rng: fastrand::Rng::with_seed(seed) }
    }
}

impl Controller for RandomController {
    fn control(&mut self, _observation: &DVector<f64>) -> Result<DVector<f64>, PlantError> {
        Ok(DVector::from_fn(self.limits.len(), |i, _| self.limits[i] * (2.0 * self.rng.f64() - 1.0)))
    }
}

/// Record of one closed-loop episode.
///
/// `latent` and `observations` hold `H + 1` states, `controls` holds `H`
/// controls and `costs` the stage cost of every latent state.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Rollout {
    pub latent: Vec<DVector<f64>>,
    pub observations: Vec<DVector<f64>>,
    pub controls: Vec<DVector<f64>>,
    pub costs: Vec<f64>,
}

impl Rollout {
    pub fn horizon(&self) -> usize {
        self.controls.len()
    }

    pub fn total_cost(&self) -> f64 {
        self.costs.iter().sum()
    }
}

/// Runs controllers on a plant with additive Gaussian measurement noise.
#[derive(Clone, Debug)]
pub struct PlantRunner<P> {
    pub plant: P,
    /// Standard deviation of the measurement noise on every state coordinate
    pub noise_std: DVector<f64>,
    pub horizon: usize,
}

impl<P: Plant> PlantRunner<P> {
    /// # Errors
    /// `DimensionMismatch` when the noise does not cover the plant state.
    pub fn new(plant: P, noise_std: DVector<f64>, horizon: usize) -> Result<Self, PlantError> {
        if noise_std.len() != plant.state_dim() {
            return Err(PlantError::DimensionMismatch(format!(
                "{} noise levels for a {}-dimensional state",
                noise_std.len(),
                plant.state_dim()
            )));
        }
        Ok(Self { plant, noise_std, horizon })
    }

    pub fn observe(&self, state: &DVector<f64>, rng: &mut fastrand::Rng) -> DVector<f64> {
        DVector::from_fn(state.len(), |i, _| state[i] + self.noise_std[i] * standard_normal(rng))
    }

    /// Samples a start state from `start`, then alternates observing, acting
    /// and simulating for `horizon` steps.
    ///
    /// # Errors
    /// `InvalidDistribution` (via `Moment`) for an unusable start belief,
    /// `Diverged` when the simulated state becomes non-finite and any error
    /// raised by the controller.
    pub fn rollout(
        &self,
        start: &Gaussian,
        controller: &mut dyn Controller,
        cost: &dyn StageCost,
        rng: &mut fastrand::Rng,
    ) -> Result<Rollout, PlantError> {
        let mut state = sample(start, rng)?;
        let mut out = Rollout::default();
        for step in 0..self.horizon {
            let observation = self.observe(&state, rng);
            let control = controller.control(&observation)?;
            if control.len() != self.plant.control_dim() {
                return Err(PlantError::DimensionMismatch(format!(
                    "controller returned {} controls, plant takes {}",
                    control.len(),
                    self.plant.control_dim()
                )));
            }
            let next = self.plant.simulate(&state, &control)?;
            if !next.iter().all(|v| v.is_finite()) {
                return Err(PlantError::Diverged { step });
            }
            out.costs.push(cost.stage_cost(&state));
            out.latent.push(std::mem::replace(&mut state, next));
            out.observations.push(observation);
            out.controls.push(control);
        }
        out.costs.push(cost.stage_cost(&state));
        out.observations.push(self.observe(&state, rng));
        out.latent.push(state);
        debug!(horizon = self.horizon, total_cost = out.total_cost(), "rollout finished");
        Ok(out)
    }
}

/// Draws from `N(0, 1)` by the Box-Muller transform.
pub fn standard_normal(rng: &mut fastrand::Rng) -> f64 {
    let u1 = 1.0 - rng.f64();
    let u2 = rng.f64();
    (-2.0 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos()
}

/// Draws one sample from `belief`.
///
/// # Errors
/// `Moment(InvalidDistribution)` when the covariance is not positive semi-definite.
pub fn sample(belief: &Gaussian, rng: &mut fastrand::Rng) -> Result<DVector<f64>, PlantError> {
    let factor = belief.cholesky_factor()?;
    let noise = DVector::from_fn(belief.dim(), |_, _| standard_normal(rng));
    Ok(&belief.mean + factor * noise)
}

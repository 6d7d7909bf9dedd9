//! The outer learning loop: random rollouts, dynamics training, policy
//! search and application of the learned policy to the plant.

use ml::{GpDynamics, MlError, RbfPolicy, TrainReport};
use moments::{select_vector, AngleAugment, Gaussian};
use nalgebra::DVector;
use physics::{CartPole, Controller, PlantError, PlantRunner, RandomController, Rollout};
use serde::Serialize;
use tracing::{info, warn};

use crate::cost::CostModel;
use crate::error::PilcoError;
use crate::learner::{LearnReport, PolicyLearner};
use crate::propagate::{Trajectory, TrajectoryPropagator};
use crate::scenario::{Scenario, CONTROL_DIM, STATE_DIM};

/// `[x; sin/cos of every angle]` for a point state.
fn augmented(augment: &AngleAugment, x: &DVector<f64>) -> DVector<f64> {
    let trig = augment.point(x);
    let mut out = DVector::zeros(x.len() + trig.len());
    out.rows_mut(0, x.len()).copy_from(x);
    out.rows_mut(x.len(), trig.len()).copy_from(&trig);
    out
}

/// Applies the learned policy to noisy observations of the plant.
struct PolicyController<'a> {
    policy: &'a RbfPolicy,
    augment: &'a AngleAugment,
    inputs: &'a [usize],
}

impl Controller for PolicyController<'_> {
    fn control(&mut self, observation: &DVector<f64>) -> Result<DVector<f64>, PlantError> {
        let x = select_vector(&augmented(self.augment, observation), self.inputs);
        self.policy.act(&x).map_err(|e| PlantError::Controller(Box::new(e)))
    }
}

/// What one learning iteration predicted and what the plant then did.
#[derive(Clone, Debug, Serialize)]
pub struct IterationReport {
    pub iteration: usize,
    /// Transitions the dynamics model was trained on.
    pub transitions: usize,
    /// Final value of the policy search, `NaN` when it was abandoned.
    pub optimized_cost: f64,
    pub predicted_cost: Vec<f64>,
    pub predicted_std: Vec<f64>,
    pub realized_cost: Vec<f64>,
}

impl IterationReport {
    pub fn predicted_total(&self) -> f64 {
        self.predicted_cost.iter().sum()
    }

    pub fn realized_total(&self) -> f64 {
        self.realized_cost.iter().sum()
    }
}

pub struct Learner {
    scenario: Scenario,
    runner: PlantRunner<CartPole>,
    cost: CostModel,
    augment: AngleAugment,
    dynamics: GpDynamics,
    policy: RbfPolicy,
    starts: Vec<Gaussian>,
    rng: fastrand::Rng,
}

impl Learner {
    /// Validates `scenario` and draws the initial policy.
    ///
    /// # Errors
    /// `Configuration` for an inconsistent scenario, or the error raised while
    /// placing the initial basis functions.
    pub fn new(scenario: Scenario) -> Result<Self, PilcoError> {
        scenario.validate()?;
        let runner = PlantRunner::new(
            scenario.cart_pole_plant(),
            DVector::from_column_slice(&scenario.plant.noise_std),
            scenario.learning.horizon,
        )?;
        let cost = CostModel::new(&scenario.cost, &scenario.indices.angles, STATE_DIM)?;
        let augment = AngleAugment::new(scenario.indices.angles.clone());
        let dynamics = GpDynamics::new(scenario.indices.dynamics_inputs.len() + CONTROL_DIM, STATE_DIM);
        let starts = scenario.start_beliefs();
        let mut rng = fastrand::Rng::with_seed(scenario.seed);
        let (joint, _) = augment.joint(&starts[0])?;
        let policy = RbfPolicy::random(&joint.marginal(&scenario.indices.policy_inputs), &scenario.policy, &mut rng)?;
        Ok(Self { scenario, runner, cost, augment, dynamics, policy, starts, rng })
    }

    pub fn scenario(&self) -> &Scenario {
        &self.scenario
    }

    pub fn policy(&self) -> &RbfPolicy {
        &self.policy
    }

    pub fn dynamics(&self) -> &GpDynamics {
        &self.dynamics
    }

    pub fn cost(&self) -> &CostModel {
        &self.cost
    }

    /// Appends the transitions of `rollout` to the dynamics training set and
    /// returns how many were added.
    ///
    /// # Errors
    /// `Configuration` when the rollout does not hold one more observation
    /// than controls, `DimensionMismatch` when it does not match the model.
    pub fn record(&mut self, rollout: &Rollout) -> Result<usize, PilcoError> {
        if rollout.observations.len() != rollout.horizon() + 1 {
            return Err(PilcoError::Configuration(format!(
                "a rollout with {} controls needs {} observations, got {}",
                rollout.horizon(),
                rollout.horizon() + 1,
                rollout.observations.len()
            )));
        }
        let dyni = &self.scenario.indices.dynamics_inputs;
        let difi = &self.scenario.indices.difference_targets;
        for (control, pair) in rollout.controls.iter().zip(rollout.observations.windows(2)) {
            let (now, next) = (&pair[0], &pair[1]);
            let state = select_vector(&augmented(&self.augment, now), dyni);
            let mut input = DVector::zeros(state.len() + control.len());
            input.rows_mut(0, state.len()).copy_from(&state);
            input.rows_mut(state.len(), control.len()).copy_from(control);
            let mut target = next.clone();
            for &i in difi {
                target[i] -= now[i];
            }
            self.dynamics.record(input, target)?;
        }
        Ok(rollout.horizon())
    }

    /// Collects the initial data with uniformly random controls.
    ///
    /// # Errors
    /// Any plant failure.
    pub fn random_rollouts(&mut self) -> Result<Vec<Rollout>, PilcoError> {
        let limits = self.policy.limits().clone();
        let mut rollouts = Vec::with_capacity(self.scenario.learning.random_rollouts);
        for j in 0..self.scenario.learning.random_rollouts {
            let mut controller = RandomController::new(limits.clone(), self.rng.u64(..));
            let rollout = self.runner.rollout(&self.starts[0], &mut controller, &self.cost, &mut self.rng)?;
            self.record(&rollout)?;
            info!(rollout = j, cost = rollout.total_cost(), "random rollout");
            rollouts.push(rollout);
        }
        Ok(rollouts)
    }

    /// # Errors
    /// `Ml(TrainingFailure)`; the previous model is kept.
    pub fn train_dynamics(&mut self) -> Result<TrainReport, PilcoError> {
        Ok(self.dynamics.train(&self.scenario.learning.dynamics)?)
    }

    fn propagator(&self) -> Result<TrajectoryPropagator<'_>, PilcoError> {
        TrajectoryPropagator::new(
            &self.dynamics,
            &self.cost,
            &self.scenario.indices,
            self.scenario.learning.horizon,
            self.scenario.cost.gamma,
        )
    }

    /// Optimises the policy against the current dynamics model and adopts
    /// the result.
    ///
    /// # Errors
    /// Any error of [`PolicyLearner::learn`]; the policy is unchanged on error.
    pub fn learn_policy(&mut self) -> Result<LearnReport, PilcoError> {
        let report = {
            let propagator = self.propagator()?;
            let learner = PolicyLearner::new(
                &propagator,
                &self.starts,
                self.scenario.learning.policy_line_searches,
                self.scenario.learning.policy_evals_per_search,
            );
            learner.learn(&self.policy)?
        };
        self.policy = report.policy.clone();
        Ok(report)
    }

    /// Predicted trajectory of the current policy from the first start belief.
    ///
    /// # Errors
    /// Any propagation failure.
    pub fn predict(&self) -> Result<Trajectory, PilcoError> {
        self.propagator()?.run(&self.policy, &self.starts[0])
    }

    /// Runs the current policy on the plant and records the transitions.
    ///
    /// # Errors
    /// Any plant or controller failure.
    pub fn apply_controller(&mut self) -> Result<Rollout, PilcoError> {
        let mut controller =
            PolicyController { policy: &self.policy, augment: &self.augment, inputs: &self.scenario.indices.policy_inputs };
        let rollout = self.runner.rollout(&self.starts[0], &mut controller, &self.cost, &mut self.rng)?;
        self.record(&rollout)?;
        Ok(rollout)
    }

    /// Trains the dynamics, improves the policy, predicts its trajectory and
    /// applies it once.
    ///
    /// A failed dynamics fit keeps the previous model, and a policy search
    /// that only meets infeasible points keeps the previous policy.
    ///
    /// # Errors
    /// Training failures before any model exists, and every error that does
    /// not mark an infeasible point.
    pub fn iterate(&mut self, iteration: usize) -> Result<IterationReport, PilcoError> {
        match self.train_dynamics() {
            Ok(_) => {}
            Err(e) if self.dynamics.is_trained() => warn!(error = %e, "keeping previous dynamics model"),
            Err(e) => return Err(e),
        }
        let transitions = self.dynamics.store().len();

        let optimized_cost = match self.learn_policy() {
            Ok(report) => report.value(),
            Err(e) if e.is_invalid_point() || matches!(e, PilcoError::Ml(MlError::InvalidStart)) => {
                warn!(error = %e, "policy search abandoned, keeping previous policy");
                f64::NAN
            }
            Err(e) => return Err(e),
        };

        let (predicted_cost, predicted_std) = match self.predict() {
            Ok(trajectory) => {
                let std = trajectory.cost_std();
                (trajectory.costs, std)
            }
            Err(e) if e.is_invalid_point() => {
                warn!(error = %e, "prediction of the learned policy failed");
                (Vec::new(), Vec::new())
            }
            Err(e) => return Err(e),
        };

        let rollout = self.apply_controller()?;
        let report = IterationReport {
            iteration,
            transitions,
            optimized_cost,
            predicted_cost,
            predicted_std,
            realized_cost: rollout.costs,
        };
        info!(
            iteration,
            transitions,
            predicted = report.predicted_total(),
            realized = report.realized_total(),
            "finished learning iteration"
        );
        Ok(report)
    }

    /// Random rollouts followed by every learning iteration.
    ///
    /// # Errors
    /// The first fatal error of any stage.
    pub fn run(&mut self) -> Result<Vec<IterationReport>, PilcoError> {
        self.random_rollouts()?;
        (1..=self.scenario.learning.iterations).map(|i| self.iterate(i)).collect()
    }
}

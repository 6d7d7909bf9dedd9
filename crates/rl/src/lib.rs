#![deny(clippy::all, clippy::pedantic)]
#![allow(
    clippy::module_name_repetitions,
    clippy::many_single_char_names,
    clippy::similar_names,
    clippy::must_use_candidate,
    clippy::missing_panics_doc
)]
//! # Policy Search
//!
//! Model-based policy search for the cart-pole swing-up: a GP dynamics
//! model learned from rollouts, a closed-loop prediction by moment matching
//! and gradient-based optimisation of an RBF policy against the predicted
//! cost.
//!
//! ## Key Components
//!
//! -   **Scenario:** [`Scenario`] is the validated configuration of a run,
//!     loaded from JSON or built with [`Scenario::cart_pole`].
//! -   **Cost:** [`CostModel`] is the saturating distance of the pendulum tip
//!     from its target, evaluated in expectation over a state belief.
//! -   **Propagation:** [`TrajectoryPropagator`] predicts beliefs over the
//!     horizon and returns the accumulated cost with its derivative in the
//!     policy parameters.
//! -   **Learning:** [`PolicyLearner`] searches the policy parameters;
//!     [`Learner`] drives rollouts, model training and policy updates.

pub mod cost;
pub mod error;
pub mod learner;
pub mod propagate;
pub mod scenario;
pub mod training;

pub use cost::{CostEvaluation, CostModel, CostMoments, SaturatingCost};
pub use error::PilcoError;
pub use learner::{LearnReport, PolicyLearner};
pub use propagate::{Trajectory, TrajectoryPropagator};
pub use scenario::{
    BeliefConfig, CostConfig, IndexSets, LearningConfig, PlantConfig, Scenario, CONTROL_DIM, STATE_DIM,
};
pub use training::{IterationReport, Learner};

#![deny(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions, clippy::many_single_char_names, clippy::must_use_candidate)]
//! # Plant Simulation
//!
//! The real system a learning controller interacts with.
//!
//! ## Key Components
//!
//! -   **Plants:** The [`Plant`] trait advances a state over one control
//!     interval. [`CartPole`] integrates the cart-pole ODE with RK4 under a
//!     zero-order hold of the applied force.
//! -   **Controllers:** [`Controller`] turns noisy observations into controls.
//!     [`RandomController`] draws uniform controls for the initial data.
//! -   **Rollouts:** [`PlantRunner`] samples a start state from a Gaussian,
//!     adds measurement noise and records a [`Rollout`] with the stage cost of
//!     every latent state.
//!
//! ```rust,ignore
//! use physics::{CartPole, CartPoleParams, PlantRunner, RandomController};
//!
//! let runner = PlantRunner::new(CartPole::new(CartPoleParams::default(), 0.1, 10), noise, 40)?;
//! let rollout = runner.rollout(&start, &mut RandomController::new(limits, 1), &cost, &mut rng)?;
//! ```

pub mod cartpole;
pub mod error;
pub mod integrator;
pub mod plant;

pub use cartpole::{CartPole, CartPoleParams};
pub use error::PlantError;
pub use plant::{sample, standard_normal, Controller, Plant, PlantRunner, RandomController, Rollout, StageCost};

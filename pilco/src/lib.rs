//! # PILCO
//!
//! Documentation entry point for the policy-search workspace.
//!
//! ## Overview
//!
//! A controller for the cart-pole swing-up is learned from a handful of
//! trials. Each trial's transitions train a Gaussian-process model of the
//! dynamics; the controller is then improved against that model by
//! predicting whole trajectories as Gaussian beliefs, so the uncertainty of
//! the model is accounted for when the expected cost is minimised.
//!
//! ## The Crates
//!
//! -   **[`moments`]:** Gaussian beliefs, exact moments of the trigonometric
//!     augmentation and the control squashing, and the sensitivity bundles
//!     every transform returns.
//! -   **[`physics`]:** The cart-pole plant, rollouts with measurement noise
//!     and the controller interface.
//! -   **[`ml`]:** Kernel hyperparameter fitting, GP dynamics, the RBF
//!     policy and the conjugate-gradient minimiser.
//! -   **[`rl`]:** Scenario configuration, the saturating cost, trajectory
//!     propagation with policy gradients and the learning loop.
//!
//! ## Getting Started
//!
//! ```text
//! pilco --dump-config > cartpole.json
//! RUST_LOG=info pilco --scenario cartpole.json --iterations 5 --report out.json
//! ```

pub use ml;
pub use moments;
pub use physics;
pub use rl;

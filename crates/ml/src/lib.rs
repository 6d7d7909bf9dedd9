#![deny(clippy::all, clippy::pedantic)]
#![allow(
    clippy::module_name_repetitions,
    clippy::many_single_char_names,
    clippy::similar_names,
    clippy::must_use_candidate,
    clippy::missing_panics_doc
)]
//! # Learned Models
//!
//! Gaussian-process regression and the RBF controller, both with exact moment
//! matching of Gaussian input beliefs.
//!
//! ## Key Components
//!
//! -   **Kernel:** [`SeKernel`] holds log hyperparameters of the
//!     squared-exponential ARD kernel and evaluates the negative log marginal
//!     likelihood with its gradient. [`HyperCurb`] keeps fitted
//!     hyperparameters in a sensible range.
//! -   **Moment matching:** [`BasisExpansion`] propagates a belief through a
//!     weighted sum of kernel basis functions and differentiates the result
//!     with respect to the belief and to the expansion's own parameters.
//! -   **Dynamics:** [`GpDynamics`] stores transitions, fits one GP per output
//!     and predicts state differences for a belief.
//! -   **Policy:** [`RbfPolicy`] is a pseudo-training-set GP mean squashed into
//!     the control bounds, with a packed parameter vector for optimisation.
//! -   **Optimiser:** [`minimize`] is a conjugate-gradient search with a
//!     Wolfe-Powell line search, tolerant of non-finite objective values.

pub mod basis;
pub mod dynamics;
pub mod error;
pub mod kernel;
pub mod minimize;
pub mod policy;

pub use basis::{BasisDirection, BasisExpansion, Linearization};
pub use dynamics::{GpDynamics, TrainOptions, TrainReport, TransitionStore};
pub use error::MlError;
pub use kernel::{HyperCurb, SeKernel};
pub use minimize::{minimize, MinimizeOptions, Minimized};
pub use policy::{PolicyOutput, PolicyParameter, RbfPolicy, RbfPolicyConfig};

#![deny(clippy::all, clippy::pedantic)]
#![allow(
    clippy::module_name_repetitions,
    clippy::many_single_char_names,
    clippy::similar_names,
    clippy::must_use_candidate
)]
//! # Moments
//!
//! Exact first and second moments of Gaussian beliefs pushed through the
//! nonlinear transforms a PILCO-style planner chains together, along with the
//! sensitivities of every output moment to the input mean and covariance.
//!
//! ## Conventions
//!
//! * A belief is a [`Gaussian`] with mean `m` (length `D`) and covariance `s`
//!   (`D x D`).
//! * A transform returns [`Moments`]: output mean `M` (length `E`), output
//!   covariance `S` (`E x E`) and the cross term `C` (`D x E`) with
//!   `cov(x, y) = s * C`.
//! * Sensitivities live in a [`JacobianBundle`]. Covariance derivatives are
//!   taken entry-wise; a symmetric perturbation of `s[(k, l)]` and `s[(l, k)]`
//!   is the sum of both entries' derivatives.
//!
//! ## Transforms
//!
//! * [`AngleAugment`] maps chosen coordinates to their `(sin, cos)` pairs.
//! * [`Saturation`] squashes controls through `max * (9 sin x + sin 3x) / 8`.
//!
//! Both implement [`MomentMap`], the seam other crates build on.

pub mod angle;
pub mod error;
pub mod gaussian;
pub mod jacobian;
pub mod saturation;
pub mod trig;

pub use angle::AngleAugment;
pub use error::{MomentError, Result};
pub use gaussian::{select_columns, select_matrix, select_vector, symmetrize, Gaussian, Moments};
pub use jacobian::{Gradient, JacobianBundle, MomentMap, MomentTangent, Tangent, Transformed};
pub use saturation::Saturation;
pub use trig::{TrigExpectation, TrigPair};

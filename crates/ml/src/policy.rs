//! Radial-basis-function controller squashed into the control limits.

use moments::{Gaussian, JacobianBundle, MomentMap, MomentTangent, Moments, Saturation};
use nalgebra::{Cholesky, DMatrix, DVector, Dyn};
use serde::{Deserialize, Serialize};

use crate::basis::{BasisDirection, BasisExpansion};
use crate::error::MlError;
use crate::kernel::SeKernel;

/// Shape and fixed hyperparameters of an [`RbfPolicy`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RbfPolicyConfig {
    pub basis_functions: usize,
    /// Initial lengthscale per policy input, shared by every control output.
    pub lengthscales: Vec<f64>,
    pub signal_std: f64,
    pub noise_std: f64,
    /// Control bound per output.
    pub max_u: Vec<f64>,
}

/// Location of one entry in the packed parameter vector.
///
/// The vector holds the centres (`n x D`), then the pseudo targets (`n x U`),
/// then the log lengthscales (`D x U`), each block column-major.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PolicyParameter {
    Center { basis: usize, input: usize },
    Target { basis: usize, output: usize },
    LogLengthscale { input: usize, output: usize },
}

/// Control moments for an input belief, with derivatives with respect to the
/// belief and to every policy parameter.
#[derive(Clone, Debug)]
pub struct PolicyOutput {
    pub moments: Moments,
    pub jacobian: JacobianBundle,
    pub parameter_tangents: Vec<MomentTangent>,
}

/// `u = sat(Σ_i β_i k(c_i, x))` with `β = (K + sn² I)⁻¹ y` computed from
/// pseudo targets `y` at the centres.
#[derive(Clone, Debug, PartialEq)]
pub struct RbfPolicy {
    centers: DMatrix<f64>,
    targets: DMatrix<f64>,
    log_lengthscales: DMatrix<f64>,
    log_signal: f64,
    log_noise: f64,
    saturation: Saturation,
}

struct Fit {
    beta: DMatrix<f64>,
    factors: Vec<Cholesky<f64, Dyn>>,
    grams: Vec<DMatrix<f64>>,
}

impl RbfPolicy {
    /// # Errors
    /// `DimensionMismatch` when the blocks disagree in size.
    pub fn new(
        centers: DMatrix<f64>,
        targets: DMatrix<f64>,
        log_lengthscales: DMatrix<f64>,
        signal_std: f64,
        noise_std: f64,
        max_u: DVector<f64>,
    ) -> Result<Self, MlError> {
        let (n, d) = centers.shape();
        let u = max_u.len();
        if targets.shape() != (n, u) || log_lengthscales.shape() != (d, u) {
            return Err(MlError::DimensionMismatch(format!(
                "policy with {n} centres over {d} inputs and {u} controls got targets {:?} and lengthscales {:?}",
                targets.shape(),
                log_lengthscales.shape()
            )));
        }
        Ok(Self {
            centers,
            targets,
            log_lengthscales,
            log_signal: signal_std.ln(),
            log_noise: noise_std.ln(),
            saturation: Saturation::new(max_u),
        })
    }

    /// Centres drawn from `start`, small random pseudo targets and the
    /// configured lengthscales.
    ///
    /// # Errors
    /// `InvalidDistribution` for an unusable `start` and `DimensionMismatch`
    /// when the lengthscales do not cover the policy inputs.
    pub fn random(start: &Gaussian, config: &RbfPolicyConfig, rng: &mut fastrand::Rng) -> Result<Self, MlError> {
        let d = start.dim();
        if config.lengthscales.len() != d {
            return Err(MlError::DimensionMismatch(format!(
                "{} policy lengthscales for {d} policy inputs",
                config.lengthscales.len()
            )));
        }
        let n = config.basis_functions;
        let u = config.max_u.len();
        let factor = start.cholesky_factor()?;
        let mut centers = DMatrix::zeros(n, d);
        for i in 0..n {
            let z = DVector::from_fn(d, |_, _| physics::standard_normal(rng));
            centers.set_row(i, &(&start.mean + &factor * z).transpose());
        }
        let targets = DMatrix::from_fn(n, u, |_, _| 0.1 * physics::standard_normal(rng));
        let log_lengthscales = DMatrix::from_fn(d, u, |k, _| config.lengthscales[k].ln());
        Self::new(
            centers,
            targets,
            log_lengthscales,
            config.signal_std,
            config.noise_std,
            DVector::from_column_slice(&config.max_u),
        )
    }

    pub fn input_dim(&self) -> usize {
        self.centers.ncols()
    }

    pub fn control_dim(&self) -> usize {
        self.targets.ncols()
    }

    pub fn basis_count(&self) -> usize {
        self.centers.nrows()
    }

    pub fn limits(&self) -> &DVector<f64> {
        self.saturation.limits()
    }

    pub fn centers(&self) -> &DMatrix<f64> {
        &self.centers
    }

    pub fn targets(&self) -> &DMatrix<f64> {
        &self.targets
    }

    pub fn kernels(&self) -> Vec<SeKernel> {
        (0..self.control_dim())
            .map(|a| SeKernel {
                log_lengthscales: self.log_lengthscales.column(a).into_owned(),
                log_signal: self.log_signal,
                log_noise: self.log_noise,
            })
            .collect()
    }

    pub fn parameter_count(&self) -> usize {
        let (n, d, u) = (self.basis_count(), self.input_dim(), self.control_dim());
        n * d + n * u + d * u
    }

    /// Meaning of entry `p` of [`RbfPolicy::parameters`].
    pub fn parameter(&self, p: usize) -> PolicyParameter {
        let (n, d, u) = (self.basis_count(), self.input_dim(), self.control_dim());
        if p < n * d {
            PolicyParameter::Center { basis: p % n, input: p / n }
        } else if p < n * d + n * u {
            let q = p - n * d;
            PolicyParameter::Target { basis: q % n, output: q / n }
        } else {
            let q = p - n * d - n * u;
            PolicyParameter::LogLengthscale { input: q % d, output: q / d }
        }
    }

    pub fn parameters(&self) -> DVector<f64> {
        DVector::from_iterator(
            self.parameter_count(),
            self.centers.iter().chain(self.targets.iter()).chain(self.log_lengthscales.iter()).copied(),
        )
    }

    /// # Errors
    /// `DimensionMismatch` when `theta` has the wrong length.
    pub fn set_parameters(&mut self, theta: &DVector<f64>) -> Result<(), MlError> {
        if theta.len() != self.parameter_count() {
            return Err(MlError::DimensionMismatch(format!(
                "{} policy parameters, expected {}",
                theta.len(),
                self.parameter_count()
            )));
        }
        let (n, d, u) = (self.basis_count(), self.input_dim(), self.control_dim());
        let theta = theta.as_slice();
        self.centers.copy_from_slice(&theta[..n * d]);
        self.targets.copy_from_slice(&theta[n * d..n * d + n * u]);
        self.log_lengthscales.copy_from_slice(&theta[n * d + n * u..]);
        Ok(())
    }

    /// # Errors
    /// Same as [`RbfPolicy::set_parameters`].
    pub fn with_parameters(&self, theta: &DVector<f64>) -> Result<Self, MlError> {
        let mut out = self.clone();
        out.set_parameters(theta)?;
        Ok(out)
    }

    fn fit(&self, kernels: &[SeKernel]) -> Result<Fit, MlError> {
        let n = self.basis_count();
        let mut beta = DMatrix::zeros(n, self.control_dim());
        let mut factors = Vec::with_capacity(kernels.len());
        let mut grams = Vec::with_capacity(kernels.len());
        for (a, kernel) in kernels.iter().enumerate() {
            let gram = kernel.gram(&self.centers);
            let chol = (&gram + DMatrix::identity(n, n) * kernel.noise_var())
                .cholesky()
                .ok_or_else(|| MlError::SingularKernel(format!("policy output {a}")))?;
            beta.set_column(a, &chol.solve(&self.targets.column(a).into_owned()));
            factors.push(chol);
            grams.push(gram);
        }
        Ok(Fit { beta, factors, grams })
    }

    /// Deterministic control at policy input `x`.
    ///
    /// # Errors
    /// `DimensionMismatch` for a wrongly sized input and `SingularKernel` when
    /// the centres make the Gram matrix singular.
    pub fn act(&self, x: &DVector<f64>) -> Result<DVector<f64>, MlError> {
        if x.len() != self.input_dim() {
            return Err(MlError::DimensionMismatch(format!(
                "policy input has {} entries, expected {}",
                x.len(),
                self.input_dim()
            )));
        }
        let kernels = self.kernels();
        let fit = self.fit(&kernels)?;
        let expansion =
            BasisExpansion { centers: &self.centers, weights: &fit.beta, kernels: &kernels, model_uncertainty: None };
        Ok(self.saturation.point(&expansion.evaluate(x)))
    }

    /// Moments of the squashed control for policy input belief `x`.
    ///
    /// # Errors
    /// `DimensionMismatch`, `SingularKernel`, or `InvalidDistribution` when
    /// `x` cannot be matched.
    pub fn evaluate(&self, x: &Gaussian) -> Result<PolicyOutput, MlError> {
        let kernels = self.kernels();
        let fit = self.fit(&kernels)?;
        let expansion =
            BasisExpansion { centers: &self.centers, weights: &fit.beta, kernels: &kernels, model_uncertainty: None };
        let linearized = expansion.linearize(x)?;
        let directions: Vec<BasisDirection> =
            (0..self.parameter_count()).map(|p| self.direction(self.parameter(p), &kernels, &fit)).collect();
        let raw_tangents = linearized.parameter_tangents(&directions);
        let raw = linearized.into_transformed();

        let squashed = self.saturation.apply(&raw.moments.to_gaussian())?;
        let moments = raw.moments.then(&squashed.moments);
        let jacobian = JacobianBundle::chain(&raw.moments, &raw.jacobian, &squashed.moments, &squashed.jacobian);
        let parameter_tangents =
            raw_tangents.iter().map(|t| t.then(&raw.moments, &squashed.moments, &squashed.jacobian)).collect();
        Ok(PolicyOutput { moments, jacobian, parameter_tangents })
    }

    /// Change of centres, weights and lengthscales caused by a unit change of
    /// one parameter. The weights follow from `d β = K̃⁻¹ (d y - d K β)`.
    fn direction(&self, parameter: PolicyParameter, kernels: &[SeKernel], fit: &Fit) -> BasisDirection {
        let (n, d, u) = (self.basis_count(), self.input_dim(), self.control_dim());
        let mut dir = BasisDirection::zeros(n, d, u);
        match parameter {
            PolicyParameter::Target { basis, output } => {
                let mut dy = DVector::zeros(n);
                dy[basis] = 1.0;
                dir.weights.set_column(output, &fit.factors[output].solve(&dy));
            }
            PolicyParameter::Center { basis, input } => {
                dir.centers[(basis, input)] = 1.0;
                let dlog = DVector::zeros(d);
                for a in 0..u {
                    let dk = gram_tangent(&kernels[a], &self.centers, &fit.grams[a], &dir.centers, &dlog);
                    let rhs = -(dk * fit.beta.column(a));
                    dir.weights.set_column(a, &fit.factors[a].solve(&rhs));
                }
            }
            PolicyParameter::LogLengthscale { input, output } => {
                dir.log_lengthscales[(input, output)] = 1.0;
                let dlog = dir.log_lengthscales.column(output).into_owned();
                let dk = gram_tangent(&kernels[output], &self.centers, &fit.grams[output], &dir.centers, &dlog);
                let rhs = -(dk * fit.beta.column(output));
                dir.weights.set_column(output, &fit.factors[output].solve(&rhs));
            }
        }
        dir
    }
}

/// Derivative of the noise-free Gram matrix along centre change `dx` and log
/// lengthscale change `dlog`.
fn gram_tangent(
    kernel: &SeKernel,
    x: &DMatrix<f64>,
    gram: &DMatrix<f64>,
    dx: &DMatrix<f64>,
    dlog: &DVector<f64>,
) -> DMatrix<f64> {
    let inv = kernel.inv_lengthscales_sq();
    let n = x.nrows();
    DMatrix::from_fn(n, n, |p, q| {
        let s: f64 = (0..x.ncols())
            .map(|c| {
                let delta = x[(p, c)] - x[(q, c)];
                -delta * inv[c] * (dx[(p, c)] - dx[(q, c)]) + delta * delta * inv[c] * dlog[c]
            })
            .sum();
        gram[(p, q)] * s
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> RbfPolicy {
        let centers = DMatrix::from_row_slice(3, 2, &[0.1, -0.2, 0.5, 0.3, -0.4, 0.8]);
        let targets = DMatrix::from_row_slice(3, 1, &[0.3, -0.1, 0.2]);
        let log_l = DMatrix::from_column_slice(2, 1, &[0.0, -0.3]);
        RbfPolicy::new(centers, targets, log_l, 1.0, 0.01, DVector::from_vec(vec![2.0])).unwrap()
    }

    #[test]
    fn parameters_round_trip_in_block_order() {
        let mut p = policy();
        assert_eq!(p.parameter_count(), 3 * 2 + 3 + 2);
        assert_eq!(p.parameter(4), PolicyParameter::Center { basis: 1, input: 1 });
        assert_eq!(p.parameter(7), PolicyParameter::Target { basis: 1, output: 0 });
        assert_eq!(p.parameter(10), PolicyParameter::LogLengthscale { input: 1, output: 0 });
        let theta = p.parameters();
        assert_eq!(theta[7], -0.1);
        p.set_parameters(&(theta.clone() * 2.0)).unwrap();
        assert_eq!(p.parameters(), theta * 2.0);
    }

    #[test]
    fn rejects_wrong_parameter_length() {
        let mut p = policy();
        assert!(matches!(p.set_parameters(&DVector::zeros(3)), Err(MlError::DimensionMismatch(_))));
    }
}

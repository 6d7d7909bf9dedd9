//! Squared-exponential kernel with automatic relevance determination.

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

/// Hyperparameters of `k(x, x') = sf² exp(-½ Σ_d (x_d - x'_d)² / ℓ_d²)` plus
/// observation noise `sn²`, all stored as logarithms.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SeKernel {
    pub log_lengthscales: DVector<f64>,
    pub log_signal: f64,
    pub log_noise: f64,
}

impl SeKernel {
    pub fn new(lengthscales: &[f64], signal_std: f64, noise_std: f64) -> Self {
        Self {
            log_lengthscales: DVector::from_iterator(lengthscales.len(), lengthscales.iter().map(|l| l.ln())),
            log_signal: signal_std.ln(),
            log_noise: noise_std.ln(),
        }
    }

    /// Unpacks `[log ℓ_1 .. log ℓ_D, log sf, log sn]`.
    pub fn from_hyperparameters(h: &DVector<f64>) -> Self {
        let d = h.len() - 2;
        Self { log_lengthscales: h.rows(0, d).into_owned(), log_signal: h[d], log_noise: h[d + 1] }
    }

    pub fn hyperparameters(&self) -> DVector<f64> {
        let d = self.dim();
        let mut h = DVector::zeros(d + 2);
        h.rows_mut(0, d).copy_from(&self.log_lengthscales);
        h[d] = self.log_signal;
        h[d + 1] = self.log_noise;
        h
    }

    pub fn dim(&self) -> usize {
        self.log_lengthscales.len()
    }

    /// `ℓ²`, the diagonal of `Λ`.
    pub fn lengthscales_sq(&self) -> DVector<f64> {
        self.log_lengthscales.map(|l| (2.0 * l).exp())
    }

    /// `1 / ℓ²`, the diagonal of `Λ⁻¹`.
    pub fn inv_lengthscales_sq(&self) -> DVector<f64> {
        self.log_lengthscales.map(|l| (-2.0 * l).exp())
    }

    pub fn signal_var(&self) -> f64 {
        (2.0 * self.log_signal).exp()
    }

    pub fn noise_var(&self) -> f64 {
        (2.0 * self.log_noise).exp()
    }

    /// Noise-free Gram matrix over the rows of `x`.
    pub fn gram(&self, x: &DMatrix<f64>) -> DMatrix<f64> {
        let inv = self.inv_lengthscales_sq();
        let sf2 = self.signal_var();
        let n = x.nrows();
        let mut k = DMatrix::zeros(n, n);
        for p in 0..n {
            k[(p, p)] = sf2;
            for q in 0..p {
                let v = sf2 * (-0.5 * scaled_sq_dist(x, p, q, &inv)).exp();
                k[(p, q)] = v;
                k[(q, p)] = v;
            }
        }
        k
    }

    /// Gram matrix plus observation noise on the diagonal.
    pub fn noisy_gram(&self, x: &DMatrix<f64>) -> DMatrix<f64> {
        let n = x.nrows();
        self.gram(x) + DMatrix::identity(n, n) * self.noise_var()
    }

    /// Kernel values between the rows of `x` and the point `z`.
    pub fn cross(&self, x: &DMatrix<f64>, z: &DVector<f64>) -> DVector<f64> {
        let inv = self.inv_lengthscales_sq();
        let sf2 = self.signal_var();
        DVector::from_fn(x.nrows(), |p, _| {
            let r: f64 = (0..x.ncols()).map(|d| (x[(p, d)] - z[d]).powi(2) * inv[d]).sum();
            sf2 * (-0.5 * r).exp()
        })
    }

    /// Negative log marginal likelihood of targets `y` at inputs `x` and its
    /// gradient with respect to [`SeKernel::hyperparameters`].
    ///
    /// Returns `None` when the noisy Gram matrix is not positive definite.
    pub fn neg_log_marginal_likelihood(&self, x: &DMatrix<f64>, y: &DVector<f64>) -> Option<(f64, DVector<f64>)> {
        let (n, d) = x.shape();
        let k = self.gram(x);
        let chol = (&k + DMatrix::identity(n, n) * self.noise_var()).cholesky()?;
        let alpha = chol.solve(y);
        let log_det = 2.0 * chol.l_dirty().diagonal().iter().map(|v| v.ln()).sum::<f64>();
        #[allow(clippy::cast_precision_loss)]
        let value = 0.5 * y.dot(&alpha) + 0.5 * log_det + 0.5 * n as f64 * std::f64::consts::TAU.ln();

        // ½ tr(W ∂K̃) with W = K̃⁻¹ - ααᵀ
        let w = chol.inverse() - &alpha * alpha.transpose();
        let inv = self.inv_lengthscales_sq();
        let mut grad = DVector::zeros(d + 2);
        for p in 0..n {
            for q in 0..n {
                let wk = w[(p, q)] * k[(p, q)];
                for j in 0..d {
                    grad[j] += 0.5 * wk * (x[(p, j)] - x[(q, j)]).powi(2) * inv[j];
                }
                grad[d] += wk;
            }
        }
        grad[d + 1] = self.noise_var() * w.trace();
        Some((value, grad))
    }
}

/// `Σ_d (x_pd - x_qd)² / ℓ_d²` between two rows of `x`.
pub(crate) fn scaled_sq_dist(x: &DMatrix<f64>, p: usize, q: usize, inv: &DVector<f64>) -> f64 {
    (0..x.ncols()).map(|d| (x[(p, d)] - x[(q, d)]).powi(2) * inv[d]).sum()
}

/// Penalty keeping fitted hyperparameters in a sensible range: lengthscales
/// within a factor `lengthscale_ratio` of the input spread and a
/// signal-to-noise ratio below `snr`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HyperCurb {
    pub lengthscale_ratio: f64,
    pub snr: f64,
    pub power: i32,
}

impl Default for HyperCurb {
    fn default() -> Self {
        Self { lengthscale_ratio: 100.0, snr: 500.0, power: 30 }
    }
}

impl HyperCurb {
    /// Penalty and its gradient at hyperparameters `h`, given the per-dimension
    /// standard deviation of the training inputs.
    pub fn penalty(&self, h: &DVector<f64>, input_std: &DVector<f64>) -> (f64, DVector<f64>) {
        let d = input_std.len();
        let p = self.power;
        let ls = self.lengthscale_ratio.ln();
        let snr = self.snr.ln();
        let mut grad = DVector::zeros(d + 2);
        let mut value = 0.0;
        for j in 0..d {
            let r = (h[j] - input_std[j].ln()) / ls;
            value += r.powi(p);
            grad[j] = f64::from(p) * r.powi(p - 1) / ls;
        }
        let r = (h[d] - h[d + 1]) / snr;
        value += r.powi(p);
        grad[d] = f64::from(p) * r.powi(p - 1) / snr;
        grad[d + 1] = -grad[d];
        (value, grad)
    }
}

//! Exact moment matching through weighted sums of squared-exponential basis
//! functions, `f_a(x) = Σ_i β_ia k_a(c_i, x)`.
//!
//! This covers both the posterior mean of a GP (weights `β = K̃⁻¹ y`, with the
//! model's own uncertainty added to the predictive covariance) and an RBF
//! controller (the same expansion without that extra term).

use moments::{Gaussian, Gradient, JacobianBundle, MomentError, MomentTangent, Moments, Transformed};
use nalgebra::{DMatrix, DVector};

use crate::error::MlError;
use crate::kernel::SeKernel;

#[derive(Clone, Copy, Debug)]
pub struct BasisExpansion<'a> {
    /// Basis centres, one per row (`n x D`).
    pub centers: &'a DMatrix<f64>,
    /// Weights per centre and output (`n x E`).
    pub weights: &'a DMatrix<f64>,
    /// Kernel of every output dimension.
    pub kernels: &'a [SeKernel],
    /// Per-output `K̃⁻¹` for a GP posterior whose model uncertainty enters the
    /// predictive covariance.
    pub model_uncertainty: Option<&'a [DMatrix<f64>]>,
}

/// A direction in the space of expansion parameters.
#[derive(Clone, Debug, PartialEq)]
pub struct BasisDirection {
    pub centers: DMatrix<f64>,
    pub weights: DMatrix<f64>,
    /// `D x E`, one column of log lengthscales per output.
    pub log_lengthscales: DMatrix<f64>,
}

impl BasisDirection {
    pub fn zeros(basis: usize, input_dim: usize, output_dim: usize) -> Self {
        Self {
            centers: DMatrix::zeros(basis, input_dim),
            weights: DMatrix::zeros(basis, output_dim),
            log_lengthscales: DMatrix::zeros(input_dim, output_dim),
        }
    }
}

/// Per-output quantities shared by the mean, cross term and their derivatives.
#[derive(Clone, Debug)]
struct OutputTerms {
    lam: DVector<f64>,
    inv_lam: DVector<f64>,
    /// `(s + Λ)⁻¹`
    binv: DMatrix<f64>,
    q: DVector<f64>,
    /// `(s + Λ)⁻¹ (c_i - m)` per centre
    g: Vec<DVector<f64>>,
    mean: f64,
    cross: DVector<f64>,
}

/// Quantities of one output pair `(a, b)` of the second moment.
#[derive(Clone, Debug)]
struct PairTerms {
    a: usize,
    b: usize,
    lam_ab: DVector<f64>,
    /// `R⁻¹` with `R = s (Λ_a⁻¹ + Λ_b⁻¹) + I`
    rinv: DMatrix<f64>,
    /// `R⁻¹ s`
    t: DMatrix<f64>,
    half_log_det: f64,
    log_ka: DVector<f64>,
    log_kb: DVector<f64>,
}

/// Matched moments at one input belief, kept to answer parameter tangents.
#[derive(Clone, Debug)]
pub struct Linearization<'a> {
    expansion: BasisExpansion<'a>,
    input: Gaussian,
    nu: DMatrix<f64>,
    outputs: Vec<OutputTerms>,
    pairs: Vec<PairTerms>,
    transformed: Transformed,
}

fn invalid(what: &str) -> MlError {
    MlError::Moment(MomentError::InvalidDistribution(what.to_string()))
}

impl<'a> BasisExpansion<'a> {
    pub fn basis_count(&self) -> usize {
        self.centers.nrows()
    }

    pub fn input_dim(&self) -> usize {
        self.centers.ncols()
    }

    pub fn output_dim(&self) -> usize {
        self.kernels.len()
    }

    fn check(&self, x: &Gaussian) -> Result<(), MlError> {
        let (n, d, e) = (self.basis_count(), self.input_dim(), self.output_dim());
        let mismatch = |msg: String| Err(MlError::DimensionMismatch(msg));
        if x.dim() != d {
            return mismatch(format!("belief has {} dimensions, basis centres have {d}", x.dim()));
        }
        if self.weights.shape() != (n, e) {
            return mismatch(format!("weights are {:?}, expected ({n}, {e})", self.weights.shape()));
        }
        if let Some(k) = self.kernels.iter().find(|k| k.dim() != d) {
            return mismatch(format!("kernel over {} inputs, expected {d}", k.dim()));
        }
        if let Some(inv) = self.model_uncertainty {
            if inv.len() != e || inv.iter().any(|m| m.shape() != (n, n)) {
                return mismatch("model uncertainty must hold one n x n matrix per output".into());
            }
        }
        Ok(())
    }

    /// Deterministic evaluation of every output at `x`.
    pub fn evaluate(&self, x: &DVector<f64>) -> DVector<f64> {
        DVector::from_fn(self.output_dim(), |a, _| self.kernels[a].cross(self.centers, x).dot(&self.weights.column(a)))
    }

    /// Matches the output moments for input belief `x` and differentiates them
    /// with respect to the belief.
    ///
    /// # Errors
    /// `DimensionMismatch` for inconsistent shapes and `InvalidDistribution`
    /// when `s + Λ` or `s Λ_ab + I` cannot be factorised.
    pub fn linearize(&self, x: &Gaussian) -> Result<Linearization<'a>, MlError> {
        self.check(x)?;
        let (n, d) = self.centers.shape();
        let nu = DMatrix::from_fn(n, d, |i, k| self.centers[(i, k)] - x.mean[k]);
        let outputs = (0..self.output_dim()).map(|a| self.output_terms(a, x, &nu)).collect::<Result<Vec<_>, _>>()?;
        let mut pairs = Vec::new();
        for a in 0..outputs.len() {
            for b in a..outputs.len() {
                pairs.push(self.pair_terms(a, b, x, &nu, &outputs)?);
            }
        }
        let transformed = self.transform(&nu, &outputs, &pairs);
        Ok(Linearization { expansion: *self, input: x.clone(), nu, outputs, pairs, transformed })
    }

    fn output_terms(&self, a: usize, x: &Gaussian, nu: &DMatrix<f64>) -> Result<OutputTerms, MlError> {
        let kernel = &self.kernels[a];
        let (n, d) = nu.shape();
        let lam = kernel.lengthscales_sq();
        let inv_lam = kernel.inv_lengthscales_sq();
        let chol = (&x.cov + DMatrix::from_diagonal(&lam))
            .cholesky()
            .ok_or_else(|| invalid("input covariance plus squared lengthscales is not positive definite"))?;
        let binv = chol.inverse();
        let log_det_b = 2.0 * chol.l_dirty().diagonal().iter().map(|v| v.ln()).sum::<f64>();
        let log_c = 2.0 * kernel.log_signal + kernel.log_lengthscales.sum() - 0.5 * log_det_b;

        let beta = self.weights.column(a);
        let mut q = DVector::zeros(n);
        let mut g = Vec::with_capacity(n);
        let mut w = DVector::zeros(d);
        let mut mean = 0.0;
        for i in 0..n {
            let nu_i = nu.row(i).transpose();
            let gi = &binv * &nu_i;
            q[i] = (log_c - 0.5 * nu_i.dot(&gi)).exp();
            mean += beta[i] * q[i];
            w.axpy(beta[i] * q[i], &nu_i, 1.0);
            g.push(gi);
        }
        let cross = &binv * w;
        Ok(OutputTerms { lam, inv_lam, binv, q, g, mean, cross })
    }

    fn pair_terms(
        &self,
        a: usize,
        b: usize,
        x: &Gaussian,
        nu: &DMatrix<f64>,
        outputs: &[OutputTerms],
    ) -> Result<PairTerms, MlError> {
        let (n, d) = nu.shape();
        let lam_ab = &outputs[a].inv_lam + &outputs[b].inv_lam;
        let r = &x.cov * DMatrix::from_diagonal(&lam_ab) + DMatrix::identity(d, d);
        let lu = r.lu();
        let det = lu.determinant();
        if !(det.is_finite() && det > 0.0) {
            return Err(invalid("second-moment matrix has a non-positive determinant"));
        }
        let rinv = lu.try_inverse().ok_or_else(|| invalid("second-moment matrix is singular"))?;
        let t = &rinv * &x.cov;
        let log_k = |o: &OutputTerms, kernel: &SeKernel| {
            DVector::from_fn(n, |i, _| {
                2.0 * kernel.log_signal - 0.5 * (0..d).map(|k| nu[(i, k)] * nu[(i, k)] * o.inv_lam[k]).sum::<f64>()
            })
        };
        Ok(PairTerms {
            a,
            b,
            lam_ab,
            rinv,
            t,
            half_log_det: 0.5 * det.ln(),
            log_ka: log_k(&outputs[a], &self.kernels[a]),
            log_kb: log_k(&outputs[b], &self.kernels[b]),
        })
    }

    fn transform(&self, nu: &DMatrix<f64>, outputs: &[OutputTerms], pairs: &[PairTerms]) -> Transformed {
        let (n, d) = nu.shape();
        let e = outputs.len();
        let mut moments = Moments::zeros(d, e);
        let mut jacobian = JacobianBundle::zeros(d, e);
        let mut mean_grads = Vec::with_capacity(e);

        for (a, o) in outputs.iter().enumerate() {
            let beta = self.weights.column(a);
            moments.mean[a] = o.mean;
            moments.cross.set_column(a, &o.cross);

            let mut gm = DVector::zeros(d);
            let mut gs = DMatrix::zeros(d, d);
            let mut wm = DMatrix::zeros(d, d);
            let mut third = vec![DMatrix::zeros(d, d); d];
            for i in 0..n {
                let bq = beta[i] * o.q[i];
                let gi = &o.g[i];
                gm.axpy(bq, gi, 1.0);
                gs.ger(bq, gi, gi, 1.0);
                wm.ger(bq, &nu.row(i).transpose(), gi, 1.0);
                for (r, m) in third.iter_mut().enumerate() {
                    m.ger(bq * gi[r], gi, gi, 1.0);
                }
            }
            let mean_grad = Gradient { mean: gm, cov: (gs - &o.binv * o.mean) * 0.5 };
            jacobian.set_mean_gradient(a, &mean_grad);

            let dc_dm = &o.binv * wm - &o.binv * o.mean;
            for (r, third_r) in third.iter().enumerate() {
                let cov = DMatrix::from_fn(d, d, |k, l| {
                    -o.binv[(r, k)] * o.cross[l] - 0.5 * o.binv[(l, k)] * o.cross[r] + 0.5 * third_r[(k, l)]
                });
                jacobian.set_cross_gradient(r, a, &Gradient { mean: dc_dm.row(r).transpose(), cov });
            }
            mean_grads.push(mean_grad);
        }

        for p in pairs {
            let (a, b) = (p.a, p.b);
            let (value, mut grad) = self.second_moment(p, nu, outputs);
            let mut c = value - moments.mean[a] * moments.mean[b];
            if a == b && self.model_uncertainty.is_some() {
                c += self.kernels[a].signal_var();
            }
            grad.accumulate(&mean_grads[a], -moments.mean[b]);
            grad.accumulate(&mean_grads[b], -moments.mean[a]);
            moments.cov[(a, b)] = c;
            moments.cov[(b, a)] = c;
            jacobian.set_cov_gradient(a, b, &grad);
            if a != b {
                jacobian.set_cov_gradient(b, a, &grad);
            }
        }
        Transformed { moments, jacobian }
    }

    /// `Σ_ij ω_ij Q_ij` and its gradient, where `ω = β_a β_bᵀ` less `K̃⁻¹` on
    /// the diagonal of a GP posterior.
    fn second_moment(&self, p: &PairTerms, nu: &DMatrix<f64>, outputs: &[OutputTerms]) -> (f64, Gradient) {
        let (n, d) = nu.shape();
        let (a, b) = (p.a, p.b);
        let (beta_a, beta_b) = (self.weights.column(a), self.weights.column(b));
        let inv_k = self.model_uncertainty.filter(|_| a == b).map(|m| &m[a]);
        let za: Vec<DVector<f64>> = (0..n).map(|i| nu.row(i).transpose().component_mul(&outputs[a].inv_lam)).collect();
        let zb: Vec<DVector<f64>> = (0..n).map(|j| nu.row(j).transpose().component_mul(&outputs[b].inv_lam)).collect();

        let mut value = 0.0;
        let mut gm = DVector::zeros(d);
        let mut gs = DMatrix::zeros(d, d);
        for i in 0..n {
            for j in 0..n {
                let mut omega = beta_a[i] * beta_b[j];
                if let Some(ik) = inv_k {
                    omega -= ik[(i, j)];
                }
                if omega == 0.0 {
                    continue;
                }
                let z = &za[i] + &zb[j];
                let tz = &p.t * &z;
                let wq = omega * (p.log_ka[i] + p.log_kb[j] + 0.5 * z.dot(&tz) - p.half_log_det).exp();
                value += wq;
                let zeta = &z - p.lam_ab.component_mul(&tz);
                gm.axpy(wq, &zeta, 1.0);
                gs.ger(0.5 * wq, &p.rinv.tr_mul(&z), &zeta, 1.0);
            }
        }
        gs -= p.rinv.transpose() * DMatrix::from_diagonal(&p.lam_ab) * (0.5 * value);
        (value, Gradient { mean: gm, cov: gs })
    }
}

impl Linearization<'_> {
    pub fn transformed(&self) -> &Transformed {
        &self.transformed
    }

    pub fn into_transformed(self) -> Transformed {
        self.transformed
    }

    /// Tangents of the matched moments along changes of the expansion
    /// parameters, with the input belief held fixed.
    ///
    /// The model-uncertainty term of a GP posterior is treated as constant.
    pub fn parameter_tangents(&self, directions: &[BasisDirection]) -> Vec<MomentTangent> {
        let (n, d) = self.nu.shape();
        let e = self.outputs.len();
        let mut out = vec![MomentTangent::zeros(d, e); directions.len()];

        for (a, o) in self.outputs.iter().enumerate() {
            let beta = self.expansion.weights.column(a);
            for (dir, t) in directions.iter().zip(out.iter_mut()) {
                let dl = dir.log_lengthscales.column(a);
                let dlam = o.lam.component_mul(&dl) * 2.0;
                let dlog_c = dl.sum() - 0.5 * (0..d).map(|k| o.binv[(k, k)] * dlam[k]).sum::<f64>();
                let mut dmean = 0.0;
                let mut dw = DVector::zeros(d);
                for i in 0..n {
                    let dx = dir.centers.row(i).transpose();
                    let gi = &o.g[i];
                    let spread: f64 = (0..d).map(|k| gi[k] * gi[k] * dlam[k]).sum();
                    let dq = o.q[i] * (dlog_c - gi.dot(&dx) + 0.5 * spread);
                    let coef = dir.weights[(i, a)] * o.q[i] + beta[i] * dq;
                    dmean += coef;
                    dw.axpy(coef, &self.nu.row(i).transpose(), 1.0);
                    dw.axpy(beta[i] * o.q[i], &dx, 1.0);
                }
                t.mean[a] = dmean;
                t.cross.set_column(a, &(&o.binv * (dw - dlam.component_mul(&o.cross))));
            }
        }

        let mean = &self.transformed.moments.mean;
        for p in &self.pairs {
            let dvalue = self.second_moment_tangents(p, directions);
            let (a, b) = (p.a, p.b);
            for (t, dv) in out.iter_mut().zip(dvalue) {
                let dc = dv - t.mean[a] * mean[b] - mean[a] * t.mean[b];
                t.cov[(a, b)] = dc;
                t.cov[(b, a)] = dc;
            }
        }
        out
    }

    fn second_moment_tangents(&self, p: &PairTerms, directions: &[BasisDirection]) -> Vec<f64> {
        let (n, d) = self.nu.shape();
        let (a, b) = (p.a, p.b);
        let (oa, ob) = (&self.outputs[a], &self.outputs[b]);
        let (beta_a, beta_b) = (self.expansion.weights.column(a), self.expansion.weights.column(b));
        let s = &self.input.cov;

        // Per direction: d(Λ_a⁻¹), d(Λ_b⁻¹), d(Λ_a⁻¹ + Λ_b⁻¹) and d log det R.
        let scales: Vec<(DVector<f64>, DVector<f64>, DVector<f64>, f64)> = directions
            .iter()
            .map(|dir| {
                let dia = oa.inv_lam.component_mul(&dir.log_lengthscales.column(a)) * -2.0;
                let dib = ob.inv_lam.component_mul(&dir.log_lengthscales.column(b)) * -2.0;
                let dlam_ab = &dia + &dib;
                let dlog_det = (0..d).map(|k| p.t[(k, k)] * dlam_ab[k]).sum::<f64>();
                (dia, dib, dlam_ab, dlog_det)
            })
            .collect();

        let mut dvalue = vec![0.0; directions.len()];
        for i in 0..n {
            let nu_i = self.nu.row(i).transpose();
            let za = nu_i.component_mul(&oa.inv_lam);
            for j in 0..n {
                let nu_j = self.nu.row(j).transpose();
                let zb = nu_j.component_mul(&ob.inv_lam);
                let z = &za + &zb;
                let tz = &p.t * &z;
                let q = (p.log_ka[i] + p.log_kb[j] + 0.5 * z.dot(&tz) - p.half_log_det).exp();
                let bb = beta_a[i] * beta_b[j];
                let sp = s * p.rinv.tr_mul(&z);
                for ((dir, (dia, dib, dlam_ab, dlog_det)), dv) in directions.iter().zip(&scales).zip(dvalue.iter_mut()) {
                    let dxi = dir.centers.row(i).transpose();
                    let dxj = dir.centers.row(j).transpose();
                    let dla = -za.dot(&dxi)
                        + (0..d).map(|k| nu_i[k] * nu_i[k] * oa.inv_lam[k] * dir.log_lengthscales[(k, a)]).sum::<f64>();
                    let dlb = -zb.dot(&dxj)
                        + (0..d).map(|k| nu_j[k] * nu_j[k] * ob.inv_lam[k] * dir.log_lengthscales[(k, b)]).sum::<f64>();
                    let dz = dia.component_mul(&nu_i)
                        + oa.inv_lam.component_mul(&dxi)
                        + dib.component_mul(&nu_j)
                        + ob.inv_lam.component_mul(&dxj);
                    let dlog_q = dla + dlb + tz.dot(&dz) - 0.5 * sp.dot(&dlam_ab.component_mul(&tz)) - 0.5 * dlog_det;
                    let dbb = dir.weights[(i, a)] * beta_b[j] + beta_a[i] * dir.weights[(j, b)];
                    *dv += dbb * q + bb * q * dlog_q;
                }
            }
        }
        dvalue
    }
}

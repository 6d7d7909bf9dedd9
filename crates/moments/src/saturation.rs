use nalgebra::DVector;

use crate::error::{MomentError, Result};
use crate::gaussian::{Gaussian, Moments};
use crate::jacobian::{JacobianBundle, MomentMap, MomentTangent, Tangent, Transformed};
use crate::trig::{TrigExpectation, TrigPair};

/// `(amplitude, frequency)` of the two sine terms of the squashing function.
const HARMONICS: [(f64, f64); 2] = [(9.0 / 8.0, 1.0), (1.0 / 8.0, 3.0)];

/// Smooth bounded squashing `u_i = max_i * (9 sin x_i + sin 3 x_i) / 8`.
///
/// The output lies in `[-max_i, max_i]` and reaches the bounds at `x = ±π/2`.
#[derive(Clone, Debug, PartialEq)]
pub struct Saturation {
    limits: DVector<f64>,
}

impl Saturation {
    pub fn new(limits: DVector<f64>) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> &DVector<f64> {
        &self.limits
    }

    pub fn point(&self, x: &DVector<f64>) -> DVector<f64> {
        DVector::from_fn(self.limits.len(), |i, _| {
            self.limits[i] * HARMONICS.iter().map(|&(a, k)| a * (k * x[i]).sin()).sum::<f64>()
        })
    }

    fn check(&self, d: usize) -> Result<()> {
        if d == self.limits.len() {
            Ok(())
        } else {
            Err(MomentError::DimensionMismatch(format!(
                "saturation expects {} inputs, got {d}",
                self.limits.len()
            )))
        }
    }

    /// Per-input harmonic expectations `E[sin(k x_i)]`, `E[cos(k x_i)]`.
    fn expectations(x: &Gaussian) -> Vec<[TrigExpectation; 2]> {
        (0..x.dim())
            .map(|i| HARMONICS.map(|(_, k)| TrigExpectation::new(k * x.mean[i], k * k * x.cov[(i, i)])))
            .collect()
    }

    /// # Errors
    /// `DimensionMismatch` when `x` does not match the number of limits.
    pub fn moments(&self, x: &Gaussian) -> Result<Moments> {
        let d = x.dim();
        self.check(d)?;
        let expect = Self::expectations(x);
        let mut out = Moments::zeros(d, d);
        for i in 0..d {
            let e = self.limits[i];
            out.mean[i] = e * HARMONICS.iter().zip(&expect[i]).map(|(&(a, _), t)| a * t.sin).sum::<f64>();
            out.cross[(i, i)] = e * HARMONICS.iter().zip(&expect[i]).map(|(&(a, k), t)| a * k * t.cos).sum::<f64>();
        }
        for i in 0..d {
            for j in i..d {
                if x.cov[(i, i)] == 0.0 || x.cov[(j, j)] == 0.0 {
                    continue;
                }
                let mut c = 0.0;
                for (r, &(ar, kr)) in HARMONICS.iter().enumerate() {
                    for (q, &(aq, kq)) in HARMONICS.iter().enumerate() {
                        let pair = TrigPair::new(&x.mean, &x.cov, (kr, i), (kq, j));
                        c += ar * aq * (pair.sin_sin() - expect[i][r].sin * expect[j][q].sin);
                    }
                }
                c *= self.limits[i] * self.limits[j];
                out.cov[(i, j)] = c;
                out.cov[(j, i)] = c;
            }
        }
        Ok(out)
    }

    /// Directional derivative of [`Saturation::moments`] along `t`.
    pub fn tangent(&self, x: &Gaussian, t: &Tangent) -> MomentTangent {
        let d = x.dim();
        let expect = Self::expectations(x);
        let dexpect: Vec<[TrigExpectation; 2]> = (0..d)
            .map(|i| {
                let mut out = expect[i];
                for (o, &(_, k)) in out.iter_mut().zip(&HARMONICS) {
                    *o = o.tangent(k * t.mean[i], k * k * t.cov[(i, i)]);
                }
                out
            })
            .collect();
        let mut out = MomentTangent::zeros(d, d);
        for i in 0..d {
            let e = self.limits[i];
            out.mean[i] = e * HARMONICS.iter().zip(&dexpect[i]).map(|(&(a, _), t)| a * t.sin).sum::<f64>();
            out.cross[(i, i)] = e * HARMONICS.iter().zip(&dexpect[i]).map(|(&(a, k), t)| a * k * t.cos).sum::<f64>();
        }
        for i in 0..d {
            for j in i..d {
                let mut c = 0.0;
                for (r, &(ar, kr)) in HARMONICS.iter().enumerate() {
                    for (q, &(aq, kq)) in HARMONICS.iter().enumerate() {
                        let dpair = TrigPair::new(&x.mean, &x.cov, (kr, i), (kq, j)).tangent(&t.mean, &t.cov);
                        let product =
                            dexpect[i][r].sin * expect[j][q].sin + expect[i][r].sin * dexpect[j][q].sin;
                        c += ar * aq * (dpair.sin_sin() - product);
                    }
                }
                c *= self.limits[i] * self.limits[j];
                out.cov[(i, j)] = c;
                out.cov[(j, i)] = c;
            }
        }
        out
    }
}

impl MomentMap for Saturation {
    fn output_dim(&self, _input_dim: usize) -> usize {
        self.limits.len()
    }

    fn apply(&self, input: &Gaussian) -> Result<Transformed> {
        let moments = self.moments(input)?;
        let jacobian = JacobianBundle::from_tangents(input.dim(), moments.dim(), |t| self.tangent(input, t));
        Ok(Transformed { moments, jacobian })
    }
}

use nalgebra::{DMatrix, DVector};

use crate::error::{MomentError, Result};
use crate::gaussian::{Gaussian, Moments};
use crate::jacobian::{JacobianBundle, MomentMap, MomentTangent, Tangent, Transformed};
use crate::trig::{TrigExpectation, TrigPair};

/// Replaces angular coordinates by their `(sin, cos)` pairs.
///
/// For angle list `[a_1, .., a_n]` the output is
/// `[sin x_a1, cos x_a1, sin x_a2, cos x_a2, ..]`, optionally scaled per angle
/// (a scale `r` yields `[r sin, r cos]`, the position of a point at radius `r`).
#[derive(Clone, Debug, PartialEq)]
pub struct AngleAugment {
    angles: Vec<usize>,
    scales: Vec<f64>,
}

impl AngleAugment {
    pub fn new(angles: Vec<usize>) -> Self {
        let scales = vec![1.0; angles.len()];
        Self { angles, scales }
    }

    /// # Errors
    /// `DimensionMismatch` when `scales` and `angles` differ in length.
    pub fn with_scales(angles: Vec<usize>, scales: Vec<f64>) -> Result<Self> {
        if angles.len() != scales.len() {
            return Err(MomentError::DimensionMismatch(format!(
                "{} angles but {} scales",
                angles.len(),
                scales.len()
            )));
        }
        Ok(Self { angles, scales })
    }

    pub fn angles(&self) -> &[usize] {
        &self.angles
    }

    /// Slot of the sine of `angle` in the output, if `angle` is augmented.
    pub fn sin_slot(&self, angle: usize) -> Option<usize> {
        self.angles.iter().position(|&a| a == angle).map(|k| 2 * k)
    }

    /// `(sin, cos)` of a deterministic point.
    pub fn point(&self, x: &DVector<f64>) -> DVector<f64> {
        let mut out = DVector::zeros(2 * self.angles.len());
        for (k, (&i, &r)) in self.angles.iter().zip(&self.scales).enumerate() {
            out[2 * k] = r * x[i].sin();
            out[2 * k + 1] = r * x[i].cos();
        }
        out
    }

    fn check(&self, d: usize) -> Result<()> {
        for (k, &i) in self.angles.iter().enumerate() {
            if i >= d {
                return Err(MomentError::DimensionMismatch(format!("angle index {i} outside a {d}-dimensional belief")));
            }
            if self.angles[..k].contains(&i) {
                return Err(MomentError::DimensionMismatch(format!("angle index {i} listed twice")));
            }
        }
        Ok(())
    }

    fn expectations(&self, x: &Gaussian) -> Vec<TrigExpectation> {
        self.angles.iter().map(|&i| TrigExpectation::new(x.mean[i], x.cov[(i, i)])).collect()
    }

    /// # Errors
    /// `DimensionMismatch` when an angle index falls outside the belief.
    pub fn moments(&self, x: &Gaussian) -> Result<Moments> {
        self.check(x.dim())?;
        let n = self.angles.len();
        let expect = self.expectations(x);
        let mut out = Moments::zeros(x.dim(), 2 * n);
        for (k, (&i, e)) in self.angles.iter().zip(&expect).enumerate() {
            let r = self.scales[k];
            out.mean[2 * k] = r * e.sin;
            out.mean[2 * k + 1] = r * e.cos;
            out.cross[(i, 2 * k)] = r * e.cos;
            out.cross[(i, 2 * k + 1)] = -r * e.sin;
        }
        for k in 0..n {
            for l in k..n {
                let (i, j) = (self.angles[k], self.angles[l]);
                // A deterministic angle has deterministic sin and cos.
                if x.cov[(i, i)] == 0.0 || x.cov[(j, j)] == 0.0 {
                    continue;
                }
                let pair = TrigPair::new(&x.mean, &x.cov, (1.0, i), (1.0, j));
                let block = block(&pair, &expect[k], &expect[l], None) * (self.scales[k] * self.scales[l]);
                write_block(&mut out.cov, k, l, &block);
            }
        }
        Ok(out)
    }

    /// Directional derivative of [`AngleAugment::moments`] along `t`.
    pub fn tangent(&self, x: &Gaussian, t: &Tangent) -> MomentTangent {
        let n = self.angles.len();
        let expect = self.expectations(x);
        let dexpect: Vec<TrigExpectation> = self
            .angles
            .iter()
            .zip(&expect)
            .map(|(&i, e)| e.tangent(t.mean[i], t.cov[(i, i)]))
            .collect();
        let mut out = MomentTangent::zeros(x.dim(), 2 * n);
        for (k, (&i, de)) in self.angles.iter().zip(&dexpect).enumerate() {
            let r = self.scales[k];
            out.mean[2 * k] = r * de.sin;
            out.mean[2 * k + 1] = r * de.cos;
            out.cross[(i, 2 * k)] = r * de.cos;
            out.cross[(i, 2 * k + 1)] = -r * de.sin;
        }
        for k in 0..n {
            for l in k..n {
                let (i, j) = (self.angles[k], self.angles[l]);
                let dpair = TrigPair::new(&x.mean, &x.cov, (1.0, i), (1.0, j)).tangent(&t.mean, &t.cov);
                let products = Some((&dexpect[k], &dexpect[l]));
                let block = block(&dpair, &expect[k], &expect[l], products) * (self.scales[k] * self.scales[l]);
                write_block(&mut out.cov, k, l, &block);
            }
        }
        out
    }

    /// Joint belief over `[x; sin/cos]` and the bundle of that joint map.
    ///
    /// The joint map's cross term is `[I | C]`.
    ///
    /// # Errors
    /// Same as [`AngleAugment::moments`].
    pub fn joint(&self, x: &Gaussian) -> Result<(Gaussian, JacobianBundle)> {
        let Transformed { moments, jacobian } = self.apply(x)?;
        let d = x.dim();
        let e = moments.dim();
        let joint = x.extend(&moments);
        let bundle = JacobianBundle::from_tangents(d, d + e, |t| {
            let dout = jacobian.push(t);
            let dj = x.extend_tangent(&moments, t, &dout);
            let mut cross = DMatrix::zeros(d, d + e);
            cross.view_mut((0, d), (d, e)).copy_from(&dout.cross);
            MomentTangent { mean: dj.mean, cov: dj.cov, cross }
        });
        Ok((joint, bundle))
    }
}

impl MomentMap for AngleAugment {
    fn output_dim(&self, _input_dim: usize) -> usize {
        2 * self.angles.len()
    }

    fn apply(&self, input: &Gaussian) -> Result<Transformed> {
        let moments = self.moments(input)?;
        let jacobian = JacobianBundle::from_tangents(input.dim(), moments.dim(), |t| self.tangent(input, t));
        Ok(Transformed { moments, jacobian })
    }
}

/// Covariance block `[[ss, sc], [cs, cc]]` between angle pair `(k, l)`.
///
/// With `products` set, `pair` holds derivatives and the mean products are
/// differentiated by the product rule.
fn block(
    pair: &TrigPair,
    ek: &TrigExpectation,
    el: &TrigExpectation,
    products: Option<(&TrigExpectation, &TrigExpectation)>,
) -> DMatrix<f64> {
    let product = |f: fn(&TrigExpectation) -> f64, g: fn(&TrigExpectation) -> f64| match products {
        None => f(ek) * g(el),
        Some((dk, dl)) => f(dk) * g(el) + f(ek) * g(dl),
    };
    let sin = |e: &TrigExpectation| e.sin;
    let cos = |e: &TrigExpectation| e.cos;
    DMatrix::from_row_slice(
        2,
        2,
        &[
            pair.sin_sin() - product(sin, sin),
            pair.sin_cos() - product(sin, cos),
            pair.cos_sin() - product(cos, sin),
            pair.cos_cos() - product(cos, cos),
        ],
    )
}

fn write_block(cov: &mut DMatrix<f64>, k: usize, l: usize, block: &DMatrix<f64>) {
    for r in 0..2 {
        for c in 0..2 {
            cov[(2 * k + r, 2 * l + c)] = block[(r, c)];
            cov[(2 * l + c, 2 * k + r)] = block[(r, c)];
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic_angles_have_exact_moments() {
        let x = Gaussian::point(DVector::from_vec(vec![0.3, 1.2]));
        let out = AngleAugment::new(vec![1]).moments(&x).unwrap();
        assert_eq!(out.mean[0], 1.2_f64.sin());
        assert_eq!(out.mean[1], 1.2_f64.cos());
        assert!(out.cov.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn rejects_out_of_range_angle() {
        let x = Gaussian::point(DVector::zeros(2));
        assert!(matches!(AngleAugment::new(vec![2]).moments(&x), Err(MomentError::DimensionMismatch(_))));
    }
}

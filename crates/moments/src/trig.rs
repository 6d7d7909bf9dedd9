use nalgebra::{DMatrix, DVector};

/// `E[sin u]` and `E[cos u]` for `u ~ N(mean, var)`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TrigExpectation {
    pub sin: f64,
    pub cos: f64,
}

impl TrigExpectation {
    pub fn new(mean: f64, var: f64) -> Self {
        let decay = (-0.5 * var).exp();
        Self { sin: mean.sin() * decay, cos: mean.cos() * decay }
    }

    /// Change of both expectations when `u`'s mean moves by `d_mean` and its
    /// variance by `d_var`.
    pub fn tangent(&self, d_mean: f64, d_var: f64) -> Self {
        Self {
            sin: self.cos * d_mean - 0.5 * self.sin * d_var,
            cos: -self.sin * d_mean - 0.5 * self.cos * d_var,
        }
    }
}

/// Product expectations of `(sin, cos)(a * x_i)` against `(sin, cos)(b * x_j)`
/// for jointly Gaussian `x`, built from the laws of `a x_i - b x_j` and
/// `a x_i + b x_j`.
///
/// All accessors are linear in the two underlying expectations, so the value
/// returned by [`TrigPair::tangent`] answers the same accessors with
/// derivatives instead of values.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TrigPair {
    a: (f64, usize),
    b: (f64, usize),
    diff: TrigExpectation,
    sum: TrigExpectation,
}

impl TrigPair {
    pub fn new(m: &DVector<f64>, s: &DMatrix<f64>, a: (f64, usize), b: (f64, usize)) -> Self {
        let ((ka, i), (kb, j)) = (a, b);
        let own = ka * ka * s[(i, i)] + kb * kb * s[(j, j)];
        let shared = ka * kb * (s[(i, j)] + s[(j, i)]);
        Self {
            a,
            b,
            diff: TrigExpectation::new(ka * m[i] - kb * m[j], own - shared),
            sum: TrigExpectation::new(ka * m[i] + kb * m[j], own + shared),
        }
    }

    pub fn tangent(&self, dm: &DVector<f64>, ds: &DMatrix<f64>) -> Self {
        let ((ka, i), (kb, j)) = (self.a, self.b);
        let own = ka * ka * ds[(i, i)] + kb * kb * ds[(j, j)];
        let shared = ka * kb * (ds[(i, j)] + ds[(j, i)]);
        Self {
            diff: self.diff.tangent(ka * dm[i] - kb * dm[j], own - shared),
            sum: self.sum.tangent(ka * dm[i] + kb * dm[j], own + shared),
            ..*self
        }
    }

    /// `E[sin(a x_i) sin(b x_j)]`
    pub fn sin_sin(&self) -> f64 {
        0.5 * (self.diff.cos - self.sum.cos)
    }

    /// `E[cos(a x_i) cos(b x_j)]`
    pub fn cos_cos(&self) -> f64 {
        0.5 * (self.diff.cos + self.sum.cos)
    }

    /// `E[sin(a x_i) cos(b x_j)]`
    pub fn sin_cos(&self) -> f64 {
        0.5 * (self.sum.sin + self.diff.sin)
    }

    /// `E[cos(a x_i) sin(b x_j)]`
    pub fn cos_sin(&self) -> f64 {
        0.5 * (self.sum.sin - self.diff.sin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn self_pair_matches_double_angle() {
        let m = DVector::from_vec(vec![0.7]);
        let s = DMatrix::from_element(1, 1, 0.3);
        let pair = TrigPair::new(&m, &s, (1.0, 0), (1.0, 0));
        // E[sin^2 x] = (1 - E[cos 2x]) / 2
        let expected = 0.5 * (1.0 - (1.4_f64).cos() * (-2.0 * 0.3_f64).exp());
        assert_relative_eq!(pair.sin_sin(), expected, epsilon = 1e-14);
        assert_relative_eq!(pair.sin_sin() + pair.cos_cos(), 1.0, epsilon = 1e-14);
    }
}

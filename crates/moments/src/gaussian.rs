use nalgebra::{DMatrix, DVector};

use crate::error::{MomentError, Result};
use crate::jacobian::{MomentTangent, Tangent};

/// Diagonal jitter, relative to `1 + max |s_ii|`, used by the positive semi-definite check.
pub const PSD_JITTER: f64 = 1e-9;

/// Largest tolerated asymmetry of a covariance, relative to `1 + max |s_ii|`.
pub const SYMMETRY_TOLERANCE: f64 = 1e-8;

/// Multivariate normal belief over a state vector.
#[derive(Clone, Debug, PartialEq)]
pub struct Gaussian {
    pub mean: DVector<f64>,
    pub cov: DMatrix<f64>,
}

/// Moments of a transformed belief `y = f(x)`.
#[derive(Clone, Debug, PartialEq)]
pub struct Moments {
    pub mean: DVector<f64>,
    pub cov: DMatrix<f64>,
    /// `cov(x)^-1 * cov(x, y)`, `D x E`.
    pub cross: DMatrix<f64>,
}

impl Gaussian {
    /// # Errors
    /// `DimensionMismatch` when the covariance is not `len(mean)` square.
    pub fn new(mean: DVector<f64>, cov: DMatrix<f64>) -> Result<Self> {
        if cov.nrows() != mean.len() || cov.ncols() != mean.len() {
            return Err(MomentError::DimensionMismatch(format!(
                "mean has {} entries but covariance is {}x{}",
                mean.len(),
                cov.nrows(),
                cov.ncols()
            )));
        }
        Ok(Self { mean, cov })
    }

    /// A deterministic belief: zero covariance around `mean`.
    pub fn point(mean: DVector<f64>) -> Self {
        let d = mean.len();
        Self { mean, cov: DMatrix::zeros(d, d) }
    }

    pub fn dim(&self) -> usize {
        self.mean.len()
    }

    /// Marginal over the coordinates `idx`, in that order.
    pub fn marginal(&self, idx: &[usize]) -> Gaussian {
        Gaussian { mean: select_vector(&self.mean, idx), cov: select_matrix(&self.cov, idx, idx) }
    }

    /// Checks that the belief is usable for propagation.
    ///
    /// The covariance must be finite, symmetric within [`SYMMETRY_TOLERANCE`] and
    /// admit a Cholesky factorisation once a [`PSD_JITTER`] diagonal is added.
    ///
    /// # Errors
    /// `InvalidDistribution` describing the first failed check.
    pub fn validate(&self) -> Result<()> {
        if !self.mean.iter().chain(self.cov.iter()).all(|v| v.is_finite()) {
            return Err(MomentError::InvalidDistribution("non-finite moments".into()));
        }
        let scale = self.scale();
        let asymmetry = if self.dim() == 0 { 0.0 } else { (&self.cov - self.cov.transpose()).amax() };
        if asymmetry > SYMMETRY_TOLERANCE * scale {
            return Err(MomentError::InvalidDistribution(format!(
                "covariance is not symmetric (max asymmetry {asymmetry:e})"
            )));
        }
        self.jittered_factor().map(|_| ())
    }

    /// Lower Cholesky factor of the jittered covariance, for sampling.
    ///
    /// # Errors
    /// `InvalidDistribution` when the covariance is not positive semi-definite.
    pub fn cholesky_factor(&self) -> Result<DMatrix<f64>> {
        self.jittered_factor()
    }

    fn scale(&self) -> f64 {
        1.0 + self.cov.diagonal().iter().fold(0.0_f64, |acc, v| acc.max(v.abs()))
    }

    fn jittered_factor(&self) -> Result<DMatrix<f64>> {
        let d = self.dim();
        let jittered = symmetrize(&self.cov) + DMatrix::identity(d, d) * (PSD_JITTER * self.scale());
        jittered
            .cholesky()
            .map(|c| c.l())
            .ok_or_else(|| MomentError::InvalidDistribution("covariance is not positive semi-definite".into()))
    }

    /// Joint belief over `[x; y]` where `y` is the output of a transform applied to `x[idx]`.
    pub fn augment(&self, idx: &[usize], out: &Moments) -> Gaussian {
        let cross = select_columns(&self.cov, idx) * &out.cross;
        let (mean, cov) = stack(&self.mean, &out.mean, &self.cov, &cross, &out.cov);
        Gaussian { mean, cov }
    }

    /// [`Gaussian::augment`] where the transform consumed the whole belief.
    pub fn extend(&self, out: &Moments) -> Gaussian {
        let idx: Vec<usize> = (0..self.dim()).collect();
        self.augment(&idx, out)
    }

    /// Tangent of [`Gaussian::augment`] given the tangent `t` of this belief and
    /// the tangent `dout` of the transform output.
    pub fn augment_tangent(&self, idx: &[usize], out: &Moments, t: &Tangent, dout: &MomentTangent) -> Tangent {
        let cross = select_columns(&t.cov, idx) * &out.cross + select_columns(&self.cov, idx) * &dout.cross;
        let (mean, cov) = stack(&t.mean, &dout.mean, &t.cov, &cross, &dout.cov);
        Tangent { mean, cov }
    }

    pub fn extend_tangent(&self, out: &Moments, t: &Tangent, dout: &MomentTangent) -> Tangent {
        let idx: Vec<usize> = (0..self.dim()).collect();
        self.augment_tangent(&idx, out, t, dout)
    }
}

impl Moments {
    pub fn zeros(input_dim: usize, output_dim: usize) -> Self {
        Self {
            mean: DVector::zeros(output_dim),
            cov: DMatrix::zeros(output_dim, output_dim),
            cross: DMatrix::zeros(input_dim, output_dim),
        }
    }

    pub fn dim(&self) -> usize {
        self.mean.len()
    }

    /// Output belief, dropping the cross term.
    pub fn to_gaussian(&self) -> Gaussian {
        Gaussian { mean: self.mean.clone(), cov: self.cov.clone() }
    }

    /// Moments of `second ∘ self`, where `second` was applied to this output.
    pub fn then(&self, second: &Moments) -> Moments {
        Moments { mean: second.mean.clone(), cov: second.cov.clone(), cross: &self.cross * &second.cross }
    }
}

fn stack(
    top: &DVector<f64>,
    bottom: &DVector<f64>,
    top_cov: &DMatrix<f64>,
    cross: &DMatrix<f64>,
    bottom_cov: &DMatrix<f64>,
) -> (DVector<f64>, DMatrix<f64>) {
    let (d, e) = (top.len(), bottom.len());
    let mut mean = DVector::zeros(d + e);
    mean.rows_mut(0, d).copy_from(top);
    mean.rows_mut(d, e).copy_from(bottom);

    let mut cov = DMatrix::zeros(d + e, d + e);
    cov.view_mut((0, 0), (d, d)).copy_from(top_cov);
    cov.view_mut((0, d), (d, e)).copy_from(cross);
    cov.view_mut((d, 0), (e, d)).copy_from(&cross.transpose());
    cov.view_mut((d, d), (e, e)).copy_from(bottom_cov);
    (mean, cov)
}

pub fn select_vector(v: &DVector<f64>, idx: &[usize]) -> DVector<f64> {
    DVector::from_fn(idx.len(), |r, _| v[idx[r]])
}

pub fn select_matrix(m: &DMatrix<f64>, rows: &[usize], cols: &[usize]) -> DMatrix<f64> {
    DMatrix::from_fn(rows.len(), cols.len(), |r, c| m[(rows[r], cols[c])])
}

pub fn select_columns(m: &DMatrix<f64>, cols: &[usize]) -> DMatrix<f64> {
    DMatrix::from_fn(m.nrows(), cols.len(), |r, c| m[(r, cols[c])])
}

pub fn symmetrize(m: &DMatrix<f64>) -> DMatrix<f64> {
    (m + m.transpose()) * 0.5
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_indefinite_covariance() {
        let g = Gaussian::new(DVector::zeros(2), DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 2.0, 1.0])).unwrap();
        assert!(matches!(g.validate(), Err(MomentError::InvalidDistribution(_))));
    }

    #[test]
    fn accepts_point_mass() {
        let g = Gaussian::point(DVector::from_vec(vec![1.0, -2.0, 0.5]));
        assert!(g.validate().is_ok());
    }

    #[test]
    fn marginal_keeps_requested_order() {
        let cov = DMatrix::from_fn(3, 3, |i, j| if i == j { 1.0 + i as f64 } else { 0.1 * (i + j) as f64 });
        let g = Gaussian::new(DVector::from_vec(vec![0.0, 1.0, 2.0]), cov).unwrap();
        let m = g.marginal(&[2, 0]);
        assert_eq!(m.mean.as_slice(), &[2.0, 0.0]);
        assert_eq!(m.cov[(0, 0)], 3.0);
        assert_eq!(m.cov[(0, 1)], 0.2);
    }
}

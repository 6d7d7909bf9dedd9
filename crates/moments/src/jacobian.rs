use nalgebra::{DMatrix, DVector};

use crate::error::Result;
use crate::gaussian::{select_matrix, select_vector, Gaussian, Moments};

/// First-order perturbation of a belief.
#[derive(Clone, Debug, PartialEq)]
pub struct Tangent {
    pub mean: DVector<f64>,
    pub cov: DMatrix<f64>,
}

/// First-order perturbation of a transform's output moments.
#[derive(Clone, Debug, PartialEq)]
pub struct MomentTangent {
    pub mean: DVector<f64>,
    pub cov: DMatrix<f64>,
    pub cross: DMatrix<f64>,
}

/// Derivative of a scalar with respect to a belief's mean and covariance.
#[derive(Clone, Debug, PartialEq)]
pub struct Gradient {
    pub mean: DVector<f64>,
    pub cov: DMatrix<f64>,
}

/// Output of a moment-matching transform together with its sensitivities.
#[derive(Clone, Debug)]
pub struct Transformed {
    pub moments: Moments,
    pub jacobian: JacobianBundle,
}

/// A transform that maps a Gaussian belief to matched output moments.
pub trait MomentMap {
    /// Output dimension for an input belief of dimension `input_dim`.
    fn output_dim(&self, input_dim: usize) -> usize;

    /// Matches the moments of the transformed belief and differentiates them.
    ///
    /// # Errors
    /// Implementations report `InvalidDistribution` for unusable inputs and
    /// `DimensionMismatch` when `input` has the wrong size.
    fn apply(&self, input: &Gaussian) -> Result<Transformed>;
}

impl Tangent {
    pub fn zeros(d: usize) -> Self {
        Self { mean: DVector::zeros(d), cov: DMatrix::zeros(d, d) }
    }

    /// Unit change of the mean along coordinate `i`.
    pub fn mean_direction(d: usize, i: usize) -> Self {
        let mut t = Self::zeros(d);
        t.mean[i] = 1.0;
        t
    }

    /// Unit change of the single covariance entry `(k, l)`.
    pub fn cov_direction(d: usize, k: usize, l: usize) -> Self {
        let mut t = Self::zeros(d);
        t.cov[(k, l)] = 1.0;
        t
    }

    /// Restriction to the coordinates `idx`.
    pub fn select(&self, idx: &[usize]) -> Tangent {
        Tangent { mean: select_vector(&self.mean, idx), cov: select_matrix(&self.cov, idx, idx) }
    }
}

impl MomentTangent {
    pub fn zeros(input_dim: usize, output_dim: usize) -> Self {
        Self {
            mean: DVector::zeros(output_dim),
            cov: DMatrix::zeros(output_dim, output_dim),
            cross: DMatrix::zeros(input_dim, output_dim),
        }
    }

    pub fn as_tangent(&self) -> Tangent {
        Tangent { mean: self.mean.clone(), cov: self.cov.clone() }
    }

    pub fn accumulate(&mut self, other: &MomentTangent) {
        self.mean += &other.mean;
        self.cov += &other.cov;
        self.cross += &other.cross;
    }

    /// Tangent of `second ∘ first` given this tangent of `first`'s output.
    pub fn then(&self, first: &Moments, second: &Moments, second_jacobian: &JacobianBundle) -> MomentTangent {
        let inner = second_jacobian.push(&self.as_tangent());
        MomentTangent {
            mean: inner.mean,
            cov: inner.cov,
            cross: &self.cross * &second.cross + &first.cross * &inner.cross,
        }
    }
}

impl Gradient {
    pub fn zeros(d: usize) -> Self {
        Self { mean: DVector::zeros(d), cov: DMatrix::zeros(d, d) }
    }

    /// Directional derivative along `t`.
    pub fn dot(&self, t: &Tangent) -> f64 {
        self.mean.dot(&t.mean) + self.cov.dot(&t.cov)
    }

    /// `self += weight * other`
    pub fn accumulate(&mut self, other: &Gradient, weight: f64) {
        self.mean.axpy(weight, &other.mean, 1.0);
        self.cov += &other.cov * weight;
    }
}

/// Sensitivities of a transform's `(M, S, C)` to its input `(m, s)`.
///
/// Each block is stored as a dense matrix whose rows enumerate the output
/// entries and whose columns enumerate the input entries. Matrices are
/// flattened column-major; callers go through the accessors instead of
/// computing flat indices.
#[derive(Clone, Debug, PartialEq)]
pub struct JacobianBundle {
    input_dim: usize,
    output_dim: usize,
    mean_mean: DMatrix<f64>,
    mean_cov: DMatrix<f64>,
    cov_mean: DMatrix<f64>,
    cov_cov: DMatrix<f64>,
    cross_mean: DMatrix<f64>,
    cross_cov: DMatrix<f64>,
}

impl JacobianBundle {
    pub fn zeros(input_dim: usize, output_dim: usize) -> Self {
        let (d, e) = (input_dim, output_dim);
        Self {
            input_dim,
            output_dim,
            mean_mean: DMatrix::zeros(e, d),
            mean_cov: DMatrix::zeros(e, d * d),
            cov_mean: DMatrix::zeros(e * e, d),
            cov_cov: DMatrix::zeros(e * e, d * d),
            cross_mean: DMatrix::zeros(d * e, d),
            cross_cov: DMatrix::zeros(d * e, d * d),
        }
    }

    /// Builds the bundle column by column from a directional derivative `f`,
    /// probing every mean coordinate and every single covariance entry.
    pub fn from_tangents<F>(input_dim: usize, output_dim: usize, mut f: F) -> Self
    where
        F: FnMut(&Tangent) -> MomentTangent,
    {
        let d = input_dim;
        let mut jac = Self::zeros(input_dim, output_dim);
        for i in 0..d {
            let out = f(&Tangent::mean_direction(d, i));
            jac.mean_mean.set_column(i, &out.mean);
            jac.cov_mean.set_column(i, &flatten(&out.cov));
            jac.cross_mean.set_column(i, &flatten(&out.cross));
        }
        for l in 0..d {
            for k in 0..d {
                let out = f(&Tangent::cov_direction(d, k, l));
                let c = k + l * d;
                jac.mean_cov.set_column(c, &out.mean);
                jac.cov_cov.set_column(c, &flatten(&out.cov));
                jac.cross_cov.set_column(c, &flatten(&out.cross));
            }
        }
        jac
    }

    /// Bundle of `second ∘ first`.
    pub fn chain(first: &Moments, first_jacobian: &Self, second: &Moments, second_jacobian: &Self) -> Self {
        Self::from_tangents(first_jacobian.input_dim, second_jacobian.output_dim, |t| {
            first_jacobian.push(t).then(first, second, second_jacobian)
        })
    }

    pub fn input_dim(&self) -> usize {
        self.input_dim
    }

    pub fn output_dim(&self) -> usize {
        self.output_dim
    }

    fn input(&self, k: usize, l: usize) -> usize {
        k + l * self.input_dim
    }

    fn output(&self, a: usize, b: usize) -> usize {
        a + b * self.output_dim
    }

    fn cross_entry(&self, i: usize, a: usize) -> usize {
        i + a * self.input_dim
    }

    pub fn mean_wrt_mean(&self, o: usize, i: usize) -> f64 {
        self.mean_mean[(o, i)]
    }

    pub fn mean_wrt_cov(&self, o: usize, k: usize, l: usize) -> f64 {
        self.mean_cov[(o, self.input(k, l))]
    }

    pub fn cov_wrt_mean(&self, a: usize, b: usize, i: usize) -> f64 {
        self.cov_mean[(self.output(a, b), i)]
    }

    pub fn cov_wrt_cov(&self, a: usize, b: usize, k: usize, l: usize) -> f64 {
        self.cov_cov[(self.output(a, b), self.input(k, l))]
    }

    pub fn cross_wrt_mean(&self, i: usize, a: usize, k: usize) -> f64 {
        self.cross_mean[(self.cross_entry(i, a), k)]
    }

    pub fn cross_wrt_cov(&self, i: usize, a: usize, k: usize, l: usize) -> f64 {
        self.cross_cov[(self.cross_entry(i, a), self.input(k, l))]
    }

    /// Gradient of the output mean entry `o`.
    pub fn mean_gradient(&self, o: usize) -> Gradient {
        self.row_gradient(&self.mean_mean, &self.mean_cov, o)
    }

    /// Gradient of the output covariance entry `(a, b)`.
    pub fn cov_gradient(&self, a: usize, b: usize) -> Gradient {
        self.row_gradient(&self.cov_mean, &self.cov_cov, self.output(a, b))
    }

    /// Gradient of the cross-term entry `(i, a)`.
    pub fn cross_gradient(&self, i: usize, a: usize) -> Gradient {
        self.row_gradient(&self.cross_mean, &self.cross_cov, self.cross_entry(i, a))
    }

    pub fn set_mean_gradient(&mut self, o: usize, g: &Gradient) {
        set_row(&mut self.mean_mean, &mut self.mean_cov, o, g);
    }

    pub fn set_cov_gradient(&mut self, a: usize, b: usize, g: &Gradient) {
        let row = self.output(a, b);
        set_row(&mut self.cov_mean, &mut self.cov_cov, row, g);
    }

    pub fn set_cross_gradient(&mut self, i: usize, a: usize, g: &Gradient) {
        let row = self.cross_entry(i, a);
        set_row(&mut self.cross_mean, &mut self.cross_cov, row, g);
    }

    fn row_gradient(&self, wrt_mean: &DMatrix<f64>, wrt_cov: &DMatrix<f64>, row: usize) -> Gradient {
        let d = self.input_dim;
        Gradient {
            mean: wrt_mean.row(row).transpose(),
            cov: DMatrix::from_column_slice(d, d, wrt_cov.row(row).transpose().as_slice()),
        }
    }

    /// Output tangent for an input tangent `t`.
    pub fn push(&self, t: &Tangent) -> MomentTangent {
        let ds = flatten(&t.cov);
        let mean = &self.mean_mean * &t.mean + &self.mean_cov * &ds;
        let cov = &self.cov_mean * &t.mean + &self.cov_cov * &ds;
        let cross = &self.cross_mean * &t.mean + &self.cross_cov * &ds;
        MomentTangent {
            mean,
            cov: unflatten(&cov, self.output_dim, self.output_dim),
            cross: unflatten(&cross, self.input_dim, self.output_dim),
        }
    }

    /// Input gradient of a scalar whose gradient with respect to the output
    /// mean and covariance is `g`.
    pub fn pullback(&self, g: &Gradient) -> Gradient {
        let dg = flatten(&g.cov);
        let mean = self.mean_mean.tr_mul(&g.mean) + self.cov_mean.tr_mul(&dg);
        let cov = self.mean_cov.tr_mul(&g.mean) + self.cov_cov.tr_mul(&dg);
        Gradient { mean, cov: unflatten(&cov, self.input_dim, self.input_dim) }
    }
}

fn set_row(wrt_mean: &mut DMatrix<f64>, wrt_cov: &mut DMatrix<f64>, row: usize, g: &Gradient) {
    wrt_mean.set_row(row, &g.mean.transpose());
    wrt_cov.set_row(row, &flatten(&g.cov).transpose());
}

fn flatten(m: &DMatrix<f64>) -> DVector<f64> {
    DVector::from_column_slice(m.as_slice())
}

fn unflatten(v: &DVector<f64>, rows: usize, cols: usize) -> DMatrix<f64> {
    DMatrix::from_column_slice(rows, cols, v.as_slice())
}

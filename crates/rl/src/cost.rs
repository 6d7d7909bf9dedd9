//! Saturating immediate cost of a state belief.

use moments::{AngleAugment, Gaussian, Gradient, MomentError};
use nalgebra::{DMatrix, DVector};
use physics::StageCost;

use crate::error::PilcoError;
use crate::scenario::CostConfig;

/// Variance below which the exploration term is skipped.
const EXPLORATION_FLOOR: f64 = 1e-12;

/// `c(x) = 1 - exp(-½ (x - z)ᵀ W (x - z))`.
#[derive(Clone, Debug, PartialEq)]
pub struct SaturatingCost {
    target: DVector<f64>,
    weight: DMatrix<f64>,
}

/// Mean and variance of the cost under a belief, with their gradients.
#[derive(Clone, Debug, PartialEq)]
pub struct CostMoments {
    pub mean: f64,
    pub mean_gradient: Gradient,
    pub variance: f64,
    pub variance_gradient: Gradient,
}

impl SaturatingCost {
    /// # Errors
    /// `DimensionMismatch` when `weight` is not square over the target.
    pub fn new(target: DVector<f64>, weight: DMatrix<f64>) -> Result<Self, MomentError> {
        let d = target.len();
        if weight.shape() != (d, d) {
            return Err(MomentError::DimensionMismatch(format!(
                "cost weight is {:?} for a {d}-dimensional target",
                weight.shape()
            )));
        }
        Ok(Self { target, weight })
    }

    pub fn point(&self, x: &DVector<f64>) -> f64 {
        let delta = x - &self.target;
        1.0 - (-0.5 * delta.dot(&(&self.weight * &delta))).exp()
    }

    /// `E[exp(-κ/2 qᵀWq)]` for `q = x - z`, with its gradient.
    ///
    /// `κ = 1` gives the mean of the saturating term, `κ = 2` its second moment.
    fn expectation(&self, x: &Gaussian, kappa: f64) -> Result<(f64, Gradient), MomentError> {
        let d = x.dim();
        let w = &self.weight * kappa;
        let lu = (DMatrix::identity(d, d) + &x.cov * &w).lu();
        let det = lu.determinant();
        if !(det.is_finite() && det > 0.0) {
            return Err(MomentError::InvalidDistribution("I + S W has a non-positive determinant".into()));
        }
        let inv = lu.try_inverse().ok_or_else(|| MomentError::InvalidDistribution("I + S W is singular".into()))?;
        let a = &w * inv;
        let delta = &x.mean - &self.target;
        let ad = &a * &delta;
        let value = (-0.5 * delta.dot(&ad)).exp() / det.sqrt();
        let mean = -&ad * value;
        let cov = (&ad * ad.transpose() - &a) * (0.5 * value);
        Ok((value, Gradient { mean, cov }))
    }

    /// # Errors
    /// `DimensionMismatch` for a wrongly sized belief and
    /// `InvalidDistribution` when the belief makes `I + S W` singular.
    pub fn moments(&self, x: &Gaussian) -> Result<CostMoments, MomentError> {
        if x.dim() != self.target.len() {
            return Err(MomentError::DimensionMismatch(format!(
                "cost over {} coordinates got a {}-dimensional belief",
                self.target.len(),
                x.dim()
            )));
        }
        let (e1, de1) = self.expectation(x, 1.0)?;
        let (e2, de2) = self.expectation(x, 2.0)?;
        let mut variance_gradient = de2;
        variance_gradient.accumulate(&de1, -2.0 * e1);
        let mut mean_gradient = Gradient::zeros(x.dim());
        mean_gradient.accumulate(&de1, -1.0);
        Ok(CostMoments { mean: 1.0 - e1, mean_gradient, variance: e2 - e1 * e1, variance_gradient })
    }
}

/// Expected cost of a belief and its gradient with respect to the belief.
#[derive(Clone, Debug, PartialEq)]
pub struct CostEvaluation {
    pub mean: f64,
    pub gradient: Gradient,
    pub variance: f64,
}

/// Saturating distance of the pendulum tip from its target position,
/// averaged over several widths.
#[derive(Clone, Debug, PartialEq)]
pub struct CostModel {
    augment: AngleAugment,
    state_dim: usize,
    pole_length: f64,
    /// Target in the augmented coordinates `[x; sin/cos]`.
    target: DVector<f64>,
    /// One saturating cost per width over the augmented coordinates.
    costs: Vec<SaturatingCost>,
    exploration: f64,
}

impl CostModel {
    /// `angles[0]` is the pole angle; coordinate 0 the cart position.
    ///
    /// # Errors
    /// `Configuration` when the target or angle set do not fit the state.
    pub fn new(config: &CostConfig, angles: &[usize], state_dim: usize) -> Result<Self, PilcoError> {
        let Some(&pole) = angles.first() else {
            return Err(PilcoError::Configuration("the cost needs the pole angle".into()));
        };
        if config.target.len() != state_dim || angles.iter().any(|&i| i >= state_dim) {
            return Err(PilcoError::Configuration(format!(
                "cost target and angles must index a {state_dim}-dimensional state"
            )));
        }
        if pole == 0 {
            return Err(PilcoError::Configuration("the pole angle cannot be the cart position".into()));
        }
        let augment = AngleAugment::new(angles.to_vec());
        let raw_target = DVector::from_column_slice(&config.target);
        let trig = augment.point(&raw_target);
        let aug = state_dim + trig.len();
        let mut target = DVector::zeros(aug);
        target.rows_mut(0, state_dim).copy_from(&raw_target);
        target.rows_mut(state_dim, trig.len()).copy_from(&trig);

        let l = config.pendulum_length;
        let (sin, cos) = (state_dim, state_dim + 1);
        let mut q = DMatrix::zeros(aug, aug);
        q[(0, 0)] = 1.0;
        q[(0, sin)] = l;
        q[(sin, 0)] = l;
        q[(sin, sin)] = l * l;
        q[(cos, cos)] = l * l;

        let costs = config
            .widths
            .iter()
            .map(|w| SaturatingCost::new(target.clone(), &q / (w * w)))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { augment, state_dim, pole_length: l, target, costs, exploration: config.exploration })
    }

    pub fn state_dim(&self) -> usize {
        self.state_dim
    }

    /// Expected cost of belief `x` over the raw state, averaged over the
    /// widths, with the exploration term `b sqrt(var)` where enabled.
    ///
    /// # Errors
    /// `InvalidDistribution` or `DimensionMismatch` from the augmentation
    /// or the saturating cost.
    pub fn evaluate(&self, x: &Gaussian) -> Result<CostEvaluation, PilcoError> {
        if x.dim() != self.state_dim {
            return Err(MomentError::DimensionMismatch(format!(
                "cost over a {}-dimensional state got a {}-dimensional belief",
                self.state_dim,
                x.dim()
            ))
            .into());
        }
        let (joint, bundle) = self.augment.joint(x)?;
        let mut mean = 0.0;
        let mut variance = 0.0;
        let mut gradient = Gradient::zeros(x.dim());
        for cost in &self.costs {
            let m = cost.moments(&joint)?;
            mean += m.mean;
            variance += m.variance;
            gradient.accumulate(&bundle.pullback(&m.mean_gradient), 1.0);
            if self.exploration != 0.0 && m.variance > EXPLORATION_FLOOR {
                let sd = m.variance.sqrt();
                mean += self.exploration * sd;
                gradient.accumulate(&bundle.pullback(&m.variance_gradient), self.exploration / (2.0 * sd));
            }
        }
        #[allow(clippy::cast_precision_loss)]
        let n = self.costs.len() as f64;
        gradient.mean /= n;
        gradient.cov /= n;
        Ok(CostEvaluation { mean: mean / n, gradient, variance: variance / n })
    }

    /// Belief over the Cartesian pendulum tip `(x + ℓ sin θ, -ℓ cos θ)`.
    ///
    /// # Errors
    /// Same as [`CostModel::evaluate`].
    pub fn tip_distribution(&self, x: &Gaussian) -> Result<Gaussian, PilcoError> {
        let (joint, _) = self.augment.joint(x)?;
        let (sin, cos) = (self.state_dim, self.state_dim + 1);
        let mut a = DMatrix::zeros(2, joint.dim());
        a[(0, 0)] = 1.0;
        a[(0, sin)] = self.pole_length;
        a[(1, cos)] = -self.pole_length;
        Ok(Gaussian { mean: &a * &joint.mean, cov: &a * &joint.cov * a.transpose() })
    }
}

impl StageCost for CostModel {
    fn stage_cost(&self, state: &DVector<f64>) -> f64 {
        let mut aug = DVector::zeros(self.target.len());
        aug.rows_mut(0, self.state_dim).copy_from(state);
        aug.rows_mut(self.state_dim, self.target.len() - self.state_dim).copy_from(&self.augment.point(state));
        #[allow(clippy::cast_precision_loss)]
        let n = self.costs.len() as f64;
        self.costs.iter().map(|c| c.point(&aug)).sum::<f64>() / n
    }
}

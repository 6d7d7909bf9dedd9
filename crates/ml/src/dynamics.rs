//! Gaussian-process model of state differences learned from observed transitions.

use moments::{Gaussian, JacobianBundle, Moments, Transformed};
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::basis::BasisExpansion;
use crate::error::MlError;
use crate::kernel::{HyperCurb, SeKernel};
use crate::minimize::{minimize, MinimizeOptions};

/// Append-only record of `(input, target)` training pairs.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TransitionStore {
    inputs: Vec<DVector<f64>>,
    targets: Vec<DVector<f64>>,
}

impl TransitionStore {
    pub fn len(&self) -> usize {
        self.inputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty()
    }

    pub fn push(&mut self, input: DVector<f64>, target: DVector<f64>) {
        self.inputs.push(input);
        self.targets.push(target);
    }

    /// Inputs as rows of an `n x D` matrix.
    pub fn inputs_matrix(&self) -> DMatrix<f64> {
        rows(&self.inputs)
    }

    /// Targets as rows of an `n x E` matrix.
    pub fn targets_matrix(&self) -> DMatrix<f64> {
        rows(&self.targets)
    }
}

fn rows(v: &[DVector<f64>]) -> DMatrix<f64> {
    let cols = v.first().map_or(0, DVector::len);
    DMatrix::from_fn(v.len(), cols, |i, j| v[i][j])
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainOptions {
    pub line_searches: usize,
    pub evals_per_search: usize,
    pub curb: HyperCurb,
}

impl Default for TrainOptions {
    fn default() -> Self {
        Self { line_searches: 300, evals_per_search: 20, curb: HyperCurb::default() }
    }
}

#[derive(Clone, Debug)]
pub struct TrainReport {
    pub transitions: usize,
    /// Penalised negative log marginal likelihood per output.
    pub nlml: Vec<f64>,
    pub kernels: Vec<SeKernel>,
}

#[derive(Clone, Debug)]
struct Posterior {
    inputs: DMatrix<f64>,
    kernels: Vec<SeKernel>,
    beta: DMatrix<f64>,
    inv_grams: Vec<DMatrix<f64>>,
}

/// One independent GP per output dimension over a shared input set.
#[derive(Clone, Debug)]
pub struct GpDynamics {
    input_dim: usize,
    output_dim: usize,
    store: TransitionStore,
    posterior: Option<Posterior>,
}

impl GpDynamics {
    pub fn new(input_dim: usize, output_dim: usize) -> Self {
        Self { input_dim, output_dim, store: TransitionStore::default(), posterior: None }
    }

    pub fn input_dim(&self) -> usize {
        self.input_dim
    }

    pub fn output_dim(&self) -> usize {
        self.output_dim
    }

    pub fn store(&self) -> &TransitionStore {
        &self.store
    }

    pub fn is_trained(&self) -> bool {
        self.posterior.is_some()
    }

    pub fn kernels(&self) -> Option<&[SeKernel]> {
        self.posterior.as_ref().map(|p| p.kernels.as_slice())
    }

    /// # Errors
    /// `DimensionMismatch` when the pair does not match the model's dimensions.
    pub fn record(&mut self, input: DVector<f64>, target: DVector<f64>) -> Result<(), MlError> {
        if input.len() != self.input_dim || target.len() != self.output_dim {
            return Err(MlError::DimensionMismatch(format!(
                "transition ({}, {}) for a model over ({}, {})",
                input.len(),
                target.len(),
                self.input_dim,
                self.output_dim
            )));
        }
        self.store.push(input, target);
        Ok(())
    }

    /// Conditions the model on the stored transitions with fixed `kernels`.
    ///
    /// # Errors
    /// `DimensionMismatch` for wrongly shaped kernels, `SingularKernel` when a
    /// noisy Gram matrix cannot be factorised. The model is unchanged on error.
    pub fn condition(&mut self, kernels: Vec<SeKernel>) -> Result<(), MlError> {
        if kernels.len() != self.output_dim || kernels.iter().any(|k| k.dim() != self.input_dim) {
            return Err(MlError::DimensionMismatch(format!(
                "expected {} kernels over {} inputs",
                self.output_dim, self.input_dim
            )));
        }
        if self.store.is_empty() {
            return Err(MlError::SingularKernel("no transitions recorded".into()));
        }
        let inputs = self.store.inputs_matrix();
        let targets = self.store.targets_matrix();
        let n = inputs.nrows();
        let mut beta = DMatrix::zeros(n, self.output_dim);
        let mut inv_grams = Vec::with_capacity(self.output_dim);
        for (a, kernel) in kernels.iter().enumerate() {
            let chol = kernel
                .noisy_gram(&inputs)
                .cholesky()
                .ok_or_else(|| MlError::SingularKernel(format!("dynamics output {a}")))?;
            beta.set_column(a, &chol.solve(&targets.column(a).into_owned()));
            inv_grams.push(chol.inverse());
        }
        self.posterior = Some(Posterior { inputs, kernels, beta, inv_grams });
        Ok(())
    }

    /// Fits the hyperparameters of every output by minimising the penalised
    /// negative log marginal likelihood, then conditions on the data.
    ///
    /// The search starts from the current hyperparameters when trained, and
    /// from the spread of the data otherwise.
    ///
    /// # Errors
    /// `TrainingFailure` when there is no data or the optimisation cannot
    /// produce a finite objective. The previous model is kept on error.
    pub fn train(&mut self, options: &TrainOptions) -> Result<TrainReport, MlError> {
        if self.store.is_empty() {
            return Err(MlError::TrainingFailure { output: 0, reason: "no transitions recorded".into() });
        }
        let x = self.store.inputs_matrix();
        let y = self.store.targets_matrix();
        let input_std = column_std(&x);
        let minimize_options = MinimizeOptions {
            length: i64::try_from(options.line_searches).unwrap_or(i64::MAX),
            evals_per_search: options.evals_per_search,
            reduction: 1.0,
        };

        let mut kernels = Vec::with_capacity(self.output_dim);
        let mut nlml = Vec::with_capacity(self.output_dim);
        for a in 0..self.output_dim {
            let ya = y.column(a).into_owned();
            let start = match &self.posterior {
                Some(p) => p.kernels[a].hyperparameters(),
                None => initial_hyperparameters(&input_std, &ya),
            };
            let objective = |h: &DVector<f64>| {
                let (penalty, dpenalty) = options.curb.penalty(h, &input_std);
                match SeKernel::from_hyperparameters(h).neg_log_marginal_likelihood(&x, &ya) {
                    Some((value, grad)) => (value + penalty, grad + dpenalty),
                    None => (f64::INFINITY, DVector::zeros(h.len())),
                }
            };
            let fitted = minimize(start, objective, &minimize_options)
                .map_err(|e| MlError::TrainingFailure { output: a, reason: e.to_string() })?;
            let value = fitted.value();
            if !value.is_finite() {
                return Err(MlError::TrainingFailure { output: a, reason: "non-finite likelihood".into() });
            }
            debug!(output = a, nlml = value, line_searches = fitted.line_searches, "fitted dynamics output");
            nlml.push(value);
            kernels.push(SeKernel::from_hyperparameters(&fitted.x));
        }

        if let Err(e) = self.condition(kernels.clone()) {
            warn!(error = %e, "fitted hyperparameters give a singular kernel");
            return Err(MlError::TrainingFailure { output: 0, reason: e.to_string() });
        }
        info!(transitions = x.nrows(), ?nlml, "trained dynamics model");
        Ok(TrainReport { transitions: x.nrows(), nlml, kernels })
    }

    /// Moments of the predicted state difference for input belief `x`.
    ///
    /// Before training the model predicts a zero difference with no
    /// uncertainty.
    ///
    /// # Errors
    /// `DimensionMismatch` for a wrongly sized belief and
    /// `InvalidDistribution` when `x` cannot be matched.
    pub fn predict(&self, x: &Gaussian) -> Result<Transformed, MlError> {
        if x.dim() != self.input_dim {
            return Err(MlError::DimensionMismatch(format!(
                "dynamics input has {} dimensions, expected {}",
                x.dim(),
                self.input_dim
            )));
        }
        let Some(p) = &self.posterior else {
            return Ok(Transformed {
                moments: Moments::zeros(self.input_dim, self.output_dim),
                jacobian: JacobianBundle::zeros(self.input_dim, self.output_dim),
            });
        };
        let expansion = BasisExpansion {
            centers: &p.inputs,
            weights: &p.beta,
            kernels: &p.kernels,
            model_uncertainty: Some(&p.inv_grams),
        };
        Ok(expansion.linearize(x)?.into_transformed())
    }
}

/// Sample standard deviation per column; degenerate columns count as 1.
fn column_std(x: &DMatrix<f64>) -> DVector<f64> {
    DVector::from_fn(x.ncols(), |j, _| spread(&x.column(j).into_owned()))
}

fn spread(v: &DVector<f64>) -> f64 {
    let n = v.len();
    if n < 2 {
        return 1.0;
    }
    let mean = v.mean();
    #[allow(clippy::cast_precision_loss)]
    let var = v.map(|x| (x - mean).powi(2)).sum() / (n - 1) as f64;
    let std = var.sqrt();
    if std > 0.0 && std.is_finite() {
        std
    } else {
        1.0
    }
}

/// `[log std(x); log std(y); log(std(y) / 10)]`.
fn initial_hyperparameters(input_std: &DVector<f64>, y: &DVector<f64>) -> DVector<f64> {
    let d = input_std.len();
    let sy = spread(y);
    let mut h = DVector::zeros(d + 2);
    h.rows_mut(0, d).copy_from(&input_std.map(f64::ln));
    h[d] = sy.ln();
    h[d + 1] = (sy / 10.0).ln();
    h
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_stacks_rows() {
        let mut store = TransitionStore::default();
        store.push(DVector::from_vec(vec![1.0, 2.0]), DVector::from_vec(vec![3.0]));
        store.push(DVector::from_vec(vec![4.0, 5.0]), DVector::from_vec(vec![6.0]));
        assert_eq!(store.inputs_matrix(), DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 4.0, 5.0]));
        assert_eq!(store.targets_matrix(), DMatrix::from_row_slice(2, 1, &[3.0, 6.0]));
    }

    #[test]
    fn degenerate_spread_counts_as_one() {
        assert_eq!(spread(&DVector::from_vec(vec![2.0, 2.0, 2.0])), 1.0);
        assert!((spread(&DVector::from_vec(vec![1.0, 3.0])) - 2.0_f64.sqrt()).abs() < 1e-12);
    }
}

//! Conjugate-gradient minimisation with a Wolfe-Powell line search.
//!
//! Polak-Ribière search directions, cubic extrapolation and cubic/quadratic
//! interpolation, with a restart along the steepest descent direction after a
//! failed line search. Non-finite objective values during extrapolation are
//! handled by bisecting back towards the last good point.

use nalgebra::DVector;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::MlError;

/// Don't reevaluate within this fraction of the current bracket.
const INT: f64 = 0.1;
/// Extrapolate at most this many times the current step.
const EXT: f64 = 3.0;
/// Maximum allowed slope ratio between consecutive line searches.
const RATIO: f64 = 10.0;
/// Wolfe-Powell constants.
const SIG: f64 = 0.1;
const RHO: f64 = SIG / 2.0;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MinimizeOptions {
    /// Positive: maximum number of line searches. Negative: maximum number of
    /// function evaluations.
    pub length: i64,
    /// Function evaluations allowed within one line search.
    pub evals_per_search: usize,
    /// Expected reduction of the objective in the first line search.
    pub reduction: f64,
}

impl Default for MinimizeOptions {
    fn default() -> Self {
        Self { length: 100, evals_per_search: 20, reduction: 1.0 }
    }
}

/// Outcome of [`minimize`].
#[derive(Clone, Debug)]
pub struct Minimized {
    pub x: DVector<f64>,
    /// Objective after every successful line search, starting with the initial value.
    pub values: Vec<f64>,
    pub evaluations: usize,
    pub line_searches: usize,
}

impl Minimized {
    pub fn value(&self) -> f64 {
        self.values.last().copied().unwrap_or(f64::INFINITY)
    }
}

fn finite(f: f64, df: &DVector<f64>) -> bool {
    f.is_finite() && df.iter().all(|v| v.is_finite())
}

/// Minimises `f`, which returns the objective and its gradient, from `x0`.
///
/// The returned point is the best one evaluated; it is never worse than `x0`.
///
/// # Errors
/// `InvalidStart` when `f(x0)` is not finite.
#[allow(clippy::too_many_lines)]
pub fn minimize<F>(x0: DVector<f64>, mut f: F, options: &MinimizeOptions) -> Result<Minimized, MlError>
where
    F: FnMut(&DVector<f64>) -> (f64, DVector<f64>),
{
    let by_search = options.length > 0;
    let budget = usize::try_from(options.length.unsigned_abs()).unwrap_or(usize::MAX);
    let max_evals = options.evals_per_search.max(1);

    let mut x = x0;
    let (mut f0, mut df0) = f(&x);
    let mut evaluations = 1;
    if !finite(f0, &df0) {
        return Err(MlError::InvalidStart);
    }
    let mut values = vec![f0];
    let mut i = usize::from(!by_search);
    let mut line_searches = 0;

    let mut s = -&df0;
    let mut d0 = -s.dot(&s);
    let mut x3 = options.reduction / (1.0 - d0);
    let mut failed = false;

    while i < budget && d0 < 0.0 {
        if by_search {
            i += 1;
        }
        line_searches += 1;

        let (mut best_x, mut best_f, mut best_df) = (x.clone(), f0, df0.clone());
        let mut m = if by_search { max_evals } else { max_evals.min(budget - i) };

        let mut x2: f64;
        let mut f2: f64;
        let mut d2: f64;
        let mut f3: f64;
        let mut df3: DVector<f64>;
        let mut d3: f64;
        loop {
            x2 = 0.0;
            f2 = f0;
            d2 = d0;
            f3 = f0;
            df3 = df0.clone();
            let mut success = false;
            while !success && m > 0 {
                m -= 1;
                if !by_search {
                    i += 1;
                }
                let (fc, dfc) = f(&(&x + &s * x3));
                evaluations += 1;
                if finite(fc, &dfc) {
                    f3 = fc;
                    df3 = dfc;
                    success = true;
                } else {
                    x3 = (x2 + x3) / 2.0;
                }
            }
            if f3 < best_f {
                best_x = &x + &s * x3;
                best_f = f3;
                best_df = df3.clone();
            }
            d3 = df3.dot(&s);
            if d3 > SIG * d0 || f3 > f0 + x3 * RHO * d0 || m == 0 {
                break;
            }
            // cubic extrapolation from the origin of the line and the last point
            let (x1, f1, d1) = (x2, f2, d2);
            x2 = x3;
            f2 = f3;
            d2 = d3;
            let a = 6.0 * (f1 - f2) + 3.0 * (d2 + d1) * (x2 - x1);
            let b = 3.0 * (f2 - f1) - (2.0 * d1 + d2) * (x2 - x1);
            x3 = x1 - d1 * (x2 - x1).powi(2) / (b + (b * b - a * d1 * (x2 - x1)).sqrt());
            if !x3.is_finite() || x3 < 0.0 || x3 > x2 * EXT {
                x3 = x2 * EXT;
            } else if x3 < x2 + INT * (x2 - x1) {
                x3 = x2 + INT * (x2 - x1);
            }
        }

        let (mut x4, mut f4, mut d4) = (x3, f3, d3);
        while (d3.abs() > -SIG * d0 || f3 > f0 + x3 * RHO * d0) && m > 0 {
            if d3 > 0.0 || f3 > f0 + x3 * RHO * d0 {
                x4 = x3;
                f4 = f3;
                d4 = d3;
            } else {
                x2 = x3;
                f2 = f3;
                d2 = d3;
            }
            if f4 > f0 {
                // quadratic interpolation
                x3 = x2 - (0.5 * d2 * (x4 - x2).powi(2)) / (f4 - f2 - d2 * (x4 - x2));
            } else {
                // cubic interpolation
                let a = 6.0 * (f2 - f4) / (x4 - x2) + 3.0 * (d4 + d2);
                let b = 3.0 * (f4 - f2) - (2.0 * d2 + d4) * (x4 - x2);
                x3 = x2 + ((b * b - a * d2 * (x4 - x2).powi(2)).sqrt() - b) / a;
            }
            if !x3.is_finite() {
                x3 = (x2 + x4) / 2.0;
            }
            x3 = x3.min(x4 - INT * (x4 - x2)).max(x2 + INT * (x4 - x2));
            let (fc, dfc) = f(&(&x + &s * x3));
            evaluations += 1;
            f3 = fc;
            df3 = dfc;
            if f3 < best_f {
                best_x = &x + &s * x3;
                best_f = f3;
                best_df = df3.clone();
            }
            m -= 1;
            if !by_search {
                i += 1;
            }
            d3 = df3.dot(&s);
        }

        if d3.abs() < -SIG * d0 && f3 < f0 + x3 * RHO * d0 {
            x += &s * x3;
            f0 = f3;
            values.push(f0);
            debug!(line_search = line_searches, value = f0, "line search succeeded");
            let beta = (df3.dot(&df3) - df0.dot(&df3)) / df0.dot(&df0);
            s = &s * beta - &df3;
            df0 = df3;
            let previous = d0;
            d0 = df0.dot(&s);
            if d0 > 0.0 {
                s = -&df0;
                d0 = -s.dot(&s);
            }
            x3 *= RATIO.min(previous / (d0 - f64::MIN_POSITIVE));
            failed = false;
        } else {
            x = best_x;
            f0 = best_f;
            df0 = best_df;
            if failed || i > budget {
                debug!(line_search = line_searches, value = f0, "line search failed twice, stopping");
                break;
            }
            s = -&df0;
            d0 = -s.dot(&s);
            x3 = 1.0 / (1.0 - d0);
            failed = true;
        }
    }

    if values.last() != Some(&f0) {
        values.push(f0);
    }
    Ok(Minimized { x, values, evaluations, line_searches })
}

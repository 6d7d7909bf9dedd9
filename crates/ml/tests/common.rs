#![allow(dead_code)]

use moments::{Gaussian, JacobianBundle, Moments, Tangent};
use nalgebra::{DMatrix, DVector};

pub const EPS: f64 = 1e-6;

pub fn uniform_matrix(rows: usize, cols: usize, scale: f64, seed: u64) -> DMatrix<f64> {
    let mut rng = fastrand::Rng::with_seed(seed);
    DMatrix::from_fn(rows, cols, |_, _| scale * (2.0 * rng.f64() - 1.0))
}

/// Belief with a well-conditioned random covariance.
pub fn random_belief(d: usize, seed: u64) -> Gaussian {
    let mut rng = fastrand::Rng::with_seed(seed);
    let mean = DVector::from_fn(d, |_, _| 2.0 * rng.f64() - 1.0);
    let a = DMatrix::from_fn(d, d, |_, _| rng.f64() - 0.5);
    let c = &a * a.transpose() * 0.3 + DMatrix::identity(d, d) * 0.05;
    Gaussian { mean, cov: (&c + c.transpose()) * 0.5 }
}

/// Mean directions followed by symmetric covariance directions `E_kl + E_lk`.
pub fn symmetric_directions(d: usize) -> Vec<Tangent> {
    let mut out: Vec<Tangent> = (0..d).map(|i| Tangent::mean_direction(d, i)).collect();
    for k in 0..d {
        for l in k..d {
            let mut t = Tangent::cov_direction(d, k, l);
            t.cov[(l, k)] = 1.0;
            out.push(t);
        }
    }
    out
}

pub fn shifted(x: &Gaussian, t: &Tangent, h: f64) -> Gaussian {
    Gaussian { mean: &x.mean + &t.mean * h, cov: &x.cov + &t.cov * h }
}

pub fn check(what: &str, direction: usize, numerical: &[f64], analytical: &[f64], tol: f64) {
    assert_eq!(numerical.len(), analytical.len());
    for (i, (n, a)) in numerical.iter().zip(analytical).enumerate() {
        assert!(
            (n - a).abs() <= tol * (1.0 + a.abs()),
            "Grad check failed for {what} entry {i} along direction {direction}. Numerical: {n}, Analytical: {a}"
        );
    }
}

/// Compares central differences with step `h` of output moments with an analytic tangent.
pub fn check_moments(direction: usize, plus: &Moments, minus: &Moments, h: f64, analytic: &moments::MomentTangent, tol: f64) {
    let mean = (&plus.mean - &minus.mean) / (2.0 * h);
    let cov = (&plus.cov - &minus.cov) / (2.0 * h);
    let cross = (&plus.cross - &minus.cross) / (2.0 * h);
    check("mean", direction, mean.as_slice(), analytic.mean.as_slice(), tol);
    check("covariance", direction, cov.as_slice(), analytic.cov.as_slice(), tol);
    check("cross term", direction, cross.as_slice(), analytic.cross.as_slice(), tol);
}

/// Central differences of `f` with step `h` along every symmetric direction against `jac.push`.
///
/// Models with small noise need a larger `h`: the posterior terms cancel and
/// rounding dominates the quotient below about `1e-5`.
pub fn assert_moment_derivatives<F>(x: &Gaussian, jac: &JacobianBundle, f: F, h: f64, tol: f64)
where
    F: Fn(&Gaussian) -> Moments,
{
    for (n, t) in symmetric_directions(x.dim()).iter().enumerate() {
        let plus = f(&shifted(x, t, h));
        let minus = f(&shifted(x, t, -h));
        check_moments(n, &plus, &minus, h, &jac.push(t), tol);
    }
}

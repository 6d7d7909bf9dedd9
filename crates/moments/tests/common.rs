#![allow(dead_code)]

use moments::{Gaussian, JacobianBundle, Moments, Tangent};
use nalgebra::{DMatrix, DVector};

pub const EPS: f64 = 1e-6;

/// Belief with a well-conditioned random covariance.
pub fn random_belief(d: usize, seed: u64) -> Gaussian {
    let mut rng = fastrand::Rng::with_seed(seed);
    let mean = DVector::from_fn(d, |_, _| 2.0 * rng.f64() - 1.0);
    let a = DMatrix::from_fn(d, d, |_, _| rng.f64() - 0.5);
    let c = &a * a.transpose() * 0.5 + DMatrix::identity(d, d) * 0.05;
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

/// Central differences of `f` along every symmetric direction against `jac.push`.
pub fn assert_moment_derivatives<F>(x: &Gaussian, jac: &JacobianBundle, f: F, tol: f64)
where
    F: Fn(&Gaussian) -> Moments,
{
    for (n, t) in symmetric_directions(x.dim()).iter().enumerate() {
        let plus = f(&shifted(x, t, EPS));
        let minus = f(&shifted(x, t, -EPS));
        let analytic = jac.push(t);
        let mean = (&plus.mean - &minus.mean) / (2.0 * EPS);
        let cov = (&plus.cov - &minus.cov) / (2.0 * EPS);
        let cross = (&plus.cross - &minus.cross) / (2.0 * EPS);
        check("mean", n, mean.as_slice(), analytic.mean.as_slice(), tol);
        check("covariance", n, cov.as_slice(), analytic.cov.as_slice(), tol);
        check("cross term", n, cross.as_slice(), analytic.cross.as_slice(), tol);
    }
}

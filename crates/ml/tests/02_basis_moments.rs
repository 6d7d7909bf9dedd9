mod common;

use approx::assert_relative_eq;
use common::{assert_moment_derivatives, random_belief, uniform_matrix, EPS};
use ml::{BasisExpansion, MlError, SeKernel};
use moments::{Gaussian, MomentError};
use nalgebra::{DMatrix, DVector};

struct Parts {
    centers: DMatrix<f64>,
    weights: DMatrix<f64>,
    kernels: Vec<SeKernel>,
    inv_grams: Vec<DMatrix<f64>>,
}

fn parts() -> Parts {
    let centers = uniform_matrix(6, 3, 1.0, 11);
    let weights = uniform_matrix(6, 2, 0.8, 12);
    let kernels = vec![SeKernel::new(&[0.8, 1.2, 1.0], 1.1, 0.1), SeKernel::new(&[1.4, 0.6, 0.9], 0.7, 0.05)];
    let inv_grams = kernels.iter().map(|k| k.noisy_gram(&centers).try_inverse().unwrap()).collect();
    Parts { centers, weights, kernels, inv_grams }
}

fn expansion(p: &Parts, with_uncertainty: bool) -> BasisExpansion<'_> {
    BasisExpansion {
        centers: &p.centers,
        weights: &p.weights,
        kernels: &p.kernels,
        model_uncertainty: with_uncertainty.then_some(p.inv_grams.as_slice()),
    }
}

#[test]
fn derivatives_match_finite_differences() {
    let p = parts();
    for with_uncertainty in [false, true] {
        let e = expansion(&p, with_uncertainty);
        let x = random_belief(3, 21);
        let out = e.linearize(&x).unwrap().into_transformed();
        assert_moment_derivatives(&x, &out.jacobian, |y| e.linearize(y).unwrap().into_transformed().moments, EPS, 1e-5);
    }
}

#[test]
fn output_covariance_is_symmetric_and_positive() {
    let p = parts();
    let x = random_belief(3, 22);
    let s = expansion(&p, true).linearize(&x).unwrap().into_transformed().moments.cov;
    assert_relative_eq!(s.clone(), s.transpose(), epsilon = 1e-14);
    assert!(s.clone().cholesky().is_some());
}

#[test]
fn point_belief_reduces_to_evaluation() {
    let p = parts();
    let m = DVector::from_vec(vec![0.2, -0.4, 0.1]);
    let e = expansion(&p, false);
    let out = e.linearize(&Gaussian::point(m.clone())).unwrap().into_transformed();
    assert_relative_eq!(out.moments.mean, e.evaluate(&m), epsilon = 1e-10);
    assert!(out.moments.cov.iter().all(|v| v.abs() < 1e-10));
}

#[test]
fn point_belief_carries_posterior_variance() {
    let p = parts();
    let m = DVector::from_vec(vec![-0.3, 0.5, 0.0]);
    let out = expansion(&p, true).linearize(&Gaussian::point(m.clone())).unwrap().into_transformed();
    for (a, kernel) in p.kernels.iter().enumerate() {
        let k = kernel.cross(&p.centers, &m);
        let expected = kernel.signal_var() - (k.transpose() * &p.inv_grams[a] * &k)[(0, 0)];
        assert_relative_eq!(out.moments.cov[(a, a)], expected, epsilon = 1e-10);
    }
}

#[test]
fn rejects_mismatched_belief() {
    let p = parts();
    let err = expansion(&p, false).linearize(&random_belief(2, 1)).unwrap_err();
    assert!(matches!(err, MlError::DimensionMismatch(_)));
}

#[test]
fn rejects_indefinite_belief() {
    let p = parts();
    let mut x = random_belief(3, 2);
    x.cov[(0, 0)] = -50.0;
    let err = expansion(&p, false).linearize(&x).unwrap_err();
    assert!(matches!(err, MlError::Moment(MomentError::InvalidDistribution(_))));
}

mod common;

use common::{check, uniform_matrix, EPS};
use ml::{HyperCurb, SeKernel};
use nalgebra::DVector;

#[test]
fn likelihood_gradient_matches_finite_differences() {
    let x = uniform_matrix(8, 2, 1.5, 3);
    let y = DVector::from_fn(8, |i, _| x[(i, 0)].sin() + 0.3 * x[(i, 1)]);
    let kernel = SeKernel::new(&[0.7, 1.3], 0.9, 0.2);
    let h = kernel.hyperparameters();
    let (_, grad) = kernel.neg_log_marginal_likelihood(&x, &y).unwrap();
    for j in 0..h.len() {
        let mut hp = h.clone();
        hp[j] += EPS;
        let mut hm = h.clone();
        hm[j] -= EPS;
        let (fp, _) = SeKernel::from_hyperparameters(&hp).neg_log_marginal_likelihood(&x, &y).unwrap();
        let (fm, _) = SeKernel::from_hyperparameters(&hm).neg_log_marginal_likelihood(&x, &y).unwrap();
        check("nlml", j, &[(fp - fm) / (2.0 * EPS)], &[grad[j]], 1e-5);
    }
}

#[test]
fn likelihood_prefers_the_generating_noise_level() {
    let x = uniform_matrix(20, 1, 2.0, 5);
    let y = DVector::from_fn(20, |i, _| x[(i, 0)].sin());
    let fitting = SeKernel::new(&[1.0], 1.0, 0.01).neg_log_marginal_likelihood(&x, &y).unwrap().0;
    let noisy = SeKernel::new(&[1.0], 1.0, 1.0).neg_log_marginal_likelihood(&x, &y).unwrap().0;
    assert!(fitting < noisy, "{fitting} should be below {noisy}");
}

#[test]
fn curb_gradient_matches_finite_differences() {
    let curb = HyperCurb::default();
    let std = DVector::from_vec(vec![0.5, 2.0]);
    // Far enough from the centre for the penalty to be non-negligible.
    let h = DVector::from_vec(vec![5.5, -4.0, 3.0, -4.0]);
    let (value, grad) = curb.penalty(&h, &std);
    assert!(value > 0.0);
    for j in 0..h.len() {
        let mut hp = h.clone();
        hp[j] += EPS;
        let mut hm = h.clone();
        hm[j] -= EPS;
        let numerical = (curb.penalty(&hp, &std).0 - curb.penalty(&hm, &std).0) / (2.0 * EPS);
        check("curb", j, &[numerical], &[grad[j]], 1e-5);
    }
}

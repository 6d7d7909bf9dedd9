mod common;

use common::{assert_moment_derivatives, random_belief};
use moments::{Gaussian, MomentMap, Saturation};
use nalgebra::DVector;

#[test]
fn moments_stay_within_limits() {
    let sat = Saturation::new(DVector::from_vec(vec![10.0, 2.0]));
    for seed in 0..20 {
        let mut x = random_belief(2, seed);
        x.mean *= 3.0;
        let out = sat.moments(&x).unwrap();
        for i in 0..2 {
            assert!(out.mean[i].abs() <= sat.limits()[i]);
            assert!(out.cov[(i, i)] >= 0.0);
            assert!(out.cov[(i, i)] <= sat.limits()[i].powi(2));
        }
        Gaussian { mean: out.mean, cov: out.cov }.validate().unwrap();
    }
}

#[test]
fn derivatives_match_finite_differences() {
    let sat = Saturation::new(DVector::from_vec(vec![3.0, 1.5]));
    let x = random_belief(2, 21);
    let out = sat.apply(&x).unwrap();
    assert_moment_derivatives(&x, &out.jacobian, |y| sat.moments(y).unwrap(), 1e-6);
}

mod common;

use approx::assert_relative_eq;
use common::{assert_moment_derivatives, random_belief};
use moments::{AngleAugment, Gaussian, MomentMap, Moments};
use nalgebra::{DMatrix, DVector};

#[test]
fn single_angle_matches_closed_form() {
    let (mu, var) = (0.8_f64, 0.2_f64);
    let x = Gaussian { mean: DVector::from_vec(vec![mu]), cov: DMatrix::from_element(1, 1, var) };
    let out = AngleAugment::new(vec![0]).moments(&x).unwrap();

    let decay = (-var / 2.0).exp();
    assert_relative_eq!(out.mean[0], mu.sin() * decay, epsilon = 1e-14);
    assert_relative_eq!(out.mean[1], mu.cos() * decay, epsilon = 1e-14);

    let var_sin = 0.5 * (1.0 - (2.0 * mu).cos() * (-2.0 * var).exp()) - (mu.sin() * decay).powi(2);
    let var_cos = 0.5 * (1.0 + (2.0 * mu).cos() * (-2.0 * var).exp()) - (mu.cos() * decay).powi(2);
    assert_relative_eq!(out.cov[(0, 0)], var_sin, epsilon = 1e-12);
    assert_relative_eq!(out.cov[(1, 1)], var_cos, epsilon = 1e-12);
    // Stein's lemma: cov(x, sin x) = var * E[cos x]
    assert_relative_eq!(var * out.cross[(0, 0)], var * mu.cos() * decay, epsilon = 1e-14);
}

#[test]
fn deterministic_angle_is_exact_even_beside_uncertain_ones() {
    let mut x = random_belief(3, 7);
    x.cov.row_mut(1).fill(0.0);
    x.cov.column_mut(1).fill(0.0);
    let out = AngleAugment::new(vec![1, 2]).moments(&x).unwrap();
    assert_eq!(out.mean[0], x.mean[1].sin());
    assert_eq!(out.mean[1], x.mean[1].cos());
    for r in 0..4 {
        assert_eq!(out.cov[(0, r)], 0.0);
        assert_eq!(out.cov[(1, r)], 0.0);
        assert_eq!(out.cov[(r, 0)], 0.0);
    }
    assert!(out.cov[(2, 2)] > 0.0);
}

#[test]
fn output_covariance_is_symmetric_and_psd() {
    for seed in 0..20 {
        let x = random_belief(4, seed);
        let (joint, _) = AngleAugment::new(vec![0, 3]).joint(&x).unwrap();
        assert_eq!(joint.cov, joint.cov.transpose());
        joint.validate().unwrap();
    }
}

#[test]
fn derivatives_match_finite_differences() {
    let x = random_belief(3, 11);
    let aug = AngleAugment::new(vec![0, 2]);
    let out = aug.apply(&x).unwrap();
    assert_moment_derivatives(&x, &out.jacobian, |y| aug.moments(y).unwrap(), 1e-6);
}

#[test]
fn scaled_derivatives_match_finite_differences() {
    let x = random_belief(2, 3);
    let aug = AngleAugment::with_scales(vec![1], vec![0.6]).unwrap();
    let out = aug.apply(&x).unwrap();
    assert_relative_eq!(out.moments.mean[0], 0.6 * x.mean[1].sin() * (-x.cov[(1, 1)] / 2.0).exp(), epsilon = 1e-14);
    assert_moment_derivatives(&x, &out.jacobian, |y| aug.moments(y).unwrap(), 1e-6);
}

#[test]
fn joint_map_derivatives_match_finite_differences() {
    let x = random_belief(3, 5);
    let aug = AngleAugment::new(vec![1]);
    let (_, bundle) = aug.joint(&x).unwrap();
    let joint_moments = |y: &Gaussian| {
        let (joint, _) = aug.joint(y).unwrap();
        let c = aug.moments(y).unwrap().cross;
        let mut cross = DMatrix::zeros(3, 5);
        cross.view_mut((0, 0), (3, 3)).fill_with_identity();
        cross.view_mut((0, 3), (3, 2)).copy_from(&c);
        Moments { mean: joint.mean, cov: joint.cov, cross }
    };
    assert_moment_derivatives(&x, &bundle, joint_moments, 1e-6);
}

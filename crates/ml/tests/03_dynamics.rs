mod common;

use approx::assert_relative_eq;
use common::{assert_moment_derivatives, random_belief, uniform_matrix};
use ml::{GpDynamics, MlError, SeKernel, TrainOptions};
use moments::Gaussian;
use nalgebra::DVector;

fn target(x: &DVector<f64>) -> DVector<f64> {
    DVector::from_vec(vec![x[0].sin() + 0.5 * x[1], 0.3 * x[0] * x[1]])
}

fn trained(n: usize) -> GpDynamics {
    let x = uniform_matrix(n, 2, 2.0, 31);
    let mut model = GpDynamics::new(2, 2);
    for i in 0..n {
        let xi = x.row(i).transpose();
        model.record(xi.clone(), target(&xi)).unwrap();
    }
    model.train(&TrainOptions { line_searches: 60, ..TrainOptions::default() }).unwrap();
    model
}

#[test]
fn untrained_model_predicts_no_change() {
    let model = GpDynamics::new(3, 2);
    let out = model.predict(&random_belief(3, 1)).unwrap();
    assert!(out.moments.mean.iter().all(|v| *v == 0.0));
    assert!(out.moments.cov.iter().all(|v| *v == 0.0));
    assert!(out.moments.cross.iter().all(|v| *v == 0.0));
    assert_eq!(out.jacobian.mean_wrt_mean(0, 0), 0.0);
}

#[test]
fn record_checks_dimensions() {
    let mut model = GpDynamics::new(2, 1);
    let err = model.record(DVector::zeros(3), DVector::zeros(1)).unwrap_err();
    assert!(matches!(err, MlError::DimensionMismatch(_)));
    assert!(model.store().is_empty());
}

#[test]
fn single_observation_posterior_at_the_data_point() {
    let mut model = GpDynamics::new(1, 1);
    model.record(DVector::from_vec(vec![0.4]), DVector::from_vec(vec![2.0])).unwrap();
    let (sf, sn) = (1.5_f64, 0.2_f64);
    model.condition(vec![SeKernel::new(&[0.7], sf, sn)]).unwrap();
    let out = model.predict(&Gaussian::point(DVector::from_vec(vec![0.4]))).unwrap();
    let (sf2, sn2) = (sf * sf, sn * sn);
    assert_relative_eq!(out.moments.mean[0], 2.0 * sf2 / (sf2 + sn2), epsilon = 1e-10);
    assert_relative_eq!(out.moments.cov[(0, 0)], sf2 * sn2 / (sf2 + sn2), epsilon = 1e-10);
}

#[test]
fn training_fits_the_transitions() {
    let model = trained(40);
    assert!(model.is_trained());
    let probe = DVector::from_vec(vec![0.3, -0.6]);
    let out = model.predict(&Gaussian::point(probe.clone())).unwrap();
    let expected = target(&probe);
    for a in 0..2 {
        assert!((out.moments.mean[a] - expected[a]).abs() < 0.05, "output {a}: {} vs {}", out.moments.mean[a], expected[a]);
        assert!(out.moments.cov[(a, a)] < 0.01);
    }
}

#[test]
fn prediction_derivatives_match_finite_differences() {
    let model = trained(25);
    let x = random_belief(2, 41);
    let out = model.predict(&x).unwrap();
    // Fitted noise is a few 1e-3, so the posterior covariance needs a coarse step.
    assert_moment_derivatives(&x, &out.jacobian, |y| model.predict(y).unwrap().moments, 1e-3, 1e-4);
}

#[test]
fn failed_training_keeps_previous_model() {
    let mut model = trained(15);
    let before = model.kernels().unwrap().to_vec();
    model.record(DVector::from_vec(vec![0.1, 0.1]), DVector::from_vec(vec![f64::NAN, 0.0])).unwrap();
    let err = model.train(&TrainOptions::default()).unwrap_err();
    assert!(matches!(err, MlError::TrainingFailure { output: 0, .. }));
    assert!(model.is_trained());
    assert_eq!(model.kernels().unwrap(), before.as_slice());
}

#[test]
fn training_without_data_fails() {
    let mut model = GpDynamics::new(2, 1);
    assert!(matches!(model.train(&TrainOptions::default()), Err(MlError::TrainingFailure { .. })));
    assert!(!model.is_trained());
}

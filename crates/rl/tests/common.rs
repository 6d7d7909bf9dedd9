#![allow(dead_code)]

use ml::{GpDynamics, RbfPolicy, SeKernel};
use moments::{AngleAugment, Gaussian, Tangent};
use nalgebra::{DMatrix, DVector};
use rl::{Scenario, CONTROL_DIM, STATE_DIM};

pub const EPS: f64 = 1e-6;

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

pub fn assert_close(what: &str, numerical: f64, analytical: f64, tol: f64) {
    assert!(
        (numerical - analytical).abs() <= tol * (1.0 + analytical.abs()),
        "Grad check failed for {what}. Numerical: {numerical}, Analytical: {analytical}"
    );
}

/// Short-horizon cart-pole with a wide cost so gradients are not saturated.
pub fn small_scenario(horizon: usize) -> Scenario {
    let mut s = Scenario::cart_pole();
    s.learning.horizon = horizon;
    s.policy.basis_functions = 3;
    s.cost.widths = vec![1.0];
    s
}

/// Dynamics model conditioned on smooth synthetic transitions with fixed
/// kernels, so no hyperparameter search is involved.
pub fn conditioned_dynamics(s: &Scenario, n: usize, seed: u64) -> GpDynamics {
    let augment = AngleAugment::new(s.indices.angles.clone());
    let d = s.indices.dynamics_inputs.len() + CONTROL_DIM;
    let mut model = GpDynamics::new(d, STATE_DIM);
    let mut rng = fastrand::Rng::with_seed(seed);
    for _ in 0..n {
        let state = DVector::from_fn(STATE_DIM, |_, _| 2.0 * rng.f64() - 1.0);
        let trig = augment.point(&state);
        let u = 4.0 * rng.f64() - 2.0;
        let mut aug = DVector::zeros(STATE_DIM + trig.len());
        aug.rows_mut(0, STATE_DIM).copy_from(&state);
        aug.rows_mut(STATE_DIM, trig.len()).copy_from(&trig);
        let input = DVector::from_fn(d, |i, _| if i + 1 < d { aug[s.indices.dynamics_inputs[i]] } else { u });
        let target = DVector::from_vec(vec![
            0.1 * state[1],
            0.05 * u - 0.02 * state[1],
            0.3 * state[3].sin() + 0.02 * u,
            0.1 * state[2],
        ]);
        model.record(input, target).unwrap();
    }
    model.condition(vec![SeKernel::new(&vec![1.5; d], 0.4, 0.05); STATE_DIM]).unwrap();
    model
}

pub fn random_policy(s: &Scenario, seed: u64) -> RbfPolicy {
    let augment = AngleAugment::new(s.indices.angles.clone());
    let (joint, _) = augment.joint(&s.start_beliefs()[0]).unwrap();
    RbfPolicy::random(&joint.marginal(&s.indices.policy_inputs), &s.policy, &mut fastrand::Rng::with_seed(seed)).unwrap()
}

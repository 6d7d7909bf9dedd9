use nalgebra::DVector;
use physics::Rollout;
use rl::{Learner, PilcoError, Scenario};

fn tiny() -> Scenario {
    let mut s = Scenario::cart_pole();
    s.learning.horizon = 5;
    s.learning.iterations = 1;
    s.learning.policy_line_searches = 3;
    s.learning.policy_evals_per_search = 10;
    s.learning.dynamics.line_searches = 20;
    s.policy.basis_functions = 2;
    s
}

#[test]
fn transitions_hold_augmented_inputs_and_differences() {
    let mut learner = Learner::new(tiny()).unwrap();
    let now = DVector::from_vec(vec![0.1, 0.2, 0.3, 0.4]);
    let next = DVector::from_vec(vec![0.5, 0.7, 0.9, 1.1]);
    let rollout = Rollout {
        latent: vec![now.clone(), next.clone()],
        observations: vec![now, next],
        controls: vec![DVector::from_vec(vec![-2.0])],
        costs: vec![1.0, 1.0],
    };
    assert_eq!(learner.record(&rollout).unwrap(), 1);
    let store = learner.dynamics().store();
    let input = store.inputs_matrix().row(0).transpose();
    let expected = DVector::from_vec(vec![0.1, 0.2, 0.3, 0.4_f64.sin(), 0.4_f64.cos(), -2.0]);
    assert!((input - expected).amax() < 1e-15);
    let target = store.targets_matrix().row(0).transpose();
    assert!((target - DVector::from_vec(vec![0.4, 0.5, 0.6, 0.7])).amax() < 1e-12);
}

#[test]
fn record_rejects_a_rollout_missing_its_last_observation() {
    let mut learner = Learner::new(tiny()).unwrap();
    let now = DVector::from_vec(vec![0.1, 0.2, 0.3, 0.4]);
    let rollout = Rollout {
        latent: vec![now.clone()],
        observations: vec![now],
        controls: vec![DVector::from_vec(vec![1.0])],
        costs: vec![1.0],
    };
    assert!(matches!(learner.record(&rollout), Err(PilcoError::Configuration(_))));
    assert!(learner.dynamics().store().is_empty());
}

#[test]
fn random_rollouts_fill_the_training_set() {
    let mut learner = Learner::new(tiny()).unwrap();
    let rollouts = learner.random_rollouts().unwrap();
    assert_eq!(rollouts.len(), 1);
    assert_eq!(rollouts[0].costs.len(), 6);
    assert_eq!(learner.dynamics().store().len(), 5);
    let limit = learner.policy().limits()[0];
    assert!(rollouts[0].controls.iter().all(|u| u[0].abs() <= limit));
}

#[test]
fn one_learning_iteration_end_to_end() {
    let mut s = tiny();
    s.learning.random_rollouts = 2;
    let mut learner = Learner::new(s).unwrap();
    let reports = learner.run().unwrap();
    assert_eq!(reports.len(), 1);
    let report = &reports[0];
    assert_eq!(report.iteration, 1);
    assert_eq!(report.transitions, 10);
    assert_eq!(report.realized_cost.len(), 6);
    assert!(report.predicted_cost.is_empty() || report.predicted_cost.len() == 6);
    assert!(learner.dynamics().is_trained());
    assert_eq!(learner.dynamics().store().len(), 15);
    assert!(serde_json::to_string(report).unwrap().contains("realized_cost"));
}

#[test]
fn same_seed_same_random_data() {
    let mut a = Learner::new(tiny()).unwrap();
    let mut b = Learner::new(tiny()).unwrap();
    assert_eq!(a.policy(), b.policy());
    let ra = a.random_rollouts().unwrap();
    let rb = b.random_rollouts().unwrap();
    assert_eq!(ra[0].controls, rb[0].controls);
}

use rl::{Learner, PilcoError, Scenario};

fn rejected(edit: impl FnOnce(&mut Scenario)) -> String {
    let mut s = Scenario::cart_pole();
    edit(&mut s);
    match s.validate() {
        Err(PilcoError::Configuration(msg)) => msg,
        other => panic!("expected a configuration error, got {other:?}"),
    }
}

#[test]
fn json_round_trip_preserves_the_scenario() {
    let s = Scenario::cart_pole();
    let back = Scenario::from_json(&s.to_json().unwrap()).unwrap();
    assert_eq!(back, s);
}

#[test]
fn malformed_json_is_a_json_error() {
    assert!(matches!(Scenario::from_json("{\"plant\": 3}"), Err(PilcoError::Json(_))));
}

#[test]
fn validation_names_the_offending_field() {
    assert!(rejected(|s| s.indices.policy_inputs.push(9)).contains("indices.policy_inputs"));
    assert!(rejected(|s| s.indices.dynamics_inputs.push(0)).contains("twice"));
    assert!(rejected(|s| s.policy.lengthscales.truncate(2)).contains("policy.lengthscales"));
    assert!(rejected(|s| s.cost.gamma = 0.0).contains("cost.gamma"));
    assert!(rejected(|s| s.cost.widths.clear()).contains("cost.widths"));
    assert!(rejected(|s| s.starts.clear()).contains("start belief"));
    assert!(rejected(|s| s.starts[0].std[2] = -1.0).contains("starts[0].std"));
    assert!(rejected(|s| s.plant.noise_std = vec![0.01; 3]).contains("plant.noise_std"));
    assert!(rejected(|s| s.learning.random_rollouts = 0).contains("random rollout"));
    assert!(rejected(|s| s.learning.horizon = 0).contains("learning.horizon"));
    assert!(rejected(|s| s.learning.policy_line_searches = 0).contains("budgets"));
}

#[test]
fn learner_refuses_an_invalid_scenario() {
    let mut s = Scenario::cart_pole();
    s.policy.max_u = vec![-1.0];
    assert!(matches!(Learner::new(s), Err(PilcoError::Configuration(_))));
}

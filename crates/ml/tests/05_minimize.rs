use ml::{minimize, MinimizeOptions, MlError};
use nalgebra::{DMatrix, DVector};

fn rosenbrock(x: &DVector<f64>) -> (f64, DVector<f64>) {
    let (a, b) = (x[0], x[1]);
    let f = (1.0 - a).powi(2) + 100.0 * (b - a * a).powi(2);
    let g = DVector::from_vec(vec![-2.0 * (1.0 - a) - 400.0 * a * (b - a * a), 200.0 * (b - a * a)]);
    (f, g)
}

#[test]
fn solves_a_quadratic() {
    let a = DMatrix::from_row_slice(3, 3, &[4.0, 1.0, 0.0, 1.0, 3.0, 0.5, 0.0, 0.5, 2.0]);
    let b = DVector::from_vec(vec![1.0, -2.0, 0.5]);
    let f = |x: &DVector<f64>| {
        let ax = &a * x;
        (0.5 * x.dot(&ax) - b.dot(x), ax - &b)
    };
    let out = minimize(DVector::zeros(3), f, &MinimizeOptions::default()).unwrap();
    let expected = a.clone().lu().solve(&b).unwrap();
    assert!((out.x - expected).norm() < 1e-6);
    assert!(out.values.windows(2).all(|w| w[1] <= w[0]));
}

#[test]
fn descends_the_rosenbrock_valley() {
    let options = MinimizeOptions { length: 200, ..MinimizeOptions::default() };
    let out = minimize(DVector::from_vec(vec![-1.0, 1.0]), rosenbrock, &options).unwrap();
    assert!((out.x[0] - 1.0).abs() < 1e-3 && (out.x[1] - 1.0).abs() < 1e-3, "ended at {}", out.x);
    assert!(out.line_searches <= 200);
}

#[test]
fn backs_off_from_non_finite_regions() {
    // Finite only left of 3.5; the minimum at 3 is reached without ever
    // accepting an infinite value.
    let f = |x: &DVector<f64>| {
        if x[0] < 3.5 {
            ((x[0] - 3.0).powi(2), DVector::from_vec(vec![2.0 * (x[0] - 3.0)]))
        } else {
            (f64::INFINITY, DVector::from_vec(vec![f64::NAN]))
        }
    };
    let out = minimize(DVector::from_vec(vec![0.0]), f, &MinimizeOptions::default()).unwrap();
    assert!((out.x[0] - 3.0).abs() < 1e-6);
    assert!(out.values.iter().all(|v| v.is_finite()));
}

#[test]
fn never_returns_a_worse_point() {
    let options = MinimizeOptions { length: 3, ..MinimizeOptions::default() };
    let x0 = DVector::from_vec(vec![-1.2, 1.0]);
    let start = rosenbrock(&x0).0;
    let out = minimize(x0, rosenbrock, &options).unwrap();
    assert!(out.value() <= start);
    assert_eq!(out.values[0], start);
}

#[test]
fn negative_length_bounds_evaluations() {
    let options = MinimizeOptions { length: -10, ..MinimizeOptions::default() };
    let out = minimize(DVector::from_vec(vec![-1.0, 1.0]), rosenbrock, &options).unwrap();
    assert!(out.evaluations <= 10, "{} evaluations", out.evaluations);
}

#[test]
fn rejects_a_non_finite_start() {
    let f = |_: &DVector<f64>| (f64::NAN, DVector::zeros(1));
    assert!(matches!(minimize(DVector::zeros(1), f, &MinimizeOptions::default()), Err(MlError::InvalidStart)));
}

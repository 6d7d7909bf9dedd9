//! # Numerical Integration
//!
//! Fixed-step Runge-Kutta integration of the plant ODEs.

/// One classical fourth-order Runge-Kutta step of size `h` for `y' = f(y)`.
pub fn rk4_step<const N: usize, F>(f: &F, y: &[f64; N], h: f64) -> [f64; N]
where
    F: Fn(&[f64; N]) -> [f64; N],
{
    let k1 = f(y);
    let k2 = f(&offset(y, &k1, 0.5 * h));
    let k3 = f(&offset(y, &k2, 0.5 * h));
    let k4 = f(&offset(y, &k3, h));
    let mut out = *y;
    for i in 0..N {
        out[i] += h / 6.0 * (k1[i] + 2.0 * k2[i] + 2.0 * k3[i] + k4[i]);
    }
    out
}

/// Integrates over `duration` using `substeps` equal RK4 steps.
pub fn integrate<const N: usize, F>(f: &F, y: &[f64; N], duration: f64, substeps: usize) -> [f64; N]
where
    F: Fn(&[f64; N]) -> [f64; N],
{
    let substeps = substeps.max(1);
    #[allow(clippy::cast_precision_loss)]
    let h = duration / substeps as f64;
    (0..substeps).fold(*y, |state, _| rk4_step(f, &state, h))
}

fn offset<const N: usize>(y: &[f64; N], k: &[f64; N], h: f64) -> [f64; N] {
    let mut out = *y;
    for i in 0..N {
        out[i] += h * k[i];
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exponential_decay_is_accurate() {
        let y = integrate(&|y: &[f64; 1]| [-y[0]], &[1.0], 1.0, 20);
        assert!((y[0] - (-1.0_f64).exp()).abs() < 1e-6);
    }
}

//! Cart with a freely swinging pendulum, driven by a horizontal force on the cart.
//!
//! State layout is `[x, v, dθ, θ]`: cart position, cart velocity, pendulum
//! angular velocity and pendulum angle, with `θ = 0` hanging down and `θ = π`
//! upright.

use nalgebra::DVector;

use crate::error::PlantError;
use crate::integrator::integrate;
use crate::plant::Plant;

/// Physical constants of the cart-pole.
#[derive(Clone, Debug, PartialEq)]
pub struct CartPoleParams {
    /// Cart mass in kg
    pub cart_mass: f64,
    /// Pendulum mass in kg
    pub pole_mass: f64,
    /// Pendulum length in meters
    pub pole_length: f64,
    /// Viscous friction coefficient between cart and ground
    pub friction: f64,
    /// Gravitational acceleration in m/s²
    pub gravity: f64,
}

impl Default for CartPoleParams {
    fn default() -> Self {
        Self { cart_mass: 0.5, pole_mass: 0.5, pole_length: 0.5, friction: 0.1, gravity: 9.82 }
    }
}

impl CartPoleParams {
    /// Time derivative of the state under a constant horizontal `force`.
    pub fn derivative(&self, z: &[f64; 4], force: f64) -> [f64; 4] {
        let Self { cart_mass: big_m, pole_mass: m, pole_length: l, friction: b, gravity: g } = *self;
        let (s, c) = (z[3].sin(), z[3].cos());
        let spin = z[2] * z[2];
        let dv = (2.0 * m * l * spin * s + 3.0 * m * g * s * c + 4.0 * force - 4.0 * b * z[1])
            / (4.0 * (big_m + m) - 3.0 * m * c * c);
        let dw = (-3.0 * m * l * spin * s * c - 6.0 * (big_m + m) * g * s - 6.0 * (force - b * z[1]) * c)
            / (4.0 * l * (m + big_m) - 3.0 * m * l * c * c);
        [z[1], dv, dw, z[2]]
    }
}

/// Cart-pole integrated with RK4 over one control interval under zero-order hold.
#[derive(Clone, Debug, PartialEq)]
pub struct CartPole {
    pub params: CartPoleParams,
    /// Control interval in seconds
    pub dt: f64,
    /// RK4 steps per control interval
    pub substeps: usize,
}

impl CartPole {
    pub fn new(params: CartPoleParams, dt: f64, substeps: usize) -> Self {
        Self { params, dt, substeps }
    }

    pub fn step(&self, state: &[f64; 4], force: f64) -> [f64; 4] {
        integrate(&|z: &[f64; 4]| self.params.derivative(z, force), state, self.dt, self.substeps)
    }
}

impl Plant for CartPole {
    fn state_dim(&self) -> usize {
        4
    }

    fn control_dim(&self) -> usize {
        1
    }

    fn simulate(&self, state: &DVector<f64>, control: &DVector<f64>) -> Result<DVector<f64>, PlantError> {
        if state.len() != 4 || control.len() != 1 {
            return Err(PlantError::DimensionMismatch(format!(
                "cart-pole takes a 4-dimensional state and 1 control, got {} and {}",
                state.len(),
                control.len()
            )));
        }
        let z = [state[0], state[1], state[2], state[3]];
        Ok(DVector::from_row_slice(&self.step(&z, control[0])))
    }
}

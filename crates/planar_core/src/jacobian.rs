use crate::traits::{Jacobian, PlanarSystem, State};
use serde::{Deserialize, Serialize};

/// Relative step of the central difference stencil: ε = max(|coordinate|, 1) · 1e-6.
pub const FINITE_DIFFERENCE_SCALE: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JacobianSource {
    ClosedForm,
    FiniteDifference,
}

/// Jacobian at `state`, exact when the system supplies partials.
pub fn jacobian<S: PlanarSystem>(system: &S, state: &State, params: &S::Params) -> Jacobian {
    jacobian_with_source(system, state, params).0
}

pub fn jacobian_with_source<S: PlanarSystem>(
    system: &S,
    state: &State,
    params: &S::Params,
) -> (Jacobian, JacobianSource) {
    match system.jacobian(state, params) {
        Some(exact) => (exact, JacobianSource::ClosedForm),
        None => (
            finite_difference_jacobian(system, state, params),
            JacobianSource::FiniteDifference,
        ),
    }
}

/// Central differences, one column per coordinate.
pub fn finite_difference_jacobian<S: PlanarSystem>(
    system: &S,
    state: &State,
    params: &S::Params,
) -> Jacobian {
    let mut jac = Jacobian::zeros();
    for j in 0..2 {
        let eps = state[j].abs().max(1.0) * FINITE_DIFFERENCE_SCALE;
        let mut forward = *state;
        forward[j] += eps;
        let mut backward = *state;
        backward[j] -= eps;
        let column =
            (system.evaluate(&forward, params) - system.evaluate(&backward, params)) / (2.0 * eps);
        jac.set_column(j, &column);
    }
    jac
}

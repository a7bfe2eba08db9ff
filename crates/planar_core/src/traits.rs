use crate::nullcline::NullclineSet;
use crate::region::BoundingBox;
use nalgebra::{Matrix2, Vector2};

/// A point of the phase plane. Component 0 is the abscissa (x, or B for the
/// magneto-plasma model), component 1 the ordinate (y, or v).
pub type State = Vector2<f64>;

/// `[[∂f/∂x, ∂f/∂y], [∂g/∂x, ∂g/∂y]]` evaluated at a single point.
pub type Jacobian = Matrix2<f64>;

/// A planar autonomous flow dx/dt = f(x, y; p), dy/dt = g(x, y; p).
///
/// Implementations are immutable and side-effect free, so a single definition
/// can be shared by every analysis stage.
pub trait PlanarSystem {
    /// Parameter set passed explicitly into every evaluation.
    type Params;

    /// Evaluates the vector field `(f, g)` at `state`.
    fn evaluate(&self, state: &State, params: &Self::Params) -> State;

    /// Closed-form partial derivatives, when the system knows them.
    /// Returning `None` makes callers fall back to finite differences.
    fn jacobian(&self, _state: &State, _params: &Self::Params) -> Option<Jacobian> {
        None
    }

    /// Every equilibrium in closed form at `params`, when f = g = 0 can be solved
    /// explicitly. `None` sends the locator into its numeric mode.
    fn closed_form_fixed_points(&self, _params: &Self::Params) -> Option<Vec<State>> {
        None
    }

    /// Explicit f = 0 and g = 0 curves clipped to `region`, sampled with
    /// `samples` points per curve. `None` means zero-crossing extraction.
    fn closed_form_nullclines(
        &self,
        _params: &Self::Params,
        _region: &BoundingBox,
        _samples: usize,
    ) -> Option<NullclineSet> {
        None
    }
}

/// A single step method for the trajectory integrator.
///
/// `attempt` must not commit anything: the driver decides whether the step is
/// accepted from the returned error estimate.
pub trait StepMethod<S: PlanarSystem> {
    /// Proposes a step of size `h` from `(t, y)` where `dy = f(y)` is already known.
    fn attempt(
        &mut self,
        system: &S,
        params: &S::Params,
        t: f64,
        y: &State,
        dy: &State,
        h: f64,
    ) -> StepAttempt;

    /// Order used by the step-size controller; `None` disables adaptivity.
    fn error_order(&self) -> Option<u32>;
}

/// Outcome of a proposed step.
#[derive(Debug, Clone, Copy)]
pub struct StepAttempt {
    pub y_new: State,
    /// Derivative at `y_new`, reused as the first stage of the next step.
    pub dy_new: State,
    /// Local error estimate per component (zero for fixed-step methods).
    pub error: State,
    pub fn_evals: u64,
}

//! Closure-backed system definitions.

use crate::traits::{Jacobian, PlanarSystem, State};

pub type RhsFn<P> = Box<dyn Fn(&State, &P) -> State + Send + Sync>;
pub type JacobianFn<P> = Box<dyn Fn(&State, &P) -> Jacobian + Send + Sync>;

/// `{ rhs, jacobian_fn }` pair built from plain closures.
pub struct FnSystem<P> {
    rhs: RhsFn<P>,
    jacobian_fn: Option<JacobianFn<P>>,
}

impl<P> FnSystem<P> {
    pub fn new(rhs: impl Fn(&State, &P) -> State + Send + Sync + 'static) -> Self {
        Self {
            rhs: Box::new(rhs),
            jacobian_fn: None,
        }
    }

    /// Attaches closed-form partials; they are used verbatim by the evaluator.
    pub fn with_jacobian(
        mut self,
        jacobian: impl Fn(&State, &P) -> Jacobian + Send + Sync + 'static,
    ) -> Self {
        self.jacobian_fn = Some(Box::new(jacobian));
        self
    }

    pub fn has_closed_form_jacobian(&self) -> bool {
        self.jacobian_fn.is_some()
    }
}

impl<P> PlanarSystem for FnSystem<P> {
    type Params = P;

    fn evaluate(&self, state: &State, params: &P) -> State {
        (self.rhs)(state, params)
    }

    fn jacobian(&self, state: &State, params: &P) -> Option<Jacobian> {
        self.jacobian_fn.as_ref().map(|jac| jac(state, params))
    }
}

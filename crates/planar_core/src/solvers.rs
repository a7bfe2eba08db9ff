use crate::jacobian::{jacobian_with_source, JacobianSource};
use crate::traits::{Jacobian, PlanarSystem, State, StepAttempt, StepMethod};

/// Classic Runge-Kutta 4th Order Solver (fixed step, no error estimate).
#[derive(Debug, Clone, Copy, Default)]
pub struct Rk4;

impl<S: PlanarSystem> StepMethod<S> for Rk4 {
    fn attempt(
        &mut self,
        system: &S,
        params: &S::Params,
        _t: f64,
        y: &State,
        dy: &State,
        h: f64,
    ) -> StepAttempt {
        let half = 0.5 * h;

        // k1 = f(y) is the derivative handed in by the driver.
        let k1 = *dy;
        let k2 = system.evaluate(&(y + k1 * half), params);
        let k3 = system.evaluate(&(y + k2 * half), params);
        let k4 = system.evaluate(&(y + k3 * h), params);

        let y_new = y + (k1 + k2 * 2.0 + k3 * 2.0 + k4) * (h / 6.0);
        StepAttempt {
            dy_new: system.evaluate(&y_new, params),
            y_new,
            error: State::zeros(),
            fn_evals: 4,
        }
    }

    fn error_order(&self) -> Option<u32> {
        None
    }
}

// Tsitouras 5(4) tableau. The field is autonomous, so the c nodes are not needed.
const A21: f64 = 0.161;
const A31: f64 = -0.008480655492356989;
const A32: f64 = 0.335480655492357;
const A41: f64 = 2.897153057105493;
const A42: f64 = -6.359448489975075;
const A43: f64 = 4.3622954328695815;
const A51: f64 = 5.325864828439257;
const A52: f64 = -11.748883564062828;
const A53: f64 = 7.4955393428898365;
const A54: f64 = -0.09249506636175525;
const A61: f64 = 5.86145544294642;
const A62: f64 = -12.92096931784711;
const A63: f64 = 8.159367898576159;
const A64: f64 = -0.071584973281401;
const A65: f64 = -0.028269050394068383;

// 5th order weights (equal to the a7j row, FSAL).
const B1: f64 = 0.09646076681806523;
const B2: f64 = 0.01;
const B3: f64 = 0.4798896504144996;
const B4: f64 = 1.379008574103742;
const B5: f64 = -3.290069515436081;
const B6: f64 = 2.324710524099774;

// Difference between the 5th and embedded 4th order weights.
const E1: f64 = -0.00178001105222577714;
const E2: f64 = -0.0008164344596567469;
const E3: f64 = 0.007880878010261995;
const E4: f64 = -0.1447110071732629;
const E5: f64 = 0.5823571654525552;
const E6: f64 = -0.45808210592918697;
const E7: f64 = 1.0 / 66.0;

/// Tsitouras 5/4 Solver with embedded error estimate.
#[derive(Debug, Clone, Copy, Default)]
pub struct Tsit5;

impl<S: PlanarSystem> StepMethod<S> for Tsit5 {
    fn attempt(
        &mut self,
        system: &S,
        params: &S::Params,
        _t: f64,
        y: &State,
        dy: &State,
        h: f64,
    ) -> StepAttempt {
        let k1 = *dy;
        let k2 = system.evaluate(&(y + k1 * (h * A21)), params);
        let k3 = system.evaluate(&(y + (k1 * A31 + k2 * A32) * h), params);
        let k4 = system.evaluate(&(y + (k1 * A41 + k2 * A42 + k3 * A43) * h), params);
        let k5 = system.evaluate(
            &(y + (k1 * A51 + k2 * A52 + k3 * A53 + k4 * A54) * h),
            params,
        );
        let k6 = system.evaluate(
            &(y + (k1 * A61 + k2 * A62 + k3 * A63 + k4 * A64 + k5 * A65) * h),
            params,
        );

        let y_new = y + (k1 * B1 + k2 * B2 + k3 * B3 + k4 * B4 + k5 * B5 + k6 * B6) * h;
        let k7 = system.evaluate(&y_new, params);
        let error = (k1 * E1 + k2 * E2 + k3 * E3 + k4 * E4 + k5 * E5 + k6 * E6 + k7 * E7) * h;

        StepAttempt {
            y_new,
            dy_new: k7,
            error,
            fn_evals: 6,
        }
    }

    fn error_order(&self) -> Option<u32> {
        Some(4)
    }
}

/// Shampine's linearly implicit Rosenbrock 2(3) pair, L-stable.
///
/// Each attempt evaluates the Jacobian once (closed form or central
/// differences) and solves three 2×2 systems with W = I − h·d·J.
#[derive(Debug, Clone, Copy, Default)]
pub struct Rosenbrock23;

impl Rosenbrock23 {
    const D: f64 = 1.0 / (2.0 + std::f64::consts::SQRT_2);
    const E32: f64 = 6.0 + std::f64::consts::SQRT_2;
}

impl<S: PlanarSystem> StepMethod<S> for Rosenbrock23 {
    fn attempt(
        &mut self,
        system: &S,
        params: &S::Params,
        _t: f64,
        y: &State,
        dy: &State,
        h: f64,
    ) -> StepAttempt {
        let (j, source) = jacobian_with_source(system, y, params);
        let jac_evals = match source {
            JacobianSource::ClosedForm => 0,
            JacobianSource::FiniteDifference => 4,
        };
        let w = Jacobian::identity() - j * (h * Self::D);
        let lu = w.lu();

        let rejected = StepAttempt {
            y_new: *y,
            dy_new: *dy,
            error: State::repeat(f64::INFINITY),
            fn_evals: jac_evals,
        };

        let f0 = *dy;
        let Some(k1) = lu.solve(&f0) else {
            return rejected;
        };
        let f1 = system.evaluate(&(y + k1 * (0.5 * h)), params);
        let Some(k2) = lu.solve(&(f1 - k1)).map(|v| v + k1) else {
            return rejected;
        };
        let y_new = y + k2 * h;
        let f2 = system.evaluate(&y_new, params);
        let Some(k3) = lu.solve(&(f2 - (k2 - f1) * Self::E32 - (k1 - f0) * 2.0)) else {
            return rejected;
        };

        StepAttempt {
            y_new,
            dy_new: f2,
            error: (k1 - k2 * 2.0 + k3) * (h / 6.0),
            fn_evals: jac_evals + 2,
        }
    }

    fn error_order(&self) -> Option<u32> {
        Some(2)
    }
}

//! Trajectory integration with fixed-step, adaptive and stiff-capable methods.

use crate::error::{PlanarError, PlanarResult};
use crate::solvers::{Rk4, Rosenbrock23, Tsit5};
use crate::traits::{PlanarSystem, State, StepAttempt, StepMethod};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum Method {
    /// Classic RK4 with a constant step.
    Rk4 { step: f64 },
    #[default]
    Tsit5,
    Rosenbrock23,
}

impl Method {
    fn build(self) -> InternalStepper {
        match self {
            Method::Rk4 { .. } => InternalStepper::Rk4(Rk4),
            Method::Tsit5 => InternalStepper::Tsit5(Tsit5),
            Method::Rosenbrock23 => InternalStepper::Rosenbrock23(Rosenbrock23),
        }
    }
}

enum InternalStepper {
    Rk4(Rk4),
    Tsit5(Tsit5),
    Rosenbrock23(Rosenbrock23),
}

impl InternalStepper {
    fn attempt<S: PlanarSystem>(
        &mut self,
        system: &S,
        params: &S::Params,
        t: f64,
        y: &State,
        dy: &State,
        h: f64,
    ) -> StepAttempt {
        match self {
            InternalStepper::Rk4(s) => s.attempt(system, params, t, y, dy, h),
            InternalStepper::Tsit5(s) => s.attempt(system, params, t, y, dy, h),
            InternalStepper::Rosenbrock23(s) => s.attempt(system, params, t, y, dy, h),
        }
    }

    fn error_order<S: PlanarSystem>(&self) -> Option<u32> {
        match self {
            InternalStepper::Rk4(s) => <Rk4 as StepMethod<S>>::error_order(s),
            InternalStepper::Tsit5(s) => <Tsit5 as StepMethod<S>>::error_order(s),
            InternalStepper::Rosenbrock23(s) => {
                <Rosenbrock23 as StepMethod<S>>::error_order(s)
            }
        }
    }
}

/// Controls for the step-size loop and the early-termination guards.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntegratorSettings {
    pub method: Method,
    pub rtol: f64,
    pub atol: f64,
    /// First trial step; estimated from the field when `None`.
    pub initial_step: Option<f64>,
    pub max_step: Option<f64>,
    /// Accepted plus rejected steps before giving up.
    pub max_steps: usize,
    /// ‖state‖ above this counts as a blow-up.
    pub divergence_bound: f64,
}

impl Default for IntegratorSettings {
    fn default() -> Self {
        Self {
            method: Method::Tsit5,
            rtol: 1e-6,
            atol: 1e-9,
            initial_step: None,
            max_step: None,
            max_steps: 100_000,
            divergence_bound: 1e8,
        }
    }
}

impl IntegratorSettings {
    pub fn with_method(method: Method) -> Self {
        Self {
            method,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> PlanarResult<()> {
        let positive = |value: f64| value.is_finite() && value > 0.0;
        if let Method::Rk4 { step } = self.method {
            if !positive(step) {
                return Err(invalid("rk4 step must be positive and finite"));
            }
        }
        if !positive(self.rtol) || !positive(self.atol) {
            return Err(invalid("rtol and atol must be positive and finite"));
        }
        if self.initial_step.is_some_and(|h| !positive(h)) {
            return Err(invalid("initial_step must be positive and finite"));
        }
        if self.max_step.is_some_and(|h| !positive(h)) {
            return Err(invalid("max_step must be positive and finite"));
        }
        if self.max_steps == 0 {
            return Err(invalid("max_steps must be at least 1"));
        }
        if !positive(self.divergence_bound) {
            return Err(invalid("divergence_bound must be positive"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TrajectorySample {
    pub t: f64,
    pub x: f64,
    pub y: f64,
}

impl TrajectorySample {
    fn new(t: f64, state: &State) -> Self {
        Self {
            t,
            x: state.x,
            y: state.y,
        }
    }

    pub fn state(&self) -> State {
        State::new(self.x, self.y)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum IntegrationStatus {
    Completed,
    /// The state left the divergence bound or became non-finite after `last_valid_t`.
    #[serde(rename = "blow_up")]
    Diverged { last_valid_t: f64, norm: f64 },
    StepLimitReached { last_t: f64 },
    StepSizeUnderflow { last_t: f64 },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IntegrationStats {
    pub fn_evals: u64,
    pub accepted_steps: usize,
    pub rejected_steps: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Trajectory {
    pub initial_state: State,
    /// Strictly increasing in t; the first sample is the initial condition.
    pub samples: Vec<TrajectorySample>,
    pub status: IntegrationStatus,
    pub stats: IntegrationStats,
    pub method: Method,
}

impl Trajectory {
    pub fn times(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.t).collect()
    }

    pub fn xs(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.x).collect()
    }

    pub fn ys(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.y).collect()
    }

    pub fn last(&self) -> Option<&TrajectorySample> {
        self.samples.last()
    }

    pub fn reached_end(&self) -> bool {
        self.status == IntegrationStatus::Completed
    }

    /// Early termination of any kind becomes `IntegrationDivergence`.
    pub fn require_completed(&self) -> PlanarResult<&Self> {
        let last_norm = || self.last().map_or(0.0, |s| s.state().norm());
        match self.status {
            IntegrationStatus::Completed => Ok(self),
            IntegrationStatus::Diverged { last_valid_t, norm } => {
                Err(PlanarError::IntegrationDivergence { last_valid_t, norm })
            }
            IntegrationStatus::StepLimitReached { last_t }
            | IntegrationStatus::StepSizeUnderflow { last_t } => {
                Err(PlanarError::IntegrationDivergence {
                    last_valid_t: last_t,
                    norm: last_norm(),
                })
            }
        }
    }
}

const SAFETY: f64 = 0.9;
const MIN_FACTOR: f64 = 0.2;
const MAX_FACTOR: f64 = 5.0;

/// Integrates forward over `t_span = (t0, t1)`.
///
/// With `t_eval` the trajectory holds exactly those times (plus `t0` up
/// front), interpolated with cubic Hermite polynomials between accepted
/// steps. Without it every accepted step is emitted.
pub fn integrate<S: PlanarSystem>(
    system: &S,
    params: &S::Params,
    initial: State,
    t_span: (f64, f64),
    t_eval: Option<&[f64]>,
    settings: &IntegratorSettings,
) -> PlanarResult<Trajectory> {
    settings.validate()?;
    let (t0, t1) = t_span;
    if !t0.is_finite() || !t1.is_finite() {
        return Err(invalid("time span must be finite"));
    }
    if t1 < t0 {
        return Err(invalid(&format!(
            "time span must run forward (t0 = {t0}, t1 = {t1})"
        )));
    }
    if !initial.iter().all(|v| v.is_finite()) {
        return Err(invalid("initial state must be finite"));
    }
    if let Some(times) = t_eval {
        validate_t_eval(times, t0, t1)?;
    }

    let mut samples = vec![TrajectorySample::new(t0, &initial)];
    // Index of the next t_eval entry still to be emitted.
    let mut cursor = match t_eval {
        Some(times) if times.first() == Some(&t0) => 1,
        _ => 0,
    };
    let mut stats = IntegrationStats::default();

    if t1 == t0 {
        return Ok(Trajectory {
            initial_state: initial,
            samples,
            status: IntegrationStatus::Completed,
            stats,
            method: settings.method,
        });
    }

    debug!(
        "integrating {:?} over [{t0}, {t1}] from ({}, {})",
        settings.method, initial.x, initial.y
    );

    let mut stepper = settings.method.build();
    let order = stepper.error_order::<S>();

    let mut t = t0;
    let mut y = initial;
    let mut dy = system.evaluate(&y, params);
    stats.fn_evals += 1;

    let mut h = match (settings.method, settings.initial_step) {
        (Method::Rk4 { step }, _) => step,
        (_, Some(h)) => h,
        (_, None) => {
            let (h, evals) = initial_step_size(system, params, &y, &dy, order, t1 - t0, settings);
            stats.fn_evals += evals;
            h
        }
    };
    if let Some(max_step) = settings.max_step {
        h = h.min(max_step);
    }

    let status = loop {
        if t >= t1 {
            break IntegrationStatus::Completed;
        }
        if stats.accepted_steps + stats.rejected_steps >= settings.max_steps {
            break IntegrationStatus::StepLimitReached { last_t: t };
        }

        let min_step = 16.0 * f64::EPSILON * t.abs().max(1.0);
        let remaining = t1 - t;
        let mut h_try = h.min(remaining);
        if remaining - h_try < min_step {
            h_try = remaining;
        }
        if order.is_some() && h_try < min_step && h_try < remaining {
            break IntegrationStatus::StepSizeUnderflow { last_t: t };
        }

        let attempt = stepper.attempt(system, params, t, &y, &dy, h_try);
        stats.fn_evals += attempt.fn_evals;

        let factor = match order {
            None => 1.0,
            Some(q) => {
                let err = error_norm(&attempt.error, &y, &attempt.y_new, settings);
                if !err.is_finite() || err > 1.0 {
                    stats.rejected_steps += 1;
                    let shrink = if err.is_finite() {
                        (SAFETY * err.powf(-1.0 / f64::from(q + 1))).max(MIN_FACTOR)
                    } else {
                        MIN_FACTOR
                    };
                    h = h_try * shrink;
                    if h < min_step {
                        break IntegrationStatus::StepSizeUnderflow { last_t: t };
                    }
                    continue;
                }
                if err == 0.0 {
                    MAX_FACTOR
                } else {
                    (SAFETY * err.powf(-1.0 / f64::from(q + 1))).clamp(MIN_FACTOR, MAX_FACTOR)
                }
            }
        };

        let norm = attempt.y_new.norm();
        if !norm.is_finite() || norm > settings.divergence_bound {
            break IntegrationStatus::Diverged {
                last_valid_t: t,
                norm,
            };
        }

        let t_new = if h_try == remaining { t1 } else { t + h_try };
        stats.accepted_steps += 1;

        match t_eval {
            Some(times) => {
                while cursor < times.len() && times[cursor] <= t_new {
                    let te = times[cursor];
                    let state = hermite(t, &y, &dy, t_new, &attempt.y_new, &attempt.dy_new, te);
                    samples.push(TrajectorySample::new(te, &state));
                    cursor += 1;
                }
            }
            None => samples.push(TrajectorySample::new(t_new, &attempt.y_new)),
        }

        t = t_new;
        y = attempt.y_new;
        dy = attempt.dy_new;
        if order.is_some() {
            h = h_try * factor;
            if let Some(max_step) = settings.max_step {
                h = h.min(max_step);
            }
        }
    };

    match status {
        IntegrationStatus::Completed => debug!(
            "integration completed: {} accepted, {} rejected, {} evaluations",
            stats.accepted_steps, stats.rejected_steps, stats.fn_evals
        ),
        other => warn!("integration stopped early: {other:?}"),
    }

    Ok(Trajectory {
        initial_state: initial,
        samples,
        status,
        stats,
        method: settings.method,
    })
}

/// Integrates each initial condition independently with shared settings.
pub fn integrate_many<S: PlanarSystem>(
    system: &S,
    params: &S::Params,
    initials: &[State],
    t_span: (f64, f64),
    t_eval: Option<&[f64]>,
    settings: &IntegratorSettings,
) -> PlanarResult<Vec<Trajectory>> {
    initials
        .iter()
        .map(|initial| integrate(system, params, *initial, t_span, t_eval, settings))
        .collect()
}

/// Shifts every point by `offset`, e.g. to start orbits just off the equilibria.
pub fn perturbed_initial_conditions(points: &[State], offset: State) -> Vec<State> {
    points.iter().map(|p| p + offset).collect()
}

fn validate_t_eval(times: &[f64], t0: f64, t1: f64) -> PlanarResult<()> {
    if times.iter().any(|t| !t.is_finite()) {
        return Err(invalid("t_eval must contain only finite times"));
    }
    if times.windows(2).any(|w| w[1] <= w[0]) {
        return Err(invalid("t_eval must be strictly increasing"));
    }
    if let (Some(&first), Some(&last)) = (times.first(), times.last()) {
        if first < t0 || last > t1 {
            return Err(invalid(&format!(
                "t_eval [{first}, {last}] lies outside the span [{t0}, {t1}]"
            )));
        }
    }
    Ok(())
}

/// Weighted RMS of the local error.
fn error_norm(error: &State, y: &State, y_new: &State, settings: &IntegratorSettings) -> f64 {
    let mut sum = 0.0;
    for i in 0..2 {
        let scale = settings.atol + settings.rtol * y[i].abs().max(y_new[i].abs());
        sum += (error[i] / scale).powi(2);
    }
    (sum / 2.0).sqrt()
}

fn rms_scaled(v: &State, y: &State, settings: &IntegratorSettings) -> f64 {
    let mut sum = 0.0;
    for i in 0..2 {
        let scale = settings.atol + settings.rtol * y[i].abs();
        sum += (v[i] / scale).powi(2);
    }
    (sum / 2.0).sqrt()
}

/// Hairer–Nørsett–Wanner starting step. Returns the step and the evaluations spent.
fn initial_step_size<S: PlanarSystem>(
    system: &S,
    params: &S::Params,
    y0: &State,
    f0: &State,
    order: Option<u32>,
    span: f64,
    settings: &IntegratorSettings,
) -> (f64, u64) {
    let order = f64::from(order.unwrap_or(4));
    let d0 = rms_scaled(y0, y0, settings);
    let d1 = rms_scaled(f0, y0, settings);
    let h0 = if d0 < 1e-5 || d1 < 1e-5 {
        1e-6
    } else {
        0.01 * d0 / d1
    };
    let h0 = h0.min(span);

    let y1 = y0 + f0 * h0;
    let f1 = system.evaluate(&y1, params);
    let d2 = rms_scaled(&(f1 - f0), y0, settings) / h0;

    let dmax = d1.max(d2);
    let h1 = if !dmax.is_finite() {
        h0
    } else if dmax <= 1e-15 {
        (h0 * 1e-3).max(1e-6)
    } else {
        (0.01 / dmax).powf(1.0 / (order + 1.0))
    };
    ((100.0 * h0).min(h1).min(span).max(f64::MIN_POSITIVE), 1)
}

fn hermite(t0: f64, y0: &State, f0: &State, t1: f64, y1: &State, f1: &State, t: f64) -> State {
    let h = t1 - t0;
    let s = (t - t0) / h;
    let s2 = s * s;
    let s3 = s2 * s;
    let h00 = 2.0 * s3 - 3.0 * s2 + 1.0;
    let h10 = s3 - 2.0 * s2 + s;
    let h01 = -2.0 * s3 + 3.0 * s2;
    let h11 = s3 - s2;
    y0 * h00 + f0 * (h * h10) + y1 * h01 + f1 * (h * h11)
}

fn invalid(message: &str) -> PlanarError {
    PlanarError::InvalidInput(message.to_string())
}

#[cfg(test)]
mod tests {
    use super::{
        integrate, integrate_many, perturbed_initial_conditions, IntegrationStatus,
        IntegratorSettings, Method,
    };
    use crate::error::PlanarError;
    use crate::models::{BvParams, MagnetoPlasma};
    use crate::region::linspace;
    use crate::system::FnSystem;
    use crate::traits::State;

    fn decay() -> FnSystem<()> {
        FnSystem::new(|s: &State, _: &()| State::new(-s.x, -0.5 * s.y))
    }

    #[test]
    fn tsit5_hits_t_eval_exactly_and_tracks_the_solution() {
        let t_eval = linspace(0.0, 5.0, 11);
        let traj = integrate(
            &decay(),
            &(),
            State::new(1.0, 2.0),
            (0.0, 5.0),
            Some(&t_eval),
            &IntegratorSettings::default(),
        )
        .expect("integration should run");
        assert!(traj.reached_end());
        assert_eq!(traj.times(), t_eval);
        for s in &traj.samples {
            assert!((s.x - (-s.t).exp()).abs() < 1e-5, "x({}) = {}", s.t, s.x);
            assert!((s.y - 2.0 * (-0.5 * s.t).exp()).abs() < 1e-5);
        }
    }

    #[test]
    fn initial_condition_is_prepended_before_later_t_eval() {
        let traj = integrate(
            &decay(),
            &(),
            State::new(1.0, 1.0),
            (0.0, 2.0),
            Some(&[0.5, 1.0, 2.0]),
            &IntegratorSettings::default(),
        )
        .expect("integration should run");
        assert_eq!(traj.times(), vec![0.0, 0.5, 1.0, 2.0]);
        assert_eq!(traj.samples[0].state(), State::new(1.0, 1.0));
    }

    #[test]
    fn rk4_uses_a_constant_step_and_lands_on_t1() {
        let settings = IntegratorSettings::with_method(Method::Rk4 { step: 0.01 });
        let traj = integrate(&decay(), &(), State::new(1.0, 1.0), (0.0, 1.0), None, &settings)
            .expect("integration should run");
        assert_eq!(traj.stats.accepted_steps, 100);
        assert_eq!(traj.stats.rejected_steps, 0);
        assert_eq!(traj.stats.fn_evals, 1 + 4 * 100);
        let last = traj.last().expect("samples");
        assert_eq!(last.t, 1.0);
        assert!((last.x - (-1.0f64).exp()).abs() < 1e-9);
    }

    #[test]
    fn explicit_and_stiff_methods_agree_on_the_magneto_plasma_flow() {
        let params = BvParams::new(0.5, 1.5);
        let initial = State::new((1.5f64 - 0.0625).sqrt() + 0.1, 0.25);
        let t_eval = linspace(0.0, 10.0, 201);
        let run = |method| {
            let settings = IntegratorSettings {
                method,
                rtol: 1e-8,
                atol: 1e-10,
                ..IntegratorSettings::default()
            };
            integrate(&MagnetoPlasma, &params, initial, (0.0, 10.0), Some(&t_eval), &settings)
                .expect("integration should run")
        };
        let explicit = run(Method::Tsit5);
        let stiff = run(Method::Rosenbrock23);
        assert!(explicit.reached_end() && stiff.reached_end());
        assert_eq!(explicit.samples.len(), 201);
        assert_eq!(stiff.samples.len(), 201);
        for (a, b) in explicit.samples.iter().zip(&stiff.samples) {
            assert_eq!(a.t, b.t);
            let diff = (a.state() - b.state()).amax();
            assert!(diff < 1e-3, "methods disagree by {diff} at t = {}", a.t);
        }
    }

    #[test]
    fn rosenbrock_takes_far_fewer_steps_on_stiff_problems() {
        let stiff = FnSystem::new(|s: &State, _: &()| State::new(-1.0e3 * (s.x - s.y), -s.y));
        let run = |method| {
            let settings = IntegratorSettings {
                method,
                rtol: 1e-3,
                atol: 1e-6,
                ..IntegratorSettings::default()
            };
            integrate(&stiff, &(), State::new(0.0, 1.0), (0.0, 10.0), None, &settings)
                .expect("integration should run")
        };
        let explicit = run(Method::Tsit5);
        let implicit = run(Method::Rosenbrock23);
        assert!(explicit.reached_end() && implicit.reached_end());
        assert!(
            implicit.stats.accepted_steps * 4 < explicit.stats.accepted_steps,
            "rosenbrock {} vs tsit5 {}",
            implicit.stats.accepted_steps,
            explicit.stats.accepted_steps
        );
        let last = implicit.last().expect("samples");
        assert!((last.x - last.y).abs() < 1e-3);
    }

    #[test]
    fn finite_time_blow_up_stops_with_the_valid_prefix() {
        let riccati = FnSystem::new(|s: &State, _: &()| State::new(s.x * s.x, 0.0));
        let settings = IntegratorSettings {
            divergence_bound: 1e6,
            ..IntegratorSettings::default()
        };
        let traj = integrate(&riccati, &(), State::new(1.0, 0.0), (0.0, 2.0), None, &settings)
            .expect("blow-up is reported as a status");
        let IntegrationStatus::Diverged { last_valid_t, norm } = traj.status else {
            panic!("expected divergence, got {:?}", traj.status);
        };
        // Exact blow-up at t = 1; the controller may step a hair past it.
        assert!((last_valid_t - 1.0).abs() < 1e-4, "t = {last_valid_t}");
        assert!(!(norm <= 1e6));
        assert!(traj.samples.iter().all(|s| s.state().norm() <= 1e6));
        assert_eq!(traj.last().map(|s| s.t), Some(last_valid_t));

        let err = traj.require_completed().expect_err("blow-up");
        assert!(matches!(err, PlanarError::IntegrationDivergence { .. }));
        assert!(err.to_string().contains("diverged"));
    }

    #[test]
    fn step_limit_is_reported_as_a_status() {
        let settings = IntegratorSettings {
            max_steps: 3,
            ..IntegratorSettings::default()
        };
        let traj = integrate(&decay(), &(), State::new(1.0, 1.0), (0.0, 100.0), None, &settings)
            .expect("integration should run");
        assert!(matches!(traj.status, IntegrationStatus::StepLimitReached { .. }));
        assert!(traj.require_completed().is_err());
    }

    #[test]
    fn zero_length_span_returns_the_initial_condition() {
        let initial = State::new(0.3, -0.7);
        let traj = integrate(
            &decay(),
            &(),
            initial,
            (2.0, 2.0),
            None,
            &IntegratorSettings::default(),
        )
        .expect("zero span");
        assert_eq!(traj.samples.len(), 1);
        assert_eq!(traj.samples[0].t, 2.0);
        assert_eq!(traj.samples[0].state(), initial);
        assert_eq!(traj.status, IntegrationStatus::Completed);
        assert_eq!(traj.stats.fn_evals, 0);
    }

    #[test]
    fn rejects_bad_time_grids_and_settings() {
        let settings = IntegratorSettings::default();
        let initial = State::new(1.0, 1.0);
        let err = integrate(&decay(), &(), initial, (0.0, 1.0), Some(&[0.0, 0.5, 0.5]), &settings)
            .expect_err("repeated time");
        assert!(err.to_string().contains("strictly increasing"));
        let err = integrate(&decay(), &(), initial, (0.0, 1.0), Some(&[0.5, 1.5]), &settings)
            .expect_err("outside span");
        assert!(err.to_string().contains("outside the span"));
        let err = integrate(&decay(), &(), initial, (1.0, 0.0), None, &settings)
            .expect_err("backward span");
        assert!(err.to_string().contains("forward"));
        let err = integrate(
            &decay(),
            &(),
            State::new(f64::NAN, 0.0),
            (0.0, 1.0),
            None,
            &settings,
        )
        .expect_err("nan initial state");
        assert!(matches!(err, PlanarError::InvalidInput(_)));
        let bad = IntegratorSettings::with_method(Method::Rk4 { step: 0.0 });
        assert!(integrate(&decay(), &(), initial, (0.0, 1.0), None, &bad).is_err());
    }

    #[test]
    fn batch_integration_starts_next_to_each_point() {
        let points = [State::new(0.0, 0.0), State::new(1.0, -1.0)];
        let starts = perturbed_initial_conditions(&points, State::new(0.1, 0.0));
        assert_eq!(starts, vec![State::new(0.1, 0.0), State::new(1.1, -1.0)]);
        let trajectories = integrate_many(
            &decay(),
            &(),
            &starts,
            (0.0, 1.0),
            Some(&[0.0, 1.0]),
            &IntegratorSettings::default(),
        )
        .expect("batch integration");
        assert_eq!(trajectories.len(), 2);
        for (traj, start) in trajectories.iter().zip(&starts) {
            assert_eq!(traj.initial_state, *start);
            assert_eq!(traj.samples.len(), 2);
        }
    }
}

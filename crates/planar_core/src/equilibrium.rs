//! Fixed-point location: closed-form candidates or multi-start Newton.

use crate::error::{PlanarError, PlanarResult};
use crate::jacobian::jacobian;
use crate::region::{linspace, BoundingBox};
use crate::traits::{Jacobian, PlanarSystem, State};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct NewtonSettings {
    pub max_steps: usize,
    pub damping: f64,
    pub tolerance: f64,
}

impl Default for NewtonSettings {
    fn default() -> Self {
        Self {
            max_steps: 25,
            damping: 1.0,
            tolerance: 1e-9,
        }
    }
}

impl NewtonSettings {
    fn validate(&self) -> PlanarResult<()> {
        if self.max_steps == 0 {
            return Err(PlanarError::InvalidInput(
                "max_steps must be greater than zero.".to_string(),
            ));
        }
        if !(self.damping > 0.0) {
            return Err(PlanarError::InvalidInput(
                "damping must be positive.".to_string(),
            ));
        }
        if !(self.tolerance > 0.0) {
            return Err(PlanarError::InvalidInput(
                "tolerance must be positive.".to_string(),
            ));
        }
        Ok(())
    }
}

/// Regular lattice of Newton starting points over the region of interest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedGrid {
    pub nx: usize,
    pub ny: usize,
}

impl Default for SeedGrid {
    fn default() -> Self {
        Self { nx: 9, ny: 9 }
    }
}

impl SeedGrid {
    pub fn seeds(&self, region: &BoundingBox) -> Vec<State> {
        let xs = linspace(region.x_min, region.x_max, self.nx);
        let ys = linspace(region.y_min, region.y_max, self.ny);
        ys.iter()
            .flat_map(|&y| xs.iter().map(move |&x| State::new(x, y)))
            .collect()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct LocatorSettings {
    pub newton: NewtonSettings,
    pub seed_grid: SeedGrid,
    /// Two roots closer than this (max-norm) are the same fixed point.
    pub dedup_tolerance: f64,
}

impl Default for LocatorSettings {
    fn default() -> Self {
        Self {
            newton: NewtonSettings::default(),
            seed_grid: SeedGrid::default(),
            dedup_tolerance: 1e-6,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EquilibriumResult {
    pub state: State,
    pub residual_norm: f64,
    pub iterations: usize,
    pub jacobian: Jacobian,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum FixedPointOrigin {
    ClosedForm,
    Numeric { seed: State, iterations: usize },
}

#[derive(Debug, Clone, Serialize)]
pub struct FixedPoint<P> {
    pub coordinates: State,
    pub params_used: P,
    pub residual_norm: f64,
    pub origin: FixedPointOrigin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LocatorStatus {
    Found,
    /// Closed-form mode where no supplied solution exists at these parameters.
    NoSolutions,
    /// Numeric mode where no seed converged.
    NoConvergence,
    /// Numeric mode where seeds converged, but only to roots outside the region.
    OutsideRegion,
}

#[derive(Debug, Clone, Serialize)]
pub struct FixedPointSet<P> {
    pub fixed_points: Vec<FixedPoint<P>>,
    pub status: LocatorStatus,
    pub seeds_tried: usize,
    pub seeds_converged: usize,
    /// Converged runs whose root fell outside the region and was dropped.
    pub roots_outside_region: usize,
    /// Smallest residual reached by a failed Newton run (∞ if none failed).
    pub best_failed_residual: f64,
}

impl<P> FixedPointSet<P> {
    pub fn len(&self) -> usize {
        self.fixed_points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fixed_points.is_empty()
    }

    /// The points, or `NoConvergence` when the numeric search came back empty.
    pub fn require_any(&self) -> PlanarResult<&[FixedPoint<P>]> {
        if self.status == LocatorStatus::NoConvergence {
            return Err(PlanarError::NoConvergence {
                seeds: self.seeds_tried,
                best_residual: self.best_failed_residual,
            });
        }
        Ok(&self.fixed_points)
    }
}

/// A closed-form equilibrium as a function of the parameters; `None` when the
/// branch does not exist for the given values.
pub type ClosedFormSolution<P> = Box<dyn Fn(&P) -> Option<State> + Send + Sync>;

/// Damped Newton iteration on `(f, g) = 0` from a single starting point.
pub fn solve_equilibrium<S: PlanarSystem>(
    system: &S,
    params: &S::Params,
    initial_guess: &State,
    settings: &NewtonSettings,
) -> PlanarResult<EquilibriumResult> {
    settings.validate()?;
    if !initial_guess.iter().all(|v| v.is_finite()) {
        return Err(PlanarError::InvalidInput(
            "Initial guess must be finite.".to_string(),
        ));
    }

    let mut state = *initial_guess;
    let mut residual = system.evaluate(&state, params);
    let mut residual_norm = residual.norm();
    let mut iterations = 0usize;

    loop {
        if residual_norm <= settings.tolerance {
            break;
        }

        if iterations >= settings.max_steps || !residual_norm.is_finite() {
            return Err(PlanarError::NoConvergence {
                seeds: 1,
                best_residual: residual_norm,
            });
        }

        let jac = jacobian(system, &state, params);
        let delta = jac.lu().solve(&residual).ok_or(PlanarError::SingularJacobian {
            x: state.x,
            y: state.y,
        })?;

        state -= settings.damping * delta;
        iterations += 1;
        residual = system.evaluate(&state, params);
        residual_norm = residual.norm();
    }

    Ok(EquilibriumResult {
        jacobian: jacobian(system, &state, params),
        state,
        residual_norm,
        iterations,
    })
}

/// Evaluates caller-supplied closed-form solutions at `params`.
pub fn locate_closed_form<S>(
    system: &S,
    params: &S::Params,
    solutions: &[ClosedFormSolution<S::Params>],
    dedup_tolerance: f64,
) -> FixedPointSet<S::Params>
where
    S: PlanarSystem,
    S::Params: Clone,
{
    let points: Vec<State> = solutions
        .iter()
        .filter_map(|solution| solution(params))
        .collect();
    let mut set = locate_known_points(system, params, &points, dedup_tolerance);
    set.seeds_tried = solutions.len();
    set
}

/// Closed-form mode over equilibria that are already known, e.g. from
/// [`PlanarSystem::closed_form_fixed_points`].
pub fn locate_known_points<S>(
    system: &S,
    params: &S::Params,
    points: &[State],
    dedup_tolerance: f64,
) -> FixedPointSet<S::Params>
where
    S: PlanarSystem,
    S::Params: Clone,
{
    let mut fixed_points: Vec<FixedPoint<S::Params>> = Vec::new();
    for point in points {
        if !point.iter().all(|v| v.is_finite()) {
            debug!("closed-form solution produced a non-finite point; skipped");
            continue;
        }
        if is_duplicate(&fixed_points, point, dedup_tolerance) {
            continue;
        }
        fixed_points.push(FixedPoint {
            residual_norm: system.evaluate(point, params).norm(),
            coordinates: *point,
            params_used: params.clone(),
            origin: FixedPointOrigin::ClosedForm,
        });
    }

    let status = if fixed_points.is_empty() {
        LocatorStatus::NoSolutions
    } else {
        LocatorStatus::Found
    };
    FixedPointSet {
        seeds_tried: points.len(),
        seeds_converged: fixed_points.len(),
        roots_outside_region: 0,
        fixed_points,
        status,
        best_failed_residual: f64::INFINITY,
    }
}

/// Multi-start Newton from `seeds`. Roots outside `region` are discarded.
pub fn locate_numeric<S>(
    system: &S,
    params: &S::Params,
    region: &BoundingBox,
    seeds: &[State],
    settings: &LocatorSettings,
) -> PlanarResult<FixedPointSet<S::Params>>
where
    S: PlanarSystem,
    S::Params: Clone,
{
    region.validate()?;
    settings.newton.validate()?;
    if seeds.is_empty() {
        return Err(PlanarError::InvalidInput(
            "at least one seed point is required".to_string(),
        ));
    }

    let tol = settings.dedup_tolerance;
    let mut fixed_points: Vec<FixedPoint<S::Params>> = Vec::new();
    let mut converged = 0usize;
    let mut outside = 0usize;
    let mut best_failed_residual = f64::INFINITY;

    for seed in seeds {
        match solve_equilibrium(system, params, seed, &settings.newton) {
            Ok(result) => {
                if !region.contains_with_margin(&result.state, tol) {
                    debug!(
                        "root ({}, {}) from seed ({}, {}) lies outside the region",
                        result.state.x, result.state.y, seed.x, seed.y
                    );
                    outside += 1;
                    continue;
                }
                converged += 1;
                if is_duplicate(&fixed_points, &result.state, tol) {
                    continue;
                }
                fixed_points.push(FixedPoint {
                    coordinates: result.state,
                    params_used: params.clone(),
                    residual_norm: result.residual_norm,
                    origin: FixedPointOrigin::Numeric {
                        seed: *seed,
                        iterations: result.iterations,
                    },
                });
            }
            Err(PlanarError::NoConvergence { best_residual, .. }) => {
                best_failed_residual = best_failed_residual.min(best_residual);
            }
            Err(err) => {
                debug!("seed ({}, {}) abandoned: {err}", seed.x, seed.y);
            }
        }
    }

    let status = if !fixed_points.is_empty() {
        LocatorStatus::Found
    } else if outside > 0 {
        debug!(
            "{outside} seed(s) converged, all to roots outside [{}, {}] x [{}, {}]",
            region.x_min, region.x_max, region.y_min, region.y_max
        );
        LocatorStatus::OutsideRegion
    } else {
        warn!(
            "no fixed point converged from {} seed(s) in [{}, {}] x [{}, {}]",
            seeds.len(),
            region.x_min,
            region.x_max,
            region.y_min,
            region.y_max
        );
        LocatorStatus::NoConvergence
    };

    Ok(FixedPointSet {
        fixed_points,
        status,
        seeds_tried: seeds.len(),
        seeds_converged: converged,
        roots_outside_region: outside,
        best_failed_residual,
    })
}

fn is_duplicate<P>(existing: &[FixedPoint<P>], candidate: &State, tol: f64) -> bool {
    existing
        .iter()
        .any(|fp| (fp.coordinates - candidate).amax() <= tol)
}

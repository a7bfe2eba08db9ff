//! Fixed points with their classifications, and the full phase-portrait bundle.

use crate::config::AnalysisConfig;
use crate::equilibrium::{
    locate_closed_form, locate_known_points, locate_numeric, ClosedFormSolution, FixedPoint,
    FixedPointSet, LocatorStatus,
};
use crate::error::{PlanarError, PlanarResult};
use crate::field::{sample_field, VectorFieldGrid};
use crate::integrator::{integrate_many, perturbed_initial_conditions, Trajectory};
use crate::jacobian::{jacobian_with_source, JacobianSource};
use crate::nullcline::{nullclines, NullclineSet};
use crate::region::{linspace, BoundingBox};
use crate::stability::{classify, Classification};
use crate::traits::{Jacobian, PlanarSystem, State};
use log::debug;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize)]
pub struct ClassifiedPoint<P> {
    pub fixed_point: FixedPoint<P>,
    pub jacobian: Jacobian,
    pub jacobian_source: JacobianSource,
    pub classification: Classification,
}

#[derive(Debug, Clone, Serialize)]
pub struct Analysis<P> {
    pub points: Vec<ClassifiedPoint<P>>,
    pub status: LocatorStatus,
    pub seeds_tried: usize,
    pub best_failed_residual: f64,
}

impl<P> Analysis<P> {
    pub fn fixed_points(&self) -> impl Iterator<Item = &State> + '_ {
        self.points.iter().map(|p| &p.fixed_point.coordinates)
    }

    pub fn classifications(&self) -> impl Iterator<Item = &Classification> + '_ {
        self.points.iter().map(|p| &p.classification)
    }

    /// Swaps the parameter payload of every point, e.g. to erase a typed
    /// parameter struct into a plain vector.
    pub fn map_params<Q>(self, mut f: impl FnMut(&P) -> Q) -> Analysis<Q> {
        Analysis {
            points: self
                .points
                .into_iter()
                .map(|p| ClassifiedPoint {
                    fixed_point: FixedPoint {
                        params_used: f(&p.fixed_point.params_used),
                        coordinates: p.fixed_point.coordinates,
                        residual_norm: p.fixed_point.residual_norm,
                        origin: p.fixed_point.origin,
                    },
                    jacobian: p.jacobian,
                    jacobian_source: p.jacobian_source,
                    classification: p.classification,
                })
                .collect(),
            status: self.status,
            seeds_tried: self.seeds_tried,
            best_failed_residual: self.best_failed_residual,
        }
    }
}

/// Locates and classifies every fixed point in `region`.
///
/// Explicit `seeds` force the numeric locator. Otherwise the system's own
/// closed-form equilibria are used when it has them, and the configured seed
/// grid when it does not.
pub fn analyze<S>(
    system: &S,
    params: &S::Params,
    region: &BoundingBox,
    seeds: Option<&[State]>,
    config: &AnalysisConfig,
) -> PlanarResult<Analysis<S::Params>>
where
    S: PlanarSystem,
    S::Params: Clone,
{
    region.validate()?;
    let tol = config.locator.dedup_tolerance;
    let set = match seeds {
        Some(seeds) => locate_numeric(system, params, region, seeds, &config.locator)?,
        None => match system.closed_form_fixed_points(params) {
            Some(points) => locate_known_points(system, params, &points, tol),
            None => {
                let seeds = config.locator.seed_grid.seeds(region);
                locate_numeric(system, params, region, &seeds, &config.locator)?
            }
        },
    };
    Ok(classify_set(system, params, set, config))
}

/// Closed-form mode with caller-supplied solution expressions.
pub fn analyze_with_solutions<S>(
    system: &S,
    params: &S::Params,
    solutions: &[ClosedFormSolution<S::Params>],
    config: &AnalysisConfig,
) -> Analysis<S::Params>
where
    S: PlanarSystem,
    S::Params: Clone,
{
    let set = locate_closed_form(system, params, solutions, config.locator.dedup_tolerance);
    classify_set(system, params, set, config)
}

fn classify_set<S: PlanarSystem>(
    system: &S,
    params: &S::Params,
    set: FixedPointSet<S::Params>,
    config: &AnalysisConfig,
) -> Analysis<S::Params> {
    let points = set
        .fixed_points
        .into_iter()
        .map(|fixed_point| {
            let (jacobian, jacobian_source) =
                jacobian_with_source(system, &fixed_point.coordinates, params);
            let classification = classify(&jacobian, &config.classifier);
            debug!(
                "fixed point ({}, {}) is {} (tau = {}, delta = {})",
                fixed_point.coordinates.x,
                fixed_point.coordinates.y,
                classification.class,
                classification.trace,
                classification.determinant
            );
            ClassifiedPoint {
                fixed_point,
                jacobian,
                jacobian_source,
                classification,
            }
        })
        .collect();
    Analysis {
        points,
        status: set.status,
        seeds_tried: set.seeds_tried,
        best_failed_residual: set.best_failed_residual,
    }
}

/// What to draw: the window, where orbits start and how long they run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortraitRequest {
    pub region: BoundingBox,
    pub initial_conditions: Vec<State>,
    /// When set, one extra orbit starts at each fixed point shifted by this offset.
    pub fixed_point_offset: Option<State>,
    pub t_span: (f64, f64),
    /// Uniform output times over `t_span`; every accepted step when `None`.
    pub t_eval_points: Option<usize>,
}

impl Default for PortraitRequest {
    fn default() -> Self {
        Self {
            region: BoundingBox::symmetric(5.0),
            initial_conditions: Vec::new(),
            fixed_point_offset: None,
            t_span: (0.0, 10.0),
            t_eval_points: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PhasePortrait<P> {
    pub region: BoundingBox,
    pub analysis: Analysis<P>,
    pub field: VectorFieldGrid,
    pub nullclines: NullclineSet,
    pub trajectories: Vec<Trajectory>,
}

impl<P> PhasePortrait<P> {
    pub fn map_params<Q>(self, f: impl FnMut(&P) -> Q) -> PhasePortrait<Q> {
        PhasePortrait {
            region: self.region,
            analysis: self.analysis.map_params(f),
            field: self.field,
            nullclines: self.nullclines,
            trajectories: self.trajectories,
        }
    }
}

/// Fixed points, field, nullclines and trajectories for one parameter set.
pub fn assemble_portrait<S>(
    system: &S,
    params: &S::Params,
    request: &PortraitRequest,
    config: &AnalysisConfig,
) -> PlanarResult<PhasePortrait<S::Params>>
where
    S: PlanarSystem,
    S::Params: Clone,
{
    let region = request.region;
    let analysis = analyze(system, params, &region, None, config)?;
    let field = sample_field(system, &region, config.field_resolution, params)?;
    let nullcline_set = nullclines(
        system,
        params,
        &region,
        config.nullcline_resolution,
        config.curve_samples,
    )?;

    let mut starts = request.initial_conditions.clone();
    if let Some(offset) = request.fixed_point_offset {
        let points: Vec<State> = analysis.fixed_points().copied().collect();
        starts.extend(perturbed_initial_conditions(&points, offset));
    }
    let t_eval = match request.t_eval_points {
        Some(0 | 1) => {
            return Err(PlanarError::InvalidInput(
                "t_eval_points must be at least 2".to_string(),
            ))
        }
        Some(n) => Some(linspace(request.t_span.0, request.t_span.1, n)),
        None => None,
    };
    let trajectories = integrate_many(
        system,
        params,
        &starts,
        request.t_span,
        t_eval.as_deref(),
        &config.integrator,
    )?;

    Ok(PhasePortrait {
        region,
        analysis,
        field,
        nullclines: nullcline_set,
        trajectories,
    })
}

//! Nullclines: the curves f = 0 and g = 0.
//!
//! Systems that know their nullclines in closed form hand them over directly.
//! Everything else is traced with marching squares over the sampled field.

use crate::error::PlanarResult;
use crate::field::{sample_field, VectorFieldGrid};
use crate::region::{linspace, BoundingBox, Resolution};
use crate::traits::{PlanarSystem, State};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum NullclineCurve {
    /// `x = const` across the region.
    Vertical { x: f64, y_min: f64, y_max: f64 },
    /// `y = const` across the region.
    Horizontal { y: f64, x_min: f64, x_max: f64 },
    /// One connected branch sampled along the curve.
    Polyline { points: Vec<State> },
    /// Unordered line segments; consecutive points pair up.
    Segments { points: Vec<State> },
}

impl NullclineCurve {
    pub fn is_empty(&self) -> bool {
        match self {
            NullclineCurve::Vertical { .. } | NullclineCurve::Horizontal { .. } => false,
            NullclineCurve::Polyline { points } | NullclineCurve::Segments { points } => {
                points.is_empty()
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NullclineSource {
    ClosedForm,
    ZeroCrossing,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NullclineSet {
    /// Curves where dx/dt = 0.
    pub dx_zero: Vec<NullclineCurve>,
    /// Curves where dy/dt = 0.
    pub dy_zero: Vec<NullclineCurve>,
    pub source: NullclineSource,
}

/// Closed-form nullclines when the system provides them, otherwise marching
/// squares on a field sampled at `resolution`.
pub fn nullclines<S: PlanarSystem>(
    system: &S,
    params: &S::Params,
    region: &BoundingBox,
    resolution: Resolution,
    curve_samples: usize,
) -> PlanarResult<NullclineSet> {
    region.validate()?;
    if let Some(set) = system.closed_form_nullclines(params, region, curve_samples.max(2)) {
        return Ok(set);
    }
    let field = sample_field(system, region, resolution, params)?;
    Ok(nullclines_from_field(&field))
}

pub fn nullclines_from_field(field: &VectorFieldGrid) -> NullclineSet {
    let dx_values: Vec<f64> = field.samples.iter().map(|s| s.dx).collect();
    let dy_values: Vec<f64> = field.samples.iter().map(|s| s.dy).collect();
    NullclineSet {
        dx_zero: vec![trace_zero_set(field, &dx_values)],
        dy_zero: vec![trace_zero_set(field, &dy_values)],
        source: NullclineSource::ZeroCrossing,
    }
}

/// Vertical line clipped to `region`; `None` when it misses the box.
pub fn vertical_line(x: f64, region: &BoundingBox) -> Option<NullclineCurve> {
    (x >= region.x_min && x <= region.x_max).then_some(NullclineCurve::Vertical {
        x,
        y_min: region.y_min,
        y_max: region.y_max,
    })
}

pub fn horizontal_line(y: f64, region: &BoundingBox) -> Option<NullclineCurve> {
    (y >= region.y_min && y <= region.y_max).then_some(NullclineCurve::Horizontal {
        y,
        x_min: region.x_min,
        x_max: region.x_max,
    })
}

/// Samples `y = curve(x)` for x in `[x_from, x_to]` ∩ region, splitting into a
/// new branch wherever the curve is undefined or leaves the region.
pub fn sample_graph(
    curve: impl Fn(f64) -> Option<f64>,
    x_from: f64,
    x_to: f64,
    samples: usize,
    region: &BoundingBox,
) -> Vec<NullclineCurve> {
    let lo = x_from.max(region.x_min);
    let hi = x_to.min(region.x_max);
    if !(hi > lo) {
        return Vec::new();
    }

    let mut branches = Vec::new();
    let mut current: Vec<State> = Vec::new();
    for x in linspace(lo, hi, samples) {
        match curve(x) {
            Some(y) if y.is_finite() && y >= region.y_min && y <= region.y_max => {
                current.push(State::new(x, y));
            }
            _ => {
                if current.len() > 1 {
                    branches.push(NullclineCurve::Polyline {
                        points: std::mem::take(&mut current),
                    });
                }
                current.clear();
            }
        }
    }
    if current.len() > 1 {
        branches.push(NullclineCurve::Polyline { points: current });
    }
    branches
}

fn trace_zero_set(field: &VectorFieldGrid, values: &[f64]) -> NullclineCurve {
    let nx = field.resolution.nx;
    let ny = field.resolution.ny;
    let index = |ix: usize, iy: usize| ix + iy * nx;
    let mut points = Vec::new();

    for iy in 0..ny.saturating_sub(1) {
        for ix in 0..nx.saturating_sub(1) {
            let corners = [
                field.samples[index(ix, iy)],
                field.samples[index(ix + 1, iy)],
                field.samples[index(ix + 1, iy + 1)],
                field.samples[index(ix, iy + 1)],
            ];
            let v = [
                values[index(ix, iy)],
                values[index(ix + 1, iy)],
                values[index(ix + 1, iy + 1)],
                values[index(ix, iy + 1)],
            ];
            if v.iter().any(|value| !value.is_finite()) {
                continue;
            }

            let mut case_index = 0u8;
            for (bit, value) in v.iter().enumerate() {
                if *value >= 0.0 {
                    case_index |= 1 << bit;
                }
            }
            for &(edge_a, edge_b) in cell_edge_pairs(case_index) {
                points.push(edge_crossing(edge_a, &corners, &v));
                points.push(edge_crossing(edge_b, &corners, &v));
            }
        }
    }

    NullclineCurve::Segments { points }
}

/// Edges crossed by the zero set for each corner sign pattern.
/// Corners run counter-clockwise from the lower left; edge k joins corner k and k+1.
fn cell_edge_pairs(case_index: u8) -> &'static [(usize, usize)] {
    match case_index {
        1 | 14 => &[(3, 0)],
        2 | 13 => &[(0, 1)],
        3 | 12 => &[(3, 1)],
        4 | 11 => &[(1, 2)],
        5 => &[(3, 2), (0, 1)],
        6 | 9 => &[(0, 2)],
        7 | 8 => &[(3, 2)],
        10 => &[(0, 3), (1, 2)],
        _ => &[],
    }
}

fn edge_crossing(
    edge: usize,
    corners: &[crate::field::FieldSample; 4],
    values: &[f64; 4],
) -> State {
    let a = edge;
    let b = (edge + 1) % 4;
    let t = crossing_fraction(values[a], values[b]);
    State::new(
        corners[a].x + (corners[b].x - corners[a].x) * t,
        corners[a].y + (corners[b].y - corners[a].y) * t,
    )
}

fn crossing_fraction(v0: f64, v1: f64) -> f64 {
    let denominator = v0 - v1;
    if denominator.abs() <= 1e-12 {
        0.5
    } else {
        (v0 / denominator).clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::{
        horizontal_line, nullclines, sample_graph, vertical_line, NullclineCurve, NullclineSource,
    };
    use crate::region::{BoundingBox, Resolution};
    use crate::system::FnSystem;
    use crate::traits::State;

    #[test]
    fn zero_crossings_trace_the_unit_circle() {
        let system =
            FnSystem::new(|s: &State, _: &()| State::new(s.x - s.y, s.x * s.x + s.y * s.y - 1.0));
        let set = nullclines(
            &system,
            &(),
            &BoundingBox::symmetric(2.0),
            Resolution::square(81),
            0,
        )
        .expect("nullclines should compute");
        assert_eq!(set.source, NullclineSource::ZeroCrossing);

        let NullclineCurve::Segments { points } = &set.dy_zero[0] else {
            panic!("expected segments, got {:?}", set.dy_zero[0]);
        };
        assert!(!points.is_empty());
        assert_eq!(points.len() % 2, 0);
        for p in points {
            assert!((p.norm() - 1.0).abs() < 2e-2, "point {p:?} is off the circle");
        }

        let NullclineCurve::Segments { points } = &set.dx_zero[0] else {
            panic!("expected segments");
        };
        for p in points {
            assert!((p.x - p.y).abs() < 1e-9, "point {p:?} is off the diagonal");
        }
    }

    #[test]
    fn lines_are_clipped_to_the_region() {
        let region = BoundingBox::new(-1.0, 1.0, -2.0, 2.0);
        assert!(vertical_line(0.0, &region).is_some());
        assert!(vertical_line(1.5, &region).is_none());
        assert!(horizontal_line(0.25, &region).is_some());
        assert!(horizontal_line(-3.0, &region).is_none());
    }

    #[test]
    fn graph_sampling_splits_at_singularities() {
        let region = BoundingBox::symmetric(5.0);
        let branches = sample_graph(
            |x| if x == 0.0 { None } else { Some(-3.0 / x) },
            f64::NEG_INFINITY,
            f64::INFINITY,
            401,
            &region,
        );
        assert_eq!(branches.len(), 2, "hyperbola has one branch per half-plane");
        for branch in &branches {
            let NullclineCurve::Polyline { points } = branch else {
                panic!("expected polyline");
            };
            let sign = points[0].x.signum();
            assert!(points.iter().all(|p| p.x.signum() == sign));
            assert!(points.iter().all(|p| (p.x * p.y + 3.0).abs() < 1e-9));
        }
    }
}

//! Built-in planar models with closed-form equilibria and nullclines.

use crate::equilibrium::ClosedFormSolution;
use crate::nullcline::{horizontal_line, sample_graph, vertical_line, NullclineSet, NullclineSource};
use crate::region::{linspace, BoundingBox};
use crate::traits::{Jacobian, PlanarSystem, State};
use serde::{Deserialize, Serialize};

/// Parameters of the magneto-plasma model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BvParams {
    /// Magnetic field dissipation rate.
    pub a: f64,
    /// Driving of the plasma flow.
    pub c: f64,
}

impl BvParams {
    pub fn new(a: f64, c: f64) -> Self {
        Self { a, c }
    }

    /// The off-axis pair (±√(c − a²/4), a/2) exists strictly above c = a²/4.
    pub fn has_off_axis_equilibria(&self) -> bool {
        self.c > off_axis_boundary(self.a)
    }
}

/// Boundary c = a²/4 in the (a, c) parameter plane.
pub fn off_axis_boundary(a: f64) -> f64 {
    a * a / 4.0
}

/// Sample `(a, c_boundary)` pairs along the regime boundary for `a` in `[a_min, a_max]`.
pub fn off_axis_boundary_curve(a_min: f64, a_max: f64, samples: usize) -> Vec<(f64, f64)> {
    linspace(a_min, a_max, samples)
        .into_iter()
        .map(|a| (a, off_axis_boundary(a)))
        .collect()
}

/// Magnetic field B coupled to a plasma velocity v:
///
/// dB/dt = −aB + 2Bv, dv/dt = c − B² − v².
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MagnetoPlasma;

impl MagnetoPlasma {
    /// The four closed-form branches, in order (0, √c), (0, −√c),
    /// (√(c − a²/4), a/2), (−√(c − a²/4), a/2).
    pub fn fixed_point_solutions() -> Vec<ClosedFormSolution<BvParams>> {
        vec![
            Box::new(|p: &BvParams| (p.c >= 0.0).then(|| State::new(0.0, p.c.sqrt()))),
            Box::new(|p: &BvParams| (p.c > 0.0).then(|| State::new(0.0, -p.c.sqrt()))),
            Box::new(|p: &BvParams| {
                p.has_off_axis_equilibria()
                    .then(|| State::new((p.c - off_axis_boundary(p.a)).sqrt(), p.a / 2.0))
            }),
            Box::new(|p: &BvParams| {
                p.has_off_axis_equilibria()
                    .then(|| State::new(-(p.c - off_axis_boundary(p.a)).sqrt(), p.a / 2.0))
            }),
        ]
    }
}

impl PlanarSystem for MagnetoPlasma {
    type Params = BvParams;

    fn evaluate(&self, state: &State, p: &BvParams) -> State {
        let (b, v) = (state.x, state.y);
        State::new(-p.a * b + 2.0 * b * v, p.c - b * b - v * v)
    }

    fn jacobian(&self, state: &State, p: &BvParams) -> Option<Jacobian> {
        let (b, v) = (state.x, state.y);
        Some(Jacobian::new(-p.a + 2.0 * v, 2.0 * b, -2.0 * b, -2.0 * v))
    }

    fn closed_form_fixed_points(&self, params: &BvParams) -> Option<Vec<State>> {
        Some(
            Self::fixed_point_solutions()
                .iter()
                .filter_map(|solution| solution(params))
                .collect(),
        )
    }

    fn closed_form_nullclines(
        &self,
        p: &BvParams,
        region: &BoundingBox,
        samples: usize,
    ) -> Option<NullclineSet> {
        let dx_zero = [vertical_line(0.0, region), horizontal_line(p.a / 2.0, region)]
            .into_iter()
            .flatten()
            .collect();

        let mut dy_zero = Vec::new();
        if p.c > 0.0 {
            let radius = p.c.sqrt();
            let upper = |b: f64| (b.abs() <= radius).then(|| (p.c - b * b).max(0.0).sqrt());
            let lower = |b: f64| upper(b).map(|v| -v);
            dy_zero.extend(sample_graph(upper, -radius, radius, samples, region));
            dy_zero.extend(sample_graph(lower, -radius, radius, samples, region));
        }

        Some(NullclineSet {
            dx_zero,
            dy_zero,
            source: NullclineSource::ClosedForm,
        })
    }
}

/// f = x² + xy − 2x, g = xy² + 3y.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QuadraticPlanar;

impl QuadraticPlanar {
    pub const FIXED_POINTS: [(f64, f64); 4] = [(0.0, 0.0), (2.0, 0.0), (3.0, -1.0), (-1.0, 3.0)];
}

impl PlanarSystem for QuadraticPlanar {
    type Params = ();

    fn evaluate(&self, s: &State, _: &()) -> State {
        State::new(
            s.x * s.x + s.x * s.y - 2.0 * s.x,
            s.x * s.y * s.y + 3.0 * s.y,
        )
    }

    fn jacobian(&self, s: &State, _: &()) -> Option<Jacobian> {
        Some(Jacobian::new(
            2.0 * s.x + s.y - 2.0,
            s.x,
            s.y * s.y,
            2.0 * s.x * s.y + 3.0,
        ))
    }

    fn closed_form_fixed_points(&self, _: &()) -> Option<Vec<State>> {
        Some(
            Self::FIXED_POINTS
                .iter()
                .map(|&(x, y)| State::new(x, y))
                .collect(),
        )
    }

    fn closed_form_nullclines(
        &self,
        _: &(),
        region: &BoundingBox,
        samples: usize,
    ) -> Option<NullclineSet> {
        let mut dx_zero: Vec<_> = vertical_line(0.0, region).into_iter().collect();
        dx_zero.extend(sample_graph(
            |x| Some(2.0 - x),
            region.x_min,
            region.x_max,
            samples,
            region,
        ));

        let mut dy_zero: Vec<_> = horizontal_line(0.0, region).into_iter().collect();
        // xy = −3 is undefined on x = 0; each half-plane is its own branch.
        let hyperbola = |x: f64| (x != 0.0).then(|| -3.0 / x);
        dy_zero.extend(sample_graph(hyperbola, region.x_min, -f64::EPSILON, samples, region));
        dy_zero.extend(sample_graph(hyperbola, f64::EPSILON, region.x_max, samples, region));

        Some(NullclineSet {
            dx_zero,
            dy_zero,
            source: NullclineSource::ClosedForm,
        })
    }
}

//! Vector-field sampling over a regular grid, for quiver and streamline plots.

use crate::error::{PlanarError, PlanarResult};
use crate::region::{BoundingBox, Grid, Resolution};
use crate::traits::PlanarSystem;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FieldSample {
    pub x: f64,
    pub y: f64,
    pub dx: f64,
    pub dy: f64,
}

impl FieldSample {
    pub fn speed(&self) -> f64 {
        self.dx.hypot(self.dy)
    }
}

/// Raw `(x, y, dx, dy)` samples, row-major with x varying fastest.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VectorFieldGrid {
    pub bbox: BoundingBox,
    pub resolution: Resolution,
    pub samples: Vec<FieldSample>,
}

/// Unit direction per grid point with the raw magnitude kept alongside.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DirectionSample {
    pub x: f64,
    pub y: f64,
    pub ux: f64,
    pub uy: f64,
    pub magnitude: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedField {
    pub bbox: BoundingBox,
    pub resolution: Resolution,
    pub samples: Vec<DirectionSample>,
}

pub fn sample_field<S: PlanarSystem>(
    system: &S,
    bbox: &BoundingBox,
    resolution: Resolution,
    params: &S::Params,
) -> PlanarResult<VectorFieldGrid> {
    let grid = Grid::new(*bbox, resolution)?;
    let samples = grid
        .points()
        .map(|point| {
            let d = system.evaluate(&point, params);
            FieldSample {
                x: point.x,
                y: point.y,
                dx: d.x,
                dy: d.y,
            }
        })
        .collect();
    Ok(VectorFieldGrid {
        bbox: *bbox,
        resolution,
        samples,
    })
}

impl VectorFieldGrid {
    pub fn get(&self, ix: usize, iy: usize) -> Option<&FieldSample> {
        if ix >= self.resolution.nx || iy >= self.resolution.ny {
            return None;
        }
        self.samples.get(ix + iy * self.resolution.nx)
    }

    /// Raw magnitudes, for speed colouring.
    pub fn speeds(&self) -> Vec<f64> {
        self.samples.iter().map(FieldSample::speed).collect()
    }

    /// Zero or non-finite magnitudes are divided by 1 instead, so those points
    /// carry a zero direction rather than NaN.
    pub fn normalized(&self) -> NormalizedField {
        let samples = self
            .samples
            .iter()
            .map(|s| {
                let magnitude = s.speed();
                let (ux, uy) = if magnitude.is_finite() && magnitude > 0.0 {
                    (s.dx / magnitude, s.dy / magnitude)
                } else {
                    (0.0, 0.0)
                };
                DirectionSample {
                    x: s.x,
                    y: s.y,
                    ux,
                    uy,
                    magnitude,
                }
            })
            .collect();
        NormalizedField {
            bbox: self.bbox,
            resolution: self.resolution,
            samples,
        }
    }

    /// Keeps every `stride`-th sample along both axes, starting at index 0.
    pub fn subsample(&self, stride: usize) -> PlanarResult<VectorFieldGrid> {
        if stride == 0 {
            return Err(PlanarError::InvalidInput(
                "subsample stride must be at least 1".to_string(),
            ));
        }
        let Resolution { nx, ny } = self.resolution;
        let kept_x: Vec<usize> = (0..nx).step_by(stride).collect();
        let kept_y: Vec<usize> = (0..ny).step_by(stride).collect();
        let mut samples = Vec::with_capacity(kept_x.len() * kept_y.len());
        for &iy in &kept_y {
            for &ix in &kept_x {
                samples.push(self.samples[ix + iy * nx]);
            }
        }
        let last_x = kept_x.last().map_or(0, |&i| i);
        let last_y = kept_y.last().map_or(0, |&i| i);
        Ok(VectorFieldGrid {
            bbox: BoundingBox::new(
                self.bbox.x_min,
                self.samples[last_x].x,
                self.bbox.y_min,
                self.samples[last_y * nx].y,
            ),
            resolution: Resolution::new(kept_x.len(), kept_y.len()),
            samples,
        })
    }
}

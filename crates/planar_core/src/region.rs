//! Rectangular regions of the phase plane and regular grids over them.

use crate::error::{PlanarError, PlanarResult};
use crate::traits::State;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x_min: f64,
    pub x_max: f64,
    pub y_min: f64,
    pub y_max: f64,
}

impl BoundingBox {
    pub fn new(x_min: f64, x_max: f64, y_min: f64, y_max: f64) -> Self {
        Self {
            x_min,
            x_max,
            y_min,
            y_max,
        }
    }

    /// Square box `[-half, half]²`.
    pub fn symmetric(half: f64) -> Self {
        Self::new(-half, half, -half, half)
    }

    /// Rejects boxes with zero, negative or non-finite extent.
    pub fn validate(&self) -> PlanarResult<()> {
        let bounds = [self.x_min, self.x_max, self.y_min, self.y_max];
        if bounds.iter().any(|v| !v.is_finite()) {
            return Err(PlanarError::InvalidRegion(
                "bounding box limits must be finite".to_string(),
            ));
        }
        if self.x_max <= self.x_min {
            return Err(PlanarError::InvalidRegion(format!(
                "x extent must be positive (x_min = {}, x_max = {})",
                self.x_min, self.x_max
            )));
        }
        if self.y_max <= self.y_min {
            return Err(PlanarError::InvalidRegion(format!(
                "y extent must be positive (y_min = {}, y_max = {})",
                self.y_min, self.y_max
            )));
        }
        Ok(())
    }

    /// Inclusive containment test with an absolute slack on every side.
    pub fn contains_with_margin(&self, point: &State, margin: f64) -> bool {
        point.x >= self.x_min - margin
            && point.x <= self.x_max + margin
            && point.y >= self.y_min - margin
            && point.y <= self.y_max + margin
    }
}

/// Number of samples per axis, endpoints included.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub nx: usize,
    pub ny: usize,
}

impl Resolution {
    pub fn new(nx: usize, ny: usize) -> Self {
        Self { nx, ny }
    }

    pub fn square(n: usize) -> Self {
        Self::new(n, n)
    }

    pub fn validate(&self) -> PlanarResult<()> {
        if self.nx < 2 || self.ny < 2 {
            return Err(PlanarError::InvalidRegion(format!(
                "grid needs at least 2 samples per axis, got {}x{}",
                self.nx, self.ny
            )));
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.nx * self.ny
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// `n` evenly spaced values from `min` to `max` inclusive.
pub fn linspace(min: f64, max: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![min],
        _ => {
            let step = (max - min) / (n - 1) as f64;
            (0..n)
                .map(|i| if i == n - 1 { max } else { min + step * i as f64 })
                .collect()
        }
    }
}

/// Validated box + resolution, iterated row by row with x varying fastest.
#[derive(Debug, Clone, PartialEq)]
pub struct Grid {
    pub bbox: BoundingBox,
    pub resolution: Resolution,
    pub xs: Vec<f64>,
    pub ys: Vec<f64>,
}

impl Grid {
    pub fn new(bbox: BoundingBox, resolution: Resolution) -> PlanarResult<Self> {
        bbox.validate()?;
        resolution.validate()?;
        Ok(Self {
            xs: linspace(bbox.x_min, bbox.x_max, resolution.nx),
            ys: linspace(bbox.y_min, bbox.y_max, resolution.ny),
            bbox,
            resolution,
        })
    }

    pub fn index(&self, ix: usize, iy: usize) -> usize {
        ix + iy * self.resolution.nx
    }

    pub fn points(&self) -> impl Iterator<Item = State> + '_ {
        self.ys
            .iter()
            .flat_map(move |&y| self.xs.iter().map(move |&x| State::new(x, y)))
    }
}

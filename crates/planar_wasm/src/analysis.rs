//! Analysis, integration, field and portrait bindings.

use crate::model::{pairs_to_states, to_js_error, WasmPlanarModel};
use anyhow::{bail, Result};
use planar_core::field::VectorFieldGrid;
use planar_core::integrator::{Trajectory, TrajectorySample};
use planar_core::nullcline::NullclineSet;
use planar_core::portrait::{Analysis, PhasePortrait, PortraitRequest};
use planar_core::region::{BoundingBox, Resolution};
use planar_core::traits::State;
use serde::{Deserialize, Serialize};
use serde_wasm_bindgen::to_value;
use wasm_bindgen::prelude::*;

impl WasmPlanarModel {
    pub fn run_analysis(&self, seeds: Option<&[f64]>) -> Result<Analysis<Vec<f64>>> {
        let seeds = seeds.map(pairs_to_states).transpose()?;
        Ok(self
            .model
            .analyze(&self.region, seeds.as_deref(), &self.config)?)
    }

    pub fn run_integration(
        &self,
        x0: f64,
        y0: f64,
        t0: f64,
        t1: f64,
        t_eval: Option<&[f64]>,
    ) -> Result<Trajectory> {
        Ok(self.model.integrate(
            State::new(x0, y0),
            (t0, t1),
            t_eval,
            &self.config.integrator,
        )?)
    }

    /// Field over the model's region; `stride > 1` thins it for quiver plots.
    pub fn run_field(&self, nx: usize, ny: usize, stride: usize) -> Result<VectorFieldGrid> {
        let grid = self
            .model
            .sample_field(&self.region, Resolution::new(nx, ny))?;
        if stride > 1 {
            return Ok(grid.subsample(stride)?);
        }
        Ok(grid)
    }

    pub fn run_nullclines(&self) -> Result<NullclineSet> {
        Ok(self.model.nullclines(
            &self.region,
            self.config.nullcline_resolution,
            self.config.curve_samples,
        )?)
    }

    pub fn run_portrait(&self, request: &PortraitRequest) -> Result<PhasePortrait<Vec<f64>>> {
        if request.initial_conditions.len() > 10_000 {
            bail!("Too many initial conditions ({})", request.initial_conditions.len());
        }
        Ok(self.model.portrait(request, &self.config)?)
    }
}

/// A portrait request as sent from JS. A missing `region` means the model's own.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct PortraitOptions {
    #[serde(default)]
    region: Option<BoundingBox>,
    #[serde(flatten)]
    rest: PortraitRequest,
}

impl PortraitOptions {
    pub(crate) fn into_request(self, model_region: BoundingBox) -> PortraitRequest {
        PortraitRequest {
            region: self.region.unwrap_or(model_region),
            ..self.rest
        }
    }
}

/// `[t0, x0, y0, t1, x1, y1, ...]` for typed-array plotting.
pub(crate) fn interleave_samples(samples: &[TrajectorySample]) -> Vec<f64> {
    samples.iter().flat_map(|s| [s.t, s.x, s.y]).collect()
}

fn serialize<T: Serialize>(value: &T, what: &str) -> Result<JsValue, JsValue> {
    to_value(value).map_err(|e| JsValue::from_str(&format!("Failed to serialize {what}: {e}")))
}

#[wasm_bindgen]
impl WasmPlanarModel {
    /// Fixed points with classifications. `seeds` is an interleaved
    /// `[x0, y0, x1, y1, ...]` list that forces the numeric locator.
    pub fn analyze(&self, seeds: Option<Vec<f64>>) -> Result<JsValue, JsValue> {
        let analysis = self
            .run_analysis(seeds.as_deref())
            .map_err(|e| to_js_error(&e))?;
        serialize(&analysis, "analysis")
    }

    pub fn integrate(
        &self,
        x0: f64,
        y0: f64,
        t0: f64,
        t1: f64,
        t_eval: Option<Vec<f64>>,
    ) -> Result<JsValue, JsValue> {
        let trajectory = self
            .run_integration(x0, y0, t0, t1, t_eval.as_deref())
            .map_err(|e| to_js_error(&e))?;
        serialize(&trajectory, "trajectory")
    }

    /// Same integration as `integrate`, returning only the interleaved samples.
    pub fn integrate_flat(
        &self,
        x0: f64,
        y0: f64,
        t0: f64,
        t1: f64,
        t_eval: Option<Vec<f64>>,
    ) -> Result<js_sys::Float64Array, JsValue> {
        let trajectory = self
            .run_integration(x0, y0, t0, t1, t_eval.as_deref())
            .map_err(|e| to_js_error(&e))?;
        Ok(js_sys::Float64Array::from(
            interleave_samples(&trajectory.samples).as_slice(),
        ))
    }

    pub fn sample_field(&self, nx: u32, ny: u32, stride: u32) -> Result<JsValue, JsValue> {
        let grid = self
            .run_field(nx as usize, ny as usize, stride as usize)
            .map_err(|e| to_js_error(&e))?;
        serialize(&grid, "vector field")
    }

    /// Unit directions with magnitudes, for arrow plots coloured by speed.
    pub fn sample_directions(&self, nx: u32, ny: u32, stride: u32) -> Result<JsValue, JsValue> {
        let grid = self
            .run_field(nx as usize, ny as usize, stride as usize)
            .map_err(|e| to_js_error(&e))?;
        serialize(&grid.normalized(), "direction field")
    }

    pub fn nullclines(&self) -> Result<JsValue, JsValue> {
        let set = self.run_nullclines().map_err(|e| to_js_error(&e))?;
        serialize(&set, "nullclines")
    }

    pub fn portrait(&self, request: JsValue) -> Result<JsValue, JsValue> {
        let options: PortraitOptions = if request.is_undefined() || request.is_null() {
            PortraitOptions::default()
        } else {
            serde_wasm_bindgen::from_value(request)
                .map_err(|e| JsValue::from_str(&format!("Invalid portrait request: {e}")))?
        };
        let request = options.into_request(self.region);
        let portrait = self.run_portrait(&request).map_err(|e| to_js_error(&e))?;
        serialize(&portrait, "portrait")
    }
}


#[cfg(all(test, target_arch = "wasm32"))]
mod wasm_tests {
    use crate::model::WasmPlanarModel;
    use planar_core::config::{ModelConfig, PlanarConfig};
    use planar_core::portrait::PortraitRequest;
    use planar_core::region::BoundingBox;
    use serde_wasm_bindgen::to_value;
    use wasm_bindgen_test::wasm_bindgen_test;

    fn config_value(model: ModelConfig) -> wasm_bindgen::JsValue {
        let config = PlanarConfig {
            model,
            region: BoundingBox::symmetric(5.0),
            analysis: Default::default(),
        };
        to_value(&config).expect("config")
    }

    #[wasm_bindgen_test]
    fn constructor_reports_compile_errors() {
        let result = WasmPlanarModel::new(config_value(ModelConfig::Expression {
            equations: vec!["x + q".to_string(), "y".to_string()],
            var_names: vec!["x".to_string(), "y".to_string()],
            param_names: Vec::new(),
            params: Vec::new(),
        }));
        let message = result
            .err()
            .and_then(|err| err.as_string())
            .unwrap_or_default();
        assert!(message.contains("Unknown variable or parameter: q"), "{message}");
    }

    #[wasm_bindgen_test]
    fn odd_seed_lists_are_rejected() {
        let model =
            WasmPlanarModel::new(config_value(ModelConfig::QuadraticPlanar)).expect("model");
        let message = model
            .analyze(Some(vec![1.0, 2.0, 3.0]))
            .err()
            .and_then(|err| err.as_string())
            .unwrap_or_default();
        assert!(message.contains("x, y pairs"));
    }

    #[wasm_bindgen_test]
    fn portrait_and_flat_trajectories_serialize() {
        let model =
            WasmPlanarModel::new(config_value(ModelConfig::QuadraticPlanar)).expect("model");
        let request = PortraitRequest {
            initial_conditions: vec![planar_core::traits::State::new(-1.1, 3.0)],
            t_span: (0.0, 1.0),
            ..PortraitRequest::default()
        };
        let portrait = model.portrait(to_value(&request).expect("request"));
        assert!(portrait.is_ok());
        assert!(model.portrait(wasm_bindgen::JsValue::UNDEFINED).is_ok());

        let flat = model
            .integrate_flat(-1.1, 3.0, 0.0, 1.0, Some(vec![0.0, 0.5, 1.0]))
            .expect("flat trajectory");
        assert_eq!(flat.length(), 9);
    }
}

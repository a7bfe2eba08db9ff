//! Model construction and pointwise evaluation.

use anyhow::{bail, Context, Result};
use planar_core::config::{AnalysisConfig, ConfiguredModel, PlanarConfig};
use planar_core::region::BoundingBox;
use planar_core::traits::State;
use wasm_bindgen::prelude::*;

#[wasm_bindgen]
pub struct WasmPlanarModel {
    pub(crate) model: ConfiguredModel,
    pub(crate) region: BoundingBox,
    pub(crate) config: AnalysisConfig,
}

impl WasmPlanarModel {
    pub fn from_config(config: PlanarConfig) -> Result<Self> {
        config.region.validate().context("Invalid analysis region")?;
        let model = config.model.build().context("Failed to build model")?;
        Ok(Self {
            model,
            region: config.region,
            config: config.analysis,
        })
    }
}

#[wasm_bindgen]
impl WasmPlanarModel {
    #[wasm_bindgen(constructor)]
    pub fn new(config: JsValue) -> Result<WasmPlanarModel, JsValue> {
        #[cfg(target_arch = "wasm32")]
        console_error_panic_hook::set_once();

        let config: PlanarConfig = serde_wasm_bindgen::from_value(config)
            .map_err(|e| JsValue::from_str(&format!("Invalid config: {e}")))?;
        WasmPlanarModel::from_config(config).map_err(|e| to_js_error(&e))
    }

    pub fn model_name(&self) -> String {
        self.model.name().to_string()
    }

    pub fn params(&self) -> Vec<f64> {
        self.model.params_vec()
    }

    /// `[dx/dt, dy/dt]` at `(x, y)`.
    pub fn evaluate_at(&self, x: f64, y: f64) -> Vec<f64> {
        let d = self.model.evaluate(&State::new(x, y));
        vec![d.x, d.y]
    }

    /// Row-major `[∂f/∂x, ∂f/∂y, ∂g/∂x, ∂g/∂y]` at `(x, y)`.
    pub fn jacobian_at(&self, x: f64, y: f64) -> Vec<f64> {
        let (j, _) = self.model.jacobian(&State::new(x, y));
        vec![j[(0, 0)], j[(0, 1)], j[(1, 0)], j[(1, 1)]]
    }
}

/// Interleaved `[x0, y0, x1, y1, ...]` into states.
pub(crate) fn pairs_to_states(flat: &[f64]) -> Result<Vec<State>> {
    if flat.len() % 2 != 0 {
        bail!(
            "Point list must hold x, y pairs (got {} values)",
            flat.len()
        );
    }
    Ok(flat
        .chunks_exact(2)
        .map(|pair| State::new(pair[0], pair[1]))
        .collect())
}

pub(crate) fn to_js_error(err: &anyhow::Error) -> JsValue {
    JsValue::from_str(&format!("{err:#}"))
}

#[cfg(test)]
mod tests {
    use super::{pairs_to_states, WasmPlanarModel};
    use planar_core::config::{AnalysisConfig, ModelConfig, PlanarConfig};
    use planar_core::region::BoundingBox;
    use planar_core::traits::State;

    fn bv_model() -> WasmPlanarModel {
        WasmPlanarModel::from_config(PlanarConfig {
            model: ModelConfig::MagnetoPlasma { a: 0.5, c: 1.5 },
            region: BoundingBox::symmetric(3.0),
            analysis: AnalysisConfig::default(),
        })
        .expect("model should build")
    }

    #[test]
    fn evaluate_and_jacobian_are_row_major() {
        let model = bv_model();
        assert_eq!(model.model_name(), "magneto_plasma");
        assert_eq!(model.params(), vec![0.5, 1.5]);
        // dB/dt = −aB + 2Bv, dv/dt = c − B² − v² at (1, 2).
        assert_eq!(model.evaluate_at(1.0, 2.0), vec![3.5, -3.5]);
        // [[−a + 2v, 2B], [−2B, −2v]].
        assert_eq!(model.jacobian_at(1.0, 2.0), vec![3.5, 2.0, -2.0, -4.0]);
    }

    #[test]
    fn expression_models_build_from_config() {
        let model = WasmPlanarModel::from_config(PlanarConfig {
            model: ModelConfig::Expression {
                equations: vec!["a * x".to_string(), "b * y".to_string()],
                var_names: vec!["x".to_string(), "y".to_string()],
                param_names: vec!["a".to_string(), "b".to_string()],
                params: vec![2.0, 3.0],
            },
            region: BoundingBox::symmetric(1.0),
            analysis: AnalysisConfig::default(),
        })
        .expect("model should build");
        let jacobian = model.jacobian_at(1.0, 1.0);
        let expected = [2.0, 0.0, 0.0, 3.0];
        for (got, want) in jacobian.iter().zip(expected) {
            assert!((got - want).abs() < 1e-8, "{jacobian:?}");
        }
    }

    #[test]
    fn invalid_configs_are_reported_with_context() {
        let err = WasmPlanarModel::from_config(PlanarConfig {
            model: ModelConfig::QuadraticPlanar,
            region: BoundingBox::new(1.0, 1.0, 0.0, 1.0),
            analysis: AnalysisConfig::default(),
        })
        .err()
        .expect("zero-width region");
        assert!(format!("{err:#}").contains("Invalid analysis region"));

        let err = WasmPlanarModel::from_config(PlanarConfig {
            model: ModelConfig::Expression {
                equations: vec!["x +".to_string(), "y".to_string()],
                var_names: vec!["x".to_string(), "y".to_string()],
                param_names: Vec::new(),
                params: Vec::new(),
            },
            region: BoundingBox::symmetric(1.0),
            analysis: AnalysisConfig::default(),
        })
        .err()
        .expect("truncated equation");
        assert!(format!("{err:#}").contains("Failed to build model"));
    }

    #[test]
    fn point_lists_must_pair_up() {
        let states = pairs_to_states(&[1.0, 2.0, 3.0, 4.0]).expect("two points");
        assert_eq!(states, vec![State::new(1.0, 2.0), State::new(3.0, 4.0)]);
        let err = pairs_to_states(&[1.0, 2.0, 3.0]).expect_err("odd length");
        assert!(err.to_string().contains("x, y pairs"));
    }
}

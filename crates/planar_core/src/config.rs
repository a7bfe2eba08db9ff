//! Serde-facing settings and model selection.
//!
//! [`ModelConfig`] names one of the built-in systems or a user expression
//! system; [`ConfiguredModel`] is the compiled form and runs every analysis
//! with its parameters erased to a plain `Vec<f64>`.

use crate::equation_engine::ExpressionSystem;
use crate::equilibrium::LocatorSettings;
use crate::error::{PlanarError, PlanarResult};
use crate::field::{sample_field, VectorFieldGrid};
use crate::integrator::{integrate, IntegratorSettings, Trajectory};
use crate::jacobian::{jacobian_with_source, JacobianSource};
use crate::models::{BvParams, MagnetoPlasma, QuadraticPlanar};
use crate::nullcline::{nullclines, NullclineSet};
use crate::portrait::{analyze, assemble_portrait, Analysis, PhasePortrait, PortraitRequest};
use crate::region::{BoundingBox, Resolution};
use crate::stability::ClassifierSettings;
use crate::traits::{Jacobian, PlanarSystem, State};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub locator: LocatorSettings,
    pub classifier: ClassifierSettings,
    pub integrator: IntegratorSettings,
    /// Quiver grid.
    pub field_resolution: Resolution,
    /// Grid for zero-crossing nullclines when no closed form is available.
    pub nullcline_resolution: Resolution,
    /// Points per closed-form nullcline branch.
    pub curve_samples: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            locator: LocatorSettings::default(),
            classifier: ClassifierSettings::default(),
            integrator: IntegratorSettings::default(),
            field_resolution: Resolution::square(21),
            nullcline_resolution: Resolution::square(101),
            curve_samples: 400,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ModelConfig {
    MagnetoPlasma {
        a: f64,
        c: f64,
    },
    QuadraticPlanar,
    Expression {
        equations: Vec<String>,
        var_names: Vec<String>,
        #[serde(default)]
        param_names: Vec<String>,
        #[serde(default)]
        params: Vec<f64>,
    },
}

impl ModelConfig {
    pub fn build(&self) -> PlanarResult<ConfiguredModel> {
        match self {
            ModelConfig::MagnetoPlasma { a, c } => {
                if !a.is_finite() || !c.is_finite() {
                    return Err(PlanarError::InvalidInput(
                        "magneto_plasma parameters must be finite".to_string(),
                    ));
                }
                Ok(ConfiguredModel::MagnetoPlasma(BvParams::new(*a, *c)))
            }
            ModelConfig::QuadraticPlanar => Ok(ConfiguredModel::QuadraticPlanar),
            ModelConfig::Expression {
                equations,
                var_names,
                param_names,
                params,
            } => {
                let system = ExpressionSystem::compile(
                    equations.as_slice(),
                    var_names.as_slice(),
                    param_names.as_slice(),
                )
                .and_then(|system| system.check_params(params).map(|()| system))
                .map_err(|err| PlanarError::InvalidInput(format!("{err:#}")))?;
                Ok(ConfiguredModel::Expression {
                    system,
                    params: params.clone(),
                })
            }
        }
    }
}

/// Top-level document: which model, where to look and how.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanarConfig {
    pub model: ModelConfig,
    #[serde(default = "default_region")]
    pub region: BoundingBox,
    #[serde(default)]
    pub analysis: AnalysisConfig,
}

fn default_region() -> BoundingBox {
    BoundingBox::symmetric(5.0)
}

#[derive(Debug, Clone)]
pub enum ConfiguredModel {
    MagnetoPlasma(BvParams),
    QuadraticPlanar,
    Expression {
        system: ExpressionSystem,
        params: Vec<f64>,
    },
}

macro_rules! with_system {
    ($model:expr, |$system:ident, $params:ident| $body:expr) => {
        match $model {
            ConfiguredModel::MagnetoPlasma(p) => {
                let $system = &MagnetoPlasma;
                let $params = p;
                $body
            }
            ConfiguredModel::QuadraticPlanar => {
                let $system = &QuadraticPlanar;
                let $params = &();
                $body
            }
            ConfiguredModel::Expression { system, params } => {
                let $system = system;
                let $params = params;
                $body
            }
        }
    };
}

impl ConfiguredModel {
    pub fn name(&self) -> &'static str {
        match self {
            ConfiguredModel::MagnetoPlasma(_) => "magneto_plasma",
            ConfiguredModel::QuadraticPlanar => "quadratic_planar",
            ConfiguredModel::Expression { .. } => "expression",
        }
    }

    /// Parameters in declaration order (`[a, c]` for the magneto-plasma model).
    pub fn params_vec(&self) -> Vec<f64> {
        match self {
            ConfiguredModel::MagnetoPlasma(p) => vec![p.a, p.c],
            ConfiguredModel::QuadraticPlanar => Vec::new(),
            ConfiguredModel::Expression { params, .. } => params.clone(),
        }
    }

    pub fn evaluate(&self, state: &State) -> State {
        with_system!(self, |system, params| system.evaluate(state, params))
    }

    pub fn jacobian(&self, state: &State) -> (Jacobian, JacobianSource) {
        with_system!(self, |system, params| jacobian_with_source(system, state, params))
    }

    pub fn analyze(
        &self,
        region: &BoundingBox,
        seeds: Option<&[State]>,
        config: &AnalysisConfig,
    ) -> PlanarResult<Analysis<Vec<f64>>> {
        let erased = self.params_vec();
        with_system!(self, |system, params| {
            Ok(analyze(system, params, region, seeds, config)?.map_params(|_| erased.clone()))
        })
    }

    pub fn integrate(
        &self,
        initial: State,
        t_span: (f64, f64),
        t_eval: Option<&[f64]>,
        settings: &IntegratorSettings,
    ) -> PlanarResult<Trajectory> {
        with_system!(self, |system, params| integrate(
            system, params, initial, t_span, t_eval, settings
        ))
    }

    pub fn sample_field(
        &self,
        bbox: &BoundingBox,
        resolution: Resolution,
    ) -> PlanarResult<VectorFieldGrid> {
        with_system!(self, |system, params| sample_field(
            system, bbox, resolution, params
        ))
    }

    pub fn nullclines(
        &self,
        region: &BoundingBox,
        resolution: Resolution,
        curve_samples: usize,
    ) -> PlanarResult<NullclineSet> {
        with_system!(self, |system, params| nullclines(
            system,
            params,
            region,
            resolution,
            curve_samples
        ))
    }

    pub fn portrait(
        &self,
        request: &PortraitRequest,
        config: &AnalysisConfig,
    ) -> PlanarResult<PhasePortrait<Vec<f64>>> {
        let erased = self.params_vec();
        with_system!(self, |system, params| {
            Ok(assemble_portrait(system, params, request, config)?.map_params(|_| erased.clone()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{AnalysisConfig, ConfiguredModel, ModelConfig, PlanarConfig};
    use crate::error::PlanarError;
    use crate::integrator::Method;
    use crate::jacobian::JacobianSource;
    use crate::region::{BoundingBox, Resolution};
    use crate::stability::StabilityClass;
    use crate::traits::State;

    #[test]
    fn config_documents_fill_in_defaults() {
        let config: PlanarConfig = serde_json::from_str(
            r#"{
                "model": { "type": "magneto_plasma", "a": 0.5, "c": 1.5 },
                "analysis": {
                    "integrator": { "method": { "method": "rk4", "step": 0.01 } },
                    "field_resolution": { "nx": 31, "ny": 31 }
                }
            }"#,
        )
        .expect("config should parse");
        assert_eq!(config.model, ModelConfig::MagnetoPlasma { a: 0.5, c: 1.5 });
        assert_eq!(config.region, BoundingBox::symmetric(5.0));
        assert_eq!(config.analysis.integrator.method, Method::Rk4 { step: 0.01 });
        assert_eq!(config.analysis.integrator.rtol, 1e-6);
        assert_eq!(config.analysis.field_resolution, Resolution::square(31));
        assert_eq!(config.analysis.curve_samples, 400);
        assert_eq!(config.analysis.locator.newton.max_steps, 25);
        assert_eq!(config.analysis.classifier.tolerance, 1e-9);
    }

    #[test]
    fn built_in_models_dispatch_with_erased_params() {
        let model = ModelConfig::MagnetoPlasma { a: 0.5, c: 1.5 }
            .build()
            .expect("model should build");
        assert_eq!(model.name(), "magneto_plasma");
        assert_eq!(model.params_vec(), vec![0.5, 1.5]);
        let analysis = model
            .analyze(&BoundingBox::symmetric(3.0), None, &AnalysisConfig::default())
            .expect("analysis");
        assert_eq!(analysis.points.len(), 4);
        assert!(analysis
            .points
            .iter()
            .all(|p| p.fixed_point.params_used == vec![0.5, 1.5]));
        let (_, source) = model.jacobian(&State::new(1.0, 1.0));
        assert_eq!(source, JacobianSource::ClosedForm);
    }

    #[test]
    fn expression_models_compile_and_match_the_quadratic_system() {
        let config: ModelConfig = serde_json::from_str(
            r#"{
                "type": "expression",
                "equations": ["x^2 + x*y - 2*x", "x*y^2 + k*y"],
                "var_names": ["x", "y"],
                "param_names": ["k"],
                "params": [3.0]
            }"#,
        )
        .expect("model config should parse");
        let expression = config.build().expect("expression should compile");
        let quadratic = ModelConfig::QuadraticPlanar.build().expect("built in");
        for &(x, y) in &[(0.5, 0.5), (-1.0, 2.0), (3.0, -1.0)] {
            let s = State::new(x, y);
            assert!((expression.evaluate(&s) - quadratic.evaluate(&s)).amax() < 1e-12);
        }
        let (_, source) = expression.jacobian(&State::new(1.0, 1.0));
        assert_eq!(source, JacobianSource::FiniteDifference);

        let analysis = expression
            .analyze(&BoundingBox::symmetric(5.0), None, &AnalysisConfig::default())
            .expect("numeric analysis");
        assert_eq!(analysis.points.len(), 4);
        let at_two = analysis
            .points
            .iter()
            .find(|p| (p.fixed_point.coordinates - State::new(2.0, 0.0)).amax() < 1e-6)
            .expect("(2, 0)");
        assert_eq!(at_two.classification.class, StabilityClass::UnstableNode);
    }

    #[test]
    fn bad_models_surface_as_invalid_input() {
        let err = ModelConfig::Expression {
            equations: vec!["x + q".to_string(), "y".to_string()],
            var_names: vec!["x".to_string(), "y".to_string()],
            param_names: Vec::new(),
            params: Vec::new(),
        }
        .build()
        .expect_err("unknown symbol");
        let PlanarError::InvalidInput(message) = err else {
            panic!("expected invalid input, got {err:?}");
        };
        assert!(message.contains("Unknown variable or parameter: q"), "{message}");

        let err = ModelConfig::Expression {
            equations: vec!["k * x".to_string(), "y".to_string()],
            var_names: vec!["x".to_string(), "y".to_string()],
            param_names: vec!["k".to_string()],
            params: Vec::new(),
        }
        .build()
        .expect_err("missing parameter value");
        assert!(err.to_string().contains("Expected 1 parameter value(s)"));

        assert!(ModelConfig::MagnetoPlasma { a: f64::NAN, c: 1.0 }.build().is_err());
        assert!(matches!(
            ModelConfig::QuadraticPlanar.build(),
            Ok(ConfiguredModel::QuadraticPlanar)
        ));
    }

    #[test]
    fn unknown_model_types_are_rejected() {
        let result: Result<ModelConfig, _> = serde_json::from_str(r#"{ "type": "lorenz" }"#);
        assert!(result.is_err());
    }
}

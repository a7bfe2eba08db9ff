use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::stability::DegeneracyReason;

/// Typed failures reported by the analysis engine.
///
/// Numeric failures travel as values. A locator that finds nothing or an
/// integration that blows up produces a result carrying a status, and callers
/// that need a hard failure convert it into one of these variants.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum PlanarError {
    #[error("root finding did not converge from any of {seeds} seed(s) (best ‖f‖ = {best_residual})")]
    NoConvergence { seeds: usize, best_residual: f64 },

    #[error(
        "classification is degenerate ({reason:?}): trace = {trace}, determinant = {determinant}, discriminant = {discriminant}"
    )]
    DegenerateClassification {
        trace: f64,
        determinant: f64,
        discriminant: f64,
        reason: DegeneracyReason,
    },

    #[error("integration diverged after t = {last_valid_t} (‖state‖ = {norm})")]
    IntegrationDivergence { last_valid_t: f64, norm: f64 },

    #[error("invalid region: {0}")]
    InvalidRegion(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("Jacobian is singular at ({x}, {y}).")]
    SingularJacobian { x: f64, y: f64 },
}

pub type PlanarResult<T> = std::result::Result<T, PlanarError>;

#[cfg(test)]
mod tests {
    use super::PlanarError;
    use crate::stability::DegeneracyReason;

    #[test]
    fn every_variant_serializes_as_kind_and_detail() {
        let errors = [
            PlanarError::NoConvergence {
                seeds: 81,
                best_residual: 0.25,
            },
            PlanarError::DegenerateClassification {
                trace: 0.0,
                determinant: 0.0,
                discriminant: 0.0,
                reason: DegeneracyReason::NonHyperbolic,
            },
            PlanarError::IntegrationDivergence {
                last_valid_t: 1.0,
                norm: 1e9,
            },
            PlanarError::InvalidRegion("x_min must be below x_max".to_string()),
            PlanarError::InvalidInput("bad".to_string()),
            PlanarError::SingularJacobian { x: 0.0, y: 1.0 },
        ];
        for err in errors {
            let json = serde_json::to_string(&err).expect("error should serialize");
            let back: PlanarError = serde_json::from_str(&json).expect("error should parse");
            assert_eq!(back, err, "{json}");
        }

        let json = serde_json::to_value(PlanarError::InvalidRegion("bad".to_string()))
            .expect("newtype variant");
        assert_eq!(json["kind"], "invalid_region");
        assert_eq!(json["detail"], "bad");
    }
}

//! Trace–determinant classification of planar equilibria.
//!
//! Labels are decided from the signs of Δ, τ²−4Δ and τ only. Values within
//! `tolerance` of a boundary are reported as [`StabilityClass::Degenerate`]
//! instead of being pushed to either neighbouring class.

use crate::error::{PlanarError, PlanarResult};
use crate::traits::Jacobian;
use num_complex::Complex;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StabilityClass {
    StableNode,
    UnstableNode,
    Saddle,
    StableFocus,
    UnstableFocus,
    Center,
    Degenerate,
}

impl StabilityClass {
    pub fn as_str(self) -> &'static str {
        match self {
            StabilityClass::StableNode => "stable_node",
            StabilityClass::UnstableNode => "unstable_node",
            StabilityClass::Saddle => "saddle",
            StabilityClass::StableFocus => "stable_focus",
            StabilityClass::UnstableFocus => "unstable_focus",
            StabilityClass::Center => "center",
            StabilityClass::Degenerate => "degenerate",
        }
    }
}

impl fmt::Display for StabilityClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why linearization could not decide the type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DegeneracyReason {
    /// τ² = 4Δ with Δ > 0: repeated real eigenvalue (star or improper node).
    RepeatedEigenvalue,
    /// Δ = 0: a zero eigenvalue.
    NonHyperbolic,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierSettings {
    /// Half-width of the band around Δ = 0, τ² − 4Δ = 0 and τ = 0 treated as the boundary.
    pub tolerance: f64,
}

impl Default for ClassifierSettings {
    fn default() -> Self {
        Self { tolerance: 1e-9 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub class: StabilityClass,
    pub trace: f64,
    pub determinant: f64,
    pub discriminant: f64,
    pub degeneracy: Option<DegeneracyReason>,
    /// Roots of λ² − τλ + Δ. Reported for reference; never used for the label.
    pub eigenvalues: [Complex<f64>; 2],
}

impl Classification {
    pub fn is_degenerate(&self) -> bool {
        self.class == StabilityClass::Degenerate
    }

    /// Both eigenvalues have negative real part.
    pub fn is_stable(&self) -> bool {
        matches!(
            self.class,
            StabilityClass::StableNode | StabilityClass::StableFocus
        )
    }

    /// A center has purely imaginary eigenvalues: the linear picture does not
    /// settle the nonlinear behaviour either.
    pub fn is_hyperbolic(&self) -> bool {
        !matches!(
            self.class,
            StabilityClass::Center | StabilityClass::Degenerate
        )
    }

    /// The label, or `DegenerateClassification` when none was assigned.
    /// A center is a label; its `NonHyperbolic` flag does not make it fail.
    pub fn require_determined(&self) -> PlanarResult<StabilityClass> {
        match (self.class, self.degeneracy) {
            (StabilityClass::Degenerate, Some(reason)) => {
                Err(PlanarError::DegenerateClassification {
                    trace: self.trace,
                    determinant: self.determinant,
                    discriminant: self.discriminant,
                    reason,
                })
            }
            _ => Ok(self.class),
        }
    }
}

pub fn classify(jacobian: &Jacobian, settings: &ClassifierSettings) -> Classification {
    classify_invariants(jacobian.trace(), jacobian.determinant(), settings)
}

pub fn classify_invariants(
    trace: f64,
    determinant: f64,
    settings: &ClassifierSettings,
) -> Classification {
    let discriminant = trace * trace - 4.0 * determinant;
    let tol = settings.tolerance;

    let (class, degeneracy) = if determinant.abs() < tol {
        (
            StabilityClass::Degenerate,
            Some(DegeneracyReason::NonHyperbolic),
        )
    } else if determinant < 0.0 {
        (StabilityClass::Saddle, None)
    } else if discriminant.abs() < tol {
        (
            StabilityClass::Degenerate,
            Some(DegeneracyReason::RepeatedEigenvalue),
        )
    } else if discriminant > 0.0 {
        if trace > 0.0 {
            (StabilityClass::UnstableNode, None)
        } else {
            (StabilityClass::StableNode, None)
        }
    } else if trace.abs() < tol {
        (StabilityClass::Center, Some(DegeneracyReason::NonHyperbolic))
    } else if trace > 0.0 {
        (StabilityClass::UnstableFocus, None)
    } else {
        (StabilityClass::StableFocus, None)
    };

    Classification {
        class,
        trace,
        determinant,
        discriminant,
        degeneracy,
        eigenvalues: eigenvalues_from_invariants(trace, discriminant),
    }
}

fn eigenvalues_from_invariants(trace: f64, discriminant: f64) -> [Complex<f64>; 2] {
    let half = 0.5 * trace;
    if discriminant >= 0.0 {
        let root = 0.5 * discriminant.sqrt();
        [
            Complex::new(half + root, 0.0),
            Complex::new(half - root, 0.0),
        ]
    } else {
        let root = 0.5 * (-discriminant).sqrt();
        [Complex::new(half, root), Complex::new(half, -root)]
    }
}

#[cfg(test)]
mod tests {
    use super::{
        classify, classify_invariants, ClassifierSettings, DegeneracyReason, StabilityClass,
    };
    use crate::error::PlanarError;
    use crate::traits::Jacobian;

    fn label(trace: f64, det: f64) -> StabilityClass {
        classify_invariants(trace, det, &ClassifierSettings::default()).class
    }

    #[test]
    fn negative_determinant_is_always_a_saddle() {
        for &trace in &[-1e6, -3.0, -1e-12, 0.0, 1e-12, 2.5, 1e6] {
            for &det in &[-1e-8, -1.0, -42.0, -1e9] {
                assert_eq!(label(trace, det), StabilityClass::Saddle, "τ={trace}, Δ={det}");
            }
        }
    }

    #[test]
    fn classification_is_idempotent() {
        let settings = ClassifierSettings::default();
        for &(trace, det) in &[(5.0, 6.0), (-4.0, 12.0), (0.0, 1.0), (2.0, 1.0), (1.0, 0.0)] {
            let first = classify_invariants(trace, det, &settings);
            let second = classify_invariants(trace, det, &settings);
            assert_eq!(first, second);
        }
    }

    #[test]
    fn sign_patterns_map_to_expected_labels() {
        assert_eq!(label(5.0, 6.0), StabilityClass::UnstableNode);
        assert_eq!(label(-5.0, 6.0), StabilityClass::StableNode);
        assert_eq!(label(1.0, 3.0), StabilityClass::UnstableFocus);
        assert_eq!(label(-1.0, 3.0), StabilityClass::StableFocus);
        assert_eq!(label(0.0, 3.0), StabilityClass::Center);
    }

    #[test]
    fn boundaries_are_reported_as_degenerate() {
        let repeated = classify_invariants(2.0, 1.0, &ClassifierSettings::default());
        assert_eq!(repeated.class, StabilityClass::Degenerate);
        assert_eq!(repeated.degeneracy, Some(DegeneracyReason::RepeatedEigenvalue));

        let zero_det = classify_invariants(-3.0, 1e-12, &ClassifierSettings::default());
        assert_eq!(zero_det.class, StabilityClass::Degenerate);
        assert_eq!(zero_det.degeneracy, Some(DegeneracyReason::NonHyperbolic));

        let err = zero_det
            .require_determined()
            .expect_err("degenerate result must not resolve to a label");
        assert!(matches!(
            err,
            PlanarError::DegenerateClassification {
                reason: DegeneracyReason::NonHyperbolic,
                ..
            }
        ));
    }

    #[test]
    fn quadratic_system_equilibria_from_stated_jacobians() {
        let settings = ClassifierSettings::default();
        let at_two_zero = classify(&Jacobian::new(2.0, 2.0, 0.0, 3.0), &settings);
        assert_eq!(at_two_zero.trace, 5.0);
        assert_eq!(at_two_zero.determinant, 6.0);
        assert_eq!(at_two_zero.discriminant, 1.0);
        assert_eq!(at_two_zero.class, StabilityClass::UnstableNode);
        assert_eq!(at_two_zero.require_determined(), Ok(StabilityClass::UnstableNode));

        let at_origin = classify(&Jacobian::new(-2.0, 0.0, 0.0, 3.0), &settings);
        assert_eq!(at_origin.determinant, -6.0);
        assert_eq!(at_origin.class, StabilityClass::Saddle);
    }

    #[test]
    fn eigenvalues_reproduce_the_invariants() {
        for &(trace, det) in &[(5.0, 6.0), (-1.0, 3.0), (0.5, -2.0)] {
            let c = classify_invariants(trace, det, &ClassifierSettings::default());
            let sum = c.eigenvalues[0] + c.eigenvalues[1];
            let product = c.eigenvalues[0] * c.eigenvalues[1];
            assert!((sum.re - trace).abs() < 1e-12 && sum.im.abs() < 1e-12);
            assert!((product.re - det).abs() < 1e-12 && product.im.abs() < 1e-12);
        }
    }

    #[test]
    fn stability_predicates() {
        let c = classify_invariants(-1.0, 3.0, &ClassifierSettings::default());
        assert!(c.is_stable());
        assert!(c.is_hyperbolic());
        let center = classify_invariants(0.0, 3.0, &ClassifierSettings::default());
        assert!(!center.is_stable());
        assert!(!center.is_hyperbolic());
        assert!(!center.is_degenerate());
        assert_eq!(center.degeneracy, Some(DegeneracyReason::NonHyperbolic));
        assert_eq!(center.require_determined(), Ok(StabilityClass::Center));
        assert_eq!(StabilityClass::Saddle.to_string(), "saddle");
    }
}

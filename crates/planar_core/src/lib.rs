pub mod config;
pub mod equation_engine;
pub mod equilibrium;
pub mod error;
pub mod field;
pub mod integrator;
pub mod jacobian;
pub mod models;
pub mod nullcline;
pub mod portrait;
pub mod region;
/// The `planar_core` crate is the numerical engine behind planar phase-plane analysis.
/// Every operation is a pure function of a system definition, its parameters and
/// the requested region, so results can be recomputed on demand.
///
/// Key components:
/// - **Traits**: `PlanarSystem` (two-dimensional autonomous flows), `StepMethod` (integrator steps).
/// - **Models**: the magneto-plasma B–v system, a quadratic x–y system, closure and expression systems.
/// - **Analysis**: fixed-point location, Jacobians, trace/determinant classification.
/// - **Portrait**: trajectories, sampled vector fields and nullclines bundled for rendering.
pub mod solvers;
pub mod stability;
pub mod system;
pub mod traits;

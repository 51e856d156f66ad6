//! The `driftlab_core` crate provides the numerical engine behind the `driftlab` CLI.
//! Everything is generic over the working precision: `f32`, `f64`, the double-double
//! `ExtFloat`, and dual numbers over each of them.
//!
//! Key components:
//! - **Traits**: `Scalar` (numeric type abstraction), `VectorField` (ODE right-hand sides), `Steppable` (fixed-step solvers).
//! - **Integration**: validated Runge–Kutta tableaus, an adaptive PI-controlled driver and dense output.
//! - **Stability**: dual-number or finite-difference Jacobians, a Hessenberg/QR eigenvalue solver and Newton refinement.
//! - **Models**: replicator models and a bytecode VM for user-defined expression fields.
pub mod autodiff;
pub mod controller;
pub mod dense;
pub mod double_double;
pub mod drift;
pub mod eigen;
pub mod equilibrium;
pub mod error;
pub mod expression;
pub mod integrator;
pub mod jacobian;
pub mod models;
pub mod precision;
pub mod solution;
pub mod solvers;
pub mod stability;
pub mod tableau;
pub mod traits;

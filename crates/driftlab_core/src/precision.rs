//! Runtime choice of the working precision.
//!
//! The numerical code is generic over [`Scalar`]; this module picks the type at
//! runtime and hands results back in `f64`, the precision used for reporting.

use crate::autodiff::Dual;
use crate::double_double::ExtFloat;
use crate::drift;
use crate::error::{IntegrationError, QueryError};
use crate::integrator::{integrate, IntegratorConfig};
use crate::jacobian::JacobianStrategy;
use crate::solution::{Solution, SolverStats};
use crate::stability::{classify_equilibrium, StabilityError, StabilityReport, StabilitySettings};
use crate::tableau::TableauName;
use crate::traits::{Scalar, VectorField};
use num_traits::Float;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Precision {
    /// IEEE single precision (`f32`).
    Narrow,
    /// IEEE double precision (`f64`).
    Standard,
    /// Double-double ([`ExtFloat`]).
    Extended,
}

impl Precision {
    pub const ALL: [Precision; 3] = [Precision::Narrow, Precision::Standard, Precision::Extended];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Narrow => "narrow",
            Self::Standard => "standard",
            Self::Extended => "extended",
        }
    }

    /// Unit roundoff of the representation, rounded to `f64`.
    pub fn machine_epsilon(self) -> f64 {
        match self {
            Self::Narrow => f64::from(f32::EPSILON),
            Self::Standard => f64::EPSILON,
            Self::Extended => ExtFloat::epsilon().to_reference(),
        }
    }
}

impl fmt::Display for Precision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Precision {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "narrow" | "single" | "f32" => Ok(Self::Narrow),
            "standard" | "double" | "f64" => Ok(Self::Standard),
            "extended" | "double-double" | "dd" => Ok(Self::Extended),
            other => Err(format!(
                "unknown precision '{other}' (expected narrow, standard or extended)"
            )),
        }
    }
}

/// A field that can be evaluated, and differentiated, in every supported precision.
pub trait MultiPrecisionField:
    VectorField<f32>
    + VectorField<Dual<f32>>
    + VectorField<f64>
    + VectorField<Dual<f64>>
    + VectorField<ExtFloat>
    + VectorField<Dual<ExtFloat>>
    + Sync
{
}

impl<F> MultiPrecisionField for F where
    F: VectorField<f32>
        + VectorField<Dual<f32>>
        + VectorField<f64>
        + VectorField<Dual<f64>>
        + VectorField<ExtFloat>
        + VectorField<Dual<ExtFloat>>
        + Sync
        + ?Sized
{
}

/// A solution in whichever precision it was computed in.
#[derive(Debug, Clone)]
pub enum AnySolution {
    Narrow(Solution<f32>),
    Standard(Solution<f64>),
    Extended(Solution<ExtFloat>),
}

macro_rules! with_solution {
    ($value:expr, $sol:ident => $body:expr) => {
        match $value {
            AnySolution::Narrow($sol) => $body,
            AnySolution::Standard($sol) => $body,
            AnySolution::Extended($sol) => $body,
        }
    };
}

fn to_reference<T: Scalar>(values: &[T]) -> Vec<f64> {
    values.iter().map(|v| v.to_reference()).collect()
}

fn sample_in<T: Scalar>(solution: &Solution<T>, times: &[f64]) -> Result<Vec<Vec<f64>>, QueryError> {
    times
        .iter()
        .map(|&t| solution.state_at(T::constant(t)).map(|y| to_reference(&y)))
        .collect()
}

impl AnySolution {
    pub fn precision(&self) -> Precision {
        match self {
            Self::Narrow(_) => Precision::Narrow,
            Self::Standard(_) => Precision::Standard,
            Self::Extended(_) => Precision::Extended,
        }
    }

    /// Name of the tableau that produced the solution.
    pub fn method(&self) -> &'static str {
        with_solution!(self, s => s.tableau().name())
    }

    pub fn stats(&self) -> SolverStats {
        with_solution!(self, s => s.stats())
    }

    pub fn len(&self) -> usize {
        with_solution!(self, s => s.len())
    }

    pub fn is_empty(&self) -> bool {
        with_solution!(self, s => s.is_empty())
    }

    /// Accepted node times.
    pub fn times(&self) -> Vec<f64> {
        with_solution!(self, s => to_reference(&s.times()))
    }

    pub fn final_time(&self) -> f64 {
        with_solution!(self, s => s.final_time().to_reference())
    }

    pub fn final_state(&self) -> Vec<f64> {
        with_solution!(self, s => to_reference(s.final_state()))
    }

    /// Dense-output states at `times`; times are first rounded to the working precision.
    pub fn sample(&self, times: &[f64]) -> Result<Vec<Vec<f64>>, QueryError> {
        with_solution!(self, s => sample_in(s, times))
    }

    pub fn uniform_grid(&self, count: usize) -> Vec<f64> {
        with_solution!(self, s => to_reference(&s.uniform_grid(count)))
    }

    pub fn sum_drift(&self) -> f64 {
        with_solution!(self, s => drift::sum_drift(s).to_reference())
    }

    pub fn divergence_onset(&self, threshold: f64) -> Option<f64> {
        with_solution!(self, s => {
            drift::divergence_onset(s, Scalar::constant(threshold)).map(Scalar::to_reference)
        })
    }

    pub fn within_unit_box(&self, until: f64) -> bool {
        with_solution!(self, s => drift::within_unit_box(s, Scalar::constant(until)))
    }
}

/// An integration failure in whichever precision the run used.
#[derive(Debug, Error)]
pub enum AnyIntegrationError {
    #[error(transparent)]
    Narrow(#[from] IntegrationError<f32>),
    #[error(transparent)]
    Standard(#[from] IntegrationError<f64>),
    #[error(transparent)]
    Extended(#[from] IntegrationError<ExtFloat>),
}

impl AnyIntegrationError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Narrow(err) => err.kind(),
            Self::Standard(err) => err.kind(),
            Self::Extended(err) => err.kind(),
        }
    }

    /// The trajectory accepted before the failure, if any.
    pub fn into_partial(self) -> Option<AnySolution> {
        match self {
            Self::Narrow(err) => err.into_partial().map(AnySolution::Narrow),
            Self::Standard(err) => err.into_partial().map(AnySolution::Standard),
            Self::Extended(err) => err.into_partial().map(AnySolution::Extended),
        }
    }
}

fn integrate_in<T, F>(
    field: &F,
    y0: &[f64],
    t0: f64,
    t_end: f64,
    method: TableauName,
    config: &IntegratorConfig,
) -> Result<Solution<T>, IntegrationError<T>>
where
    T: Scalar,
    F: VectorField<T> + ?Sized,
{
    let y0: Vec<T> = y0.iter().map(|&v| T::constant(v)).collect();
    integrate(
        field,
        &y0,
        T::constant(t0),
        T::constant(t_end),
        method,
        &config.settings::<T>(),
    )
}

/// Integrates in the requested precision. Inputs and outputs are `f64`; the
/// initial state is widened exactly, or rounded once for [`Precision::Narrow`].
pub fn integrate_with_precision<F>(
    field: &F,
    y0: &[f64],
    t0: f64,
    t_end: f64,
    method: TableauName,
    config: &IntegratorConfig,
    precision: Precision,
) -> Result<AnySolution, AnyIntegrationError>
where
    F: MultiPrecisionField + ?Sized,
{
    log::debug!("integrating with {method} in {precision} precision");
    Ok(match precision {
        Precision::Narrow => {
            AnySolution::Narrow(integrate_in::<f32, F>(field, y0, t0, t_end, method, config)?)
        }
        Precision::Standard => {
            AnySolution::Standard(integrate_in::<f64, F>(field, y0, t0, t_end, method, config)?)
        }
        Precision::Extended => AnySolution::Extended(integrate_in::<ExtFloat, F>(
            field, y0, t0, t_end, method, config,
        )?),
    })
}

fn classify_in<T, F>(
    field: &F,
    y: &[f64],
    strategy: JacobianStrategy,
    tolerance: Option<f64>,
) -> Result<StabilityReport<f64>, StabilityError>
where
    T: Scalar,
    F: VectorField<T> + VectorField<Dual<T>> + ?Sized,
{
    let y: Vec<T> = y.iter().map(|&v| T::constant(v)).collect();
    let settings = StabilitySettings {
        strategy,
        tolerance: tolerance.map(T::constant),
        time: T::zero(),
    };
    classify_equilibrium(field, &y, &settings).map(|report| report.to_reference())
}

/// Classifies the steady state `y` in the requested precision.
///
/// Without an explicit `tolerance` the threshold is `sqrt(eps)` of that precision.
pub fn classify_with_precision<F>(
    field: &F,
    y: &[f64],
    precision: Precision,
    strategy: JacobianStrategy,
    tolerance: Option<f64>,
) -> Result<StabilityReport<f64>, StabilityError>
where
    F: MultiPrecisionField + ?Sized,
{
    match precision {
        Precision::Narrow => classify_in::<f32, F>(field, y, strategy, tolerance),
        Precision::Standard => classify_in::<f64, F>(field, y, strategy, tolerance),
        Precision::Extended => classify_in::<ExtFloat, F>(field, y, strategy, tolerance),
    }
}

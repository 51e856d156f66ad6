use crate::solution::Solution;
use crate::tableau::TableauError;
use crate::traits::Scalar;
use thiserror::Error;

/// Failures of an adaptive integration.
///
/// Runtime failures carry the trajectory accepted so far, so callers can still
/// plot or analyze everything up to the breakdown.
#[derive(Debug, Error)]
pub enum IntegrationError<T: Scalar> {
    #[error("step size underflow at t = {t:?} (h = {h:?})")]
    StepSizeUnderflow {
        t: T,
        h: T,
        partial: Box<Solution<T>>,
    },
    #[error("state became non-finite in the step after t = {t:?}")]
    NonFiniteState {
        /// Last time with a finite state.
        t: T,
        /// Last finite state.
        y: Vec<T>,
        partial: Box<Solution<T>>,
    },
    #[error(transparent)]
    InvalidTableau(#[from] TableauError),
    #[error("initial state has dimension {found}, but the field expects {expected}")]
    DimensionMismatch { expected: usize, found: usize },
    #[error("invalid integrator settings: {0}")]
    InvalidSettings(String),
    #[error("step limit of {steps} accepted steps exceeded at t = {t:?}")]
    StepLimitExceeded {
        steps: usize,
        t: T,
        partial: Box<Solution<T>>,
    },
}

impl<T: Scalar> IntegrationError<T> {
    /// The trajectory accepted before a runtime failure.
    pub fn partial(&self) -> Option<&Solution<T>> {
        match self {
            Self::StepSizeUnderflow { partial, .. }
            | Self::NonFiniteState { partial, .. }
            | Self::StepLimitExceeded { partial, .. } => Some(partial),
            Self::InvalidTableau(_) | Self::DimensionMismatch { .. } | Self::InvalidSettings(_) => {
                None
            }
        }
    }

    pub fn into_partial(self) -> Option<Solution<T>> {
        match self {
            Self::StepSizeUnderflow { partial, .. }
            | Self::NonFiniteState { partial, .. }
            | Self::StepLimitExceeded { partial, .. } => Some(*partial),
            Self::InvalidTableau(_) | Self::DimensionMismatch { .. } | Self::InvalidSettings(_) => {
                None
            }
        }
    }

    /// Short machine-readable name of the failure.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::StepSizeUnderflow { .. } => "step_size_underflow",
            Self::NonFiniteState { .. } => "non_finite_state",
            Self::InvalidTableau(_) => "invalid_tableau",
            Self::DimensionMismatch { .. } => "dimension_mismatch",
            Self::InvalidSettings(_) => "invalid_settings",
            Self::StepLimitExceeded { .. } => "step_limit_exceeded",
        }
    }
}

/// Dense-output query failures.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum QueryError {
    #[error("time {time} lies outside the integrated interval [{start}, {end}]")]
    OutOfRange { time: f64, start: f64, end: f64 },
}

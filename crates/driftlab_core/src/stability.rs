use crate::autodiff::Dual;
use crate::eigen::{eigenvalues, spectral_abscissa, EigenError};
use crate::jacobian::{jacobian, JacobianError, JacobianStrategy};
use crate::traits::{Scalar, VectorField};
use nalgebra::DMatrix;
use num_complex::Complex;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stability {
    Stable,
    Unstable,
}

impl fmt::Display for Stability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Stable => "stable",
            Self::Unstable => "unstable",
        })
    }
}

/// Linear stability of a steady state.
#[derive(Debug, Clone, Serialize)]
pub struct StabilityReport<T> {
    pub stability: Stability,
    /// Largest real part over the spectrum.
    pub max_real_part: T,
    /// Eigenvalues, largest real part first.
    pub eigenvalues: Vec<Complex<T>>,
    /// Threshold the largest real part was compared against.
    pub tolerance: T,
}

impl<T: Scalar> StabilityReport<T> {
    pub fn is_stable(&self) -> bool {
        self.stability == Stability::Stable
    }

    /// Rounds every number to `f64`.
    pub fn to_reference(&self) -> StabilityReport<f64> {
        StabilityReport {
            stability: self.stability,
            max_real_part: self.max_real_part.to_reference(),
            eigenvalues: self
                .eigenvalues
                .iter()
                .map(|l| Complex::new(l.re.to_reference(), l.im.to_reference()))
                .collect(),
            tolerance: self.tolerance.to_reference(),
        }
    }
}

/// Default stability threshold: `sqrt(eps)` of the working precision.
pub fn default_stability_tolerance<T: Scalar>() -> T {
    T::epsilon().sqrt()
}

#[derive(Debug, Clone, Copy)]
pub struct StabilitySettings<T> {
    pub strategy: JacobianStrategy,
    /// Defaults to [`default_stability_tolerance`].
    pub tolerance: Option<T>,
    /// Time at which non-autonomous fields are linearized.
    pub time: T,
}

impl<T: Scalar> Default for StabilitySettings<T> {
    fn default() -> Self {
        Self {
            strategy: JacobianStrategy::Dual,
            tolerance: None,
            time: T::zero(),
        }
    }
}

impl<T: Scalar> StabilitySettings<T> {
    pub fn with_strategy(strategy: JacobianStrategy) -> Self {
        Self {
            strategy,
            ..Self::default()
        }
    }
}

#[derive(Debug, Error)]
pub enum StabilityError {
    #[error(transparent)]
    Jacobian(#[from] JacobianError),
    #[error(transparent)]
    Eigen(#[from] EigenError),
    #[error("stability tolerance must be finite and non-negative, got {0}")]
    InvalidTolerance(f64),
    #[error("cannot classify a zero-dimensional system")]
    EmptySystem,
}

/// Labels a linearization: stable iff every eigenvalue has real part `<= tolerance`.
pub fn classify_jacobian<T: Scalar>(
    jacobian: &DMatrix<T>,
    tolerance: T,
) -> Result<StabilityReport<T>, StabilityError> {
    if !tolerance.is_finite() || tolerance < T::zero() {
        return Err(StabilityError::InvalidTolerance(tolerance.to_reference()));
    }
    if jacobian.is_empty() {
        return Err(StabilityError::EmptySystem);
    }

    let spectrum = eigenvalues(jacobian)?;
    let max_real_part = spectral_abscissa(&spectrum);
    let stability = if max_real_part <= tolerance {
        Stability::Stable
    } else {
        Stability::Unstable
    };
    log::debug!(
        "classified {}x{} Jacobian as {stability} (max Re = {:e})",
        jacobian.nrows(),
        jacobian.ncols(),
        max_real_part.to_reference()
    );
    Ok(StabilityReport {
        stability,
        max_real_part,
        eigenvalues: spectrum,
        tolerance,
    })
}

/// Linearizes `field` at `y` and classifies the result.
pub fn classify_equilibrium<T, F>(
    field: &F,
    y: &[T],
    settings: &StabilitySettings<T>,
) -> Result<StabilityReport<T>, StabilityError>
where
    T: Scalar,
    F: VectorField<T> + VectorField<Dual<T>> + ?Sized,
{
    let tolerance = settings
        .tolerance
        .unwrap_or_else(default_stability_tolerance);
    let matrix = jacobian(field, settings.time, y, settings.strategy)?;
    classify_jacobian(&matrix, tolerance)
}

#[cfg(test)]
mod tests {
    use super::{
        classify_equilibrium, classify_jacobian, default_stability_tolerance, Stability,
        StabilityError, StabilitySettings,
    };
    use crate::double_double::ExtFloat;
    use crate::jacobian::{JacobianError, JacobianStrategy};
    use crate::traits::{Scalar, VectorField};
    use approx::assert_abs_diff_eq;
    use nalgebra::DMatrix;

    /// Damped pendulum: x' = v, v' = -sin(x) - c v.
    struct Pendulum {
        damping: f64,
    }

    impl<T: Scalar> VectorField<T> for Pendulum {
        fn dimension(&self) -> usize {
            2
        }

        fn apply(&self, _t: T, x: &[T], out: &mut [T]) {
            out[0] = x[1];
            out[1] = -x[0].sin() - T::constant(self.damping) * x[1];
        }
    }

    #[test]
    fn pendulum_rest_points() {
        let pendulum = Pendulum { damping: 0.3 };
        let settings = StabilitySettings::default();
        let bottom = classify_equilibrium(&pendulum, &[0.0, 0.0], &settings).unwrap();
        assert_eq!(bottom.stability, Stability::Stable);
        assert_abs_diff_eq!(bottom.max_real_part, -0.15, epsilon = 1e-12);
        let top = classify_equilibrium(&pendulum, &[std::f64::consts::PI, 0.0], &settings).unwrap();
        assert_eq!(top.stability, Stability::Unstable);
    }

    #[test]
    fn strategies_and_precisions_agree() {
        let pendulum = Pendulum { damping: 0.3 };
        for strategy in [JacobianStrategy::Dual, JacobianStrategy::FiniteDifference] {
            let settings = StabilitySettings::<ExtFloat>::with_strategy(strategy);
            let y = [ExtFloat::from(0.0), ExtFloat::from(0.0)];
            let report = classify_equilibrium(&pendulum, &y, &settings).unwrap();
            assert!(report.is_stable());
            assert_eq!(report.tolerance, default_stability_tolerance::<ExtFloat>());

            let narrow = StabilitySettings::<f32>::with_strategy(strategy);
            let report = classify_equilibrium(&pendulum, &[0.0f32, 0.0], &narrow).unwrap();
            assert!(report.is_stable());
        }
    }

    #[test]
    fn tolerance_decides_marginal_cases() {
        let marginal = DMatrix::from_row_slice(2, 2, &[1e-9, 0.0, 0.0, -1.0]);
        let strict = classify_jacobian(&marginal, 0.0).unwrap();
        assert_eq!(strict.stability, Stability::Unstable);
        let loose = classify_jacobian(&marginal, 1e-8).unwrap();
        assert_eq!(loose.stability, Stability::Stable);
        assert!((loose.to_reference().max_real_part - 1e-9).abs() < 1e-20);
    }

    #[test]
    fn invalid_inputs_are_rejected() {
        let m = DMatrix::from_element(2, 2, 0.0);
        assert!(matches!(
            classify_jacobian(&m, -1.0),
            Err(StabilityError::InvalidTolerance(_))
        ));
        let empty = DMatrix::<f64>::zeros(0, 0);
        assert!(matches!(
            classify_jacobian(&empty, 0.0),
            Err(StabilityError::EmptySystem)
        ));
        let pendulum = Pendulum { damping: 0.0 };
        let err = classify_equilibrium(&pendulum, &[0.0], &StabilitySettings::default()).unwrap_err();
        assert!(matches!(
            err,
            StabilityError::Jacobian(JacobianError::DimensionMismatch { expected: 2, found: 1 })
        ));
    }

    #[test]
    fn labels_serialize_lowercase() {
        let json = serde_json::to_string(&Stability::Unstable).unwrap();
        assert_eq!(json, "\"unstable\"");
        assert_eq!(Stability::Stable.to_string(), "stable");
    }
}

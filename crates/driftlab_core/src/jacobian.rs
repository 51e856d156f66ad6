use crate::autodiff::Dual;
use crate::traits::{Scalar, VectorField};
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// How the Jacobian of a field is obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JacobianStrategy {
    /// Forward-mode dual numbers, one field evaluation per column.
    #[default]
    Dual,
    /// Central differences, two field evaluations per column.
    FiniteDifference,
}

impl fmt::Display for JacobianStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Dual => "dual",
            Self::FiniteDifference => "finite_difference",
        })
    }
}

impl FromStr for JacobianStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "dual" | "ad" | "autodiff" => Ok(Self::Dual),
            "finite_difference" | "finite-difference" | "fd" => Ok(Self::FiniteDifference),
            other => Err(format!(
                "unknown Jacobian strategy '{other}' (expected dual or finite_difference)"
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JacobianError {
    #[error("state has dimension {found}, but the field expects {expected}")]
    DimensionMismatch { expected: usize, found: usize },
}

fn check_dimension(expected: usize, found: usize) -> Result<(), JacobianError> {
    if expected != found {
        return Err(JacobianError::DimensionMismatch { expected, found });
    }
    Ok(())
}

/// Exact Jacobian `J[i][j] = ∂f_i/∂y_j` by seeding one column at a time.
pub fn dual_jacobian<T, F>(field: &F, t: T, y: &[T]) -> Result<DMatrix<T>, JacobianError>
where
    T: Scalar,
    F: VectorField<Dual<T>> + ?Sized,
{
    let dim = field.dimension();
    check_dimension(dim, y.len())?;

    let mut jacobian = DMatrix::from_element(dim, dim, T::zero());
    let mut dual_state: Vec<Dual<T>> = y.iter().map(|&v| Dual::lift(v)).collect();
    let mut dual_out = vec![Dual::lift(T::zero()); dim];
    let dual_t = Dual::lift(t);

    for j in 0..dim {
        dual_state[j] = Dual::seed(y[j]);
        field.apply(dual_t, &dual_state, &mut dual_out);
        for i in 0..dim {
            jacobian[(i, j)] = dual_out[i].eps;
        }
        dual_state[j] = Dual::lift(y[j]);
    }
    Ok(jacobian)
}

/// Central-difference Jacobian with step `sqrt(eps) * max(|y_j|, 1)` per column.
pub fn finite_difference_jacobian<T, F>(
    field: &F,
    t: T,
    y: &[T],
) -> Result<DMatrix<T>, JacobianError>
where
    T: Scalar,
    F: VectorField<T> + ?Sized,
{
    let dim = field.dimension();
    check_dimension(dim, y.len())?;

    let root_eps = T::epsilon().sqrt();
    let mut jacobian = DMatrix::from_element(dim, dim, T::zero());
    let mut probe = y.to_vec();
    let mut forward = vec![T::zero(); dim];
    let mut backward = vec![T::zero(); dim];

    for j in 0..dim {
        let h = root_eps * y[j].abs().max(T::one());
        probe[j] = y[j] + h;
        field.apply(t, &probe, &mut forward);
        probe[j] = y[j] - h;
        field.apply(t, &probe, &mut backward);
        probe[j] = y[j];

        let width = h + h;
        for i in 0..dim {
            jacobian[(i, j)] = (forward[i] - backward[i]) / width;
        }
    }
    Ok(jacobian)
}

/// Jacobian of `field` at `(t, y)` using `strategy`.
pub fn jacobian<T, F>(
    field: &F,
    t: T,
    y: &[T],
    strategy: JacobianStrategy,
) -> Result<DMatrix<T>, JacobianError>
where
    T: Scalar,
    F: VectorField<T> + VectorField<Dual<T>> + ?Sized,
{
    match strategy {
        JacobianStrategy::Dual => dual_jacobian(field, t, y),
        JacobianStrategy::FiniteDifference => finite_difference_jacobian(field, t, y),
    }
}

use crate::autodiff::Dual;
use crate::jacobian::dual_jacobian;
use crate::stability::{classify_jacobian, default_stability_tolerance, StabilityReport};
use crate::traits::{Scalar, VectorField};
use anyhow::{anyhow, bail, Context, Result};
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct NewtonSettings {
    pub max_steps: usize,
    pub damping: f64,
    pub tolerance: f64,
}

impl Default for NewtonSettings {
    fn default() -> Self {
        Self {
            max_steps: 25,
            damping: 1.0,
            tolerance: 1e-9,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EquilibriumResult<T> {
    pub state: Vec<T>,
    pub residual_norm: T,
    pub iterations: usize,
    pub report: StabilityReport<T>,
}

/// Refines `initial_guess` to a zero of `field` by damped Newton iteration and
/// classifies the point it converges to.
pub fn solve_equilibrium<T, F>(
    field: &F,
    initial_guess: &[T],
    settings: NewtonSettings,
) -> Result<EquilibriumResult<T>>
where
    T: Scalar,
    F: VectorField<T> + VectorField<Dual<T>> + ?Sized,
{
    let dim = <F as VectorField<T>>::dimension(field);
    if dim == 0 {
        bail!("System has zero dimension.");
    }
    if initial_guess.len() != dim {
        bail!(
            "Initial guess dimension mismatch. Expected {}, got {}.",
            dim,
            initial_guess.len()
        );
    }
    if settings.max_steps == 0 {
        bail!("max_steps must be greater than zero.");
    }
    if !(settings.damping > 0.0 && settings.damping <= 1.0) {
        bail!("damping must lie in (0, 1].");
    }
    if !(settings.tolerance > 0.0) {
        bail!("tolerance must be positive.");
    }

    let damping = T::constant(settings.damping);
    let tolerance = T::constant(settings.tolerance);
    let t = T::zero();

    let mut state = initial_guess.to_vec();
    let mut residual = vec![T::zero(); dim];
    field.apply(t, &state, &mut residual);
    let mut residual_norm = l2_norm(&residual);
    let mut iterations = 0usize;

    loop {
        if !residual_norm.is_finite() {
            bail!("Residual became non-finite after {} Newton steps.", iterations);
        }
        if residual_norm <= tolerance {
            break;
        }
        if iterations >= settings.max_steps {
            bail!(
                "Newton solver failed to converge in {} steps (‖f(x)‖ = {:e}).",
                settings.max_steps,
                residual_norm.to_reference()
            );
        }

        let jacobian = dual_jacobian(field, t, &state)?;
        let delta = solve_linear_system(jacobian, &residual)
            .context("Failed to solve linear system during Newton iteration.")?;

        for (x, dx) in state.iter_mut().zip(&delta) {
            *x = *x - damping * *dx;
        }

        iterations += 1;
        field.apply(t, &state, &mut residual);
        residual_norm = l2_norm(&residual);
        log::trace!(
            "newton step {iterations}: residual {:e}",
            residual_norm.to_reference()
        );
    }

    let jacobian = dual_jacobian(field, t, &state)?;
    let report = classify_jacobian(&jacobian, default_stability_tolerance())
        .context("Failed to classify the refined equilibrium.")?;

    Ok(EquilibriumResult {
        state,
        residual_norm,
        iterations,
        report,
    })
}

/// Solves `J x = b` by Gaussian elimination with partial pivoting.
fn solve_linear_system<T: Scalar>(mut j: DMatrix<T>, rhs: &[T]) -> Result<Vec<T>> {
    let n = rhs.len();
    let mut b = rhs.to_vec();
    let scale = j.iter().fold(T::zero(), |acc, v| acc.max(v.abs()));
    let singular = scale * T::epsilon() * T::from_usize(n).unwrap_or_else(T::one);

    for col in 0..n {
        let pivot = (col..n)
            .max_by(|&a, &b| {
                j[(a, col)]
                    .abs()
                    .partial_cmp(&j[(b, col)].abs())
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .ok_or_else(|| anyhow!("Empty pivot range."))?;
        if !(j[(pivot, col)].abs() > singular) {
            bail!("Jacobian is singular.");
        }
        if pivot != col {
            j.swap_rows(pivot, col);
            b.swap(pivot, col);
        }

        let diag = j[(col, col)];
        for row in col + 1..n {
            let factor = j[(row, col)] / diag;
            if factor.is_zero() {
                continue;
            }
            for k in col..n {
                j[(row, k)] = j[(row, k)] - factor * j[(col, k)];
            }
            b[row] = b[row] - factor * b[col];
        }
    }

    let mut x = vec![T::zero(); n];
    for row in (0..n).rev() {
        let tail = (row + 1..n).fold(T::zero(), |acc, k| acc + j[(row, k)] * x[k]);
        x[row] = (b[row] - tail) / j[(row, row)];
    }
    Ok(x)
}

fn l2_norm<T: Scalar>(values: &[T]) -> T {
    values.iter().fold(T::zero(), |acc, &v| acc + v * v).sqrt()
}

use crate::tableau::ControllerCoefficients;
use crate::traits::Scalar;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorNorm {
    /// Root-mean-square of the scaled components.
    #[default]
    Rms,
    /// Largest scaled component.
    Max,
}

/// Mixed absolute/relative tolerance used to scale the local error.
#[derive(Debug, Clone, Copy)]
pub struct Tolerances<T> {
    pub atol: T,
    pub rtol: T,
    pub norm: ErrorNorm,
}

impl<T: Scalar> Tolerances<T> {
    /// Scaled norm of `error`, weighting component `i` by `atol + rtol * max(|y_i|, |y_new_i|)`.
    /// A zero error counts as zero even where the scale vanishes (`atol = 0` and `y_i = 0`).
    pub fn error_norm(&self, error: &[T], y: &[T], y_new: &[T]) -> T {
        let scaled = error.iter().zip(y.iter().zip(y_new)).map(|(&e, (&a, &b))| {
            let scale = self.atol + self.rtol * a.abs().max(b.abs());
            scaled_component(e, scale)
        });
        match self.norm {
            ErrorNorm::Rms => {
                let sum = scaled.fold(T::zero(), |acc, q| acc + q * q);
                let n = T::from_usize(error.len().max(1)).unwrap_or_else(T::one);
                (sum / n).sqrt()
            }
            ErrorNorm::Max => scaled.fold(T::zero(), |acc, q| {
                if acc.is_nan() || q.is_nan() {
                    T::nan()
                } else {
                    acc.max(q.abs())
                }
            }),
        }
    }

    /// Root-mean-square of `values` scaled by the tolerance at `y`; used by the
    /// initial step heuristic.
    pub fn rms_at(&self, values: &[T], y: &[T]) -> T {
        let sum = values.iter().zip(y).fold(T::zero(), |acc, (&v, &yi)| {
            let q = scaled_component(v, self.atol + yi.abs() * self.rtol);
            acc + q * q
        });
        let n = T::from_usize(values.len().max(1)).unwrap_or_else(T::one);
        (sum / n).sqrt()
    }
}

fn scaled_component<T: Scalar>(value: T, scale: T) -> T {
    if value.is_zero() {
        T::zero()
    } else {
        value / scale
    }
}

/// Proportional-integral step-size controller.
///
/// `factor = safety * err^(-1/p) * (prev_err / err)^(beta/p)`, where `p` is the
/// order of the propagated solution.
#[derive(Debug, Clone)]
pub struct PiController<T> {
    safety: T,
    beta_exponent: T,
    inverse_order: T,
    min_factor: T,
    max_factor: T,
    prev_error: T,
    rejected_last: bool,
}

impl<T: Scalar> PiController<T> {
    pub fn new(gains: ControllerCoefficients, order: u32, min_factor: T, max_factor: T) -> Self {
        let inverse_order = T::one() / T::from_u32(order).unwrap_or_else(T::one);
        Self {
            safety: T::constant(gains.safety),
            beta_exponent: T::constant(gains.beta) * inverse_order,
            inverse_order,
            min_factor,
            max_factor,
            prev_error: Self::error_floor(),
            rejected_last: false,
        }
    }

    fn error_floor() -> T {
        T::constant(1e-4)
    }

    fn raw_factor(&self, error: T) -> T {
        self.safety * error.powf(-self.inverse_order) * (self.prev_error / error).powf(self.beta_exponent)
    }

    /// Step-size multiplier after an accepted step with scaled error `error <= 1`.
    pub fn accept(&mut self, error: T) -> T {
        let error_c = error.max(T::constant(1e-10));
        let upper = if self.rejected_last {
            T::one()
        } else {
            self.max_factor
        };
        let factor = self.raw_factor(error_c).max(self.min_factor).min(upper);
        self.prev_error = error.max(Self::error_floor());
        self.rejected_last = false;
        factor
    }

    /// Step-size multiplier after a rejected step with scaled error `error > 1`.
    pub fn reject(&mut self, error: T) -> T {
        self.rejected_last = true;
        self.raw_factor(error).max(self.min_factor).min(T::one())
    }
}

use crate::double_double::ExtFloat;
use num_traits::{Float, FromPrimitive};
use std::fmt::Debug;

/// A trait for types that can be used as scalars in the integrator and the stability tools.
/// Must support the full `Float` surface, debug printing, and conversion from decimal literals.
pub trait Scalar: Float + FromPrimitive + Debug + Send + Sync + 'static {
    /// Parses a decimal literal (`-1.25e-3`) at the full precision of the type.
    fn parse_decimal(text: &str) -> Option<Self>;

    /// Parses a coefficient literal: either a decimal or a rational `p/q`.
    fn literal(text: &str) -> Option<Self> {
        match text.split_once('/') {
            Some((num, den)) => {
                let num = Self::parse_decimal(num.trim())?;
                let den = Self::parse_decimal(den.trim())?;
                Some(num / den)
            }
            None => Self::parse_decimal(text.trim()),
        }
    }

    /// Converts a reference-precision constant. Unrepresentable values become NaN.
    fn constant(value: f64) -> Self {
        Self::from_f64(value).unwrap_or_else(Self::nan)
    }

    /// Converts an extended-precision constant, keeping as many digits as the type holds.
    fn from_extended(value: ExtFloat) -> Self {
        Self::constant(value.to_f64_lossy())
    }

    /// Rounds to `f64`, the precision used for reports and plotting.
    fn to_reference(self) -> f64 {
        self.to_f64().unwrap_or(f64::NAN)
    }
}

macro_rules! impl_native_scalar {
    ($($ty:ty),*) => {
        $(
            impl Scalar for $ty {
                fn parse_decimal(text: &str) -> Option<Self> {
                    text.trim().parse::<$ty>().ok()
                }
            }
        )*
    };
}

impl_native_scalar!(f32, f64);

/// A time-dependent vector field `dx/dt = f(t, x)`.
///
/// Implementations must be pure: `apply` may only read `self` and must write every
/// component of `out`.
pub trait VectorField<T: Scalar> {
    /// Returns the dimension of the state space.
    fn dimension(&self) -> usize;

    /// Evaluates the field.
    /// t: current time
    /// x: current state
    /// out: buffer to write dx/dt into
    fn apply(&self, t: T, x: &[T], out: &mut [T]);
}

impl<T: Scalar, F: VectorField<T> + ?Sized> VectorField<T> for &F {
    fn dimension(&self) -> usize {
        (**self).dimension()
    }

    fn apply(&self, t: T, x: &[T], out: &mut [T]) {
        (**self).apply(t, x, out)
    }
}

/// A trait for fixed-step solvers that can step a field forward.
pub trait Steppable<T: Scalar> {
    /// Performs one step of size dt.
    /// t: current time (updated after step)
    /// state: current state (updated after step)
    fn step<F: VectorField<T> + ?Sized>(&mut self, field: &F, t: &mut T, state: &mut [T], dt: T);
}

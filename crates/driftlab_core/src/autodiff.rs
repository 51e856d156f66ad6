use crate::double_double::ExtFloat;
use crate::traits::Scalar;
use num_traits::{Float, FromPrimitive, Num, NumCast, One, ToPrimitive, Zero};
use std::ops::{
    Add, AddAssign, Div, DivAssign, Mul, MulAssign, Neg, Rem, RemAssign, Sub, SubAssign,
};

/// Dual number for forward-mode AD over any scalar precision.
/// val: real part
/// eps: infinitesimal part
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Dual<T = f64> {
    pub val: T,
    pub eps: T,
}

impl<T: Scalar> Dual<T> {
    pub fn new(val: T, eps: T) -> Self {
        Self { val, eps }
    }

    /// A value with zero derivative.
    pub fn lift(val: T) -> Self {
        Self::new(val, T::zero())
    }

    /// A value seeded with unit derivative.
    pub fn seed(val: T) -> Self {
        Self::new(val, T::one())
    }

    fn chain(self, val: T, derivative: T) -> Self {
        Self::new(val, derivative * self.eps)
    }
}

impl<T: Scalar> From<T> for Dual<T> {
    fn from(val: T) -> Self {
        Self::lift(val)
    }
}

impl<T: Scalar> Zero for Dual<T> {
    fn zero() -> Self {
        Self::lift(T::zero())
    }
    fn is_zero(&self) -> bool {
        self.val.is_zero() && self.eps.is_zero()
    }
}

impl<T: Scalar> One for Dual<T> {
    fn one() -> Self {
        Self::lift(T::one())
    }
}

impl<T: Scalar> Add for Dual<T> {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self::new(self.val + rhs.val, self.eps + rhs.eps)
    }
}

impl<T: Scalar> Sub for Dual<T> {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self::new(self.val - rhs.val, self.eps - rhs.eps)
    }
}

impl<T: Scalar> Mul for Dual<T> {
    type Output = Self;
    fn mul(self, rhs: Self) -> Self {
        Self::new(self.val * rhs.val, self.val * rhs.eps + self.eps * rhs.val)
    }
}

impl<T: Scalar> Div for Dual<T> {
    type Output = Self;
    fn div(self, rhs: Self) -> Self {
        let denom = rhs.val * rhs.val;
        Self::new(
            self.val / rhs.val,
            (self.eps * rhs.val - self.val * rhs.eps) / denom,
        )
    }
}

impl<T: Scalar> Neg for Dual<T> {
    type Output = Self;
    fn neg(self) -> Self {
        Self::new(-self.val, -self.eps)
    }
}

impl<T: Scalar> Rem for Dual<T> {
    type Output = Self;
    fn rem(self, rhs: Self) -> Self {
        // d/dx (x mod y) = 1 almost everywhere.
        Self::new(self.val % rhs.val, self.eps)
    }
}

macro_rules! compound_assign {
    ($($trait:ident::$method:ident => $op:tt),* $(,)?) => {
        $(
            impl<T: Scalar> $trait for Dual<T> {
                fn $method(&mut self, rhs: Self) {
                    *self = *self $op rhs;
                }
            }
        )*
    };
}

compound_assign! {
    AddAssign::add_assign => +,
    SubAssign::sub_assign => -,
    MulAssign::mul_assign => *,
    DivAssign::div_assign => /,
    RemAssign::rem_assign => %,
}

impl<T: Scalar> Num for Dual<T> {
    type FromStrRadixErr = ();
    fn from_str_radix(str: &str, radix: u32) -> Result<Self, Self::FromStrRadixErr> {
        T::from_str_radix(str, radix)
            .map(Self::lift)
            .map_err(|_| ())
    }
}

impl<T: Scalar> ToPrimitive for Dual<T> {
    fn to_i64(&self) -> Option<i64> {
        self.val.to_i64()
    }
    fn to_u64(&self) -> Option<u64> {
        self.val.to_u64()
    }
    fn to_f64(&self) -> Option<f64> {
        self.val.to_f64()
    }
}

impl<T: Scalar> FromPrimitive for Dual<T> {
    fn from_i64(n: i64) -> Option<Self> {
        T::from_i64(n).map(Self::lift)
    }
    fn from_u64(n: u64) -> Option<Self> {
        T::from_u64(n).map(Self::lift)
    }
    fn from_f64(n: f64) -> Option<Self> {
        T::from_f64(n).map(Self::lift)
    }
}

impl<T: Scalar> NumCast for Dual<T> {
    fn from<N: ToPrimitive>(n: N) -> Option<Self> {
        <T as NumCast>::from(n).map(Self::lift)
    }
}

macro_rules! constants_from_value {
    ($($name:ident),* $(,)?) => {
        $(
            fn $name() -> Self {
                Self::lift(T::$name())
            }
        )*
    };
}

macro_rules! predicates_of_value {
    ($($name:ident),* $(,)?) => {
        $(
            fn $name(self) -> bool {
                self.val.$name()
            }
        )*
    };
}

macro_rules! steps_of_value {
    ($($name:ident),* $(,)?) => {
        $(
            fn $name(self) -> Self {
                Self::lift(self.val.$name())
            }
        )*
    };
}

impl<T: Scalar> Float for Dual<T> {
    constants_from_value!(
        nan,
        infinity,
        neg_infinity,
        min_value,
        min_positive_value,
        max_value,
        epsilon,
    );
    predicates_of_value!(
        is_nan,
        is_infinite,
        is_finite,
        is_normal,
        is_sign_positive,
        is_sign_negative,
    );
    // Piecewise constant, so the derivative vanishes.
    steps_of_value!(floor, ceil, round, trunc, signum);

    fn neg_zero() -> Self {
        Self::new(T::neg_zero(), T::neg_zero())
    }
    fn classify(self) -> std::num::FpCategory {
        self.val.classify()
    }
    fn fract(self) -> Self {
        Self::new(self.val.fract(), self.eps)
    }
    fn abs(self) -> Self {
        if self.val >= T::zero() {
            self
        } else {
            -self
        }
    }
    fn mul_add(self, a: Self, b: Self) -> Self {
        self * a + b
    }
    fn recip(self) -> Self {
        Self::one() / self
    }

    fn powi(self, n: i32) -> Self {
        if n == 0 {
            return Self::one();
        }
        let val_pow = self.val.powi(n);
        let scale = T::from_i32(n).unwrap_or_else(T::nan);
        self.chain(val_pow, scale * self.val.powi(n - 1))
    }

    fn powf(self, n: Self) -> Self {
        let val_pow = self.val.powf(n.val);
        // A constant exponent must not touch ln(x), which is undefined for x <= 0.
        let eps_new = if n.eps.is_zero() {
            if self.eps.is_zero() {
                T::zero()
            } else {
                n.val * self.val.powf(n.val - T::one()) * self.eps
            }
        } else {
            val_pow * (n.eps * self.val.ln() + n.val * self.eps / self.val)
        };
        Self::new(val_pow, eps_new)
    }

    fn sqrt(self) -> Self {
        let s = self.val.sqrt();
        self.chain(s, (s + s).recip())
    }

    fn exp(self) -> Self {
        let e = self.val.exp();
        self.chain(e, e)
    }

    fn exp2(self) -> Self {
        let e = self.val.exp2();
        self.chain(e, e * T::constant(std::f64::consts::LN_2))
    }
    fn ln(self) -> Self {
        self.chain(self.val.ln(), self.val.recip())
    }
    fn log(self, base: Self) -> Self {
        self.ln() / base.ln()
    }
    fn log2(self) -> Self {
        self.ln() / Self::lift(T::constant(2.0).ln())
    }
    fn log10(self) -> Self {
        self.ln() / Self::lift(T::constant(10.0).ln())
    }

    fn max(self, other: Self) -> Self {
        if self.val > other.val {
            self
        } else {
            other
        }
    }
    fn min(self, other: Self) -> Self {
        if self.val < other.val {
            self
        } else {
            other
        }
    }

    fn abs_sub(self, other: Self) -> Self {
        if self.val > other.val {
            self - other
        } else {
            Self::zero()
        }
    }

    fn cbrt(self) -> Self {
        let c = self.val.cbrt();
        self.chain(c, (T::constant(3.0) * c * c).recip())
    }
    fn hypot(self, other: Self) -> Self {
        let h = self.val.hypot(other.val);
        Self::new(h, (self.val * self.eps + other.val * other.eps) / h)
    }

    fn sin(self) -> Self {
        self.chain(self.val.sin(), self.val.cos())
    }
    fn cos(self) -> Self {
        self.chain(self.val.cos(), -self.val.sin())
    }
    fn tan(self) -> Self {
        let t = self.val.tan();
        self.chain(t, T::one() + t * t)
    }
    fn asin(self) -> Self {
        let slope = (T::one() - self.val * self.val).sqrt().recip();
        self.chain(self.val.asin(), slope)
    }
    fn acos(self) -> Self {
        let slope = -(T::one() - self.val * self.val).sqrt().recip();
        self.chain(self.val.acos(), slope)
    }
    fn atan(self) -> Self {
        self.chain(self.val.atan(), (T::one() + self.val * self.val).recip())
    }
    fn atan2(self, other: Self) -> Self {
        let denom = self.val * self.val + other.val * other.val;
        Self::new(
            self.val.atan2(other.val),
            (other.val * self.eps - self.val * other.eps) / denom,
        )
    }
    fn sin_cos(self) -> (Self, Self) {
        (self.sin(), self.cos())
    }

    fn exp_m1(self) -> Self {
        self.chain(self.val.exp_m1(), self.val.exp())
    }
    fn ln_1p(self) -> Self {
        self.chain(self.val.ln_1p(), (T::one() + self.val).recip())
    }
    fn sinh(self) -> Self {
        self.chain(self.val.sinh(), self.val.cosh())
    }
    fn cosh(self) -> Self {
        self.chain(self.val.cosh(), self.val.sinh())
    }
    fn tanh(self) -> Self {
        let t = self.val.tanh();
        self.chain(t, T::one() - t * t)
    }
    fn asinh(self) -> Self {
        let slope = (self.val * self.val + T::one()).sqrt().recip();
        self.chain(self.val.asinh(), slope)
    }
    fn acosh(self) -> Self {
        let slope = (self.val * self.val - T::one()).sqrt().recip();
        self.chain(self.val.acosh(), slope)
    }
    fn atanh(self) -> Self {
        self.chain(self.val.atanh(), (T::one() - self.val * self.val).recip())
    }

    fn integer_decode(self) -> (u64, i16, i8) {
        self.val.integer_decode()
    }
}

impl<T: Scalar> Scalar for Dual<T> {
    fn parse_decimal(text: &str) -> Option<Self> {
        T::parse_decimal(text).map(Self::lift)
    }

    fn from_extended(value: ExtFloat) -> Self {
        Self::lift(T::from_extended(value))
    }

    fn to_reference(self) -> f64 {
        self.val.to_reference()
    }
}

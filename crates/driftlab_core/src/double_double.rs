//! Double-double arithmetic.
//!
//! An [`ExtFloat`] is the unevaluated sum `hi + lo` of two `f64` values with
//! `|lo| <= ulp(hi) / 2`, giving a 106-bit significand (about 32 decimal digits)
//! at roughly an order of magnitude of the cost of `f64`.
//!
//! Addition, multiplication, division, `sqrt`, `exp`, `ln` and integer powers are
//! exact double-double algorithms. Trigonometric and hyperbolic functions evaluate
//! through the leading component and are only `f64` accurate; the integrator and
//! the stability analyzer never call them on their own.

use crate::traits::Scalar;
use num_traits::{Float, FromPrimitive, Num, One, ToPrimitive, Zero};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::num::FpCategory;
use std::ops::{
    Add, AddAssign, Div, DivAssign, Mul, MulAssign, Neg, Rem, RemAssign, Sub, SubAssign,
};
use std::str::FromStr;

/// Extended-precision real number (double-double).
#[derive(Debug, Clone, Copy, Default, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct ExtFloat {
    pub hi: f64,
    pub lo: f64,
}

const LN2: ExtFloat = ExtFloat {
    hi: 6.931_471_805_599_452_862e-1,
    lo: 2.319_046_813_846_299_558e-17,
};

const EXP_REDUCTION_SQUARINGS: i32 = 9;

#[inline]
fn two_sum(a: f64, b: f64) -> (f64, f64) {
    let s = a + b;
    let bb = s - a;
    let e = (a - (s - bb)) + (b - bb);
    (s, e)
}

#[inline]
fn quick_two_sum(a: f64, b: f64) -> (f64, f64) {
    let s = a + b;
    let e = b - (s - a);
    (s, e)
}

#[inline]
fn two_prod(a: f64, b: f64) -> (f64, f64) {
    let p = a * b;
    let e = a.mul_add(b, -p);
    (p, e)
}

impl ExtFloat {
    /// Builds a value from two components, renormalizing them.
    pub fn new(hi: f64, lo: f64) -> Self {
        Self::renormalized(hi, lo)
    }

    #[inline]
    fn renormalized(hi: f64, lo: f64) -> Self {
        if !hi.is_finite() {
            return Self { hi, lo: 0.0 };
        }
        let (hi, lo) = quick_two_sum(hi, lo);
        Self { hi, lo }
    }

    /// Nearest `f64` to the value.
    pub fn to_f64_lossy(self) -> f64 {
        self.hi + self.lo
    }

    fn mul_f64(self, rhs: f64) -> Self {
        let (p1, p2) = two_prod(self.hi, rhs);
        if !p1.is_finite() {
            return Self::from(p1);
        }
        Self::renormalized(p1, p2 + self.lo * rhs)
    }

    /// Multiplies by `2^exp` exactly (barring overflow and underflow).
    pub fn ldexp(self, exp: i32) -> Self {
        let half = exp / 2;
        let scale_a = f64::powi(2.0, half);
        let scale_b = f64::powi(2.0, exp - half);
        Self {
            hi: self.hi * scale_a * scale_b,
            lo: self.lo * scale_a * scale_b,
        }
    }

    fn square(self) -> Self {
        let (p1, p2) = two_prod(self.hi, self.hi);
        if !p1.is_finite() {
            return Self::from(p1);
        }
        Self::renormalized(p1, p2 + 2.0 * self.hi * self.lo)
    }

    /// Parses a decimal literal such as `-12.92096931784711` or `1e-14` without
    /// routing the digits through `f64`.
    pub fn from_decimal(text: &str) -> Option<Self> {
        let text = text.trim();
        let (negative, body) = match text.as_bytes().first()? {
            b'-' => (true, &text[1..]),
            b'+' => (false, &text[1..]),
            _ => (false, text),
        };
        let (mantissa, exponent) = match body.find(['e', 'E']) {
            Some(idx) => (&body[..idx], body[idx + 1..].parse::<i32>().ok()?),
            None => (body, 0),
        };
        let (int_part, frac_part) = match mantissa.split_once('.') {
            Some((int_part, frac_part)) => (int_part, frac_part),
            None => (mantissa, ""),
        };
        if int_part.is_empty() && frac_part.is_empty() {
            return None;
        }

        let mut acc = Self::zero();
        for ch in int_part.chars().chain(frac_part.chars()) {
            let digit = ch.to_digit(10)?;
            acc = acc.mul_f64(10.0) + Self::from(f64::from(digit));
        }

        let exp10 = exponent.checked_sub(i32::try_from(frac_part.len()).ok()?)?;
        let scale = Self::from(10.0).powi(exp10.abs());
        let value = if exp10 >= 0 { acc * scale } else { acc / scale };
        Some(if negative { -value } else { value })
    }

    /// Formats the value with `digits` significant decimal digits in scientific notation.
    pub fn to_scientific(self, digits: usize) -> String {
        if self.hi.is_nan() {
            return "NaN".to_string();
        }
        if self.hi.is_infinite() {
            return if self.hi > 0.0 { "inf" } else { "-inf" }.to_string();
        }
        if self.hi == 0.0 {
            return "0".to_string();
        }

        let sign = if self.hi < 0.0 { "-" } else { "" };
        let mut rest = self.abs();
        let mut exponent = rest.hi.log10().floor() as i32;
        let ten = Self::from(10.0);
        rest = if exponent >= 0 {
            rest / ten.powi(exponent)
        } else {
            rest * ten.powi(-exponent)
        };
        if rest.hi >= 10.0 {
            rest = rest / ten;
            exponent += 1;
        } else if rest.hi < 1.0 {
            rest = rest * ten;
            exponent -= 1;
        }

        let mut mantissa = String::with_capacity(digits + 1);
        for idx in 0..digits.max(1) {
            let digit = rest.hi.floor().clamp(0.0, 9.0);
            mantissa.push(char::from(b'0' + digit as u8));
            if idx == 0 && digits > 1 {
                mantissa.push('.');
            }
            rest = (rest - Self::from(digit)).mul_f64(10.0);
        }
        format!("{sign}{mantissa}e{exponent}")
    }
}

impl From<f64> for ExtFloat {
    fn from(value: f64) -> Self {
        Self { hi: value, lo: 0.0 }
    }
}

impl From<f32> for ExtFloat {
    fn from(value: f32) -> Self {
        Self::from(f64::from(value))
    }
}

impl fmt::Display for ExtFloat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let digits = f.precision().unwrap_or(32);
        f.write_str(&self.to_scientific(digits))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseExtFloatError(String);

impl fmt::Display for ParseExtFloatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid extended-precision literal `{}`", self.0)
    }
}

impl std::error::Error for ParseExtFloatError {}

impl FromStr for ExtFloat {
    type Err = ParseExtFloatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_decimal(s).ok_or_else(|| ParseExtFloatError(s.to_string()))
    }
}

impl Zero for ExtFloat {
    fn zero() -> Self {
        Self { hi: 0.0, lo: 0.0 }
    }
    fn is_zero(&self) -> bool {
        self.hi == 0.0
    }
}

impl One for ExtFloat {
    fn one() -> Self {
        Self { hi: 1.0, lo: 0.0 }
    }
}

impl Add for ExtFloat {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        let (s1, s2) = two_sum(self.hi, rhs.hi);
        if !s1.is_finite() {
            return Self::from(s1);
        }
        let (t1, t2) = two_sum(self.lo, rhs.lo);
        let (s1, s2) = quick_two_sum(s1, s2 + t1);
        Self::renormalized(s1, s2 + t2)
    }
}

impl Neg for ExtFloat {
    type Output = Self;
    fn neg(self) -> Self {
        Self {
            hi: -self.hi,
            lo: -self.lo,
        }
    }
}

impl Sub for ExtFloat {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        self + (-rhs)
    }
}

impl Mul for ExtFloat {
    type Output = Self;
    fn mul(self, rhs: Self) -> Self {
        let (p1, p2) = two_prod(self.hi, rhs.hi);
        if !p1.is_finite() {
            return Self::from(p1);
        }
        Self::renormalized(p1, p2 + (self.hi * rhs.lo + self.lo * rhs.hi))
    }
}

impl Div for ExtFloat {
    type Output = Self;
    fn div(self, rhs: Self) -> Self {
        let q1 = self.hi / rhs.hi;
        if !q1.is_finite() {
            return Self::from(q1);
        }
        let r = self - rhs.mul_f64(q1);
        let q2 = r.hi / rhs.hi;
        let r = r - rhs.mul_f64(q2);
        let q3 = r.hi / rhs.hi;
        Self::renormalized(q1, q2) + Self::from(q3)
    }
}

impl Rem for ExtFloat {
    type Output = Self;
    fn rem(self, rhs: Self) -> Self {
        self - rhs * (self / rhs).trunc()
    }
}

macro_rules! forward_assign {
    ($($trait:ident::$method:ident => $op:tt),*) => {
        $(
            impl $trait for ExtFloat {
                fn $method(&mut self, rhs: Self) {
                    *self = *self $op rhs;
                }
            }
        )*
    };
}

forward_assign!(
    AddAssign::add_assign => +,
    SubAssign::sub_assign => -,
    MulAssign::mul_assign => *,
    DivAssign::div_assign => /,
    RemAssign::rem_assign => %
);

impl Num for ExtFloat {
    type FromStrRadixErr = ParseExtFloatError;
    fn from_str_radix(str: &str, radix: u32) -> Result<Self, Self::FromStrRadixErr> {
        if radix == 10 {
            return str.parse();
        }
        f64::from_str_radix(str, radix)
            .map(Self::from)
            .map_err(|_| ParseExtFloatError(str.to_string()))
    }
}

impl ToPrimitive for ExtFloat {
    fn to_i64(&self) -> Option<i64> {
        let whole = self.trunc();
        let hi = whole.hi.to_i64()?;
        hi.checked_add(whole.lo.to_i64()?)
    }
    fn to_u64(&self) -> Option<u64> {
        let whole = self.trunc();
        let hi = whole.hi.to_u64()?;
        let lo = whole.lo.to_i64()?;
        if lo >= 0 {
            hi.checked_add(lo.unsigned_abs())
        } else {
            hi.checked_sub(lo.unsigned_abs())
        }
    }
    fn to_f64(&self) -> Option<f64> {
        Some(self.to_f64_lossy())
    }
}

impl FromPrimitive for ExtFloat {
    fn from_i64(n: i64) -> Option<Self> {
        let hi = n as f64;
        let lo = (i128::from(n) - hi as i128) as f64;
        Some(Self::renormalized(hi, lo))
    }
    fn from_u64(n: u64) -> Option<Self> {
        let hi = n as f64;
        let lo = (i128::from(n) - hi as i128) as f64;
        Some(Self::renormalized(hi, lo))
    }
    fn from_f64(n: f64) -> Option<Self> {
        Some(Self::from(n))
    }
}

impl num_traits::NumCast for ExtFloat {
    fn from<N: ToPrimitive>(n: N) -> Option<Self> {
        n.to_f64().map(<Self as From<f64>>::from)
    }
}

impl Float for ExtFloat {
    fn nan() -> Self {
        Self::from(f64::NAN)
    }
    fn infinity() -> Self {
        Self::from(f64::INFINITY)
    }
    fn neg_infinity() -> Self {
        Self::from(f64::NEG_INFINITY)
    }
    fn neg_zero() -> Self {
        Self { hi: -0.0, lo: 0.0 }
    }
    fn min_value() -> Self {
        -Self::max_value()
    }
    fn min_positive_value() -> Self {
        // Smallest normal value whose low word is still normal: 2^-969.
        Self::from(f64::from_bits(54_u64 << 52))
    }
    fn max_value() -> Self {
        Self {
            hi: 1.797_693_134_862_315_708_15e308,
            lo: 9.979_201_547_673_597_950_37e291,
        }
    }
    fn epsilon() -> Self {
        // 2^-104
        Self::from(f64::from_bits(919_u64 << 52))
    }
    fn is_nan(self) -> bool {
        self.hi.is_nan()
    }
    fn is_infinite(self) -> bool {
        self.hi.is_infinite()
    }
    fn is_finite(self) -> bool {
        self.hi.is_finite()
    }
    fn is_normal(self) -> bool {
        self.hi.is_normal()
    }
    fn classify(self) -> FpCategory {
        self.hi.classify()
    }
    fn floor(self) -> Self {
        let hi = self.hi.floor();
        if hi == self.hi {
            Self::renormalized(hi, self.lo.floor())
        } else {
            Self::from(hi)
        }
    }
    fn ceil(self) -> Self {
        let hi = self.hi.ceil();
        if hi == self.hi {
            Self::renormalized(hi, self.lo.ceil())
        } else {
            Self::from(hi)
        }
    }
    fn round(self) -> Self {
        if self.hi < 0.0 {
            -(-self).round()
        } else {
            (self + Self::from(0.5)).floor()
        }
    }
    fn trunc(self) -> Self {
        if self.hi < 0.0 {
            self.ceil()
        } else {
            self.floor()
        }
    }
    fn fract(self) -> Self {
        self - self.trunc()
    }
    fn abs(self) -> Self {
        if self.hi < 0.0 {
            -self
        } else {
            self
        }
    }
    fn signum(self) -> Self {
        Self::from(self.hi.signum())
    }
    fn is_sign_positive(self) -> bool {
        self.hi.is_sign_positive()
    }
    fn is_sign_negative(self) -> bool {
        self.hi.is_sign_negative()
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
        let mut base = self;
        let mut acc = Self::one();
        let mut k = n.unsigned_abs();
        while k > 0 {
            if k & 1 == 1 {
                acc = acc * base;
            }
            k >>= 1;
            if k > 0 {
                base = base.square();
            }
        }
        if n < 0 {
            acc.recip()
        } else {
            acc
        }
    }

    fn powf(self, n: Self) -> Self {
        if n.lo == 0.0 && n.hi.fract() == 0.0 && n.hi.abs() <= f64::from(i32::MAX) {
            return self.powi(n.hi as i32);
        }
        (n * self.ln()).exp()
    }

    fn sqrt(self) -> Self {
        if self.hi == 0.0 {
            return Self::zero();
        }
        if self.hi < 0.0 {
            return Self::nan();
        }
        if self.hi.is_infinite() {
            return self;
        }
        let x = 1.0 / self.hi.sqrt();
        let ax = self.hi * x;
        let correction = (self - Self::from(ax).square()).hi * (x * 0.5);
        let (s, e) = two_sum(ax, correction);
        Self::renormalized(s, e)
    }

    fn exp(self) -> Self {
        if self.hi > 709.8 {
            return Self::infinity();
        }
        if self.hi < -745.2 {
            return Self::zero();
        }
        if self.is_nan() {
            return self;
        }
        if self.is_zero() {
            return Self::one();
        }

        let m = (self.hi / LN2.hi + 0.5).floor();
        let r = (self - LN2.mul_f64(m)).ldexp(-EXP_REDUCTION_SQUARINGS);

        // expm1(r) by Taylor series; |r| < 7e-4.
        let mut sum = r;
        let mut term = r;
        for k in 2..=30 {
            term = term * r / Self::from(f64::from(k));
            sum = sum + term;
            if term.hi.abs() <= 1e-33 * sum.hi.abs() {
                break;
            }
        }
        for _ in 0..EXP_REDUCTION_SQUARINGS {
            sum = sum.mul_f64(2.0) + sum.square();
        }
        (sum + Self::one()).ldexp(m as i32)
    }

    fn exp2(self) -> Self {
        (self * LN2).exp()
    }

    fn ln(self) -> Self {
        if self.is_nan() || self.hi < 0.0 {
            return Self::nan();
        }
        if self.hi == 0.0 {
            return Self::neg_infinity();
        }
        if self.hi.is_infinite() {
            return self;
        }
        let x = Self::from(self.hi.ln());
        x + self * (-x).exp() - Self::one()
    }
    fn log(self, base: Self) -> Self {
        self.ln() / base.ln()
    }
    fn log2(self) -> Self {
        self.ln() / LN2
    }
    fn log10(self) -> Self {
        self.ln() / Self::from(10.0).ln()
    }

    fn max(self, other: Self) -> Self {
        match self.partial_cmp(&other) {
            Some(Ordering::Less) => other,
            None if self.is_nan() => other,
            _ => self,
        }
    }
    fn min(self, other: Self) -> Self {
        match self.partial_cmp(&other) {
            Some(Ordering::Greater) => other,
            None if self.is_nan() => other,
            _ => self,
        }
    }

    fn abs_sub(self, other: Self) -> Self {
        if self <= other {
            Self::zero()
        } else {
            self - other
        }
    }

    fn cbrt(self) -> Self {
        if self.is_zero() || !self.is_finite() {
            return self;
        }
        // One Newton step on y^3 = x from the f64 estimate.
        let y = Self::from(self.hi.cbrt());
        y - (y.powi(3) - self) / (Self::from(3.0) * y.square())
    }
    fn hypot(self, other: Self) -> Self {
        (self.square() + other.square()).sqrt()
    }

    fn sin(self) -> Self {
        Self::from(self.hi.sin())
    }
    fn cos(self) -> Self {
        Self::from(self.hi.cos())
    }
    fn tan(self) -> Self {
        Self::from(self.hi.tan())
    }
    fn asin(self) -> Self {
        Self::from(self.hi.asin())
    }
    fn acos(self) -> Self {
        Self::from(self.hi.acos())
    }
    fn atan(self) -> Self {
        Self::from(self.hi.atan())
    }
    fn atan2(self, other: Self) -> Self {
        Self::from(self.hi.atan2(other.hi))
    }
    fn sin_cos(self) -> (Self, Self) {
        (self.sin(), self.cos())
    }

    fn exp_m1(self) -> Self {
        if self.hi.abs() < 1e-5 {
            // Short series avoids the cancellation in exp(x) - 1.
            let x = self;
            let x2 = x.square();
            x + x2 / Self::from(2.0) + x2 * x / Self::from(6.0) + x2.square() / Self::from(24.0)
        } else {
            self.exp() - Self::one()
        }
    }
    fn ln_1p(self) -> Self {
        (Self::one() + self).ln()
    }
    fn sinh(self) -> Self {
        Self::from(self.hi.sinh())
    }
    fn cosh(self) -> Self {
        Self::from(self.hi.cosh())
    }
    fn tanh(self) -> Self {
        Self::from(self.hi.tanh())
    }
    fn asinh(self) -> Self {
        Self::from(self.hi.asinh())
    }
    fn acosh(self) -> Self {
        Self::from(self.hi.acosh())
    }
    fn atanh(self) -> Self {
        Self::from(self.hi.atanh())
    }

    fn integer_decode(self) -> (u64, i16, i8) {
        self.hi.integer_decode()
    }
}

impl Scalar for ExtFloat {
    fn parse_decimal(text: &str) -> Option<Self> {
        Self::from_decimal(text)
    }

    fn from_extended(value: ExtFloat) -> Self {
        value
    }

    fn to_reference(self) -> f64 {
        self.to_f64_lossy()
    }
}

use crate::tableau::{Coefficients, Interpolant, Tableau};
use crate::traits::Scalar;

/// Continuous extension of one accepted step, built only from stored stage derivatives.
#[derive(Debug, Clone)]
pub enum DenseOutput<T> {
    Hermite,
    DormandPrince { d: Vec<T> },
}

impl<T: Scalar> DenseOutput<T> {
    pub fn new(tableau: &Tableau, coefficients: &Coefficients<T>) -> Self {
        match tableau.interpolant() {
            Interpolant::Hermite => Self::Hermite,
            Interpolant::DormandPrince { .. } => Self::DormandPrince {
                d: coefficients.dense.clone(),
            },
        }
    }

    /// Evaluates the interpolant at `t0 + theta * h`.
    ///
    /// `stages` are the derivatives of the step from `(t0, y0)` to `(t0 + h, y1)`;
    /// the first is `f(t0, y0)` and, for FSAL tableaus, the last is `f(t0 + h, y1)`.
    pub fn evaluate(&self, theta: T, h: T, y0: &[T], y1: &[T], stages: &[Vec<T>]) -> Vec<T> {
        match self {
            Self::Hermite => hermite(theta, h, y0, y1, stages),
            Self::DormandPrince { d } => dormand_prince(theta, h, y0, y1, stages, d),
        }
    }
}

fn hermite<T: Scalar>(theta: T, h: T, y0: &[T], y1: &[T], stages: &[Vec<T>]) -> Vec<T> {
    let one = T::one();
    let two = one + one;
    let f0 = &stages[0];
    let f1 = &stages[stages.len() - 1];
    (0..y0.len())
        .map(|i| {
            let diff = y1[i] - y0[i];
            let cubic = (one - two * theta) * diff + (theta - one) * h * f0[i] + theta * h * f1[i];
            y0[i] + theta * diff + theta * (theta - one) * cubic
        })
        .collect()
}

fn dormand_prince<T: Scalar>(
    theta: T,
    h: T,
    y0: &[T],
    y1: &[T],
    stages: &[Vec<T>],
    d: &[T],
) -> Vec<T> {
    let one = T::one();
    let first = &stages[0];
    let last = &stages[stages.len() - 1];
    (0..y0.len())
        .map(|i| {
            let ydiff = y1[i] - y0[i];
            let bspl = h * first[i] - ydiff;
            let r4 = ydiff - h * last[i] - bspl;
            let weighted = d
                .iter()
                .zip(stages)
                .filter(|(w, _)| !w.is_zero())
                .fold(T::zero(), |acc, (&w, k)| acc + w * k[i]);
            let r5 = h * weighted;
            y0[i] + theta * (ydiff + (one - theta) * (bspl + theta * (r4 + (one - theta) * r5)))
        })
        .collect()
}

//! Replicator-type population models used as reference problems.
//!
//! Both variants share the fitness `f_i = (A q)_i - d` and the mean fitness
//! `phi = sum_j q_j f_j`:
//!
//! * `Original`: `q_i' = q_i (f_i - phi)`. Then `d(sum q)/dt = phi (1 - sum q)`,
//!   so the simplex is invariant but repelling at rate `d`, and round-off in the
//!   component sum grows exponentially.
//! * `Modified`: `q_i' = q_i (f_i - phi / sum q)`, which conserves `sum q` exactly.
//!   It is undefined where `sum q = 0`.

use crate::traits::{Scalar, VectorField};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Variant {
    Original,
    Modified,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModelError {
    #[error("payoff matrix must be square and non-empty (row {row} has {found} entries, expected {expected})")]
    NotSquare {
        row: usize,
        expected: usize,
        found: usize,
    },
    #[error("payoff matrix must be non-empty")]
    Empty,
    #[error("model constants must be finite")]
    NonFinite,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReplicatorModel {
    payoff: Vec<Vec<f64>>,
    decay: f64,
    variant: Variant,
}

impl ReplicatorModel {
    pub fn new(payoff: Vec<Vec<f64>>, decay: f64, variant: Variant) -> Result<Self, ModelError> {
        let n = payoff.len();
        if n == 0 {
            return Err(ModelError::Empty);
        }
        if let Some((row, entries)) = payoff.iter().enumerate().find(|(_, r)| r.len() != n) {
            return Err(ModelError::NotSquare {
                row,
                expected: n,
                found: entries.len(),
            });
        }
        if !decay.is_finite() || payoff.iter().flatten().any(|v| !v.is_finite()) {
            return Err(ModelError::NonFinite);
        }
        Ok(Self {
            payoff,
            decay,
            variant,
        })
    }

    /// Two strategies with payoff `[[0, 1], [-1, 0]]` and unit decay.
    pub fn two_component(variant: Variant) -> Self {
        Self {
            payoff: vec![vec![0.0, 1.0], vec![-1.0, 0.0]],
            decay: 1.0,
            variant,
        }
    }

    /// Three strategies with payoff `[[0, 0, -1], [0, 0, 1], [1, -1, 0]]` and unit decay.
    ///
    /// Steady states include the origin and the segment `(q1, 1 - q1, 0)`.
    pub fn three_component(variant: Variant) -> Self {
        Self {
            payoff: vec![
                vec![0.0, 0.0, -1.0],
                vec![0.0, 0.0, 1.0],
                vec![1.0, -1.0, 0.0],
            ],
            decay: 1.0,
            variant,
        }
    }

    pub fn dimension(&self) -> usize {
        self.payoff.len()
    }

    pub fn variant(&self) -> Variant {
        self.variant
    }

    pub fn decay(&self) -> f64 {
        self.decay
    }
}

impl<T: Scalar> VectorField<T> for ReplicatorModel {
    fn dimension(&self) -> usize {
        self.payoff.len()
    }

    fn apply(&self, _t: T, q: &[T], out: &mut [T]) {
        let decay = T::constant(self.decay);
        for (f, row) in out.iter_mut().zip(&self.payoff) {
            *f = row
                .iter()
                .zip(q)
                .filter(|(a, _)| **a != 0.0)
                .fold(T::zero(), |acc, (&a, &qj)| acc + T::constant(a) * qj)
                - decay;
        }

        let phi = q
            .iter()
            .zip(out.iter())
            .fold(T::zero(), |acc, (&qj, &fj)| acc + qj * fj);
        let mean = match self.variant {
            Variant::Original => phi,
            Variant::Modified => phi / q.iter().fold(T::zero(), |acc, &qj| acc + qj),
        };
        for (g, &qi) in out.iter_mut().zip(q) {
            *g = qi * (*g - mean);
        }
    }
}

/// Bundled model configurations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelName {
    Original2,
    Modified2,
    Original3,
    Modified3,
}

impl ModelName {
    pub const ALL: [ModelName; 4] = [
        ModelName::Original2,
        ModelName::Modified2,
        ModelName::Original3,
        ModelName::Modified3,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Original2 => "original2",
            Self::Modified2 => "modified2",
            Self::Original3 => "original3",
            Self::Modified3 => "modified3",
        }
    }

    pub fn model(self) -> ReplicatorModel {
        match self {
            Self::Original2 => ReplicatorModel::two_component(Variant::Original),
            Self::Modified2 => ReplicatorModel::two_component(Variant::Modified),
            Self::Original3 => ReplicatorModel::three_component(Variant::Original),
            Self::Modified3 => ReplicatorModel::three_component(Variant::Modified),
        }
    }

    pub fn default_state(self) -> Vec<f64> {
        match self {
            Self::Original2 | Self::Modified2 => vec![0.2, 0.8],
            Self::Original3 | Self::Modified3 => vec![0.5, 0.25, 0.25],
        }
    }
}

impl fmt::Display for ModelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.to_ascii_lowercase().replace(['-', '_'], "");
        Self::ALL
            .into_iter()
            .find(|name| name.as_str() == key)
            .ok_or_else(|| {
                format!("unknown model '{s}' (expected original2, modified2, original3 or modified3)")
            })
    }
}

#[cfg(test)]
mod tests {
    use super::{ModelError, ModelName, ReplicatorModel, Variant};
    use crate::autodiff::Dual;
    use crate::jacobian::dual_jacobian;
    use crate::traits::VectorField;

    fn eval(model: &ReplicatorModel, q: &[f64]) -> Vec<f64> {
        let mut out = vec![0.0; q.len()];
        model.apply(0.0, q, &mut out);
        out
    }

    #[test]
    fn two_component_original_matches_closed_form() {
        let model = ReplicatorModel::two_component(Variant::Original);
        let (q1, q2) = (0.3, 0.6);
        let g = eval(&model, &[q1, q2]);
        assert!((g[0] - q1 * (q1 + 2.0 * q2 - 1.0)).abs() < 1e-15);
        assert!((g[1] - q2 * (q2 - 1.0)).abs() < 1e-15);
    }

    #[test]
    fn modified_variant_conserves_the_sum() {
        for model in [ModelName::Modified2.model(), ModelName::Modified3.model()] {
            let q: Vec<f64> = match model.dimension() {
                2 => vec![0.35, 0.4],
                _ => vec![0.2, 0.3, 0.1],
            };
            let g = eval(&model, &q);
            assert!(g.iter().sum::<f64>().abs() < 1e-15);
        }
    }

    #[test]
    fn original_sum_rate_is_phi_times_deficit() {
        let model = ReplicatorModel::three_component(Variant::Original);
        let q = [0.2, 0.3, 0.1];
        let g = eval(&model, &q);
        let sum: f64 = q.iter().sum();
        // phi = -d * sum for an antisymmetric payoff.
        let expected = -sum * (1.0 - sum);
        assert!((g.iter().sum::<f64>() - expected).abs() < 1e-15);
    }

    #[test]
    fn steady_segment_and_origin() {
        let model = ReplicatorModel::three_component(Variant::Original);
        for q1 in [0.1, 0.4, 0.8] {
            let g = eval(&model, &[q1, 1.0 - q1, 0.0]);
            assert!(g.iter().all(|v| v.abs() < 1e-15));
        }
        let j = dual_jacobian(&model, 0.0, &[0.0, 0.0, 0.0]).unwrap();
        for r in 0..3 {
            for c in 0..3 {
                let expected = if r == c { -1.0 } else { 0.0 };
                assert_eq!(j[(r, c)], expected);
            }
        }
    }

    #[test]
    fn works_over_duals() {
        let model = ModelName::Original2.model();
        let q = [Dual::seed(0.3_f64), Dual::lift(0.6)];
        let mut out = [Dual::lift(0.0); 2];
        model.apply(Dual::lift(0.0), &q, &mut out);
        // d/dq1 of q1 (q1 + 2 q2 - 1) = 2 q1 + 2 q2 - 1
        assert!((out[0].eps - 0.8).abs() < 1e-15);
    }

    #[test]
    fn names_round_trip() {
        for name in ModelName::ALL {
            assert_eq!(name.to_string().parse::<ModelName>().unwrap(), name);
            assert_eq!(name.model().dimension(), name.default_state().len());
        }
        assert_eq!("Original-3".parse::<ModelName>().unwrap(), ModelName::Original3);
        assert!("original4".parse::<ModelName>().is_err());
    }

    #[test]
    fn constructor_validates_payoff() {
        assert_eq!(
            ReplicatorModel::new(vec![vec![0.0, 1.0], vec![1.0]], 1.0, Variant::Original),
            Err(ModelError::NotSquare {
                row: 1,
                expected: 2,
                found: 1
            })
        );
        assert_eq!(
            ReplicatorModel::new(Vec::new(), 1.0, Variant::Modified),
            Err(ModelError::Empty)
        );
        assert_eq!(
            ReplicatorModel::new(vec![vec![f64::NAN]], 1.0, Variant::Modified),
            Err(ModelError::NonFinite)
        );
    }
}

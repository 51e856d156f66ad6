//! Diagnostics for trajectories that should conserve the sum of their components.

use crate::solution::Solution;
use crate::traits::Scalar;

pub fn component_sum<T: Scalar>(state: &[T]) -> T {
    state.iter().fold(T::zero(), |acc, &v| acc + v)
}

/// Largest deviation `|sum y(t) - sum y(t0)|` over the accepted nodes.
pub fn sum_drift<T: Scalar>(solution: &Solution<T>) -> T {
    let nodes = solution.nodes();
    let reference = component_sum(&nodes[0].y);
    nodes.iter().fold(T::zero(), |acc, node| {
        let drift = (component_sum(&node.y) - reference).abs();
        if drift.is_nan() {
            drift
        } else {
            acc.max(drift)
        }
    })
}

/// First node time at which the sum has drifted by more than `threshold`.
pub fn divergence_onset<T: Scalar>(solution: &Solution<T>, threshold: T) -> Option<T> {
    let nodes = solution.nodes();
    let reference = component_sum(&nodes[0].y);
    nodes
        .iter()
        .find(|node| {
            let drift = (component_sum(&node.y) - reference).abs();
            drift > threshold || drift.is_nan()
        })
        .map(|node| node.t)
}

/// Whether every component stays in `[0, 1]` at all nodes up to time `until`.
pub fn within_unit_box<T: Scalar>(solution: &Solution<T>, until: T) -> bool {
    solution
        .nodes()
        .iter()
        .take_while(|node| node.t <= until)
        .all(|node| node.y.iter().all(|&v| v >= T::zero() && v <= T::one()))
}

#[cfg(test)]
mod tests {
    use super::{component_sum, divergence_onset, sum_drift, within_unit_box};
    use crate::integrator::{integrate, IntegratorSettings};
    use crate::tableau::TableauName;
    use crate::traits::{Scalar, VectorField};

    /// Exchange between two pools; the total drains at rate `leak`.
    struct Leaky {
        leak: f64,
    }

    impl<T: Scalar> VectorField<T> for Leaky {
        fn dimension(&self) -> usize {
            2
        }

        fn apply(&self, _t: T, x: &[T], out: &mut [T]) {
            let exchange = x[0] - x[1];
            out[0] = -exchange;
            out[1] = exchange - T::constant(self.leak);
        }
    }

    fn run(leak: f64) -> crate::solution::Solution<f64> {
        integrate(
            &Leaky { leak },
            &[0.9, 0.1],
            0.0,
            2.0,
            TableauName::Tsit5,
            &IntegratorSettings::new(1e-10, 1e-10),
        )
        .unwrap()
    }

    #[test]
    fn conserved_flow_has_no_drift() {
        let solution = run(0.0);
        assert!(sum_drift(&solution) < 1e-13);
        assert_eq!(divergence_onset(&solution, 1e-12), None);
        assert!(within_unit_box(&solution, 2.0));
    }

    #[test]
    fn leaking_flow_reports_onset() {
        let solution = run(0.1);
        assert!((sum_drift(&solution) - 0.2).abs() < 1e-9);
        let onset = divergence_onset(&solution, 0.05).unwrap();
        // the sum loses 0.1 per unit time
        assert!(onset > 0.5 && onset < 0.8, "onset at {onset}");
        assert_eq!(component_sum(&[0.25, 0.5, 0.125]), 0.875);
    }

    #[test]
    fn unit_box_stops_at_the_horizon() {
        let solution = run(0.6);
        assert!(!within_unit_box(&solution, 2.0));
        assert!(within_unit_box(&solution, 0.05));
    }
}

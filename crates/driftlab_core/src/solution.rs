use crate::dense::DenseOutput;
use crate::error::QueryError;
use crate::tableau::Tableau;
use crate::traits::Scalar;
use serde::Serialize;

/// One accepted node of a trajectory.
#[derive(Debug, Clone)]
pub struct StepRecord<T> {
    pub t: T,
    pub y: Vec<T>,
    /// Stage derivatives of the step that ended at this node; empty for the initial node.
    pub stages: Vec<Vec<T>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SolverStats {
    pub accepted_steps: usize,
    pub rejected_steps: usize,
    pub evaluations: usize,
}

/// An accepted trajectory together with its dense output.
///
/// Immutable once returned by the integrator. Queries never mutate it, so a
/// solution can be shared and sampled from several threads.
#[derive(Debug, Clone)]
pub struct Solution<T: Scalar> {
    tableau: &'static Tableau,
    dense: DenseOutput<T>,
    nodes: Vec<StepRecord<T>>,
    stats: SolverStats,
}

impl<T: Scalar> Solution<T> {
    pub(crate) fn new(tableau: &'static Tableau, dense: DenseOutput<T>, t0: T, y0: Vec<T>) -> Self {
        Self {
            tableau,
            dense,
            nodes: vec![StepRecord {
                t: t0,
                y: y0,
                stages: Vec::new(),
            }],
            stats: SolverStats::default(),
        }
    }

    pub(crate) fn push(&mut self, record: StepRecord<T>) {
        self.nodes.push(record);
    }

    pub(crate) fn stats_mut(&mut self) -> &mut SolverStats {
        &mut self.stats
    }

    pub fn tableau(&self) -> &'static Tableau {
        self.tableau
    }

    pub fn stats(&self) -> SolverStats {
        self.stats
    }

    pub fn nodes(&self) -> &[StepRecord<T>] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn times(&self) -> Vec<T> {
        self.nodes.iter().map(|node| node.t).collect()
    }

    pub fn start_time(&self) -> T {
        self.nodes[0].t
    }

    pub fn final_time(&self) -> T {
        self.last().t
    }

    pub fn final_state(&self) -> &[T] {
        &self.last().y
    }

    fn last(&self) -> &StepRecord<T> {
        &self.nodes[self.nodes.len() - 1]
    }

    /// State at time `t`. Node times return the stored state unchanged.
    pub fn state_at(&self, t: T) -> Result<Vec<T>, QueryError> {
        let start = self.start_time();
        let end = self.final_time();
        if !(t >= start && t <= end) {
            return Err(QueryError::OutOfRange {
                time: t.to_reference(),
                start: start.to_reference(),
                end: end.to_reference(),
            });
        }

        let idx = self.nodes.partition_point(|node| node.t < t);
        let right = &self.nodes[idx];
        if right.t == t {
            return Ok(right.y.clone());
        }
        let left = &self.nodes[idx - 1];
        let h = right.t - left.t;
        let theta = (t - left.t) / h;
        Ok(self
            .dense
            .evaluate(theta, h, &left.y, &right.y, &right.stages))
    }

    /// States at each of `times`, in order.
    pub fn sample(&self, times: &[T]) -> Result<Vec<Vec<T>>, QueryError> {
        times.iter().map(|&t| self.state_at(t)).collect()
    }

    /// `count` evenly spaced times covering the integrated interval, endpoints included.
    pub fn uniform_grid(&self, count: usize) -> Vec<T> {
        let start = self.start_time();
        let end = self.final_time();
        match count {
            0 => Vec::new(),
            1 => vec![start],
            _ => {
                let last = T::from_usize(count - 1).unwrap_or_else(T::one);
                (0..count)
                    .map(|i| {
                        if i == count - 1 {
                            end
                        } else {
                            let frac = T::from_usize(i).unwrap_or_else(T::zero) / last;
                            start + (end - start) * frac
                        }
                    })
                    .collect()
            }
        }
    }
}

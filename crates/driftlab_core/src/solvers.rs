use crate::controller::Tolerances;
use crate::tableau::{Coefficients, Tableau, TableauError};
use crate::traits::{Scalar, Steppable, VectorField};

/// Outcome of one proposed step.
#[derive(Debug, Clone)]
pub struct StepResult<T> {
    pub t_new: T,
    pub y_new: Vec<T>,
    /// Scaled local error; the step is acceptable when it is at most one.
    pub error_norm: T,
    pub stages: Vec<Vec<T>>,
    pub accepted: bool,
}

/// Explicit Runge–Kutta stage engine for an embedded pair.
///
/// Keeps the stage buffers between calls. `k_1 = f(t, y)` is evaluated once per
/// point: a rejected attempt retries from the same point and reuses it, and on
/// FSAL tableaus an accepted step hands its last stage to the next step.
pub struct RungeKutta<T: Scalar> {
    coefficients: Coefficients<T>,
    fsal: bool,
    stages: Vec<Vec<T>>,
    stage_state: Vec<T>,
    first_stage_current: bool,
    evaluations: usize,
}

impl<T: Scalar> RungeKutta<T> {
    pub fn new(coefficients: Coefficients<T>, fsal: bool, dim: usize) -> Self {
        let stage_count = coefficients.c.len();
        Self {
            coefficients,
            fsal,
            stages: vec![vec![T::zero(); dim]; stage_count],
            stage_state: vec![T::zero(); dim],
            first_stage_current: false,
            evaluations: 0,
        }
    }

    pub fn from_tableau(tableau: &Tableau, dim: usize) -> Result<Self, TableauError> {
        Ok(Self::new(tableau.coefficients()?, tableau.fsal(), dim))
    }

    /// Number of field evaluations performed so far.
    pub fn evaluations(&self) -> usize {
        self.evaluations
    }

    /// Installs an already known `f(t, y)` for the next attempt.
    pub fn seed_first_stage(&mut self, derivative: &[T]) {
        self.stages[0].copy_from_slice(derivative);
        self.first_stage_current = true;
    }

    /// Counts evaluations made on the engine's behalf, such as the starting-step probe.
    pub fn note_evaluations(&mut self, count: usize) {
        self.evaluations += count;
    }

    /// Forgets the cached first stage, e.g. after the caller moved the state.
    pub fn invalidate(&mut self) {
        self.first_stage_current = false;
    }

    /// Proposes a step of size `h` from `(t, y)` without committing it.
    pub fn attempt<F: VectorField<T> + ?Sized>(
        &mut self,
        field: &F,
        t: T,
        y: &[T],
        h: T,
        tolerances: &Tolerances<T>,
    ) -> StepResult<T> {
        let y_new = self.evaluate_stages(field, t, y, h);

        let error: Vec<T> = (0..y.len())
            .map(|comp| h * self.weighted_sum(&self.coefficients.e, comp))
            .collect();
        let error_norm = tolerances.error_norm(&error, y, &y_new);

        StepResult {
            t_new: t + h,
            y_new,
            error_norm,
            stages: self.stages.clone(),
            accepted: error_norm <= T::one(),
        }
    }

    /// Commits the last attempt: its end point becomes the start of the next one.
    pub fn accept(&mut self) {
        if self.fsal {
            let last = self.stages.len() - 1;
            self.stages.swap(0, last);
            self.first_stage_current = true;
        } else {
            self.first_stage_current = false;
        }
    }

    fn weighted_sum(&self, weights: &[T], comp: usize) -> T {
        weights
            .iter()
            .zip(&self.stages)
            .filter(|(w, _)| !w.is_zero())
            .fold(T::zero(), |acc, (&w, k)| acc + w * k[comp])
    }

    fn evaluate_stages<F: VectorField<T> + ?Sized>(
        &mut self,
        field: &F,
        t: T,
        y: &[T],
        h: T,
    ) -> Vec<T> {
        if !self.first_stage_current {
            field.apply(t, y, &mut self.stages[0]);
            self.evaluations += 1;
        }
        self.first_stage_current = true;

        for i in 1..self.stages.len() {
            for comp in 0..y.len() {
                let acc = self.weighted_sum(&self.coefficients.a[i], comp);
                self.stage_state[comp] = y[comp] + h * acc;
            }
            let stage_time = t + self.coefficients.c[i] * h;
            field.apply(stage_time, &self.stage_state, &mut self.stages[i]);
            self.evaluations += 1;
        }

        if self.fsal {
            // The last stage was evaluated at the new solution itself.
            self.stage_state.clone()
        } else {
            (0..y.len())
                .map(|comp| y[comp] + h * self.weighted_sum(&self.coefficients.b, comp))
                .collect()
        }
    }
}

impl<T: Scalar> Steppable<T> for RungeKutta<T> {
    fn step<F: VectorField<T> + ?Sized>(&mut self, field: &F, t: &mut T, state: &mut [T], dt: T) {
        self.invalidate();
        let y_new = self.evaluate_stages(field, *t, state, dt);
        state.copy_from_slice(&y_new);
        *t = *t + dt;
    }
}

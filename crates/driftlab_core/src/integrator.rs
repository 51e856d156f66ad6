use crate::controller::{ErrorNorm, PiController, Tolerances};
use crate::dense::DenseOutput;
use crate::error::IntegrationError;
use crate::solution::{Solution, StepRecord};
use crate::solvers::RungeKutta;
use crate::tableau::{Tableau, TableauName};
use crate::traits::{Scalar, VectorField};
use log::{debug, trace, warn};
use serde::{Deserialize, Serialize};

/// Default absolute and relative tolerance for a precision: `max(1e-8, 100 * eps)`.
pub fn default_tolerance<T: Scalar>() -> T {
    T::constant(1e-8).max(T::constant(100.0) * T::epsilon())
}

/// Adaptive integration settings, expressed in the working precision.
#[derive(Debug, Clone, Copy)]
pub struct IntegratorSettings<T> {
    pub atol: T,
    pub rtol: T,
    pub norm: ErrorNorm,
    /// Smallest step-size multiplier per step.
    pub min_factor: T,
    /// Largest step-size multiplier per step.
    pub max_factor: T,
    /// Defaults to `16 * eps * max(|t|, 1)`.
    pub min_step: Option<T>,
    /// Defaults to the length of the interval.
    pub max_step: Option<T>,
    /// Defaults to the Hairer–Wanner estimate.
    pub initial_step: Option<T>,
    /// Maximum number of accepted steps.
    pub max_steps: usize,
    /// Maximum number of consecutive rejections before giving up.
    pub max_rejections: usize,
}

impl<T: Scalar> Default for IntegratorSettings<T> {
    fn default() -> Self {
        Self {
            atol: default_tolerance(),
            rtol: default_tolerance(),
            norm: ErrorNorm::Rms,
            min_factor: T::constant(0.2),
            max_factor: T::constant(10.0),
            min_step: None,
            max_step: None,
            initial_step: None,
            max_steps: 100_000,
            max_rejections: 50,
        }
    }
}

impl<T: Scalar> IntegratorSettings<T> {
    pub fn new(atol: T, rtol: T) -> Self {
        Self {
            atol,
            rtol,
            ..Self::default()
        }
    }

    pub fn tolerances(&self) -> Tolerances<T> {
        Tolerances {
            atol: self.atol,
            rtol: self.rtol,
            norm: self.norm,
        }
    }

    fn validate(&self) -> Result<(), String> {
        let positive = |v: T| v.is_finite() && v > T::zero();
        let non_negative = |v: T| v.is_finite() && v >= T::zero();
        if !non_negative(self.atol) || !non_negative(self.rtol) {
            return Err("tolerances must be finite and non-negative".into());
        }
        if self.atol.is_zero() && self.rtol.is_zero() {
            return Err("atol and rtol cannot both be zero".into());
        }
        if !positive(self.min_factor) || self.min_factor >= T::one() {
            return Err("min_factor must lie in (0, 1)".into());
        }
        if !self.max_factor.is_finite() || self.max_factor <= T::one() {
            return Err("max_factor must be greater than 1".into());
        }
        for (name, value) in [
            ("min_step", self.min_step),
            ("max_step", self.max_step),
            ("initial_step", self.initial_step),
        ] {
            if let Some(v) = value {
                if !positive(v) {
                    return Err(format!("{name} must be finite and positive"));
                }
            }
        }
        if self.max_steps == 0 {
            return Err("max_steps must be greater than zero".into());
        }
        Ok(())
    }
}

/// Precision-independent integrator configuration, as read from JSON.
///
/// Unset tolerances fall back to [`default_tolerance`] of the working precision.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IntegratorConfig {
    pub atol: Option<f64>,
    pub rtol: Option<f64>,
    pub norm: ErrorNorm,
    pub min_factor: f64,
    pub max_factor: f64,
    pub min_step: Option<f64>,
    pub max_step: Option<f64>,
    pub initial_step: Option<f64>,
    pub max_steps: usize,
    pub max_rejections: usize,
}

impl Default for IntegratorConfig {
    fn default() -> Self {
        Self {
            atol: None,
            rtol: None,
            norm: ErrorNorm::Rms,
            min_factor: 0.2,
            max_factor: 10.0,
            min_step: None,
            max_step: None,
            initial_step: None,
            max_steps: 100_000,
            max_rejections: 50,
        }
    }
}

impl IntegratorConfig {
    /// Sets both tolerances.
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.atol = Some(tolerance);
        self.rtol = Some(tolerance);
        self
    }

    pub fn settings<T: Scalar>(&self) -> IntegratorSettings<T> {
        IntegratorSettings {
            atol: self.atol.map_or_else(default_tolerance, T::constant),
            rtol: self.rtol.map_or_else(default_tolerance, T::constant),
            norm: self.norm,
            min_factor: T::constant(self.min_factor),
            max_factor: T::constant(self.max_factor),
            min_step: self.min_step.map(T::constant),
            max_step: self.max_step.map(T::constant),
            initial_step: self.initial_step.map(T::constant),
            max_steps: self.max_steps,
            max_rejections: self.max_rejections,
        }
    }
}

/// Integrates `field` from `(t0, y0)` to `t_end` with the adaptive embedded pair `method`.
///
/// Every accepted step is recorded together with its stage derivatives, so the
/// returned [`Solution`] can be sampled anywhere in `[t0, t_end]`. Runtime failures
/// return the trajectory accepted so far inside the error.
pub fn integrate<T, F>(
    field: &F,
    y0: &[T],
    t0: T,
    t_end: T,
    method: TableauName,
    settings: &IntegratorSettings<T>,
) -> Result<Solution<T>, IntegrationError<T>>
where
    T: Scalar,
    F: VectorField<T> + ?Sized,
{
    let dim = field.dimension();
    if y0.len() != dim {
        return Err(IntegrationError::DimensionMismatch {
            expected: dim,
            found: y0.len(),
        });
    }
    settings.validate().map_err(IntegrationError::InvalidSettings)?;
    if !t0.is_finite() || !t_end.is_finite() {
        return Err(IntegrationError::InvalidSettings(
            "integration bounds must be finite".into(),
        ));
    }
    if t_end < t0 {
        return Err(IntegrationError::InvalidSettings(format!(
            "t_end ({t_end:?}) must not precede t0 ({t0:?})"
        )));
    }
    if y0.iter().any(|v| !v.is_finite()) {
        return Err(IntegrationError::InvalidSettings(
            "initial state must be finite".into(),
        ));
    }

    let tableau = Tableau::get(method)?;
    let coefficients = tableau.coefficients::<T>()?;
    let dense = DenseOutput::new(tableau, &coefficients);
    let mut engine = RungeKutta::new(coefficients, tableau.fsal(), dim);
    let mut solution = Solution::new(tableau, dense, t0, y0.to_vec());

    let span = t_end - t0;
    if span.is_zero() {
        return Ok(solution);
    }

    let tolerances = settings.tolerances();
    let max_step = settings.max_step.unwrap_or(span);
    let mut h = match settings.initial_step {
        Some(h) => h,
        None => initial_step(field, t0, y0, span, tableau.order(), &tolerances, &mut engine),
    };
    h = h.min(max_step).min(span);
    debug!(
        "{}: integrating {} components over [{:?}, {:?}] from h = {:?}",
        tableau.name(),
        dim,
        t0,
        t_end,
        h
    );

    let mut controller = PiController::new(
        tableau.controller(),
        tableau.order(),
        settings.min_factor,
        settings.max_factor,
    );
    let sixteen_eps = T::constant(16.0) * T::epsilon();
    let mut t = t0;
    let mut y = y0.to_vec();
    let mut rejections = 0usize;

    while t < t_end {
        let accepted = solution.stats().accepted_steps;
        if accepted >= settings.max_steps {
            warn!("{}: step limit {} reached at t = {:?}", tableau.name(), settings.max_steps, t);
            return Err(IntegrationError::StepLimitExceeded {
                steps: settings.max_steps,
                t,
                partial: Box::new(finish(solution, &engine)),
            });
        }

        let min_step = settings
            .min_step
            .unwrap_or_else(|| sixteen_eps * t.abs().max(T::one()));
        let last = t + h >= t_end;
        if last {
            h = t_end - t;
        }

        let step = engine.attempt(field, t, &y, h, &tolerances);

        if !step.error_norm.is_finite() || step.y_new.iter().any(|v| !v.is_finite()) {
            warn!("{}: non-finite state in the step after t = {:?}", tableau.name(), t);
            return Err(IntegrationError::NonFiniteState {
                t,
                y,
                partial: Box::new(finish(solution, &engine)),
            });
        }

        if step.accepted {
            let factor = controller.accept(step.error_norm);
            t = if last { t_end } else { step.t_new };
            y = step.y_new;
            trace!("accepted t = {:?}, h = {:?}, err = {:?}", t, h, step.error_norm);
            solution.push(StepRecord {
                t,
                y: y.clone(),
                stages: step.stages,
            });
            solution.stats_mut().accepted_steps += 1;
            engine.accept();
            rejections = 0;
            h = (h * factor).min(max_step).max(min_step);
        } else {
            let factor = controller.reject(step.error_norm);
            solution.stats_mut().rejected_steps += 1;
            rejections += 1;
            debug!(
                "rejected step at t = {:?}: h = {:?}, err = {:?}",
                t, h, step.error_norm
            );
            h = h * factor;
            if h < min_step || rejections > settings.max_rejections {
                warn!(
                    "{}: step size underflow at t = {:?} (h = {:?}, {} consecutive rejections)",
                    tableau.name(),
                    t,
                    h,
                    rejections
                );
                return Err(IntegrationError::StepSizeUnderflow {
                    t,
                    h,
                    partial: Box::new(finish(solution, &engine)),
                });
            }
        }
    }

    let solution = finish(solution, &engine);
    debug!("{}: finished with {:?}", tableau.name(), solution.stats());
    Ok(solution)
}

fn finish<T: Scalar>(mut solution: Solution<T>, engine: &RungeKutta<T>) -> Solution<T> {
    solution.stats_mut().evaluations = engine.evaluations();
    solution
}

/// Hairer–Wanner starting step. Seeds the engine with `f(t0, y0)`.
fn initial_step<T, F>(
    field: &F,
    t0: T,
    y0: &[T],
    span: T,
    order: u32,
    tolerances: &Tolerances<T>,
    engine: &mut RungeKutta<T>,
) -> T
where
    T: Scalar,
    F: VectorField<T> + ?Sized,
{
    let dim = y0.len();
    let mut f0 = vec![T::zero(); dim];
    field.apply(t0, y0, &mut f0);
    engine.seed_first_stage(&f0);

    let d0 = tolerances.rms_at(y0, y0);
    let d1 = tolerances.rms_at(&f0, y0);
    let small = T::constant(1e-5);
    let h0 = if d0 < small || d1 < small {
        T::constant(1e-6)
    } else {
        T::constant(0.01) * (d0 / d1)
    };

    let y1: Vec<T> = y0.iter().zip(&f0).map(|(&y, &f)| y + h0 * f).collect();
    let mut f1 = vec![T::zero(); dim];
    field.apply(t0 + h0, &y1, &mut f1);
    engine.note_evaluations(2);
    let delta: Vec<T> = f1.iter().zip(&f0).map(|(&a, &b)| a - b).collect();
    let d2 = tolerances.rms_at(&delta, y0) / h0;

    let largest = d1.max(d2);
    let h1 = if largest <= T::constant(1e-15) {
        T::constant(1e-6).max(h0 * T::constant(1e-3))
    } else {
        let exponent = T::one() / T::from_u32(order + 1).unwrap_or_else(T::one);
        (T::constant(0.01) / largest).powf(exponent)
    };

    (T::constant(100.0) * h0).min(h1).min(span)
}

#[cfg(test)]
mod tests {
    use super::{default_tolerance, integrate, IntegratorConfig, IntegratorSettings};
    use approx::assert_abs_diff_eq;
    use crate::double_double::ExtFloat;
    use crate::error::IntegrationError;
    use crate::tableau::TableauName;
    use crate::traits::{Scalar, VectorField};
    use num_traits::Float;

    struct Oscillator;

    impl<T: Scalar> VectorField<T> for Oscillator {
        fn dimension(&self) -> usize {
            2
        }

        fn apply(&self, _t: T, x: &[T], out: &mut [T]) {
            out[0] = x[1];
            out[1] = -x[0];
        }
    }

    struct Decay;

    impl<T: Scalar> VectorField<T> for Decay {
        fn dimension(&self) -> usize {
            2
        }

        fn apply(&self, _t: T, x: &[T], out: &mut [T]) {
            out[0] = -x[0];
            out[1] = -x[1];
        }
    }

    /// y' = y^2 blows up at t = 1 / y0.
    struct Blowup;

    impl VectorField<f64> for Blowup {
        fn dimension(&self) -> usize {
            1
        }

        fn apply(&self, _t: f64, x: &[f64], out: &mut [f64]) {
            out[0] = x[0] * x[0];
        }
    }

    /// Produces NaN once t passes 1.
    struct Poisoned;

    impl VectorField<f64> for Poisoned {
        fn dimension(&self) -> usize {
            1
        }

        fn apply(&self, t: f64, _x: &[f64], out: &mut [f64]) {
            out[0] = if t > 1.0 { f64::NAN } else { 1.0 };
        }
    }

    #[test]
    fn harmonic_oscillator_in_every_method() {
        for method in TableauName::ALL {
            let settings = IntegratorSettings::new(1e-10, 1e-10);
            let solution = integrate(&Oscillator, &[1.0, 0.0], 0.0, 10.0, method, &settings)
                .expect("smooth problem");
            let end = solution.final_state();
            assert_eq!(solution.final_time(), 10.0);
            assert_abs_diff_eq!(end[0], 10f64.cos(), epsilon = 1e-7);
            assert_abs_diff_eq!(end[1], -10f64.sin(), epsilon = 1e-7);
            let stats = solution.stats();
            assert_eq!(stats.accepted_steps + 1, solution.len());
            assert!(stats.evaluations > 0);
        }
    }

    #[test]
    fn last_step_lands_on_the_end_time() {
        let settings = IntegratorSettings::new(1e-6, 1e-6);
        let solution =
            integrate(&Oscillator, &[1.0, 0.0], 0.0, 0.3, TableauName::Tsit5, &settings).unwrap();
        assert_eq!(solution.final_time(), 0.3);
        let times = solution.times();
        assert!(times.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn empty_interval_returns_the_initial_node() {
        let settings = IntegratorSettings::default();
        let solution =
            integrate(&Oscillator, &[1.0, 2.0], 3.0, 3.0, TableauName::Verner6, &settings)
                .unwrap();
        assert_eq!(solution.len(), 1);
        assert_eq!(solution.final_state(), &[1.0, 2.0]);
    }

    #[test]
    fn dimension_mismatch_is_reported() {
        let settings = IntegratorSettings::default();
        let err = integrate(&Oscillator, &[1.0], 0.0, 1.0, TableauName::Tsit5, &settings)
            .unwrap_err();
        assert!(matches!(
            err,
            IntegrationError::DimensionMismatch {
                expected: 2,
                found: 1
            }
        ));
        assert!(err.partial().is_none());
    }

    #[test]
    fn invalid_settings_are_rejected() {
        let mut settings = IntegratorSettings::<f64>::default();
        settings.rtol = -1.0;
        let err = integrate(&Oscillator, &[1.0, 0.0], 0.0, 1.0, TableauName::Tsit5, &settings)
            .unwrap_err();
        assert!(err.to_string().contains("non-negative"));

        let settings = IntegratorSettings::<f64>::default();
        let err = integrate(&Oscillator, &[1.0, 0.0], 1.0, 0.0, TableauName::Tsit5, &settings)
            .unwrap_err();
        assert!(matches!(err, IntegrationError::InvalidSettings(_)));
    }

    #[test]
    fn blowup_reports_partial_trajectory() {
        let settings = IntegratorSettings::new(1e-8, 1e-8);
        for method in TableauName::ALL {
            let err = integrate(&Blowup, &[1.0], 0.0, 2.0, method, &settings).unwrap_err();
            assert_eq!(err.kind(), "step_size_underflow", "{method}");
            let partial = err.into_partial().expect("runtime failure keeps the trajectory");
            // The numerical pole sits within the tolerance of t = 1, on either side.
            let stop = partial.final_time();
            assert!(stop > 0.99 && stop < 1.0 + 1e-6, "{method} stopped at {stop}");
            assert!(partial.final_state()[0] > 1e6);
            assert!(partial.len() > 10);
        }
    }

    #[test]
    fn non_finite_state_keeps_last_valid_point() {
        let mut settings = IntegratorSettings::new(1e-6, 1e-6);
        settings.max_step = Some(0.25);
        let err = integrate(&Poisoned, &[0.0], 0.0, 2.0, TableauName::Tsit5, &settings)
            .unwrap_err();
        match err {
            IntegrationError::NonFiniteState { t, y, partial } => {
                assert!(t <= 1.0);
                assert_eq!(partial.final_time(), t);
                assert_eq!(partial.final_state(), y.as_slice());
            }
            other => panic!("expected non-finite state, got {other}"),
        }
    }

    #[test]
    fn step_limit_is_enforced() {
        let mut settings = IntegratorSettings::new(1e-10, 1e-10);
        settings.max_steps = 5;
        let err = integrate(&Oscillator, &[1.0, 0.0], 0.0, 100.0, TableauName::Tsit5, &settings)
            .unwrap_err();
        match err {
            IntegrationError::StepLimitExceeded { steps, partial, .. } => {
                assert_eq!(steps, 5);
                assert_eq!(partial.len(), 6);
            }
            other => panic!("expected step limit, got {other}"),
        }
    }

    #[test]
    fn runs_are_bit_reproducible() {
        let settings = IntegratorSettings::new(1e-9, 1e-9);
        let a = integrate(&Oscillator, &[1.0, 0.0], 0.0, 5.0, TableauName::Verner6, &settings)
            .unwrap();
        let b = integrate(&Oscillator, &[1.0, 0.0], 0.0, 5.0, TableauName::Verner6, &settings)
            .unwrap();
        assert_eq!(a.times(), b.times());
        assert_eq!(a.final_state(), b.final_state());
    }

    #[test]
    fn extended_precision_reaches_tight_tolerances() {
        let tol = ExtFloat::constant(1e-20);
        let settings = IntegratorSettings::new(tol, tol);
        let zero = ExtFloat::from(0.0);
        let one = ExtFloat::from(1.0);
        let cos1 = ExtFloat::literal("0.5403023058681397174009366074429766").unwrap();
        for method in TableauName::ALL {
            let solution = integrate(&Oscillator, &[one, zero], zero, one, method, &settings)
                .unwrap_or_else(|err| panic!("{method}: {err}"));
            let end = solution.final_state();
            let err = (end[0] - cos1).abs().to_reference();
            assert!(err < 1e-17, "{method}: error {err:e}");
        }
    }

    #[test]
    fn pure_relative_tolerance_with_a_resting_component() {
        let settings = IntegratorSettings::new(0.0, 1e-6);
        for method in TableauName::ALL {
            let solution = integrate(&Decay, &[1.0, 0.0], 0.0, 1.0, method, &settings)
                .unwrap_or_else(|err| panic!("{method}: {err}"));
            let end = solution.final_state();
            assert_abs_diff_eq!(end[0], (-1f64).exp(), epsilon = 1e-5);
            assert_eq!(end[1], 0.0);
        }
    }

    #[test]
    fn default_tolerance_tracks_precision() {
        assert_eq!(default_tolerance::<f64>(), 1e-8);
        let narrow = default_tolerance::<f32>();
        assert!((narrow - 100.0 * f32::EPSILON).abs() < 1e-12);
        assert_eq!(default_tolerance::<ExtFloat>(), ExtFloat::from(1e-8));
    }

    #[test]
    fn config_maps_to_settings() {
        let config: IntegratorConfig =
            serde_json::from_str(r#"{ "rtol": 1e-6, "max_steps": 42, "norm": "max" }"#)
                .expect("valid config");
        let settings = config.settings::<f32>();
        assert_eq!(settings.max_steps, 42);
        assert!((settings.rtol - 1e-6).abs() < 1e-12);
        assert_eq!(settings.atol, default_tolerance::<f32>());
        assert_eq!(settings.norm, crate::controller::ErrorNorm::Max);
    }
}

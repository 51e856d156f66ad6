//! driftlab CLI

mod field;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use driftlab_core::autodiff::Dual;
use driftlab_core::double_double::ExtFloat;
use driftlab_core::equilibrium::{solve_equilibrium, NewtonSettings};
use driftlab_core::integrator::IntegratorConfig;
use driftlab_core::jacobian::JacobianStrategy;
use driftlab_core::precision::{
    classify_with_precision, integrate_with_precision, AnySolution, Precision,
};
use driftlab_core::tableau::{Tableau, TableauName};
use driftlab_core::traits::{Scalar, VectorField};
use field::{Field, FieldArgs};
use rayon::prelude::*;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "driftlab")]
#[command(about = "driftlab - adaptive Runge-Kutta integration and stability analysis")]
#[command(version)]
struct Cli {
    /// Log verbosity level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "warn")]
    log_level: tracing::Level,

    /// Output file for results (pretty JSON). Defaults to stdout.
    #[arg(short, long, global = true)]
    output: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Integrate a field and sample the dense output on a uniform grid
    Integrate {
        #[command(flatten)]
        field: FieldArgs,

        /// Embedded pair (tsit5, dp5, vern6)
        #[arg(long, default_value = "tsit5")]
        method: TableauName,

        /// Working precision (narrow, standard, extended)
        #[arg(long, default_value = "standard")]
        precision: Precision,

        /// Integrator settings (JSON). Flags below override its tolerances.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Sets both tolerances
        #[arg(long)]
        tolerance: Option<f64>,

        #[arg(long)]
        atol: Option<f64>,

        #[arg(long)]
        rtol: Option<f64>,

        #[arg(long, default_value = "0", allow_hyphen_values = true)]
        t0: f64,

        #[arg(long, default_value = "50", allow_hyphen_values = true)]
        t_end: f64,

        /// Number of uniformly spaced samples, endpoints included
        #[arg(long, default_value = "101")]
        samples: usize,

        /// Also emit the accepted step times
        #[arg(long)]
        nodes: bool,
    },

    /// Classify a steady state by the spectrum of its Jacobian
    Classify {
        #[command(flatten)]
        field: FieldArgs,

        /// Working precision (narrow, standard, extended)
        #[arg(long, default_value = "standard")]
        precision: Precision,

        /// Jacobian strategy (dual, finite-difference)
        #[arg(long, default_value = "dual")]
        strategy: JacobianStrategy,

        /// Largest real part still labeled stable. Defaults to sqrt(eps) of the precision.
        #[arg(long)]
        tolerance: Option<f64>,

        /// Refine the state with Newton iteration before classifying
        #[arg(long)]
        refine: bool,

        /// Newton settings (JSON), used with --refine
        #[arg(long, requires = "refine")]
        newton: Option<PathBuf>,
    },

    /// Tabulate the divergence onset of the component sum over methods and precisions
    Sweep {
        #[command(flatten)]
        field: FieldArgs,

        /// Methods to run. Defaults to all.
        #[arg(long, value_delimiter = ',')]
        methods: Vec<TableauName>,

        /// Precisions to run. Defaults to all.
        #[arg(long, value_delimiter = ',')]
        precisions: Vec<Precision>,

        /// Tolerance for every run. Defaults to a per-precision value.
        #[arg(long)]
        tolerance: Option<f64>,

        /// Sum deviation that counts as divergence
        #[arg(long, default_value = "1e-3")]
        threshold: f64,

        #[arg(long, default_value = "50")]
        t_end: f64,

        /// Threads (0 = auto).
        #[arg(long, default_value = "0")]
        threads: usize,
    },

    /// List the embedded pairs and their properties
    Methods,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(cli.log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let output = cli.output.as_ref();
    match cli.command {
        Commands::Integrate {
            field,
            method,
            precision,
            config,
            tolerance,
            atol,
            rtol,
            t0,
            t_end,
            samples,
            nodes,
        } => {
            let mut config = load_config(config.as_ref())?;
            if let Some(tol) = tolerance {
                config = config.with_tolerance(tol);
            }
            config.atol = atol.or(config.atol);
            config.rtol = rtol.or(config.rtol);
            cmd_integrate(&field, method, precision, &config, t0, t_end, samples, nodes, output)
        }
        Commands::Classify { field, precision, strategy, tolerance, refine, newton } => {
            let newton = if refine { Some(load_newton(newton.as_ref())?) } else { None };
            cmd_classify(&field, precision, strategy, tolerance, newton, output)
        }
        Commands::Sweep { field, methods, precisions, tolerance, threshold, t_end, threads } => {
            cmd_sweep(&field, methods, precisions, tolerance, threshold, t_end, threads, output)
        }
        Commands::Methods => cmd_methods(output),
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<IntegratorConfig> {
    let Some(path) = path else {
        return Ok(IntegratorConfig::default());
    };
    tracing::info!(path = %path.display(), "loading integrator config");
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&json).with_context(|| format!("invalid integrator config {}", path.display()))
}

fn load_newton(path: Option<&PathBuf>) -> Result<NewtonSettings> {
    let Some(path) = path else {
        return Ok(NewtonSettings::default());
    };
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&json).with_context(|| format!("invalid Newton settings {}", path.display()))
}

fn solution_json(solution: &AnySolution, samples: usize, nodes: bool) -> Result<serde_json::Value> {
    let times = solution.uniform_grid(samples);
    let states = solution.sample(&times)?;
    let mut value = serde_json::json!({
        "method": solution.method(),
        "precision": solution.precision(),
        "final_time": solution.final_time(),
        "final_state": solution.final_state(),
        "stats": solution.stats(),
        "sum_drift": solution.sum_drift(),
        "times": times,
        "states": states,
    });
    if nodes {
        value["nodes"] = serde_json::json!(solution.times());
    }
    Ok(value)
}

#[allow(clippy::too_many_arguments)]
fn cmd_integrate(
    args: &FieldArgs,
    method: TableauName,
    precision: Precision,
    config: &IntegratorConfig,
    t0: f64,
    t_end: f64,
    samples: usize,
    nodes: bool,
    output: Option<&PathBuf>,
) -> Result<()> {
    let field = args.build()?;
    let y0 = args.state(&field)?;
    tracing::info!(field = %args.label(), %method, %precision, t0, t_end, "integrating");

    let output_json = match integrate_with_precision(&field, &y0, t0, t_end, method, config, precision) {
        Ok(solution) => {
            tracing::info!(steps = solution.stats().accepted_steps, "integration complete");
            let mut value = solution_json(&solution, samples, nodes)?;
            value["status"] = serde_json::json!("completed");
            value
        }
        Err(err) => {
            tracing::warn!(kind = err.kind(), "integration failed: {err}");
            let message = err.to_string();
            let kind = err.kind();
            let Some(partial) = err.into_partial() else {
                bail!("integration failed: {message}");
            };
            let mut value = solution_json(&partial, samples, nodes)?;
            value["status"] = serde_json::json!(kind);
            value["error"] = serde_json::json!(message);
            value
        }
    };

    write_json(output, output_json)
}

/// Newton refinement in the working precision; the result is reported in `f64`.
fn refine_in<T, F>(field: &F, guess: &[f64], settings: NewtonSettings) -> Result<(Vec<f64>, f64, usize)>
where
    T: Scalar,
    F: VectorField<T> + VectorField<Dual<T>> + ?Sized,
{
    let guess: Vec<T> = guess.iter().map(|&v| T::constant(v)).collect();
    let result = solve_equilibrium(field, &guess, settings)?;
    Ok((
        result.state.iter().map(|v| v.to_reference()).collect(),
        result.residual_norm.to_reference(),
        result.iterations,
    ))
}

fn refine(
    field: &Field,
    guess: &[f64],
    precision: Precision,
    settings: NewtonSettings,
) -> Result<(Vec<f64>, f64, usize)> {
    match precision {
        Precision::Narrow => refine_in::<f32, _>(field, guess, settings),
        Precision::Standard => refine_in::<f64, _>(field, guess, settings),
        Precision::Extended => refine_in::<ExtFloat, _>(field, guess, settings),
    }
}

fn cmd_classify(
    args: &FieldArgs,
    precision: Precision,
    strategy: JacobianStrategy,
    tolerance: Option<f64>,
    newton: Option<NewtonSettings>,
    output: Option<&PathBuf>,
) -> Result<()> {
    let field = args.build()?;
    let guess = args.state(&field)?;

    let (state, refinement) = match newton {
        Some(settings) => {
            let (state, residual, iterations) = refine(&field, &guess, precision, settings)
                .context("equilibrium refinement failed")?;
            tracing::info!(iterations, residual, "refined steady state");
            let info = serde_json::json!({ "iterations": iterations, "residual_norm": residual });
            (state, Some(info))
        }
        None => (guess, None),
    };

    let report = classify_with_precision(&field, &state, precision, strategy, tolerance)?;
    tracing::info!(stability = %report.stability, max_real_part = report.max_real_part, "classified");

    let output_json = serde_json::json!({
        "field": args.label(),
        "precision": precision,
        "strategy": strategy,
        "state": state,
        "refinement": refinement,
        "stability": report.stability,
        "max_real_part": report.max_real_part,
        "tolerance": report.tolerance,
        "eigenvalues": report.eigenvalues,
    });

    write_json(output, output_json)
}

/// Tolerance the sweep uses for `precision` unless one is given.
fn sweep_tolerance(precision: Precision) -> f64 {
    match precision {
        Precision::Narrow => 1e-7,
        Precision::Standard => 1e-8,
        Precision::Extended => 1e-14,
    }
}

#[allow(clippy::too_many_arguments)]
fn cmd_sweep(
    args: &FieldArgs,
    methods: Vec<TableauName>,
    precisions: Vec<Precision>,
    tolerance: Option<f64>,
    threshold: f64,
    t_end: f64,
    threads: usize,
    output: Option<&PathBuf>,
) -> Result<()> {
    if threads > 0 {
        // Best-effort; if a global pool already exists, keep going.
        let _ = rayon::ThreadPoolBuilder::new().num_threads(threads).build_global();
    }
    if threshold.is_nan() || threshold <= 0.0 {
        bail!("threshold must be positive, got {threshold}");
    }

    let field = args.build()?;
    let y0 = args.state(&field)?;
    let methods = if methods.is_empty() { TableauName::ALL.to_vec() } else { methods };
    let precisions = if precisions.is_empty() { Precision::ALL.to_vec() } else { precisions };

    let runs: Vec<(TableauName, Precision)> = methods
        .iter()
        .flat_map(|&m| precisions.iter().map(move |&p| (m, p)))
        .collect();
    tracing::info!(field = %args.label(), runs = runs.len(), "starting sweep");

    let rows: Vec<serde_json::Value> = runs
        .par_iter()
        .map(|&(method, precision)| {
            let tol = tolerance.unwrap_or_else(|| sweep_tolerance(precision));
            let config = IntegratorConfig::default().with_tolerance(tol);
            let result = integrate_with_precision(&field, &y0, 0.0, t_end, method, &config, precision);
            let (status, trajectory) = match result {
                Ok(solution) => ("completed", Some(solution)),
                Err(err) => {
                    tracing::debug!(%method, %precision, "run stopped early: {err}");
                    (err.kind(), err.into_partial())
                }
            };
            // A run that fails before crossing the threshold diverged where it stopped.
            let onset = trajectory.as_ref().and_then(|s| {
                s.divergence_onset(threshold)
                    .or_else(|| (status != "completed").then(|| s.final_time()))
            });
            serde_json::json!({
                "method": method,
                "precision": precision,
                "tolerance": tol,
                "status": status,
                "onset": onset,
                "final_time": trajectory.as_ref().map(|s| s.final_time()),
                "sum_drift": trajectory.as_ref().map(|s| s.sum_drift()),
                "accepted_steps": trajectory.as_ref().map(|s| s.stats().accepted_steps),
            })
        })
        .collect();

    write_json(output, serde_json::json!({ "field": args.label(), "threshold": threshold, "runs": rows }))
}

fn cmd_methods(output: Option<&PathBuf>) -> Result<()> {
    let methods = TableauName::ALL
        .iter()
        .map(|&name| -> Result<serde_json::Value> {
            let tableau = Tableau::get(name)?;
            Ok(serde_json::json!({
                "name": tableau.name(),
                "stages": tableau.stages(),
                "order": tableau.order(),
                "embedded_order": tableau.embedded_order(),
                "fsal": tableau.fsal(),
            }))
        })
        .collect::<Result<Vec<_>>>()?;
    write_json(output, serde_json::json!(methods))
}

fn write_json(output: Option<&PathBuf>, value: serde_json::Value) -> Result<()> {
    if let Some(path) = output {
        std::fs::write(path, serde_json::to_string_pretty(&value)?)?;
    } else {
        println!("{}", serde_json::to_string_pretty(&value)?);
    }
    Ok(())
}

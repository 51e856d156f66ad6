use std::path::PathBuf;
use std::process::{Command, Output};
use std::time::{SystemTime, UNIX_EPOCH};

fn bin_path() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_driftlab"))
}

fn tmp_path(name: &str) -> PathBuf {
    let nanos = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_nanos();
    let mut p = std::env::temp_dir();
    p.push(format!("driftlab_cli_{}_{}_{}", std::process::id(), nanos, name));
    p
}

fn run(args: &[&str]) -> Output {
    Command::new(bin_path())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("failed to run {:?} {:?}: {}", bin_path(), args, e))
}

fn run_json(args: &[&str]) -> serde_json::Value {
    let out = run(args);
    assert!(
        out.status.success(),
        "{:?} failed: {}",
        args,
        String::from_utf8_lossy(&out.stderr)
    );
    serde_json::from_slice(&out.stdout).expect("stdout should be JSON")
}

#[test]
fn integrate_samples_the_modified_model() {
    let v = run_json(&[
        "integrate",
        "--model",
        "modified3",
        "--t-end",
        "10",
        "--tolerance",
        "1e-10",
        "--samples",
        "5",
    ]);
    assert_eq!(v["status"], "completed");
    assert_eq!(v["method"], "tsit5");
    assert_eq!(v["precision"], "standard");
    assert_eq!(v["final_time"], 10.0);
    assert_eq!(v["times"].as_array().unwrap().len(), 5);
    let states = v["states"].as_array().unwrap();
    assert_eq!(states.len(), 5);
    for state in states {
        let sum: f64 = state.as_array().unwrap().iter().map(|x| x.as_f64().unwrap()).sum();
        assert!((sum - 1.0).abs() < 1e-9, "sum {sum}");
    }
    assert!(v["stats"]["accepted_steps"].as_u64().unwrap() > 0);
}

#[test]
fn integrate_reports_failures_with_partial_trajectory() {
    let v = run_json(&[
        "integrate",
        "--equation",
        "y=y^2",
        "--state",
        "1",
        "--t-end",
        "2",
        "--samples",
        "3",
    ]);
    assert_eq!(v["status"], "step_size_underflow");
    assert!(v["error"].as_str().is_some());
    let final_time = v["final_time"].as_f64().unwrap();
    assert!(final_time > 0.99 && final_time < 1.0 + 1e-6, "stopped at {final_time}");
    assert_eq!(v["states"].as_array().unwrap().len(), 3);
}

#[test]
fn logs_stay_off_stdout() {
    let out = run(&[
        "--log-level",
        "info",
        "integrate",
        "--equation",
        "y=y^2",
        "--state",
        "1",
        "--t-end",
        "2",
    ]);
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    let v: serde_json::Value = serde_json::from_slice(&out.stdout).expect("stdout should be JSON");
    assert_eq!(v["status"], "step_size_underflow");
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("step size underflow"), "stderr: {stderr}");
}

#[test]
fn integrate_reads_a_config_file() {
    let config = tmp_path("config.json");
    std::fs::write(&config, r#"{ "max_steps": 3 }"#).unwrap();
    let v = run_json(&[
        "integrate",
        "--model",
        "original2",
        "--config",
        config.to_str().unwrap(),
        "--t-end",
        "100",
    ]);
    assert_eq!(v["status"], "step_limit_exceeded");
    let _ = std::fs::remove_file(&config);
}

#[test]
fn classify_labels_the_origin_and_the_segment() {
    let stable = run_json(&["classify", "--model", "original3", "--state", "0,0,0"]);
    assert_eq!(stable["stability"], "stable");
    assert!((stable["max_real_part"].as_f64().unwrap() + 1.0).abs() < 1e-12);
    assert_eq!(stable["eigenvalues"].as_array().unwrap().len(), 3);

    let unstable = run_json(&[
        "classify",
        "--model",
        "original3",
        "--state",
        "0.3,0.7,0",
        "--precision",
        "extended",
        "--strategy",
        "finite-difference",
    ]);
    assert_eq!(unstable["stability"], "unstable");
    assert_eq!(unstable["strategy"], "finite_difference");
}

#[test]
fn classify_refines_before_labeling() {
    let v = run_json(&[
        "classify",
        "--equation",
        "x=y",
        "--equation",
        "y=-sin(x)-c*y",
        "--param",
        "c=0.3",
        "--state",
        "3,0.1",
        "--refine",
    ]);
    let state: Vec<f64> = v["state"].as_array().unwrap().iter().map(|x| x.as_f64().unwrap()).collect();
    assert!((state[0] - std::f64::consts::PI).abs() < 1e-9);
    assert!(state[1].abs() < 1e-9);
    assert_eq!(v["stability"], "unstable");
    assert!(v["refinement"]["iterations"].as_u64().unwrap() > 0);
}

#[test]
fn sweep_writes_one_row_per_run() {
    let out_path = tmp_path("sweep.json");
    let out = run(&[
        "sweep",
        "--model",
        "modified2",
        "--methods",
        "tsit5,vern6",
        "--precisions",
        "standard,extended",
        "--tolerance",
        "1e-10",
        "--t-end",
        "5",
        "--output",
        out_path.to_str().unwrap(),
    ]);
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    let v: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&out_path).unwrap()).unwrap();
    let rows = v["runs"].as_array().unwrap();
    assert_eq!(rows.len(), 4);
    for row in rows {
        assert_eq!(row["status"], "completed");
        assert!(row["onset"].is_null(), "modified model drifted: {row}");
    }
    let _ = std::fs::remove_file(&out_path);
}

#[test]
fn methods_lists_the_registry() {
    let v = run_json(&["methods"]);
    let names: Vec<&str> = v.as_array().unwrap().iter().map(|m| m["name"].as_str().unwrap()).collect();
    assert_eq!(names, vec!["tsit5", "dp5", "vern6"]);
}

#[test]
fn bad_arguments_fail() {
    assert!(!run(&["integrate", "--method", "rk4"]).status.success());
    assert!(!run(&["classify", "--model", "original3", "--state", "0,0"]).status.success());
}

//! `oci evaluate`, `oci config-check` and `oci verify-audit` end to end.

#![allow(deprecated)] // Command::cargo_bin

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::json;
use std::fs;

const ENV_KEYS: &[&str] = &[
    "ONCHAIN_MIN_CONFIDENCE",
    "ONCHAIN_STABILITY_THRESHOLD",
    "ONCHAIN_COMPLETENESS_THRESHOLD",
    "ONCHAIN_MAX_DATA_AGE_HOURS",
    "ONCHAIN_MAX_CONFLICTING_SIGNALS",
    "ONCHAIN_NORMAL_WEIGHT",
    "ONCHAIN_DEGRADED_WEIGHT",
    "ONCHAIN_LOG_LEVEL",
    "ONCHAIN_BIND_ADDR",
    "RUST_LOG",
];

/// `oci` with a clean ONCHAIN_* / RUST_LOG environment, run from a temp dir.
fn oci(dir: &tempfile::TempDir) -> Command {
    let mut cmd = Command::cargo_bin("oci").unwrap();
    cmd.current_dir(dir.path());
    for k in ENV_KEYS {
        cmd.env_remove(k);
    }
    cmd
}

fn write_context(dir: &tempfile::TempDir, confidence: f64) -> String {
    let path = dir.path().join("ctx.json");
    let body = json!({
        "asset": "BTC",
        "timeframe": "1d",
        "timestamp": "2024-01-15T00:00:00Z",
        "verification": {
            "invariants_passed": true,
            "deterministic": true,
            "stability_score": 0.9,
            "data_completeness": 0.9
        },
        "risk_flags": {"data_lag": false, "signal_conflict": false},
        "decision_context": {"onchain_score": 61.0, "confidence": confidence}
    });
    fs::write(&path, body.to_string()).unwrap();
    path.to_string_lossy().to_string()
}

#[test]
fn evaluate_prints_active_payload() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = write_context(&dir, 0.8);

    let out = oci(&dir).args(["evaluate", ctx.as_str()]).output().unwrap();
    assert!(out.status.success());

    let v: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(v["state"], "ACTIVE");
    assert_eq!(v["usage_policy"]["recommended_weight"], 1.0);
}

#[test]
fn evaluate_respects_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = write_context(&dir, 0.8);
    let cfg = dir.path().join("strict.yaml");
    fs::write(&cfg, "min_confidence: 0.85\n").unwrap();

    let out = oci(&dir)
        .args(["evaluate", ctx.as_str(), "--config", cfg.to_str().unwrap()])
        .output()
        .unwrap();
    assert!(out.status.success());

    let v: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(v["state"], "BLOCKED");
    assert!(v["decision_context"]["onchain_score"].is_null());
    assert_eq!(
        v["usage_policy"]["notes"],
        "Data blocked: confidence_below_threshold_0.85"
    );
}

#[test]
fn evaluate_refuses_out_of_range_context() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = write_context(&dir, 3.0);

    oci(&dir)
        .args(["evaluate", ctx.as_str()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("INVALID_CONTEXT"));
}

#[test]
fn config_check_rejects_out_of_range_threshold() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = dir.path().join("bad.yaml");
    fs::write(&cfg, "degraded_weight: 1.3\n").unwrap();

    oci(&dir)
        .args(["config-check", "--config", cfg.to_str().unwrap()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("CONFIG_OUT_OF_RANGE"));
}

#[test]
fn config_check_rejects_out_of_range_env_override() {
    let dir = tempfile::tempdir().unwrap();

    oci(&dir)
        .env("ONCHAIN_MIN_CONFIDENCE", "-0.2")
        .arg("config-check")
        .assert()
        .failure()
        .stderr(predicate::str::contains("min_confidence"));
}

#[test]
fn config_check_prints_hashes() {
    let dir = tempfile::tempdir().unwrap();

    oci(&dir)
        .arg("config-check")
        .assert()
        .success()
        .stdout(predicate::str::contains("policy_hash="))
        .stdout(predicate::str::contains("config_hash="));
}

#[test]
fn audit_record_round_trips_through_verify() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = write_context(&dir, 0.8);

    let out = oci(&dir)
        .args(["evaluate", ctx.as_str(), "--audit"])
        .output()
        .unwrap();
    assert!(out.status.success());
    let record_path = dir.path().join("record.json");
    fs::write(&record_path, &out.stdout).unwrap();

    oci(&dir)
        .args(["verify-audit", record_path.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("verified=true"));

    let mut tampered: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    tampered["output_snapshot"]["state"] = json!("DEGRADED");
    fs::write(&record_path, tampered.to_string()).unwrap();

    oci(&dir)
        .args(["verify-audit", record_path.to_str().unwrap()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("AUDIT_INTEGRITY_BROKEN"));
}

#[test]
fn dotenv_file_in_working_dir_is_loaded() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = write_context(&dir, 0.8);
    fs::write(dir.path().join(".env"), "ONCHAIN_MIN_CONFIDENCE=0.95\n").unwrap();

    let out = oci(&dir).args(["evaluate", ctx.as_str()]).output().unwrap();
    assert!(out.status.success());

    let v: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(v["state"], "BLOCKED");
    assert_eq!(
        v["usage_policy"]["notes"],
        "Data blocked: confidence_below_threshold_0.95"
    );
}

#[test]
fn log_level_defaults_to_info_and_follows_onchain_log_level() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = write_context(&dir, 0.8);

    oci(&dir)
        .args(["evaluate", ctx.as_str()])
        .assert()
        .success()
        .stderr(predicate::str::contains("kill switch evaluation completed"));

    oci(&dir)
        .env("ONCHAIN_LOG_LEVEL", "warn")
        .args(["evaluate", ctx.as_str()])
        .assert()
        .success()
        .stderr(predicate::str::contains("kill switch evaluation completed").not());
}

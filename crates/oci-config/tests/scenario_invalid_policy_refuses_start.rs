//! Out-of-range thresholds fail loading; nothing is clamped.

use oci_config::{load_settings_from_strings, validate_policy};
use oci_killswitch::ThresholdPolicy;

fn no_env(_: &str) -> Option<String> {
    None
}

fn load_err(yaml: &str) -> String {
    load_settings_from_strings(&[yaml], no_env)
        .unwrap_err()
        .to_string()
}

#[test]
fn fractional_thresholds_above_one_are_rejected() {
    for key in [
        "min_confidence",
        "stability_threshold",
        "completeness_threshold",
        "normal_weight",
        "degraded_weight",
    ] {
        let err = load_err(&format!("{key}: 1.5\n"));
        assert!(err.contains("CONFIG_OUT_OF_RANGE"), "{key}: {err}");
        assert!(err.contains(key), "{key}: {err}");
    }
}

#[test]
fn negative_fraction_is_rejected() {
    let err = load_err("degraded_weight: -0.1\n");
    assert!(err.contains("degraded_weight"), "{err}");
}

#[test]
fn zero_data_age_is_rejected() {
    let err = load_err("max_data_age_hours: 0\n");
    assert!(err.contains("max_data_age_hours"), "{err}");
}

#[test]
fn negative_conflict_count_is_rejected() {
    // u32 cannot hold it; surfaces as a type error
    assert!(load_settings_from_strings(&["max_conflicting_signals: -1\n"], no_env).is_err());
}

#[test]
fn boundaries_are_accepted() {
    let p = ThresholdPolicy {
        min_confidence: 0.0,
        stability_threshold: 1.0,
        completeness_threshold: 0.0,
        max_data_age_hours: 0.01,
        max_conflicting_signals: 0,
        normal_weight: 1.0,
        degraded_weight: 0.0,
    };
    validate_policy(&p).unwrap();
}

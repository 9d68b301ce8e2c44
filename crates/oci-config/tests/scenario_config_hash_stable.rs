//! Config and policy hashes are deterministic and change with content.

use oci_config::{load_settings_from_strings, policy_hash};
use oci_killswitch::ThresholdPolicy;

fn no_env(_: &str) -> Option<String> {
    None
}

#[test]
fn same_input_produces_identical_hash() {
    let a = load_settings_from_strings(&["min_confidence: 0.65\n"], no_env).unwrap();
    let b = load_settings_from_strings(&["min_confidence: 0.65\n"], no_env).unwrap();
    assert_eq!(a.config_hash, b.config_hash);
    assert_eq!(a.canonical_json, b.canonical_json);
    assert_eq!(a.policy_hash, b.policy_hash);
}

#[test]
fn reordered_keys_produce_same_hash() {
    let a = load_settings_from_strings(&["min_confidence: 0.65\nnormal_weight: 0.9\n"], no_env)
        .unwrap();
    let b = load_settings_from_strings(&["normal_weight: 0.9\nmin_confidence: 0.65\n"], no_env)
        .unwrap();
    assert_eq!(a.config_hash, b.config_hash);
}

#[test]
fn different_threshold_changes_both_hashes() {
    let a = load_settings_from_strings(&[], no_env).unwrap();
    let b = load_settings_from_strings(&["stability_threshold: 0.71\n"], no_env).unwrap();
    assert_ne!(a.config_hash, b.config_hash);
    assert_ne!(a.policy_hash, b.policy_hash);
}

#[test]
fn log_level_changes_config_hash_but_not_policy_hash() {
    let a = load_settings_from_strings(&[], no_env).unwrap();
    let b = load_settings_from_strings(&["log_level: debug\n"], no_env).unwrap();
    assert_ne!(a.config_hash, b.config_hash);
    assert_eq!(a.policy_hash, b.policy_hash);
}

#[test]
fn policy_hash_matches_loaded_policy() {
    let a = load_settings_from_strings(&[], no_env).unwrap();
    assert_eq!(a.policy_hash, policy_hash(&ThresholdPolicy::default()).unwrap());
    assert_eq!(a.policy_hash.len(), 64);
}

#[test]
fn canonical_json_has_sorted_keys() {
    let a = load_settings_from_strings(&[], no_env).unwrap();
    assert!(a.canonical_json.starts_with(r#"{"bind_addr":"#), "{}", a.canonical_json);
}

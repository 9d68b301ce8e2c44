//! Settings loading for the OnChain Intelligence service.
//!
//! Layers, lowest precedence first:
//! 1. built-in defaults (`Settings::default()`)
//! 2. YAML documents, deep-merged in order
//! 3. `ONCHAIN_*` environment variables
//!
//! The result is range-checked before it is returned. An invalid threshold is
//! a startup error; nothing is clamped.

use anyhow::{bail, Context, Result};
use oci_killswitch::ThresholdPolicy;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;

/// Prefix for environment overrides (`ONCHAIN_MIN_CONFIDENCE`, ...).
pub const ENV_PREFIX: &str = "ONCHAIN_";

/// Every key a settings document may contain. Anything else is rejected.
pub const KNOWN_KEYS: &[&str] = &[
    "min_confidence",
    "stability_threshold",
    "completeness_threshold",
    "max_data_age_hours",
    "max_conflicting_signals",
    "normal_weight",
    "degraded_weight",
    "log_level",
    "bind_addr",
];

pub const DEFAULT_LOG_LEVEL: &str = "info";
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8000";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(flatten)]
    pub policy: ThresholdPolicy,
    pub log_level: String,
    pub bind_addr: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            policy: ThresholdPolicy::default(),
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoadedSettings {
    pub settings: Settings,
    pub canonical_json: String,
    /// SHA-256 of `canonical_json`.
    pub config_hash: String,
    /// SHA-256 of the threshold policy alone (see [`policy_hash`]).
    pub policy_hash: String,
}

/// Load YAML files in merge order, then apply process environment overrides.
pub fn load_settings(paths: &[&str]) -> Result<LoadedSettings> {
    let mut docs: Vec<String> = Vec::new();
    for p in paths {
        let raw =
            fs::read_to_string(p).with_context(|| format!("failed to read yaml path: {p}"))?;
        docs.push(raw);
    }

    let doc_refs: Vec<&str> = docs.iter().map(|s| s.as_str()).collect();
    load_settings_from_strings(&doc_refs, |k| std::env::var(k).ok())
}

/// Same as [`load_settings`] but with in-memory documents and an injectable
/// environment lookup (tests never touch the process environment).
pub fn load_settings_from_strings<F>(yaml_docs: &[&str], env: F) -> Result<LoadedSettings>
where
    F: Fn(&str) -> Option<String>,
{
    let mut merged =
        serde_json::to_value(Settings::default()).context("default settings serialize failed")?;

    for raw in yaml_docs {
        let v_yaml: serde_yaml::Value = serde_yaml::from_str(raw).context("invalid yaml")?;
        let v_json = serde_json::to_value(v_yaml).context("yaml->json conversion failed")?;
        match v_json {
            // empty document
            Value::Null => continue,
            Value::Object(_) => merged = deep_merge(merged, v_json),
            _ => bail!("CONFIG_INVALID: settings document must be a mapping"),
        }
    }

    reject_unknown_keys(&merged)?;

    if let Value::Object(map) = &mut merged {
        for key in KNOWN_KEYS {
            let var = env_var_name(key);
            if let Some(raw) = env(&var) {
                map.insert(key.to_string(), parse_env_value(&raw));
            }
        }
    }

    let settings: Settings =
        serde_json::from_value(merged).context("CONFIG_INVALID: settings have wrong types")?;
    validate_policy(&settings.policy)?;

    let canonical_json = canonicalize_json(&serde_json::to_value(&settings)?)?;
    let config_hash = sha256_hex(canonical_json.as_bytes());
    let policy_hash = policy_hash(&settings.policy)?;

    Ok(LoadedSettings {
        settings,
        canonical_json,
        config_hash,
        policy_hash,
    })
}

/// Range-check every threshold.
///
/// Fractional thresholds and weights: finite, in [0, 1].
/// `max_data_age_hours`: finite, > 0.
pub fn validate_policy(p: &ThresholdPolicy) -> Result<()> {
    unit_interval("min_confidence", p.min_confidence)?;
    unit_interval("stability_threshold", p.stability_threshold)?;
    unit_interval("completeness_threshold", p.completeness_threshold)?;
    unit_interval("normal_weight", p.normal_weight)?;
    unit_interval("degraded_weight", p.degraded_weight)?;

    if !(p.max_data_age_hours.is_finite() && p.max_data_age_hours > 0.0) {
        bail!(
            "CONFIG_OUT_OF_RANGE field=max_data_age_hours value={} (must be > 0)",
            p.max_data_age_hours
        );
    }
    Ok(())
}

fn unit_interval(field: &str, v: f64) -> Result<()> {
    if !(v.is_finite() && (0.0..=1.0).contains(&v)) {
        bail!("CONFIG_OUT_OF_RANGE field={} value={} (must be in [0, 1])", field, v);
    }
    Ok(())
}

/// Hash of the seven thresholds only. This is the `config_hash` carried by
/// audit records: two deployments with the same thresholds classify the same.
pub fn policy_hash(p: &ThresholdPolicy) -> Result<String> {
    let v = serde_json::to_value(p).context("policy serialize failed")?;
    Ok(sha256_hex(canonicalize_json(&v)?.as_bytes()))
}

pub fn env_var_name(key: &str) -> String {
    format!("{}{}", ENV_PREFIX, key.to_ascii_uppercase())
}

/// Environment values are JSON scalars when they parse as one (`0.6`, `2`,
/// `true`), otherwise plain strings.
fn parse_env_value(raw: &str) -> Value {
    let t = raw.trim();
    match serde_json::from_str::<Value>(t) {
        Ok(v @ (Value::Number(_) | Value::Bool(_))) => v,
        _ => Value::String(t.to_string()),
    }
}

fn reject_unknown_keys(v: &Value) -> Result<()> {
    let mut leaves = Vec::new();
    collect_leaf_pointers(v, "", &mut leaves);

    let mut unknown: Vec<String> = leaves
        .into_iter()
        .filter(|p| !KNOWN_KEYS.iter().any(|k| p.as_str() == format!("/{k}")))
        .collect();
    unknown.sort();
    unknown.dedup();

    if !unknown.is_empty() {
        bail!(
            "CONFIG_UNKNOWN_KEYS: {} unknown settings key(s): {:?}",
            unknown.len(),
            unknown
        );
    }
    Ok(())
}

fn collect_leaf_pointers(v: &Value, prefix: &str, out: &mut Vec<String>) {
    match v {
        Value::Object(map) => {
            for (k, vv) in map.iter() {
                let next = format!("{}/{}", prefix, escape_pointer_token(k));
                collect_leaf_pointers(vv, &next, out);
            }
        }
        Value::Array(arr) => {
            for (i, vv) in arr.iter().enumerate() {
                let next = format!("{}/{}", prefix, i);
                collect_leaf_pointers(vv, &next, out);
            }
        }
        _ => {
            let p = if prefix.is_empty() {
                "/".to_string()
            } else {
                prefix.to_string()
            };
            out.push(p);
        }
    }
}

fn escape_pointer_token(s: &str) -> String {
    s.replace('~', "~0").replace('/', "~1")
}

fn deep_merge(a: Value, b: Value) -> Value {
    match (a, b) {
        (Value::Object(mut a_map), Value::Object(b_map)) => {
            for (k, b_val) in b_map {
                let a_val = a_map.remove(&k).unwrap_or(Value::Null);
                a_map.insert(k, deep_merge(a_val, b_val));
            }
            Value::Object(a_map)
        }
        (_, b_other) => b_other,
    }
}

/// Compact JSON with object keys sorted at every level.
fn canonicalize_json(v: &Value) -> Result<String> {
    serde_json::to_string(&sorted(v)).context("canonical json serialize failed")
}

fn sorted(v: &Value) -> Value {
    match v {
        Value::Object(map) => {
            let ordered: BTreeMap<&String, Value> =
                map.iter().map(|(k, vv)| (k, sorted(vv))).collect();
            let mut out = Map::new();
            for (k, vv) in ordered {
                out.insert(k.clone(), vv);
            }
            Value::Object(out)
        }
        Value::Array(arr) => Value::Array(arr.iter().map(sorted).collect()),
        other => other.clone(),
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

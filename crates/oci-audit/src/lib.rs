//! Reproducibility records for kill switch evaluations.
//!
//! A record binds the exact input, the threshold policy and the produced
//! output together under one hash so an evaluation can be re-checked later.
//! Records are returned to the caller; this crate stores nothing.

use anyhow::{Context, Result};
use oci_killswitch::{AssembledContext, EvaluationContext, ThresholdPolicy};
use serde::{Deserialize, Serialize};
use serde_json::{json, Number, Value};
use sha2::{Digest, Sha256};

/// Floats are rounded to this many decimal places before hashing.
pub const HASH_FLOAT_DECIMALS: i32 = 8;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub asset: String,
    pub timeframe: String,
    /// Input timestamp as received.
    #[serde(default)]
    pub timestamp: Value,
    pub input_data_hash: String,
    /// `oci_config::policy_hash` of `policy`.
    pub config_hash: String,
    pub calculation_hash: String,
    pub policy: ThresholdPolicy,
    pub output_snapshot: Value,
}

/// Build the audit record for one evaluation.
pub fn record_calculation(
    input: &EvaluationContext,
    output: &AssembledContext,
    policy: &ThresholdPolicy,
) -> Result<AuditRecord> {
    let input_value = serde_json::to_value(input).context("serialize evaluation input failed")?;
    let input_data_hash = hash_normalized(&input_value)?;
    let config_hash = oci_config::policy_hash(policy)?;
    let output_snapshot =
        serde_json::to_value(output).context("serialize evaluation output failed")?;

    let mut record = AuditRecord {
        asset: input.asset.clone(),
        timeframe: input.timeframe.clone(),
        timestamp: input.timestamp.clone(),
        input_data_hash,
        config_hash,
        calculation_hash: String::new(),
        policy: policy.clone(),
        output_snapshot,
    };
    record.calculation_hash = compute_calculation_hash(&record)?;
    Ok(record)
}

/// Hash over everything in the record except `calculation_hash` itself.
pub fn compute_calculation_hash(record: &AuditRecord) -> Result<String> {
    let calculation = json!({
        "asset": record.asset,
        "timeframe": record.timeframe,
        "timestamp": record.timestamp,
        "input_hash": record.input_data_hash,
        "config": serde_json::to_value(&record.policy).context("serialize policy failed")?,
        "output": record.output_snapshot,
    });
    hash_normalized(&calculation)
}

/// Recompute both derived hashes and compare against the stored ones.
pub fn verify_calculation_integrity(record: &AuditRecord) -> Result<VerifyResult> {
    let config_hash = oci_config::policy_hash(&record.policy)?;
    if config_hash != record.config_hash {
        return Ok(VerifyResult::Broken {
            reason: format!(
                "config_hash mismatch: claimed {}, recomputed {}",
                record.config_hash, config_hash
            ),
        });
    }

    let recomputed = compute_calculation_hash(record)?;
    if recomputed != record.calculation_hash {
        return Ok(VerifyResult::Broken {
            reason: format!(
                "calculation_hash mismatch: claimed {}, recomputed {}",
                record.calculation_hash, recomputed
            ),
        });
    }

    Ok(VerifyResult::Valid)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum VerifyResult {
    Valid,
    Broken { reason: String },
}

impl VerifyResult {
    pub fn is_valid(&self) -> bool {
        matches!(self, VerifyResult::Valid)
    }
}

/// SHA-256 hex of the normalized, compact JSON form of `v`.
pub fn hash_normalized(v: &Value) -> Result<String> {
    let canonical =
        serde_json::to_string(&normalize_for_hash(v)).context("json stringify failed")?;
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

/// Sort object keys recursively and round floats, so that equal data hashes
/// equally regardless of key order or float noise past 8 decimals.
fn normalize_for_hash(v: &Value) -> Value {
    match v {
        Value::Object(map) => {
            let mut keys: Vec<_> = map.keys().cloned().collect();
            keys.sort();
            let mut new = serde_json::Map::new();
            for k in keys {
                new.insert(k.clone(), normalize_for_hash(&map[&k]));
            }
            Value::Object(new)
        }
        Value::Array(arr) => Value::Array(arr.iter().map(normalize_for_hash).collect()),
        Value::Number(n) if n.is_f64() => n
            .as_f64()
            .and_then(|f| Number::from_f64(round_to(f, HASH_FLOAT_DECIMALS)))
            .map(Value::Number)
            .unwrap_or_else(|| v.clone()),
        _ => v.clone(),
    }
}

fn round_to(f: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    (f * scale).round() / scale
}

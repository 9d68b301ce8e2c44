use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Product identifier stamped on every assembled context.
pub const PRODUCT: &str = "onchain_intelligence";

/// Payload schema version stamped on every assembled context.
pub const PRODUCT_VERSION: &str = "1.0.0";

pub const DEFAULT_ASSET: &str = "BTC";
pub const DEFAULT_TIMEFRAME: &str = "1d";

/// Immutable thresholds the kill switch classifies against.
///
/// Built once at startup by the settings layer (which also range-checks it)
/// and shared read-only for the life of the process.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ThresholdPolicy {
    /// confidence below this => BLOCKED.
    pub min_confidence: f64,
    /// stability_score below this => DEGRADED.
    pub stability_threshold: f64,
    /// data_completeness below this => DEGRADED.
    pub completeness_threshold: f64,
    /// Score older than this many hours => data_lag.
    pub max_data_age_hours: f64,
    /// More conflicting detector outputs than this => signal_conflict.
    pub max_conflicting_signals: u32,
    /// recommended_weight when ACTIVE.
    pub normal_weight: f64,
    /// recommended_weight when DEGRADED.
    pub degraded_weight: f64,
}

impl Default for ThresholdPolicy {
    fn default() -> Self {
        Self {
            min_confidence: 0.60,
            stability_threshold: 0.70,
            completeness_threshold: 0.80,
            max_data_age_hours: 2.0,
            max_conflicting_signals: 2,
            normal_weight: 1.0,
            degraded_weight: 0.3,
        }
    }
}

/// Classification outcome. Ordered by severity: `Active < Degraded < Blocked`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum State {
    Active,
    Degraded,
    Blocked,
}

impl State {
    pub fn as_str(&self) -> &'static str {
        match self {
            State::Active => "ACTIVE",
            State::Degraded => "DEGRADED",
            State::Blocked => "BLOCKED",
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Upstream verification results, kept exactly as received so the output can
/// echo them (unknown upstream keys included).
///
/// Read resolved values through the accessors: absent fields resolve to the
/// failing value (`false` / `0.0`).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct VerificationRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invariants_passed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deterministic: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stability_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_completeness: Option<f64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl VerificationRecord {
    pub fn new(
        invariants_passed: bool,
        deterministic: bool,
        stability_score: f64,
        data_completeness: f64,
    ) -> Self {
        Self {
            invariants_passed: Some(invariants_passed),
            deterministic: Some(deterministic),
            stability_score: Some(stability_score),
            data_completeness: Some(data_completeness),
            extra: Map::new(),
        }
    }

    pub fn invariants_passed(&self) -> bool {
        self.invariants_passed.unwrap_or(false)
    }

    pub fn deterministic(&self) -> bool {
        self.deterministic.unwrap_or(false)
    }

    pub fn stability_score(&self) -> f64 {
        self.stability_score.unwrap_or(0.0)
    }

    pub fn data_completeness(&self) -> f64 {
        self.data_completeness.unwrap_or(0.0)
    }
}

/// Upstream risk flags, kept exactly as received so the output can echo them
/// (unknown upstream keys included).
///
/// Use the accessor methods to read resolved values: `data_lag` resolves to
/// `true` when absent, the others to `false`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskFlags {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_lag: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signal_conflict: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anomaly_detected: Option<bool>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl RiskFlags {
    pub fn new(data_lag: bool, signal_conflict: bool) -> Self {
        Self {
            data_lag: Some(data_lag),
            signal_conflict: Some(signal_conflict),
            anomaly_detected: None,
            extra: Map::new(),
        }
    }

    /// Absent means stale.
    pub fn data_lag(&self) -> bool {
        self.data_lag.unwrap_or(true)
    }

    pub fn signal_conflict(&self) -> bool {
        self.signal_conflict.unwrap_or(false)
    }

    pub fn anomaly_detected(&self) -> bool {
        self.anomaly_detected.unwrap_or(false)
    }
}

/// Decision payload handed to downstream consumers.
///
/// Only `onchain_score` is ever rewritten (nulled when BLOCKED). `confidence`
/// and every extra field (bias, explanations) pass through untouched.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DecisionContext {
    #[serde(default)]
    pub onchain_score: Option<f64>,
    #[serde(default)]
    pub confidence: f64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl DecisionContext {
    pub fn new(onchain_score: Option<f64>, confidence: f64) -> Self {
        Self {
            onchain_score,
            confidence,
            extra: Map::new(),
        }
    }

    pub fn with_field(mut self, key: &str, value: Value) -> Self {
        self.extra.insert(key.to_string(), value);
        self
    }
}

/// One request's worth of input to the kill switch.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EvaluationContext {
    #[serde(default = "default_asset")]
    pub asset: String,
    #[serde(default = "default_timeframe")]
    pub timeframe: String,
    /// Echoed as received (any format, original offset kept).
    #[serde(default)]
    pub timestamp: Value,
    #[serde(default, deserialize_with = "null_as_default")]
    pub verification: VerificationRecord,
    #[serde(default, deserialize_with = "null_as_default")]
    pub risk_flags: RiskFlags,
    #[serde(default, deserialize_with = "null_as_default")]
    pub decision_context: DecisionContext,
    /// Opaque detector outputs, passed through unchanged.
    #[serde(default = "empty_object")]
    pub signals: Value,
}

impl EvaluationContext {
    pub fn new<A: Into<String>, T: Into<String>>(asset: A, timeframe: T) -> Self {
        Self {
            asset: asset.into(),
            timeframe: timeframe.into(),
            timestamp: Value::Null,
            verification: VerificationRecord::default(),
            risk_flags: RiskFlags::default(),
            decision_context: DecisionContext::default(),
            signals: empty_object(),
        }
    }
}

fn default_asset() -> String {
    DEFAULT_ASSET.to_string()
}

fn default_timeframe() -> String {
    DEFAULT_TIMEFRAME.to_string()
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

/// `null` is treated like an absent field.
fn null_as_default<'de, D, T>(d: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(d)?.unwrap_or_default())
}

/// State plus every reason that fired in the winning tier, in rule order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub state: State,
    pub reasons: Vec<String>,
}

impl Classification {
    pub fn active() -> Self {
        Self {
            state: State::Active,
            reasons: Vec::new(),
        }
    }
}

/// Machine-readable instructions for the consumer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UsagePolicy {
    pub allowed: bool,
    pub recommended_weight: f64,
    pub notes: String,
}

/// Final payload. Field order is fixed so serialization is byte-stable.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AssembledContext {
    pub product: String,
    pub version: String,
    pub asset: String,
    pub timeframe: String,
    pub timestamp: Value,
    pub state: State,
    pub decision_context: DecisionContext,
    pub signals: Value,
    pub risk_flags: RiskFlags,
    pub verification: VerificationRecord,
    pub usage_policy: UsagePolicy,
}

//! Request and response types for the oci-daemon HTTP endpoints that are not
//! already defined by `oci-killswitch` / `oci-audit`.
//!
//! No business logic lives here.

use chrono::{DateTime, Utc};
use oci_killswitch::{RiskObservation, ThresholdPolicy};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// /v1/health
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub service: String,
    pub product: String,
    pub version: String,
    pub uptime_secs: u64,
}

// ---------------------------------------------------------------------------
// /v1/policy
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyResponse {
    pub policy: ThresholdPolicy,
    pub policy_hash: String,
}

// ---------------------------------------------------------------------------
// /v1/onchain/risk-flags
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskFlagsRequest {
    #[serde(flatten)]
    pub observation: RiskObservation,
    /// Evaluation instant; server clock when absent.
    #[serde(default)]
    pub now: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Errors (400 / 422 / 500)
// ---------------------------------------------------------------------------

/// Body of every non-2xx response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    /// Offending request field, when one can be named.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

//! Shared runtime state for oci-daemon.
//!
//! Handlers receive `State<Arc<AppState>>` from Axum. Everything in here is
//! read-only after boot except the broadcast bus, which is internally
//! synchronized.

use std::sync::Arc;
use std::time::Duration;

use oci_config::LoadedSettings;
use oci_killswitch::{State as GateState, ThresholdPolicy};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// BusMsg: SSE event bus payload
// ---------------------------------------------------------------------------

/// Messages broadcast over the internal event bus and surfaced as SSE events.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BusMsg {
    Heartbeat { ts_millis: i64 },
    Evaluation(EvaluationEvent),
}

/// Summary of one kill switch evaluation, as seen by stream subscribers.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EvaluationEvent {
    pub evaluation_id: Uuid,
    pub asset: String,
    pub timeframe: String,
    pub state: GateState,
    pub allowed: bool,
    pub recommended_weight: f64,
    pub reasons: Vec<String>,
}

// ---------------------------------------------------------------------------
// BuildInfo
// ---------------------------------------------------------------------------

/// Static build metadata included in health responses.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BuildInfo {
    pub service: &'static str,
    pub version: &'static str,
}

// ---------------------------------------------------------------------------
// AppState
// ---------------------------------------------------------------------------

/// Cloneable (Arc) handle shared across all Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Broadcast bus for SSE.
    pub bus: broadcast::Sender<BusMsg>,
    /// Static build metadata.
    pub build: BuildInfo,
    /// Threshold policy, fixed for the process lifetime.
    pub policy: Arc<ThresholdPolicy>,
    pub policy_hash: String,
}

impl AppState {
    /// Build state from an explicit policy. Refuses an out-of-range policy.
    pub fn new(policy: ThresholdPolicy) -> anyhow::Result<Self> {
        oci_config::validate_policy(&policy)?;
        let policy_hash = oci_config::policy_hash(&policy)?;
        Ok(Self::with_hash(policy, policy_hash))
    }

    /// Build state from settings that have already been loaded and validated.
    pub fn from_loaded(loaded: &LoadedSettings) -> Self {
        Self::with_hash(loaded.settings.policy.clone(), loaded.policy_hash.clone())
    }

    fn with_hash(policy: ThresholdPolicy, policy_hash: String) -> Self {
        let (bus, _rx) = broadcast::channel::<BusMsg>(1024);
        Self {
            bus,
            build: BuildInfo {
                service: "oci-daemon",
                version: env!("CARGO_PKG_VERSION"),
            },
            policy: Arc::new(policy),
            policy_hash,
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Monotonically increasing uptime since first call (process lifetime).
pub fn uptime_secs() -> u64 {
    static START: std::sync::OnceLock<std::time::Instant> = std::sync::OnceLock::new();
    START
        .get_or_init(std::time::Instant::now)
        .elapsed()
        .as_secs()
}

/// Spawn a background task that emits a heartbeat SSE every `interval`.
pub fn spawn_heartbeat(bus: broadcast::Sender<BusMsg>, interval: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let ts = chrono::Utc::now().timestamp_millis();
            let _ = bus.send(BusMsg::Heartbeat { ts_millis: ts });
        }
    });
}

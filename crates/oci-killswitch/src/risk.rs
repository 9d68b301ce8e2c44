use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{RiskFlags, ThresholdPolicy};

/// Raw facts about the latest computed score, as reported by the signal
/// pipeline. Turned into [`RiskFlags`] by [`derive_risk_flags`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskObservation {
    /// When the score was computed. `None` => age unknown => stale.
    #[serde(default)]
    pub score_timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub conflicting_signals: u32,
    #[serde(default)]
    pub unresolved_anomalies: u32,
}

/// Derive risk flags from an observation at wall-clock `now` (caller supplied).
///
/// - data_lag: score age in hours > `max_data_age_hours`, or no timestamp
/// - signal_conflict: conflicting_signals > `max_conflicting_signals`
/// - anomaly_detected: any unresolved anomaly
pub fn derive_risk_flags(
    obs: &RiskObservation,
    now: DateTime<Utc>,
    policy: &ThresholdPolicy,
) -> RiskFlags {
    let data_lag = match obs.score_timestamp {
        Some(ts) => {
            // Future timestamps count as fresh (age 0).
            let age_ms = (now - ts).num_milliseconds().max(0);
            let age_hours = age_ms as f64 / 3_600_000.0;
            age_hours > policy.max_data_age_hours
        }
        None => true,
    };

    RiskFlags {
        data_lag: Some(data_lag),
        signal_conflict: Some(obs.conflicting_signals > policy.max_conflicting_signals),
        anomaly_detected: Some(obs.unresolved_anomalies > 0),
        ..RiskFlags::default()
    }
}

use crate::{Classification, State, ThresholdPolicy, UsagePolicy};

/// Map a classification to the usage policy consumers act on.
pub fn build_usage_policy(
    classification: &Classification,
    policy: &ThresholdPolicy,
) -> UsagePolicy {
    match classification.state {
        State::Blocked => UsagePolicy {
            allowed: false,
            recommended_weight: 0.0,
            notes: format!("Data blocked: {}", classification.reasons.join(", ")),
        },
        State::Degraded => UsagePolicy {
            allowed: true,
            recommended_weight: policy.degraded_weight,
            notes: format!("Data quality degraded: {}", classification.reasons.join(", ")),
        },
        State::Active => UsagePolicy {
            allowed: true,
            recommended_weight: policy.normal_weight,
            notes: "Data quality acceptable for normal usage".to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classified(state: State, reasons: &[&str]) -> Classification {
        Classification {
            state,
            reasons: reasons.iter().map(|r| r.to_string()).collect(),
        }
    }

    #[test]
    fn blocked_is_never_allowed() {
        let up = build_usage_policy(
            &classified(State::Blocked, &["invariants_failed", "data_lag_exceeded"]),
            &ThresholdPolicy::default(),
        );
        assert!(!up.allowed);
        assert_eq!(up.recommended_weight, 0.0);
        assert_eq!(up.notes, "Data blocked: invariants_failed, data_lag_exceeded");
    }

    #[test]
    fn degraded_uses_degraded_weight() {
        let policy = ThresholdPolicy {
            degraded_weight: 0.25,
            ..ThresholdPolicy::default()
        };
        let up = build_usage_policy(
            &classified(State::Degraded, &["signal_conflicts_detected"]),
            &policy,
        );
        assert!(up.allowed);
        assert_eq!(up.recommended_weight, 0.25);
        assert_eq!(up.notes, "Data quality degraded: signal_conflicts_detected");
    }

    #[test]
    fn active_uses_normal_weight() {
        let up = build_usage_policy(&Classification::active(), &ThresholdPolicy::default());
        assert!(up.allowed);
        assert_eq!(up.recommended_weight, 1.0);
        assert_eq!(up.notes, "Data quality acceptable for normal usage");
    }
}

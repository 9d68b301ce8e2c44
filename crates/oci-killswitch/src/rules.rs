use crate::{Classification, RiskFlags, State, ThresholdPolicy, VerificationRecord};

/// Resolved inputs the rules look at. Absent-field defaults have already been
/// applied by the time one of these exists.
#[derive(Clone, Copy, Debug, PartialEq)]
struct Inputs {
    invariants_passed: bool,
    deterministic: bool,
    stability_score: f64,
    data_completeness: f64,
    confidence: f64,
    data_lag: bool,
    signal_conflict: bool,
}

/// One predicate -> reason pair.
pub struct Rule {
    /// Stable identifier (reason prefix for threshold rules).
    pub id: &'static str,
    fires: fn(&Inputs, &ThresholdPolicy) -> bool,
    reason: fn(&ThresholdPolicy) -> String,
}

/// A severity tier: if any rule fires, the tier's state wins.
pub struct Tier {
    pub state: State,
    pub rules: &'static [Rule],
}

pub static BLOCKED_RULES: &[Rule] = &[
    Rule {
        id: "invariants_failed",
        fires: invariants_failed,
        reason: |_| "invariants_failed".to_string(),
    },
    Rule {
        id: "data_lag_exceeded",
        fires: data_lag_exceeded,
        reason: |_| "data_lag_exceeded".to_string(),
    },
    Rule {
        id: "confidence_below_threshold",
        fires: confidence_below,
        reason: |p| threshold_reason("confidence_below_threshold", p.min_confidence),
    },
    Rule {
        id: "non_deterministic_calculation",
        fires: non_deterministic,
        reason: |_| "non_deterministic_calculation".to_string(),
    },
];

pub static DEGRADED_RULES: &[Rule] = &[
    Rule {
        id: "stability_below_threshold",
        fires: stability_below,
        reason: |p| threshold_reason("stability_below_threshold", p.stability_threshold),
    },
    Rule {
        id: "completeness_below_threshold",
        fires: completeness_below,
        reason: |p| threshold_reason("completeness_below_threshold", p.completeness_threshold),
    },
    Rule {
        id: "signal_conflicts_detected",
        fires: signal_conflict,
        reason: |_| "signal_conflicts_detected".to_string(),
    },
];

/// Tiers in precedence order. The first tier with any firing rule decides.
pub static TIERS: &[Tier] = &[
    Tier {
        state: State::Blocked,
        rules: BLOCKED_RULES,
    },
    Tier {
        state: State::Degraded,
        rules: DEGRADED_RULES,
    },
];

fn invariants_failed(i: &Inputs, _: &ThresholdPolicy) -> bool {
    !i.invariants_passed
}

fn data_lag_exceeded(i: &Inputs, _: &ThresholdPolicy) -> bool {
    i.data_lag
}

fn confidence_below(i: &Inputs, p: &ThresholdPolicy) -> bool {
    below(i.confidence, p.min_confidence)
}

fn non_deterministic(i: &Inputs, _: &ThresholdPolicy) -> bool {
    !i.deterministic
}

fn stability_below(i: &Inputs, p: &ThresholdPolicy) -> bool {
    below(i.stability_score, p.stability_threshold)
}

fn completeness_below(i: &Inputs, p: &ThresholdPolicy) -> bool {
    below(i.data_completeness, p.completeness_threshold)
}

fn signal_conflict(i: &Inputs, _: &ThresholdPolicy) -> bool {
    i.signal_conflict
}

/// `value < threshold`, except NaN also counts as below.
#[allow(clippy::neg_cmp_op_on_partial_ord)]
fn below(value: f64, threshold: f64) -> bool {
    !(value >= threshold)
}

fn threshold_reason(prefix: &str, threshold: f64) -> String {
    format!("{}_{}", prefix, format_threshold(threshold))
}

/// Render a threshold for embedding in a reason token: shortest round-trip
/// decimal, always with a fractional part (`0.6`, `0.7`, `1.0`).
pub fn format_threshold(v: f64) -> String {
    let s = format!("{}", v);
    if v.is_finite() && !s.contains('.') {
        format!("{}.0", s)
    } else {
        s
    }
}

/// Classify quality/integrity signals against the policy.
///
/// Every rule of a tier is evaluated so the reason list is complete; the
/// DEGRADED tier is skipped entirely once the BLOCKED tier has fired.
pub fn evaluate_state(
    verification: &VerificationRecord,
    risk_flags: &RiskFlags,
    confidence: f64,
    policy: &ThresholdPolicy,
) -> Classification {
    let inputs = Inputs {
        invariants_passed: verification.invariants_passed(),
        deterministic: verification.deterministic(),
        stability_score: verification.stability_score(),
        data_completeness: verification.data_completeness(),
        confidence,
        data_lag: risk_flags.data_lag(),
        signal_conflict: risk_flags.signal_conflict(),
    };

    for tier in TIERS {
        let reasons: Vec<String> = tier
            .rules
            .iter()
            .filter(|r| (r.fires)(&inputs, policy))
            .map(|r| (r.reason)(policy))
            .collect();
        if !reasons.is_empty() {
            return Classification {
                state: tier.state,
                reasons,
            };
        }
    }

    Classification::active()
}

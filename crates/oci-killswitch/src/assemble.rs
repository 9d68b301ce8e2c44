use tracing::{info, warn};

use crate::{
    build_usage_policy, evaluate_state, AssembledContext, Classification, DecisionContext,
    EvaluationContext, State, ThresholdPolicy, UsagePolicy, PRODUCT, PRODUCT_VERSION,
};

/// Apply the state's consequences to the decision payload.
///
/// BLOCKED withholds the score; confidence and extra fields are kept so the
/// consumer can see why.
pub fn redact_for_state(mut decision: DecisionContext, state: State) -> DecisionContext {
    if state == State::Blocked {
        decision.onchain_score = None;
    }
    decision
}

/// Build the outgoing payload from the request, its classification and the
/// derived usage policy. Emits one audit event.
pub fn assemble_context(
    ctx: &EvaluationContext,
    classification: &Classification,
    usage_policy: UsagePolicy,
) -> AssembledContext {
    let state = classification.state;
    debug_assert!(state != State::Blocked || !usage_policy.allowed);

    if state == State::Blocked {
        warn!(
            asset = %ctx.asset,
            timeframe = %ctx.timeframe,
            state = %state,
            allowed = usage_policy.allowed,
            recommended_weight = usage_policy.recommended_weight,
            reasons = ?classification.reasons,
            "kill switch evaluation completed"
        );
    } else {
        info!(
            asset = %ctx.asset,
            timeframe = %ctx.timeframe,
            state = %state,
            allowed = usage_policy.allowed,
            recommended_weight = usage_policy.recommended_weight,
            reasons = ?classification.reasons,
            "kill switch evaluation completed"
        );
    }

    AssembledContext {
        product: PRODUCT.to_string(),
        version: PRODUCT_VERSION.to_string(),
        asset: ctx.asset.clone(),
        timeframe: ctx.timeframe.clone(),
        timestamp: ctx.timestamp.clone(),
        state,
        decision_context: redact_for_state(ctx.decision_context.clone(), state),
        signals: ctx.signals.clone(),
        risk_flags: ctx.risk_flags.clone(),
        verification: ctx.verification.clone(),
        usage_policy,
    }
}

/// Full pipeline, also returning the classification (reasons) for callers that
/// need them, e.g. audit records.
pub fn evaluate_with_classification(
    ctx: &EvaluationContext,
    policy: &ThresholdPolicy,
) -> (AssembledContext, Classification) {
    let classification = evaluate_state(
        &ctx.verification,
        &ctx.risk_flags,
        ctx.decision_context.confidence,
        policy,
    );
    let usage_policy = build_usage_policy(&classification, policy);
    let out = assemble_context(ctx, &classification, usage_policy);
    (out, classification)
}

/// Classify the request, derive its usage policy and assemble the output.
pub fn evaluate(ctx: &EvaluationContext, policy: &ThresholdPolicy) -> AssembledContext {
    evaluate_with_classification(ctx, policy).0
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn redaction_only_touches_score() {
        let d = DecisionContext::new(Some(72.5), 0.4).with_field("bias", json!("negative"));
        let blocked = redact_for_state(d.clone(), State::Blocked);
        assert_eq!(blocked.onchain_score, None);
        assert_eq!(blocked.confidence, 0.4);
        assert_eq!(blocked.extra.get("bias"), Some(&json!("negative")));

        assert_eq!(redact_for_state(d.clone(), State::Degraded), d);
        assert_eq!(redact_for_state(d.clone(), State::Active), d);
    }

    #[test]
    fn input_is_not_mutated() {
        let mut ctx = EvaluationContext::new("BTC", "1d");
        ctx.decision_context = DecisionContext::new(Some(60.0), 0.9);
        let before = ctx.clone();

        let out = evaluate(&ctx, &ThresholdPolicy::default());
        assert_eq!(out.state, State::Blocked);
        assert_eq!(out.decision_context.onchain_score, None);
        assert_eq!(ctx, before);
    }

    #[test]
    fn pass_through_fields_are_copied() {
        let ctx: EvaluationContext = serde_json::from_value(json!({
            "asset": "ETH",
            "timeframe": "4h",
            "timestamp": "2024-03-01T12:00:00Z",
            "signals": {"network_growth": true},
            "risk_flags": {"data_lag": false, "signal_conflict": false},
            "verification": {
                "invariants_passed": true,
                "deterministic": true,
                "stability_score": 0.95,
                "data_completeness": 0.99
            },
            "decision_context": {"onchain_score": 64.0, "confidence": 0.9, "bias": "positive"}
        }))
        .unwrap();

        let out = evaluate(&ctx, &ThresholdPolicy::default());
        assert_eq!(out.product, "onchain_intelligence");
        assert_eq!(out.version, "1.0.0");
        assert_eq!(out.asset, "ETH");
        assert_eq!(out.timeframe, "4h");
        assert_eq!(out.timestamp, ctx.timestamp);
        assert_eq!(out.signals, json!({"network_growth": true}));
        assert_eq!(out.risk_flags, ctx.risk_flags);
        assert_eq!(out.verification, ctx.verification);
        assert_eq!(out.decision_context, ctx.decision_context);
        assert_eq!(out.state, State::Active);
    }

    #[test]
    fn upstream_records_are_echoed_verbatim() {
        let raw = json!({
            "timestamp": "2024-01-15T02:00:00+02:00",
            "verification": {"invariants_passed": true, "calculated_at": "2024-01-15"},
            "risk_flags": {"data_lag": false, "signal_conflict": false, "whale_anomaly": true},
            "decision_context": {"onchain_score": 40.0, "confidence": 0.9}
        });
        let ctx: EvaluationContext = serde_json::from_value(raw.clone()).unwrap();

        let out = serde_json::to_value(evaluate(&ctx, &ThresholdPolicy::default())).unwrap();
        assert_eq!(out["timestamp"], raw["timestamp"]);
        assert_eq!(out["verification"], raw["verification"]);
        assert_eq!(out["risk_flags"], raw["risk_flags"]);
        // omitted deterministic still resolves to false
        assert_eq!(out["state"], "BLOCKED");
        assert!(out["decision_context"]["onchain_score"].is_null());
    }
}

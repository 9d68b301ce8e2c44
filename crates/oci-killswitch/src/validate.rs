//! Request validation in front of the kill switch.
//!
//! The engine assumes range-correct numbers. Callers (daemon, CLI) refuse
//! anything that fails here before evaluating it.

use crate::EvaluationContext;

#[derive(Debug, Clone, PartialEq)]
pub struct InvalidField {
    pub field: &'static str,
    pub message: String,
}

pub fn validate_context(ctx: &EvaluationContext) -> Result<(), InvalidField> {
    non_empty("asset", &ctx.asset)?;
    non_empty("timeframe", &ctx.timeframe)?;

    in_range(
        "verification.stability_score",
        ctx.verification.stability_score(),
        0.0,
        1.0,
    )?;
    in_range(
        "verification.data_completeness",
        ctx.verification.data_completeness(),
        0.0,
        1.0,
    )?;
    in_range(
        "decision_context.confidence",
        ctx.decision_context.confidence,
        0.0,
        1.0,
    )?;
    if let Some(score) = ctx.decision_context.onchain_score {
        in_range("decision_context.onchain_score", score, 0.0, 100.0)?;
    }
    Ok(())
}

fn non_empty(field: &'static str, v: &str) -> Result<(), InvalidField> {
    if v.trim().is_empty() {
        return Err(InvalidField {
            field,
            message: format!("{field} must not be empty"),
        });
    }
    Ok(())
}

fn in_range(field: &'static str, v: f64, lo: f64, hi: f64) -> Result<(), InvalidField> {
    if !(v.is_finite() && (lo..=hi).contains(&v)) {
        return Err(InvalidField {
            field,
            message: format!("{field}={v} out of range [{lo}, {hi}]"),
        });
    }
    Ok(())
}

//! oci-killswitch
//!
//! Kill switch for the OnChain Intelligence data product.
//!
//! Architectural decisions:
//! - Fail closed: anything that cannot be shown trustworthy is BLOCKED
//! - BLOCKED dominates DEGRADED (tier 2 is never evaluated once tier 1 fires)
//! - Absent `data_lag` means stale
//! - Redaction happens after classification, never inside the rules
//!
//! Pure deterministic logic. No IO, no wall-clock, no shared mutable state.
//! The only side effect is one `tracing` event per assembled evaluation.

mod assemble;
mod policy;
mod risk;
mod rules;
mod types;
mod validate;

pub use assemble::{assemble_context, evaluate, evaluate_with_classification, redact_for_state};
pub use policy::build_usage_policy;
pub use risk::{derive_risk_flags, RiskObservation};
pub use rules::{
    evaluate_state, format_threshold, Rule, Tier, BLOCKED_RULES, DEGRADED_RULES, TIERS,
};
pub use types::*;
pub use validate::{validate_context, InvalidField};

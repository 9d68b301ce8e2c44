//! Axum router and all HTTP handlers for oci-daemon.
//!
//! `build_router` is the single entry point; `main.rs` calls it and attaches
//! middleware layers. Handlers are `pub(crate)`; tests compose the router.

use std::{convert::Infallible, sync::Arc};

use axum::{
    extract::{rejection::JsonRejection, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use futures_util::{Stream, StreamExt};
use oci_killswitch::{
    derive_risk_flags, evaluate_with_classification, validate_context, AssembledContext,
    EvaluationContext, PRODUCT, PRODUCT_VERSION,
};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{error, info};
use uuid::Uuid;

use crate::{
    api_types::{ErrorResponse, HealthResponse, PolicyResponse, RiskFlagsRequest},
    state::{uptime_secs, AppState, BusMsg, EvaluationEvent},
};

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Build the complete application router wired to the given shared state.
///
/// Middleware layers (CORS, tracing) are **not** applied here; `main.rs`
/// attaches them after this call so tests can use the bare router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/health", get(health))
        .route("/v1/policy", get(policy_handler))
        .route("/v1/stream", get(stream))
        .route("/v1/onchain/context", post(onchain_context))
        .route("/v1/onchain/audit", post(onchain_audit))
        .route("/v1/onchain/risk-flags", post(onchain_risk_flags))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// GET /v1/health
// ---------------------------------------------------------------------------

pub(crate) async fn health(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            ok: true,
            service: st.build.service.to_string(),
            product: PRODUCT.to_string(),
            version: PRODUCT_VERSION.to_string(),
            uptime_secs: uptime_secs(),
        }),
    )
}

// ---------------------------------------------------------------------------
// GET /v1/policy
// ---------------------------------------------------------------------------

pub(crate) async fn policy_handler(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(PolicyResponse {
            policy: st.policy.as_ref().clone(),
            policy_hash: st.policy_hash.clone(),
        }),
    )
}

// ---------------------------------------------------------------------------
// POST /v1/onchain/context
// ---------------------------------------------------------------------------

/// Evaluate one context and return the gated payload.
///
/// 400/422 for bodies that fail parsing or range validation; the kill switch
/// only ever sees validated input.
pub(crate) async fn onchain_context(
    State(st): State<Arc<AppState>>,
    payload: Result<Json<EvaluationContext>, JsonRejection>,
) -> Response {
    let ctx = match accept(payload) {
        Ok(ctx) => ctx,
        Err(resp) => return resp,
    };

    let out = run_evaluation(&st, &ctx);
    (StatusCode::OK, Json(out)).into_response()
}

// ---------------------------------------------------------------------------
// POST /v1/onchain/audit
// ---------------------------------------------------------------------------

/// Evaluate one context and return its reproducibility record.
pub(crate) async fn onchain_audit(
    State(st): State<Arc<AppState>>,
    payload: Result<Json<EvaluationContext>, JsonRejection>,
) -> Response {
    let ctx = match accept(payload) {
        Ok(ctx) => ctx,
        Err(resp) => return resp,
    };

    let out = run_evaluation(&st, &ctx);
    match oci_audit::record_calculation(&ctx, &out, &st.policy) {
        Ok(record) => {
            info!(
                asset = %record.asset,
                calculation_hash = %record.calculation_hash,
                "audit record produced"
            );
            (StatusCode::OK, Json(record)).into_response()
        }
        Err(e) => {
            error!(error = %format!("{e:#}"), "audit record failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal error", None)
        }
    }
}

// ---------------------------------------------------------------------------
// POST /v1/onchain/risk-flags
// ---------------------------------------------------------------------------

pub(crate) async fn onchain_risk_flags(
    State(st): State<Arc<AppState>>,
    payload: Result<Json<RiskFlagsRequest>, JsonRejection>,
) -> Response {
    let req = match payload {
        Ok(Json(req)) => req,
        Err(rej) => return rejection_response(rej),
    };

    let now = req.now.unwrap_or_else(chrono::Utc::now);
    let flags = derive_risk_flags(&req.observation, now, &st.policy);
    info!(
        data_lag = flags.data_lag(),
        signal_conflict = flags.signal_conflict(),
        anomaly_detected = flags.anomaly_detected(),
        "risk flags derived"
    );
    (StatusCode::OK, Json(flags)).into_response()
}

// ---------------------------------------------------------------------------
// GET /v1/stream  (SSE)
// ---------------------------------------------------------------------------

pub(crate) async fn stream(State(st): State<Arc<AppState>>) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert("Cache-Control", HeaderValue::from_static("no-cache"));
    headers.insert("Connection", HeaderValue::from_static("keep-alive"));

    let rx = st.bus.subscribe();
    let events = broadcast_to_sse(rx);

    (headers, Sse::new(events).keep_alive(KeepAlive::new())).into_response()
}

fn broadcast_to_sse(
    rx: broadcast::Receiver<BusMsg>,
) -> impl Stream<Item = Result<Event, Infallible>> {
    BroadcastStream::new(rx).filter_map(|msg| async move {
        match msg {
            Ok(m) => {
                let event_name = match &m {
                    BusMsg::Heartbeat { .. } => "heartbeat",
                    BusMsg::Evaluation(_) => "evaluation",
                };
                let data = serde_json::to_string(&m).ok()?;
                Some(Ok(Event::default().event(event_name).data(data)))
            }
            Err(_) => None, // lagged / closed
        }
    })
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Unwrap + validate an evaluation body, or produce the error response.
#[allow(clippy::result_large_err)]
fn accept(
    payload: Result<Json<EvaluationContext>, JsonRejection>,
) -> Result<EvaluationContext, Response> {
    let Json(ctx) = payload.map_err(rejection_response)?;
    if let Err(invalid) = validate_context(&ctx) {
        info!(field = invalid.field, "request refused: {}", invalid.message);
        return Err(error_response(
            StatusCode::UNPROCESSABLE_ENTITY,
            &invalid.message,
            Some(invalid.field),
        ));
    }
    Ok(ctx)
}

fn run_evaluation(st: &AppState, ctx: &EvaluationContext) -> AssembledContext {
    let (out, classification) = evaluate_with_classification(ctx, &st.policy);

    let _ = st.bus.send(BusMsg::Evaluation(EvaluationEvent {
        evaluation_id: Uuid::new_v4(),
        asset: out.asset.clone(),
        timeframe: out.timeframe.clone(),
        state: out.state,
        allowed: out.usage_policy.allowed,
        recommended_weight: out.usage_policy.recommended_weight,
        reasons: classification.reasons,
    }));
    out
}

fn rejection_response(rej: JsonRejection) -> Response {
    error_response(rej.status(), &rej.body_text(), None)
}

fn error_response(status: StatusCode, msg: &str, field: Option<&str>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: msg.to_string(),
            field: field.map(str::to_string),
        }),
    )
        .into_response()
}

//! Telephony webhook handlers
//!
//! Thin adapters between the provider's form-encoded webhooks and the
//! application layer. Every handler validates the request signature first
//! (401 on failure, the one non-200 the provider ever sees) and otherwise
//! always answers 200 with a valid call-control document, however badly
//! things went internally.

use super::metrics_handler::{
    record_dial_outcome, record_inbound_call, record_rule_decision, record_signature_rejection,
    record_webhook_duration, Timer,
};
use crate::application::{
    decide_action, DialOutcome, Resolution, RoutingResolver, TransferOrchestrator,
};
use crate::domain::forwarding::ForwardStore;
use crate::domain::routing::{NumberStore, RoutingStore};
use crate::infrastructure::callcontrol::{builder, Document};
use crate::infrastructure::telephony::signature::{candidate_urls, validate_signature};
use axum::{
    extract::{OriginalUri, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Form,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, warn};

const UNRECOGNIZED_MESSAGE: &str =
    "We're sorry, the number you have dialed is not recognized. Goodbye.";

/// Application state
#[derive(Clone)]
pub struct AppState {
    pub resolver: Arc<RoutingResolver>,
    pub orchestrator: Arc<TransferOrchestrator>,
    pub routing: Arc<dyn RoutingStore>,
    pub forwards: Arc<dyn ForwardStore>,
    pub numbers: Arc<dyn NumberStore>,
    /// Provider auth token used for webhook signature validation.
    /// Empty disables validation (local development only).
    pub auth_token: String,
    pub public_base_url: String,
    pub warm_transfer_secret: String,
}

fn xml_response(document: Document) -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/xml")],
        document.render(),
    )
        .into_response()
}

fn param<'a>(params: &'a [(String, String)], key: &str) -> Option<&'a str> {
    params
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

/// Check the provider signature for a webhook request. The request URL is
/// reconstructed from the forwarded headers; the public-base rewrite covers
/// the proxy-mangled case.
fn signature_ok(
    state: &AppState,
    headers: &HeaderMap,
    uri: &axum::http::Uri,
    params: &[(String, String)],
) -> bool {
    if state.auth_token.is_empty() {
        return true;
    }

    let provided = headers
        .get("X-Twilio-Signature")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    let proto = headers
        .get("X-Forwarded-Proto")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("http");
    let host = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("localhost");
    let path_and_query = uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or(uri.path());
    let request_url = format!("{}://{}{}", proto, host, path_and_query);

    let candidates = candidate_urls(
        &request_url,
        Some(&state.public_base_url),
        path_and_query,
    );
    validate_signature(&state.auth_token, provided, &candidates, params)
}

macro_rules! require_signature {
    ($state:expr, $headers:expr, $uri:expr, $params:expr, $path:expr) => {
        if !signature_ok($state, $headers, $uri, $params) {
            warn!("Rejected webhook with invalid signature on {}", $path);
            record_signature_rejection($path);
            return StatusCode::UNAUTHORIZED.into_response();
        }
    };
}

/// Inbound call webhook: the very first request for a new call.
pub async fn inbound_call(
    State(state): State<AppState>,
    OriginalUri(uri): OriginalUri,
    headers: HeaderMap,
    Form(params): Form<Vec<(String, String)>>,
) -> Response {
    require_signature!(&state, &headers, &uri, &params, "/webhooks/voice");
    let timer = Timer::new();

    let call_id = param(&params, "CallSid").unwrap_or_default();
    let caller = param(&params, "From").unwrap_or_default();
    let dialed = param(&params, "To").unwrap_or_default();
    info!("Inbound call {} from {} to {}", call_id, caller, dialed);

    let document = match state.resolver.resolve(dialed).await {
        Ok(Resolution::Tenant(resolution)) => {
            record_inbound_call(true);
            let action = decide_action(&resolution.config, chrono::Utc::now());
            record_rule_decision(action.kind());
            state
                .orchestrator
                .handle_inbound(&resolution, call_id, caller, action)
                .await
        }
        Ok(Resolution::Unrecognized) => {
            record_inbound_call(false);
            builder::hangup(UNRECOGNIZED_MESSAGE)
        }
        Err(e) => {
            warn!("Resolution failed for call {}: {}", call_id, e);
            builder::hangup(UNRECOGNIZED_MESSAGE)
        }
    };

    record_webhook_duration("/webhooks/voice", timer.elapsed());
    xml_response(document)
}

#[derive(Debug, Deserialize)]
pub struct DialQuery {
    #[serde(default)]
    pub attempt: u32,
}

/// Dial-outcome webhook, invoked by the provider when a dial concludes.
pub async fn dial_outcome(
    State(state): State<AppState>,
    OriginalUri(uri): OriginalUri,
    Query(query): Query<DialQuery>,
    headers: HeaderMap,
    Form(params): Form<Vec<(String, String)>>,
) -> Response {
    require_signature!(&state, &headers, &uri, &params, "/webhooks/dial");
    let timer = Timer::new();

    let call_id = param(&params, "CallSid").unwrap_or_default();
    let status = param(&params, "DialCallStatus").unwrap_or_default();
    let outcome = DialOutcome::parse(status);
    record_dial_outcome(status);

    let document = state
        .orchestrator
        .handle_dial_outcome(call_id, outcome, query.attempt)
        .await;

    record_webhook_duration("/webhooks/dial", timer.elapsed());
    xml_response(document)
}

#[derive(Debug, Deserialize)]
pub struct WhisperQuery {
    pub parent: String,
}

/// Whisper webhook, fetched for the callee leg before bridging.
pub async fn whisper(
    State(state): State<AppState>,
    OriginalUri(uri): OriginalUri,
    Query(query): Query<WhisperQuery>,
    headers: HeaderMap,
    Form(params): Form<Vec<(String, String)>>,
) -> Response {
    require_signature!(&state, &headers, &uri, &params, "/webhooks/whisper");
    let document = state.orchestrator.handle_whisper(&query.parent).await;
    xml_response(document)
}

/// Gather callback from the callback-number capture flow.
pub async fn callback_digits(
    State(state): State<AppState>,
    OriginalUri(uri): OriginalUri,
    headers: HeaderMap,
    Form(params): Form<Vec<(String, String)>>,
) -> Response {
    require_signature!(&state, &headers, &uri, &params, "/webhooks/callback");

    let call_id = param(&params, "CallSid").unwrap_or_default();
    let digits = param(&params, "Digits").unwrap_or_default();
    let document = state
        .orchestrator
        .handle_callback_digits(call_id, digits)
        .await;
    xml_response(document)
}

/// Recording-complete callback from the voicemail flow.
pub async fn recording_complete(
    State(state): State<AppState>,
    OriginalUri(uri): OriginalUri,
    headers: HeaderMap,
    Form(params): Form<Vec<(String, String)>>,
) -> Response {
    require_signature!(&state, &headers, &uri, &params, "/webhooks/voicemail");

    let call_id = param(&params, "CallSid").unwrap_or_default();
    let recording_url = param(&params, "RecordingUrl").map(|s| s.to_string());
    let document = state
        .orchestrator
        .handle_recording_complete(call_id, recording_url)
        .await;
    xml_response(document)
}

//! API Router configuration

use super::admin_handler::{
    assign_number, get_forward_plan, get_routing_config, health_check, upsert_forward_plan,
    upsert_routing_config,
};
use super::metrics_handler::metrics_handler;
use super::transfer_handler::warm_transfer;
use super::webhook_handler::{
    callback_digits, dial_outcome, inbound_call, recording_complete, whisper, AppState,
};
use axum::{
    routing::{get, post, put},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Build the API router
pub fn build_router(state: AppState, prometheus_handle: PrometheusHandle) -> Router {
    // Health check route (no auth required)
    let health_routes = Router::new().route("/health", get(health_check));

    // Provider-facing webhook routes (signature-validated)
    let webhook_routes = Router::new()
        .route("/webhooks/voice", post(inbound_call))
        .route("/webhooks/dial", post(dial_outcome))
        .route("/webhooks/whisper", post(whisper))
        .route("/webhooks/callback", post(callback_digits))
        .route("/webhooks/voicemail", post(recording_complete));

    // Warm transfer entrypoint (shared-secret header)
    let transfer_routes = Router::new().route("/transfer/warm", post(warm_transfer));

    // Management routes
    let admin_routes = Router::new()
        .route(
            "/tenants/:tenant_id/numbers/:number/routing",
            get(get_routing_config).put(upsert_routing_config),
        )
        .route(
            "/tenants/:tenant_id/numbers/:number/forwarding",
            get(get_forward_plan).put(upsert_forward_plan),
        )
        .route("/numbers/:number", put(assign_number));

    // Metrics route (separate state)
    let metrics_routes = Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(prometheus_handle);

    // Combine routes with state
    Router::new()
        .merge(health_routes)
        .merge(webhook_routes)
        .merge(transfer_routes)
        .merge(admin_routes)
        .with_state(state)
        .merge(metrics_routes)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

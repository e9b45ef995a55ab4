//! Warm transfer endpoint
//!
//! The only externally triggered state transition that does not originate
//! from the telephony provider: an authenticated out-of-band request asking
//! for a live agent call to be handed to a human.

use super::dto::{ApiResponse, WarmTransferRequest, WarmTransferResponse};
use super::metrics_handler::record_warm_transfer;
use super::webhook_handler::AppState;
use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    Json,
};
use crate::domain::shared::DomainError;
use tracing::{info, warn};

const SECRET_HEADER: &str = "X-Transfer-Secret";

/// Request a warm transfer of a live call
pub async fn warm_transfer(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<WarmTransferRequest>,
) -> (StatusCode, Json<ApiResponse<WarmTransferResponse>>) {
    let provided = headers
        .get(SECRET_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    if state.warm_transfer_secret.is_empty() || provided != state.warm_transfer_secret {
        warn!("Rejected warm transfer with bad shared secret");
        return (
            StatusCode::UNAUTHORIZED,
            Json(ApiResponse::error("unauthorized".to_string())),
        );
    }

    info!(
        "Warm transfer requested for call {} (preferred target: {:?})",
        req.call_id, req.preferred_target
    );

    match state
        .orchestrator
        .warm_transfer(
            &req.call_id,
            req.preferred_target.as_deref(),
            req.summary,
            req.reason,
        )
        .await
    {
        Ok(accepted) => {
            record_warm_transfer(true);
            (
                StatusCode::OK,
                Json(ApiResponse::success(WarmTransferResponse {
                    status: accepted.status.as_str().to_string(),
                    call_id: accepted.call_id,
                })),
            )
        }
        Err(e) => {
            warn!("Warm transfer for call {} failed: {}", req.call_id, e);
            record_warm_transfer(false);
            let status = match &e {
                DomainError::NotFound(_) => StatusCode::NOT_FOUND,
                DomainError::Validation(_) => StatusCode::BAD_REQUEST,
                DomainError::ProviderUnavailable(_) => StatusCode::BAD_GATEWAY,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };
            (status, Json(ApiResponse::error(e.to_string())))
        }
    }
}

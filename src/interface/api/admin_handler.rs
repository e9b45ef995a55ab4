//! Management API handlers
//!
//! Dashboard-facing CRUD over routing configs, forward plans, and number
//! assignments. Unlike the webhook surface, validation failures here are
//! allowed to answer 400.

use super::dto::{ApiResponse, AssignNumberRequest};
use super::webhook_handler::AppState;
use crate::domain::forwarding::{ForwardPlan, ForwardPlanPatch, ForwardTarget};
use crate::domain::phone::normalize_e164;
use crate::domain::routing::{NumberAssignment, RoutingConfig, RoutingConfigPatch};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use tracing::{error, info};

/// Health check
pub async fn health_check() -> Json<ApiResponse<&'static str>> {
    Json(ApiResponse::success("OK"))
}

/// Get the routing config for a (tenant, number)
pub async fn get_routing_config(
    State(state): State<AppState>,
    Path((tenant_id, number)): Path<(String, String)>,
) -> Json<ApiResponse<RoutingConfig>> {
    match state.routing.get(&tenant_id, &number).await {
        Ok(Some(config)) => Json(ApiResponse::success(config)),
        Ok(None) => Json(ApiResponse::error(format!(
            "no routing config for {}/{}",
            tenant_id, number
        ))),
        Err(e) => {
            error!("Failed to get routing config: {}", e);
            Json(ApiResponse::error(e.to_string()))
        }
    }
}

/// Create or update the routing config for a (tenant, number)
pub async fn upsert_routing_config(
    State(state): State<AppState>,
    Path((tenant_id, number)): Path<(String, String)>,
    Json(patch): Json<RoutingConfigPatch>,
) -> (StatusCode, Json<ApiResponse<RoutingConfig>>) {
    // Midnight-crossing ranges are refused here, before anything is stored
    if let Some(rules) = &patch.rules {
        for rule in rules {
            if let Err(e) = rule.validate() {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(ApiResponse::error(e.to_string())),
                );
            }
        }
    }

    info!("Upserting routing config for {}/{}", tenant_id, number);
    match state.routing.upsert(&tenant_id, &number, patch).await {
        Ok(config) => (StatusCode::OK, Json(ApiResponse::success(config))),
        Err(e) => {
            error!("Failed to upsert routing config: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::error(e.to_string())),
            )
        }
    }
}

/// Get the forward plan for a (tenant, number)
pub async fn get_forward_plan(
    State(state): State<AppState>,
    Path((tenant_id, number)): Path<(String, String)>,
) -> Json<ApiResponse<ForwardPlan>> {
    match state.forwards.get(&tenant_id, &number).await {
        Ok(Some(plan)) => Json(ApiResponse::success(plan)),
        Ok(None) => Json(ApiResponse::error(format!(
            "no forward plan for {}/{}",
            tenant_id, number
        ))),
        Err(e) => {
            error!("Failed to get forward plan: {}", e);
            Json(ApiResponse::error(e.to_string()))
        }
    }
}

/// Create or update the forward plan for a (tenant, number)
pub async fn upsert_forward_plan(
    State(state): State<AppState>,
    Path((tenant_id, number)): Path<(String, String)>,
    Json(mut patch): Json<ForwardPlanPatch>,
) -> (StatusCode, Json<ApiResponse<ForwardPlan>>) {
    // Targets entered in a national format are normalized with the
    // tenant's country before the store drops whatever remains unusable
    if let Some(targets) = patch.targets.take() {
        let country = match state.routing.get(&tenant_id, &number).await {
            Ok(Some(config)) => config.country,
            _ => "US".to_string(),
        };
        patch.targets = Some(
            targets
                .into_iter()
                .map(|t| match normalize_e164(&t.to, &country) {
                    Some(to) => ForwardTarget { to, ..t },
                    None => t,
                })
                .collect(),
        );
    }

    info!("Upserting forward plan for {}/{}", tenant_id, number);
    match state.forwards.upsert(&tenant_id, &number, patch).await {
        Ok(plan) => (StatusCode::OK, Json(ApiResponse::success(plan))),
        Err(e) => {
            error!("Failed to upsert forward plan: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::error(e.to_string())),
            )
        }
    }
}

/// Assign an inbound number to a tenant
pub async fn assign_number(
    State(state): State<AppState>,
    Path(number): Path<String>,
    Json(req): Json<AssignNumberRequest>,
) -> (StatusCode, Json<ApiResponse<NumberAssignment>>) {
    let phone_number = match normalize_e164(&number, &req.country) {
        Some(n) => n,
        None => {
            return (
                StatusCode::BAD_REQUEST,
                Json(ApiResponse::error(format!(
                    "{:?} is not a usable phone number",
                    number
                ))),
            );
        }
    };

    let assignment = NumberAssignment {
        phone_number,
        tenant_id: req.tenant_id,
        contact_number: req.contact_number,
        country: req.country,
        created_at: Utc::now(),
    };

    info!(
        "Assigning number {} to tenant {}",
        assignment.phone_number, assignment.tenant_id
    );
    match state.numbers.assign(&assignment).await {
        Ok(()) => (StatusCode::OK, Json(ApiResponse::success(assignment))),
        Err(e) => {
            error!("Failed to assign number: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::error(e.to_string())),
            )
        }
    }
}

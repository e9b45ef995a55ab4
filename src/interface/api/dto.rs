//! API DTOs (Data Transfer Objects)

use serde::{Deserialize, Serialize};

/// Generic API response
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
        }
    }
}

/// Warm transfer request
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WarmTransferRequest {
    pub call_id: String,
    pub preferred_target: Option<String>,
    pub summary: Option<String>,
    pub reason: Option<String>,
}

/// Warm transfer response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WarmTransferResponse {
    pub status: String,
    pub call_id: String,
}

/// Number assignment request
#[derive(Debug, Deserialize)]
pub struct AssignNumberRequest {
    pub tenant_id: String,
    pub contact_number: Option<String>,
    #[serde(default = "default_country")]
    pub country: String,
}

fn default_country() -> String {
    "US".to_string()
}

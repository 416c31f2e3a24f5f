use axum::Json;
use serde::Serialize;

use crate::utils::{ApiResponse, success_to_api_response};

#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub success: bool,
}

pub async fn health() -> Json<ApiResponse<HealthStatus>> {
    success_to_api_response("Server running successfully!", HealthStatus { success: true })
}

use axum::{
    Json,
    extract::State,
    http::{HeaderMap, header::AUTHORIZATION},
};

use crate::{
    AppState,
    auth::{TokenPair, bearer_token},
    error::{AppError, AppResult},
    utils::{ApiResponse, success_to_api_response},
};

/// 用 Authorization 头中的刷新令牌换取新的访问令牌
#[axum::debug_handler]
pub async fn refresh_token(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> AppResult<Json<ApiResponse<TokenPair>>> {
    let token = headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .map(bearer_token)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AppError::Unauthorized("Authorization token is missing".into()))?;

    let pair = state
        .tokens
        .refresh(token)
        .ok_or_else(|| AppError::Unauthorized("Invalid or expired refresh token".into()))?;

    Ok(success_to_api_response(
        "Successfully refreshed access token!",
        pair,
    ))
}

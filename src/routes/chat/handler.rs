use axum::{
    Json,
    extract::{Extension, Path, State},
};

use crate::{
    AppState,
    error::{ApiJson, AppResult},
    middleware::CurrentUser,
    utils::{ApiResponse, success_to_api_response},
};

use super::model::{
    ChatRequest, ChatResponse, DeletedResponse, HistoryDetailResponse, HistoryListResponse,
};

#[axum::debug_handler]
pub async fn send_message(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    ApiJson(req): ApiJson<ChatRequest>,
) -> AppResult<Json<ApiResponse<ChatResponse>>> {
    let outcome = state.orchestrator.handle_turn(&user.id, req.into()).await?;
    Ok(success_to_api_response(
        "Successfully generated chat response",
        outcome.into(),
    ))
}

#[axum::debug_handler]
pub async fn list_histories(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> AppResult<Json<ApiResponse<HistoryListResponse>>> {
    let histories = state.sessions.list_histories(&user.id).await?;
    Ok(success_to_api_response(
        "Successfully fetched chat histories",
        HistoryListResponse {
            total: histories.len(),
            histories,
        },
    ))
}

#[axum::debug_handler]
pub async fn get_history(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(id): Path<String>,
) -> AppResult<Json<ApiResponse<HistoryDetailResponse>>> {
    let detail = state.sessions.history_detail(&user.id, &id).await?;
    Ok(success_to_api_response(
        "Successfully fetched chat history",
        detail.into(),
    ))
}

#[axum::debug_handler]
pub async fn delete_history(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(id): Path<String>,
) -> AppResult<Json<ApiResponse<DeletedResponse>>> {
    state.sessions.soft_delete_history(&user.id, &id).await?;
    Ok(success_to_api_response(
        "Successfully deleted chat history",
        DeletedResponse { deleted: true },
    ))
}

#[axum::debug_handler]
pub async fn delete_message(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(id): Path<String>,
) -> AppResult<Json<ApiResponse<DeletedResponse>>> {
    state.sessions.delete_message(&user.id, &id).await?;
    Ok(success_to_api_response(
        "Successfully deleted chat message",
        DeletedResponse { deleted: true },
    ))
}

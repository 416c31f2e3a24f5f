use axum::{
    Json,
    extract::{Extension, Path, State},
    http::StatusCode,
};

use crate::{
    AppState,
    database::models::UserStatistics,
    error::{ApiJson, AppResult},
    middleware::CurrentUser,
    services::{Account, Registration, UserUpdate},
    utils::{ApiResponse, success_to_api_response},
};

use super::model::{
    AccountList, AccountView, AdminUpdateRequest, ChangeRoleRequest, CreateUserRequest,
    ToggleActiveRequest,
};

#[axum::debug_handler]
pub async fn statistics(
    State(state): State<AppState>,
) -> AppResult<Json<ApiResponse<UserStatistics>>> {
    let stats = state.directory.statistics().await?;
    Ok(success_to_api_response("Successfully fetched statistics", stats))
}

#[axum::debug_handler]
pub async fn list_users(State(state): State<AppState>) -> AppResult<Json<ApiResponse<AccountList>>> {
    let users: Vec<AccountView> = state
        .directory
        .list_accounts()
        .await?
        .into_iter()
        .map(Into::into)
        .collect();

    Ok(success_to_api_response(
        "Successfully fetched users",
        AccountList {
            total: users.len(),
            users,
        },
    ))
}

#[axum::debug_handler]
pub async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<ApiResponse<AccountView>>> {
    let account = state.directory.account(&id).await?;
    Ok(success_to_api_response("Successfully fetched user", account.into()))
}

#[axum::debug_handler]
pub async fn create_user(
    State(state): State<AppState>,
    Extension(CurrentUser(admin)): Extension<CurrentUser>,
    ApiJson(req): ApiJson<CreateUserRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<AccountView>>)> {
    let registration = Registration {
        username: req.username,
        password: req.password,
        full_name: req.full_name,
        email: req.email,
        role: req.role,
    };
    let (user, profile) = state.directory.register(registration, Some(&admin)).await?;

    Ok((
        StatusCode::CREATED,
        success_to_api_response(
            "Successfully Create User!",
            Account {
                user,
                profile: Some(profile),
            }
            .into(),
        ),
    ))
}

#[axum::debug_handler]
pub async fn update_user(
    State(state): State<AppState>,
    Extension(CurrentUser(admin)): Extension<CurrentUser>,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<AdminUpdateRequest>,
) -> AppResult<Json<ApiResponse<AccountView>>> {
    let update = UserUpdate {
        username: req.username,
        full_name: req.full_name,
        email: req.email,
        role: req.role,
        is_active: req.is_active,
    };
    let account = state
        .directory
        .update_user(&id, update, &admin.username)
        .await?;
    Ok(success_to_api_response("User updated successfully!", account.into()))
}

#[axum::debug_handler]
pub async fn toggle_active(
    State(state): State<AppState>,
    Extension(CurrentUser(admin)): Extension<CurrentUser>,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<ToggleActiveRequest>,
) -> AppResult<Json<ApiResponse<AccountView>>> {
    let account = state
        .directory
        .set_active(&id, req.is_active, &admin.username)
        .await?;
    Ok(success_to_api_response(
        "User status updated successfully!",
        account.into(),
    ))
}

#[axum::debug_handler]
pub async fn change_role(
    State(state): State<AppState>,
    Extension(CurrentUser(admin)): Extension<CurrentUser>,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<ChangeRoleRequest>,
) -> AppResult<Json<ApiResponse<AccountView>>> {
    let account = state
        .directory
        .set_role(&id, req.role, &admin.username)
        .await?;
    Ok(success_to_api_response(
        "User role updated successfully!",
        account.into(),
    ))
}

#[axum::debug_handler]
pub async fn delete_user(
    State(state): State<AppState>,
    Extension(CurrentUser(admin)): Extension<CurrentUser>,
    Path(id): Path<String>,
) -> AppResult<Json<ApiResponse<serde_json::Value>>> {
    state.directory.soft_delete(&id, &admin).await?;
    Ok(success_to_api_response(
        "User deleted successfully!",
        serde_json::json!({ "deleted": true }),
    ))
}

use axum::{
    Json,
    extract::{Extension, Path, State},
    http::StatusCode,
};
use tracing::info;

use crate::{
    AppState,
    error::{ApiJson, AppError, AppResult},
    middleware::CurrentUser,
    services::{Registration, UserUpdate},
    utils::{ApiResponse, success_to_api_response},
};

use super::model::{
    LoginRequest, LoginResponse, ProfileResponse, RegisterRequest, RegisterResponse,
    UpdatePasswordRequest, UpdateUserRequest,
};

#[axum::debug_handler]
pub async fn register(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<RegisterRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<RegisterResponse>>)> {
    let registration = Registration {
        username: req.username,
        password: req.password,
        full_name: req.full_name,
        email: req.email,
        role: None,
    };
    let (user, profile) = state.directory.register(registration, None).await?;

    // 注册成功后直接登录
    let tokens = state.tokens.issue(&user.id)?;

    Ok((
        StatusCode::CREATED,
        success_to_api_response(
            "Successfully Create User!",
            RegisterResponse {
                id: user.id,
                username: user.username,
                full_name: profile.full_name,
                email: profile.email,
                access_token: tokens.access_token,
                refresh_token: tokens.refresh_token,
            },
        ),
    ))
}

#[axum::debug_handler]
pub async fn login(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<LoginRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<LoginResponse>>)> {
    let user = state
        .directory
        .authenticate_credentials(&req.username, &req.password)
        .await?;
    let account = state.directory.account(&user.id).await?;
    let tokens = state.tokens.issue(&user.id)?;

    Ok((
        StatusCode::ACCEPTED,
        success_to_api_response(
            "Successfully Login!",
            LoginResponse {
                id: user.id,
                username: user.username,
                role: user.role,
                full_name: account.profile.as_ref().map(|p| p.full_name.clone()),
                email: account.profile.map(|p| p.email),
                access_token: tokens.access_token,
                refresh_token: tokens.refresh_token,
            },
        ),
    ))
}

#[axum::debug_handler]
pub async fn profile(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> AppResult<Json<ApiResponse<ProfileResponse>>> {
    let account = state.directory.account(&user.id).await?;
    if account.profile.is_none() {
        return Err(AppError::NotFound("Your profile not found!".into()));
    }

    Ok(success_to_api_response(
        "Successfully Get user Profile!",
        ProfileResponse {
            user: account.user.into(),
            profile: account.profile.map(Into::into),
        },
    ))
}

#[axum::debug_handler]
pub async fn update_user(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<UpdateUserRequest>,
) -> AppResult<Json<ApiResponse<ProfileResponse>>> {
    if user.id != id {
        return Err(AppError::Forbidden(
            "You can only update your own profile!".into(),
        ));
    }

    let update = UserUpdate {
        username: req.username,
        full_name: req.full_name,
        email: req.email,
        ..Default::default()
    };
    let account = state
        .directory
        .update_user(&id, update, &user.username)
        .await?;

    Ok(success_to_api_response(
        "Profile updated successfully!",
        ProfileResponse {
            user: account.user.into(),
            profile: account.profile.map(Into::into),
        },
    ))
}

#[axum::debug_handler]
pub async fn update_password(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<UpdatePasswordRequest>,
) -> AppResult<Json<ApiResponse<serde_json::Value>>> {
    if user.id != id {
        return Err(AppError::Forbidden(
            "You can only change your own password!".into(),
        ));
    }

    state
        .directory
        .change_password(
            &id,
            &req.old_password,
            &req.new_password,
            &req.confirm_new_password,
        )
        .await?;
    info!("Password updated for user {}", id);

    Ok(success_to_api_response(
        "Update password successfully!",
        serde_json::json!({}),
    ))
}

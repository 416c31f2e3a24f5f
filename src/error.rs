use axum::extract::FromRequest;
use axum::extract::rejection::JsonRejection;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::{debug, error};

use crate::auth::{AuthError, TokenError};
use crate::completion::CompletionError;
use crate::database::StoreError;
use crate::services::{ChatError, DirectoryError};
use crate::utils::error_to_api_response;

/// 对外暴露的错误分类，每一类对应一个 HTTP 状态码
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    Upstream(String),
    #[error("{0}")]
    Internal(String),
    #[error("{0}")]
    TooManyRequests(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::Conflict(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::Upstream(_) => StatusCode::BAD_GATEWAY,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::TooManyRequests(_) => StatusCode::TOO_MANY_REQUESTS,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        // 内部细节只写日志
        let message = match self {
            AppError::Internal(detail) => {
                error!("Internal error: {}", detail);
                "Internal server error".to_string()
            }
            AppError::Upstream(detail) => {
                error!("Upstream error: {}", detail);
                "Failed to generate chat response".to_string()
            }
            other => other.to_string(),
        };

        (status, error_to_api_response(status.as_u16(), message)).into_response()
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(constraint) => {
                debug!("Unique constraint {} violated", constraint);
                AppError::Conflict(conflict_message(&constraint).into())
            }
            StoreError::HistoryGone(id) => AppError::NotFound(format!("Chat history {id} not found")),
            other => AppError::Internal(other.to_string()),
        }
    }
}

/// 约束名只写日志，响应里换成字段名
fn conflict_message(constraint: &str) -> &'static str {
    if constraint.contains("email") {
        "Email already exists!"
    } else if constraint.contains("username") {
        "Username already exists!"
    } else {
        "Duplicate value already exists!"
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Store(store) => store.into(),
            role @ AuthError::RoleRequired(_) => AppError::Forbidden(role.to_string()),
            other => AppError::Unauthorized(other.to_string()),
        }
    }
}

impl From<TokenError> for AppError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Encode(e) => AppError::Internal(format!("token signing failed: {e}")),
            other => AppError::Unauthorized(other.to_string()),
        }
    }
}

impl From<DirectoryError> for AppError {
    fn from(err: DirectoryError) -> Self {
        match err {
            DirectoryError::Validation(msg) => AppError::Validation(msg),
            DirectoryError::Conflict(msg) => AppError::Conflict(msg),
            reason @ (DirectoryError::UserNotFound | DirectoryError::BadCredentials) => {
                debug!("Login rejected: {}", reason);
                AppError::Validation("Invalid username or password".into())
            }
            DirectoryError::NotFound(msg) => AppError::NotFound(msg),
            DirectoryError::Store(store) => store.into(),
            DirectoryError::Hash(e) => AppError::Internal(format!("password hashing failed: {e}")),
        }
    }
}

impl From<CompletionError> for AppError {
    fn from(err: CompletionError) -> Self {
        AppError::Upstream(err.to_string())
    }
}

impl From<ChatError> for AppError {
    fn from(err: ChatError) -> Self {
        match err {
            ChatError::Validation(msg) => AppError::Validation(msg),
            ChatError::NotFound(msg) => AppError::NotFound(msg),
            ChatError::Upstream(e) => e.into(),
            ChatError::Store(store) => store.into(),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

/// 与 `axum::Json` 相同，但解析失败时使用统一的错误格式
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct ApiJson<T>(pub T);

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::models::Role;

    #[test]
    fn unauthorized_and_forbidden_are_distinct() {
        let missing: AppError = AuthError::MissingToken.into();
        assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(missing.to_string(), "Authorization token is missing");

        let role: AppError = AuthError::RoleRequired(Role::Admin).into();
        assert_eq!(role.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn login_failures_share_one_message() {
        let a: AppError = DirectoryError::UserNotFound.into();
        let b: AppError = DirectoryError::BadCredentials.into();
        assert_eq!(a.to_string(), b.to_string());
        assert_eq!(a.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn unique_violations_name_the_field_not_the_index() {
        let email: AppError = StoreError::Conflict("ux_user_profile_email_live".into()).into();
        assert_eq!(email.status(), StatusCode::BAD_REQUEST);
        assert_eq!(email.to_string(), "Email already exists!");

        let username: AppError = StoreError::Conflict("ux_user_username_live".into()).into();
        assert_eq!(username.to_string(), "Username already exists!");

        let other: AppError = StoreError::Conflict("chat_messages_pkey".into()).into();
        assert!(!other.to_string().contains("pkey"));
    }

    #[test]
    fn vanished_history_is_not_found() {
        let err: AppError = ChatError::Store(StoreError::HistoryGone("h1".into())).into();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
        assert_eq!(err.to_string(), "Chat history h1 not found");
    }

    #[test]
    fn internal_details_are_not_exposed() {
        let response = AppError::Internal("connection refused on 10.0.0.3".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}

use std::sync::LazyLock;

use axum::Json;
use regex::Regex;
use serde::Serialize;

use crate::auth::MAX_PASSWORD_BYTES;

pub const MIN_PASSWORD_BYTES: usize = 8;
pub const TITLE_MAX_CHARS: usize = 50;

static EMAIL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Z|a-z]{2,}$").expect("valid email regex")
});

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub message: String,
    pub data: T,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error_code: u16,
}

#[derive(Debug, Serialize)]
pub struct ApiErrorResponse {
    pub message: String,
    pub error: ErrorBody,
}

pub fn success_to_api_response<T: Serialize>(
    message: impl Into<String>,
    data: T,
) -> Json<ApiResponse<T>> {
    Json(ApiResponse {
        message: message.into(),
        data,
    })
}

pub fn error_to_api_response(error_code: u16, message: impl Into<String>) -> Json<ApiErrorResponse> {
    Json(ApiErrorResponse {
        message: message.into(),
        error: ErrorBody { error_code },
    })
}

pub fn is_valid_email(email: &str) -> bool {
    EMAIL_PATTERN.is_match(email)
}

/// 密码长度按字节计算
pub fn check_password_length(password: &str) -> Result<(), &'static str> {
    let len = password.len();
    if len < MIN_PASSWORD_BYTES {
        Err("password must be at least 8 characters!")
    } else if len > MAX_PASSWORD_BYTES {
        Err("Password is too long! Maximum 72 bytes allowed.")
    } else {
        Ok(())
    }
}

/// 会话标题取首条消息的前 50 个字符，超出时追加省略号
pub fn derive_title(input: &str) -> String {
    let mut chars = input.chars();
    let head: String = chars.by_ref().take(TITLE_MAX_CHARS).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_pattern() {
        assert!(is_valid_email("alice@example.com"));
        assert!(is_valid_email("a.b+tag@sub.domain.id"));
        assert!(!is_valid_email("alice@example"));
        assert!(!is_valid_email("alice.example.com"));
        assert!(!is_valid_email(""));
        assert!(!is_valid_email("contact alice@example.com"));
    }

    #[test]
    fn password_bounds_are_in_bytes() {
        assert!(check_password_length("1234567").is_err());
        assert!(check_password_length("12345678").is_ok());
        assert!(check_password_length(&"x".repeat(72)).is_ok());
        assert!(check_password_length(&"x".repeat(73)).is_err());
        // 每个字符 2 字节
        assert!(check_password_length(&"é".repeat(37)).is_err());
    }

    #[test]
    fn titles_truncate_on_char_boundaries() {
        assert_eq!(derive_title("Hello"), "Hello");
        let exact = "a".repeat(50);
        assert_eq!(derive_title(&exact), exact);

        let long = "ü".repeat(60);
        let title = derive_title(&long);
        assert!(title.ends_with("..."));
        assert_eq!(title.chars().count(), 53);
    }

    #[test]
    fn envelopes_have_expected_shape() {
        let ok = serde_json::to_value(&success_to_api_response("done", 1).0).unwrap();
        assert_eq!(ok, serde_json::json!({"message": "done", "data": 1}));

        let err = serde_json::to_value(&error_to_api_response(404, "missing").0).unwrap();
        assert_eq!(
            err,
            serde_json::json!({"message": "missing", "error": {"error_code": 404}})
        );
    }
}

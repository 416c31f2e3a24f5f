use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use thiserror::Error;

/// 用户角色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    Admin,
    User,
}

#[derive(Debug, Error)]
#[error("unknown role: {0}")]
pub struct UnknownRole(pub String);

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "ADMIN",
            Role::User => "USER",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// 早期迁移写入的是小写的 'user'
impl TryFrom<String> for Role {
    type Error = UnknownRole;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.to_ascii_uppercase().as_str() {
            "ADMIN" => Ok(Role::Admin),
            "USER" => Ok(Role::User),
            _ => Err(UnknownRole(value)),
        }
    }
}

/// 用户数据库实体，对应 "user" 表
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: String,
    pub username: String,
    #[sqlx(rename = "password")]
    pub password_hash: String,
    pub is_active: bool,
    #[sqlx(try_from = "String")]
    pub role: Role,
    pub deleted: bool,
    pub created_by: String,
    pub created_date: DateTime<Utc>,
    pub updated_by: String,
    pub updated_date: Option<DateTime<Utc>>,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// 用户资料实体，与 User 一对一
#[derive(Debug, Clone, FromRow)]
pub struct UserProfile {
    pub id: String,
    pub id_user: String,
    #[sqlx(rename = "nama_lengkap")]
    pub full_name: String,
    pub email: String,
    pub deleted: bool,
    pub created_by: String,
    pub created_date: DateTime<Utc>,
    pub updated_by: String,
    pub updated_date: Option<DateTime<Utc>>,
}

/// 按角色统计的用户数量（不含已删除用户）
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, FromRow)]
pub struct UserStatistics {
    pub total_users: i64,
    pub admin_users: i64,
    pub regular_users: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_parses_legacy_lowercase_values() {
        assert_eq!(Role::try_from("user".to_string()).unwrap(), Role::User);
        assert_eq!(Role::try_from("ADMIN".to_string()).unwrap(), Role::Admin);
        assert!(Role::try_from("owner".to_string()).is_err());
    }

    #[test]
    fn role_serializes_uppercase() {
        assert_eq!(serde_json::to_string(&Role::Admin).unwrap(), "\"ADMIN\"");
        let role: Role = serde_json::from_str("\"USER\"").unwrap();
        assert_eq!(role, Role::User);
    }
}

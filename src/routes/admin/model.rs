use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::database::models::Role;
use crate::services::Account;

/// 用户与资料合并后的管理视图
#[derive(Debug, Serialize)]
pub struct AccountView {
    pub id: String,
    pub username: String,
    pub role: Role,
    pub is_active: bool,
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub created_by: String,
    pub created_date: DateTime<Utc>,
    pub updated_by: String,
    pub updated_date: Option<DateTime<Utc>>,
}

impl From<Account> for AccountView {
    fn from(Account { user, profile }: Account) -> Self {
        let (full_name, email) = match profile {
            Some(p) => (Some(p.full_name), Some(p.email)),
            None => (None, None),
        };
        Self {
            id: user.id,
            username: user.username,
            role: user.role,
            is_active: user.is_active,
            full_name,
            email,
            created_by: user.created_by,
            created_date: user.created_date,
            updated_by: user.updated_by,
            updated_date: user.updated_date,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AccountList {
    pub users: Vec<AccountView>,
    pub total: usize,
}

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub username: String,
    pub password: String,
    #[serde(alias = "nama_lengkap")]
    pub full_name: String,
    pub email: String,
    pub role: Option<Role>,
}

#[derive(Debug, Deserialize)]
pub struct AdminUpdateRequest {
    pub username: Option<String>,
    #[serde(alias = "nama_lengkap")]
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub role: Option<Role>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct ToggleActiveRequest {
    pub is_active: bool,
}

#[derive(Debug, Deserialize)]
pub struct ChangeRoleRequest {
    pub role: Role,
}

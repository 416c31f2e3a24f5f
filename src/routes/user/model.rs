use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::database::models::{Role, User, UserProfile};

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
    #[serde(alias = "nama_lengkap")]
    pub full_name: String,
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub id: String,
    pub username: String,
    pub full_name: String,
    pub email: String,
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub id: String,
    pub username: String,
    pub role: Role,
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug, Serialize)]
pub struct UserView {
    pub id: String,
    pub username: String,
    pub role: Role,
    pub is_active: bool,
    pub created_date: DateTime<Utc>,
    pub updated_date: Option<DateTime<Utc>>,
}

impl From<User> for UserView {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            role: user.role,
            is_active: user.is_active,
            created_date: user.created_date,
            updated_date: user.updated_date,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ProfileView {
    pub id: String,
    pub full_name: String,
    pub email: String,
}

impl From<UserProfile> for ProfileView {
    fn from(profile: UserProfile) -> Self {
        Self {
            id: profile.id,
            full_name: profile.full_name,
            email: profile.email,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    pub user: UserView,
    pub profile: Option<ProfileView>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateUserRequest {
    pub username: Option<String>,
    #[serde(alias = "nama_lengkap")]
    pub full_name: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdatePasswordRequest {
    pub old_password: String,
    pub new_password: String,
    pub confirm_new_password: String,
}

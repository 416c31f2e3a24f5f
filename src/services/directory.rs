use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::auth::{hash_password, verify_password};
use crate::database::models::{Role, User, UserProfile, UserStatistics};
use crate::database::{StoreError, UserChanges, UserStore};
use crate::utils::{check_password_length, is_valid_email};

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Conflict(String),
    #[error("no active user with that username")]
    UserNotFound,
    #[error("password does not match")]
    BadCredentials,
    #[error("{0}")]
    NotFound(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Hash(#[from] bcrypt::BcryptError),
}

type Result<T> = std::result::Result<T, DirectoryError>;

#[derive(Debug, Clone)]
pub struct Registration {
    pub username: String,
    pub password: String,
    pub full_name: String,
    pub email: String,
    /// 只有管理员创建用户时才生效
    pub role: Option<Role>,
}

/// 部分更新，None 的字段保持不变
#[derive(Debug, Clone, Default)]
pub struct UserUpdate {
    pub username: Option<String>,
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub role: Option<Role>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct Account {
    pub user: User,
    pub profile: Option<UserProfile>,
}

/// 用户与资料的业务规则
#[derive(Clone)]
pub struct UserDirectory {
    users: Arc<dyn UserStore>,
}

impl UserDirectory {
    pub fn new(users: Arc<dyn UserStore>) -> Self {
        Self { users }
    }

    /// `elevated_by` 为管理员时才采用请求中的角色
    pub async fn register(
        &self,
        input: Registration,
        elevated_by: Option<&User>,
    ) -> Result<(User, UserProfile)> {
        let username = input.username.trim().to_string();
        let email = input.email.trim().to_string();
        let full_name = input.full_name.trim().to_string();
        let password = input.password.trim();

        if !is_valid_email(&email) {
            return Err(DirectoryError::Validation("Invalid email address!".into()));
        }
        validate_username(&username)?;
        check_password_length(password).map_err(|msg| DirectoryError::Validation(msg.into()))?;

        if self.users.email_taken(&email, None).await? {
            return Err(DirectoryError::Conflict(format!(
                "Email : {email} already exists!"
            )));
        }
        if self.users.username_taken(&username, None).await? {
            return Err(DirectoryError::Conflict("Username already exists!".into()));
        }

        let role = match elevated_by {
            Some(admin) if admin.is_admin() => input.role.unwrap_or(Role::User),
            _ => Role::User,
        };
        let actor = elevated_by
            .map(|a| a.username.clone())
            .unwrap_or_else(|| username.clone());
        let now = Utc::now();

        let user = User {
            id: Uuid::new_v4().simple().to_string(),
            username,
            password_hash: hash_password(password)?,
            is_active: true,
            role,
            deleted: false,
            created_by: actor.clone(),
            created_date: now,
            updated_by: actor.clone(),
            updated_date: None,
        };
        let profile = UserProfile {
            id: Uuid::new_v4().simple().to_string(),
            id_user: user.id.clone(),
            full_name,
            email,
            deleted: false,
            created_by: actor.clone(),
            created_date: now,
            updated_by: actor,
            updated_date: None,
        };

        self.users.insert_with_profile(&user, &profile).await?;
        info!("Registered user {} with role {}", user.id, user.role);
        Ok((user, profile))
    }

    pub async fn authenticate_credentials(&self, username: &str, password: &str) -> Result<User> {
        let username = username.trim();
        let password = password.trim();
        validate_username(username)?;
        check_password_length(password).map_err(|msg| DirectoryError::Validation(msg.into()))?;

        let user = self
            .users
            .find_active_by_username(username)
            .await?
            .ok_or(DirectoryError::UserNotFound)?;

        if !verify_password(password, &user.password_hash) {
            return Err(DirectoryError::BadCredentials);
        }
        info!("User {} logged in", user.id);
        Ok(user)
    }

    pub async fn account(&self, user_id: &str) -> Result<Account> {
        let user = self
            .users
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| user_not_found(user_id))?;
        let profile = self.users.find_profile(user_id).await?;
        Ok(Account { user, profile })
    }

    pub async fn list_accounts(&self) -> Result<Vec<Account>> {
        let rows = self.users.list_with_profiles().await?;
        Ok(rows
            .into_iter()
            .map(|(user, profile)| Account { user, profile })
            .collect())
    }

    pub async fn update_user(&self, user_id: &str, update: UserUpdate, actor: &str) -> Result<Account> {
        let current = self.account(user_id).await?;
        let mut changes = UserChanges::new(user_id, actor);

        if let Some(username) = update.username.map(|u| u.trim().to_string()) {
            validate_username(&username)?;
            if username != current.user.username {
                if self.users.username_taken(&username, Some(user_id)).await? {
                    return Err(DirectoryError::Conflict(format!(
                        "Username : {username} already exists!"
                    )));
                }
                changes.username = Some(username);
            }
        }

        if let Some(email) = update.email.map(|e| e.trim().to_string()) {
            if !is_valid_email(&email) {
                return Err(DirectoryError::Validation("Invalid email address!".into()));
            }
            if self.users.email_taken(&email, Some(user_id)).await? {
                return Err(DirectoryError::Conflict(format!(
                    "Email : {email} already exists!"
                )));
            }
            changes.email = Some(email);
        }

        changes.full_name = update.full_name.map(|n| n.trim().to_string());
        changes.role = update.role;
        changes.is_active = update.is_active;

        if changes.touches_profile() && current.profile.is_none() {
            return Err(DirectoryError::NotFound("User profile not found!".into()));
        }

        if !changes.is_empty() {
            self.users.update(&changes).await?;
        }
        self.account(user_id).await
    }

    pub async fn change_password(
        &self,
        user_id: &str,
        old_password: &str,
        new_password: &str,
        confirm_password: &str,
    ) -> Result<()> {
        let (old_password, new_password) = (old_password.trim(), new_password.trim());
        if new_password != confirm_password.trim() {
            return Err(DirectoryError::Validation(
                "New password and confirmation do not match!".into(),
            ));
        }
        check_password_length(new_password)
            .map_err(|msg| DirectoryError::Validation(msg.into()))?;

        let user = self
            .users
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| user_not_found(user_id))?;
        if !verify_password(old_password, &user.password_hash) {
            return Err(DirectoryError::Validation("Old password is incorrect!".into()));
        }

        let mut changes = UserChanges::new(user_id, user.username.as_str());
        changes.password_hash = Some(hash_password(new_password)?);
        self.users.update(&changes).await?;
        info!("User {} changed password", user_id);
        Ok(())
    }

    pub async fn soft_delete(&self, user_id: &str, actor: &User) -> Result<()> {
        if actor.id == user_id {
            return Err(DirectoryError::Validation("Cannot delete yourself".into()));
        }
        if !self.users.soft_delete(user_id, &actor.username).await? {
            return Err(user_not_found(user_id));
        }
        info!("User {} soft-deleted by {}", user_id, actor.id);
        Ok(())
    }

    pub async fn set_active(&self, user_id: &str, is_active: bool, actor: &str) -> Result<Account> {
        self.update_user(
            user_id,
            UserUpdate {
                is_active: Some(is_active),
                ..Default::default()
            },
            actor,
        )
        .await
    }

    pub async fn set_role(&self, user_id: &str, role: Role, actor: &str) -> Result<Account> {
        self.update_user(
            user_id,
            UserUpdate {
                role: Some(role),
                ..Default::default()
            },
            actor,
        )
        .await
    }

    pub async fn statistics(&self) -> Result<UserStatistics> {
        Ok(self.users.statistics().await?)
    }
}

fn validate_username(username: &str) -> Result<()> {
    if username.is_empty() {
        return Err(DirectoryError::Validation("Username couldn't be empty!".into()));
    }
    Ok(())
}

fn user_not_found(user_id: &str) -> DirectoryError {
    DirectoryError::NotFound(format!("User with id {user_id} not found!"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::password::sha256_hex;
    use crate::testing::{MemoryStore, sample_user};

    fn directory() -> (UserDirectory, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::default());
        (UserDirectory::new(store.clone()), store)
    }

    fn alice() -> Registration {
        Registration {
            username: " alice ".into(),
            password: "Passw0rd!".into(),
            full_name: "Alice Liddell".into(),
            email: "alice@example.com".into(),
            role: Some(Role::Admin),
        }
    }

    #[tokio::test]
    async fn register_then_login_returns_same_user() {
        let (dir, _) = directory();
        let (user, profile) = dir.register(alice(), None).await.unwrap();

        assert_eq!(user.username, "alice");
        // 自助注册不能提升角色
        assert_eq!(user.role, Role::User);
        assert_eq!(profile.id_user, user.id);

        let logged_in = dir.authenticate_credentials("alice", "Passw0rd!").await.unwrap();
        assert_eq!(logged_in.id, user.id);
    }

    #[tokio::test]
    async fn admin_can_choose_the_role() {
        let (dir, _) = directory();
        let admin = sample_user("root", Role::Admin);
        let (user, _) = dir.register(alice(), Some(&admin)).await.unwrap();
        assert_eq!(user.role, Role::Admin);
        assert_eq!(user.created_by, "root");
    }

    #[tokio::test]
    async fn duplicate_email_conflicts_without_partial_rows() {
        let (dir, store) = directory();
        dir.register(alice(), None).await.unwrap();

        let mut second = alice();
        second.username = "alice2".into();
        let err = dir.register(second, None).await.unwrap_err();
        assert!(matches!(err, DirectoryError::Conflict(ref m) if m.contains("alice@example.com")));
        assert_eq!(store.user_count(), 1);
        assert_eq!(store.profile_count(), 1);
    }

    #[tokio::test]
    async fn registration_validates_inputs() {
        let (dir, _) = directory();

        let mut bad_email = alice();
        bad_email.email = "not-an-email".into();
        assert!(matches!(dir.register(bad_email, None).await, Err(DirectoryError::Validation(_))));

        let mut blank = alice();
        blank.username = "   ".into();
        assert!(matches!(dir.register(blank, None).await, Err(DirectoryError::Validation(_))));

        let mut short = alice();
        short.password = "short".into();
        assert!(matches!(dir.register(short, None).await, Err(DirectoryError::Validation(_))));
    }

    #[tokio::test]
    async fn login_distinguishes_missing_user_from_bad_password() {
        let (dir, _) = directory();
        dir.register(alice(), None).await.unwrap();

        assert!(matches!(
            dir.authenticate_credentials("nobody", "Passw0rd!").await,
            Err(DirectoryError::UserNotFound)
        ));
        assert!(matches!(
            dir.authenticate_credentials("alice", "Wrong-pass").await,
            Err(DirectoryError::BadCredentials)
        ));
    }

    #[tokio::test]
    async fn passwords_are_trimmed_like_usernames() {
        let (dir, _) = directory();
        let mut padded = alice();
        padded.password = " Passw0rd! ".into();
        let (user, _) = dir.register(padded, None).await.unwrap();

        let logged_in = dir.authenticate_credentials("alice", "Passw0rd!").await.unwrap();
        assert_eq!(logged_in.id, user.id);
        assert!(dir.authenticate_credentials("alice", "\tPassw0rd!\n").await.is_ok());

        dir.change_password(&user.id, " Passw0rd!", "NewPassw0rd ", " NewPassw0rd")
            .await
            .unwrap();
        assert!(dir.authenticate_credentials("alice", "NewPassw0rd").await.is_ok());

        // 仅由空白组成的密码按过短处理
        let mut blank = alice();
        blank.username = "blank".into();
        blank.email = "blank@example.com".into();
        blank.password = "          ".into();
        assert!(matches!(dir.register(blank, None).await, Err(DirectoryError::Validation(_))));
    }

    #[tokio::test]
    async fn legacy_digest_accounts_can_log_in() {
        let (dir, store) = directory();
        let mut user = sample_user("legacy", Role::User);
        user.password_hash = sha256_hex("OldPassw0rd");
        store.put_user(user.clone());

        let logged_in = dir.authenticate_credentials("legacy", "OldPassw0rd").await.unwrap();
        assert_eq!(logged_in.id, user.id);
    }

    #[tokio::test]
    async fn update_rechecks_uniqueness_excluding_self() {
        let (dir, _) = directory();
        let (a, _) = dir.register(alice(), None).await.unwrap();
        let mut bob = alice();
        bob.username = "bob".into();
        bob.email = "bob@example.com".into();
        dir.register(bob, None).await.unwrap();

        // 保留自己的邮箱不算冲突
        let same = UserUpdate {
            email: Some("alice@example.com".into()),
            full_name: Some("Alice L.".into()),
            ..Default::default()
        };
        let account = dir.update_user(&a.id, same, "alice").await.unwrap();
        assert_eq!(account.profile.unwrap().full_name, "Alice L.");

        let steal = UserUpdate {
            email: Some("bob@example.com".into()),
            ..Default::default()
        };
        assert!(matches!(
            dir.update_user(&a.id, steal, "alice").await,
            Err(DirectoryError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn change_password_requires_old_password_and_confirmation() {
        let (dir, _) = directory();
        let (user, _) = dir.register(alice(), None).await.unwrap();

        assert!(matches!(
            dir.change_password(&user.id, "Passw0rd!", "NewPassw0rd", "Mismatch00").await,
            Err(DirectoryError::Validation(_))
        ));
        assert!(matches!(
            dir.change_password(&user.id, "wrong-old-pw", "NewPassw0rd", "NewPassw0rd").await,
            Err(DirectoryError::Validation(_))
        ));

        dir.change_password(&user.id, "Passw0rd!", "NewPassw0rd", "NewPassw0rd")
            .await
            .unwrap();
        assert!(dir.authenticate_credentials("alice", "NewPassw0rd").await.is_ok());
        assert!(matches!(
            dir.authenticate_credentials("alice", "Passw0rd!").await,
            Err(DirectoryError::BadCredentials)
        ));
    }

    #[tokio::test]
    async fn soft_delete_hides_user_and_guards_self() {
        let (dir, _) = directory();
        let admin = sample_user("root", Role::Admin);
        let (user, _) = dir.register(alice(), None).await.unwrap();

        assert!(matches!(
            dir.soft_delete(&admin.id, &admin).await,
            Err(DirectoryError::Validation(_))
        ));

        dir.soft_delete(&user.id, &admin).await.unwrap();
        assert!(matches!(
            dir.authenticate_credentials("alice", "Passw0rd!").await,
            Err(DirectoryError::UserNotFound)
        ));
        assert!(matches!(dir.soft_delete(&user.id, &admin).await, Err(DirectoryError::NotFound(_))));
    }

    #[tokio::test]
    async fn deactivated_users_cannot_log_in_and_roles_change() {
        let (dir, _) = directory();
        let (user, _) = dir.register(alice(), None).await.unwrap();

        let promoted = dir.set_role(&user.id, Role::Admin, "root").await.unwrap();
        assert_eq!(promoted.user.role, Role::Admin);
        assert_eq!(promoted.user.updated_by, "root");

        dir.set_active(&user.id, false, "root").await.unwrap();
        assert!(matches!(
            dir.authenticate_credentials("alice", "Passw0rd!").await,
            Err(DirectoryError::UserNotFound)
        ));

        let stats = dir.statistics().await.unwrap();
        assert_eq!(stats.total_users, 1);
        assert_eq!(stats.admin_users, 1);
    }
}

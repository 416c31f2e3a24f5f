use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder};

use crate::database::models::{Role, User, UserProfile, UserStatistics};
use crate::database::{StoreError, active_only, map_write_error};

const USER_COLUMNS: &str = "u.id, u.username, u.password, u.is_active, u.role, u.deleted, \
     u.created_by, u.created_date, u.updated_by, u.updated_date";

const PROFILE_COLUMNS: &str = "p.id, p.id_user, p.nama_lengkap, p.email, p.deleted, \
     p.created_by, p.created_date, p.updated_by, p.updated_date";

/// 用户与资料的部分更新，None 表示该字段保持不变
#[derive(Debug, Clone)]
pub struct UserChanges {
    pub user_id: String,
    pub username: Option<String>,
    pub password_hash: Option<String>,
    pub is_active: Option<bool>,
    pub role: Option<Role>,
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub updated_by: String,
    pub updated_date: DateTime<Utc>,
}

impl UserChanges {
    pub fn new(user_id: impl Into<String>, updated_by: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            username: None,
            password_hash: None,
            is_active: None,
            role: None,
            full_name: None,
            email: None,
            updated_by: updated_by.into(),
            updated_date: Utc::now(),
        }
    }

    pub fn touches_user(&self) -> bool {
        self.username.is_some()
            || self.password_hash.is_some()
            || self.is_active.is_some()
            || self.role.is_some()
    }

    pub fn touches_profile(&self) -> bool {
        self.full_name.is_some() || self.email.is_some()
    }

    pub fn is_empty(&self) -> bool {
        !self.touches_user() && !self.touches_profile()
    }
}

/// 用户目录的持久化接口
///
/// 所有读取都只返回未软删除的行。
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_id(&self, user_id: &str) -> Result<Option<User>, StoreError>;

    /// 未删除且处于启用状态
    async fn find_active_by_id(&self, user_id: &str) -> Result<Option<User>, StoreError>;

    async fn find_active_by_username(&self, username: &str) -> Result<Option<User>, StoreError>;

    async fn find_profile(&self, user_id: &str) -> Result<Option<UserProfile>, StoreError>;

    async fn list_with_profiles(&self) -> Result<Vec<(User, Option<UserProfile>)>, StoreError>;

    async fn username_taken(
        &self,
        username: &str,
        exclude_user_id: Option<&str>,
    ) -> Result<bool, StoreError>;

    async fn email_taken(
        &self,
        email: &str,
        exclude_user_id: Option<&str>,
    ) -> Result<bool, StoreError>;

    /// 用户和资料要么都写入，要么都不写入
    async fn insert_with_profile(
        &self,
        user: &User,
        profile: &UserProfile,
    ) -> Result<(), StoreError>;

    /// 返回是否有行被修改
    async fn update(&self, changes: &UserChanges) -> Result<bool, StoreError>;

    /// 同时软删除用户及其资料
    async fn soft_delete(&self, user_id: &str, deleted_by: &str) -> Result<bool, StoreError>;

    async fn statistics(&self) -> Result<UserStatistics, StoreError>;
}

/// Postgres 实现
#[derive(Clone)]
pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_user(&self, filter: &str, value: &str) -> Result<Option<User>, StoreError> {
        let sql = format!(
            r#"SELECT {USER_COLUMNS} FROM "user" u WHERE {filter} AND {}"#,
            active_only("u")
        );
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_by_id(&self, user_id: &str) -> Result<Option<User>, StoreError> {
        self.fetch_user("u.id = $1", user_id).await
    }

    async fn find_active_by_id(&self, user_id: &str) -> Result<Option<User>, StoreError> {
        self.fetch_user("u.id = $1 AND u.is_active = TRUE", user_id)
            .await
    }

    async fn find_active_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        self.fetch_user("u.username = $1 AND u.is_active = TRUE", username)
            .await
    }

    async fn find_profile(&self, user_id: &str) -> Result<Option<UserProfile>, StoreError> {
        let sql = format!(
            "SELECT {PROFILE_COLUMNS} FROM user_profile p WHERE p.id_user = $1 AND {}",
            active_only("p")
        );
        let profile = sqlx::query_as::<_, UserProfile>(&sql)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(profile)
    }

    async fn list_with_profiles(&self) -> Result<Vec<(User, Option<UserProfile>)>, StoreError> {
        let sql = format!(
            r#"SELECT {USER_COLUMNS} FROM "user" u WHERE {} ORDER BY u.created_date DESC"#,
            active_only("u")
        );
        let users = sqlx::query_as::<_, User>(&sql)
            .fetch_all(&self.pool)
            .await?;

        let ids: Vec<String> = users.iter().map(|u| u.id.clone()).collect();
        let sql = format!(
            "SELECT {PROFILE_COLUMNS} FROM user_profile p WHERE p.id_user = ANY($1) AND {}",
            active_only("p")
        );
        let mut profiles: HashMap<String, UserProfile> = sqlx::query_as::<_, UserProfile>(&sql)
            .bind(&ids)
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(|p| (p.id_user.clone(), p))
            .collect();

        Ok(users
            .into_iter()
            .map(|u| {
                let profile = profiles.remove(&u.id);
                (u, profile)
            })
            .collect())
    }

    async fn username_taken(
        &self,
        username: &str,
        exclude_user_id: Option<&str>,
    ) -> Result<bool, StoreError> {
        let sql = format!(
            r#"SELECT EXISTS(
                SELECT 1 FROM "user" u
                WHERE u.username = $1 AND {} AND ($2::VARCHAR IS NULL OR u.id <> $2)
            )"#,
            active_only("u")
        );
        let taken = sqlx::query_scalar::<_, bool>(&sql)
            .bind(username)
            .bind(exclude_user_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(taken)
    }

    async fn email_taken(
        &self,
        email: &str,
        exclude_user_id: Option<&str>,
    ) -> Result<bool, StoreError> {
        let sql = format!(
            r#"SELECT EXISTS(
                SELECT 1 FROM user_profile p
                WHERE p.email = $1 AND {} AND ($2::VARCHAR IS NULL OR p.id_user <> $2)
            )"#,
            active_only("p")
        );
        let taken = sqlx::query_scalar::<_, bool>(&sql)
            .bind(email)
            .bind(exclude_user_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(taken)
    }

    async fn insert_with_profile(
        &self,
        user: &User,
        profile: &UserProfile,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO "user" (id, username, password, is_active, role, deleted,
                                created_by, created_date, updated_by, updated_date)
            VALUES ($1, $2, $3, $4, $5, FALSE, $6, $7, $8, $9)
            "#,
        )
        .bind(&user.id)
        .bind(&user.username)
        .bind(&user.password_hash)
        .bind(user.is_active)
        .bind(user.role.as_str())
        .bind(&user.created_by)
        .bind(user.created_date)
        .bind(&user.updated_by)
        .bind(user.updated_date)
        .execute(&mut *tx)
        .await
        .map_err(map_write_error)?;

        sqlx::query(
            r#"
            INSERT INTO user_profile (id, id_user, nama_lengkap, email, deleted,
                                      created_by, created_date, updated_by, updated_date)
            VALUES ($1, $2, $3, $4, FALSE, $5, $6, $7, $8)
            "#,
        )
        .bind(&profile.id)
        .bind(&profile.id_user)
        .bind(&profile.full_name)
        .bind(&profile.email)
        .bind(&profile.created_by)
        .bind(profile.created_date)
        .bind(&profile.updated_by)
        .bind(profile.updated_date)
        .execute(&mut *tx)
        .await
        .map_err(map_write_error)?;

        tx.commit().await?;
        Ok(())
    }

    async fn update(&self, changes: &UserChanges) -> Result<bool, StoreError> {
        if changes.is_empty() {
            return Ok(false);
        }

        let mut tx = self.pool.begin().await?;
        let mut touched = false;

        if changes.touches_user() {
            let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(r#"UPDATE "user" u SET "#);
            let mut set = qb.separated(", ");
            if let Some(username) = &changes.username {
                set.push("username = ").push_bind_unseparated(username.clone());
            }
            if let Some(hash) = &changes.password_hash {
                set.push("password = ").push_bind_unseparated(hash.clone());
            }
            if let Some(is_active) = changes.is_active {
                set.push("is_active = ").push_bind_unseparated(is_active);
            }
            if let Some(role) = changes.role {
                set.push("role = ").push_bind_unseparated(role.as_str());
            }
            set.push("updated_by = ")
                .push_bind_unseparated(changes.updated_by.clone());
            set.push("updated_date = ")
                .push_bind_unseparated(changes.updated_date);
            qb.push(" WHERE u.id = ")
                .push_bind(changes.user_id.clone())
                .push(" AND ")
                .push(active_only("u"));

            let result = qb
                .build()
                .execute(&mut *tx)
                .await
                .map_err(map_write_error)?;
            touched |= result.rows_affected() > 0;
        }

        if changes.touches_profile() {
            let mut qb: QueryBuilder<Postgres> = QueryBuilder::new("UPDATE user_profile p SET ");
            let mut set = qb.separated(", ");
            if let Some(full_name) = &changes.full_name {
                set.push("nama_lengkap = ")
                    .push_bind_unseparated(full_name.clone());
            }
            if let Some(email) = &changes.email {
                set.push("email = ").push_bind_unseparated(email.clone());
            }
            set.push("updated_by = ")
                .push_bind_unseparated(changes.updated_by.clone());
            set.push("updated_date = ")
                .push_bind_unseparated(changes.updated_date);
            qb.push(" WHERE p.id_user = ")
                .push_bind(changes.user_id.clone())
                .push(" AND ")
                .push(active_only("p"));

            let result = qb
                .build()
                .execute(&mut *tx)
                .await
                .map_err(map_write_error)?;
            touched |= result.rows_affected() > 0;
        }

        tx.commit().await?;
        Ok(touched)
    }

    async fn soft_delete(&self, user_id: &str, deleted_by: &str) -> Result<bool, StoreError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let sql = format!(
            r#"UPDATE "user" u SET deleted = TRUE, updated_by = $2, updated_date = $3
               WHERE u.id = $1 AND {}"#,
            active_only("u")
        );
        let result = sqlx::query(&sql)
            .bind(user_id)
            .bind(deleted_by)
            .bind(now)
            .execute(&mut *tx)
            .await?;

        let sql = format!(
            "UPDATE user_profile p SET deleted = TRUE, updated_by = $2, updated_date = $3
             WHERE p.id_user = $1 AND {}",
            active_only("p")
        );
        sqlx::query(&sql)
            .bind(user_id)
            .bind(deleted_by)
            .bind(now)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    async fn statistics(&self) -> Result<UserStatistics, StoreError> {
        let sql = format!(
            r#"SELECT
                COUNT(*) AS total_users,
                COUNT(*) FILTER (WHERE UPPER(u.role) = 'ADMIN') AS admin_users,
                COUNT(*) FILTER (WHERE UPPER(u.role) = 'USER') AS regular_users
               FROM "user" u WHERE {}"#,
            active_only("u")
        );
        let stats = sqlx::query_as::<_, UserStatistics>(&sql)
            .fetch_one(&self.pool)
            .await?;
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn changes_report_which_tables_they_touch() {
        let mut changes = UserChanges::new("u1", "admin");
        assert!(changes.is_empty());

        changes.email = Some("a@b.co".into());
        assert!(changes.touches_profile());
        assert!(!changes.touches_user());

        changes.role = Some(Role::Admin);
        assert!(changes.touches_user());
        assert!(!changes.is_empty());
    }
}

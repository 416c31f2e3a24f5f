// 数据库模块
// 包含连接池、迁移、实体定义和存储库

pub mod models;
pub mod repositories;

use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Executor;
use thiserror::Error;

use crate::config::Config;

pub use repositories::chat::{ChatBatch, ChatStore, PgChatStore};
pub use repositories::user::{PgUserStore, UserChanges, UserStore};

/// 存储层错误
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("unique constraint violated: {0}")]
    Conflict(String),
    #[error("chat history {0} no longer exists")]
    HistoryGone(String),
}

/// 软删除过滤条件，每条查询都通过它组合 `deleted = FALSE`
pub fn active_only(alias: &str) -> String {
    format!("{alias}.deleted = FALSE")
}

/// 写入失败时把唯一约束冲突单独区分出来
pub(crate) fn map_write_error(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db) = &err {
        if db.is_unique_violation() {
            let constraint = db.constraint().unwrap_or("unique").to_string();
            return StoreError::Conflict(constraint);
        }
    }
    StoreError::Database(err)
}

pub async fn connect(config: &Config) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .after_connect(|conn, _meta| {
            Box::pin(async move {
                conn.execute("SET application_name = 'aksara_backend';")
                    .await?;
                Ok(())
            })
        })
        .connect(&config.database_url)
        .await
}

pub async fn migrate(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn active_only_targets_the_given_alias() {
        assert_eq!(active_only("u"), "u.deleted = FALSE");
        assert_eq!(active_only("chat_messages"), "chat_messages.deleted = FALSE");
    }
}

use async_trait::async_trait;
use chrono::{DateTime, Duration, SubsecRound, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::database::models::{ChatHistory, ChatMessage, HistoryOverview, Sender};
use crate::database::{StoreError, active_only, map_write_error};

const HISTORY_COLUMNS: &str = "h.id, h.user_id, h.title, h.model, h.language, h.is_active, \
     h.deleted, h.created_by, h.created_date, h.updated_by, h.updated_date";

const MESSAGE_COLUMNS: &str =
    "m.id, m.chat_history_id, m.sender, m.text, m.deleted, m.created_date, m.updated_date";

/// 一次对话轮次中待提交的写入
///
/// 暂存新会话、消息和标题，由 [`ChatStore::commit`] 在同一事务中落库。
/// 消息时间戳严格递增（微秒精度），保证按 created_date 排序的结果确定。
#[derive(Debug, Clone)]
pub struct ChatBatch {
    history_id: String,
    new_history: Option<ChatHistory>,
    messages: Vec<ChatMessage>,
    title: Option<String>,
    actor: Option<String>,
}

impl ChatBatch {
    pub fn for_existing(history: &ChatHistory) -> Self {
        Self {
            history_id: history.id.clone(),
            new_history: None,
            messages: Vec::new(),
            title: None,
            actor: None,
        }
    }

    pub fn for_new(history: ChatHistory) -> Self {
        Self {
            history_id: history.id.clone(),
            new_history: Some(history),
            messages: Vec::new(),
            title: None,
            actor: None,
        }
    }

    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    pub fn history_id(&self) -> &str {
        &self.history_id
    }

    pub fn new_history(&self) -> Option<&ChatHistory> {
        self.new_history.as_ref()
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    pub fn actor(&self) -> Option<&str> {
        self.actor.as_deref()
    }

    /// 暂存一条消息，不会提交
    pub fn append_turn(&mut self, sender: Sender, text: impl Into<String>) -> &ChatMessage {
        let now = Utc::now().trunc_subsecs(6);
        let created_date = match self.messages.last() {
            Some(prev) if now <= prev.created_date => prev.created_date + Duration::microseconds(1),
            _ => now,
        };

        self.messages.push(ChatMessage {
            id: Uuid::new_v4().to_string(),
            chat_history_id: self.history_id.clone(),
            sender,
            text: text.into(),
            deleted: false,
            created_date,
            updated_date: created_date,
        });
        &self.messages[self.messages.len() - 1]
    }

    /// 只保留第一次设置的标题
    pub fn set_title_once(&mut self, title: impl Into<String>) {
        if self.title.is_none() {
            self.title = Some(title.into());
        }
    }

    pub fn last_activity(&self) -> DateTime<Utc> {
        self.messages
            .last()
            .map(|m| m.created_date)
            .unwrap_or_else(Utc::now)
    }
}

/// 会话与消息的持久化接口
///
/// 读取只返回未软删除的行。
#[async_trait]
pub trait ChatStore: Send + Sync {
    /// 按 id 查询，且必须属于该用户
    async fn find_history(
        &self,
        history_id: &str,
        user_id: &str,
    ) -> Result<Option<ChatHistory>, StoreError>;

    /// 用户启用中的会话及消息概况，按更新时间倒序
    async fn list_histories(&self, user_id: &str) -> Result<Vec<HistoryOverview>, StoreError>;

    /// 按创建时间升序
    async fn list_messages(&self, history_id: &str) -> Result<Vec<ChatMessage>, StoreError>;

    async fn find_message(&self, message_id: &str) -> Result<Option<ChatMessage>, StoreError>;

    /// 在一个事务中写入整批内容，失败时全部回滚
    async fn commit(&self, batch: ChatBatch) -> Result<(), StoreError>;

    /// 软删除会话及其所有消息
    async fn soft_delete_history(
        &self,
        history_id: &str,
        deleted_by: &str,
    ) -> Result<bool, StoreError>;

    async fn soft_delete_message(&self, message_id: &str) -> Result<bool, StoreError>;
}

#[derive(Clone)]
pub struct PgChatStore {
    pool: PgPool,
}

impl PgChatStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ChatStore for PgChatStore {
    async fn find_history(
        &self,
        history_id: &str,
        user_id: &str,
    ) -> Result<Option<ChatHistory>, StoreError> {
        let sql = format!(
            "SELECT {HISTORY_COLUMNS} FROM chat_histories h
             WHERE h.id = $1 AND h.user_id = $2 AND {}",
            active_only("h")
        );
        let history = sqlx::query_as::<_, ChatHistory>(&sql)
            .bind(history_id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(history)
    }

    async fn list_histories(&self, user_id: &str) -> Result<Vec<HistoryOverview>, StoreError> {
        let live_messages = active_only("m");
        let sql = format!(
            "SELECT {HISTORY_COLUMNS},
                    (SELECT COUNT(*) FROM chat_messages m
                     WHERE m.chat_history_id = h.id AND {live_messages}) AS message_count,
                    (SELECT m.text FROM chat_messages m
                     WHERE m.chat_history_id = h.id AND {live_messages}
                     ORDER BY m.created_date DESC LIMIT 1) AS last_message
             FROM chat_histories h
             WHERE h.user_id = $1 AND h.is_active = TRUE AND {}
             ORDER BY h.updated_date DESC",
            active_only("h")
        );
        let histories = sqlx::query_as::<_, HistoryOverview>(&sql)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(histories)
    }

    async fn list_messages(&self, history_id: &str) -> Result<Vec<ChatMessage>, StoreError> {
        let sql = format!(
            "SELECT {MESSAGE_COLUMNS} FROM chat_messages m
             WHERE m.chat_history_id = $1 AND {}
             ORDER BY m.created_date ASC",
            active_only("m")
        );
        let messages = sqlx::query_as::<_, ChatMessage>(&sql)
            .bind(history_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(messages)
    }

    async fn find_message(&self, message_id: &str) -> Result<Option<ChatMessage>, StoreError> {
        let sql = format!(
            "SELECT {MESSAGE_COLUMNS} FROM chat_messages m WHERE m.id = $1 AND {}",
            active_only("m")
        );
        let message = sqlx::query_as::<_, ChatMessage>(&sql)
            .bind(message_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(message)
    }

    async fn commit(&self, batch: ChatBatch) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        if let Some(history) = batch.new_history() {
            sqlx::query(
                r#"
                INSERT INTO chat_histories (id, user_id, title, model, language, is_active,
                                            deleted, created_by, created_date, updated_by, updated_date)
                VALUES ($1, $2, $3, $4, $5, $6, FALSE, $7, $8, $9, $10)
                "#,
            )
            .bind(&history.id)
            .bind(&history.user_id)
            .bind(&history.title)
            .bind(&history.model)
            .bind(&history.language)
            .bind(history.is_active)
            .bind(&history.created_by)
            .bind(history.created_date)
            .bind(&history.updated_by)
            .bind(history.updated_date)
            .execute(&mut *tx)
            .await
            .map_err(map_write_error)?;
        }

        // 按暂存顺序插入：先用户消息，后助手消息
        for message in batch.messages() {
            sqlx::query(
                r#"
                INSERT INTO chat_messages (id, chat_history_id, sender, text, deleted,
                                           created_date, updated_date)
                VALUES ($1, $2, $3, $4, FALSE, $5, $6)
                "#,
            )
            .bind(&message.id)
            .bind(&message.chat_history_id)
            .bind(message.sender.as_str())
            .bind(&message.text)
            .bind(message.created_date)
            .bind(message.updated_date)
            .execute(&mut *tx)
            .await
            .map_err(map_write_error)?;
        }

        let sql = format!(
            "UPDATE chat_histories h
             SET title = COALESCE($2, h.title),
                 updated_by = COALESCE($3, h.updated_by),
                 updated_date = $4
             WHERE h.id = $1 AND {}",
            active_only("h")
        );
        let result = sqlx::query(&sql)
            .bind(batch.history_id())
            .bind(batch.title())
            .bind(batch.actor())
            .bind(batch.last_activity())
            .execute(&mut *tx)
            .await?;

        // 会话在提交前被删除时放弃整批写入
        if result.rows_affected() == 0 {
            return Err(StoreError::HistoryGone(batch.history_id().to_string()));
        }

        tx.commit().await?;
        Ok(())
    }

    async fn soft_delete_history(
        &self,
        history_id: &str,
        deleted_by: &str,
    ) -> Result<bool, StoreError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let sql = format!(
            "UPDATE chat_histories h SET deleted = TRUE, updated_by = $2, updated_date = $3
             WHERE h.id = $1 AND {}",
            active_only("h")
        );
        let result = sqlx::query(&sql)
            .bind(history_id)
            .bind(deleted_by)
            .bind(now)
            .execute(&mut *tx)
            .await?;

        let sql = format!(
            "UPDATE chat_messages m SET deleted = TRUE, updated_date = $2
             WHERE m.chat_history_id = $1 AND {}",
            active_only("m")
        );
        sqlx::query(&sql)
            .bind(history_id)
            .bind(now)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    async fn soft_delete_message(&self, message_id: &str) -> Result<bool, StoreError> {
        let sql = format!(
            "UPDATE chat_messages m SET deleted = TRUE, updated_date = $2
             WHERE m.id = $1 AND {}",
            active_only("m")
        );
        let result = sqlx::query(&sql)
            .bind(message_id)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn history() -> ChatHistory {
        let now = Utc::now();
        ChatHistory {
            id: "h1".into(),
            user_id: "u1".into(),
            title: Some("New Chat".into()),
            model: "gemini-2.5-flash".into(),
            language: "id".into(),
            is_active: true,
            deleted: false,
            created_by: None,
            created_date: now,
            updated_by: None,
            updated_date: now,
        }
    }

    #[test]
    fn appended_turns_get_strictly_increasing_timestamps() {
        let mut batch = ChatBatch::for_new(history());
        for i in 0..10 {
            let sender = if i % 2 == 0 { Sender::User } else { Sender::Assistant };
            batch.append_turn(sender, format!("m{i}"));
        }

        let messages = batch.messages();
        assert_eq!(messages.len(), 10);
        assert!(messages.windows(2).all(|w| w[0].created_date < w[1].created_date));
        assert!(messages.iter().all(|m| m.chat_history_id == "h1"));
        assert_eq!(messages[0].sender, Sender::User);
    }

    #[test]
    fn title_is_only_set_once() {
        let mut batch = ChatBatch::for_existing(&history());
        batch.set_title_once("first");
        batch.set_title_once("second");
        assert_eq!(batch.title(), Some("first"));
        assert!(batch.new_history().is_none());
    }
}

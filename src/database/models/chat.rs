use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use thiserror::Error;

/// 消息发送方
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Assistant,
}

#[derive(Debug, Error)]
#[error("unknown sender: {0}")]
pub struct UnknownSender(pub String);

impl Sender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sender::User => "user",
            Sender::Assistant => "assistant",
        }
    }
}

impl TryFrom<String> for Sender {
    type Error = UnknownSender;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "user" => Ok(Sender::User),
            "assistant" => Ok(Sender::Assistant),
            _ => Err(UnknownSender(value)),
        }
    }
}

/// 会话实体，对应 chat_histories 表
#[derive(Debug, Clone, FromRow)]
pub struct ChatHistory {
    pub id: String,
    pub user_id: String,
    pub title: Option<String>,
    pub model: String,
    pub language: String,
    pub is_active: bool,
    pub deleted: bool,
    pub created_by: Option<String>,
    pub created_date: DateTime<Utc>,
    pub updated_by: Option<String>,
    pub updated_date: DateTime<Utc>,
}

/// 会话列表的一行：会话本身加上未删除消息的数量和最后一条内容
#[derive(Debug, Clone, FromRow)]
pub struct HistoryOverview {
    #[sqlx(flatten)]
    pub history: ChatHistory,
    pub message_count: i64,
    pub last_message: Option<String>,
}

/// 单条消息，创建后不可修改
#[derive(Debug, Clone, FromRow)]
pub struct ChatMessage {
    pub id: String,
    pub chat_history_id: String,
    #[sqlx(try_from = "String")]
    pub sender: Sender,
    pub text: String,
    pub deleted: bool,
    pub created_date: DateTime<Utc>,
    pub updated_date: DateTime<Utc>,
}

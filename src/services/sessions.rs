use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::database::models::{ChatHistory, ChatMessage};
use crate::database::{ChatBatch, ChatStore, StoreError};
use crate::services::ChatError;

pub const DEFAULT_TITLE: &str = "New Chat";

/// 已解析（或新建但尚未落库）的会话
#[derive(Debug, Clone)]
pub struct OpenHistory {
    pub history: ChatHistory,
    pub batch: ChatBatch,
    pub is_new: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct HistorySummary {
    pub id: String,
    pub title: Option<String>,
    pub model: String,
    pub message_count: i64,
    pub last_message: Option<String>,
    pub created_date: DateTime<Utc>,
    pub updated_date: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct HistoryDetail {
    pub history: ChatHistory,
    pub messages: Vec<ChatMessage>,
}

/// 会话与消息，全部按用户隔离
#[derive(Clone)]
pub struct ChatSessions {
    chats: Arc<dyn ChatStore>,
    default_model: String,
    default_language: String,
}

impl ChatSessions {
    pub fn new(
        chats: Arc<dyn ChatStore>,
        default_model: impl Into<String>,
        default_language: impl Into<String>,
    ) -> Self {
        Self {
            chats,
            default_model: default_model.into(),
            default_language: default_language.into(),
        }
    }

    /// 新会话只在暂存区创建，随本轮对话一起提交
    pub async fn get_or_create_history(
        &self,
        user_id: &str,
        history_id: Option<&str>,
    ) -> Result<OpenHistory, ChatError> {
        if let Some(id) = history_id.map(str::trim).filter(|id| !id.is_empty()) {
            let history = self
                .chats
                .find_history(id, user_id)
                .await?
                .ok_or_else(|| history_not_found(id))?;
            let batch = ChatBatch::for_existing(&history).with_actor(user_id);
            return Ok(OpenHistory {
                history,
                batch,
                is_new: false,
            });
        }

        let now = Utc::now();
        let history = ChatHistory {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            title: Some(DEFAULT_TITLE.to_string()),
            model: self.default_model.clone(),
            language: self.default_language.clone(),
            is_active: true,
            deleted: false,
            created_by: Some(user_id.to_string()),
            created_date: now,
            updated_by: Some(user_id.to_string()),
            updated_date: now,
        };
        let batch = ChatBatch::for_new(history.clone()).with_actor(user_id);
        Ok(OpenHistory {
            history,
            batch,
            is_new: true,
        })
    }

    pub async fn list_messages(&self, history_id: &str) -> Result<Vec<ChatMessage>, ChatError> {
        Ok(self.chats.list_messages(history_id).await?)
    }

    pub async fn commit(&self, batch: ChatBatch) -> Result<(), ChatError> {
        let created = batch.new_history().map(|h| h.id.clone());
        match self.chats.commit(batch).await {
            Err(StoreError::HistoryGone(id)) => return Err(history_not_found(&id)),
            result => result?,
        }
        if let Some(id) = created {
            info!("Created chat history {}", id);
        }
        Ok(())
    }

    pub async fn list_histories(&self, user_id: &str) -> Result<Vec<HistorySummary>, ChatError> {
        let overviews = self.chats.list_histories(user_id).await?;
        Ok(overviews
            .into_iter()
            .map(|o| HistorySummary {
                id: o.history.id,
                title: o.history.title,
                model: o.history.model,
                message_count: o.message_count,
                last_message: o.last_message,
                created_date: o.history.created_date,
                updated_date: o.history.updated_date,
            })
            .collect())
    }

    pub async fn history_detail(
        &self,
        user_id: &str,
        history_id: &str,
    ) -> Result<HistoryDetail, ChatError> {
        let history = self
            .chats
            .find_history(history_id, user_id)
            .await?
            .ok_or_else(|| history_not_found(history_id))?;
        let messages = self.chats.list_messages(&history.id).await?;
        Ok(HistoryDetail { history, messages })
    }

    /// 先确认归属，再连同消息一起软删除
    pub async fn soft_delete_history(&self, user_id: &str, history_id: &str) -> Result<(), ChatError> {
        if self.chats.find_history(history_id, user_id).await?.is_none() {
            return Err(history_not_found(history_id));
        }
        if !self.chats.soft_delete_history(history_id, user_id).await? {
            return Err(history_not_found(history_id));
        }
        info!("Chat history {} deleted by {}", history_id, user_id);
        Ok(())
    }

    pub async fn delete_message(&self, user_id: &str, message_id: &str) -> Result<(), ChatError> {
        let not_found = || ChatError::NotFound(format!("Chat message {message_id} not found"));

        let message = self
            .chats
            .find_message(message_id)
            .await?
            .ok_or_else(not_found)?;
        // 别人的消息与不存在的消息返回同样的结果
        if self
            .chats
            .find_history(&message.chat_history_id, user_id)
            .await?
            .is_none()
        {
            return Err(not_found());
        }

        if !self.chats.soft_delete_message(message_id).await? {
            return Err(not_found());
        }
        Ok(())
    }
}

fn history_not_found(history_id: &str) -> ChatError {
    ChatError::NotFound(format!("Chat history {history_id} not found"))
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::database::models::{ChatMessage, Sender};
use crate::services::{HistoryDetail, HistorySummary, TurnInput, TurnOutcome};

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub input: String,
    pub chat_history_id: Option<String>,
    pub temperature: Option<f64>,
    pub max_tokens: Option<i64>,
}

impl From<ChatRequest> for TurnInput {
    fn from(req: ChatRequest) -> Self {
        Self {
            input: req.input,
            chat_history_id: req.chat_history_id,
            temperature: req.temperature,
            max_tokens: req.max_tokens,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub conversation_id: String,
    pub model: String,
    pub input: String,
    pub output: String,
    pub timestamp: DateTime<Utc>,
}

impl From<TurnOutcome> for ChatResponse {
    fn from(outcome: TurnOutcome) -> Self {
        Self {
            conversation_id: outcome.conversation_id,
            model: outcome.model,
            input: outcome.input,
            output: outcome.output,
            timestamp: outcome.timestamp,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HistoryListResponse {
    pub histories: Vec<HistorySummary>,
    pub total: usize,
}

#[derive(Debug, Serialize)]
pub struct MessageView {
    pub id: String,
    pub sender: Sender,
    pub text: String,
    pub created_date: DateTime<Utc>,
}

impl From<ChatMessage> for MessageView {
    fn from(message: ChatMessage) -> Self {
        Self {
            id: message.id,
            sender: message.sender,
            text: message.text,
            created_date: message.created_date,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HistoryDetailResponse {
    pub id: String,
    pub title: Option<String>,
    pub model: String,
    pub language: String,
    pub created_date: DateTime<Utc>,
    pub updated_date: DateTime<Utc>,
    pub messages: Vec<MessageView>,
}

impl From<HistoryDetail> for HistoryDetailResponse {
    fn from(HistoryDetail { history, messages }: HistoryDetail) -> Self {
        Self {
            id: history.id,
            title: history.title,
            model: history.model,
            language: history.language,
            created_date: history.created_date,
            updated_date: history.updated_date,
            messages: messages.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DeletedResponse {
    pub deleted: bool,
}

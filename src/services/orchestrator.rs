use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::completion::{
    CompletionClient, CompletionError, CompletionRequest, Reply, Turn, TurnRole,
};
use crate::database::models::{ChatMessage, Sender};
use crate::services::{ChatError, ChatSessions};
use crate::utils::derive_title;

const DEFAULT_TEMPERATURE: f32 = 0.0;
const DEFAULT_MAX_TOKENS: u32 = 512;
const MAX_TOKENS_LIMIT: u32 = 4096;

#[derive(Debug, Clone, Default)]
pub struct TurnInput {
    pub input: String,
    pub chat_history_id: Option<String>,
    pub temperature: Option<f64>,
    pub max_tokens: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub conversation_id: String,
    pub model: String,
    pub input: String,
    pub output: String,
    pub timestamp: DateTime<Utc>,
}

/// 组装上下文、调用生成服务并原子地保存一轮对话
#[derive(Clone)]
pub struct ChatOrchestrator {
    sessions: ChatSessions,
    completion: Arc<dyn CompletionClient>,
    timeout: Duration,
}

impl ChatOrchestrator {
    pub fn new(
        sessions: ChatSessions,
        completion: Arc<dyn CompletionClient>,
        timeout: Duration,
    ) -> Self {
        Self {
            sessions,
            completion,
            timeout,
        }
    }

    pub async fn handle_turn(&self, user_id: &str, turn: TurnInput) -> Result<TurnOutcome, ChatError> {
        if turn.input.trim().is_empty() {
            return Err(ChatError::Validation("Input cannot be empty".into()));
        }

        let mut open = self
            .sessions
            .get_or_create_history(user_id, turn.chat_history_id.as_deref())
            .await?;
        let prior = if open.is_new {
            Vec::new()
        } else {
            self.sessions.list_messages(&open.history.id).await?
        };

        let request = CompletionRequest {
            model: open.history.model.clone(),
            turns: context_window(&prior, &turn.input),
            temperature: clamp_temperature(turn.temperature),
            max_tokens: clamp_max_tokens(turn.max_tokens),
        };

        // 超时与其他失败一样，暂存的写入直接丢弃
        let reply = tokio::time::timeout(self.timeout, self.completion.complete(&request))
            .await
            .map_err(|_| CompletionError::Timeout)??;

        match &reply {
            Reply::Blocked(reason) => warn!("Completion blocked for history {}: {}", open.history.id, reason),
            Reply::Empty => warn!("Completion returned no text for history {}", open.history.id),
            Reply::Text(_) => {}
        }
        let output = reply.into_text();

        open.batch.append_turn(Sender::User, turn.input.as_str());
        let timestamp = open.batch.append_turn(Sender::Assistant, output.as_str()).created_date;
        if prior.is_empty() {
            open.batch.set_title_once(derive_title(&turn.input));
        }

        self.sessions.commit(open.batch).await?;
        info!("Chat turn saved to history {}", open.history.id);

        Ok(TurnOutcome {
            conversation_id: open.history.id,
            model: open.history.model,
            input: turn.input,
            output,
            timestamp,
        })
    }
}

fn context_window(prior: &[ChatMessage], input: &str) -> Vec<Turn> {
    prior
        .iter()
        .map(|m| Turn {
            role: match m.sender {
                Sender::User => TurnRole::User,
                _ => TurnRole::Model,
            },
            text: m.text.clone(),
        })
        .chain(std::iter::once(Turn {
            role: TurnRole::User,
            text: input.to_string(),
        }))
        .collect()
}

fn clamp_temperature(value: Option<f64>) -> f32 {
    match value {
        Some(t) if t.is_finite() => t.clamp(0.0, 1.0) as f32,
        _ => DEFAULT_TEMPERATURE,
    }
}

fn clamp_max_tokens(value: Option<i64>) -> u32 {
    value
        .map(|t| t.clamp(1, MAX_TOKENS_LIMIT as i64) as u32)
        .unwrap_or(DEFAULT_MAX_TOKENS)
}

//! 外部文本生成服务
//!
//! `CompletionClient` 是对话编排器与第三方 API 之间的接缝。响应体在边界处
//! 解析一次为 [`ProviderResponse`]，再归约成 [`Reply`]，调用方不再探测字段。

pub mod gemini;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

pub use gemini::GeminiClient;

/// 生成失败或被拦截时返回给用户的固定文本
pub const APOLOGY_TEXT: &str =
    "I apologize, but I encountered an issue generating a response. Please try again.";

const SAFETY_FINISH_REASONS: [&str; 5] =
    ["SAFETY", "PROHIBITED_CONTENT", "BLOCKLIST", "SPII", "RECITATION"];

#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("completion API is not configured")]
    NotConfigured,
    #[error("completion request failed: {0}")]
    Transport(String),
    #[error("completion API returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("completion API timed out")]
    Timeout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnRole {
    User,
    Model,
}

impl TurnRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            TurnRole::User => "user",
            TurnRole::Model => "model",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Turn {
    pub role: TurnRole,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub model: String,
    pub turns: Vec<Turn>,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// 归约后的生成结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Text(String),
    Blocked(String),
    Empty,
}

impl Reply {
    pub fn into_text(self) -> String {
        match self {
            Reply::Text(text) => text,
            Reply::Blocked(_) | Reply::Empty => APOLOGY_TEXT.to_string(),
        }
    }
}

#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<Reply, CompletionError>;
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderResponse {
    #[serde(default)]
    pub candidates: Option<Vec<Candidate>>,
    #[serde(default)]
    pub prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    #[serde(default)]
    pub content: Option<Content>,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Content {
    #[serde(default)]
    pub parts: Option<Vec<Part>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Part {
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptFeedback {
    #[serde(default)]
    pub block_reason: Option<String>,
}

impl ProviderResponse {
    /// 无法解析的响应体按空响应处理
    pub fn parse(body: &[u8]) -> Self {
        serde_json::from_slice(body).unwrap_or_else(|e| {
            tracing::warn!("Malformed completion response body: {}", e);
            ProviderResponse::default()
        })
    }

    pub fn into_reply(self) -> Reply {
        if let Some(reason) = self.prompt_feedback.and_then(|f| f.block_reason) {
            return Reply::Blocked(reason);
        }

        let Some(first) = self.candidates.and_then(|c| c.into_iter().next()) else {
            return Reply::Empty;
        };

        if let Some(reason) = first
            .finish_reason
            .filter(|r| SAFETY_FINISH_REASONS.contains(&r.as_str()))
        {
            return Reply::Blocked(reason);
        }

        first
            .content
            .and_then(|c| c.parts)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|p| p.text)
            .map(|t| t.trim().to_string())
            .find(|t| !t.is_empty())
            .map(Reply::Text)
            .unwrap_or(Reply::Empty)
    }
}

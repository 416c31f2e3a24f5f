// 业务层
// 用户目录、会话存储和对话编排

pub mod directory;
pub mod orchestrator;
pub mod sessions;

use thiserror::Error;

use crate::completion::CompletionError;
use crate::database::StoreError;

pub use directory::{Account, DirectoryError, Registration, UserDirectory, UserUpdate};
pub use orchestrator::{ChatOrchestrator, TurnInput, TurnOutcome};
pub use sessions::{ChatSessions, HistoryDetail, HistorySummary, OpenHistory};

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    NotFound(String),
    #[error(transparent)]
    Upstream(#[from] CompletionError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

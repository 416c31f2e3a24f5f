pub mod chat;
pub mod user;

pub use chat::{ChatHistory, ChatMessage, HistoryOverview, Sender};
pub use user::{Role, User, UserProfile, UserStatistics};

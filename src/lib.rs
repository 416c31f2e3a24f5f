use std::sync::Arc;

use auth::{AuthGate, TokenService};
use completion::CompletionClient;
use config::Config;
use database::{ChatStore, UserStore};
use services::{ChatOrchestrator, ChatSessions, UserDirectory};

pub mod auth;
pub mod completion;
pub mod config;
pub mod database;
pub mod error;
pub mod middleware;
pub mod router;
pub mod routes;
pub mod services;
pub mod utils;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub tokens: TokenService,
    pub gate: AuthGate,
    pub directory: UserDirectory,
    pub sessions: ChatSessions,
    pub orchestrator: ChatOrchestrator,
}

impl AppState {
    pub fn new(
        config: Config,
        users: Arc<dyn UserStore>,
        chats: Arc<dyn ChatStore>,
        completion: Arc<dyn CompletionClient>,
    ) -> Self {
        let tokens = TokenService::from_config(&config);
        let sessions = ChatSessions::new(chats, &config.gemini_model, &config.chat_language);

        Self {
            gate: AuthGate::new(tokens.clone(), users.clone()),
            directory: UserDirectory::new(users),
            orchestrator: ChatOrchestrator::new(
                sessions.clone(),
                completion,
                config.completion_timeout(),
            ),
            sessions,
            tokens,
            config: Arc::new(config),
        }
    }
}

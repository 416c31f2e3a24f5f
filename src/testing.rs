//! 测试辅助：内存存储与脚本化的生成客户端
//!
//! 单元测试通过 `cfg(test)` 使用，集成测试通过 `test-utils` feature 使用。

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use jsonwebtoken::Algorithm;
use uuid::Uuid;

use crate::AppState;
use crate::auth::password::sha256_hex;
use crate::completion::{CompletionClient, CompletionError, CompletionRequest, Reply};
use crate::config::Config;
use crate::database::models::{
    ChatHistory, ChatMessage, HistoryOverview, Role, User, UserProfile, UserStatistics,
};
use crate::database::{ChatBatch, ChatStore, StoreError, UserChanges, UserStore};

/// `sample_user` 创建的用户的密码
pub const SAMPLE_PASSWORD: &str = "Passw0rd!";

#[derive(Default)]
struct Tables {
    users: Vec<User>,
    profiles: Vec<UserProfile>,
    histories: Vec<ChatHistory>,
    messages: Vec<ChatMessage>,
    fail_commits: bool,
}

impl Tables {
    fn username_taken(&self, username: &str, exclude: Option<&str>) -> bool {
        self.users
            .iter()
            .any(|u| !u.deleted && u.username == username && Some(u.id.as_str()) != exclude)
    }

    fn email_taken(&self, email: &str, exclude: Option<&str>) -> bool {
        self.profiles
            .iter()
            .any(|p| !p.deleted && p.email == email && Some(p.id_user.as_str()) != exclude)
    }

    fn live_history_mut(&mut self, history_id: &str) -> Option<&mut ChatHistory> {
        self.histories
            .iter_mut()
            .find(|h| h.id == history_id && !h.deleted)
    }
}

/// 同时实现 [`UserStore`] 与 [`ChatStore`]，语义与 Postgres 实现一致
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// 直接写入用户，不经过校验
    pub fn put_user(&self, user: User) {
        let mut t = self.tables();
        t.profiles.push(UserProfile {
            id: Uuid::new_v4().simple().to_string(),
            id_user: user.id.clone(),
            full_name: user.username.clone(),
            email: format!("{}@example.com", user.username),
            deleted: false,
            created_by: "seed".into(),
            created_date: user.created_date,
            updated_by: "seed".into(),
            updated_date: None,
        });
        t.users.push(user);
    }

    /// 让之后的会话提交全部失败
    pub fn fail_commits(&self, fail: bool) {
        self.tables().fail_commits = fail;
    }

    /// 包括已软删除的行
    pub fn user_count(&self) -> usize {
        self.tables().users.len()
    }

    pub fn profile_count(&self) -> usize {
        self.tables().profiles.len()
    }

    pub fn history_count(&self) -> usize {
        self.tables().histories.len()
    }

    pub fn user(&self, user_id: &str) -> Option<User> {
        self.tables().users.iter().find(|u| u.id == user_id).cloned()
    }

    pub fn history(&self, history_id: &str) -> Option<ChatHistory> {
        self.tables()
            .histories
            .iter()
            .find(|h| h.id == history_id)
            .cloned()
    }

    /// 未删除的消息数
    pub fn message_count(&self, history_id: &str) -> usize {
        self.tables()
            .messages
            .iter()
            .filter(|m| m.chat_history_id == history_id && !m.deleted)
            .count()
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn find_by_id(&self, user_id: &str) -> Result<Option<User>, StoreError> {
        Ok(self
            .tables()
            .users
            .iter()
            .find(|u| u.id == user_id && !u.deleted)
            .cloned())
    }

    async fn find_active_by_id(&self, user_id: &str) -> Result<Option<User>, StoreError> {
        Ok(self
            .tables()
            .users
            .iter()
            .find(|u| u.id == user_id && !u.deleted && u.is_active)
            .cloned())
    }

    async fn find_active_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        Ok(self
            .tables()
            .users
            .iter()
            .find(|u| u.username == username && !u.deleted && u.is_active)
            .cloned())
    }

    async fn find_profile(&self, user_id: &str) -> Result<Option<UserProfile>, StoreError> {
        Ok(self
            .tables()
            .profiles
            .iter()
            .find(|p| p.id_user == user_id && !p.deleted)
            .cloned())
    }

    async fn list_with_profiles(&self) -> Result<Vec<(User, Option<UserProfile>)>, StoreError> {
        let t = self.tables();
        let mut rows: Vec<_> = t
            .users
            .iter()
            .filter(|u| !u.deleted)
            .map(|u| {
                let profile = t
                    .profiles
                    .iter()
                    .find(|p| p.id_user == u.id && !p.deleted)
                    .cloned();
                (u.clone(), profile)
            })
            .collect();
        rows.sort_by(|a, b| b.0.created_date.cmp(&a.0.created_date));
        Ok(rows)
    }

    async fn username_taken(
        &self,
        username: &str,
        exclude_user_id: Option<&str>,
    ) -> Result<bool, StoreError> {
        Ok(self.tables().username_taken(username, exclude_user_id))
    }

    async fn email_taken(
        &self,
        email: &str,
        exclude_user_id: Option<&str>,
    ) -> Result<bool, StoreError> {
        Ok(self.tables().email_taken(email, exclude_user_id))
    }

    async fn insert_with_profile(
        &self,
        user: &User,
        profile: &UserProfile,
    ) -> Result<(), StoreError> {
        let mut t = self.tables();
        if t.username_taken(&user.username, None) {
            return Err(StoreError::Conflict("ux_user_username_live".into()));
        }
        if t.email_taken(&profile.email, None) {
            return Err(StoreError::Conflict("ux_user_profile_email_live".into()));
        }
        t.users.push(user.clone());
        t.profiles.push(profile.clone());
        Ok(())
    }

    async fn update(&self, changes: &UserChanges) -> Result<bool, StoreError> {
        let mut t = self.tables();
        let id = changes.user_id.as_str();

        if let Some(username) = &changes.username {
            if t.username_taken(username, Some(id)) {
                return Err(StoreError::Conflict("ux_user_username_live".into()));
            }
        }
        if let Some(email) = &changes.email {
            if t.email_taken(email, Some(id)) {
                return Err(StoreError::Conflict("ux_user_profile_email_live".into()));
            }
        }

        let mut touched = false;
        if changes.touches_user() {
            if let Some(user) = t.users.iter_mut().find(|u| u.id == id && !u.deleted) {
                if let Some(username) = &changes.username {
                    user.username = username.clone();
                }
                if let Some(hash) = &changes.password_hash {
                    user.password_hash = hash.clone();
                }
                if let Some(is_active) = changes.is_active {
                    user.is_active = is_active;
                }
                if let Some(role) = changes.role {
                    user.role = role;
                }
                user.updated_by = changes.updated_by.clone();
                user.updated_date = Some(changes.updated_date);
                touched = true;
            }
        }
        if changes.touches_profile() {
            if let Some(profile) = t.profiles.iter_mut().find(|p| p.id_user == id && !p.deleted) {
                if let Some(full_name) = &changes.full_name {
                    profile.full_name = full_name.clone();
                }
                if let Some(email) = &changes.email {
                    profile.email = email.clone();
                }
                profile.updated_by = changes.updated_by.clone();
                profile.updated_date = Some(changes.updated_date);
                touched = true;
            }
        }
        Ok(touched)
    }

    async fn soft_delete(&self, user_id: &str, deleted_by: &str) -> Result<bool, StoreError> {
        let mut t = self.tables();
        let now = Utc::now();
        let Some(user) = t.users.iter_mut().find(|u| u.id == user_id && !u.deleted) else {
            return Ok(false);
        };
        user.deleted = true;
        user.updated_by = deleted_by.to_string();
        user.updated_date = Some(now);

        for profile in t.profiles.iter_mut().filter(|p| p.id_user == user_id && !p.deleted) {
            profile.deleted = true;
            profile.updated_by = deleted_by.to_string();
            profile.updated_date = Some(now);
        }
        Ok(true)
    }

    async fn statistics(&self) -> Result<UserStatistics, StoreError> {
        let t = self.tables();
        let live: Vec<_> = t.users.iter().filter(|u| !u.deleted).collect();
        Ok(UserStatistics {
            total_users: live.len() as i64,
            admin_users: live.iter().filter(|u| u.role == Role::Admin).count() as i64,
            regular_users: live.iter().filter(|u| u.role == Role::User).count() as i64,
        })
    }
}

#[async_trait]
impl ChatStore for MemoryStore {
    async fn find_history(
        &self,
        history_id: &str,
        user_id: &str,
    ) -> Result<Option<ChatHistory>, StoreError> {
        Ok(self
            .tables()
            .histories
            .iter()
            .find(|h| h.id == history_id && h.user_id == user_id && !h.deleted)
            .cloned())
    }

    async fn list_histories(&self, user_id: &str) -> Result<Vec<HistoryOverview>, StoreError> {
        let t = self.tables();
        let mut histories: Vec<_> = t
            .histories
            .iter()
            .filter(|h| h.user_id == user_id && h.is_active && !h.deleted)
            .map(|h| {
                let mut live: Vec<_> = t
                    .messages
                    .iter()
                    .filter(|m| m.chat_history_id == h.id && !m.deleted)
                    .collect();
                live.sort_by_key(|m| m.created_date);
                HistoryOverview {
                    history: h.clone(),
                    message_count: live.len() as i64,
                    last_message: live.last().map(|m| m.text.clone()),
                }
            })
            .collect();
        histories.sort_by(|a, b| b.history.updated_date.cmp(&a.history.updated_date));
        Ok(histories)
    }

    async fn list_messages(&self, history_id: &str) -> Result<Vec<ChatMessage>, StoreError> {
        let mut messages: Vec<_> = self
            .tables()
            .messages
            .iter()
            .filter(|m| m.chat_history_id == history_id && !m.deleted)
            .cloned()
            .collect();
        messages.sort_by_key(|m| m.created_date);
        Ok(messages)
    }

    async fn find_message(&self, message_id: &str) -> Result<Option<ChatMessage>, StoreError> {
        Ok(self
            .tables()
            .messages
            .iter()
            .find(|m| m.id == message_id && !m.deleted)
            .cloned())
    }

    async fn commit(&self, batch: ChatBatch) -> Result<(), StoreError> {
        let mut t = self.tables();
        if t.fail_commits {
            return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
        }

        // 先检查再写入，失败时不留下任何行
        let exists = batch.new_history().is_some()
            || t.histories
                .iter()
                .any(|h| h.id == batch.history_id() && !h.deleted);
        if !exists {
            return Err(StoreError::HistoryGone(batch.history_id().to_string()));
        }

        if let Some(history) = batch.new_history() {
            t.histories.push(history.clone());
        }
        t.messages.extend(batch.messages().iter().cloned());

        let last_activity = batch.last_activity();
        if let Some(history) = t.live_history_mut(batch.history_id()) {
            if let Some(title) = batch.title() {
                history.title = Some(title.to_string());
            }
            if let Some(actor) = batch.actor() {
                history.updated_by = Some(actor.to_string());
            }
            history.updated_date = last_activity;
        }
        Ok(())
    }

    async fn soft_delete_history(
        &self,
        history_id: &str,
        deleted_by: &str,
    ) -> Result<bool, StoreError> {
        let mut t = self.tables();
        let now = Utc::now();
        let Some(history) = t.live_history_mut(history_id) else {
            return Ok(false);
        };
        history.deleted = true;
        history.updated_by = Some(deleted_by.to_string());
        history.updated_date = now;

        for message in t
            .messages
            .iter_mut()
            .filter(|m| m.chat_history_id == history_id && !m.deleted)
        {
            message.deleted = true;
            message.updated_date = now;
        }
        Ok(true)
    }

    async fn soft_delete_message(&self, message_id: &str) -> Result<bool, StoreError> {
        let mut t = self.tables();
        match t.messages.iter_mut().find(|m| m.id == message_id && !m.deleted) {
            Some(message) => {
                message.deleted = true;
                message.updated_date = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

enum Script {
    Reply(Reply),
    Fail,
}

/// 按预设结果应答，并记录收到的请求
pub struct ScriptedCompletion {
    script: Script,
    delay: Option<Duration>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedCompletion {
    pub fn reply(reply: Reply) -> Self {
        Self {
            script: Script::Reply(reply),
            delay: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn text(text: &str) -> Self {
        Self::reply(Reply::Text(text.to_string()))
    }

    /// 每次调用都返回 5xx
    pub fn failing() -> Self {
        Self {
            script: Script::Fail,
            delay: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    fn requests(&self) -> MutexGuard<'_, Vec<CompletionRequest>> {
        self.requests.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn calls(&self) -> usize {
        self.requests().len()
    }

    pub fn last_request(&self) -> Option<CompletionRequest> {
        self.requests().last().cloned()
    }
}

#[async_trait]
impl CompletionClient for ScriptedCompletion {
    async fn complete(&self, request: &CompletionRequest) -> Result<Reply, CompletionError> {
        self.requests().push(request.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match &self.script {
            Script::Reply(reply) => Ok(reply.clone()),
            Script::Fail => Err(CompletionError::Status {
                status: 503,
                body: "model overloaded".into(),
            }),
        }
    }
}

/// 密码为 [`SAMPLE_PASSWORD`] 的启用用户（旧版 SHA-256 摘要，避免 bcrypt 拖慢测试）
pub fn sample_user(username: &str, role: Role) -> User {
    User {
        id: Uuid::new_v4().simple().to_string(),
        username: username.to_string(),
        password_hash: sha256_hex(SAMPLE_PASSWORD),
        is_active: true,
        role,
        deleted: false,
        created_by: "seed".into(),
        created_date: Utc::now(),
        updated_by: "seed".into(),
        updated_date: None,
    }
}

pub fn test_config() -> Config {
    Config {
        database_url: "postgres://unused".into(),
        db_max_connections: 1,
        redis_url: None,
        jwt_secret: "integration-test-secret".into(),
        jwt_algorithm: Algorithm::HS256,
        gemini_api_key: None,
        gemini_model: "gemini-2.5-flash".into(),
        gemini_base_url: "http://127.0.0.1:9".into(),
        completion_timeout_secs: 5,
        chat_language: "id".into(),
        rate_limit_window_secs: 60,
        rate_limit_requests: 100,
        server_host: "127.0.0.1".into(),
        server_port: 0,
        api_base_uri: "/api/v1".into(),
    }
}

/// 以内存存储和给定的生成客户端组装完整的应用状态
pub fn memory_state(completion: ScriptedCompletion) -> (AppState, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::default());
    let state = AppState::new(
        test_config(),
        store.clone(),
        store.clone(),
        Arc::new(completion),
    );
    (state, store)
}

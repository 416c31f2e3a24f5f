use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use crate::auth::token::{TokenKind, TokenService};
use crate::database::models::{Role, User};
use crate::database::{StoreError, UserStore};

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Authorization token is missing")]
    MissingToken,
    #[error("You are not logged in")]
    NotLoggedIn,
    #[error("Session has ended, please login again")]
    SessionEnded,
    #[error("Access denied! {0} role required.")]
    RoleRequired(Role),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// 从 Authorization 头中取出令牌，同时接受 "Bearer <token>" 和裸令牌
pub fn bearer_token(header: &str) -> &str {
    match header.split_once("Bearer") {
        Some((_, token)) => token.trim(),
        None => header.trim(),
    }
}

/// 把令牌解析为有效用户，并按角色放行
#[derive(Clone)]
pub struct AuthGate {
    tokens: TokenService,
    users: Arc<dyn UserStore>,
}

impl AuthGate {
    pub fn new(tokens: TokenService, users: Arc<dyn UserStore>) -> Self {
        Self { tokens, users }
    }

    pub async fn authenticate(&self, auth_header: Option<&str>) -> Result<User, AuthError> {
        let token = auth_header
            .map(bearer_token)
            .filter(|t| !t.is_empty())
            .ok_or(AuthError::MissingToken)?;

        let claims = self.tokens.decode(token).map_err(|e| {
            debug!("Rejected token: {}", e);
            AuthError::NotLoggedIn
        })?;

        // 刷新令牌不能当访问令牌用
        if claims.kind != TokenKind::Access {
            debug!("Rejected {:?} token on a protected route", claims.kind);
            return Err(AuthError::NotLoggedIn);
        }

        self.users
            .find_active_by_id(&claims.id)
            .await?
            .ok_or(AuthError::SessionEnded)
    }

    pub async fn require_role(
        &self,
        auth_header: Option<&str>,
        role: Role,
    ) -> Result<User, AuthError> {
        let user = self.authenticate(auth_header).await?;
        ensure_role(&user, role)?;
        Ok(user)
    }
}

pub fn ensure_role(user: &User, role: Role) -> Result<(), AuthError> {
    if user.role == role {
        Ok(())
    } else {
        Err(AuthError::RoleRequired(role))
    }
}

#[cfg(test)]
mod tests {
    use jsonwebtoken::Algorithm;

    use super::*;
    use crate::testing::{MemoryStore, sample_user};

    fn gate_with(store: &Arc<MemoryStore>) -> (AuthGate, TokenService) {
        let tokens = TokenService::new("gate-secret", Algorithm::HS256);
        (AuthGate::new(tokens.clone(), store.clone()), tokens)
    }

    #[test]
    fn bearer_prefix_is_optional() {
        assert_eq!(bearer_token("Bearer abc.def"), "abc.def");
        assert_eq!(bearer_token("abc.def"), "abc.def");
        assert_eq!(bearer_token("  Bearer   abc "), "abc");
        // 区分大小写
        assert_eq!(bearer_token("bearer abc"), "bearer abc");
    }

    #[tokio::test]
    async fn missing_and_bad_tokens_are_unauthorized() {
        let store = Arc::new(MemoryStore::default());
        let (gate, _) = gate_with(&store);

        assert!(matches!(gate.authenticate(None).await, Err(AuthError::MissingToken)));
        assert!(matches!(
            gate.authenticate(Some("Bearer ")).await,
            Err(AuthError::MissingToken)
        ));
        assert!(matches!(
            gate.authenticate(Some("Bearer nonsense")).await,
            Err(AuthError::NotLoggedIn)
        ));
    }

    #[tokio::test]
    async fn refresh_tokens_cannot_authenticate() {
        let store = Arc::new(MemoryStore::default());
        let user = sample_user("alice", Role::User);
        store.put_user(user.clone());
        let (gate, tokens) = gate_with(&store);

        let pair = tokens.issue(&user.id).unwrap();
        let header = format!("Bearer {}", pair.refresh_token);
        assert!(matches!(
            gate.authenticate(Some(&header)).await,
            Err(AuthError::NotLoggedIn)
        ));
    }

    #[tokio::test]
    async fn inactive_or_deleted_users_have_no_session() {
        let store = Arc::new(MemoryStore::default());
        let mut user = sample_user("bob", Role::User);
        user.is_active = false;
        store.put_user(user.clone());
        let (gate, tokens) = gate_with(&store);

        let pair = tokens.issue(&user.id).unwrap();
        assert!(matches!(
            gate.authenticate(Some(&pair.access_token)).await,
            Err(AuthError::SessionEnded)
        ));
    }

    #[tokio::test]
    async fn role_mismatch_is_distinct_from_missing_identity() {
        let store = Arc::new(MemoryStore::default());
        let user = sample_user("carol", Role::User);
        store.put_user(user.clone());
        let (gate, tokens) = gate_with(&store);

        let pair = tokens.issue(&user.id).unwrap();
        let header = format!("Bearer {}", pair.access_token);

        let authed = gate.authenticate(Some(&header)).await.unwrap();
        assert_eq!(authed.id, user.id);
        assert!(matches!(
            gate.require_role(Some(&header), Role::Admin).await,
            Err(AuthError::RoleRequired(Role::Admin))
        ));
        assert!(gate.require_role(Some(&header), Role::User).await.is_ok());
    }
}

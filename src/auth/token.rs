use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::Config;

const ACCESS_TOKEN_TTL_HOURS: i64 = 24;
const REFRESH_TOKEN_TTL_DAYS: i64 = 7;

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("token is invalid")]
    Invalid,
    #[error("token has expired")]
    Expired,
    #[error("failed to sign token: {0}")]
    Encode(#[source] jsonwebtoken::errors::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub id: String,  // 用户ID
    pub expires: i64, // 过期时间（秒）
    #[serde(rename = "type")]
    pub kind: TokenKind,
}

#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// 无状态的令牌签发与校验
///
/// 过期由 `expires` 字段自行判断，`expires == now` 仍然有效。
#[derive(Clone)]
pub struct TokenService {
    algorithm: Algorithm,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl TokenService {
    pub fn new(secret: &str, algorithm: Algorithm) -> Self {
        Self {
            algorithm,
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.jwt_secret, config.jwt_algorithm)
    }

    pub fn issue(&self, subject_id: &str) -> Result<TokenPair, TokenError> {
        Ok(TokenPair {
            access_token: self.issue_access(subject_id)?,
            refresh_token: self.issue_kind(
                subject_id,
                TokenKind::Refresh,
                Duration::days(REFRESH_TOKEN_TTL_DAYS),
            )?,
        })
    }

    pub fn decode(&self, token: &str) -> Result<Claims, TokenError> {
        let mut validation = Validation::new(self.algorithm);
        validation.validate_exp = false;
        validation.required_spec_claims.clear();

        let claims = decode::<Claims>(token, &self.decoding_key, &validation)
            .map_err(|_| TokenError::Invalid)?
            .claims;

        if claims.expires < Utc::now().timestamp() {
            return Err(TokenError::Expired);
        }
        Ok(claims)
    }

    /// 用刷新令牌换新的访问令牌，刷新令牌本身原样返回
    pub fn refresh(&self, refresh_token: &str) -> Option<TokenPair> {
        let claims = self.decode(refresh_token).ok()?;
        if claims.kind != TokenKind::Refresh {
            return None;
        }

        match self.issue_access(&claims.id) {
            Ok(access_token) => Some(TokenPair {
                access_token,
                refresh_token: refresh_token.to_string(),
            }),
            Err(e) => {
                tracing::error!("Failed to issue refreshed access token: {}", e);
                None
            }
        }
    }

    fn issue_access(&self, subject_id: &str) -> Result<String, TokenError> {
        self.issue_kind(
            subject_id,
            TokenKind::Access,
            Duration::hours(ACCESS_TOKEN_TTL_HOURS),
        )
    }

    fn issue_kind(
        &self,
        subject_id: &str,
        kind: TokenKind,
        ttl: Duration,
    ) -> Result<String, TokenError> {
        let claims = Claims {
            id: subject_id.to_string(),
            expires: (Utc::now() + ttl).timestamp(),
            kind,
        };
        self.sign(&claims)
    }

    fn sign(&self, claims: &Claims) -> Result<String, TokenError> {
        encode(&Header::new(self.algorithm), claims, &self.encoding_key).map_err(TokenError::Encode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> TokenService {
        TokenService::new("test-secret", Algorithm::HS256)
    }

    #[test]
    fn issued_tokens_decode_to_subject_and_kind() {
        let svc = service();
        let pair = svc.issue("user-1").unwrap();

        let access = svc.decode(&pair.access_token).unwrap();
        assert_eq!(access.id, "user-1");
        assert_eq!(access.kind, TokenKind::Access);

        let refresh = svc.decode(&pair.refresh_token).unwrap();
        assert_eq!(refresh.id, "user-1");
        assert_eq!(refresh.kind, TokenKind::Refresh);
        assert!(refresh.expires > access.expires);
    }

    #[test]
    fn expired_token_is_always_expired() {
        let svc = service();
        let token = svc
            .sign(&Claims {
                id: "user-1".into(),
                expires: Utc::now().timestamp() - 10,
                kind: TokenKind::Access,
            })
            .unwrap();

        for _ in 0..3 {
            assert!(matches!(svc.decode(&token), Err(TokenError::Expired)));
        }
    }

    #[test]
    fn token_expiring_now_is_still_valid() {
        let svc = service();
        let token = svc
            .sign(&Claims {
                id: "user-1".into(),
                expires: Utc::now().timestamp(),
                kind: TokenKind::Access,
            })
            .unwrap();
        assert!(svc.decode(&token).is_ok());

        let token = svc
            .sign(&Claims {
                id: "user-1".into(),
                expires: Utc::now().timestamp() - 1,
                kind: TokenKind::Access,
            })
            .unwrap();
        assert!(matches!(svc.decode(&token), Err(TokenError::Expired)));
    }

    #[test]
    fn tampered_or_foreign_tokens_are_invalid() {
        let svc = service();
        let pair = svc.issue("user-1").unwrap();

        let other = TokenService::new("another-secret", Algorithm::HS256);
        assert!(matches!(other.decode(&pair.access_token), Err(TokenError::Invalid)));

        let hs512 = TokenService::new("test-secret", Algorithm::HS512);
        assert!(matches!(hs512.decode(&pair.access_token), Err(TokenError::Invalid)));

        assert!(matches!(svc.decode("not.a.jwt"), Err(TokenError::Invalid)));
    }

    #[test]
    fn refresh_only_accepts_refresh_tokens() {
        let svc = service();
        let pair = svc.issue("user-1").unwrap();

        let refreshed = svc.refresh(&pair.refresh_token).unwrap();
        assert_eq!(refreshed.refresh_token, pair.refresh_token);
        assert_eq!(svc.decode(&refreshed.access_token).unwrap().id, "user-1");

        assert!(svc.refresh(&pair.access_token).is_none());
        assert!(svc.refresh("garbage").is_none());
    }
}

use std::env;
use std::str::FromStr;
use std::time::Duration;

use jsonwebtoken::Algorithm;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing environment variable {0}")]
    Missing(&'static str),
    #[error("invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub db_max_connections: u32,
    pub redis_url: Option<String>,
    pub jwt_secret: String,
    pub jwt_algorithm: Algorithm,
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
    pub gemini_base_url: String,
    pub completion_timeout_secs: u64,
    pub chat_language: String,
    pub rate_limit_window_secs: u64,
    pub rate_limit_requests: u32,
    pub server_host: String,
    pub server_port: u16,
    pub api_base_uri: String,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();

        Ok(Config {
            database_url: required("DATABASE_URL")?,
            db_max_connections: parsed("DB_MAX_CONNECTIONS", 10)?,
            redis_url: optional("REDIS_URL"),
            jwt_secret: required("JWT_SECRET")?,
            jwt_algorithm: parse_algorithm(&required("JWT_ALGORITHM")?)?,
            gemini_api_key: optional("GEMINI_API_KEY"),
            gemini_model: optional("GEMINI_MODEL").unwrap_or_else(|| "gemini-2.5-flash".into()),
            gemini_base_url: optional("GEMINI_BASE_URL")
                .unwrap_or_else(|| "https://generativelanguage.googleapis.com".into()),
            completion_timeout_secs: parsed("COMPLETION_TIMEOUT_SECS", 60)?,
            chat_language: optional("CHAT_LANGUAGE").unwrap_or_else(|| "id".into()),
            rate_limit_window_secs: parsed("RATE_LIMIT_WINDOW", 60)?,
            rate_limit_requests: parsed("RATE_LIMIT_REQUESTS", 100)?,
            server_host: optional("SERVER_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            server_port: parsed("SERVER_PORT", 8000)?,
            api_base_uri: optional("API_BASE_URI").unwrap_or_else(|| "/api/v1".into()),
        })
    }

    pub fn completion_timeout(&self) -> Duration {
        Duration::from_secs(self.completion_timeout_secs)
    }

    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_secs(self.rate_limit_window_secs)
    }
}

/// Only HMAC algorithms can be driven by a shared secret.
pub fn parse_algorithm(value: &str) -> Result<Algorithm, ConfigError> {
    let algorithm = Algorithm::from_str(value.trim()).map_err(|e| ConfigError::Invalid {
        name: "JWT_ALGORITHM",
        reason: e.to_string(),
    })?;

    match algorithm {
        Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => Ok(algorithm),
        other => Err(ConfigError::Invalid {
            name: "JWT_ALGORITHM",
            reason: format!("{other:?} is not a shared-secret algorithm"),
        }),
    }
}

fn optional(name: &'static str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    optional(name).ok_or(ConfigError::Missing(name))
}

fn parsed<T>(name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match optional(name) {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            name,
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_hmac_algorithms() {
        assert_eq!(parse_algorithm("HS256").unwrap(), Algorithm::HS256);
        assert_eq!(parse_algorithm(" HS512 ").unwrap(), Algorithm::HS512);
    }

    #[test]
    fn rejects_asymmetric_and_unknown_algorithms() {
        assert!(matches!(
            parse_algorithm("RS256"),
            Err(ConfigError::Invalid { .. })
        ));
        assert!(parse_algorithm("none").is_err());
    }
}

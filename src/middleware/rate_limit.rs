use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};
use redis::AsyncCommands;
use tracing::warn;

use crate::{config::Config, error::AppError};

/// 按客户端 IP 的固定窗口限流，Redis 不可用时直接放行
#[derive(Clone)]
pub struct RateLimiter {
    redis: Option<Arc<redis::Client>>,
    window: Duration,
    max_requests: u32,
}

impl RateLimiter {
    pub fn new(redis: Option<redis::Client>, config: &Config) -> Self {
        Self {
            redis: redis.map(Arc::new),
            window: config.rate_limit_window(),
            max_requests: config.rate_limit_requests,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        let redis = config
            .redis_url
            .as_deref()
            .and_then(|url| match redis::Client::open(url) {
                Ok(client) => Some(client),
                Err(e) => {
                    warn!("Invalid REDIS_URL, rate limiting disabled: {}", e);
                    None
                }
            });
        Self::new(redis, config)
    }

    pub fn is_enabled(&self) -> bool {
        self.redis.is_some()
    }

    /// 超出限制时返回 false
    async fn allow(&self, ip: &str) -> Result<bool, redis::RedisError> {
        let Some(redis) = &self.redis else {
            return Ok(true);
        };

        let key = format!("rate_limit:{}", ip);
        let mut conn = redis.get_multiplexed_async_connection().await?;

        // 使用 Redis 的 INCR 和 EXPIRE 命令实现计数器
        let count: u64 = conn.incr(&key, 1).await?;
        if count == 1 {
            let _: () = conn.expire(&key, self.window.as_secs() as i64).await?;
        }

        Ok(count <= u64::from(self.max_requests))
    }

    pub async fn check_rate_limit(self: Arc<Self>, req: Request<Body>, next: Next) -> Response {
        let ip = client_ip(&req);

        match self.allow(&ip).await {
            Ok(true) => next.run(req).await,
            Ok(false) => AppError::TooManyRequests(format!(
                "Too many requests, please retry in {} seconds",
                self.window.as_secs()
            ))
            .into_response(),
            Err(e) => {
                warn!("Rate limiter unavailable, allowing request: {}", e);
                next.run(req).await
            }
        }
    }
}

/// 依次取 x-real-ip、x-forwarded-for 的第一个地址、连接地址
pub fn client_ip(req: &Request<Body>) -> String {
    let remote_ip = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.ip().to_string());

    req.headers()
        .get("x-real-ip")
        .and_then(|h| h.to_str().ok())
        .or_else(|| {
            req.headers()
                .get("x-forwarded-for")
                .and_then(|h| h.to_str().ok())
                .and_then(|s| s.split(',').find(|ip| !ip.trim().is_empty()))
        })
        .or(remote_ip.as_deref())
        .unwrap_or("unknown")
        .trim()
        .to_string()
}

pub async fn rate_limit(
    State(limiter): State<Arc<RateLimiter>>,
    req: Request<Body>,
    next: Next,
) -> Response {
    limiter.check_rate_limit(req, next).await
}

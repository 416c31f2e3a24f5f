use std::sync::Arc;

use axum::{
    Router,
    middleware::{from_fn, from_fn_with_state},
    routing::{delete, get, patch, post, put},
};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::{
    AppState,
    middleware::{RateLimiter, admin_middleware, auth_middleware, log_errors, rate_limit},
    routes,
};

// 无需认证的路由
fn public_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(routes::health::health))
        .route("/users/register", post(routes::user::register))
        .route("/users/login", post(routes::user::login))
        .route("/refresh-token", post(routes::refresh_token::refresh_token))
}

// 任意已登录用户
fn protected_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/users/profile", get(routes::user::profile))
        .route("/users/{id}", put(routes::user::update_user))
        .route(
            "/users/update-password/{id}",
            put(routes::user::update_password),
        )
        .route("/chat/message", post(routes::chat::send_message))
        .route("/chat/histories", get(routes::chat::list_histories))
        .route(
            "/chat/histories/{id}",
            get(routes::chat::get_history).delete(routes::chat::delete_history),
        )
        .route("/chat/messages/{id}", delete(routes::chat::delete_message))
        .route_layer(from_fn_with_state(state.clone(), auth_middleware))
}

// 仅管理员
fn admin_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/admin/statistics", get(routes::admin::statistics))
        .route(
            "/admin/users",
            get(routes::admin::list_users).post(routes::admin::create_user),
        )
        .route(
            "/admin/users/{id}",
            get(routes::admin::get_user)
                .put(routes::admin::update_user)
                .delete(routes::admin::delete_user),
        )
        .route(
            "/admin/users/{id}/toggle-active",
            patch(routes::admin::toggle_active),
        )
        .route(
            "/admin/users/{id}/change-role",
            patch(routes::admin::change_role),
        )
        .route_layer(from_fn_with_state(state.clone(), admin_middleware))
}

/// 组装完整的应用路由，所有接口挂在 `api_base_uri` 下
pub fn create_router(state: AppState) -> Router {
    let rate_limiter = Arc::new(RateLimiter::from_config(&state.config));
    if !rate_limiter.is_enabled() {
        tracing::info!("REDIS_URL not set, rate limiting disabled");
    }

    let api = Router::new()
        .merge(public_routes())
        .merge(protected_routes(&state))
        .merge(admin_routes(&state));

    // 自上而下依次包裹：追踪、限流、5xx 日志
    let router = Router::new().nest(&state.config.api_base_uri, api).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(from_fn_with_state(rate_limiter, rate_limit))
            .layer(from_fn(log_errors)),
    );

    // 开发模式下允许任意来源
    #[cfg(debug_assertions)]
    let router = router.layer(tower_http::cors::CorsLayer::permissive());

    router.with_state(state)
}

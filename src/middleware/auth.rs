use axum::{
    body::Body,
    extract::State,
    http::{Request, header::AUTHORIZATION},
    middleware::Next,
    response::Response,
};

use crate::{AppState, database::models::Role, database::models::User, error::AppError};

/// 认证中间件写入请求扩展的当前用户
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

fn authorization(req: &Request<Body>) -> Option<String> {
    req.headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .map(str::to_owned)
}

pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let header = authorization(&req);
    let user = state.gate.authenticate(header.as_deref()).await?;
    req.extensions_mut().insert(CurrentUser(user));
    Ok(next.run(req).await)
}

/// 只放行管理员
pub async fn admin_middleware(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let header = authorization(&req);
    let user = state
        .gate
        .require_role(header.as_deref(), Role::Admin)
        .await?;
    req.extensions_mut().insert(CurrentUser(user));
    Ok(next.run(req).await)
}

//! axum 鉴权中间件：分派成功后把身份上下文挂到请求扩展上。

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use tracing::debug;

use crate::{api::error::ApiError, state::AppState};

/// 受保护路由的鉴权层。
pub(crate) async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let context = state.dispatcher.authenticate(req.headers()).await?;
    debug!(user_id = context.user_id(), "request authenticated");
    req.extensions_mut().insert(context);
    Ok(next.run(req).await)
}

//! 鉴权 HTTP 路由处理函数。

use ag_shared_protocol::{ProfilePayload, RefreshRequest, TokenPairResponse};
use axum::{Extension, Json, extract::State, http::StatusCode};

use crate::{
    api::{
        error::ApiError,
        extract::ApiBody,
        response::{ApiReply, ok_response},
        types::{LoginRequest, RegisterRequest, UserView},
    },
    auth::dispatch::AuthContext,
    state::AppState,
    users::register_user,
};

/// 登录接口：校验密码后签发令牌对。
pub(crate) async fn login_handler(
    State(state): State<AppState>,
    ApiBody(req): ApiBody<LoginRequest>,
) -> Result<Json<TokenPairResponse>, ApiError> {
    if req.username.trim().is_empty() || req.password.is_empty() {
        return Err(ApiError::bad_request("用户名和密码不能为空"));
    }
    let tokens = state
        .sessions
        .login_with_password(&req.username, &req.password)
        .await?;
    Ok(Json(tokens.into()))
}

/// 刷新接口：轮换 refresh 并颁发新 access；接受 JSON 或表单 `refresh_token`。
pub(crate) async fn refresh_handler(
    State(state): State<AppState>,
    ApiBody(req): ApiBody<RefreshRequest>,
) -> Result<Json<TokenPairResponse>, ApiError> {
    if req.refresh_token.trim().is_empty() {
        return Err(ApiError::bad_request("缺少 refresh_token"));
    }
    let tokens = state.sessions.refresh(&req.refresh_token).await?;
    Ok(Json(tokens.into()))
}

/// 注册接口。
pub(crate) async fn register_handler(
    State(state): State<AppState>,
    ApiBody(req): ApiBody<RegisterRequest>,
) -> Result<ApiReply<UserView>, ApiError> {
    let user = register_user(state.store.as_ref(), req).await?;
    Ok(ok_response(StatusCode::CREATED, "用户创建成功", user))
}

/// 当前调用方资料（需通过鉴权中间件）。
pub(crate) async fn profile_handler(
    Extension(context): Extension<AuthContext>,
) -> ApiReply<ProfilePayload> {
    ok_response(StatusCode::OK, "资料获取成功", context.to_profile())
}

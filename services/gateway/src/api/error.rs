//! API 错误定义与响应转换。
//!
//! 所有鉴权类失败在这里统一收敛为同一个 401 响应，内部原因只进日志。

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::Value;
use tracing::{debug, error};

use super::response::ApiEnvelope;
use crate::{
    auth::{dispatch::Rejection, session::SessionError},
    users::RegisterError,
};

/// 接口错误。
#[derive(Debug)]
pub(crate) struct ApiError {
    pub(crate) status: StatusCode,
    pub(crate) code: &'static str,
    pub(crate) message: String,
    pub(crate) suggestion: &'static str,
}

impl ApiError {
    /// 构造统一 API 错误。
    pub(crate) fn new(
        status: StatusCode,
        code: &'static str,
        message: impl Into<String>,
        suggestion: &'static str,
    ) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            suggestion,
        }
    }

    /// 通用鉴权失败：不区分过期、篡改、未签发或已吊销。
    pub(crate) fn unauthorized() -> Self {
        Self::new(
            StatusCode::UNAUTHORIZED,
            "UNAUTHORIZED",
            "鉴权失败",
            "请重新登录或检查凭证",
        )
    }

    /// 通用服务端错误，细节只写日志。
    pub(crate) fn internal() -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_ERROR",
            "服务暂不可用",
            "请稍后重试",
        )
    }

    /// 请求参数错误。
    pub(crate) fn bad_request(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            "INVALID_REQUEST",
            message,
            "请检查请求参数",
        )
    }

    /// 转换为统一响应体。
    pub(crate) fn into_envelope(self) -> (StatusCode, Json<ApiEnvelope<Value>>) {
        (
            self.status,
            Json(ApiEnvelope {
                ok: false,
                code: self.code.to_string(),
                message: self.message,
                suggestion: Some(self.suggestion.to_string()),
                data: None,
            }),
        )
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        self.into_envelope().into_response()
    }
}

impl From<Rejection> for ApiError {
    fn from(rejection: Rejection) -> Self {
        match rejection {
            Rejection::StoreUnavailable(err) => {
                error!("authenticate request failed: {err}");
                Self::internal()
            }
            other => {
                debug!("request rejected: {other}");
                Self::unauthorized()
            }
        }
    }
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::InvalidCredentials | SessionError::NotFoundOrExpired => {
                debug!("session request rejected: {err}");
                Self::unauthorized()
            }
            SessionError::IdentityUnavailable(_)
            | SessionError::Token(_)
            | SessionError::Password(_)
            | SessionError::Store(_) => {
                error!("session request failed: {err}");
                Self::internal()
            }
        }
    }
}

impl From<RegisterError> for ApiError {
    fn from(err: RegisterError) -> Self {
        match err {
            RegisterError::Invalid(message) => Self::bad_request(message),
            RegisterError::Conflict(field) => Self::new(
                StatusCode::CONFLICT,
                "ALREADY_EXISTS",
                format!("{field} 已被占用"),
                "请更换后重试",
            ),
            RegisterError::Password(_) | RegisterError::Store(_) => {
                error!("register user failed: {err}");
                Self::internal()
            }
        }
    }
}

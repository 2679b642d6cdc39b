//! 请求体提取：按 Content-Type 在 JSON 与表单之间选择，解析失败统一回 `ApiError`。

use axum::{
    Form, Json,
    extract::{FromRequest, Request},
    http::{HeaderMap, header::CONTENT_TYPE},
};
use serde::de::DeserializeOwned;
use tracing::debug;

use super::error::ApiError;

const FORM_URLENCODED: &str = "application/x-www-form-urlencoded";

/// 请求体：`application/x-www-form-urlencoded` 走表单，其余按 JSON 解析。
pub(crate) struct ApiBody<T>(pub(crate) T);

impl<S, T> FromRequest<S> for ApiBody<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Send,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        if is_form(req.headers()) {
            let Form(value) = Form::<T>::from_request(req, state).await.map_err(|err| {
                debug!("form body rejected: {err}");
                ApiError::bad_request("请求体格式无效")
            })?;
            return Ok(Self(value));
        }

        let Json(value) = Json::<T>::from_request(req, state).await.map_err(|err| {
            debug!("json body rejected: {err}");
            ApiError::bad_request("请求体格式无效")
        })?;
        Ok(Self(value))
    }
}

/// Content-Type 是否为 urlencoded 表单（忽略大小写与参数）。
fn is_form(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(';').next())
        .is_some_and(|mime| mime.trim().eq_ignore_ascii_case(FORM_URLENCODED))
}

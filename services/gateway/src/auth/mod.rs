//! 鉴权模块：令牌编解码、refresh 轮换、API Key 校验、请求分派与会话签发。

pub(crate) mod api_key;
pub(crate) mod dispatch;
pub(crate) mod handlers;
pub(crate) mod middleware;
pub(crate) mod password;
pub(crate) mod refresh;
pub(crate) mod session;
pub(crate) mod store;
pub(crate) mod token;
pub(crate) mod token_crypto;

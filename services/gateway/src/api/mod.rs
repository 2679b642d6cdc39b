//! HTTP 接口类型、错误与响应包裹。

pub(crate) mod error;
pub(crate) mod extract;
pub(crate) mod response;
pub(crate) mod types;

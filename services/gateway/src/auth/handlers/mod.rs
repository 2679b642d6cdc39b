//! 鉴权 HTTP 接口处理模块。

mod http;

pub(crate) use http::{login_handler, profile_handler, refresh_handler, register_handler};

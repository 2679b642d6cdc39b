// 文件职责：
// 1) 定义 gateway 与调用方共用的鉴权协议数据结构（令牌对、资料视图）。
// 2) 固定请求头名称与令牌类型常量，避免两端各自硬编码。
// 3) 提供时间戳等跨端一致的基础函数。

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Bearer 鉴权请求头。
pub const AUTHORIZATION_HEADER: &str = "authorization";
/// 静态 API Key 请求头。
pub const API_KEY_HEADER: &str = "api-key";
/// 令牌类型（响应体 `token_type`）。
pub const TOKEN_TYPE_BEARER: &str = "Bearer";
/// access token 有效期（秒）。
pub const ACCESS_TOKEN_TTL_SEC: u64 = 15 * 60;
/// refresh token 有效期（秒）。
pub const REFRESH_TOKEN_TTL_SEC: u64 = 30 * 24 * 60 * 60;

/// 登录/刷新成功后返回的令牌对。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPairResponse {
    // 短时签名令牌。
    pub access_token: String,
    // 单次使用的轮换令牌。
    pub refresh_token: String,
    // 固定为 `Bearer`。
    pub token_type: String,
    // access token 剩余有效秒数。
    pub expires_in: u64,
}

impl TokenPairResponse {
    /// 按固定令牌类型与有效期组装响应。
    pub fn bearer(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
            token_type: TOKEN_TYPE_BEARER.to_string(),
            expires_in: ACCESS_TOKEN_TTL_SEC,
        }
    }
}

/// 刷新请求体。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshRequest {
    #[serde(default)]
    pub refresh_token: String,
}

/// 鉴权方式（资料接口 `access_by` 字段）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccessBy {
    #[serde(rename = "JWT")]
    Jwt,
    #[serde(rename = "APIKey")]
    ApiKey,
}

/// 当前调用方资料视图。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfilePayload {
    // 调用方所属用户。
    pub user_id: u64,
    // JWT 为用户角色；API Key 为 key 的 scope。
    pub role: String,
    // API Key 的客户端标签（JWT 时缺省）。
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    pub access_by: AccessBy,
}

/// 生成纳秒精度 UTC 时间戳（RFC3339）。
pub fn now_rfc3339_nanos() -> String {
    Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Nanos, true)
}

//! API 请求/响应类型与持久化凭证记录。

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

/// 登录请求。
#[derive(Debug, Deserialize)]
pub(crate) struct LoginRequest {
    #[serde(default)]
    pub(crate) username: String,
    #[serde(default)]
    pub(crate) password: String,
}

/// 注册请求。
#[derive(Debug, Deserialize)]
pub(crate) struct RegisterRequest {
    #[serde(default)]
    pub(crate) username: String,
    #[serde(default)]
    pub(crate) password: String,
    #[serde(default)]
    pub(crate) email: String,
    #[serde(default)]
    pub(crate) role: String,
}

/// 注册返回（不含密码摘要）。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub(crate) struct UserView {
    pub(crate) user_id: u64,
    pub(crate) username: String,
    pub(crate) email: String,
    pub(crate) role: String,
}

impl From<&UserRecord> for UserView {
    fn from(record: &UserRecord) -> Self {
        Self {
            user_id: record.user_id,
            username: record.username.clone(),
            email: record.email.clone(),
            role: record.role.clone(),
        }
    }
}

/// 持久化凭证文档。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CredentialDocument {
    pub(crate) version: u32,
    #[serde(default = "first_user_id")]
    pub(crate) next_user_id: u64,
    #[serde(default)]
    pub(crate) users: BTreeMap<u64, UserRecord>,
    /// 以 refresh token 的 sha256 摘要为键，不落明文。
    #[serde(default)]
    pub(crate) refresh_tokens: HashMap<String, RefreshTokenRecord>,
    #[serde(default)]
    pub(crate) api_keys: HashMap<String, ApiKeyRecord>,
}

impl Default for CredentialDocument {
    fn default() -> Self {
        Self {
            version: 1,
            next_user_id: first_user_id(),
            users: BTreeMap::new(),
            refresh_tokens: HashMap::new(),
            api_keys: HashMap::new(),
        }
    }
}

fn first_user_id() -> u64 {
    1
}

/// 用户记录。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct UserRecord {
    pub(crate) user_id: u64,
    pub(crate) username: String,
    pub(crate) email: String,
    pub(crate) password_hash: String,
    pub(crate) role: String,
    pub(crate) created_at: String,
}

/// 待写入的新用户（id 由存储分配）。
#[derive(Debug, Clone)]
pub(crate) struct NewUser {
    pub(crate) username: String,
    pub(crate) email: String,
    pub(crate) password_hash: String,
    pub(crate) role: String,
}

/// refresh token 记录。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RefreshTokenRecord {
    pub(crate) token_hash: String,
    pub(crate) user_id: u64,
    pub(crate) expires_at: u64,
    pub(crate) created_at: String,
}

/// 静态 API Key 记录。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ApiKeyRecord {
    pub(crate) key: String,
    pub(crate) user_id: u64,
    pub(crate) client: String,
    #[serde(default)]
    pub(crate) scope: String,
    pub(crate) active: bool,
    pub(crate) created_at: String,
    #[serde(default)]
    pub(crate) deactivated_at: Option<String>,
}

/// JWT 头部。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct TokenHeader {
    pub(crate) alg: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) typ: Option<String>,
}

/// access token claims。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct AccessTokenClaims {
    pub(crate) user_id: u64,
    pub(crate) role: String,
    pub(crate) iat: u64,
    pub(crate) exp: u64,
    pub(crate) jti: String,
}

/// 签名算法（仅支持 HS256）。
pub(crate) const TOKEN_ALG_HS256: &str = "HS256";
/// JWT 类型标记。
pub(crate) const TOKEN_TYP_JWT: &str = "JWT";
/// 允许注册的角色。
pub(crate) const KNOWN_ROLES: [&str; 2] = ["admin", "user"];

//! access token 签发与校验（HS256 紧凑 JWT）。

use std::{fmt, sync::Arc};

use ag_shared_protocol::ACCESS_TOKEN_TTL_SEC;
use uuid::Uuid;

use crate::{
    api::types::{AccessTokenClaims, TOKEN_ALG_HS256, TOKEN_TYP_JWT, TokenHeader},
    auth::{
        store::unix_now,
        token_crypto::{decode_segment, encode_segment, hmac_b64url, verify_hmac_b64url},
    },
};

/// 令牌错误。校验失败一律为 `InvalidToken`，不区分原因。
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub(crate) enum TokenError {
    #[error("invalid token")]
    InvalidToken,
    #[error("{0}")]
    Encode(String),
}

/// 签名密钥为空。
#[derive(Debug, thiserror::Error)]
#[error("signing secret must not be empty")]
pub(crate) struct EmptySecret;

/// 进程级签名密钥；`Debug` 输出已脱敏。
#[derive(Clone)]
pub(crate) struct SigningSecret(Arc<[u8]>);

impl SigningSecret {
    /// 构造密钥，空串或纯空白直接拒绝。
    pub(crate) fn new(raw: &str) -> Result<Self, EmptySecret> {
        if raw.trim().is_empty() {
            return Err(EmptySecret);
        }
        Ok(Self(Arc::from(raw.as_bytes())))
    }

    pub(crate) fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub(crate) fn len(&self) -> usize {
        self.0.len()
    }
}

impl fmt::Debug for SigningSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SigningSecret(<redacted>)")
    }
}

/// access token 编解码器。
#[derive(Debug, Clone)]
pub(crate) struct TokenCodec {
    secret: SigningSecret,
    ttl_sec: u64,
}

impl TokenCodec {
    pub(crate) fn new(secret: SigningSecret) -> Self {
        Self {
            secret,
            ttl_sec: ACCESS_TOKEN_TTL_SEC,
        }
    }

    /// 以当前时间签发 access token。
    pub(crate) fn issue(&self, user_id: u64, role: &str) -> Result<String, TokenError> {
        self.issue_at(user_id, role, unix_now())
    }

    /// 以指定时间签发 access token。
    pub(crate) fn issue_at(&self, user_id: u64, role: &str, now: u64) -> Result<String, TokenError> {
        let header = TokenHeader {
            alg: TOKEN_ALG_HS256.to_string(),
            typ: Some(TOKEN_TYP_JWT.to_string()),
        };
        let claims = AccessTokenClaims {
            user_id,
            role: role.to_string(),
            iat: now,
            exp: now.saturating_add(self.ttl_sec),
            jti: Uuid::new_v4().simple().to_string(),
        };
        let signing_input = format!("{}.{}", encode_segment(&header)?, encode_segment(&claims)?);
        let sig_b64 = hmac_b64url(self.secret.as_bytes(), signing_input.as_bytes())?;
        Ok(format!("{signing_input}.{sig_b64}"))
    }

    /// 以当前时间校验 access token。
    pub(crate) fn verify(&self, token: &str) -> Result<AccessTokenClaims, TokenError> {
        self.verify_at(token, unix_now())
    }

    /// 以指定时间校验 access token；`now > exp` 即失效，不留时钟偏差余量。
    pub(crate) fn verify_at(&self, token: &str, now: u64) -> Result<AccessTokenClaims, TokenError> {
        let mut parts = token.split('.');
        let header_b64 = parts.next().unwrap_or_default();
        let payload_b64 = parts.next().unwrap_or_default();
        let sig_b64 = parts.next().unwrap_or_default();
        if header_b64.is_empty()
            || payload_b64.is_empty()
            || sig_b64.is_empty()
            || parts.next().is_some()
        {
            return Err(TokenError::InvalidToken);
        }

        let header: TokenHeader = decode_segment(header_b64)?;
        if header.alg != TOKEN_ALG_HS256
            || header
                .typ
                .as_deref()
                .is_some_and(|typ| !typ.eq_ignore_ascii_case(TOKEN_TYP_JWT))
        {
            return Err(TokenError::InvalidToken);
        }

        // 签名覆盖收到的原始 header/payload 字节，而不是重新编码后的结果。
        let signing_input = &token[..header_b64.len() + 1 + payload_b64.len()];
        verify_hmac_b64url(self.secret.as_bytes(), signing_input.as_bytes(), sig_b64)?;

        let claims: AccessTokenClaims = decode_segment(payload_b64)?;
        if now > claims.exp {
            return Err(TokenError::InvalidToken);
        }
        Ok(claims)
    }
}

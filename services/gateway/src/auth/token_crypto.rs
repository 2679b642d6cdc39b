//! 令牌加解密辅助函数：HMAC 签名、base64url JSON 段、摘要与随机值。

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use hmac::{Hmac, Mac};
use serde::{Serialize, de::DeserializeOwned};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use super::token::TokenError;

type HmacSha256 = Hmac<Sha256>;

/// 以给定密钥初始化 HMAC-SHA256 并喂入 payload。
fn keyed_mac(secret: &[u8], payload: &[u8]) -> Result<HmacSha256, TokenError> {
    let mut mac = HmacSha256::new_from_slice(secret)
        .map_err(|err| TokenError::Encode(format!("init hmac failed: {err}")))?;
    mac.update(payload);
    Ok(mac)
}

/// HMAC-SHA256 并输出 base64url。
pub(crate) fn hmac_b64url(secret: &[u8], payload: &[u8]) -> Result<String, TokenError> {
    let mac = keyed_mac(secret, payload)?;
    Ok(URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes()))
}

/// 常量时间校验 base64url 签名。
pub(crate) fn verify_hmac_b64url(
    secret: &[u8],
    payload: &[u8],
    signature_b64: &str,
) -> Result<(), TokenError> {
    let signature = URL_SAFE_NO_PAD
        .decode(signature_b64.as_bytes())
        .map_err(|_| TokenError::InvalidToken)?;
    let mac = keyed_mac(secret, payload).map_err(|_| TokenError::InvalidToken)?;
    mac.verify_slice(&signature)
        .map_err(|_| TokenError::InvalidToken)
}

/// JSON 编码后转 base64url 段。
pub(crate) fn encode_segment<T: Serialize>(value: &T) -> Result<String, TokenError> {
    let raw = serde_json::to_vec(value)
        .map_err(|err| TokenError::Encode(format!("encode token segment failed: {err}")))?;
    Ok(URL_SAFE_NO_PAD.encode(raw))
}

/// 解码 base64url JSON 段。
pub(crate) fn decode_segment<T: DeserializeOwned>(segment: &str) -> Result<T, TokenError> {
    let raw = URL_SAFE_NO_PAD
        .decode(segment.as_bytes())
        .map_err(|_| TokenError::InvalidToken)?;
    serde_json::from_slice(&raw).map_err(|_| TokenError::InvalidToken)
}

/// sha256 hex。
pub(crate) fn sha256_hex(value: &str) -> String {
    let digest = Sha256::digest(value.as_bytes());
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        use std::fmt::Write;
        let _ = write!(&mut out, "{byte:02x}");
    }
    out
}

/// 生成带前缀的高熵随机串（两段 v4 UUID，约 244 bit）。
pub(crate) fn random_secret(prefix: &str) -> String {
    format!(
        "{prefix}{}{}",
        Uuid::new_v4().simple(),
        Uuid::new_v4().simple()
    )
}

//! 密码摘要（bcrypt），放到阻塞线程池里执行。

use tracing::warn;

/// 生产环境 bcrypt 代价。
const BCRYPT_COST: u32 = bcrypt::DEFAULT_COST;

/// 密码处理失败。
#[derive(Debug, thiserror::Error)]
pub(crate) enum PasswordError {
    #[error("hash password failed: {0}")]
    Hash(String),
    #[error("password task aborted: {0}")]
    Join(String),
}

/// 生成密码摘要。
pub(crate) async fn hash_password(password: String) -> Result<String, PasswordError> {
    hash_password_with_cost(password, BCRYPT_COST).await
}

pub(crate) async fn hash_password_with_cost(
    password: String,
    cost: u32,
) -> Result<String, PasswordError> {
    tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
        .await
        .map_err(|err| PasswordError::Join(err.to_string()))?
        .map_err(|err| PasswordError::Hash(err.to_string()))
}

/// 校验密码；摘要本身损坏时按不匹配处理。
pub(crate) async fn verify_password(password: String, hash: String) -> Result<bool, PasswordError> {
    let verdict = tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
        .await
        .map_err(|err| PasswordError::Join(err.to_string()))?;
    match verdict {
        Ok(matched) => Ok(matched),
        Err(err) => {
            warn!("stored password hash unreadable: {err}");
            Ok(false)
        }
    }
}

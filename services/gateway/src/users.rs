//! 用户注册。

use crate::{
    api::types::{KNOWN_ROLES, NewUser, RegisterRequest, UserView},
    auth::{
        password::{PasswordError, hash_password},
        store::{CredentialStore, StoreError},
    },
};

/// 注册失败。
#[derive(Debug, thiserror::Error)]
pub(crate) enum RegisterError {
    #[error("{0}")]
    Invalid(&'static str),
    /// 用户名或邮箱已被占用。
    #[error("{0} already exists")]
    Conflict(&'static str),
    #[error(transparent)]
    Password(#[from] PasswordError),
    #[error(transparent)]
    Store(StoreError),
}

/// 校验注册参数，返回归一化后的 (username, email, role)。
fn validate(req: &RegisterRequest) -> Result<(String, String, String), RegisterError> {
    let username = req.username.trim();
    if username.is_empty() {
        return Err(RegisterError::Invalid("用户名不能为空"));
    }
    if req.password.is_empty() {
        return Err(RegisterError::Invalid("密码不能为空"));
    }
    let email = req.email.trim();
    let well_formed = email
        .split_once('@')
        .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.') && !domain.contains('@'));
    if !well_formed {
        return Err(RegisterError::Invalid("邮箱格式无效"));
    }
    let role = req.role.trim();
    if !KNOWN_ROLES.contains(&role) {
        return Err(RegisterError::Invalid("角色只能是 admin 或 user"));
    }
    Ok((username.to_string(), email.to_string(), role.to_string()))
}

/// 注册新用户。
pub(crate) async fn register_user(
    store: &dyn CredentialStore,
    req: RegisterRequest,
) -> Result<UserView, RegisterError> {
    let (username, email, role) = validate(&req)?;
    if store
        .find_user_by_username(&username)
        .await
        .map_err(RegisterError::Store)?
        .is_some()
    {
        return Err(RegisterError::Conflict("username"));
    }

    let password_hash = hash_password(req.password).await?;
    let record = store
        .insert_user(NewUser {
            username,
            email,
            password_hash,
            role,
        })
        .await
        .map_err(|err| match err {
            StoreError::Conflict(field) => RegisterError::Conflict(field),
            other => RegisterError::Store(other),
        })?;
    Ok(UserView::from(&record))
}

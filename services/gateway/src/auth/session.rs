//! 会话签发：登录与刷新流程，把 access token 与 refresh token 成对发放。

use std::sync::Arc;

use ag_shared_protocol::TokenPairResponse;
use tracing::info;

use crate::auth::{
    password::{PasswordError, verify_password},
    refresh::{RefreshError, RefreshTokenStore},
    store::{CredentialStore, StoreError},
    token::{TokenCodec, TokenError},
};

/// 会话流程失败。
#[derive(Debug, thiserror::Error)]
pub(crate) enum SessionError {
    /// 用户名不存在与密码错误合一。
    #[error("invalid username or password")]
    InvalidCredentials,
    #[error("refresh token not found or expired")]
    NotFoundOrExpired,
    /// refresh 成功后解析用户角色失败，属于内部错误。
    #[error("identity unavailable: {0}")]
    IdentityUnavailable(String),
    #[error(transparent)]
    Token(#[from] TokenError),
    #[error(transparent)]
    Password(#[from] PasswordError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// 一次签发得到的令牌对。
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct IssuedTokens {
    pub(crate) access_token: String,
    pub(crate) refresh_token: String,
}

impl From<IssuedTokens> for TokenPairResponse {
    fn from(tokens: IssuedTokens) -> Self {
        TokenPairResponse::bearer(tokens.access_token, tokens.refresh_token)
    }
}

/// 会话签发器。
#[derive(Clone)]
pub(crate) struct SessionIssuer {
    codec: TokenCodec,
    refresh: RefreshTokenStore,
    store: Arc<dyn CredentialStore>,
}

impl SessionIssuer {
    pub(crate) fn new(
        codec: TokenCodec,
        refresh: RefreshTokenStore,
        store: Arc<dyn CredentialStore>,
    ) -> Self {
        Self {
            codec,
            refresh,
            store,
        }
    }

    /// 为已确认身份的用户签发令牌对。
    pub(crate) async fn login(&self, user_id: u64, role: &str) -> Result<IssuedTokens, SessionError> {
        let access_token = self.codec.issue(user_id, role)?;
        // refresh 落库失败时 access token 随之丢弃，不单独返回。
        let refresh_token = self.refresh.create(user_id).await?;
        Ok(IssuedTokens {
            access_token,
            refresh_token,
        })
    }

    /// 用户名密码登录。
    pub(crate) async fn login_with_password(
        &self,
        username: &str,
        password: &str,
    ) -> Result<IssuedTokens, SessionError> {
        let Some(user) = self.store.find_user_by_username(username.trim()).await? else {
            return Err(SessionError::InvalidCredentials);
        };
        if !verify_password(password.to_string(), user.password_hash.clone()).await? {
            return Err(SessionError::InvalidCredentials);
        }
        let tokens = self.login(user.user_id, &user.role).await?;
        info!(user_id = user.user_id, "session issued");
        Ok(tokens)
    }

    /// 轮换：消费旧 refresh token，按用户当前角色重新签发。
    pub(crate) async fn refresh(&self, old_refresh_token: &str) -> Result<IssuedTokens, SessionError> {
        let user_id = self
            .refresh
            .consume_valid(old_refresh_token)
            .await
            .map_err(|err| match err {
                RefreshError::NotFoundOrExpired => SessionError::NotFoundOrExpired,
                RefreshError::Store(err) => SessionError::Store(err),
            })?;

        let user = self
            .store
            .find_user(user_id)
            .await
            .map_err(|err| SessionError::IdentityUnavailable(err.to_string()))?
            .ok_or_else(|| SessionError::IdentityUnavailable(format!("user {user_id} not found")))?;

        let tokens = self.login(user.user_id, &user.role).await?;
        info!(user_id = user.user_id, "session rotated");
        Ok(tokens)
    }
}

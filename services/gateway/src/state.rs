//! Gateway 共享状态：凭证存储句柄与鉴权组件。

use std::sync::Arc;

use crate::auth::{
    api_key::ApiKeyValidator,
    dispatch::AuthDispatcher,
    refresh::RefreshTokenStore,
    session::SessionIssuer,
    store::CredentialStore,
    token::{SigningSecret, TokenCodec},
};

/// Gateway 共享状态。
#[derive(Clone)]
pub(crate) struct AppState {
    /// 凭证存储（用户、refresh token、API key）。
    pub(crate) store: Arc<dyn CredentialStore>,
    /// 请求鉴权分派器。
    pub(crate) dispatcher: AuthDispatcher,
    /// 登录与刷新流程。
    pub(crate) sessions: SessionIssuer,
    /// refresh token 存取（后台清理共用）。
    pub(crate) refresh: RefreshTokenStore,
}

impl AppState {
    /// 用同一份签名密钥与存储装配所有鉴权组件。
    pub(crate) fn new(secret: SigningSecret, store: Arc<dyn CredentialStore>) -> Self {
        let codec = TokenCodec::new(secret);
        let refresh = RefreshTokenStore::new(store.clone());
        let dispatcher = AuthDispatcher::new(codec.clone(), ApiKeyValidator::new(store.clone()));
        let sessions = SessionIssuer::new(codec, refresh.clone(), store.clone());
        Self {
            store,
            dispatcher,
            sessions,
            refresh,
        }
    }
}

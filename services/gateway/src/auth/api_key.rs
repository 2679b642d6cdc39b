//! 静态 API Key 校验与运维签发/停用。

use std::sync::Arc;

use crate::{
    api::types::ApiKeyRecord,
    auth::{
        store::{CredentialStore, StoreError},
        token_crypto::random_secret,
    },
};

/// API Key 明文前缀。
const API_KEY_PREFIX: &str = "agk_";

/// 校验失败。
#[derive(Debug, thiserror::Error)]
pub(crate) enum ApiKeyError {
    /// 不存在与已停用不作区分。
    #[error("api key inactive")]
    Inactive,
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// 通过校验的 key 授予的身份。
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ApiKeyGrant {
    pub(crate) user_id: u64,
    pub(crate) client: String,
    pub(crate) scope: String,
}

/// API Key 校验器。
#[derive(Clone)]
pub(crate) struct ApiKeyValidator {
    store: Arc<dyn CredentialStore>,
}

impl ApiKeyValidator {
    pub(crate) fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self { store }
    }

    /// 精确匹配激活中的 key。
    pub(crate) async fn lookup(&self, key: &str) -> Result<ApiKeyGrant, ApiKeyError> {
        if key.is_empty() {
            return Err(ApiKeyError::Inactive);
        }
        let record = self
            .store
            .find_active_api_key(key)
            .await?
            .ok_or(ApiKeyError::Inactive)?;
        Ok(ApiKeyGrant {
            user_id: record.user_id,
            client: record.client,
            scope: record.scope,
        })
    }

    /// 为用户签发新 key（运维操作）。
    pub(crate) async fn create(
        &self,
        user_id: u64,
        client: &str,
        scope: &str,
    ) -> Result<ApiKeyRecord, StoreError> {
        let record = ApiKeyRecord {
            key: random_secret(API_KEY_PREFIX),
            user_id,
            client: client.to_string(),
            scope: scope.to_string(),
            active: true,
            created_at: ag_shared_protocol::now_rfc3339_nanos(),
            deactivated_at: None,
        };
        self.store.insert_api_key(record.clone()).await?;
        Ok(record)
    }

    /// 停用 key（运维操作），返回 key 是否存在。
    pub(crate) async fn deactivate(&self, key: &str) -> Result<bool, StoreError> {
        self.store.deactivate_api_key(key).await
    }

    pub(crate) async fn list(&self) -> Result<Vec<ApiKeyRecord>, StoreError> {
        self.store.list_api_keys().await
    }
}

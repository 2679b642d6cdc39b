//! refresh token 签发、单次消费与过期清理。

use std::{sync::Arc, time::Duration};

use ag_shared_protocol::REFRESH_TOKEN_TTL_SEC;
use tokio::{task::JoinHandle, time::MissedTickBehavior};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    api::types::RefreshTokenRecord,
    auth::{
        store::{CredentialStore, StoreError, unix_now},
        token_crypto::sha256_hex,
    },
};

/// refresh 消费失败。
#[derive(Debug, thiserror::Error)]
pub(crate) enum RefreshError {
    /// 不存在、已消费、已过期三者合一。
    #[error("refresh token not found or expired")]
    NotFoundOrExpired,
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// refresh token 存取。
#[derive(Clone)]
pub(crate) struct RefreshTokenStore {
    store: Arc<dyn CredentialStore>,
    ttl_sec: u64,
}

impl RefreshTokenStore {
    pub(crate) fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self {
            store,
            ttl_sec: REFRESH_TOKEN_TTL_SEC,
        }
    }

    /// 为用户签发新的 refresh token，返回明文值。
    pub(crate) async fn create(&self, user_id: u64) -> Result<String, StoreError> {
        self.create_at(user_id, unix_now()).await
    }

    pub(crate) async fn create_at(&self, user_id: u64, now: u64) -> Result<String, StoreError> {
        let token = Uuid::new_v4().to_string();
        self.store
            .insert_refresh_token(RefreshTokenRecord {
                token_hash: sha256_hex(&token),
                user_id,
                expires_at: now.saturating_add(self.ttl_sec),
                created_at: ag_shared_protocol::now_rfc3339_nanos(),
            })
            .await?;
        Ok(token)
    }

    /// 消费 refresh token：命中即删除，返回所属用户。
    pub(crate) async fn consume_valid(&self, token: &str) -> Result<u64, RefreshError> {
        self.consume_valid_at(token, unix_now()).await
    }

    /// 按原值精确匹配，不做任何归一化。
    pub(crate) async fn consume_valid_at(&self, token: &str, now: u64) -> Result<u64, RefreshError> {
        if token.is_empty() {
            return Err(RefreshError::NotFoundOrExpired);
        }
        self.store
            .take_refresh_token(&sha256_hex(token), now)
            .await?
            .map(|record| record.user_id)
            .ok_or(RefreshError::NotFoundOrExpired)
    }

    /// 清理过期 refresh token。
    pub(crate) async fn sweep_expired(&self) -> Result<usize, StoreError> {
        self.store.purge_expired_refresh_tokens(unix_now()).await
    }
}

/// 启动后台清理任务，定期删除过期且未被消费的 refresh token。
pub(crate) fn spawn_refresh_sweeper(refresh: RefreshTokenStore, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            match refresh.sweep_expired().await {
                Ok(0) => {}
                Ok(removed) => info!("swept {removed} expired refresh tokens"),
                Err(err) => warn!("sweep refresh tokens failed: {err}"),
            }
        }
    })
}

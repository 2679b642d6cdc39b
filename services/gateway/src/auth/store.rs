//! 凭证存储：存储契约与基于 JSON 文件的实现。
//!
//! 文件是唯一事实来源：每次变更都在进程内写锁与跨进程文件锁之下
//! 重新读盘、修改、落盘，gateway 与运维 CLI 因此不会互相覆盖；
//! 读取前若文件戳变化则先重载。refresh token 的“查找 + 删除”在同一组锁内完成。

use std::{
    fs::{self, File, OpenOptions},
    path::{Path, PathBuf},
    time::SystemTime,
};

use async_trait::async_trait;
use fs2::FileExt;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::api::types::{
    ApiKeyRecord, CredentialDocument, NewUser, RefreshTokenRecord, UserRecord,
};

/// 存储错误。
#[derive(Debug, thiserror::Error)]
pub(crate) enum StoreError {
    /// 基础设施故障（读写失败、编码失败、加锁失败）。
    #[error("credential store unavailable: {0}")]
    Unavailable(String),
    /// 唯一约束冲突。
    #[error("{0} already exists")]
    Conflict(&'static str),
}

/// 当前 unix 秒。
pub(crate) fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// 凭证存储契约；gateway 只依赖这组操作。
#[async_trait]
pub(crate) trait CredentialStore: Send + Sync {
    /// 写入 refresh token 记录。
    async fn insert_refresh_token(&self, record: RefreshTokenRecord) -> Result<(), StoreError>;

    /// 取走未过期的 refresh token：命中即删除，并发调用中只有一个能拿到记录。
    async fn take_refresh_token(
        &self,
        token_hash: &str,
        now: u64,
    ) -> Result<Option<RefreshTokenRecord>, StoreError>;

    /// 清理已过期的 refresh token，返回清理条数。
    async fn purge_expired_refresh_tokens(&self, now: u64) -> Result<usize, StoreError>;

    /// 按 key 精确查找处于激活状态的 API Key。
    async fn find_active_api_key(&self, key: &str) -> Result<Option<ApiKeyRecord>, StoreError>;

    async fn insert_api_key(&self, record: ApiKeyRecord) -> Result<(), StoreError>;

    /// 停用 API Key；key 不存在时返回 `false`。
    async fn deactivate_api_key(&self, key: &str) -> Result<bool, StoreError>;

    async fn list_api_keys(&self) -> Result<Vec<ApiKeyRecord>, StoreError>;

    async fn find_user(&self, user_id: u64) -> Result<Option<UserRecord>, StoreError>;

    async fn find_user_by_username(&self, username: &str)
    -> Result<Option<UserRecord>, StoreError>;

    /// 写入新用户并分配 id；用户名或邮箱重复时返回 `Conflict`。
    async fn insert_user(&self, user: NewUser) -> Result<UserRecord, StoreError>;
}

/// 文件戳：修改时间 + 长度，用于判断是否需要重载。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileStamp {
    modified: SystemTime,
    len: u64,
}

/// 内存快照及其对应的文件戳。
struct Snapshot {
    document: CredentialDocument,
    stamp: Option<FileStamp>,
}

/// 一次变更的结果：返回值与文档是否被修改。
struct Mutation<T> {
    value: T,
    changed: bool,
}

impl<T> Mutation<T> {
    fn changed(value: T) -> Self {
        Self {
            value,
            changed: true,
        }
    }

    fn unchanged(value: T) -> Self {
        Self {
            value,
            changed: false,
        }
    }
}

/// JSON 文件凭证存储；`path` 为空时仅驻留内存。
pub(crate) struct FileCredentialStore {
    snapshot: RwLock<Snapshot>,
    path: Option<PathBuf>,
}

impl FileCredentialStore {
    /// 打开（或初始化）文件存储。
    pub(crate) fn open(path: PathBuf) -> Result<Self, StoreError> {
        let stamp = file_stamp(&path);
        let document = load_document(&path)?;
        Ok(Self {
            snapshot: RwLock::new(Snapshot { document, stamp }),
            path: Some(path),
        })
    }

    /// 纯内存存储。
    pub(crate) fn in_memory() -> Self {
        Self {
            snapshot: RwLock::new(Snapshot {
                document: CredentialDocument::default(),
                stamp: None,
            }),
            path: None,
        }
    }

    /// 只读访问；文件被其他进程改过时先重载。
    async fn read<T>(&self, f: impl FnOnce(&CredentialDocument) -> T) -> Result<T, StoreError> {
        if let Some(path) = &self.path {
            let stale = self.snapshot.read().await.stamp != file_stamp(path);
            if stale {
                let mut snapshot = self.snapshot.write().await;
                let stamp = file_stamp(path);
                if snapshot.stamp != stamp {
                    debug!("credential store changed on disk, reloading");
                    snapshot.document = load_document(path)?;
                    snapshot.stamp = stamp;
                }
            }
        }
        let snapshot = self.snapshot.read().await;
        Ok(f(&snapshot.document))
    }

    /// 变更：持锁读盘 → 修改工作副本 → 落盘 → 替换快照；任一步失败都不改动快照与文件。
    async fn mutate<T>(
        &self,
        f: impl FnOnce(&mut CredentialDocument) -> Result<Mutation<T>, StoreError>,
    ) -> Result<T, StoreError> {
        let mut snapshot = self.snapshot.write().await;
        let Some(path) = &self.path else {
            let mut document = snapshot.document.clone();
            let mutation = f(&mut document)?;
            snapshot.document = document;
            return Ok(mutation.value);
        };

        let _lock = lock_store_file(path)?;
        let mut document = load_document(path)?;
        let mutation = f(&mut document)?;
        if mutation.changed {
            persist_document(path, &document)?;
        }
        snapshot.stamp = file_stamp(path);
        snapshot.document = document;
        Ok(mutation.value)
    }
}

#[async_trait]
impl CredentialStore for FileCredentialStore {
    async fn insert_refresh_token(&self, record: RefreshTokenRecord) -> Result<(), StoreError> {
        self.mutate(|document| {
            if document.refresh_tokens.contains_key(&record.token_hash) {
                return Err(StoreError::Conflict("refresh token"));
            }
            document
                .refresh_tokens
                .insert(record.token_hash.clone(), record);
            Ok(Mutation::changed(()))
        })
        .await
    }

    async fn take_refresh_token(
        &self,
        token_hash: &str,
        now: u64,
    ) -> Result<Option<RefreshTokenRecord>, StoreError> {
        self.mutate(|document| {
            let Some(record) = document.refresh_tokens.remove(token_hash) else {
                return Ok(Mutation::unchanged(None));
            };
            // 过期记录同样删除，只是不交给调用方。
            Ok(Mutation::changed((record.expires_at > now).then_some(record)))
        })
        .await
    }

    async fn purge_expired_refresh_tokens(&self, now: u64) -> Result<usize, StoreError> {
        self.mutate(|document| {
            let before = document.refresh_tokens.len();
            document
                .refresh_tokens
                .retain(|_, record| record.expires_at > now);
            let removed = before - document.refresh_tokens.len();
            Ok(if removed > 0 {
                Mutation::changed(removed)
            } else {
                Mutation::unchanged(0)
            })
        })
        .await
    }

    async fn find_active_api_key(&self, key: &str) -> Result<Option<ApiKeyRecord>, StoreError> {
        self.read(|document| {
            document
                .api_keys
                .get(key)
                .filter(|record| record.active)
                .cloned()
        })
        .await
    }

    async fn insert_api_key(&self, record: ApiKeyRecord) -> Result<(), StoreError> {
        self.mutate(|document| {
            if document.api_keys.contains_key(&record.key) {
                return Err(StoreError::Conflict("api key"));
            }
            document.api_keys.insert(record.key.clone(), record);
            Ok(Mutation::changed(()))
        })
        .await
    }

    async fn deactivate_api_key(&self, key: &str) -> Result<bool, StoreError> {
        self.mutate(|document| {
            let Some(record) = document.api_keys.get_mut(key) else {
                return Ok(Mutation::unchanged(false));
            };
            if !record.active {
                return Ok(Mutation::unchanged(true));
            }
            record.active = false;
            record.deactivated_at = Some(ag_shared_protocol::now_rfc3339_nanos());
            Ok(Mutation::changed(true))
        })
        .await
    }

    async fn list_api_keys(&self) -> Result<Vec<ApiKeyRecord>, StoreError> {
        self.read(|document| {
            let mut keys = document.api_keys.values().cloned().collect::<Vec<_>>();
            keys.sort_by(|a, b| a.created_at.cmp(&b.created_at));
            keys
        })
        .await
    }

    async fn find_user(&self, user_id: u64) -> Result<Option<UserRecord>, StoreError> {
        self.read(|document| document.users.get(&user_id).cloned())
            .await
    }

    async fn find_user_by_username(
        &self,
        username: &str,
    ) -> Result<Option<UserRecord>, StoreError> {
        self.read(|document| {
            document
                .users
                .values()
                .find(|user| user.username == username)
                .cloned()
        })
        .await
    }

    async fn insert_user(&self, user: NewUser) -> Result<UserRecord, StoreError> {
        self.mutate(|document| {
            if document
                .users
                .values()
                .any(|existing| existing.username == user.username)
            {
                return Err(StoreError::Conflict("username"));
            }
            if document
                .users
                .values()
                .any(|existing| existing.email.eq_ignore_ascii_case(&user.email))
            {
                return Err(StoreError::Conflict("email"));
            }

            let user_id = document.next_user_id;
            let record = UserRecord {
                user_id,
                username: user.username,
                email: user.email,
                password_hash: user.password_hash,
                role: user.role,
                created_at: ag_shared_protocol::now_rfc3339_nanos(),
            };
            document.users.insert(user_id, record.clone());
            document.next_user_id = user_id.saturating_add(1);
            Ok(Mutation::changed(record))
        })
        .await
    }
}

/// 读取文件戳；文件不存在时为 `None`。
fn file_stamp(path: &Path) -> Option<FileStamp> {
    let meta = fs::metadata(path).ok()?;
    Some(FileStamp {
        modified: meta.modified().ok()?,
        len: meta.len(),
    })
}

/// 获取存储文件的跨进程排他锁（`<store>.lock`），守卫析构即释放。
fn lock_store_file(path: &Path) -> Result<File, StoreError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|err| {
            StoreError::Unavailable(format!("create credential store dir failed: {err}"))
        })?;
    }
    let lock_path = path.with_extension("json.lock");
    let lock_file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(&lock_path)
        .map_err(|err| {
            StoreError::Unavailable(format!(
                "open credential store lock {} failed: {err}",
                lock_path.display()
            ))
        })?;
    lock_file.lock_exclusive().map_err(|err| {
        StoreError::Unavailable(format!("lock credential store failed: {err}"))
    })?;
    Ok(lock_file)
}

/// 加载凭证文档；文件不存在时返回空文档。
pub(crate) fn load_document(path: &Path) -> Result<CredentialDocument, StoreError> {
    if !path.exists() {
        return Ok(CredentialDocument::default());
    }
    let raw = fs::read(path)
        .map_err(|err| StoreError::Unavailable(format!("read credential store failed: {err}")))?;
    let mut document: CredentialDocument = serde_json::from_slice(&raw).map_err(|err| {
        StoreError::Unavailable(format!("decode credential store failed: {err}"))
    })?;
    let max_user_id = document.users.keys().next_back().copied().unwrap_or(0);
    if document.next_user_id <= max_user_id {
        warn!("credential store nextUserId lags behind users, repairing");
        document.next_user_id = max_user_id.saturating_add(1);
    }
    Ok(document)
}

/// 持久化凭证文档：先写临时文件再原子替换。
pub(crate) fn persist_document(path: &Path, document: &CredentialDocument) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|err| {
            StoreError::Unavailable(format!("create credential store dir failed: {err}"))
        })?;
    }
    let encoded = serde_json::to_vec_pretty(document).map_err(|err| {
        StoreError::Unavailable(format!("encode credential store failed: {err}"))
    })?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, encoded).map_err(|err| {
        StoreError::Unavailable(format!("write credential store failed: {err}"))
    })?;
    fs::rename(&tmp, path).map_err(|err| {
        StoreError::Unavailable(format!("finalize credential store failed: {err}"))
    })
}

//! Durable moderation policy on top of an opaque key/value backend.
//!
//! Key layout (each key is prefixed with `<namespace>:`):
//! - `moderated_group:<chat_id>` — one JSON record per group
//! - `moderated_group:index` — JSON array of every registered chat id
//! - `global:whitelist` — JSON array of process-wide whitelist entries

mod file;
mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

pub use file::FileKv;
pub use memory::MemoryKv;

use crate::{
    domain::ChatId,
    errors::Error,
    group::{contains_ignore_case, ModeratedGroup},
    Result,
};

const GROUP_PREFIX: &str = "moderated_group";
const INDEX_KEY: &str = "moderated_group:index";
const GLOBAL_WHITELIST_KEY: &str = "global:whitelist";

/// Minimal string key/value storage the policy store is built on.
#[async_trait]
pub trait KvBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: &str) -> Result<()>;
}

/// Typed access to moderated groups and the global whitelist.
///
/// Safe to share between the scheduler, the message dispatcher and command
/// handlers. Writes that touch shared keys (index, global whitelist) are
/// serialized through `write_lock`.
pub struct PolicyStore {
    backend: Arc<dyn KvBackend>,
    namespace: String,
    write_lock: Mutex<()>,
}

impl PolicyStore {
    pub fn new(backend: Arc<dyn KvBackend>, namespace: impl Into<String>) -> Self {
        Self {
            backend,
            namespace: namespace.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// In-memory store, nothing survives a restart.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryKv::default()), "curfew")
    }

    fn key(&self, key: &str) -> String {
        if self.namespace.is_empty() {
            key.to_string()
        } else {
            format!("{}:{key}", self.namespace)
        }
    }

    fn group_key(&self, chat_id: ChatId) -> String {
        self.key(&format!("{GROUP_PREFIX}:{}", chat_id.0))
    }

    /// Fetch a group's policy; `Ok(None)` if the chat was never registered.
    pub async fn get(&self, chat_id: ChatId) -> Result<Option<ModeratedGroup>> {
        let Some(raw) = self.backend.get(&self.group_key(chat_id)).await? else {
            return Ok(None);
        };
        let group: ModeratedGroup = serde_json::from_str(&raw).map_err(|e| {
            Error::Store(format!("corrupt record for chat {}: {e}", chat_id.0))
        })?;
        if group.chat_id != chat_id.0 {
            return Err(Error::Store(format!(
                "record for chat {} carries chat id {}",
                chat_id.0, group.chat_id
            )));
        }
        Ok(Some(group))
    }

    /// Like [`PolicyStore::get`], but a missing record is `Error::NotConfigured`.
    pub async fn require(&self, chat_id: ChatId) -> Result<ModeratedGroup> {
        self.get(chat_id).await?.ok_or(Error::NotConfigured)
    }

    /// Overwrite the whole record of `group` and make sure it is indexed.
    ///
    /// The index entry is written before the record: a failure in between
    /// leaves an indexed id without a record, which `list_all` skips, and
    /// never a record that `get` sees but the scheduler does not.
    pub async fn put(&self, group: &ModeratedGroup) -> Result<()> {
        let payload = serde_json::to_string(group)?;

        let _guard = self.write_lock.lock().await;
        let mut index = self.read_index().await?;
        if !index.contains(&group.chat_id) {
            index.push(group.chat_id);
            index.sort_unstable();
            self.backend
                .set(&self.key(INDEX_KEY), &serde_json::to_string(&index)?)
                .await?;
        }

        self.backend.set(&self.group_key(group.id()), &payload).await
    }

    /// Every registered group, in chat id order.
    ///
    /// An indexed id whose record is missing or unreadable is skipped and logged
    /// so one bad record cannot stop the others from being scheduled.
    pub async fn list_all(&self) -> Result<Vec<ModeratedGroup>> {
        let index = self.read_index().await?;
        let mut out = Vec::with_capacity(index.len());
        for chat_id in index {
            match self.get(ChatId(chat_id)).await {
                Ok(Some(group)) => out.push(group),
                Ok(None) => {
                    tracing::warn!(chat_id, "indexed group has no stored record");
                }
                Err(e) => {
                    tracing::error!(chat_id, error = %e, "failed to load indexed group");
                }
            }
        }
        Ok(out)
    }

    pub async fn global_whitelist(&self) -> Result<Vec<String>> {
        self.read_list(GLOBAL_WHITELIST_KEY).await
    }

    /// Append `entry` to the global whitelist. Returns false if it was already present.
    pub async fn add_global_whitelist_entry(&self, entry: &str) -> Result<bool> {
        let entry = entry.trim();
        if entry.is_empty() {
            return Err(Error::Validation(
                "whitelist entry must not be empty".to_string(),
            ));
        }

        let _guard = self.write_lock.lock().await;
        let mut list = self.read_list(GLOBAL_WHITELIST_KEY).await?;
        if contains_ignore_case(&list, entry) {
            return Ok(false);
        }
        list.push(entry.to_string());
        self.backend
            .set(&self.key(GLOBAL_WHITELIST_KEY), &serde_json::to_string(&list)?)
            .await?;
        Ok(true)
    }

    async fn read_index(&self) -> Result<Vec<i64>> {
        match self.backend.get(&self.key(INDEX_KEY)).await? {
            Some(raw) => serde_json::from_str(&raw)
                .map_err(|e| Error::Store(format!("corrupt group index: {e}"))),
            None => Ok(Vec::new()),
        }
    }

    async fn read_list(&self, key: &str) -> Result<Vec<String>> {
        match self.backend.get(&self.key(key)).await? {
            Some(raw) => {
                serde_json::from_str(&raw).map_err(|e| Error::Store(format!("corrupt {key}: {e}")))
            }
            None => Ok(Vec::new()),
        }
    }
}

/// Backend that fails reads or writes of keys ending in a given suffix.
#[cfg(test)]
#[derive(Default)]
pub(crate) struct FlakyKv {
    pub inner: MemoryKv,
    pub fail_get_suffix: Option<&'static str>,
    pub fail_set_suffix: Option<&'static str>,
}

#[cfg(test)]
#[async_trait]
impl KvBackend for FlakyKv {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        if self.fail_get_suffix.is_some_and(|s| key.ends_with(s)) {
            return Err(Error::Store(format!("read of {key} failed")));
        }
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        if self.fail_set_suffix.is_some_and(|s| key.ends_with(s)) {
            return Err(Error::Store(format!("write of {key} failed")));
        }
        self.inner.set(key, value).await
    }
}

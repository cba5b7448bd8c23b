use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{errors::Error, store::KvBackend, Result};

/// Key/value backend persisted as a single JSON object on disk.
///
/// The whole keyspace lives in memory; every `set` rewrites the file through a
/// temporary sibling and a rename, so a crash leaves either the old or the new
/// snapshot.
pub struct FileKv {
    path: PathBuf,
    entries: RwLock<BTreeMap<String, String>>,
}

impl FileKv {
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let entries = match tokio::fs::read_to_string(&path).await {
            Ok(txt) if txt.trim().is_empty() => BTreeMap::new(),
            Ok(txt) => serde_json::from_str(&txt).map_err(|e| {
                Error::Store(format!("corrupt store file {}: {e}", path.display()))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        Ok(Self {
            path,
            entries: RwLock::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl KvBackend for FileKv {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self.entries.write().await;
        let previous = entries.insert(key.to_string(), value.to_string());

        let flushed = flush(&self.path, &entries).await;
        if let Err(e) = flushed {
            // Keep memory consistent with what is on disk.
            match previous {
                Some(old) => entries.insert(key.to_string(), old),
                None => entries.remove(key),
            };
            return Err(Error::Store(format!(
                "failed to write {}: {e}",
                self.path.display()
            )));
        }
        Ok(())
    }
}

async fn flush(path: &Path, entries: &BTreeMap<String, String>) -> Result<()> {
    let txt = serde_json::to_string_pretty(entries)?;
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    tokio::fs::write(&tmp, txt).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{store::KvBackend, Result};

/// Process-local backend. Used when no `STORE_PATH` is configured, and in tests.
#[derive(Default)]
pub struct MemoryKv {
    entries: RwLock<HashMap<String, String>>,
}

#[async_trait]
impl KvBackend for MemoryKv {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

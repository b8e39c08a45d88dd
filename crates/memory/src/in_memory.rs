//! In-memory store: useful for testing and ephemeral sessions.

use async_trait::async_trait;
use evaloop_core::error::MemoryError;
use evaloop_core::memory::{MemoryEntry, MemoryHit, MemoryStore};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Stores memories in a Vec. Nothing survives the process.
pub struct InMemoryStore {
    entries: Arc<RwLock<Vec<MemoryEntry>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(RwLock::new(Vec::new())),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MemoryStore for InMemoryStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn save(&self, text: &str) -> Result<String, MemoryError> {
        let entry = MemoryEntry::new(text);
        let id = entry.id.clone();
        self.entries.write().await.push(entry);
        Ok(id)
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<MemoryHit>, MemoryError> {
        let entries = self.entries.read().await;
        Ok(crate::rank(&entries, query, limit))
    }

    async fn count(&self) -> Result<usize, MemoryError> {
        Ok(self.entries.read().await.len())
    }
}

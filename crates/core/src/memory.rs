//! Memory trait: long-term storage the memory capabilities read and write.
//!
//! Similarity search internals are out of scope; stores rank by whatever
//! scoring they implement and return the best `limit` hits.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use crate::error::MemoryError;

/// A single stored memory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub id: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl MemoryEntry {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            content: content.into(),
            created_at: Utc::now(),
        }
    }
}

/// A ranked search result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryHit {
    pub id: String,
    pub content: String,
    /// Higher is more relevant
    pub score: f32,
}

/// The core MemoryStore trait.
///
/// Implementations: in-memory (tests, ephemeral sessions) and JSONL file.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// The backend name (e.g., "in_memory", "file").
    fn name(&self) -> &str;

    /// Persist `text` and return its id.
    async fn save(&self, text: &str) -> std::result::Result<String, MemoryError>;

    /// Best `limit` hits for `query`, most relevant first.
    async fn search(&self, query: &str, limit: usize) -> std::result::Result<Vec<MemoryHit>, MemoryError>;

    async fn count(&self) -> std::result::Result<usize, MemoryError>;
}

/// Lowercased alphanumeric terms of `text`.
pub fn terms(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Fraction of query terms present in `content`, in `0.0..=1.0`.
pub fn term_overlap(query_terms: &[String], content: &str) -> f32 {
    if query_terms.is_empty() {
        return 0.0;
    }
    let content_terms = terms(content);
    let matched = query_terms
        .iter()
        .filter(|q| content_terms.iter().any(|c| c == *q))
        .count();
    matched as f32 / query_terms.len() as f32
}

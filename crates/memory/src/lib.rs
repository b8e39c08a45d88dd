//! Memory store implementations for Evaloop.

pub mod file_store;
pub mod in_memory;

pub use file_store::FileStore;
pub use in_memory::InMemoryStore;

use evaloop_core::memory::{term_overlap, terms, MemoryEntry, MemoryHit};

/// Rank `entries` against `query` by term overlap, best first.
///
/// Entries sharing no term with the query are dropped. Ties keep the most
/// recent entry first.
pub(crate) fn rank(entries: &[MemoryEntry], query: &str, limit: usize) -> Vec<MemoryHit> {
    let query_terms = terms(query);
    let mut hits: Vec<MemoryHit> = entries
        .iter()
        .rev()
        .filter_map(|e| {
            let score = term_overlap(&query_terms, &e.content);
            (score > 0.0).then(|| MemoryHit {
                id: e.id.clone(),
                content: e.content.clone(),
                score,
            })
        })
        .collect();

    hits.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    hits.truncate(limit);
    hits
}

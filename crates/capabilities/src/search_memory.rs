//! `search_memory`: recall stored information by query.

use async_trait::async_trait;
use evaloop_core::capability::{Capability, CapabilityContext};
use evaloop_core::error::CapabilityError;
use evaloop_core::memory::MemoryStore;
use evaloop_core::plan::ActionOutput;
use std::sync::Arc;
use tracing::debug;

pub struct SearchMemory {
    memory: Arc<dyn MemoryStore>,
    limit: usize,
}

impl SearchMemory {
    pub fn new(memory: Arc<dyn MemoryStore>, limit: usize) -> Self {
        Self {
            memory,
            limit: limit.max(1),
        }
    }
}

#[async_trait]
impl Capability for SearchMemory {
    fn name(&self) -> &str {
        "search_memory"
    }

    fn description(&self) -> &str {
        "The assistant replies with the action \"search_memory\" for searching between its memories with a query term."
    }

    fn parameters(&self) -> Option<serde_json::Value> {
        Some(serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The query to be used to search informations"
                },
                "reasoning": {
                    "type": "string",
                    "description": "reasoning behind the intent"
                }
            },
            "required": ["query"]
        }))
    }

    async fn invoke(
        &self,
        args: &serde_json::Value,
        _ctx: &dyn CapabilityContext,
    ) -> Result<ActionOutput, CapabilityError> {
        let query = crate::required_str(self.name(), args, "query")?;

        let hits = self
            .memory
            .search(query, self.limit)
            .await
            .map_err(|e| CapabilityError::ExecutionFailed {
                action: self.name().into(),
                reason: e.to_string(),
            })?;
        debug!(query, hits = hits.len(), "Memory search");

        if hits.is_empty() {
            return Ok(ActionOutput::Text(format!("No memories found for: {query}")));
        }

        let mut text = String::from("Memories found in the database:\n");
        for hit in hits {
            let flat = hit.content.split_whitespace().collect::<Vec<_>>().join(" ");
            text.push_str(&format!("- {flat}\n"));
        }
        Ok(ActionOutput::Text(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::TestContext;
    use evaloop_memory::InMemoryStore;

    #[tokio::test]
    async fn lists_matching_memories() {
        let memory = Arc::new(InMemoryStore::new());
        memory.save("The user likes\n green tea").await.unwrap();
        memory.save("The weather is cold").await.unwrap();

        let cap = SearchMemory::new(memory, 5);
        let out = cap
            .invoke(&serde_json::json!({"query": "tea"}), &TestContext::new())
            .await
            .unwrap()
            .to_string();

        assert!(out.starts_with("Memories found in the database:\n"));
        assert!(out.contains("- The user likes green tea\n"));
        assert!(!out.contains("weather"));
    }

    #[tokio::test]
    async fn reports_empty_result() {
        let cap = SearchMemory::new(Arc::new(InMemoryStore::new()), 5);
        let out = cap
            .invoke(&serde_json::json!({"query": "anything", "reasoning": "why not"}), &TestContext::new())
            .await
            .unwrap();
        assert_eq!(out.to_string(), "No memories found for: anything");
    }
}

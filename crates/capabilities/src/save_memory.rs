//! `save_memory`: store a piece of information permanently.

use async_trait::async_trait;
use evaloop_core::capability::{Capability, CapabilityContext};
use evaloop_core::error::CapabilityError;
use evaloop_core::memory::MemoryStore;
use evaloop_core::plan::ActionOutput;
use std::sync::Arc;
use tracing::info;

pub struct SaveMemory {
    memory: Arc<dyn MemoryStore>,
}

impl SaveMemory {
    pub fn new(memory: Arc<dyn MemoryStore>) -> Self {
        Self { memory }
    }
}

#[async_trait]
impl Capability for SaveMemory {
    fn name(&self) -> &str {
        "save_memory"
    }

    fn description(&self) -> &str {
        "The assistant replies with the action \"save_memory\" and the string to remember or store an information that thinks it is relevant permanently."
    }

    fn parameters(&self) -> Option<serde_json::Value> {
        Some(serde_json::json!({
            "type": "object",
            "properties": {
                "thought": {
                    "type": "string",
                    "description": "information to save"
                }
            },
            "required": ["thought"]
        }))
    }

    async fn invoke(
        &self,
        args: &serde_json::Value,
        _ctx: &dyn CapabilityContext,
    ) -> Result<ActionOutput, CapabilityError> {
        let thought = crate::required_str(self.name(), args, "thought")?;
        info!(backend = self.memory.name(), "Saving to memory");

        self.memory
            .save(thought)
            .await
            .map_err(|e| CapabilityError::ExecutionFailed {
                action: self.name().into(),
                reason: e.to_string(),
            })?;

        Ok(ActionOutput::Text("The object was saved permanently to memory.".into()))
    }
}

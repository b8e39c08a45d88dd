//! Built-in capabilities for Evaloop.
//!
//! Capabilities give the engine the ability to act: remember facts, recall
//! them, search the web and write files into a sandboxed workspace.

pub mod save_memory;
pub mod search_internet;
pub mod search_memory;
pub mod write_file;

use evaloop_config::AppConfig;
use evaloop_core::capability::Capability;
use evaloop_core::error::MemoryError;
use evaloop_core::memory::MemoryStore;
use evaloop_memory::{FileStore, InMemoryStore};
use std::sync::Arc;

pub use save_memory::SaveMemory;
pub use search_internet::SearchInternet;
pub use search_memory::SearchMemory;
pub use write_file::WriteFile;

/// Open the memory store selected by `config.memory.backend`.
pub fn memory_from_config(config: &AppConfig) -> Result<Arc<dyn MemoryStore>, MemoryError> {
    match config.memory.backend.as_str() {
        "in_memory" => Ok(Arc::new(InMemoryStore::new())),
        "file" => Ok(Arc::new(FileStore::new(config.memory.resolved_path()))),
        other => Err(MemoryError::Storage(format!("unknown memory backend '{other}'"))),
    }
}

/// All built-in capabilities, wired to `memory` and configured from `config`.
pub fn default_capabilities(
    config: &AppConfig,
    memory: Arc<dyn MemoryStore>,
) -> Vec<Arc<dyn Capability>> {
    vec![
        Arc::new(SaveMemory::new(memory.clone())),
        Arc::new(SearchMemory::new(memory, config.memory.search_limit)),
        Arc::new(SearchInternet::new(&config.capabilities.search_url)),
        Arc::new(WriteFile::new(config.capabilities.resolved_workspace())),
    ]
}

/// Fetch a required string argument.
pub(crate) fn required_str<'a>(
    action: &str,
    args: &'a serde_json::Value,
    key: &str,
) -> Result<&'a str, evaloop_core::CapabilityError> {
    args[key]
        .as_str()
        .ok_or_else(|| evaloop_core::CapabilityError::InvalidArguments {
            action: action.to_string(),
            reason: format!("Missing '{key}' argument"),
        })
}

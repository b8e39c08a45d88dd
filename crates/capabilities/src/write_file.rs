//! `write_file`: write content to a file inside the workspace.
//!
//! Paths are relative to the workspace root; absolute paths and `..`
//! components are rejected. An existing file is appended to.

use async_trait::async_trait;
use evaloop_core::capability::{Capability, CapabilityContext};
use evaloop_core::error::CapabilityError;
use evaloop_core::plan::ActionOutput;
use std::path::{Component, Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::info;

pub struct WriteFile {
    root: PathBuf,
}

impl WriteFile {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Resolve `filename` under the workspace root.
    fn resolve(&self, filename: &str) -> Result<PathBuf, CapabilityError> {
        let denied = |reason: &str| CapabilityError::PermissionDenied {
            action: "write_file".into(),
            reason: format!("{reason}: {filename}"),
        };

        let relative = Path::new(filename);
        if filename.trim().is_empty() {
            return Err(denied("empty file name"));
        }
        for component in relative.components() {
            match component {
                Component::Normal(_) | Component::CurDir => {}
                Component::ParentDir => return Err(denied("path traversal")),
                Component::RootDir | Component::Prefix(_) => {
                    return Err(denied("absolute paths are not allowed"));
                }
            }
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl Capability for WriteFile {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "The assistant replies with the action \"write_file\", the filename and content to save for writing a file to disk permanently. This can be used to store the result of complex actions locally."
    }

    fn parameters(&self) -> Option<serde_json::Value> {
        Some(serde_json::json!({
            "type": "object",
            "properties": {
                "filename": {
                    "type": "string",
                    "description": "name of the file, relative to the workspace"
                },
                "content": {
                    "type": "string",
                    "description": "content to write"
                }
            },
            "required": ["filename", "content"]
        }))
    }

    async fn invoke(
        &self,
        args: &serde_json::Value,
        _ctx: &dyn CapabilityContext,
    ) -> Result<ActionOutput, CapabilityError> {
        let filename = crate::required_str(self.name(), args, "filename")?;
        let content = crate::required_str(self.name(), args, "content")?;
        let path = self.resolve(filename)?;

        let failed = |e: std::io::Error| CapabilityError::ExecutionFailed {
            action: "write_file".into(),
            reason: e.to_string(),
        };

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(failed)?;
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(failed)?;
        file.write_all(content.as_bytes()).await.map_err(failed)?;
        file.flush().await.map_err(failed)?;

        info!(path = %path.display(), bytes = content.len(), "File written");
        Ok(ActionOutput::Text(format!("File {filename} saved successfully.")))
    }
}

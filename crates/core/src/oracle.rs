//! Oracle trait: the reasoning service the engine consults.
//!
//! Two primitives: a constrained function call (the oracle must emit a call
//! to a named function) and a free-text completion. Implementations may fail
//! or time out at any point; callers treat every error as recoverable.

use async_trait::async_trait;
use crate::error::ProviderError;
use crate::message::{FunctionCall, Message};
use crate::provider::FunctionSchema;

#[async_trait]
pub trait Oracle: Send + Sync {
    /// Ask for a call to `forced`, offering `functions` as signatures.
    ///
    /// `Ok(None)` means the oracle answered but produced no usable call.
    async fn call_function(
        &self,
        messages: &[Message],
        functions: &[FunctionSchema],
        forced: &str,
    ) -> std::result::Result<Option<FunctionCall>, ProviderError>;

    /// Plain text completion over `messages`.
    async fn complete(&self, messages: &[Message]) -> std::result::Result<String, ProviderError>;
}

/// Parse a call's argument string as a JSON object.
///
/// Oracles sometimes return an empty string for "no arguments".
pub fn parse_arguments(call: &FunctionCall) -> std::result::Result<serde_json::Value, serde_json::Error> {
    if call.arguments.trim().is_empty() {
        return Ok(serde_json::json!({}));
    }
    serde_json::from_str(&call.arguments)
}

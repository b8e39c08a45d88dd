//! Free-text analysis over a message list.
//!
//! Observation, critique, summarization and the final synthesis are all the
//! same primitive: digest the messages, frame them, ask for a completion.

use evaloop_core::error::ProviderError;
use evaloop_core::message::Message;
use evaloop_core::oracle::Oracle;

use crate::digest::digest;

pub const OBSERVE_PREFIX: &str = "Analyze the following text highlighting the relevant information and identify a list of actions to take if there are any. If there are errors, suggest solutions to fix them";

const SUMMARIZE_PREFIX: &str = "Summarize the following text, keeping the relevant information";

pub const SYNTHESIZE_SUFFIX: &str = "Return an appropriate answer given the context above\n";

/// Wrap `text` under `prefix` in a fenced block, then append `suffix`.
pub fn frame(text: &str, prefix: Option<&str>, suffix: &str) -> String {
    match prefix {
        Some(prefix) => format!("{prefix}:\n\n```\n{text}\n```\n{suffix}"),
        None => format!("{text}{suffix}"),
    }
}

/// Complete over the framed digest of `messages`.
pub async fn analyze(
    oracle: &dyn Oracle,
    messages: &[Message],
    prefix: Option<&str>,
    suffix: &str,
) -> Result<String, ProviderError> {
    let content = frame(&digest(messages), prefix, suffix);
    oracle.complete(&[Message::user(content)]).await
}

/// Condense `text`. An empty completion counts as a failure.
pub async fn summarize(oracle: &dyn Oracle, text: &str) -> Result<String, ProviderError> {
    let content = frame(text, Some(SUMMARIZE_PREFIX), "");
    let summary = oracle.complete(&[Message::user(content)]).await?;
    if summary.trim().is_empty() {
        return Err(ProviderError::Malformed("empty summary".into()));
    }
    Ok(summary)
}

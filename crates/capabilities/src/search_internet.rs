//! `search_internet`: DuckDuckGo Instant Answer lookup.
//!
//! Uses the keyless JSON endpoint: the abstract (when present) plus the first
//! related topics, one `url: title snippet` line each.

use async_trait::async_trait;
use evaloop_core::capability::{Capability, CapabilityContext};
use evaloop_core::error::CapabilityError;
use evaloop_core::plan::ActionOutput;
use std::time::Duration;
use tracing::{debug, warn};

const MAX_RESULTS: usize = 3;
const USER_AGENT: &str = concat!("evaloop/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    pub url: String,
    pub title: String,
    pub snippet: String,
}

pub struct SearchInternet {
    base_url: String,
    client: reqwest::Client,
}

impl SearchInternet {
    pub fn new(base_url: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    fn url_for(&self, query: &str) -> String {
        format!(
            "{}/?q={}&format=json&no_html=1&skip_disambig=1",
            self.base_url,
            urlencoding::encode(query)
        )
    }

    fn failed(&self, reason: String) -> CapabilityError {
        CapabilityError::ExecutionFailed {
            action: "search_internet".into(),
            reason,
        }
    }
}

/// Extract results from an Instant Answer response body.
pub fn parse_instant_answer(json: &serde_json::Value, limit: usize) -> Vec<SearchResult> {
    let mut results = Vec::new();

    if let Some(abstract_text) = json.get("AbstractText").and_then(|v| v.as_str())
        && !abstract_text.is_empty()
    {
        results.push(SearchResult {
            url: json
                .get("AbstractURL")
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string(),
            title: json
                .get("Heading")
                .and_then(|v| v.as_str())
                .unwrap_or("DuckDuckGo Result")
                .to_string(),
            snippet: abstract_text.to_string(),
        });
    }

    if let Some(topics) = json.get("RelatedTopics").and_then(|v| v.as_array()) {
        for topic in topics {
            if results.len() >= limit {
                break;
            }
            let text = topic.get("Text").and_then(|v| v.as_str());
            let url = topic.get("FirstURL").and_then(|v| v.as_str());
            if let (Some(text), Some(url)) = (text, url) {
                results.push(SearchResult {
                    url: url.to_string(),
                    title: text.chars().take(100).collect(),
                    snippet: text.to_string(),
                });
            }
        }
    }

    results.truncate(limit);
    results
}

fn render(results: &[SearchResult]) -> String {
    if results.is_empty() {
        return "No good DuckDuckGo Search Result was found".into();
    }
    results
        .iter()
        .map(|r| format!("{}: {} {}\n", r.url, r.title, r.snippet))
        .collect()
}

#[async_trait]
impl Capability for SearchInternet {
    fn name(&self) -> &str {
        "search_internet"
    }

    fn description(&self) -> &str {
        "For searching the internet with a query, the assistant replies with the action \"search_internet\" and the query to search."
    }

    fn parameters(&self) -> Option<serde_json::Value> {
        Some(serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The query to search on the internet"
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
        debug!(query, "Searching the internet");

        let response = self
            .client
            .get(self.url_for(query))
            .send()
            .await
            .map_err(|e| self.failed(e.to_string()))?;

        if !response.status().is_success() {
            warn!(status = %response.status(), "Search endpoint returned error");
            return Err(self.failed(format!("search returned status {}", response.status())));
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| self.failed(format!("unreadable search response: {e}")))?;

        Ok(ActionOutput::Text(render(&parse_instant_answer(&json, MAX_RESULTS))))
    }
}

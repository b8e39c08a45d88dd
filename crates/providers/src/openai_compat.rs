//! OpenAI-compatible provider implementation.
//!
//! Works with LocalAI, OpenAI, Ollama, vLLM, llama.cpp and any endpoint that
//! exposes `/chat/completions` with function calling.
//!
//! Requests use the `functions` / `function_call` fields so that a call can
//! be forced by name. Responses are accepted in either the `function_call`
//! or the `tool_calls` shape.

use async_trait::async_trait;
use evaloop_core::error::ProviderError;
use evaloop_core::message::{Message, Role};
use evaloop_core::provider::*;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// An OpenAI-compatible completion provider.
pub struct OpenAiCompatProvider {
    name: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    /// Create a new OpenAI-compatible provider.
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client,
        }
    }

    /// A LocalAI endpoint (convenience constructor).
    pub fn localai(base_url: Option<&str>) -> Self {
        Self::new("localai", base_url.unwrap_or("http://api:8080/v1"), "sk-local")
    }

    /// Create an OpenAI provider (convenience constructor).
    pub fn openai(api_key: impl Into<String>) -> Self {
        Self::new("openai", "https://api.openai.com/v1", api_key)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Convert our Message types to the API format.
    fn to_api_messages(messages: &[Message]) -> Vec<ApiMessage> {
        messages
            .iter()
            .map(|m| ApiMessage {
                role: match m.role {
                    Role::User => "user".into(),
                    Role::Assistant => "assistant".into(),
                    Role::System => "system".into(),
                    Role::Function => "function".into(),
                },
                content: if m.is_call_record() {
                    None
                } else {
                    Some(m.content.clone())
                },
                function_call: m.function_call.as_ref().map(|call| ApiFunction {
                    name: call.name.clone(),
                    arguments: call.arguments.clone(),
                }),
                tool_calls: None,
                name: m.name.clone(),
            })
            .collect()
    }

    fn to_api_functions(functions: &[FunctionSchema]) -> Vec<ApiFunctionDefinition> {
        functions
            .iter()
            .map(|f| ApiFunctionDefinition {
                name: f.name.clone(),
                description: f.description.clone(),
                parameters: f.parameters.clone(),
            })
            .collect()
    }

    /// The JSON body for a completion request.
    fn build_body(request: &ProviderRequest) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": request.model,
            "messages": Self::to_api_messages(&request.messages),
            "temperature": request.temperature,
            "stream": false,
        });

        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }

        if !request.functions.is_empty() {
            body["functions"] = serde_json::json!(Self::to_api_functions(&request.functions));
            body["function_call"] = match &request.function_choice {
                FunctionChoice::Auto => serde_json::json!("auto"),
                FunctionChoice::Named(name) => serde_json::json!({ "name": name }),
            };
        }

        body
    }

    /// Turn a decoded API response into a domain response.
    fn parse_response(api_response: ApiResponse) -> std::result::Result<ProviderResponse, ProviderError> {
        let choice = api_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::Malformed("No choices in response".into()))?;

        let call = choice.message.function_call.or_else(|| {
            choice
                .message
                .tool_calls
                .and_then(|calls| calls.into_iter().next())
                .map(|tc| tc.function)
        });

        let message = match call {
            Some(f) => Message::call_record(f.name, f.arguments),
            None => Message::assistant(choice.message.content.unwrap_or_default()),
        };

        let usage = api_response.usage.map(|u| Usage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        });

        Ok(ProviderResponse {
            message,
            usage,
            model: api_response.model.unwrap_or_default(),
        })
    }
}

#[async_trait]
impl evaloop_core::Provider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<ProviderResponse, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = Self::build_body(&request);

        debug!(
            provider = %self.name,
            model = %request.model,
            functions = request.functions.len(),
            "Sending completion request"
        );

        let mut builder = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body);
        if let Some(secs) = request.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                ProviderError::Timeout(request.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS))
            } else {
                ProviderError::Network(e.to_string())
            }
        })?;

        let status = response.status().as_u16();

        if status == 429 {
            return Err(ProviderError::RateLimited {
                retry_after_secs: 5,
            });
        }

        if status == 401 || status == 403 {
            return Err(ProviderError::AuthenticationFailed(
                "Invalid API key or insufficient permissions".into(),
            ));
        }

        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Provider returned error");
            return Err(ProviderError::ApiError {
                status_code: status,
                message: error_body,
            });
        }

        let api_response: ApiResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Malformed(format!("Failed to parse response: {e}")))?;

        Self::parse_response(api_response)
    }

    async fn list_models(&self) -> std::result::Result<Vec<String>, ProviderError> {
        let url = format!("{}/models", self.base_url);
        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Ok(Vec::new());
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let models = body["data"]
            .as_array()
            .map(|arr| {
                arr.iter()
                    .filter_map(|m| m["id"].as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default();

        Ok(models)
    }

    async fn health_check(&self) -> std::result::Result<bool, ProviderError> {
        let url = format!("{}/models", self.base_url);
        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        Ok(response.status().is_success())
    }
}

// --- OpenAI API types (internal) ---

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    function_call: Option<ApiFunction>,
    #[serde(default, skip_serializing)]
    tool_calls: Option<Vec<ApiToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolCall {
    function: ApiFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiFunctionDefinition {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    model: Option<String>,
    choices: Vec<ApiChoice>,
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiMessage,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use evaloop_core::Provider;

    fn intent_schema() -> FunctionSchema {
        FunctionSchema {
            name: "intent".into(),
            description: "Decide which action to take".into(),
            parameters: serde_json::json!({"type": "object"}),
        }
    }

    #[test]
    fn localai_constructor() {
        let provider = OpenAiCompatProvider::localai(None);
        assert_eq!(provider.name(), "localai");
        assert_eq!(provider.base_url(), "http://api:8080/v1");
    }

    #[test]
    fn trailing_slash_is_trimmed() {
        let provider = OpenAiCompatProvider::new("x", "http://localhost:8080/v1/", "");
        assert_eq!(provider.base_url(), "http://localhost:8080/v1");
    }

    #[test]
    fn message_conversion() {
        let messages = vec![
            Message::system("You are helpful"),
            Message::user("Hello"),
            Message::call_record("save_memory", r#"{"thought":"x"}"#),
            Message::function_result("save_memory", "saved"),
        ];
        let api = OpenAiCompatProvider::to_api_messages(&messages);
        assert_eq!(api[0].role, "system");
        assert_eq!(api[1].role, "user");
        assert_eq!(api[2].role, "assistant");
        assert!(api[2].content.is_none());
        assert_eq!(api[2].function_call.as_ref().unwrap().name, "save_memory");
        assert_eq!(api[3].role, "function");
        assert_eq!(api[3].name.as_deref(), Some("save_memory"));
    }

    #[test]
    fn forced_function_in_body() {
        let mut request = ProviderRequest::text("functions", vec![Message::user("hi")]);
        request.functions = vec![intent_schema()];
        request.function_choice = FunctionChoice::Named("intent".into());

        let body = OpenAiCompatProvider::build_body(&request);
        assert_eq!(body["function_call"], serde_json::json!({"name": "intent"}));
        assert_eq!(body["functions"][0]["name"], "intent");
        assert_eq!(body["stream"], false);
    }

    #[test]
    fn plain_request_has_no_functions() {
        let request = ProviderRequest::text("gpt-4", vec![Message::user("hi")]);
        let body = OpenAiCompatProvider::build_body(&request);
        assert!(body.get("functions").is_none());
        assert!(body.get("function_call").is_none());
    }

    #[test]
    fn parse_function_call_response() {
        let raw = r#"{
            "model": "functions",
            "choices": [{"message": {"role": "assistant", "content": null,
                "function_call": {"name": "intent", "arguments": "{\"action\":\"reply\"}"}}}]
        }"#;
        let parsed: ApiResponse = serde_json::from_str(raw).unwrap();
        let response = OpenAiCompatProvider::parse_response(parsed).unwrap();
        let call = response.message.function_call.unwrap();
        assert_eq!(call.name, "intent");
        assert!(call.arguments.contains("reply"));
    }

    #[test]
    fn parse_tool_calls_response() {
        let raw = r#"{
            "choices": [{"message": {"role": "assistant",
                "tool_calls": [{"id": "c1", "type": "function",
                    "function": {"name": "plan", "arguments": "{}"}}]}}]
        }"#;
        let parsed: ApiResponse = serde_json::from_str(raw).unwrap();
        let response = OpenAiCompatProvider::parse_response(parsed).unwrap();
        assert_eq!(response.message.function_call.unwrap().name, "plan");
    }

    #[test]
    fn missing_arguments_default_to_empty() {
        let raw = r#"{"choices": [{"message": {"role": "assistant",
            "function_call": {"name": "intent"}}}]}"#;
        let parsed: ApiResponse = serde_json::from_str(raw).unwrap();
        let response = OpenAiCompatProvider::parse_response(parsed).unwrap();
        assert_eq!(response.message.function_call.unwrap().arguments, "");
    }

    #[test]
    fn parse_text_response() {
        let raw = r#"{"model": "gpt-4", "choices": [{"message": {"role": "assistant", "content": "Hello!"}}],
            "usage": {"prompt_tokens": 3, "completion_tokens": 2, "total_tokens": 5}}"#;
        let parsed: ApiResponse = serde_json::from_str(raw).unwrap();
        let response = OpenAiCompatProvider::parse_response(parsed).unwrap();
        assert_eq!(response.message.content, "Hello!");
        assert_eq!(response.usage.unwrap().total_tokens, 5);
    }

    #[test]
    fn empty_choices_is_malformed() {
        let parsed: ApiResponse = serde_json::from_str(r#"{"choices": []}"#).unwrap();
        let err = OpenAiCompatProvider::parse_response(parsed).unwrap_err();
        assert!(matches!(err, ProviderError::Malformed(_)));
    }
}

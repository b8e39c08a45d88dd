//! `Oracle` implementation over a completion `Provider`.

use async_trait::async_trait;
use evaloop_config::AppConfig;
use evaloop_core::error::ProviderError;
use evaloop_core::message::{FunctionCall, Message};
use evaloop_core::oracle::Oracle;
use evaloop_core::provider::{
    FunctionChoice, FunctionSchema, Provider, ProviderRequest, ProviderResponse,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Sends constrained calls to a function-calling model and free text to a
/// chat model, both through the same provider.
pub struct ProviderOracle {
    provider: Arc<dyn Provider>,
    functions_model: String,
    llm_model: String,
    temperature: f32,
    timeout: Duration,
}

impl ProviderOracle {
    pub fn new(provider: Arc<dyn Provider>) -> Self {
        Self {
            provider,
            functions_model: "functions".into(),
            llm_model: "gpt-4".into(),
            temperature: 0.1,
            timeout: Duration::from_secs(1200),
        }
    }

    /// Models, temperature and timeout from configuration.
    pub fn from_config(provider: Arc<dyn Provider>, config: &AppConfig) -> Self {
        Self::new(provider)
            .with_models(&config.functions_model, &config.llm_model)
            .with_temperature(config.temperature)
            .with_timeout(Duration::from_secs(config.request_timeout_secs))
    }

    pub fn with_models(mut self, functions_model: &str, llm_model: &str) -> Self {
        self.functions_model = functions_model.to_string();
        self.llm_model = llm_model.to_string();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn request(&self, model: &str, messages: &[Message]) -> ProviderRequest {
        let mut request = ProviderRequest::text(model, messages.to_vec());
        request.temperature = self.temperature;
        request.timeout_secs = Some(self.timeout.as_secs());
        request
    }

    async fn send(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        debug!(
            provider = self.provider.name(),
            model = %request.model,
            messages = request.messages.len(),
            "Oracle request"
        );
        tokio::time::timeout(self.timeout, self.provider.complete(request))
            .await
            .map_err(|_| ProviderError::Timeout(self.timeout.as_secs()))?
    }
}

#[async_trait]
impl Oracle for ProviderOracle {
    async fn call_function(
        &self,
        messages: &[Message],
        functions: &[FunctionSchema],
        forced: &str,
    ) -> Result<Option<FunctionCall>, ProviderError> {
        let mut request = self.request(&self.functions_model, messages);
        request.functions = functions.to_vec();
        request.function_choice = FunctionChoice::Named(forced.to_string());

        let response = self.send(request).await?;
        let call = response
            .message
            .function_call
            .filter(|call| !call.name.is_empty() && !call.arguments.trim().is_empty());
        if let Some(call) = &call {
            debug!(function = %call.name, arguments = %call.arguments, "Oracle call");
        }
        Ok(call)
    }

    async fn complete(&self, messages: &[Message]) -> Result<String, ProviderError> {
        let request = self.request(&self.llm_model, messages);
        let response = self.send(request).await?;
        Ok(response.message.content)
    }
}

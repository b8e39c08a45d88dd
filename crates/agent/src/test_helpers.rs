//! Scripted collaborators for engine tests.

use async_trait::async_trait;
use evaloop_core::capability::{Capability, CapabilityContext, CapabilityRegistry};
use evaloop_core::error::{CapabilityError, ProviderError};
use evaloop_core::message::{FunctionCall, Message};
use evaloop_core::oracle::Oracle;
use evaloop_core::plan::ActionOutput;
use evaloop_core::provider::{
    FunctionSchema, Provider, ProviderRequest, ProviderResponse, Usage,
};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

/// One scripted oracle answer.
#[derive(Debug, Clone)]
pub enum Step {
    /// A call to the forced function with these arguments
    Call(Value),
    /// A call naming some other function
    CallNamed(String, Value),
    NoCall,
    Text(String),
    Fail,
}

/// A request the oracle saw: the forced function (`None` for text) and the
/// messages it was given.
#[derive(Debug, Clone)]
pub struct Recorded {
    pub forced: Option<String>,
    pub functions: Vec<FunctionSchema>,
    pub messages: Vec<Message>,
}

impl Recorded {
    /// All message contents joined, for substring assertions.
    pub fn text(&self) -> String {
        self.messages
            .iter()
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// An oracle answering from per-function queues plus one text queue.
///
/// Panics when a queue runs dry so a test notices unexpected calls.
#[derive(Default)]
pub struct ScriptedOracle {
    calls: Mutex<HashMap<String, VecDeque<Step>>>,
    texts: Mutex<VecDeque<Step>>,
    requests: Mutex<Vec<Recorded>>,
}

impl ScriptedOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn call(self, forced: &str, args: Value) -> Self {
        self.push_call(forced, Step::Call(args))
    }

    pub fn call_named(self, forced: &str, name: &str, args: Value) -> Self {
        self.push_call(forced, Step::CallNamed(name.into(), args))
    }

    pub fn no_call(self, forced: &str) -> Self {
        self.push_call(forced, Step::NoCall)
    }

    pub fn fail_call(self, forced: &str) -> Self {
        self.push_call(forced, Step::Fail)
    }

    pub fn text(self, text: &str) -> Self {
        self.texts.lock().unwrap().push_back(Step::Text(text.into()));
        self
    }

    pub fn fail_text(self) -> Self {
        self.texts.lock().unwrap().push_back(Step::Fail);
        self
    }

    /// Shortcut for an `intent` call choosing `action`.
    pub fn intent(self, action: &str, reasoning: &str) -> Self {
        self.call(
            "intent",
            serde_json::json!({"action": action, "detailed_reasoning": reasoning, "confidence": 90}),
        )
    }

    fn push_call(self, forced: &str, step: Step) -> Self {
        self.calls
            .lock()
            .unwrap()
            .entry(forced.to_string())
            .or_default()
            .push_back(step);
        self
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }

    /// Requests that forced `name`, in order.
    pub fn requests_for(&self, name: &str) -> Vec<Recorded> {
        self.requests()
            .into_iter()
            .filter(|r| r.forced.as_deref() == Some(name))
            .collect()
    }

    /// Plain completion requests, in order.
    pub fn text_requests(&self) -> Vec<Recorded> {
        self.requests().into_iter().filter(|r| r.forced.is_none()).collect()
    }

    fn record(&self, forced: Option<&str>, functions: &[FunctionSchema], messages: &[Message]) {
        self.requests.lock().unwrap().push(Recorded {
            forced: forced.map(str::to_string),
            functions: functions.to_vec(),
            messages: messages.to_vec(),
        });
    }
}

#[async_trait]
impl Oracle for ScriptedOracle {
    async fn call_function(
        &self,
        messages: &[Message],
        functions: &[FunctionSchema],
        forced: &str,
    ) -> Result<Option<FunctionCall>, ProviderError> {
        self.record(Some(forced), functions, messages);
        let step = self
            .calls
            .lock()
            .unwrap()
            .get_mut(forced)
            .and_then(|q| q.pop_front())
            .unwrap_or_else(|| panic!("ScriptedOracle: no scripted call left for '{forced}'"));
        match step {
            Step::Call(args) => Ok(Some(FunctionCall {
                name: forced.to_string(),
                arguments: args.to_string(),
            })),
            Step::CallNamed(name, args) => Ok(Some(FunctionCall {
                name,
                arguments: args.to_string(),
            })),
            Step::NoCall => Ok(None),
            Step::Fail => Err(ProviderError::Network("scripted failure".into())),
            Step::Text(_) => panic!("ScriptedOracle: text step queued for '{forced}'"),
        }
    }

    async fn complete(&self, messages: &[Message]) -> Result<String, ProviderError> {
        self.record(None, &[], messages);
        let step = self
            .texts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| panic!("ScriptedOracle: no scripted completion left"));
        match step {
            Step::Text(text) => Ok(text),
            Step::Fail => Err(ProviderError::Timeout(1)),
            other => panic!("ScriptedOracle: unexpected completion step {other:?}"),
        }
    }
}

/// A provider that returns queued responses and keeps every request.
pub struct ScriptedProvider {
    responses: Mutex<VecDeque<Result<ProviderResponse, ProviderError>>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedProvider {
    pub fn new(responses: Vec<Result<ProviderResponse, ProviderError>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        self.requests.lock().unwrap().push(request);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| panic!("ScriptedProvider: no more responses"))
    }
}

pub fn text_response(text: &str) -> ProviderResponse {
    response(Message::assistant(text))
}

pub fn call_response(name: &str, arguments: &str) -> ProviderResponse {
    response(Message::call_record(name, arguments))
}

fn response(message: Message) -> ProviderResponse {
    ProviderResponse {
        message,
        usage: Some(Usage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        }),
        model: "scripted".into(),
    }
}

/// A capability with a canned result that remembers its invocations.
pub struct StubCapability {
    name: String,
    plannable: bool,
    result: Result<String, String>,
    invocations: Mutex<Vec<Value>>,
}

impl StubCapability {
    pub fn ok(name: &str, text: &str) -> Self {
        Self {
            name: name.into(),
            plannable: true,
            result: Ok(text.into()),
            invocations: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(name: &str, reason: &str) -> Self {
        Self {
            result: Err(reason.into()),
            ..Self::ok(name, "")
        }
    }

    pub fn not_plannable(mut self) -> Self {
        self.plannable = false;
        self
    }

    pub fn invocations(&self) -> Vec<Value> {
        self.invocations.lock().unwrap().clone()
    }
}

#[async_trait]
impl Capability for StubCapability {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "A stub capability for tests"
    }

    fn plannable(&self) -> bool {
        self.plannable
    }

    fn parameters(&self) -> Option<Value> {
        Some(serde_json::json!({
            "type": "object",
            "properties": { "query": { "type": "string" } },
            "required": ["query"]
        }))
    }

    async fn invoke(
        &self,
        args: &Value,
        _ctx: &dyn CapabilityContext,
    ) -> Result<ActionOutput, CapabilityError> {
        self.invocations.lock().unwrap().push(args.clone());
        match &self.result {
            Ok(text) => Ok(ActionOutput::Text(text.clone())),
            Err(reason) => Err(CapabilityError::ExecutionFailed {
                action: self.name.clone(),
                reason: reason.clone(),
            }),
        }
    }
}

pub fn registry_of(capabilities: Vec<Arc<StubCapability>>) -> Arc<CapabilityRegistry> {
    let registry = CapabilityRegistry::builder()
        .register_all(capabilities.into_iter().map(|c| c as Arc<dyn Capability>))
        .build()
        .unwrap();
    Arc::new(registry)
}

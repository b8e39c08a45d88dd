//! Action executor: one constrained oracle call, one capability invocation.

use chrono::Utc;
use evaloop_core::capability::{ActionKind, CapabilityContext};
use evaloop_core::error::CapabilityError;
use evaloop_core::event::DomainEvent;
use evaloop_core::message::Message;
use evaloop_core::oracle::parse_arguments;
use evaloop_core::plan::ActionOutput;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::context::EngineContext;
use crate::planner::Planner;
use crate::prompt;

/// The messages of one execution and what it produced.
///
/// `messages` opens with the description preamble and the prompt; a call
/// record and its function result follow when the action ran.
#[derive(Debug, Clone)]
pub struct Execution {
    pub action: String,
    pub messages: Vec<Message>,
    pub output: ActionOutput,
}

impl Execution {
    /// The messages without the description preamble.
    pub fn transcript(&self) -> &[Message] {
        self.messages.get(1..).unwrap_or_default()
    }
}

/// A capability that was called and refused or failed.
#[derive(Debug)]
pub struct ExecutionFailure {
    pub action: String,
    /// Preamble, prompt and call record
    pub messages: Vec<Message>,
    pub error: CapabilityError,
}

impl ExecutionFailure {
    /// Report the error as the function result and carry on.
    pub fn recover(self) -> Execution {
        let output = ActionOutput::Failed(self.error.to_string());
        let mut messages = self.messages;
        messages.push(Message::function_result(&self.action, output.to_string()));
        Execution {
            action: self.action,
            messages,
            output,
        }
    }
}

impl std::fmt::Display for ExecutionFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.action, self.error)
    }
}

impl std::error::Error for ExecutionFailure {}

pub struct ActionExecutor {
    ctx: EngineContext,
    planner: Planner,
}

impl ActionExecutor {
    pub fn new(ctx: EngineContext, planner: Planner) -> Self {
        Self { ctx, planner }
    }

    /// Have the oracle fill in the arguments for `action`, then run it.
    pub async fn execute(&self, prompt_text: &str, action: &str) -> Result<Execution, ExecutionFailure> {
        let registry = self.ctx.registry();
        let description = registry
            .get(action)
            .map(|a| prompt::describe([&a.descriptor]))
            .unwrap_or_default();
        let mut messages = vec![
            prompt::preamble(prompt::EXECUTE_HEADER, &description),
            prompt::function_call(prompt_text),
        ];
        let declined = |messages: Vec<Message>| Execution {
            action: action.to_string(),
            messages,
            output: ActionOutput::Declined,
        };

        let Some(registered) = registry.get(action) else {
            return Err(ExecutionFailure {
                action: action.to_string(),
                messages,
                error: CapabilityError::UnknownAction(action.to_string()),
            });
        };
        if matches!(registered.kind, ActionKind::Reply) {
            return Err(ExecutionFailure {
                action: action.to_string(),
                messages,
                error: CapabilityError::NotExecutable(action.to_string()),
            });
        }

        let call = match self
            .ctx
            .oracle()
            .call_function(&messages, &registry.schemas(), action)
            .await
        {
            Ok(Some(call)) if call.name == action => call,
            Ok(Some(call)) => {
                warn!(expected = action, got = %call.name, "Oracle called another function, declining");
                return Ok(declined(messages));
            }
            Ok(None) => {
                warn!(action, "Oracle produced no call, declining");
                return Ok(declined(messages));
            }
            Err(e) => {
                self.ctx.oracle_failed("execute", &e);
                return Ok(declined(messages));
            }
        };
        debug!(action, arguments = %call.arguments, "Executing");
        messages.push(Message::call_record(&call.name, &call.arguments));

        let failure = |messages: Vec<Message>, error: CapabilityError| ExecutionFailure {
            action: action.to_string(),
            messages,
            error,
        };
        let args = match parse_arguments(&call) {
            Ok(args) => args,
            Err(e) => {
                return Err(failure(
                    messages,
                    CapabilityError::InvalidArguments {
                        action: action.to_string(),
                        reason: e.to_string(),
                    },
                ));
            }
        };
        if let Err(e) = registry.validate_arguments(action, &args) {
            return Err(failure(messages, e));
        }

        let started = Instant::now();
        let result = match &registered.kind {
            ActionKind::Capability(capability) => capability.invoke(&args, &self.ctx).await,
            ActionKind::Plan => {
                let goal = args["description"].as_str().unwrap_or_default();
                Ok(ActionOutput::Plan(self.planner.plan(goal, &self.ctx).await))
            }
            ActionKind::Reply => Err(CapabilityError::NotExecutable(action.to_string())),
        };
        let duration_ms = started.elapsed().as_millis() as u64;
        self.ctx.publish(DomainEvent::CapabilityExecuted {
            action: action.to_string(),
            success: result.is_ok(),
            duration_ms,
            timestamp: Utc::now(),
        });

        match result {
            Ok(output) => {
                info!(action, duration_ms, "Action executed");
                messages.push(Message::function_result(action, output.to_string()));
                Ok(Execution {
                    action: action.to_string(),
                    messages,
                    output,
                })
            }
            Err(error) => Err(failure(messages, error)),
        }
    }
}

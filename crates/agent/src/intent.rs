//! Intent classification: which single action does this context call for?

use chrono::Utc;
use evaloop_core::capability::{CapabilityContext, REPLY_ACTION};
use evaloop_core::event::DomainEvent;
use evaloop_core::oracle::parse_arguments;
use evaloop_core::plan::Intent;
use evaloop_core::provider::FunctionSchema;
use tracing::{debug, info, warn};

use crate::context::EngineContext;
use crate::prompt;

pub const INTENT_FUNCTION: &str = "intent";

/// Asks the oracle to pick one of the allowed actions.
///
/// Never fails: every oracle problem resolves to [`Intent::reply`].
pub struct IntentClassifier {
    ctx: EngineContext,
}

impl IntentClassifier {
    pub fn new(ctx: EngineContext) -> Self {
        Self { ctx }
    }

    pub async fn classify(&self, context: &str, allowed: &[&str]) -> Intent {
        let intent = self.ask(context, allowed).await;
        info!(
            action = %intent.action,
            confidence = ?intent.confidence,
            "Intent classified"
        );
        self.ctx.publish(DomainEvent::IntentClassified {
            action: intent.action.clone(),
            confidence: intent.confidence,
            timestamp: Utc::now(),
        });
        intent
    }

    async fn ask(&self, context: &str, allowed: &[&str]) -> Intent {
        let registry = self.ctx.registry();
        let descriptions = prompt::describe(
            allowed
                .iter()
                .filter_map(|name| registry.get(name))
                .map(|action| &action.descriptor),
        );
        let messages = [
            prompt::preamble(prompt::CLASSIFY_HEADER, &descriptions),
            prompt::function_call(context),
        ];
        debug!(context, "Classifying intent");

        let call = match self
            .ctx
            .oracle()
            .call_function(&messages, &[intent_schema(allowed)], INTENT_FUNCTION)
            .await
        {
            Ok(Some(call)) => call,
            Ok(None) => {
                warn!("Oracle produced no intent, replying");
                return Intent::reply();
            }
            Err(e) => {
                self.ctx.oracle_failed("classify", &e);
                return Intent::reply();
            }
        };

        let args = match parse_arguments(&call) {
            Ok(args) => args,
            Err(e) => {
                warn!(error = %e, arguments = %call.arguments, "Unparseable intent, replying");
                return Intent::reply();
            }
        };
        parse_intent(&args, allowed).unwrap_or_else(Intent::reply)
    }
}

/// The forced `intent` signature, its action enum restricted to `allowed`.
pub fn intent_schema(allowed: &[&str]) -> FunctionSchema {
    FunctionSchema {
        name: INTENT_FUNCTION.into(),
        description: "Decide to do an action.".into(),
        parameters: serde_json::json!({
            "type": "object",
            "properties": {
                "confidence": {
                    "type": "number",
                    "description": "confidence of the action"
                },
                "detailed_reasoning": {
                    "type": "string",
                    "description": "reasoning behind the intent"
                },
                "action": {
                    "type": "string",
                    "enum": allowed,
                    "description": "user intent"
                }
            },
            "required": ["action"]
        }),
    }
}

fn parse_intent(args: &serde_json::Value, allowed: &[&str]) -> Option<Intent> {
    let action = args["action"].as_str()?;
    if !allowed.contains(&action) {
        warn!(action, "Intent outside the allowed actions, replying");
        return None;
    }
    if action == REPLY_ACTION {
        return Some(Intent::reply());
    }
    let reasoning = args["detailed_reasoning"].as_str().unwrap_or_default();
    let intent = Intent::new(action, reasoning);
    Some(match args["confidence"].as_f64() {
        Some(confidence) => intent.with_confidence(confidence),
        None => intent,
    })
}

//! The evaluate loop.
//!
//! One call to [`Orchestrator::evaluate`] turns a user utterance into exactly
//! one assistant message:
//!
//! 1. Classify the request against the registered actions
//! 2. `reply` answers directly from the conversation history
//! 3. Anything else runs an action round: execute, optionally critique, and
//!    expand a plan into its subtasks
//! 4. Optionally re-evaluate the results, running more rounds until the
//!    classifier is satisfied or the round limit is hit
//! 5. Synthesize an answer from everything the rounds produced
//!
//! Tool traffic never reaches the caller's history; it lives in a response
//! list local to the pass.

use async_trait::async_trait;
use chrono::Utc;
use evaloop_config::{CriticMode, OrchestratorConfig};
use evaloop_core::capability::{CapabilityContext, CapabilityRegistry};
use evaloop_core::error::CapabilityError;
use evaloop_core::event::{DomainEvent, EventBus};
use evaloop_core::message::{Conversation, Message, Role};
use evaloop_core::oracle::Oracle;
use evaloop_core::plan::{ActionOutput, Intent, Plan};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, warn};

use crate::analysis::{self, OBSERVE_PREFIX, SYNTHESIZE_SUFFIX};
use crate::context::EngineContext;
use crate::critic::{Critic, CriticFocus};
use crate::digest::digest;
use crate::executor::{ActionExecutor, Execution};
use crate::intent::IntentClassifier;
use crate::planner::Planner;

/// Last resort when neither synthesis nor the responses give an answer.
pub const APOLOGY: &str = "I'm sorry, I could not come up with an answer this time.";

/// What a top-level evaluate pass did.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluateOutcome {
    /// The assistant message appended to the history
    pub reply: String,
    /// The action chosen for the request
    pub action: String,
    /// Re-evaluation rounds run
    pub rounds: usize,
    /// Subtasks executed across all plans
    pub subtasks: usize,
}

/// Notified with the final reply of every top-level pass (speech output,
/// avatars, chat bridges).
#[async_trait]
pub trait ReplyHook: Send + Sync {
    fn name(&self) -> &str;

    async fn on_reply(&self, reply: &str) -> evaloop_core::Result<()>;
}

pub struct Orchestrator {
    ctx: EngineContext,
    config: OrchestratorConfig,
    classifier: IntentClassifier,
    executor: ActionExecutor,
    critic: Critic,
    hooks: Vec<Arc<dyn ReplyHook>>,
    processed_messages: AtomicU64,
}

impl Orchestrator {
    pub fn new(oracle: Arc<dyn Oracle>, registry: Arc<CapabilityRegistry>) -> Self {
        Self::assemble(
            EngineContext::new(oracle, registry),
            OrchestratorConfig::default(),
            Vec::new(),
            AtomicU64::new(0),
        )
    }

    fn assemble(
        ctx: EngineContext,
        config: OrchestratorConfig,
        hooks: Vec<Arc<dyn ReplyHook>>,
        processed_messages: AtomicU64,
    ) -> Self {
        let planner = Planner::new().with_instruction(config.plan_message());
        Self {
            classifier: IntentClassifier::new(ctx.clone()),
            executor: ActionExecutor::new(ctx.clone(), planner),
            critic: Critic::new(ctx.clone()),
            ctx,
            config,
            hooks,
            processed_messages,
        }
    }

    fn rebuild(self, ctx: EngineContext, config: OrchestratorConfig) -> Self {
        let Self { hooks, processed_messages, .. } = self;
        Self::assemble(ctx, config, hooks, processed_messages)
    }

    pub fn with_config(self, config: OrchestratorConfig) -> Self {
        if let Some(forced) = config.force_action()
            && !self.ctx.registry().contains(forced)
        {
            warn!(action = forced, "Ignoring unknown forced action");
        }
        let ctx = self.ctx.clone();
        self.rebuild(ctx, config)
    }

    /// Publish domain events on `events` instead of a private bus.
    pub fn with_event_bus(self, events: Arc<EventBus>) -> Self {
        let ctx = self.ctx.clone().with_event_bus(events);
        let config = self.config.clone();
        self.rebuild(ctx, config)
    }

    pub fn with_reply_hook(mut self, hook: Arc<dyn ReplyHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        self.ctx.events()
    }

    /// Completed top-level passes so far.
    pub fn processed_messages(&self) -> u64 {
        self.processed_messages.load(Ordering::SeqCst)
    }

    /// Answer `utterance`, appending it and the reply to `history`.
    pub async fn evaluate(&self, utterance: &str, history: &mut Conversation) -> EvaluateOutcome {
        history.push(Message::user(utterance));
        let outcome = self.pass(utterance, history).await;
        history.push(Message::assistant(&outcome.reply));
        self.processed_messages.fetch_add(1, Ordering::SeqCst);

        for hook in &self.hooks {
            if let Err(e) = hook.on_reply(&outcome.reply).await {
                warn!(hook = hook.name(), error = %e, "Reply hook failed");
            }
        }
        outcome
    }

    async fn pass(&self, utterance: &str, history: &Conversation) -> EvaluateOutcome {
        let allowed = self.allowed_actions();
        let intent = self
            .classifier
            .classify(&format!("Request: {utterance}"), &allowed)
            .await;

        if intent.is_reply() {
            let reply = self.direct_reply(history).await;
            self.ctx.publish(DomainEvent::ReplySynthesized {
                direct: true,
                timestamp: Utc::now(),
            });
            return EvaluateOutcome {
                reply,
                action: intent.action,
                rounds: 0,
                subtasks: 0,
            };
        }

        let prefix = (self.processed_messages() > 0).then(|| digest(history.messages()));
        let mut responses = Vec::new();
        let mut round_start = 0;
        let mut subtasks = self
            .action_round(utterance, &intent, prefix.as_deref(), &mut responses)
            .await;

        let mut rounds = 0;
        if self.config.re_evaluate {
            loop {
                if rounds >= self.config.max_rounds {
                    warn!(max_rounds = self.config.max_rounds, "Re-evaluation limit reached");
                    break;
                }
                rounds += 1;

                // Only what the latest action round produced
                let mut review = digest(&responses[round_start..]);
                if self.config.postprocess {
                    review = self.ctx.post_process(&review).await;
                }
                responses.push(Message::user(&review));
                let observation = self.observe(&responses).await;
                let context = format!(
                    "Decide from the output below if we have to do another action:\n```\n{review}\n```\n\nObservation: {observation}"
                );

                let next = self.classifier.classify(&context, &allowed).await;
                info!(round = rounds, action = %next.action, "Re-evaluation round");
                self.ctx.publish(DomainEvent::ReEvaluationRound {
                    round: rounds,
                    action: next.action.clone(),
                    timestamp: Utc::now(),
                });
                if next.is_reply() {
                    break;
                }
                round_start = responses.len();
                subtasks += self.action_round(&review, &next, None, &mut responses).await;
            }
        }

        let reply = self.synthesize(&responses).await;
        self.ctx.publish(DomainEvent::ReplySynthesized {
            direct: false,
            timestamp: Utc::now(),
        });
        EvaluateOutcome {
            reply,
            action: intent.action,
            rounds,
            subtasks,
        }
    }

    /// The forced action alone when it is registered, otherwise everything.
    fn allowed_actions(&self) -> Vec<&str> {
        let registry = self.ctx.registry();
        match self.config.force_action() {
            Some(forced) if registry.contains(forced) => vec![forced],
            _ => registry.names(),
        }
    }

    /// Execute `intent`, let the critic revise it, expand a plan.
    ///
    /// Returns the number of subtasks run.
    async fn action_round(
        &self,
        utterance: &str,
        intent: &Intent,
        history_digest: Option<&str>,
        responses: &mut Vec<Message>,
    ) -> usize {
        let mut prompt_text = String::new();
        if let Some(history_digest) = history_digest {
            prompt_text.push_str(history_digest);
            prompt_text.push('\n');
        }
        prompt_text.push_str(&format!("Request: {utterance}\nReasoning: {}", intent.reasoning));

        let execution = self.run(&prompt_text, &intent.action).await;
        let execution = self.review(&prompt_text, intent, execution).await;
        responses.extend_from_slice(execution.transcript());

        match execution.output.as_plan() {
            Some(plan) => self.run_plan(plan, utterance, intent, responses).await,
            None => 0,
        }
    }

    /// Execute, turning a failed capability into an error result.
    async fn run(&self, prompt_text: &str, action: &str) -> Execution {
        match self.executor.execute(prompt_text, action).await {
            Ok(execution) => execution,
            Err(failure) => {
                warn!(error = %failure, "Action failed");
                failure.recover()
            }
        }
    }

    /// One critic pass per the configured mode. A revision replaces the
    /// original execution.
    async fn review(&self, prompt_text: &str, intent: &Intent, execution: Execution) -> Execution {
        let is_plan = execution.output.as_plan().is_some();
        let focus = match (self.config.critic, is_plan) {
            (CriticMode::Off, _) => return execution,
            (_, true) => CriticFocus::Plan,
            (CriticMode::All, false) if !execution.output.is_declined() => CriticFocus::Result,
            _ => return execution,
        };
        let Some(critique) = self.critic.critique(execution.transcript(), focus).await else {
            return execution;
        };
        let revised_prompt = format!("{prompt_text}\n{critique}");

        match focus {
            CriticFocus::Plan => {
                info!(action = %intent.action, "Re-planning after critique");
                self.run(&revised_prompt, &intent.action).await
            }
            CriticFocus::Result => {
                let allowed = self.allowed_actions();
                let revised = self.classifier.classify(&critique, &allowed).await;
                if revised.is_reply() || revised.action == intent.action {
                    return execution;
                }
                info!(from = %intent.action, to = %revised.action, "Critic chose another action");
                self.run(&revised_prompt, &revised.action).await
            }
        }
    }

    /// Run every subtask in order. Failures are recorded, never fatal.
    async fn run_plan(
        &self,
        plan: &Plan,
        utterance: &str,
        intent: &Intent,
        responses: &mut Vec<Message>,
    ) -> usize {
        let registry = self.ctx.registry();
        let mut trace = String::new();
        let mut executed = 0;

        for (index, subtask) in plan.subtasks.iter().enumerate() {
            if !registry.is_plannable(&subtask.action) {
                warn!(index, action = %subtask.action, "Skipping subtask");
                let skipped =
                    ActionOutput::Failed(CapabilityError::NotPlannable(subtask.action.clone()).to_string());
                trace.push_str(&format!("{skipped}\n"));
                responses.push(Message::function_result(&subtask.action, skipped.to_string()));
                self.subtask_completed(index, &subtask.action, false);
                continue;
            }

            info!(index, action = %subtask.action, "Running subtask");
            let mut prompt_text = format!("Request: {utterance}\nReasoning: {}\n", intent.reasoning);
            if self.config.subtask_context && !trace.is_empty() {
                prompt_text.push_str(&format!("\nAdditional context: ```\n{trace}\n```\n"));
            }
            prompt_text.push_str(&format!("\nFunction to call:{}\n", subtask.action));
            let step = if self.config.postprocess {
                self.ctx.post_process(&subtask.reasoning).await
            } else {
                subtask.reasoning.clone()
            };
            prompt_text.push_str("Assistant: ");
            prompt_text.push_str(&step);

            let execution = self.run(&prompt_text, &subtask.action).await;
            executed += 1;
            trace.push_str(&format!("{}\n", execution.output));
            if let Some(last) = execution.messages.last() {
                responses.push(last.clone());
            }
            let success = !execution.output.is_failed() && !execution.output.is_declined();
            self.subtask_completed(index, &subtask.action, success);
        }
        executed
    }

    fn subtask_completed(&self, index: usize, action: &str, success: bool) {
        self.ctx.publish(DomainEvent::SubtaskCompleted {
            index,
            action: action.to_string(),
            success,
            timestamp: Utc::now(),
        });
    }

    async fn observe(&self, responses: &[Message]) -> String {
        match analysis::analyze(self.ctx.oracle(), responses, Some(OBSERVE_PREFIX), "").await {
            Ok(observation) => observation,
            Err(e) => {
                self.ctx.oracle_failed("observe", &e);
                String::new()
            }
        }
    }

    async fn synthesize(&self, responses: &[Message]) -> String {
        match analysis::analyze(self.ctx.oracle(), responses, None, SYNTHESIZE_SUFFIX).await {
            Ok(reply) if !reply.trim().is_empty() => reply,
            Ok(_) => {
                warn!("Empty synthesis, falling back to the last result");
                fallback_reply(responses)
            }
            Err(e) => {
                self.ctx.oracle_failed("synthesize", &e);
                fallback_reply(responses)
            }
        }
    }

    async fn direct_reply(&self, history: &Conversation) -> String {
        debug!(messages = history.len(), "Replying directly");
        match self.ctx.oracle().complete(history.messages()).await {
            Ok(reply) if !reply.trim().is_empty() => reply,
            Ok(_) => APOLOGY.to_string(),
            Err(e) => {
                self.ctx.oracle_failed("reply", &e);
                APOLOGY.to_string()
            }
        }
    }
}

/// The last non-empty function result or assistant text, else [`APOLOGY`].
fn fallback_reply(responses: &[Message]) -> String {
    responses
        .iter()
        .rev()
        .find(|m| {
            !m.content.trim().is_empty()
                && (m.role == Role::Function || (m.role == Role::Assistant && m.function_call.is_none()))
        })
        .map(|m| m.content.clone())
        .unwrap_or_else(|| APOLOGY.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{ScriptedOracle, StubCapability, registry_of};
    use evaloop_core::error::Error;
    use serde_json::json;
    use std::sync::Mutex;

    fn orchestrator(oracle: ScriptedOracle, caps: Vec<Arc<StubCapability>>) -> (Orchestrator, Arc<ScriptedOracle>) {
        let oracle = Arc::new(oracle);
        (Orchestrator::new(oracle.clone(), registry_of(caps)), oracle)
    }

    fn search() -> Arc<StubCapability> {
        Arc::new(StubCapability::ok("search_internet", "sunny in Rome"))
    }

    fn call_records(history: &Conversation) -> usize {
        history.messages().iter().filter(|m| m.is_call_record() || m.role == Role::Function).count()
    }

    #[tokio::test]
    async fn reply_answers_from_history() {
        let (orchestrator, oracle) = orchestrator(
            ScriptedOracle::new().intent("reply", "just chatting").text("Hello there!"),
            vec![search()],
        );
        let mut history = Conversation::new();

        let outcome = orchestrator.evaluate("hi", &mut history).await;
        assert_eq!(outcome.reply, "Hello there!");
        assert_eq!(outcome.action, "reply");
        assert_eq!(history.len(), 2);
        assert_eq!(history.last().unwrap().role, Role::Assistant);
        assert_eq!(call_records(&history), 0);

        let direct = &oracle.text_requests()[0];
        assert_eq!(direct.messages.len(), 1);
        assert_eq!(direct.messages[0].content, "hi");
    }

    #[tokio::test]
    async fn single_action_is_synthesized() {
        let search = search();
        let (orchestrator, oracle) = orchestrator(
            ScriptedOracle::new()
                .intent("search_internet", "needs fresh data")
                .call("search_internet", json!({"query": "weather Rome"}))
                .text("It is sunny in Rome."),
            vec![search.clone()],
        );
        let mut history = Conversation::new();

        let outcome = orchestrator.evaluate("weather in Rome?", &mut history).await;
        assert_eq!(outcome.reply, "It is sunny in Rome.");
        assert_eq!(outcome.subtasks, 0);
        assert_eq!(history.len(), 2);
        assert_eq!(call_records(&history), 0);
        assert_eq!(search.invocations().len(), 1);

        let prompt = &oracle.requests_for("search_internet")[0].messages[1].content;
        assert_eq!(prompt, "Request: weather in Rome?\nReasoning: needs fresh data\nFunction call: ");
        let synthesis = oracle.text_requests()[0].text();
        assert!(synthesis.contains("Function result: \nsunny in Rome\n"));
        assert!(synthesis.ends_with(SYNTHESIZE_SUFFIX));
        assert_eq!(orchestrator.processed_messages(), 1);
    }

    #[tokio::test]
    async fn failed_action_is_reported_and_synthesis_falls_back() {
        let (orchestrator, _) = orchestrator(
            ScriptedOracle::new()
                .intent("search_internet", "")
                .call("search_internet", json!({"query": "q"}))
                .fail_text(),
            vec![Arc::new(StubCapability::failing("search_internet", "network down"))],
        );
        let mut history = Conversation::new();

        let outcome = orchestrator.evaluate("look it up", &mut history).await;
        assert!(outcome.reply.starts_with("Error: "));
        assert!(outcome.reply.contains("network down"));
        assert_eq!(history.len(), 2);
    }

    #[tokio::test]
    async fn nothing_to_fall_back_on_apologizes() {
        let (orchestrator, _) = orchestrator(
            ScriptedOracle::new().fail_call("intent").fail_text(),
            vec![search()],
        );
        let mut history = Conversation::new();
        let outcome = orchestrator.evaluate("hi", &mut history).await;
        assert_eq!(outcome.reply, APOLOGY);
        assert_eq!(history.last().unwrap().content, APOLOGY);
    }

    #[tokio::test]
    async fn later_passes_carry_the_history_digest() {
        let (orchestrator, oracle) = orchestrator(
            ScriptedOracle::new()
                .intent("reply", "")
                .text("Nice to meet you, Ada.")
                .intent("search_internet", "")
                .call("search_internet", json!({"query": "Ada"}))
                .text("Found it."),
            vec![search()],
        );
        let mut history = Conversation::new();

        orchestrator.evaluate("my name is Ada", &mut history).await;
        orchestrator.evaluate("search my name", &mut history).await;
        assert_eq!(history.len(), 4);

        let prompt = &oracle.requests_for("search_internet")[0].messages[1].content;
        assert!(prompt.starts_with("my name is Ada\nAssistant message: Nice to meet you, Ada.\nsearch my name\n"));
        assert!(prompt.contains("\nRequest: search my name\n"));
    }

    #[tokio::test]
    async fn plan_subtasks_run_in_order_with_trace() {
        let first = Arc::new(StubCapability::ok("search_internet", "result-one"));
        let second = Arc::new(StubCapability::ok("save_memory", "result-two"));
        let third = Arc::new(StubCapability::ok("write_file", "result-three"));
        let (orchestrator, oracle) = orchestrator(
            ScriptedOracle::new()
                .intent("plan", "several steps")
                .call("plan", json!({"description": "three steps"}))
                .call("plan", json!({"subtasks": [
                    {"detailed_reasoning": "look", "function": "search_internet"},
                    {"detailed_reasoning": "keep", "function": "save_memory"},
                    {"detailed_reasoning": "write", "function": "write_file"}
                ]}))
                .call("search_internet", json!({"query": "a"}))
                .call("save_memory", json!({"query": "b"}))
                .call("write_file", json!({"query": "c"}))
                .text("All done."),
            vec![first, second, third],
        );
        let orchestrator = orchestrator.with_config(OrchestratorConfig {
            critic: CriticMode::Off,
            subtask_context: true,
            ..OrchestratorConfig::default()
        });
        let mut history = Conversation::new();

        let outcome = orchestrator.evaluate("do three things", &mut history).await;
        assert_eq!(outcome.subtasks, 3);
        assert_eq!(outcome.reply, "All done.");

        let second_prompt = oracle.requests_for("save_memory")[0].messages[1].content.clone();
        assert!(second_prompt.contains("Additional context: ```\nresult-one\n\n```"));
        assert!(second_prompt.contains("Function to call:save_memory\nAssistant: keep"));
        assert!(!second_prompt.contains("result-two"));

        let third_prompt = oracle.requests_for("write_file")[0].messages[1].content.clone();
        assert!(third_prompt.contains("result-one\nresult-two\n"));
        assert!(!third_prompt.contains("result-three"));
    }

    #[tokio::test]
    async fn critic_revision_replaces_the_plan() {
        let (orchestrator, oracle) = orchestrator(
            ScriptedOracle::new()
                .intent("plan", "")
                .call("plan", json!({"description": "one step"}))
                .call("plan", json!({"subtasks": [{"detailed_reasoning": "a", "function": "search_internet"}]}))
                .call("plan", json!({"description": "two steps"}))
                .call("plan", json!({"subtasks": [
                    {"detailed_reasoning": "a", "function": "search_internet"},
                    {"detailed_reasoning": "b", "function": "search_internet"}
                ]}))
                .call("search_internet", json!({"query": "a"}))
                .call("search_internet", json!({"query": "b"}))
                .text("Also search for b.")
                .text("Done."),
            vec![search()],
        );
        let mut history = Conversation::new();

        let outcome = orchestrator.evaluate("find a and b", &mut history).await;
        assert_eq!(outcome.subtasks, 2);
        let replanned = &oracle.requests_for("plan")[2].messages[1].content;
        assert!(replanned.contains("Also search for b."));
    }

    #[tokio::test]
    async fn critic_off_keeps_the_first_plan() {
        let (orchestrator, oracle) = orchestrator(
            ScriptedOracle::new()
                .intent("plan", "")
                .call("plan", json!({"description": "one step"}))
                .call("plan", json!({"subtasks": [{"detailed_reasoning": "a", "function": "search_internet"}]}))
                .call("search_internet", json!({"query": "a"}))
                .text("Done."),
            vec![search()],
        );
        let orchestrator = orchestrator.with_config(OrchestratorConfig {
            critic: CriticMode::Off,
            ..OrchestratorConfig::default()
        });
        let mut history = Conversation::new();

        let outcome = orchestrator.evaluate("find a", &mut history).await;
        assert_eq!(outcome.subtasks, 1);
        assert_eq!(oracle.text_requests().len(), 1);
    }

    #[tokio::test]
    async fn critic_all_can_switch_the_action() {
        let save = Arc::new(StubCapability::ok("save_memory", "saved"));
        let (orchestrator, oracle) = orchestrator(
            ScriptedOracle::new()
                .intent("search_internet", "")
                .call("search_internet", json!({"query": "x"}))
                .text("This should have been saved instead.")
                .intent("save_memory", "")
                .call("save_memory", json!({"query": "x"}))
                .text("Saved."),
            vec![search(), save.clone()],
        );
        let orchestrator = orchestrator.with_config(OrchestratorConfig {
            critic: CriticMode::All,
            ..OrchestratorConfig::default()
        });
        let mut history = Conversation::new();

        let outcome = orchestrator.evaluate("remember x", &mut history).await;
        assert_eq!(outcome.reply, "Saved.");
        assert_eq!(save.invocations().len(), 1);
        let synthesis = oracle.text_requests()[1].text();
        assert!(synthesis.contains("Function result: \nsaved\n"));
        assert!(!synthesis.contains("sunny in Rome"));
    }

    #[tokio::test]
    async fn forced_action_restricts_classification() {
        let (orchestrator, oracle) = orchestrator(
            ScriptedOracle::new().intent("reply", "").text("ok").intent("reply", "").text("ok"),
            vec![search(), Arc::new(StubCapability::ok("save_memory", "s"))],
        );
        let forced = orchestrator.with_config(OrchestratorConfig {
            force_action: "save_memory".into(),
            ..OrchestratorConfig::default()
        });
        forced.evaluate("hi", &mut Conversation::new()).await;
        let schema = &oracle.requests_for("intent")[0].functions[0];
        assert_eq!(schema.parameters["properties"]["action"]["enum"], json!(["save_memory"]));

        let unknown = forced.with_config(OrchestratorConfig {
            force_action: "teleport".into(),
            ..OrchestratorConfig::default()
        });
        unknown.evaluate("hi", &mut Conversation::new()).await;
        let schema = &oracle.requests_for("intent")[1].functions[0];
        assert_eq!(
            schema.parameters["properties"]["action"]["enum"],
            json!(["search_internet", "save_memory", "plan", "reply"])
        );
    }

    #[tokio::test]
    async fn re_evaluation_stops_on_reply() {
        let (orchestrator, oracle) = orchestrator(
            ScriptedOracle::new()
                .intent("search_internet", "")
                .call("search_internet", json!({"query": "x"}))
                .text("The search answered the question.")
                .intent("reply", "")
                .text("Sunny."),
            vec![search()],
        );
        let orchestrator = orchestrator.with_config(OrchestratorConfig {
            re_evaluate: true,
            ..OrchestratorConfig::default()
        });
        let mut history = Conversation::new();

        let outcome = orchestrator.evaluate("weather?", &mut history).await;
        assert_eq!(outcome.rounds, 1);
        assert_eq!(outcome.reply, "Sunny.");
        assert_eq!(history.len(), 2);

        let decide = &oracle.requests_for("intent")[1].messages[1].content;
        assert!(decide.starts_with("Decide from the output below if we have to do another action:\n```\n"));
        assert!(decide.contains("Observation: The search answered the question."));
    }

    #[tokio::test]
    async fn re_evaluation_is_bounded() {
        let mut oracle = ScriptedOracle::new()
            .intent("search_internet", "")
            .call("search_internet", json!({"query": "x"}));
        for _ in 0..2 {
            oracle = oracle
                .text("Keep searching.")
                .intent("search_internet", "again")
                .call("search_internet", json!({"query": "x"}));
        }
        let (orchestrator, oracle) = orchestrator(oracle.text("Gave up."), vec![search()]);
        let orchestrator = orchestrator.with_config(OrchestratorConfig {
            re_evaluate: true,
            max_rounds: 2,
            ..OrchestratorConfig::default()
        });
        let mut history = Conversation::new();

        let outcome = orchestrator.evaluate("weather?", &mut history).await;
        assert_eq!(outcome.rounds, 2);
        assert_eq!(oracle.requests_for("intent").len(), 3);
        assert_eq!(oracle.requests_for("search_internet").len(), 3);
        assert_eq!(history.len(), 2);

        // Later rounds use the digest of earlier ones as their request
        let third = &oracle.requests_for("search_internet")[2].messages[1].content;
        assert!(third.starts_with("Request: Request: Request: weather?"));
    }

    #[tokio::test]
    async fn re_evaluation_digests_only_the_latest_round() {
        let mut oracle = ScriptedOracle::new()
            .intent("search_internet", "")
            .call("search_internet", json!({"query": "first"}));
        for _ in 0..4 {
            oracle = oracle
                .text("More to do.")
                .intent("save_memory", "keep going")
                .call("save_memory", json!({"query": "later"}));
        }
        let first = Arc::new(StubCapability::ok("search_internet", "FIRST-RESULT"));
        let later = Arc::new(StubCapability::ok("save_memory", "later result"));
        let (orchestrator, oracle) = orchestrator(oracle.text("Done."), vec![first, later]);
        let orchestrator = orchestrator.with_config(OrchestratorConfig {
            re_evaluate: true,
            max_rounds: 4,
            ..OrchestratorConfig::default()
        });
        let mut history = Conversation::new();

        let outcome = orchestrator.evaluate("weather?", &mut history).await;
        assert_eq!(outcome.rounds, 4);

        let intents = oracle.requests_for("intent");
        assert_eq!(intents.len(), 5);
        for request in &intents[1..] {
            let decide = &request.messages[1].content;
            assert!(decide.matches("FIRST-RESULT").count() <= 1, "repeated result in: {decide}");
        }
        // One copy per later round, carried through each round's request
        let last = &intents[4].messages[1].content;
        assert_eq!(last.matches("later result").count(), 3);
    }

    struct RecordingHook {
        replies: Mutex<Vec<String>>,
        fail: bool,
    }

    #[async_trait]
    impl ReplyHook for RecordingHook {
        fn name(&self) -> &str {
            "recording"
        }

        async fn on_reply(&self, reply: &str) -> evaloop_core::Result<()> {
            self.replies.lock().unwrap().push(reply.to_string());
            if self.fail {
                return Err(Error::Internal("speaker unplugged".into()));
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn reply_hooks_fire_once_per_pass() {
        let hook = Arc::new(RecordingHook { replies: Mutex::new(Vec::new()), fail: true });
        let (orchestrator, _) = orchestrator(
            ScriptedOracle::new()
                .intent("plan", "")
                .call("plan", json!({"description": "d"}))
                .call("plan", json!({"subtasks": [
                    {"detailed_reasoning": "a", "function": "search_internet"},
                    {"detailed_reasoning": "b", "function": "search_internet"}
                ]}))
                .call("search_internet", json!({"query": "a"}))
                .call("search_internet", json!({"query": "b"}))
                .text(" ")
                .text("Both found."),
            vec![search()],
        );
        let orchestrator = orchestrator.with_reply_hook(hook.clone());
        let mut history = Conversation::new();

        let outcome = orchestrator.evaluate("find a and b", &mut history).await;
        assert_eq!(outcome.reply, "Both found.");
        assert_eq!(*hook.replies.lock().unwrap(), vec!["Both found.".to_string()]);
    }

    #[tokio::test]
    async fn events_trace_the_pass() {
        let bus = Arc::new(EventBus::new(64));
        let mut rx = bus.subscribe();
        let (orchestrator, _) = orchestrator(
            ScriptedOracle::new()
                .intent("search_internet", "")
                .call("search_internet", json!({"query": "x"}))
                .text("Sunny."),
            vec![search()],
        );
        let orchestrator = orchestrator.with_event_bus(bus);
        orchestrator.evaluate("weather?", &mut Conversation::new()).await;

        let mut kinds = Vec::new();
        while let Ok(event) = rx.try_recv() {
            kinds.push(match &*event {
                DomainEvent::IntentClassified { .. } => "intent",
                DomainEvent::CapabilityExecuted { success: true, .. } => "executed",
                DomainEvent::ReplySynthesized { direct: false, .. } => "synthesized",
                _ => "other",
            });
        }
        assert_eq!(kinds, vec!["intent", "executed", "synthesized"]);
    }

    #[test]
    fn fallback_prefers_the_latest_result() {
        let responses = vec![
            Message::function_result("a", "first"),
            Message::assistant("said something"),
            Message::call_record("b", "{}"),
            Message::function_result("b", ""),
            Message::user("Request: x"),
        ];
        assert_eq!(fallback_reply(&responses), "said something");
        assert_eq!(fallback_reply(&[]), APOLOGY);
    }
}

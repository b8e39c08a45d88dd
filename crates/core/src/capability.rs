//! Capability trait and the frozen action registry.
//!
//! Capabilities are what the engine can do beyond talking: save or search
//! memory, search the web, write files. Every capability is registered under
//! a unique name together with a description and a JSON Schema for its
//! arguments. The registry also always contains the two reserved actions,
//! `plan` (handled by the planner) and `reply` (no implementation).

use async_trait::async_trait;
use jsonschema::JSONSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use crate::error::{CapabilityError, RegistryError};
use crate::oracle::Oracle;
use crate::plan::ActionOutput;
use crate::provider::FunctionSchema;

pub const PLAN_ACTION: &str = "plan";
pub const REPLY_ACTION: &str = "reply";

const PLAN_DESCRIPTION: &str = "The assistant for solving complex tasks that involves calling more functions in sequence, replies with the action \"plan\".";
const REPLY_DESCRIPTION: &str = "For replying to the user, the assistant replies with the action \"reply\" and the reply to the user directly when there is nothing to do.";

/// What the engine exposes to a running capability.
#[async_trait]
pub trait CapabilityContext: Send + Sync {
    fn registry(&self) -> &CapabilityRegistry;

    fn oracle(&self) -> &dyn Oracle;

    /// Condense `text` through the oracle. Returns `text` unchanged on failure.
    async fn post_process(&self, text: &str) -> String;
}

/// The core Capability trait.
#[async_trait]
pub trait Capability: Send + Sync {
    /// Unique, case-sensitive action name (e.g., "save_memory").
    fn name(&self) -> &str;

    /// Natural-language description shown to the oracle.
    fn description(&self) -> &str;

    /// Whether the planner may use this action as a subtask.
    fn plannable(&self) -> bool {
        true
    }

    /// JSON Schema for the arguments, or `None` for "any object".
    fn parameters(&self) -> Option<serde_json::Value>;

    /// Run the capability with validated arguments.
    async fn invoke(
        &self,
        args: &serde_json::Value,
        ctx: &dyn CapabilityContext,
    ) -> std::result::Result<ActionOutput, CapabilityError>;
}

/// Static description of a registered action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityDescriptor {
    pub name: String,
    pub description: String,
    pub plannable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<serde_json::Value>,
}

impl CapabilityDescriptor {
    /// The signature offered to the oracle for this action.
    pub fn to_schema(&self) -> FunctionSchema {
        FunctionSchema {
            name: self.name.clone(),
            description: self.description.clone(),
            parameters: self
                .parameters
                .clone()
                .unwrap_or_else(|| serde_json::json!({"type": "object", "properties": {}})),
        }
    }
}

/// How a registered action is carried out.
#[derive(Clone)]
pub enum ActionKind {
    Capability(Arc<dyn Capability>),
    /// Dispatched to the planner
    Plan,
    /// No implementation; the orchestrator synthesizes a reply
    Reply,
}

#[derive(Clone)]
pub struct RegisteredAction {
    pub descriptor: CapabilityDescriptor,
    pub kind: ActionKind,
    validator: Option<Arc<JSONSchema>>,
}

impl RegisteredAction {
    fn new(descriptor: CapabilityDescriptor, kind: ActionKind) -> std::result::Result<Self, RegistryError> {
        let validator = match &descriptor.parameters {
            Some(schema) => {
                let compiled = JSONSchema::compile(schema).map_err(|e| RegistryError::InvalidSchema {
                    action: descriptor.name.clone(),
                    reason: e.to_string(),
                })?;
                Some(Arc::new(compiled))
            }
            None => None,
        };
        Ok(Self { descriptor, kind, validator })
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }
}

impl std::fmt::Debug for RegisteredAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self.kind {
            ActionKind::Capability(_) => "capability",
            ActionKind::Plan => "plan",
            ActionKind::Reply => "reply",
        };
        f.debug_struct("RegisteredAction")
            .field("name", &self.descriptor.name)
            .field("kind", &kind)
            .finish()
    }
}

/// Collects capabilities and freezes them into a [`CapabilityRegistry`].
///
/// The reserved `plan` and `reply` actions are inserted by `build()`;
/// callers cannot register them.
#[derive(Default)]
pub struct CapabilityRegistryBuilder {
    capabilities: Vec<Arc<dyn Capability>>,
}

impl CapabilityRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, capability: Arc<dyn Capability>) -> Self {
        self.capabilities.push(capability);
        self
    }

    pub fn register_all(mut self, capabilities: impl IntoIterator<Item = Arc<dyn Capability>>) -> Self {
        self.capabilities.extend(capabilities);
        self
    }

    pub fn build(self) -> std::result::Result<CapabilityRegistry, RegistryError> {
        let mut actions = Vec::with_capacity(self.capabilities.len() + 2);
        let mut index = HashMap::new();

        for capability in self.capabilities {
            let name = capability.name().to_string();
            if name == PLAN_ACTION || name == REPLY_ACTION {
                return Err(RegistryError::ReservedName(name));
            }
            if index.contains_key(&name) {
                return Err(RegistryError::Duplicate(name));
            }
            let descriptor = CapabilityDescriptor {
                name: name.clone(),
                description: capability.description().to_string(),
                plannable: capability.plannable(),
                parameters: capability.parameters(),
            };
            index.insert(name, actions.len());
            actions.push(RegisteredAction::new(descriptor, ActionKind::Capability(capability))?);
        }

        for reserved in reserved_actions() {
            index.insert(reserved.descriptor.name.clone(), actions.len());
            actions.push(reserved);
        }

        Ok(CapabilityRegistry { actions, index })
    }
}

fn reserved_actions() -> [RegisteredAction; 2] {
    let plan = CapabilityDescriptor {
        name: PLAN_ACTION.into(),
        description: PLAN_DESCRIPTION.into(),
        plannable: false,
        parameters: Some(serde_json::json!({
            "type": "object",
            "properties": {
                "description": {
                    "type": "string",
                    "description": "reasoning behind the planning"
                }
            },
            "required": ["description"]
        })),
    };
    let plan_validator = plan
        .parameters
        .as_ref()
        .and_then(|schema| JSONSchema::compile(schema).ok())
        .map(Arc::new);
    let reply = CapabilityDescriptor {
        name: REPLY_ACTION.into(),
        description: REPLY_DESCRIPTION.into(),
        plannable: false,
        parameters: None,
    };
    [
        RegisteredAction { descriptor: plan, kind: ActionKind::Plan, validator: plan_validator },
        RegisteredAction { descriptor: reply, kind: ActionKind::Reply, validator: None },
    ]
}

/// Immutable mapping from action name to registered action.
///
/// Iteration follows registration order, reserved actions last.
#[derive(Debug, Clone)]
pub struct CapabilityRegistry {
    actions: Vec<RegisteredAction>,
    index: HashMap<String, usize>,
}

impl CapabilityRegistry {
    pub fn builder() -> CapabilityRegistryBuilder {
        CapabilityRegistryBuilder::new()
    }

    pub fn get(&self, name: &str) -> Option<&RegisteredAction> {
        self.index.get(name).map(|&i| &self.actions[i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn actions(&self) -> impl Iterator<Item = &RegisteredAction> {
        self.actions.iter()
    }

    pub fn names(&self) -> Vec<&str> {
        self.actions.iter().map(|a| a.name()).collect()
    }

    /// Descriptors of every action the planner may schedule.
    pub fn plannable(&self) -> Vec<&CapabilityDescriptor> {
        self.actions
            .iter()
            .filter(|a| a.descriptor.plannable)
            .map(|a| &a.descriptor)
            .collect()
    }

    pub fn is_plannable(&self, name: &str) -> bool {
        self.get(name).is_some_and(|a| a.descriptor.plannable)
    }

    /// Function signatures for every callable action, in registry order.
    /// `reply` has no signature and is left out.
    pub fn schemas(&self) -> Vec<FunctionSchema> {
        self.actions
            .iter()
            .filter(|a| !matches!(a.kind, ActionKind::Reply))
            .map(|a| a.descriptor.to_schema())
            .collect()
    }

    /// Validate `args` against the named action's schema.
    pub fn validate_arguments(
        &self,
        name: &str,
        args: &serde_json::Value,
    ) -> std::result::Result<(), CapabilityError> {
        let action = self
            .get(name)
            .ok_or_else(|| CapabilityError::UnknownAction(name.to_string()))?;
        let Some(validator) = &action.validator else {
            return Ok(());
        };
        let violations: Vec<String> = match validator.validate(args) {
            Ok(()) => return Ok(()),
            Err(errors) => errors.map(|e| e.to_string()).collect(),
        };
        Err(CapabilityError::SchemaViolation {
            action: name.to_string(),
            violations,
        })
    }
}

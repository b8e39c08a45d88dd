//! Planner: decompose a goal into an ordered list of plannable subtasks.

use evaloop_core::capability::{CapabilityContext, CapabilityRegistry, PLAN_ACTION};
use evaloop_core::oracle::parse_arguments;
use evaloop_core::plan::{Plan, Subtask};
use evaloop_core::provider::FunctionSchema;
use tracing::{debug, info, warn};

use crate::prompt;

pub const DEFAULT_PLAN_MESSAGE: &str = "The assistant replies with a plan to answer the request with a list of subtasks with logical steps. The reasoning includes a self-contained, detailed and descriptive instruction to fullfill the task.";

/// Backs the reserved `plan` action.
#[derive(Debug, Clone)]
pub struct Planner {
    instruction: String,
}

impl Default for Planner {
    fn default() -> Self {
        Self {
            instruction: DEFAULT_PLAN_MESSAGE.into(),
        }
    }
}

impl Planner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the planning instruction. `None` keeps the current one.
    pub fn with_instruction(mut self, instruction: Option<&str>) -> Self {
        if let Some(instruction) = instruction {
            self.instruction = instruction.to_string();
        }
        self
    }

    pub fn instruction(&self) -> &str {
        &self.instruction
    }

    /// Ask the oracle for a plan towards `goal`.
    ///
    /// Returns an empty plan when nothing is plannable or the oracle fails.
    pub async fn plan(&self, goal: &str, ctx: &dyn CapabilityContext) -> Plan {
        let registry = ctx.registry();
        let plannable: Vec<&str> = registry.plannable().iter().map(|d| d.name.as_str()).collect();
        if plannable.is_empty() {
            debug!("No plannable capabilities, skipping planner");
            return Plan::default();
        }

        let descriptions = prompt::describe(registry.actions().map(|a| &a.descriptor));
        let content = format!(
            "{}\n{descriptions}\nRequest: {}\nThought: {goal}",
            prompt::PLAN_HEADER,
            self.instruction
        );
        let messages = [prompt::function_call(&content)];

        let call = match ctx
            .oracle()
            .call_function(&messages, &[plan_schema(&plannable)], PLAN_ACTION)
            .await
        {
            Ok(Some(call)) => call,
            Ok(None) => {
                warn!("Oracle produced no plan");
                return Plan::default();
            }
            Err(e) => {
                warn!(error = %e, "Planner oracle call failed");
                return Plan::default();
            }
        };

        let plan = match parse_arguments(&call) {
            Ok(args) => parse_plan(&args, registry),
            Err(e) => {
                warn!(error = %e, "Unparseable plan");
                Plan::default()
            }
        };
        info!(subtasks = plan.len(), "Plan ready");
        plan
    }
}

/// The structured plan signature; `function` may only name `plannable`.
pub fn plan_schema(plannable: &[&str]) -> FunctionSchema {
    FunctionSchema {
        name: PLAN_ACTION.into(),
        description: "Decide to do an action.".into(),
        parameters: serde_json::json!({
            "type": "object",
            "properties": {
                "subtasks": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "detailed_reasoning": {
                                "type": "string",
                                "description": "subtask list"
                            },
                            "function": {
                                "type": "string",
                                "enum": plannable
                            }
                        }
                    }
                }
            },
            "required": ["subtasks"]
        }),
    }
}

fn parse_plan(args: &serde_json::Value, registry: &CapabilityRegistry) -> Plan {
    let Some(items) = args["subtasks"].as_array() else {
        warn!("Plan without a subtask list");
        return Plan::default();
    };
    let subtasks = items
        .iter()
        .filter_map(|item| {
            let action = item["function"].as_str()?;
            if !registry.is_plannable(action) {
                warn!(action, "Dropping subtask with a non-plannable action");
                return None;
            }
            Some(Subtask {
                reasoning: item["detailed_reasoning"].as_str().unwrap_or_default().to_string(),
                action: action.to_string(),
            })
        })
        .collect();
    Plan::new(subtasks)
}

//! Intent, plan and action output types.

use serde::{Deserialize, Serialize};

/// The classifier's decision: which action to run next and why.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Intent {
    pub action: String,

    #[serde(default)]
    pub reasoning: String,

    /// 0..=100 when the oracle reported one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

impl Intent {
    pub fn new(action: impl Into<String>, reasoning: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            reasoning: reasoning.into(),
            confidence: None,
        }
    }

    /// The fallback decision used whenever classification fails.
    pub fn reply() -> Self {
        Self::new(crate::capability::REPLY_ACTION, "")
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence.clamp(0.0, 100.0));
        self
    }

    pub fn is_reply(&self) -> bool {
        self.action == crate::capability::REPLY_ACTION
    }
}

/// One step of a plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subtask {
    /// Self-contained instruction for this step
    pub reasoning: String,

    /// A plannable action name
    pub action: String,
}

/// An ordered decomposition of a goal. Empty means "not a plan".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub subtasks: Vec<Subtask>,
}

impl Plan {
    pub fn new(subtasks: Vec<Subtask>) -> Self {
        Self { subtasks }
    }

    pub fn is_empty(&self) -> bool {
        self.subtasks.is_empty()
    }

    pub fn len(&self) -> usize {
        self.subtasks.len()
    }
}

/// Tagged result of a single capability call.
///
/// The `Display` form is what lands in function messages and in the
/// subtask trace.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionOutput {
    Text(String),
    Json(serde_json::Value),
    Plan(Plan),
    /// The capability ran and failed; carries the error text
    Failed(String),
    /// The oracle produced no call, so nothing ran
    Declined,
}

impl ActionOutput {
    /// The plan carried by this output, if it is a non-empty one.
    pub fn as_plan(&self) -> Option<&Plan> {
        match self {
            Self::Plan(plan) if !plan.is_empty() => Some(plan),
            _ => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    pub fn is_declined(&self) -> bool {
        matches!(self, Self::Declined)
    }
}

impl std::fmt::Display for ActionOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text(text) => write!(f, "{text}"),
            Self::Json(value) => write!(f, "{value}"),
            Self::Plan(plan) => match serde_json::to_string(plan) {
                Ok(json) => write!(f, "{json}"),
                Err(_) => write!(f, "{plan:?}"),
            },
            Self::Failed(reason) => write!(f, "Error: {reason}"),
            Self::Declined => Ok(()),
        }
    }
}

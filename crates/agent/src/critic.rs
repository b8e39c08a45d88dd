//! Critic: a second opinion on a plan or an action result.

use evaloop_core::capability::CapabilityContext;
use evaloop_core::message::Message;
use tracing::{debug, warn};

use crate::analysis;
use crate::context::EngineContext;

const PLAN_REVIEW: &str = "Analyze if the plan is correct and satisfies the user request from the context above. Suggest a revised plan if necessary.\n";

const RESULT_REVIEW: &str = "Analyze if the action taken and its result satisfy the user request from the context above. Suggest a different action if necessary.\n";

/// What the critic is asked to review.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CriticFocus {
    Plan,
    Result,
}

impl CriticFocus {
    fn instruction(self) -> &'static str {
        match self {
            Self::Plan => PLAN_REVIEW,
            Self::Result => RESULT_REVIEW,
        }
    }
}

pub struct Critic {
    ctx: EngineContext,
}

impl Critic {
    pub fn new(ctx: EngineContext) -> Self {
        Self { ctx }
    }

    /// Review `responses`. `None` means "no revision".
    pub async fn critique(&self, responses: &[Message], focus: CriticFocus) -> Option<String> {
        match analysis::analyze(self.ctx.oracle(), responses, None, focus.instruction()).await {
            Ok(text) if !text.trim().is_empty() => {
                debug!(?focus, critique = %text, "Critic reviewed");
                Some(text)
            }
            Ok(_) => {
                warn!(?focus, "Critic returned nothing");
                None
            }
            Err(e) => {
                self.ctx.oracle_failed("critic", &e);
                None
            }
        }
    }
}

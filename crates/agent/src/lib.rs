//! The Evaloop evaluate engine.
//!
//! A request flows through a small set of cooperating components:
//!
//! - [`IntentClassifier`] picks one action for the request
//! - [`ActionExecutor`] has the oracle fill in the arguments and runs it
//! - [`Planner`] backs the reserved `plan` action with an ordered subtask list
//! - [`Critic`] optionally reviews a plan or a result once
//! - [`Orchestrator`] drives them, re-evaluates, and synthesizes the reply
//!
//! Every oracle failure degrades to a fallback; `evaluate` never errors.

pub mod analysis;
pub mod context;
pub mod critic;
pub mod digest;
pub mod executor;
pub mod intent;
pub mod oracle;
pub mod orchestrator;
pub mod planner;
mod prompt;

#[cfg(test)]
mod test_helpers;

pub use context::EngineContext;
pub use critic::{Critic, CriticFocus};
pub use digest::digest;
pub use executor::{ActionExecutor, Execution, ExecutionFailure};
pub use intent::IntentClassifier;
pub use oracle::ProviderOracle;
pub use orchestrator::{EvaluateOutcome, Orchestrator, ReplyHook};
pub use planner::Planner;

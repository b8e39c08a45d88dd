//! Prompt framing shared by the classifier, executor and planner.

use evaloop_core::capability::CapabilityDescriptor;
use evaloop_core::message::Message;

pub(crate) const CLASSIFY_HEADER: &str =
    "Transcript of AI assistant responding to user requests. Replies with the action to perform and the reasoning.";

pub(crate) const EXECUTE_HEADER: &str = "Transcript of AI assistant responding to user requests. Replies with the action to perform, including reasoning, and the confidence interval from 0 to 100.";

pub(crate) const PLAN_HEADER: &str = "Transcript of AI assistant responding to user requests. ";

/// One description per line.
pub(crate) fn describe<'a>(descriptors: impl IntoIterator<Item = &'a CapabilityDescriptor>) -> String {
    descriptors
        .into_iter()
        .map(|d| format!("{}\n", d.description))
        .collect()
}

/// The description preamble that opens every constrained call.
pub(crate) fn preamble(header: &str, descriptions: &str) -> Message {
    Message::user(format!("{header}\n{descriptions}"))
}

/// The trailing message asking the oracle for a call.
pub(crate) fn function_call(prompt: &str) -> Message {
    Message::user(format!("{prompt}\nFunction call: "))
}

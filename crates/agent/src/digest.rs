//! Flatten a message list into plain text.
//!
//! The digest is what the engine shows the oracle when it needs the story so
//! far in one piece: re-evaluation context, critic input, history prefix.

use evaloop_core::message::{FunctionCall, Message, Role};

/// Render `messages` as text, one block per message.
///
/// Function results and call records are labelled, user text is copied
/// verbatim, assistant text is labelled. Empty function results and system
/// messages are skipped.
pub fn digest(messages: &[Message]) -> String {
    let mut out = String::new();
    for message in messages {
        match message.role {
            Role::Function if !message.content.is_empty() => {
                out.push_str("Function result: \n");
                out.push_str(&message.content);
                out.push('\n');
            }
            Role::Assistant => {
                if let Some(call) = &message.function_call {
                    out.push_str(&render_call(call));
                    out.push('\n');
                } else if !message.content.is_empty() {
                    out.push_str("Assistant message: ");
                    out.push_str(&message.content);
                    out.push('\n');
                }
            }
            Role::User if !message.content.is_empty() => {
                out.push_str(&message.content);
                out.push('\n');
            }
            _ => {}
        }
    }
    out
}

fn render_call(call: &FunctionCall) -> String {
    let mut line = format!("calling {} with arguments:", call.name);
    match serde_json::from_str::<serde_json::Value>(&call.arguments) {
        Ok(serde_json::Value::Object(args)) => {
            for (key, value) in args {
                let value = match value {
                    serde_json::Value::String(s) => s,
                    other => other.to_string(),
                };
                line.push_str(&format!(" {key}=\"{value}\""));
            }
        }
        _ if call.arguments.trim().is_empty() => {}
        _ => {
            line.push(' ');
            line.push_str(call.arguments.trim());
        }
    }
    line
}

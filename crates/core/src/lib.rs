//! # Evaloop Core
//!
//! Domain types, traits, and error definitions for the Evaloop orchestration
//! engine. Every collaborator the engine talks to (completion provider,
//! reasoning oracle, capabilities, memory store) is a trait here;
//! implementations live in their own crates and depend inward on this one.

pub mod capability;
pub mod error;
pub mod event;
pub mod memory;
pub mod message;
pub mod oracle;
pub mod plan;
pub mod provider;

// Re-export key types at crate root for ergonomics
pub use capability::{
    ActionKind, Capability, CapabilityContext, CapabilityDescriptor, CapabilityRegistry,
    CapabilityRegistryBuilder, RegisteredAction, PLAN_ACTION, REPLY_ACTION,
};
pub use error::{CapabilityError, Error, MemoryError, ProviderError, RegistryError, Result};
pub use event::{DomainEvent, EventBus};
pub use memory::{MemoryEntry, MemoryHit, MemoryStore};
pub use message::{Conversation, ConversationId, FunctionCall, Message, Role};
pub use oracle::Oracle;
pub use plan::{ActionOutput, Intent, Plan, Subtask};
pub use provider::{FunctionChoice, FunctionSchema, Provider, ProviderRequest, ProviderResponse, Usage};

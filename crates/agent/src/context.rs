//! The shared handles every engine component works with.

use async_trait::async_trait;
use chrono::Utc;
use evaloop_core::capability::{CapabilityContext, CapabilityRegistry};
use evaloop_core::error::ProviderError;
use evaloop_core::event::{DomainEvent, EventBus};
use evaloop_core::oracle::Oracle;
use std::sync::Arc;
use tracing::warn;

use crate::analysis;

/// Oracle, registry and event bus, cheap to clone.
///
/// Also the [`CapabilityContext`] handed to running capabilities.
#[derive(Clone)]
pub struct EngineContext {
    oracle: Arc<dyn Oracle>,
    registry: Arc<CapabilityRegistry>,
    events: Arc<EventBus>,
}

impl EngineContext {
    pub fn new(oracle: Arc<dyn Oracle>, registry: Arc<CapabilityRegistry>) -> Self {
        Self {
            oracle,
            registry,
            events: Arc::new(EventBus::default()),
        }
    }

    pub fn with_event_bus(mut self, events: Arc<EventBus>) -> Self {
        self.events = events;
        self
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    pub(crate) fn publish(&self, event: DomainEvent) {
        self.events.publish(event);
    }

    /// Log and publish a recovered oracle failure.
    pub(crate) fn oracle_failed(&self, stage: &str, error: &ProviderError) {
        warn!(stage, error = %error, "Oracle call failed, using fallback");
        self.publish(DomainEvent::OracleFailed {
            stage: stage.to_string(),
            error_message: error.to_string(),
            timestamp: Utc::now(),
        });
    }
}

#[async_trait]
impl CapabilityContext for EngineContext {
    fn registry(&self) -> &CapabilityRegistry {
        &self.registry
    }

    fn oracle(&self) -> &dyn Oracle {
        self.oracle.as_ref()
    }

    async fn post_process(&self, text: &str) -> String {
        match analysis::summarize(self.oracle.as_ref(), text).await {
            Ok(summary) => summary,
            Err(e) => {
                self.oracle_failed("post_process", &e);
                text.to_string()
            }
        }
    }
}

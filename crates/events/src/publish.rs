//! Outbound publish capability.
//!
//! Downstream stages announce progress by publishing JSON messages to named
//! topics. The transport (Pub/Sub, a queue, an HTTP hook) is outside this
//! crate; callers depend on the [`Publisher`] trait only.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PublishError {
    #[error("topic must not be empty")]
    EmptyTopic,

    #[error("publish failed: {0}")]
    Transport(String),

    /// Publish failed due to internal lock poisoning.
    #[error("publisher state poisoned")]
    Poisoned,
}

/// Publish a message to a topic.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, topic: &str, message: Value) -> Result<(), PublishError>;
}

#[async_trait]
impl<P> Publisher for Arc<P>
where
    P: Publisher + ?Sized,
{
    async fn publish(&self, topic: &str, message: Value) -> Result<(), PublishError> {
        (**self).publish(topic, message).await
    }
}

/// In-memory publisher for tests/dev.
///
/// Records every published message; can be switched into a failing mode to
/// exercise error paths.
#[derive(Debug, Default)]
pub struct InMemoryPublisher {
    published: Mutex<Vec<(String, Value)>>,
    fail_with: Mutex<Option<String>>,
}

impl InMemoryPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent publish fail with a transport error.
    pub fn fail_with(&self, message: impl Into<String>) {
        if let Ok(mut fail) = self.fail_with.lock() {
            *fail = Some(message.into());
        }
    }

    pub fn published(&self) -> Vec<(String, Value)> {
        self.published
            .lock()
            .map(|p| p.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Publisher for InMemoryPublisher {
    async fn publish(&self, topic: &str, message: Value) -> Result<(), PublishError> {
        if topic.is_empty() {
            return Err(PublishError::EmptyTopic);
        }
        if let Some(err) = self.fail_with.lock().map_err(|_| PublishError::Poisoned)?.clone() {
            return Err(PublishError::Transport(err));
        }
        self.published
            .lock()
            .map_err(|_| PublishError::Poisoned)?
            .push((topic.to_string(), message));
        Ok(())
    }
}

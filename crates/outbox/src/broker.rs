//! Message broker contract and in-memory double.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use thiserror::Error;

/// A publish attempt failed; the event stays in the outbox for a retry.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("broker publish failed: {0}")]
pub struct BrokerError(pub String);

/// Publish interface to the message broker.
///
/// There is no acknowledgment contract beyond success or failure of the
/// call itself; downstream consumers must tolerate duplicates.
#[async_trait]
pub trait MessageBroker: Send + Sync {
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: &serde_json::Value,
    ) -> Result<(), BrokerError>;
}

/// Broker stand-in that logs each publish and reports success.
///
/// Used by the server binary until a real broker transport is wired in;
/// the outbox semantics (retry, processed flag) are unaffected by which
/// implementation sits behind the trait.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogBroker;

#[async_trait]
impl MessageBroker for LogBroker {
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: &serde_json::Value,
    ) -> Result<(), BrokerError> {
        tracing::info!(exchange, routing_key, %payload, "publishing outbox event");
        Ok(())
    }
}

/// A message accepted by the in-memory broker.
#[derive(Debug, Clone, PartialEq)]
pub struct PublishedMessage {
    pub exchange: String,
    pub routing_key: String,
    pub payload: serde_json::Value,
}

#[derive(Debug, Default)]
struct BrokerState {
    published: Vec<PublishedMessage>,
    fail_all: bool,
    fail_payloads: Vec<serde_json::Value>,
}

/// In-memory broker for testing, with targeted failure injection.
#[derive(Debug, Clone, Default)]
pub struct InMemoryBroker {
    state: Arc<RwLock<BrokerState>>,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every publish call fail.
    pub fn set_fail_all(&self, fail: bool) {
        self.state.write().unwrap().fail_all = fail;
    }

    /// Makes publishes of exactly this payload fail.
    pub fn fail_payload(&self, payload: serde_json::Value) {
        self.state.write().unwrap().fail_payloads.push(payload);
    }

    /// Every message accepted so far, in publish order.
    pub fn published(&self) -> Vec<PublishedMessage> {
        self.state.read().unwrap().published.clone()
    }

    pub fn published_count(&self) -> usize {
        self.state.read().unwrap().published.len()
    }
}

#[async_trait]
impl MessageBroker for InMemoryBroker {
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: &serde_json::Value,
    ) -> Result<(), BrokerError> {
        let mut state = self.state.write().unwrap();
        if state.fail_all {
            return Err(BrokerError("injected broker outage".to_string()));
        }
        if state.fail_payloads.contains(payload) {
            return Err(BrokerError("injected publish failure".to_string()));
        }
        state.published.push(PublishedMessage {
            exchange: exchange.to_string(),
            routing_key: routing_key.to_string(),
            payload: payload.clone(),
        });
        Ok(())
    }
}

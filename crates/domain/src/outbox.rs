//! Durable outbox records.
//!
//! An [`OutboxEvent`] is written in the same transaction as the order status
//! change it reports and later drained by the publisher. It is never deleted
//! by the core; only the publisher flips `processed` and bumps `retry_count`.

use chrono::{DateTime, Utc};
use common::{OrderId, OutboxEventId, ProductId, UserId};
use serde::{Deserialize, Serialize};

/// Exchange the completion notice is published to.
pub const EMAIL_EXCHANGE: &str = "email-exchange";

/// Routing key for the PDF/email generation consumer.
pub const PDF_ROUTING_KEY: &str = "user.pdf";

/// Event type tag for order completion notices.
pub const ORDER_COMPLETED_EVENT: &str = "order.completed";

/// A single enriched line of a completion notice.
///
/// Built from the remote product lookup; lines whose lookup fails are
/// omitted from the notice rather than failing the whole transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoticeLine {
    pub product_id: ProductId,
    pub name: String,
    pub description: Option<String>,
    pub price_cents: Option<i64>,
    pub quantity: u32,
}

/// Payload sent to the downstream PDF/email generator when an order
/// completes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletedOrderNotice {
    pub order_id: OrderId,
    pub user_id: UserId,
    pub recipient: String,
    pub lines: Vec<NoticeLine>,
}

/// An outbox event before the store has assigned it an identity.
#[derive(Debug, Clone)]
pub struct NewOutboxEvent {
    pub event_type: String,
    pub payload: serde_json::Value,
    pub exchange: String,
    pub routing_key: String,
}

impl NewOutboxEvent {
    /// Builds the outbox record for an order completion notice.
    pub fn order_completed(notice: &CompletedOrderNotice) -> Result<Self, serde_json::Error> {
        Ok(Self {
            event_type: ORDER_COMPLETED_EVENT.to_string(),
            payload: serde_json::to_value(notice)?,
            exchange: EMAIL_EXCHANGE.to_string(),
            routing_key: PDF_ROUTING_KEY.to_string(),
        })
    }
}

/// A persisted outbox event awaiting publication.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboxEvent {
    pub id: OutboxEventId,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub exchange: String,
    pub routing_key: String,
    pub created_at: DateTime<Utc>,
    pub processed: bool,
    pub retry_count: u32,
}

impl OutboxEvent {
    /// Returns true while the event is still eligible for dispatch.
    pub fn is_dispatchable(&self, max_retries: u32) -> bool {
        !self.processed && self.retry_count < max_retries
    }
}

//! Outbox store contract.

use async_trait::async_trait;
use common::OutboxEventId;
use domain::{NewOutboxEvent, OutboxEvent};

use crate::error::Result;

/// Durable storage of domain events awaiting publication.
///
/// Events are inserted by the order workflows (within the completing
/// transaction, see [`OrderStore::complete_order`](crate::OrderStore)) and
/// mutated only by the publisher. The core never deletes them.
#[async_trait]
pub trait OutboxStore: Send + Sync {
    /// Inserts an event with `processed = false` and `retry_count = 0`.
    async fn insert_event(&self, event: NewOutboxEvent) -> Result<OutboxEvent>;

    /// Returns events with `processed = false` and `retry_count` below the
    /// given cap, oldest first.
    async fn dispatchable_events(&self, max_retries: u32) -> Result<Vec<OutboxEvent>>;

    /// Marks an event as successfully published.
    async fn mark_processed(&self, id: OutboxEventId) -> Result<()>;

    /// Increments an event's retry count after a failed publish attempt
    /// and returns the new count. The processed flag is left untouched.
    async fn record_publish_failure(&self, id: OutboxEventId) -> Result<u32>;

    /// Loads a single event.
    async fn get_event(&self, id: OutboxEventId) -> Result<Option<OutboxEvent>>;
}

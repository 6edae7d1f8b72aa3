//! Transactional outbox publication.
//!
//! The [`OutboxPublisher`] drains unpublished events from the
//! [`OutboxStore`](store::OutboxStore) on a fixed interval and delivers
//! them to a [`MessageBroker`]. Delivery is at-least-once: an event stays
//! unprocessed until a publish attempt explicitly succeeds, so a crash
//! between broker acknowledgment and the processed-flag write replays the
//! event on the next cycle.

pub mod broker;
pub mod publisher;

pub use broker::{BrokerError, InMemoryBroker, LogBroker, MessageBroker, PublishedMessage};
pub use publisher::{
    CycleReport, DEFAULT_POLL_INTERVAL, MAX_RETRIES, OutboxPublisher, PublisherConfig,
};

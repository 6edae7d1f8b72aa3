//! Store error types.

use common::{OrderId, OutboxEventId};
use thiserror::Error;

/// Errors raised by the persistence layer.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The order to update or delete does not exist.
    #[error("order {0} not found")]
    OrderNotFound(OrderId),

    /// The outbox event to update does not exist.
    #[error("outbox event {0} not found")]
    EventNotFound(OutboxEventId),

    /// The stored order was no longer pending when a guarded write ran.
    ///
    /// Signals a lost race between two mutations of the same order; none
    /// of the writes in the failing call took effect.
    #[error("order {order_id} was no longer pending")]
    StatusConflict { order_id: OrderId },

    /// Underlying database failure.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Payload (de)serialization failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Injected failure from the in-memory test double.
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Convenience alias for store results.
pub type Result<T> = std::result::Result<T, StoreError>;

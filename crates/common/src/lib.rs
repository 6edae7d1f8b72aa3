//! Shared identifier types used across the order service crates.

mod types;

pub use types::{OrderId, OrderItemId, OutboxEventId, ProductId, UserId};

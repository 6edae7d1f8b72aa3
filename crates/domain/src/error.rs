//! Domain error types.

use common::{OrderItemId, ProductId};
use thiserror::Error;

use crate::order::OrderStatus;

/// Errors raised by the [`Order`](crate::Order) aggregate itself.
///
/// These are deterministic validation failures; callers must never retry
/// them.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum OrderError {
    /// Items may only be mutated while the order is pending.
    #[error("order items can only change while the order is pending, current status is {status}")]
    NotPending { status: OrderStatus },

    /// A completed order is immutable except for historical reads.
    #[error("the order has already been completed")]
    AlreadyCompleted,

    /// Quantities must be strictly positive.
    #[error("invalid quantity {quantity}, must be greater than zero")]
    InvalidQuantity { quantity: i64 },

    /// Each product appears at most once per order.
    #[error("product {0} is already part of the order, change its quantity instead")]
    DuplicateProduct(ProductId),

    /// The referenced line item does not belong to this order.
    #[error("order item {0} not found")]
    ItemNotFound(OrderItemId),
}

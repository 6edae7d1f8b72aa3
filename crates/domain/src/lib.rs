//! Domain layer for the order service.
//!
//! Holds the [`Order`] aggregate (which exclusively owns its line items),
//! the order status machine, and the durable [`OutboxEvent`] record used by
//! the transactional outbox.

pub mod error;
pub mod order;
pub mod outbox;

pub use error::OrderError;
pub use order::{NewOrder, NewOrderItem, Order, OrderItem, OrderStatus};
pub use outbox::{
    CompletedOrderNotice, EMAIL_EXCHANGE, NewOutboxEvent, NoticeLine, ORDER_COMPLETED_EVENT,
    OutboxEvent, PDF_ROUTING_KEY,
};

//! Application service for the order system.
//!
//! [`OrderService`] drives the order-creation saga (reserve remote stock,
//! compensate on partial failure), guards single-item mutations with the
//! same compensation discipline, and turns the pending→completed status
//! transition into a transactional outbox event.

pub mod completion;
pub mod error;
pub mod items;
pub mod saga;
pub mod service;

pub use error::OrderFlowError;
pub use saga::{CreateOrderRequest, CreatedOrder, ProductIssue, RejectedProduct};
pub use service::OrderService;

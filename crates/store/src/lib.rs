//! Persistence for the order aggregate and the transactional outbox.
//!
//! Two trait surfaces, [`OrderStore`] and [`OutboxStore`], with an
//! in-memory implementation for tests and a PostgreSQL implementation for
//! production. Saving or deleting an order explicitly cascades to its line
//! items, and completing an order writes the status change and the outbox
//! event in one transaction.

pub mod error;
pub mod memory;
pub mod order;
pub mod outbox;
pub mod postgres;

pub use error::{Result, StoreError};
pub use memory::InMemoryStore;
pub use order::OrderStore;
pub use outbox::OutboxStore;
pub use postgres::PostgresStore;

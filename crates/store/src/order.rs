//! Order aggregate store contract.

use async_trait::async_trait;
use common::{OrderId, OrderItemId, UserId};
use domain::{NewOrder, NewOutboxEvent, Order, OutboxEvent};

use crate::error::Result;

/// Persistence of orders and their line items.
///
/// The store owns identity assignment: orders and items receive their ids
/// on save. Saves and deletes cascade to the item sequence explicitly.
/// Every method is atomic with respect to other calls touching the same
/// order id.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Persists a new order with its accepted items in one unit and
    /// returns the stored aggregate with identities assigned.
    async fn create_order(&self, new_order: NewOrder) -> Result<Order>;

    /// Loads an order with its items.
    async fn get_order(&self, id: OrderId) -> Result<Option<Order>>;

    /// Loads every order, items included.
    async fn list_orders(&self) -> Result<Vec<Order>>;

    /// Loads every order belonging to one user, items included.
    async fn orders_for_user(&self, user_id: UserId) -> Result<Vec<Order>>;

    /// Persists the current state of an order, cascading to its items:
    /// items missing from the aggregate are deleted, items carrying the
    /// unassigned id are inserted, the rest are updated. Returns the
    /// refreshed aggregate with all identities assigned.
    ///
    /// The write only commits while the stored order is still pending;
    /// a stale aggregate loaded before a concurrent completion fails with
    /// [`StoreError::StatusConflict`](crate::StoreError) and leaves the
    /// stored state untouched.
    async fn update_order(&self, order: &Order) -> Result<Order>;

    /// Deletes an order and, by cascade, its items.
    async fn delete_order(&self, id: OrderId) -> Result<()>;

    /// Finds the order owning the given item.
    async fn find_order_by_item(&self, item_id: OrderItemId) -> Result<Option<Order>>;

    /// Persists an order's transition to completed together with the
    /// outbox event reporting it, in one atomic unit.
    ///
    /// Fails with [`StoreError::StatusConflict`](crate::StoreError) if
    /// the stored order is no longer pending, in which case neither write
    /// takes effect.
    async fn complete_order(&self, order: &Order, event: NewOutboxEvent) -> Result<OutboxEvent>;
}

//! Service wiring and order reads.

use clients::{InventoryClient, ProductGateway, StockDelta, StockDirection, UserDirectory};
use common::{OrderId, UserId};
use domain::{Order, OrderItem};
use store::OrderStore;

use crate::error::OrderFlowError;

/// Application service driving every order workflow.
///
/// Owns the store and the remote clients; the resilience policy state of
/// the product service lives inside the [`InventoryClient`], so every
/// workflow shares the same circuit breaker and rate limiter.
pub struct OrderService<S, G, U> {
    pub(crate) store: S,
    pub(crate) inventory: InventoryClient<G>,
    pub(crate) users: U,
}

impl<S, G, U> OrderService<S, G, U>
where
    S: OrderStore,
    G: ProductGateway,
    U: UserDirectory,
{
    pub fn new(store: S, inventory: InventoryClient<G>, users: U) -> Self {
        Self {
            store,
            inventory,
            users,
        }
    }

    /// Loads a single order with its items.
    pub async fn get_order(&self, id: OrderId) -> Result<Order, OrderFlowError> {
        self.store
            .get_order(id)
            .await?
            .ok_or(OrderFlowError::OrderNotFound(id))
    }

    /// Loads every order, items included.
    pub async fn list_orders(&self) -> Result<Vec<Order>, OrderFlowError> {
        Ok(self.store.list_orders().await?)
    }

    /// Loads the caller's orders, items included.
    pub async fn orders_for_user(&self, caller: UserId) -> Result<Vec<Order>, OrderFlowError> {
        Ok(self.store.orders_for_user(caller).await?)
    }

    /// Lists the line items of one order.
    pub async fn order_items(&self, id: OrderId) -> Result<Vec<OrderItem>, OrderFlowError> {
        let order = self.get_order(id).await?;
        Ok(order.items().cloned().collect())
    }

    /// Deletes an order owned by the caller.
    ///
    /// A pending order still holds reserved stock, so its full item
    /// quantities are released before the aggregate is removed; if the
    /// release fails the order is kept so no reservation leaks.
    #[tracing::instrument(skip(self))]
    pub async fn delete_order(&self, caller: UserId, id: OrderId) -> Result<(), OrderFlowError> {
        let order = self.get_order(id).await?;
        self.ensure_owner(&order, caller)?;

        if order.status().can_modify_items() {
            let deltas: Vec<StockDelta> = order
                .items()
                .map(|item| StockDelta::new(item.product_id, item.quantity, StockDirection::Release))
                .collect();
            if !deltas.is_empty() {
                self.inventory
                    .adjust_stock(&deltas)
                    .await
                    .map_err(OrderFlowError::from_inventory)?;
            }
        }

        self.store.delete_order(id).await?;
        tracing::info!(order_id = %id, "order deleted");
        Ok(())
    }

    pub(crate) fn ensure_owner(
        &self,
        order: &Order,
        caller: UserId,
    ) -> Result<(), OrderFlowError> {
        if order.is_owned_by(caller) {
            Ok(())
        } else {
            Err(OrderFlowError::Forbidden {
                order_id: order.id(),
                user_id: caller,
            })
        }
    }
}

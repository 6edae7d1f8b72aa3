//! Single-item mutations on a pending order.
//!
//! Every mutation adjusts remote stock before it persists the aggregate,
//! so an item row never exists without its reservation. When persistence
//! fails after the adjustment took effect, the inverse delta is applied as
//! a compensating best-effort call.

use clients::{ProductGateway, StockDelta, StockDirection, UserDirectory};
use common::{OrderId, OrderItemId, ProductId, UserId};
use domain::{Order, OrderItem};
use store::OrderStore;

use crate::error::OrderFlowError;
use crate::service::OrderService;

impl<S, G, U> OrderService<S, G, U>
where
    S: OrderStore,
    G: ProductGateway,
    U: UserDirectory,
{
    /// Adds a line item to a pending order owned by the caller.
    ///
    /// Reserves the full quantity before the item is persisted.
    #[tracing::instrument(skip(self))]
    pub async fn add_item(
        &self,
        caller: UserId,
        order_id: OrderId,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<OrderItem, OrderFlowError> {
        let mut order = self.get_order(order_id).await?;
        self.ensure_owner(&order, caller)?;

        // Validates the pending status, the quantity and the one-item-per-
        // product rule before any remote call happens.
        order.add_item(OrderItem::pending(product_id, quantity))?;

        self.ensure_available(product_id, quantity).await?;
        let delta = StockDelta::new(product_id, quantity, StockDirection::Reserve);
        self.inventory
            .adjust_stock(&[delta])
            .await
            .map_err(OrderFlowError::from_inventory)?;

        let stored = self.persist_with_compensation(&order, delta).await?;
        stored
            .item_for_product(product_id)
            .cloned()
            .ok_or_else(|| {
                OrderFlowError::Store(store::StoreError::Unavailable(format!(
                    "stored order {order_id} is missing the added item"
                )))
            })
    }

    /// Changes the quantity of an existing item.
    ///
    /// Only the signed difference to the current quantity is exchanged
    /// with the product service: an increase reserves the extra units, a
    /// decrease releases them, an unchanged quantity makes no remote call.
    #[tracing::instrument(skip(self))]
    pub async fn update_item_quantity(
        &self,
        caller: UserId,
        item_id: OrderItemId,
        quantity: u32,
    ) -> Result<OrderItem, OrderFlowError> {
        let mut order = self.order_for_item(item_id).await?;
        self.ensure_owner(&order, caller)?;

        let current = order
            .item(item_id)
            .ok_or(OrderFlowError::ItemNotFound(item_id))?;
        let product_id = current.product_id;
        let current_quantity = current.quantity;

        // Validates the pending status and the positive quantity.
        order.set_item_quantity(item_id, quantity)?;
        if quantity == current_quantity {
            return Ok(OrderItem {
                id: item_id,
                product_id,
                quantity,
            });
        }

        let delta = if quantity > current_quantity {
            let extra = quantity - current_quantity;
            self.ensure_available(product_id, extra).await?;
            StockDelta::new(product_id, extra, StockDirection::Reserve)
        } else {
            StockDelta::new(product_id, current_quantity - quantity, StockDirection::Release)
        };
        self.inventory
            .adjust_stock(&[delta])
            .await
            .map_err(OrderFlowError::from_inventory)?;

        let stored = self.persist_with_compensation(&order, delta).await?;
        stored
            .item(item_id)
            .cloned()
            .ok_or(OrderFlowError::ItemNotFound(item_id))
    }

    /// Removes an item from a pending order, releasing its full quantity.
    #[tracing::instrument(skip(self))]
    pub async fn remove_item(
        &self,
        caller: UserId,
        item_id: OrderItemId,
    ) -> Result<(), OrderFlowError> {
        let mut order = self.order_for_item(item_id).await?;
        self.ensure_owner(&order, caller)?;

        let removed = order.remove_item(item_id)?;
        let delta = StockDelta::new(removed.product_id, removed.quantity, StockDirection::Release);
        self.inventory
            .adjust_stock(&[delta])
            .await
            .map_err(OrderFlowError::from_inventory)?;

        self.persist_with_compensation(&order, delta).await?;
        Ok(())
    }

    async fn order_for_item(&self, item_id: OrderItemId) -> Result<Order, OrderFlowError> {
        self.store
            .find_order_by_item(item_id)
            .await?
            .ok_or(OrderFlowError::ItemNotFound(item_id))
    }

    async fn ensure_available(
        &self,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<(), OrderFlowError> {
        let available = self
            .inventory
            .check_availability(&[(product_id, quantity)])
            .await
            .map_err(OrderFlowError::from_inventory)?;
        match available.get(&product_id) {
            None => Err(OrderFlowError::ProductNotFound(product_id)),
            Some(stock) if *stock < quantity => {
                Err(OrderFlowError::InsufficientStock(product_id))
            }
            Some(_) => Ok(()),
        }
    }

    /// Persists the mutated aggregate; on failure the already-applied
    /// stock delta is undone before the error surfaces.
    async fn persist_with_compensation(
        &self,
        order: &Order,
        applied: StockDelta,
    ) -> Result<Order, OrderFlowError> {
        match self.store.update_order(order).await {
            Ok(stored) => Ok(stored),
            Err(err) => {
                metrics::counter!("item_mutation_compensations_total").increment(1);
                if let Err(comp_err) = self.inventory.adjust_stock(&[applied.inverse()]).await {
                    tracing::error!(
                        order_id = %order.id(),
                        error = %comp_err,
                        "compensation failed: stock adjustment not undone"
                    );
                }
                Err(err.into())
            }
        }
    }
}

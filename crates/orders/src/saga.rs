//! Order creation saga.
//!
//! Creation runs as a sequence of forward steps against two remote
//! dependencies (store, product service). Each step that succeeds pushes
//! its compensating action onto a log; when a later step fails, the log is
//! executed in reverse so no order persists without its stock reservation
//! and no reservation outlives its order.

use std::collections::HashMap;

use clients::{ProductGateway, StockDelta, StockDirection, UserDirectory};
use common::{OrderId, ProductId};
use domain::{NewOrder, NewOrderItem, Order};
use serde::Serialize;
use store::OrderStore;

use crate::error::OrderFlowError;
use crate::service::OrderService;

/// Inputs for the creation saga.
#[derive(Debug, Clone)]
pub struct CreateOrderRequest {
    /// Email of the ordering user, resolved to an id via the directory.
    pub email: String,
    pub items: Vec<NewOrderItem>,
}

/// Why a requested product was left out of the created order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProductIssue {
    /// Known product, but fewer units available than requested.
    NoStock,
    /// The product service does not know the product.
    NotFound,
}

/// A requested product that did not make it into the order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RejectedProduct {
    pub product_id: ProductId,
    pub issue: ProductIssue,
}

/// Saga outcome: the persisted order plus the per-product rejections.
#[derive(Debug, Clone)]
pub struct CreatedOrder {
    pub order: Order,
    pub rejected: Vec<RejectedProduct>,
}

/// A recorded inverse of a forward step that already took effect.
enum Compensation {
    ReleaseStock(Vec<StockDelta>),
    DeleteOrder(OrderId),
}

impl<S, G, U> OrderService<S, G, U>
where
    S: OrderStore,
    G: ProductGateway,
    U: UserDirectory,
{
    /// Creates an order for the requested items.
    ///
    /// Products without enough stock or unknown to the product service are
    /// reported back as rejected instead of failing the whole request; the
    /// order is created with the remaining items and their stock reserved.
    /// A failure after the order is persisted unwinds the compensation log
    /// and surfaces as [`OrderFlowError::CreationFailed`].
    #[tracing::instrument(skip(self, request), fields(email = %request.email, requested = request.items.len()))]
    pub async fn create_order(
        &self,
        request: CreateOrderRequest,
    ) -> Result<CreatedOrder, OrderFlowError> {
        validate_items(&request.items)?;

        let user_id = self
            .users
            .find_user_id(&request.email)
            .await
            .map_err(OrderFlowError::from_user_lookup)?;

        let wanted: Vec<(ProductId, u32)> = request
            .items
            .iter()
            .map(|item| (item.product_id, item.quantity))
            .collect();
        let available = self
            .inventory
            .check_availability(&wanted)
            .await
            .map_err(OrderFlowError::from_inventory)?;
        let (accepted, rejected) = partition_by_availability(request.items, &available);
        if !rejected.is_empty() {
            tracing::info!(rejected = rejected.len(), "some requested products were rejected");
        }

        let mut compensations = Vec::new();
        match self
            .run_creation_steps(user_id, request.email, accepted, &mut compensations)
            .await
        {
            Ok(order) => {
                metrics::counter!("orders_created_total").increment(1);
                tracing::info!(order_id = %order.id(), items = order.item_count(), "order created");
                Ok(CreatedOrder { order, rejected })
            }
            Err(err) => {
                self.unwind(compensations).await;
                Err(OrderFlowError::creation_failed(err))
            }
        }
    }

    /// Forward steps, in order. Every step that takes effect pushes its
    /// inverse before the next one runs.
    async fn run_creation_steps(
        &self,
        user_id: common::UserId,
        user_email: String,
        accepted: Vec<NewOrderItem>,
        compensations: &mut Vec<Compensation>,
    ) -> Result<Order, OrderFlowError> {
        let order = self
            .store
            .create_order(NewOrder {
                user_id,
                user_email,
                items: accepted,
            })
            .await?;
        compensations.push(Compensation::DeleteOrder(order.id()));

        let reservations: Vec<StockDelta> = order
            .items()
            .map(|item| StockDelta::new(item.product_id, item.quantity, StockDirection::Reserve))
            .collect();
        if !reservations.is_empty() {
            self.inventory
                .adjust_stock(&reservations)
                .await
                .map_err(OrderFlowError::from_inventory)?;
            compensations.push(Compensation::ReleaseStock(
                reservations.iter().map(StockDelta::inverse).collect(),
            ));
        }

        Ok(order)
    }

    /// Executes the compensation log in reverse, best effort: a failing
    /// compensation is logged and the remaining ones still run.
    async fn unwind(&self, compensations: Vec<Compensation>) {
        metrics::counter!("order_creation_compensations_total").increment(1);
        for action in compensations.into_iter().rev() {
            match action {
                Compensation::ReleaseStock(deltas) => {
                    if let Err(err) = self.inventory.adjust_stock(&deltas).await {
                        tracing::error!(error = %err, "compensation failed: reserved stock not released");
                    }
                }
                Compensation::DeleteOrder(order_id) => {
                    if let Err(err) = self.store.delete_order(order_id).await {
                        tracing::error!(%order_id, error = %err, "compensation failed: order not deleted");
                    }
                }
            }
        }
    }
}

fn validate_items(items: &[NewOrderItem]) -> Result<(), OrderFlowError> {
    let mut seen = Vec::with_capacity(items.len());
    for item in items {
        if item.quantity == 0 {
            return Err(OrderFlowError::InvalidInput(format!(
                "quantity for product {} must be greater than zero",
                item.product_id
            )));
        }
        if seen.contains(&item.product_id) {
            return Err(OrderFlowError::InvalidInput(format!(
                "product {} is requested more than once",
                item.product_id
            )));
        }
        seen.push(item.product_id);
    }
    Ok(())
}

/// Splits the requested items into the ones the order is created with and
/// the per-product rejections. A product with exactly the requested
/// quantity available is accepted.
fn partition_by_availability(
    items: Vec<NewOrderItem>,
    available: &HashMap<ProductId, u32>,
) -> (Vec<NewOrderItem>, Vec<RejectedProduct>) {
    let mut accepted = Vec::with_capacity(items.len());
    let mut rejected = Vec::new();
    for item in items {
        match available.get(&item.product_id) {
            Some(stock) if *stock >= item.quantity => accepted.push(item),
            Some(_) => rejected.push(RejectedProduct {
                product_id: item.product_id,
                issue: ProductIssue::NoStock,
            }),
            None => rejected.push(RejectedProduct {
                product_id: item.product_id,
                issue: ProductIssue::NotFound,
            }),
        }
    }
    (accepted, rejected)
}

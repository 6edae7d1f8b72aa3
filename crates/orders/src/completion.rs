//! Order status transitions and the completion notice.

use clients::{ProductGateway, UserDirectory};
use common::{OrderId, UserId};
use domain::{CompletedOrderNotice, NewOutboxEvent, NoticeLine, Order, OrderStatus};
use store::OrderStore;

use crate::error::OrderFlowError;
use crate::service::OrderService;

impl<S, G, U> OrderService<S, G, U>
where
    S: OrderStore,
    G: ProductGateway,
    U: UserDirectory,
{
    /// Moves an order owned by the caller to a new status.
    ///
    /// The transition to [`OrderStatus::Completed`] additionally writes
    /// the completion notice to the outbox, atomically with the status
    /// change. A completed order rejects every further transition.
    #[tracing::instrument(skip(self))]
    pub async fn change_status(
        &self,
        caller: UserId,
        order_id: OrderId,
        status: OrderStatus,
    ) -> Result<Order, OrderFlowError> {
        let mut order = self.get_order(order_id).await?;
        self.ensure_owner(&order, caller)?;
        order.set_status(status)?;

        if status == OrderStatus::Completed {
            self.complete(order).await
        } else {
            Ok(self.store.update_order(&order).await?)
        }
    }

    async fn complete(&self, order: Order) -> Result<Order, OrderFlowError> {
        let notice = self.build_notice(&order).await;
        let event = NewOutboxEvent::order_completed(&notice)?;

        let stored_event = self.store.complete_order(&order, event).await?;
        metrics::counter!("orders_completed_total").increment(1);
        tracing::info!(
            order_id = %order.id(),
            event_id = %stored_event.id,
            lines = notice.lines.len(),
            "order completed, notice queued for publication"
        );
        Ok(order)
    }

    /// Enriches the order's items into notice lines via the product
    /// service. A failing product lookup drops that line instead of
    /// failing the completion.
    async fn build_notice(&self, order: &Order) -> CompletedOrderNotice {
        let mut lines = Vec::with_capacity(order.item_count());
        for item in order.items() {
            match self.inventory.product_details(item.product_id).await {
                Ok(details) => lines.push(NoticeLine {
                    product_id: item.product_id,
                    name: details.name,
                    description: details.description,
                    price_cents: details.price_cents,
                    quantity: item.quantity,
                }),
                Err(err) => {
                    tracing::warn!(
                        order_id = %order.id(),
                        product_id = %item.product_id,
                        error = %err,
                        "product lookup failed, line omitted from completion notice"
                    );
                }
            }
        }
        CompletedOrderNotice {
            order_id: order.id(),
            user_id: order.user_id(),
            recipient: order.user_email().to_string(),
            lines,
        }
    }
}

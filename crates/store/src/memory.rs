//! In-memory store implementation.
//!
//! Backs the whole trait surface with a single lock, which gives every
//! operation the same per-order atomicity the PostgreSQL implementation
//! gets from transactions. Used by tests across the workspace; failure
//! injection switches simulate persistence outages.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use common::{OrderId, OrderItemId, OutboxEventId, UserId};
use domain::{NewOrder, NewOutboxEvent, Order, OrderItem, OrderStatus, OutboxEvent};
use tokio::sync::RwLock;

use crate::error::{Result, StoreError};
use crate::order::OrderStore;
use crate::outbox::OutboxStore;

#[derive(Debug, Default)]
struct Inner {
    orders: HashMap<OrderId, Order>,
    events: Vec<OutboxEvent>,
    next_order_id: i64,
    next_item_id: i64,
    next_event_id: i64,
    fail_next_update: bool,
    fail_next_complete: bool,
}

impl Inner {
    fn next_order_id(&mut self) -> OrderId {
        self.next_order_id += 1;
        OrderId::new(self.next_order_id)
    }

    fn next_item_id(&mut self) -> OrderItemId {
        self.next_item_id += 1;
        OrderItemId::new(self.next_item_id)
    }

    fn next_event_id(&mut self) -> OutboxEventId {
        self.next_event_id += 1;
        OutboxEventId::new(self.next_event_id)
    }

    fn assign_item_ids(&mut self, order: &Order) -> Order {
        let items = order
            .items()
            .map(|item| {
                if item.is_persisted() {
                    item.clone()
                } else {
                    OrderItem {
                        id: self.next_item_id(),
                        ..item.clone()
                    }
                }
            })
            .collect();
        Order::from_parts(
            order.id(),
            order.user_id(),
            order.user_email(),
            order.status(),
            items,
        )
    }

    fn insert_event(&mut self, event: NewOutboxEvent) -> OutboxEvent {
        let stored = OutboxEvent {
            id: self.next_event_id(),
            event_type: event.event_type,
            payload: event.payload,
            exchange: event.exchange,
            routing_key: event.routing_key,
            created_at: Utc::now(),
            processed: false,
            retry_count: 0,
        };
        self.events.push(stored.clone());
        stored
    }
}

/// In-memory order and outbox store.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    inner: Arc<RwLock<Inner>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `update_order` call fail as unavailable.
    pub async fn fail_next_update(&self) {
        self.inner.write().await.fail_next_update = true;
    }

    /// Makes the next `complete_order` call fail as unavailable, leaving
    /// both the order and the outbox untouched.
    pub async fn fail_next_complete(&self) {
        self.inner.write().await.fail_next_complete = true;
    }

    /// Total number of stored outbox events, processed or not.
    pub async fn event_count(&self) -> usize {
        self.inner.read().await.events.len()
    }
}

#[async_trait]
impl OrderStore for InMemoryStore {
    async fn create_order(&self, new_order: NewOrder) -> Result<Order> {
        let mut inner = self.inner.write().await;
        let order_id = inner.next_order_id();
        let items = new_order
            .items
            .iter()
            .map(|item| OrderItem {
                id: inner.next_item_id(),
                product_id: item.product_id,
                quantity: item.quantity,
            })
            .collect();
        let order = Order::from_parts(
            order_id,
            new_order.user_id,
            new_order.user_email,
            OrderStatus::Pending,
            items,
        );
        inner.orders.insert(order_id, order.clone());
        Ok(order)
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>> {
        Ok(self.inner.read().await.orders.get(&id).cloned())
    }

    async fn list_orders(&self) -> Result<Vec<Order>> {
        let inner = self.inner.read().await;
        let mut orders: Vec<Order> = inner.orders.values().cloned().collect();
        orders.sort_by_key(|o| o.id());
        Ok(orders)
    }

    async fn orders_for_user(&self, user_id: UserId) -> Result<Vec<Order>> {
        let inner = self.inner.read().await;
        let mut orders: Vec<Order> = inner
            .orders
            .values()
            .filter(|order| order.is_owned_by(user_id))
            .cloned()
            .collect();
        orders.sort_by_key(|o| o.id());
        Ok(orders)
    }

    async fn update_order(&self, order: &Order) -> Result<Order> {
        let mut inner = self.inner.write().await;
        if inner.fail_next_update {
            inner.fail_next_update = false;
            return Err(StoreError::Unavailable("injected update failure".to_string()));
        }
        let stored_status = inner
            .orders
            .get(&order.id())
            .map(Order::status)
            .ok_or(StoreError::OrderNotFound(order.id()))?;
        // A stale aggregate loaded before a concurrent completion must not
        // overwrite the completed order.
        if stored_status != OrderStatus::Pending {
            return Err(StoreError::StatusConflict {
                order_id: order.id(),
            });
        }
        let stored = inner.assign_item_ids(order);
        inner.orders.insert(order.id(), stored.clone());
        Ok(stored)
    }

    async fn delete_order(&self, id: OrderId) -> Result<()> {
        let mut inner = self.inner.write().await;
        // Items live inside the aggregate, so removal cascades.
        inner
            .orders
            .remove(&id)
            .map(|_| ())
            .ok_or(StoreError::OrderNotFound(id))
    }

    async fn find_order_by_item(&self, item_id: OrderItemId) -> Result<Option<Order>> {
        let inner = self.inner.read().await;
        Ok(inner
            .orders
            .values()
            .find(|order| order.item(item_id).is_some())
            .cloned())
    }

    async fn complete_order(&self, order: &Order, event: NewOutboxEvent) -> Result<OutboxEvent> {
        let mut inner = self.inner.write().await;
        if inner.fail_next_complete {
            inner.fail_next_complete = false;
            return Err(StoreError::Unavailable(
                "injected completion failure".to_string(),
            ));
        }
        let stored_status = inner
            .orders
            .get(&order.id())
            .map(Order::status)
            .ok_or(StoreError::OrderNotFound(order.id()))?;
        if stored_status != OrderStatus::Pending {
            return Err(StoreError::StatusConflict {
                order_id: order.id(),
            });
        }

        // Status write and event insert share the lock, so either both
        // happen or neither does.
        inner.orders.insert(order.id(), order.clone());
        Ok(inner.insert_event(event))
    }
}

#[async_trait]
impl OutboxStore for InMemoryStore {
    async fn insert_event(&self, event: NewOutboxEvent) -> Result<OutboxEvent> {
        Ok(self.inner.write().await.insert_event(event))
    }

    async fn dispatchable_events(&self, max_retries: u32) -> Result<Vec<OutboxEvent>> {
        let inner = self.inner.read().await;
        Ok(inner
            .events
            .iter()
            .filter(|e| e.is_dispatchable(max_retries))
            .cloned()
            .collect())
    }

    async fn mark_processed(&self, id: OutboxEventId) -> Result<()> {
        let mut inner = self.inner.write().await;
        let event = inner
            .events
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or(StoreError::EventNotFound(id))?;
        event.processed = true;
        Ok(())
    }

    async fn record_publish_failure(&self, id: OutboxEventId) -> Result<u32> {
        let mut inner = self.inner.write().await;
        let event = inner
            .events
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or(StoreError::EventNotFound(id))?;
        event.retry_count += 1;
        Ok(event.retry_count)
    }

    async fn get_event(&self, id: OutboxEventId) -> Result<Option<OutboxEvent>> {
        let inner = self.inner.read().await;
        Ok(inner.events.iter().find(|e| e.id == id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{ProductId, UserId};
    use domain::NewOrderItem;

    fn new_order(items: Vec<(i64, u32)>) -> NewOrder {
        NewOrder {
            user_id: UserId::new(1),
            user_email: "alice@example.com".to_string(),
            items: items
                .into_iter()
                .map(|(product, quantity)| NewOrderItem {
                    product_id: ProductId::new(product),
                    quantity,
                })
                .collect(),
        }
    }

    fn completion_event() -> NewOutboxEvent {
        NewOutboxEvent {
            event_type: "order.completed".to_string(),
            payload: serde_json::json!({"ok": true}),
            exchange: "email-exchange".to_string(),
            routing_key: "user.pdf".to_string(),
        }
    }

    #[tokio::test]
    async fn create_assigns_sequential_identities() {
        let store = InMemoryStore::new();
        let first = store.create_order(new_order(vec![(7, 2), (8, 1)])).await.unwrap();
        let second = store.create_order(new_order(vec![(9, 3)])).await.unwrap();

        assert_eq!(first.id(), OrderId::new(1));
        assert_eq!(second.id(), OrderId::new(2));
        let item_ids: Vec<i64> = first.items().map(|i| i.id.as_i64()).collect();
        assert_eq!(item_ids, vec![1, 2]);
        assert_eq!(first.status(), OrderStatus::Pending);
    }

    #[tokio::test]
    async fn update_assigns_ids_to_pending_items_and_cascades_removals() {
        let store = InMemoryStore::new();
        let mut order = store.create_order(new_order(vec![(7, 2)])).await.unwrap();
        let original_item = order.items().next().unwrap().id;

        order
            .add_item(OrderItem::pending(ProductId::new(8), 1))
            .unwrap();
        order.remove_item(original_item).unwrap();

        let stored = store.update_order(&order).await.unwrap();
        assert_eq!(stored.item_count(), 1);
        let item = stored.items().next().unwrap();
        assert!(item.is_persisted());
        assert_eq!(item.product_id, ProductId::new(8));

        assert!(store.find_order_by_item(original_item).await.unwrap().is_none());
        assert_eq!(
            store.find_order_by_item(item.id).await.unwrap().unwrap().id(),
            stored.id()
        );
    }

    #[tokio::test]
    async fn delete_cascades_to_items() {
        let store = InMemoryStore::new();
        let order = store.create_order(new_order(vec![(7, 2)])).await.unwrap();
        let item_id = order.items().next().unwrap().id;

        store.delete_order(order.id()).await.unwrap();

        assert!(store.get_order(order.id()).await.unwrap().is_none());
        assert!(store.find_order_by_item(item_id).await.unwrap().is_none());
        assert!(matches!(
            store.delete_order(order.id()).await,
            Err(StoreError::OrderNotFound(_))
        ));
    }

    #[tokio::test]
    async fn complete_order_writes_status_and_event_together() {
        let store = InMemoryStore::new();
        let mut order = store.create_order(new_order(vec![(7, 2)])).await.unwrap();
        order.set_status(OrderStatus::Completed).unwrap();

        let event = store.complete_order(&order, completion_event()).await.unwrap();
        assert!(!event.processed);
        assert_eq!(event.retry_count, 0);

        let stored = store.get_order(order.id()).await.unwrap().unwrap();
        assert_eq!(stored.status(), OrderStatus::Completed);
        assert_eq!(store.event_count().await, 1);
    }

    #[tokio::test]
    async fn completing_a_non_pending_order_conflicts_and_writes_nothing() {
        let store = InMemoryStore::new();
        let mut order = store.create_order(new_order(vec![(7, 2)])).await.unwrap();
        order.set_status(OrderStatus::Completed).unwrap();
        store.complete_order(&order, completion_event()).await.unwrap();

        let result = store.complete_order(&order, completion_event()).await;
        assert!(matches!(result, Err(StoreError::StatusConflict { .. })));
        assert_eq!(store.event_count().await, 1);
    }

    #[tokio::test]
    async fn stale_pending_update_cannot_overwrite_a_completed_order() {
        let store = InMemoryStore::new();
        let stale = store.create_order(new_order(vec![(7, 2)])).await.unwrap();
        let item_id = stale.items().next().unwrap().id;

        let mut completed = stale.clone();
        completed.set_status(OrderStatus::Completed).unwrap();
        store
            .complete_order(&completed, completion_event())
            .await
            .unwrap();

        // The item workflow loaded `stale` while the order was pending;
        // its write must lose the race, not resurrect the pending status.
        let mut mutated = stale;
        mutated.set_item_quantity(item_id, 9).unwrap();
        let result = store.update_order(&mutated).await;

        assert!(matches!(result, Err(StoreError::StatusConflict { .. })));
        let stored = store.get_order(completed.id()).await.unwrap().unwrap();
        assert_eq!(stored.status(), OrderStatus::Completed);
        assert_eq!(stored.items().next().unwrap().quantity, 2);
        assert_eq!(store.event_count().await, 1);
    }

    #[tokio::test]
    async fn listing_by_user_returns_only_that_owner() {
        let store = InMemoryStore::new();
        store.create_order(new_order(vec![(7, 2)])).await.unwrap();
        let bobs = store
            .create_order(NewOrder {
                user_id: UserId::new(2),
                user_email: "bob@example.com".to_string(),
                items: vec![],
            })
            .await
            .unwrap();

        let scoped = store.orders_for_user(UserId::new(2)).await.unwrap();
        assert_eq!(scoped.len(), 1);
        assert_eq!(scoped[0].id(), bobs.id());
        assert!(store.orders_for_user(UserId::new(3)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn injected_completion_failure_rolls_back_both_writes() {
        let store = InMemoryStore::new();
        let mut order = store.create_order(new_order(vec![(7, 2)])).await.unwrap();
        order.set_status(OrderStatus::Completed).unwrap();

        store.fail_next_complete().await;
        let result = store.complete_order(&order, completion_event()).await;
        assert!(matches!(result, Err(StoreError::Unavailable(_))));

        let stored = store.get_order(order.id()).await.unwrap().unwrap();
        assert_eq!(stored.status(), OrderStatus::Pending);
        assert_eq!(store.event_count().await, 0);
    }

    #[tokio::test]
    async fn dispatchable_honours_processed_flag_and_retry_cap() {
        let store = InMemoryStore::new();
        let a = store.insert_event(completion_event()).await.unwrap();
        let b = store.insert_event(completion_event()).await.unwrap();
        let c = store.insert_event(completion_event()).await.unwrap();

        store.mark_processed(a.id).await.unwrap();
        for _ in 0..5 {
            store.record_publish_failure(b.id).await.unwrap();
        }

        let pending = store.dispatchable_events(5).await.unwrap();
        let ids: Vec<_> = pending.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![c.id]);
    }

    #[tokio::test]
    async fn retry_count_only_grows() {
        let store = InMemoryStore::new();
        let event = store.insert_event(completion_event()).await.unwrap();

        assert_eq!(store.record_publish_failure(event.id).await.unwrap(), 1);
        assert_eq!(store.record_publish_failure(event.id).await.unwrap(), 2);
        store.mark_processed(event.id).await.unwrap();

        let stored = store.get_event(event.id).await.unwrap().unwrap();
        assert_eq!(stored.retry_count, 2);
        assert!(stored.processed);
    }
}

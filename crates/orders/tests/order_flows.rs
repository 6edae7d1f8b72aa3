//! End-to-end workflow tests against the in-memory collaborators.

use std::time::Duration;

use clients::{
    CircuitBreakerConfig, InMemoryProductService, InMemoryUserDirectory, InventoryClient,
    ProductDetails, RateLimiterConfig, ResilienceConfig, RetryPolicy, StockDelta, StockDirection,
};
use common::{OrderId, OrderItemId, ProductId, UserId};
use domain::{CompletedOrderNotice, NewOrder, NewOrderItem, Order, OrderStatus};
use orders::{CreateOrderRequest, OrderFlowError, OrderService, ProductIssue, RejectedProduct};
use store::{InMemoryStore, OrderStore, OutboxStore, StoreError};

const ALICE: UserId = UserId::new(1);
const MALLORY: UserId = UserId::new(2);

struct Harness {
    store: InMemoryStore,
    products: InMemoryProductService,
    service: OrderService<InMemoryStore, InMemoryProductService, InMemoryUserDirectory>,
}

fn fast_config() -> ResilienceConfig {
    ResilienceConfig {
        retry: RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            backoff_multiplier: 2.0,
        },
        circuit_breaker: CircuitBreakerConfig {
            failure_rate_threshold: 0.5,
            minimum_calls: 100,
            rolling_window: Duration::from_secs(60),
            cooldown: Duration::from_secs(60),
        },
        rate_limiter: RateLimiterConfig {
            capacity: 1000.0,
            refill_per_second: 1000.0,
        },
        call_timeout: Duration::from_secs(1),
    }
}

fn harness() -> Harness {
    let store = InMemoryStore::new();
    let products = InMemoryProductService::new();
    let users = InMemoryUserDirectory::new();
    users.add_user("alice@example.com", ALICE);

    let inventory = InventoryClient::new(products.clone(), fast_config());
    let service = OrderService::new(store.clone(), inventory, users);
    Harness {
        store,
        products,
        service,
    }
}

fn request(items: Vec<(i64, u32)>) -> CreateOrderRequest {
    CreateOrderRequest {
        email: "alice@example.com".to_string(),
        items: items
            .into_iter()
            .map(|(product, quantity)| NewOrderItem {
                product_id: ProductId::new(product),
                quantity,
            })
            .collect(),
    }
}

/// Seeds product 7 with five units and creates an order for two of them.
async fn created_order(h: &Harness) -> Order {
    h.products.set_stock(ProductId::new(7), 5);
    h.service
        .create_order(request(vec![(7, 2)]))
        .await
        .unwrap()
        .order
}

mod creation {
    use super::*;

    #[tokio::test]
    async fn reserves_stock_and_persists_a_pending_order() {
        let h = harness();
        h.products.set_stock(ProductId::new(7), 5);

        let created = h.service.create_order(request(vec![(7, 2)])).await.unwrap();

        assert_eq!(created.order.status(), OrderStatus::Pending);
        assert_eq!(created.order.user_id(), ALICE);
        assert_eq!(created.order.item_count(), 1);
        let item = created.order.items().next().unwrap();
        assert!(item.is_persisted());
        assert_eq!(item.quantity, 2);
        assert!(created.rejected.is_empty());

        assert_eq!(h.products.stock(ProductId::new(7)), Some(3));
        assert_eq!(
            h.products.adjustments(),
            vec![vec![StockDelta::new(ProductId::new(7), 2, StockDirection::Reserve)]]
        );
        assert!(h.store.get_order(created.order.id()).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn exactly_matching_stock_is_accepted() {
        let h = harness();
        h.products.set_stock(ProductId::new(7), 2);

        let created = h.service.create_order(request(vec![(7, 2)])).await.unwrap();

        assert!(created.rejected.is_empty());
        assert_eq!(h.products.stock(ProductId::new(7)), Some(0));
    }

    #[tokio::test]
    async fn unavailable_products_are_rejected_without_failing_the_order() {
        let h = harness();
        h.products.set_stock(ProductId::new(7), 5);
        h.products.set_stock(ProductId::new(8), 1);

        let created = h
            .service
            .create_order(request(vec![(7, 2), (8, 2), (9, 1)]))
            .await
            .unwrap();

        assert_eq!(created.order.item_count(), 1);
        assert!(created.order.item_for_product(ProductId::new(7)).is_some());
        assert_eq!(
            created.rejected,
            vec![
                RejectedProduct {
                    product_id: ProductId::new(8),
                    issue: ProductIssue::NoStock,
                },
                RejectedProduct {
                    product_id: ProductId::new(9),
                    issue: ProductIssue::NotFound,
                },
            ]
        );

        // Only the accepted item was reserved.
        assert_eq!(h.products.stock(ProductId::new(7)), Some(3));
        assert_eq!(h.products.stock(ProductId::new(8)), Some(1));
    }

    #[tokio::test]
    async fn order_with_every_product_rejected_is_still_created_empty() {
        let h = harness();

        let created = h.service.create_order(request(vec![(9, 1)])).await.unwrap();

        assert_eq!(created.order.item_count(), 0);
        assert_eq!(created.rejected.len(), 1);
        assert!(h.products.adjustments().is_empty());
    }

    #[tokio::test]
    async fn reservation_failure_unwinds_the_persisted_order() {
        let h = harness();
        h.products.set_stock(ProductId::new(7), 5);
        h.products.set_fail_on_adjust(true);

        let result = h.service.create_order(request(vec![(7, 2)])).await;

        assert!(matches!(
            result,
            Err(OrderFlowError::CreationFailed { .. })
        ));
        assert!(h.store.list_orders().await.unwrap().is_empty());
        assert_eq!(h.products.stock(ProductId::new(7)), Some(5));
    }

    #[tokio::test]
    async fn unknown_user_fails_before_any_side_effect() {
        let h = harness();
        h.products.set_stock(ProductId::new(7), 5);

        let result = h
            .service
            .create_order(CreateOrderRequest {
                email: "bob@example.com".to_string(),
                items: vec![NewOrderItem {
                    product_id: ProductId::new(7),
                    quantity: 1,
                }],
            })
            .await;

        assert!(matches!(result, Err(OrderFlowError::UserNotFound(_))));
        assert!(h.store.list_orders().await.unwrap().is_empty());
        assert_eq!(h.products.call_count(), 0);
    }

    #[tokio::test]
    async fn zero_quantity_is_rejected_before_any_remote_call() {
        let h = harness();

        let result = h.service.create_order(request(vec![(7, 0)])).await;

        assert!(matches!(result, Err(OrderFlowError::InvalidInput(_))));
        assert_eq!(h.products.call_count(), 0);
    }
}

mod item_mutations {
    use super::*;

    #[tokio::test]
    async fn add_item_reserves_before_it_persists() {
        let h = harness();
        let order = created_order(&h).await;
        h.products.set_stock(ProductId::new(8), 5);

        let item = h
            .service
            .add_item(ALICE, order.id(), ProductId::new(8), 3)
            .await
            .unwrap();

        assert!(item.is_persisted());
        assert_eq!(item.quantity, 3);
        assert_eq!(h.products.stock(ProductId::new(8)), Some(2));
        let stored = h.store.get_order(order.id()).await.unwrap().unwrap();
        assert_eq!(stored.item_count(), 2);
    }

    #[tokio::test]
    async fn add_item_rejects_a_duplicate_product_without_remote_calls() {
        let h = harness();
        let order = created_order(&h).await;
        let calls_before = h.products.call_count();

        let result = h
            .service
            .add_item(ALICE, order.id(), ProductId::new(7), 1)
            .await;

        assert!(matches!(result, Err(OrderFlowError::InvalidInput(_))));
        assert_eq!(h.products.call_count(), calls_before);
    }

    #[tokio::test]
    async fn add_item_with_insufficient_stock_adjusts_nothing() {
        let h = harness();
        let order = created_order(&h).await;
        h.products.set_stock(ProductId::new(8), 1);
        let adjustments_before = h.products.adjustments().len();

        let result = h
            .service
            .add_item(ALICE, order.id(), ProductId::new(8), 2)
            .await;

        assert!(matches!(
            result,
            Err(OrderFlowError::InsufficientStock(id)) if id == ProductId::new(8)
        ));
        assert_eq!(h.products.stock(ProductId::new(8)), Some(1));
        assert_eq!(h.products.adjustments().len(), adjustments_before);
    }

    #[tokio::test]
    async fn add_item_for_an_unknown_product_fails() {
        let h = harness();
        let order = created_order(&h).await;

        let result = h
            .service
            .add_item(ALICE, order.id(), ProductId::new(9), 1)
            .await;

        assert!(matches!(result, Err(OrderFlowError::ProductNotFound(_))));
    }

    #[tokio::test]
    async fn foreign_orders_cannot_be_mutated() {
        let h = harness();
        let order = created_order(&h).await;
        let item_id = order.items().next().unwrap().id;

        assert!(matches!(
            h.service.add_item(MALLORY, order.id(), ProductId::new(8), 1).await,
            Err(OrderFlowError::Forbidden { .. })
        ));
        assert!(matches!(
            h.service.update_item_quantity(MALLORY, item_id, 3).await,
            Err(OrderFlowError::Forbidden { .. })
        ));
        assert!(matches!(
            h.service.remove_item(MALLORY, item_id).await,
            Err(OrderFlowError::Forbidden { .. })
        ));
    }

    #[tokio::test]
    async fn add_item_persistence_failure_releases_the_reservation() {
        let h = harness();
        let order = created_order(&h).await;
        h.products.set_stock(ProductId::new(8), 5);
        h.store.fail_next_update().await;

        let result = h
            .service
            .add_item(ALICE, order.id(), ProductId::new(8), 3)
            .await;

        assert!(matches!(
            result,
            Err(OrderFlowError::Store(StoreError::Unavailable(_)))
        ));
        assert_eq!(h.products.stock(ProductId::new(8)), Some(5));
        let last = h.products.adjustments().pop().unwrap();
        assert_eq!(
            last,
            vec![StockDelta::new(ProductId::new(8), 3, StockDirection::Release)]
        );
        let stored = h.store.get_order(order.id()).await.unwrap().unwrap();
        assert_eq!(stored.item_count(), 1);
    }

    #[tokio::test]
    async fn quantity_increase_reserves_only_the_difference() {
        let h = harness();
        let order = created_order(&h).await;
        let item_id = order.items().next().unwrap().id;

        let item = h
            .service
            .update_item_quantity(ALICE, item_id, 5)
            .await
            .unwrap();

        assert_eq!(item.quantity, 5);
        assert_eq!(h.products.stock(ProductId::new(7)), Some(0));
        let last = h.products.adjustments().pop().unwrap();
        assert_eq!(
            last,
            vec![StockDelta::new(ProductId::new(7), 3, StockDirection::Reserve)]
        );
    }

    #[tokio::test]
    async fn quantity_decrease_releases_the_difference() {
        let h = harness();
        let order = created_order(&h).await;
        let item_id = order.items().next().unwrap().id;

        let item = h
            .service
            .update_item_quantity(ALICE, item_id, 1)
            .await
            .unwrap();

        assert_eq!(item.quantity, 1);
        assert_eq!(h.products.stock(ProductId::new(7)), Some(4));
        let last = h.products.adjustments().pop().unwrap();
        assert_eq!(
            last,
            vec![StockDelta::new(ProductId::new(7), 1, StockDirection::Release)]
        );
    }

    #[tokio::test]
    async fn unchanged_quantity_makes_no_remote_call() {
        let h = harness();
        let order = created_order(&h).await;
        let item_id = order.items().next().unwrap().id;
        let calls_before = h.products.call_count();

        let item = h
            .service
            .update_item_quantity(ALICE, item_id, 2)
            .await
            .unwrap();

        assert_eq!(item.quantity, 2);
        assert_eq!(h.products.call_count(), calls_before);
    }

    #[tokio::test]
    async fn zero_quantity_update_is_invalid_input() {
        let h = harness();
        let order = created_order(&h).await;
        let item_id = order.items().next().unwrap().id;

        let result = h.service.update_item_quantity(ALICE, item_id, 0).await;
        assert!(matches!(result, Err(OrderFlowError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn unknown_item_is_not_found() {
        let h = harness();
        created_order(&h).await;

        let result = h
            .service
            .update_item_quantity(ALICE, OrderItemId::new(99), 3)
            .await;
        assert!(matches!(result, Err(OrderFlowError::ItemNotFound(_))));
    }

    #[tokio::test]
    async fn remove_item_releases_the_full_quantity() {
        let h = harness();
        let order = created_order(&h).await;
        let item_id = order.items().next().unwrap().id;

        h.service.remove_item(ALICE, item_id).await.unwrap();

        assert_eq!(h.products.stock(ProductId::new(7)), Some(5));
        let stored = h.store.get_order(order.id()).await.unwrap().unwrap();
        assert_eq!(stored.item_count(), 0);
    }

    #[tokio::test]
    async fn remove_item_persistence_failure_reapplies_the_reservation() {
        let h = harness();
        let order = created_order(&h).await;
        let item_id = order.items().next().unwrap().id;
        h.store.fail_next_update().await;

        let result = h.service.remove_item(ALICE, item_id).await;

        assert!(matches!(result, Err(OrderFlowError::Store(_))));
        assert_eq!(h.products.stock(ProductId::new(7)), Some(3));
        let stored = h.store.get_order(order.id()).await.unwrap().unwrap();
        assert_eq!(stored.item_count(), 1);
    }
}

mod completion {
    use super::*;

    fn widget_details() -> ProductDetails {
        ProductDetails {
            id: ProductId::new(7),
            name: "Widget".to_string(),
            description: Some("A widget".to_string()),
            price_cents: Some(1999),
        }
    }

    #[tokio::test]
    async fn completing_writes_exactly_one_unprocessed_event() {
        let h = harness();
        let order = created_order(&h).await;
        h.products.set_details(widget_details());

        let completed = h
            .service
            .change_status(ALICE, order.id(), OrderStatus::Completed)
            .await
            .unwrap();
        assert_eq!(completed.status(), OrderStatus::Completed);

        let stored = h.store.get_order(order.id()).await.unwrap().unwrap();
        assert_eq!(stored.status(), OrderStatus::Completed);

        let events = h.store.dispatchable_events(5).await.unwrap();
        assert_eq!(events.len(), 1);
        let event = &events[0];
        assert!(!event.processed);
        assert_eq!(event.retry_count, 0);
        assert_eq!(event.exchange, "email-exchange");
        assert_eq!(event.routing_key, "user.pdf");

        let notice: CompletedOrderNotice =
            serde_json::from_value(event.payload.clone()).unwrap();
        assert_eq!(notice.order_id, order.id());
        assert_eq!(notice.recipient, "alice@example.com");
        assert_eq!(notice.lines.len(), 1);
        assert_eq!(notice.lines[0].name, "Widget");
        assert_eq!(notice.lines[0].quantity, 2);
    }

    #[tokio::test]
    async fn failing_product_lookups_drop_lines_but_not_the_completion() {
        let h = harness();
        h.products.set_stock(ProductId::new(7), 5);
        h.products.set_stock(ProductId::new(8), 5);
        let order = h
            .service
            .create_order(request(vec![(7, 2), (8, 1)]))
            .await
            .unwrap()
            .order;
        h.products.set_details(widget_details());
        // No details for product 8.

        h.service
            .change_status(ALICE, order.id(), OrderStatus::Completed)
            .await
            .unwrap();

        let events = h.store.dispatchable_events(5).await.unwrap();
        let notice: CompletedOrderNotice =
            serde_json::from_value(events[0].payload.clone()).unwrap();
        assert_eq!(notice.lines.len(), 1);
        assert_eq!(notice.lines[0].product_id, ProductId::new(7));
    }

    #[tokio::test]
    async fn a_completed_order_rejects_further_transitions() {
        let h = harness();
        let order = created_order(&h).await;
        h.products.set_details(widget_details());

        h.service
            .change_status(ALICE, order.id(), OrderStatus::Completed)
            .await
            .unwrap();
        let result = h
            .service
            .change_status(ALICE, order.id(), OrderStatus::Cancelled)
            .await;

        assert!(matches!(result, Err(OrderFlowError::InvalidState(_))));
        assert_eq!(h.store.event_count().await, 1);
    }

    #[tokio::test]
    async fn completion_failure_leaves_the_order_pending_and_the_outbox_empty() {
        let h = harness();
        let order = created_order(&h).await;
        h.products.set_details(widget_details());
        h.store.fail_next_complete().await;

        let result = h
            .service
            .change_status(ALICE, order.id(), OrderStatus::Completed)
            .await;

        assert!(matches!(result, Err(OrderFlowError::Store(_))));
        let stored = h.store.get_order(order.id()).await.unwrap().unwrap();
        assert_eq!(stored.status(), OrderStatus::Pending);
        assert_eq!(h.store.event_count().await, 0);
    }

    #[tokio::test]
    async fn cancelling_writes_no_event_and_freezes_items() {
        let h = harness();
        let order = created_order(&h).await;

        let cancelled = h
            .service
            .change_status(ALICE, order.id(), OrderStatus::Cancelled)
            .await
            .unwrap();
        assert_eq!(cancelled.status(), OrderStatus::Cancelled);
        assert_eq!(h.store.event_count().await, 0);

        let result = h
            .service
            .add_item(ALICE, order.id(), ProductId::new(8), 1)
            .await;
        assert!(matches!(result, Err(OrderFlowError::InvalidState(_))));
    }

    #[tokio::test]
    async fn only_the_owner_may_change_the_status() {
        let h = harness();
        let order = created_order(&h).await;

        let result = h
            .service
            .change_status(MALLORY, order.id(), OrderStatus::Completed)
            .await;
        assert!(matches!(result, Err(OrderFlowError::Forbidden { .. })));
    }
}

mod reads_and_deletion {
    use super::*;

    #[tokio::test]
    async fn unknown_order_reads_are_not_found() {
        let h = harness();

        assert!(matches!(
            h.service.get_order(OrderId::new(99)).await,
            Err(OrderFlowError::OrderNotFound(_))
        ));
        assert!(matches!(
            h.service.order_items(OrderId::new(99)).await,
            Err(OrderFlowError::OrderNotFound(_))
        ));
    }

    #[tokio::test]
    async fn listing_returns_orders_with_their_items() {
        let h = harness();
        let order = created_order(&h).await;

        let orders = h.service.list_orders().await.unwrap();
        assert_eq!(orders.len(), 1);

        let items = h.service.order_items(order.id()).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].product_id, ProductId::new(7));
    }

    #[tokio::test]
    async fn listing_for_a_user_is_scoped_to_their_orders() {
        let h = harness();
        let order = created_order(&h).await;
        h.store
            .create_order(NewOrder {
                user_id: MALLORY,
                user_email: "mallory@example.com".to_string(),
                items: vec![],
            })
            .await
            .unwrap();

        let mine = h.service.orders_for_user(ALICE).await.unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].id(), order.id());
        assert_eq!(h.service.list_orders().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn deleting_a_pending_order_releases_its_stock() {
        let h = harness();
        let order = created_order(&h).await;

        h.service.delete_order(ALICE, order.id()).await.unwrap();

        assert_eq!(h.products.stock(ProductId::new(7)), Some(5));
        assert!(h.store.get_order(order.id()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_is_forbidden_for_other_users() {
        let h = harness();
        let order = created_order(&h).await;

        let result = h.service.delete_order(MALLORY, order.id()).await;
        assert!(matches!(result, Err(OrderFlowError::Forbidden { .. })));
        assert!(h.store.get_order(order.id()).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn failed_stock_release_keeps_the_order() {
        let h = harness();
        let order = created_order(&h).await;
        h.products.set_fail_on_adjust(true);

        let result = h.service.delete_order(ALICE, order.id()).await;

        assert!(matches!(result, Err(OrderFlowError::Unavailable { .. })));
        assert!(h.store.get_order(order.id()).await.unwrap().is_some());
    }
}

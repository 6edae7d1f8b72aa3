//! PostgreSQL store implementation.
//!
//! Uses one transaction per saga step group: creating an order inserts the
//! order row and its item rows in one unit, updating cascades to the item
//! rows explicitly and only commits while the stored row is still pending,
//! and completing an order writes the status change and the outbox event
//! atomically under the same status guard.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{OrderId, OrderItemId, OutboxEventId, ProductId, UserId};
use domain::{NewOrder, NewOutboxEvent, Order, OrderItem, OrderStatus, OutboxEvent};
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};

use crate::error::{Result, StoreError};
use crate::order::OrderStore;
use crate::outbox::OutboxStore;

/// PostgreSQL-backed order and outbox store.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        tracing::info!("running database migrations");
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }

    fn row_to_item(row: PgRow) -> Result<OrderItem> {
        Ok(OrderItem {
            id: OrderItemId::new(row.try_get("id")?),
            product_id: ProductId::new(row.try_get("product_id")?),
            quantity: row.try_get::<i32, _>("quantity")? as u32,
        })
    }

    fn row_to_event(row: PgRow) -> Result<OutboxEvent> {
        Ok(OutboxEvent {
            id: OutboxEventId::new(row.try_get("id")?),
            event_type: row.try_get("event_type")?,
            payload: row.try_get("payload")?,
            exchange: row.try_get("exchange")?,
            routing_key: row.try_get("routing_key")?,
            created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
            processed: row.try_get("processed")?,
            retry_count: row.try_get::<i32, _>("retry_count")? as u32,
        })
    }

    fn order_from_rows(order_row: &PgRow, item_rows: Vec<PgRow>) -> Result<Order> {
        let status_raw: String = order_row.try_get("status")?;
        let status = OrderStatus::parse(&status_raw).ok_or_else(|| {
            StoreError::Database(sqlx::Error::Decode(
                format!("unknown order status {status_raw}").into(),
            ))
        })?;
        let items = item_rows
            .into_iter()
            .map(Self::row_to_item)
            .collect::<Result<Vec<_>>>()?;
        Ok(Order::from_parts(
            OrderId::new(order_row.try_get("id")?),
            UserId::new(order_row.try_get("user_id")?),
            order_row.try_get::<String, _>("user_email")?,
            status,
            items,
        ))
    }

    async fn items_for_order(&self, order_id: OrderId) -> Result<Vec<PgRow>> {
        Ok(sqlx::query(
            "SELECT id, product_id, quantity FROM order_items WHERE order_id = $1 ORDER BY id",
        )
        .bind(order_id.as_i64())
        .fetch_all(&self.pool)
        .await?)
    }

    async fn hydrate_orders(&self, order_rows: Vec<PgRow>) -> Result<Vec<Order>> {
        let mut orders = Vec::with_capacity(order_rows.len());
        for row in order_rows {
            let id = OrderId::new(row.try_get("id")?);
            let items = self.items_for_order(id).await?;
            orders.push(Self::order_from_rows(&row, items)?);
        }
        Ok(orders)
    }

    async fn insert_event_tx(
        tx: &mut Transaction<'_, Postgres>,
        event: &NewOutboxEvent,
    ) -> Result<OutboxEvent> {
        let row = sqlx::query(
            r#"
            INSERT INTO outbox_events (event_type, payload, exchange, routing_key)
            VALUES ($1, $2, $3, $4)
            RETURNING id, event_type, payload, exchange, routing_key,
                      created_at, processed, retry_count
            "#,
        )
        .bind(&event.event_type)
        .bind(&event.payload)
        .bind(&event.exchange)
        .bind(&event.routing_key)
        .fetch_one(&mut **tx)
        .await?;
        Self::row_to_event(row)
    }
}

#[async_trait]
impl OrderStore for PostgresStore {
    async fn create_order(&self, new_order: NewOrder) -> Result<Order> {
        let mut tx = self.pool.begin().await?;

        let order_id: i64 = sqlx::query_scalar(
            "INSERT INTO orders (user_id, user_email, status) VALUES ($1, $2, $3) RETURNING id",
        )
        .bind(new_order.user_id.as_i64())
        .bind(&new_order.user_email)
        .bind(OrderStatus::Pending.as_str())
        .fetch_one(&mut *tx)
        .await?;

        let mut items = Vec::with_capacity(new_order.items.len());
        for item in &new_order.items {
            let item_id: i64 = sqlx::query_scalar(
                "INSERT INTO order_items (order_id, product_id, quantity) VALUES ($1, $2, $3) RETURNING id",
            )
            .bind(order_id)
            .bind(item.product_id.as_i64())
            .bind(item.quantity as i32)
            .fetch_one(&mut *tx)
            .await?;
            items.push(OrderItem {
                id: OrderItemId::new(item_id),
                product_id: item.product_id,
                quantity: item.quantity,
            });
        }

        tx.commit().await?;
        Ok(Order::from_parts(
            OrderId::new(order_id),
            new_order.user_id,
            new_order.user_email,
            OrderStatus::Pending,
            items,
        ))
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>> {
        let order_row = sqlx::query(
            "SELECT id, user_id, user_email, status FROM orders WHERE id = $1",
        )
        .bind(id.as_i64())
        .fetch_optional(&self.pool)
        .await?;

        match order_row {
            Some(row) => {
                let items = self.items_for_order(id).await?;
                Ok(Some(Self::order_from_rows(&row, items)?))
            }
            None => Ok(None),
        }
    }

    async fn list_orders(&self) -> Result<Vec<Order>> {
        let order_rows =
            sqlx::query("SELECT id, user_id, user_email, status FROM orders ORDER BY id")
                .fetch_all(&self.pool)
                .await?;
        self.hydrate_orders(order_rows).await
    }

    async fn orders_for_user(&self, user_id: UserId) -> Result<Vec<Order>> {
        let order_rows = sqlx::query(
            "SELECT id, user_id, user_email, status FROM orders WHERE user_id = $1 ORDER BY id",
        )
        .bind(user_id.as_i64())
        .fetch_all(&self.pool)
        .await?;
        self.hydrate_orders(order_rows).await
    }

    async fn update_order(&self, order: &Order) -> Result<Order> {
        let mut tx = self.pool.begin().await?;

        // Guarded on the stored status: a stale aggregate loaded before a
        // concurrent completion must not overwrite the completed order.
        let updated = sqlx::query("UPDATE orders SET status = $2 WHERE id = $1 AND status = $3")
            .bind(order.id().as_i64())
            .bind(order.status().as_str())
            .bind(OrderStatus::Pending.as_str())
            .execute(&mut *tx)
            .await?;
        if updated.rows_affected() == 0 {
            let exists: Option<i64> = sqlx::query_scalar("SELECT id FROM orders WHERE id = $1")
                .bind(order.id().as_i64())
                .fetch_optional(&mut *tx)
                .await?;
            return Err(match exists {
                Some(_) => StoreError::StatusConflict {
                    order_id: order.id(),
                },
                None => StoreError::OrderNotFound(order.id()),
            });
        }

        // Explicit cascade: drop rows no longer present in the aggregate,
        // update surviving rows, insert the not-yet-persisted ones.
        let kept_ids: Vec<i64> = order
            .items()
            .filter(|i| i.is_persisted())
            .map(|i| i.id.as_i64())
            .collect();
        sqlx::query("DELETE FROM order_items WHERE order_id = $1 AND NOT (id = ANY($2))")
            .bind(order.id().as_i64())
            .bind(&kept_ids)
            .execute(&mut *tx)
            .await?;

        let mut items = Vec::with_capacity(order.item_count());
        for item in order.items() {
            if item.is_persisted() {
                sqlx::query("UPDATE order_items SET quantity = $2 WHERE id = $1")
                    .bind(item.id.as_i64())
                    .bind(item.quantity as i32)
                    .execute(&mut *tx)
                    .await?;
                items.push(item.clone());
            } else {
                let item_id: i64 = sqlx::query_scalar(
                    "INSERT INTO order_items (order_id, product_id, quantity) VALUES ($1, $2, $3) RETURNING id",
                )
                .bind(order.id().as_i64())
                .bind(item.product_id.as_i64())
                .bind(item.quantity as i32)
                .fetch_one(&mut *tx)
                .await?;
                items.push(OrderItem {
                    id: OrderItemId::new(item_id),
                    product_id: item.product_id,
                    quantity: item.quantity,
                });
            }
        }

        tx.commit().await?;
        Ok(Order::from_parts(
            order.id(),
            order.user_id(),
            order.user_email(),
            order.status(),
            items,
        ))
    }

    async fn delete_order(&self, id: OrderId) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM order_items WHERE order_id = $1")
            .bind(id.as_i64())
            .execute(&mut *tx)
            .await?;
        let deleted = sqlx::query("DELETE FROM orders WHERE id = $1")
            .bind(id.as_i64())
            .execute(&mut *tx)
            .await?;
        if deleted.rows_affected() == 0 {
            return Err(StoreError::OrderNotFound(id));
        }

        tx.commit().await?;
        Ok(())
    }

    async fn find_order_by_item(&self, item_id: OrderItemId) -> Result<Option<Order>> {
        let order_id: Option<i64> =
            sqlx::query_scalar("SELECT order_id FROM order_items WHERE id = $1")
                .bind(item_id.as_i64())
                .fetch_optional(&self.pool)
                .await?;

        match order_id {
            Some(id) => self.get_order(OrderId::new(id)).await,
            None => Ok(None),
        }
    }

    async fn complete_order(&self, order: &Order, event: NewOutboxEvent) -> Result<OutboxEvent> {
        let mut tx = self.pool.begin().await?;

        // Status guard on the order row makes the pending check and the
        // status write effectively atomic per order id.
        let updated = sqlx::query("UPDATE orders SET status = $2 WHERE id = $1 AND status = $3")
            .bind(order.id().as_i64())
            .bind(order.status().as_str())
            .bind(OrderStatus::Pending.as_str())
            .execute(&mut *tx)
            .await?;
        if updated.rows_affected() == 0 {
            let exists: Option<i64> = sqlx::query_scalar("SELECT id FROM orders WHERE id = $1")
                .bind(order.id().as_i64())
                .fetch_optional(&mut *tx)
                .await?;
            return Err(match exists {
                Some(_) => StoreError::StatusConflict {
                    order_id: order.id(),
                },
                None => StoreError::OrderNotFound(order.id()),
            });
        }

        let stored = Self::insert_event_tx(&mut tx, &event).await?;
        tx.commit().await?;
        Ok(stored)
    }
}

#[async_trait]
impl OutboxStore for PostgresStore {
    async fn insert_event(&self, event: NewOutboxEvent) -> Result<OutboxEvent> {
        let mut tx = self.pool.begin().await?;
        let stored = Self::insert_event_tx(&mut tx, &event).await?;
        tx.commit().await?;
        Ok(stored)
    }

    async fn dispatchable_events(&self, max_retries: u32) -> Result<Vec<OutboxEvent>> {
        let rows = sqlx::query(
            r#"
            SELECT id, event_type, payload, exchange, routing_key,
                   created_at, processed, retry_count
            FROM outbox_events
            WHERE processed = FALSE AND retry_count < $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(max_retries as i32)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_event).collect()
    }

    async fn mark_processed(&self, id: OutboxEventId) -> Result<()> {
        let updated = sqlx::query("UPDATE outbox_events SET processed = TRUE WHERE id = $1")
            .bind(id.as_i64())
            .execute(&self.pool)
            .await?;
        if updated.rows_affected() == 0 {
            return Err(StoreError::EventNotFound(id));
        }
        Ok(())
    }

    async fn record_publish_failure(&self, id: OutboxEventId) -> Result<u32> {
        let retry_count: Option<i32> = sqlx::query_scalar(
            "UPDATE outbox_events SET retry_count = retry_count + 1 WHERE id = $1 RETURNING retry_count",
        )
        .bind(id.as_i64())
        .fetch_optional(&self.pool)
        .await?;

        retry_count
            .map(|count| count as u32)
            .ok_or(StoreError::EventNotFound(id))
    }

    async fn get_event(&self, id: OutboxEventId) -> Result<Option<OutboxEvent>> {
        let row = sqlx::query(
            r#"
            SELECT id, event_type, payload, exchange, routing_key,
                   created_at, processed, retry_count
            FROM outbox_events
            WHERE id = $1
            "#,
        )
        .bind(id.as_i64())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_event).transpose()
    }
}

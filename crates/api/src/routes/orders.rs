//! Order and item endpoints.
//!
//! The caller's identity travels in the `x-user-id` header; the creation
//! endpoint instead takes the email in the body and resolves it through
//! the user directory.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use clients::{ProductGateway, UserDirectory};
use common::{OrderId, OrderItemId, ProductId, UserId};
use domain::{NewOrderItem, Order, OrderItem, OrderStatus};
use orders::{CreatedOrder, OrderService, ProductIssue};
use serde::{Deserialize, Serialize};
use store::OrderStore;

use crate::error::ApiError;

/// Shared application state accessible from all handlers.
pub struct AppState<S, G, U> {
    pub orders: OrderService<S, G, U>,
}

// -- Request types --

#[derive(Deserialize)]
pub struct CreateOrderRequest {
    pub email: String,
    pub items: Vec<OrderItemRequest>,
}

#[derive(Deserialize)]
pub struct OrderItemRequest {
    pub product_id: i64,
    pub quantity: u32,
}

#[derive(Deserialize)]
pub struct AddItemRequest {
    pub product_id: i64,
    pub quantity: u32,
}

#[derive(Deserialize)]
pub struct QuantityRequest {
    pub quantity: u32,
}

#[derive(Deserialize)]
pub struct StatusRequest {
    pub status: OrderStatus,
}

// -- Response types --

#[derive(Serialize)]
pub struct OrderResponse {
    pub id: i64,
    pub user_id: i64,
    pub user_email: String,
    pub status: String,
    pub items: Vec<OrderItemResponse>,
}

#[derive(Serialize)]
pub struct OrderItemResponse {
    pub id: i64,
    pub product_id: i64,
    pub quantity: u32,
}

#[derive(Serialize)]
pub struct RejectedProductResponse {
    pub product_id: i64,
    pub issue: ProductIssue,
}

#[derive(Serialize)]
pub struct CreateOrderResponse {
    pub order: OrderResponse,
    pub rejected: Vec<RejectedProductResponse>,
}

impl From<&Order> for OrderResponse {
    fn from(order: &Order) -> Self {
        Self {
            id: order.id().as_i64(),
            user_id: order.user_id().as_i64(),
            user_email: order.user_email().to_string(),
            status: order.status().to_string(),
            items: order.items().map(OrderItemResponse::from).collect(),
        }
    }
}

impl From<&OrderItem> for OrderItemResponse {
    fn from(item: &OrderItem) -> Self {
        Self {
            id: item.id.as_i64(),
            product_id: item.product_id.as_i64(),
            quantity: item.quantity,
        }
    }
}

impl From<CreatedOrder> for CreateOrderResponse {
    fn from(created: CreatedOrder) -> Self {
        Self {
            order: OrderResponse::from(&created.order),
            rejected: created
                .rejected
                .into_iter()
                .map(|r| RejectedProductResponse {
                    product_id: r.product_id.as_i64(),
                    issue: r.issue,
                })
                .collect(),
        }
    }
}

/// Reads the caller's user id from the `x-user-id` header.
fn caller(headers: &HeaderMap) -> Result<UserId, ApiError> {
    let raw = headers
        .get("x-user-id")
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| ApiError::BadRequest("missing x-user-id header".to_string()))?;
    raw.parse::<i64>()
        .map(UserId::new)
        .map_err(|_| ApiError::BadRequest(format!("invalid x-user-id header: {raw}")))
}

// -- Handlers --

/// POST /orders: run the creation saga for the requested items.
pub async fn create<S, G, U>(
    State(state): State<Arc<AppState<S, G, U>>>,
    Json(req): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<CreateOrderResponse>), ApiError>
where
    S: OrderStore + 'static,
    G: ProductGateway + 'static,
    U: UserDirectory + 'static,
{
    let created = state
        .orders
        .create_order(orders::CreateOrderRequest {
            email: req.email,
            items: req
                .items
                .into_iter()
                .map(|item| NewOrderItem {
                    product_id: ProductId::new(item.product_id),
                    quantity: item.quantity,
                })
                .collect(),
        })
        .await?;

    Ok((StatusCode::CREATED, Json(created.into())))
}

/// GET /orders: list every order with its items.
pub async fn list<S, G, U>(
    State(state): State<Arc<AppState<S, G, U>>>,
) -> Result<Json<Vec<OrderResponse>>, ApiError>
where
    S: OrderStore + 'static,
    G: ProductGateway + 'static,
    U: UserDirectory + 'static,
{
    let orders = state.orders.list_orders().await?;
    Ok(Json(orders.iter().map(OrderResponse::from).collect()))
}

/// GET /orders/user: list the caller's own orders.
pub async fn list_for_user<S, G, U>(
    State(state): State<Arc<AppState<S, G, U>>>,
    headers: HeaderMap,
) -> Result<Json<Vec<OrderResponse>>, ApiError>
where
    S: OrderStore + 'static,
    G: ProductGateway + 'static,
    U: UserDirectory + 'static,
{
    let caller = caller(&headers)?;
    let orders = state.orders.orders_for_user(caller).await?;
    Ok(Json(orders.iter().map(OrderResponse::from).collect()))
}

/// GET /orders/:id: load one order.
pub async fn get<S, G, U>(
    State(state): State<Arc<AppState<S, G, U>>>,
    Path(id): Path<i64>,
) -> Result<Json<OrderResponse>, ApiError>
where
    S: OrderStore + 'static,
    G: ProductGateway + 'static,
    U: UserDirectory + 'static,
{
    let order = state.orders.get_order(OrderId::new(id)).await?;
    Ok(Json(OrderResponse::from(&order)))
}

/// DELETE /orders/:id: delete an order, releasing any held stock.
pub async fn remove<S, G, U>(
    State(state): State<Arc<AppState<S, G, U>>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError>
where
    S: OrderStore + 'static,
    G: ProductGateway + 'static,
    U: UserDirectory + 'static,
{
    let caller = caller(&headers)?;
    state.orders.delete_order(caller, OrderId::new(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// PUT /orders/:id/status: move an order to a new status.
pub async fn change_status<S, G, U>(
    State(state): State<Arc<AppState<S, G, U>>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(req): Json<StatusRequest>,
) -> Result<Json<OrderResponse>, ApiError>
where
    S: OrderStore + 'static,
    G: ProductGateway + 'static,
    U: UserDirectory + 'static,
{
    let caller = caller(&headers)?;
    let order = state
        .orders
        .change_status(caller, OrderId::new(id), req.status)
        .await?;
    Ok(Json(OrderResponse::from(&order)))
}

/// GET /orders/:id/items: list the line items of one order.
pub async fn list_items<S, G, U>(
    State(state): State<Arc<AppState<S, G, U>>>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<OrderItemResponse>>, ApiError>
where
    S: OrderStore + 'static,
    G: ProductGateway + 'static,
    U: UserDirectory + 'static,
{
    let items = state.orders.order_items(OrderId::new(id)).await?;
    Ok(Json(items.iter().map(OrderItemResponse::from).collect()))
}

/// POST /orders/:id/items: add a line item to a pending order.
pub async fn add_item<S, G, U>(
    State(state): State<Arc<AppState<S, G, U>>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(req): Json<AddItemRequest>,
) -> Result<(StatusCode, Json<OrderItemResponse>), ApiError>
where
    S: OrderStore + 'static,
    G: ProductGateway + 'static,
    U: UserDirectory + 'static,
{
    let caller = caller(&headers)?;
    let item = state
        .orders
        .add_item(
            caller,
            OrderId::new(id),
            ProductId::new(req.product_id),
            req.quantity,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(OrderItemResponse::from(&item))))
}

/// PUT /items/:id: change the quantity of a line item.
pub async fn update_item<S, G, U>(
    State(state): State<Arc<AppState<S, G, U>>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(req): Json<QuantityRequest>,
) -> Result<Json<OrderItemResponse>, ApiError>
where
    S: OrderStore + 'static,
    G: ProductGateway + 'static,
    U: UserDirectory + 'static,
{
    let caller = caller(&headers)?;
    let item = state
        .orders
        .update_item_quantity(caller, OrderItemId::new(id), req.quantity)
        .await?;
    Ok(Json(OrderItemResponse::from(&item)))
}

/// DELETE /items/:id: remove a line item, releasing its stock.
pub async fn remove_item<S, G, U>(
    State(state): State<Arc<AppState<S, G, U>>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError>
where
    S: OrderStore + 'static,
    G: ProductGateway + 'static,
    U: UserDirectory + 'static,
{
    let caller = caller(&headers)?;
    state
        .orders
        .remove_item(caller, OrderItemId::new(id))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

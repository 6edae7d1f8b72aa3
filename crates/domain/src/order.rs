//! The order aggregate and its line items.

use common::{OrderId, OrderItemId, ProductId, UserId};
use serde::{Deserialize, Serialize};

use crate::error::OrderError;

/// Lifecycle status of an order.
///
/// Only the `Pending -> Completed` transition carries a side effect (the
/// completion notice written to the outbox); a completed order is immutable
/// afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Order accepts item mutations.
    #[default]
    Pending,

    /// Terminal state, immutable except for historical reads.
    Completed,

    /// Order was abandoned before completion.
    Cancelled,
}

impl OrderStatus {
    /// Returns true if line items may still be added, changed or removed.
    pub fn can_modify_items(&self) -> bool {
        matches!(self, OrderStatus::Pending)
    }

    /// Returns the status name as stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::Completed => "COMPLETED",
            OrderStatus::Cancelled => "CANCELLED",
        }
    }

    /// Parses a status from its database representation.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "PENDING" => Some(OrderStatus::Pending),
            "COMPLETED" => Some(OrderStatus::Completed),
            "CANCELLED" => Some(OrderStatus::Cancelled),
            _ => None,
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A line item owned by exactly one order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    /// Store-assigned identity.
    pub id: OrderItemId,
    /// The product this line refers to.
    pub product_id: ProductId,
    /// Ordered quantity, always greater than zero.
    pub quantity: u32,
}

impl OrderItem {
    /// An item that has not been persisted yet.
    ///
    /// Carries the placeholder id `0` until the store assigns the real
    /// identity on save.
    pub fn pending(product_id: ProductId, quantity: u32) -> Self {
        Self {
            id: OrderItemId::new(0),
            product_id,
            quantity,
        }
    }

    /// Returns true once the store has assigned an identity.
    pub fn is_persisted(&self) -> bool {
        self.id.as_i64() != 0
    }
}

/// An item requested for a not-yet-persisted order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOrderItem {
    pub product_id: ProductId,
    pub quantity: u32,
}

/// An order as handed to the store for identity assignment.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub user_id: UserId,
    pub user_email: String,
    pub items: Vec<NewOrderItem>,
}

/// The order aggregate.
///
/// Exclusively owns its items: persistence and deletion of the order
/// cascade to the item sequence explicitly, there is no shared reference
/// to an item from outside the aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    id: OrderId,
    user_id: UserId,
    user_email: String,
    status: OrderStatus,
    items: Vec<OrderItem>,
}

impl Order {
    /// Reassembles an order from persisted parts.
    pub fn from_parts(
        id: OrderId,
        user_id: UserId,
        user_email: impl Into<String>,
        status: OrderStatus,
        items: Vec<OrderItem>,
    ) -> Self {
        Self {
            id,
            user_id,
            user_email: user_email.into(),
            status,
            items,
        }
    }

    pub fn id(&self) -> OrderId {
        self.id
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    /// Email of the owning user, used as recipient of the completion notice.
    pub fn user_email(&self) -> &str {
        &self.user_email
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    /// Iterates over the owned line items.
    pub fn items(&self) -> impl Iterator<Item = &OrderItem> {
        self.items.iter()
    }

    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    /// Looks up an item by its identity.
    pub fn item(&self, item_id: OrderItemId) -> Option<&OrderItem> {
        self.items.iter().find(|i| i.id == item_id)
    }

    /// Looks up an item by the product it refers to.
    pub fn item_for_product(&self, product_id: ProductId) -> Option<&OrderItem> {
        self.items.iter().find(|i| i.product_id == product_id)
    }

    /// Returns true if the given user owns this order.
    pub fn is_owned_by(&self, user_id: UserId) -> bool {
        self.user_id == user_id
    }

    fn ensure_mutable(&self) -> Result<(), OrderError> {
        if !self.status.can_modify_items() {
            return Err(OrderError::NotPending {
                status: self.status,
            });
        }
        Ok(())
    }

    /// Adds a line item to a pending order.
    ///
    /// Rejects duplicate products and non-positive quantities.
    pub fn add_item(&mut self, item: OrderItem) -> Result<(), OrderError> {
        self.ensure_mutable()?;
        if item.quantity == 0 {
            return Err(OrderError::InvalidQuantity { quantity: 0 });
        }
        if self.item_for_product(item.product_id).is_some() {
            return Err(OrderError::DuplicateProduct(item.product_id));
        }
        self.items.push(item);
        Ok(())
    }

    /// Changes the quantity of an existing item on a pending order.
    pub fn set_item_quantity(
        &mut self,
        item_id: OrderItemId,
        quantity: u32,
    ) -> Result<(), OrderError> {
        self.ensure_mutable()?;
        if quantity == 0 {
            return Err(OrderError::InvalidQuantity { quantity: 0 });
        }
        let item = self
            .items
            .iter_mut()
            .find(|i| i.id == item_id)
            .ok_or(OrderError::ItemNotFound(item_id))?;
        item.quantity = quantity;
        Ok(())
    }

    /// Removes an item from a pending order, returning it.
    pub fn remove_item(&mut self, item_id: OrderItemId) -> Result<OrderItem, OrderError> {
        self.ensure_mutable()?;
        let position = self
            .items
            .iter()
            .position(|i| i.id == item_id)
            .ok_or(OrderError::ItemNotFound(item_id))?;
        Ok(self.items.remove(position))
    }

    /// Moves the order to a new status.
    ///
    /// A completed order is immutable; every other transition is allowed by
    /// the status field itself.
    pub fn set_status(&mut self, status: OrderStatus) -> Result<(), OrderError> {
        if self.status == OrderStatus::Completed {
            return Err(OrderError::AlreadyCompleted);
        }
        self.status = status;
        Ok(())
    }
}

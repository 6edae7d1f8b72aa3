//! Transport contract for the remote product/inventory service.

use std::collections::HashMap;

use async_trait::async_trait;
use common::ProductId;
use serde::{Deserialize, Serialize};

use crate::error::ClientError;

/// Direction of a stock adjustment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StockDirection {
    /// Take stock out of the product service (order creation, item add).
    Reserve,
    /// Put stock back (compensation, quantity decrease, item delete).
    Release,
}

impl StockDirection {
    /// Sign applied to quantities sent to the product service.
    pub fn sign(&self) -> i64 {
        match self {
            StockDirection::Reserve => -1,
            StockDirection::Release => 1,
        }
    }
}

/// A signed per-product stock delta.
///
/// Negative quantities reserve stock, positive quantities release it. A
/// batch of deltas is applied atomically by the product service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockDelta {
    pub product_id: ProductId,
    pub quantity: i64,
}

impl StockDelta {
    /// Builds a delta for `quantity` units in the given direction.
    pub fn new(product_id: ProductId, quantity: u32, direction: StockDirection) -> Self {
        Self {
            product_id,
            quantity: direction.sign() * i64::from(quantity),
        }
    }

    /// The delta that exactly undoes this one.
    pub fn inverse(&self) -> Self {
        Self {
            product_id: self.product_id,
            quantity: -self.quantity,
        }
    }
}

/// Descriptive product fields used to enrich completion notices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductDetails {
    pub id: ProductId,
    pub name: String,
    pub description: Option<String>,
    pub price_cents: Option<i64>,
}

/// Raw transport to the product service.
///
/// Implementations only translate calls to the wire; retries, circuit
/// breaking and rate limiting live in
/// [`InventoryClient`](crate::InventoryClient).
#[async_trait]
pub trait ProductGateway: Send + Sync {
    /// Returns the available quantity per product for every product the
    /// service knows about. Unknown products are absent from the result.
    async fn check_availability(
        &self,
        wanted: &[(ProductId, u32)],
    ) -> Result<HashMap<ProductId, u32>, ClientError>;

    /// Applies the given stock deltas atomically.
    async fn adjust_stock(&self, deltas: &[StockDelta]) -> Result<(), ClientError>;

    /// Fetches descriptive fields for a single product.
    async fn product_details(&self, product_id: ProductId) -> Result<ProductDetails, ClientError>;
}

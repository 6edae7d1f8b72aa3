//! In-memory collaborator doubles with failure injection, used by tests
//! across the workspace.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use common::{ProductId, UserId};

use crate::error::ClientError;
use crate::product::{ProductDetails, ProductGateway, StockDelta};
use crate::user::UserDirectory;

#[derive(Debug, Default)]
struct ProductState {
    stock: HashMap<ProductId, i64>,
    details: HashMap<ProductId, ProductDetails>,
    adjustments: Vec<Vec<StockDelta>>,
    transient_failures: u32,
    fail_on_adjust: bool,
    fail_details_for: Vec<ProductId>,
    check_calls: u32,
    adjust_calls: u32,
    detail_calls: u32,
}

/// In-memory stand-in for the remote product service.
///
/// Holds per-product stock, applies signed deltas atomically and records
/// every adjustment batch so tests can assert the exact calls made.
#[derive(Debug, Clone, Default)]
pub struct InMemoryProductService {
    state: Arc<RwLock<ProductState>>,
}

impl InMemoryProductService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds available stock for a product.
    pub fn set_stock(&self, product_id: ProductId, quantity: i64) {
        self.state.write().unwrap().stock.insert(product_id, quantity);
    }

    /// Seeds descriptive fields for a product.
    pub fn set_details(&self, details: ProductDetails) {
        self.state
            .write()
            .unwrap()
            .details
            .insert(details.id, details);
    }

    /// Makes the next `count` calls fail with a transport error.
    pub fn fail_next_calls(&self, count: u32) {
        self.state.write().unwrap().transient_failures = count;
    }

    /// Makes every stock adjustment fail with a transport error.
    pub fn set_fail_on_adjust(&self, fail: bool) {
        self.state.write().unwrap().fail_on_adjust = fail;
    }

    /// Makes detail lookups for the given product answer 404.
    pub fn fail_details_for(&self, product_id: ProductId) {
        self.state
            .write()
            .unwrap()
            .fail_details_for
            .push(product_id);
    }

    /// Current stock level for a product.
    pub fn stock(&self, product_id: ProductId) -> Option<i64> {
        self.state.read().unwrap().stock.get(&product_id).copied()
    }

    /// Every adjustment batch applied so far, in call order.
    pub fn adjustments(&self) -> Vec<Vec<StockDelta>> {
        self.state.read().unwrap().adjustments.clone()
    }

    /// Total calls that reached the service, across all operations.
    pub fn call_count(&self) -> u32 {
        let state = self.state.read().unwrap();
        state.check_calls + state.adjust_calls + state.detail_calls
    }

    fn take_transient_failure(state: &mut ProductState) -> Result<(), ClientError> {
        if state.transient_failures > 0 {
            state.transient_failures -= 1;
            return Err(ClientError::Transport("injected failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl ProductGateway for InMemoryProductService {
    async fn check_availability(
        &self,
        wanted: &[(ProductId, u32)],
    ) -> Result<HashMap<ProductId, u32>, ClientError> {
        let mut state = self.state.write().unwrap();
        state.check_calls += 1;
        Self::take_transient_failure(&mut state)?;

        let mut available = HashMap::new();
        for (product_id, _) in wanted {
            if let Some(&quantity) = state.stock.get(product_id) {
                available.insert(*product_id, quantity.max(0) as u32);
            }
        }
        Ok(available)
    }

    async fn adjust_stock(&self, deltas: &[StockDelta]) -> Result<(), ClientError> {
        let mut state = self.state.write().unwrap();
        state.adjust_calls += 1;
        Self::take_transient_failure(&mut state)?;

        if state.fail_on_adjust {
            return Err(ClientError::Transport("injected adjust failure".to_string()));
        }

        for delta in deltas {
            *state.stock.entry(delta.product_id).or_insert(0) += delta.quantity;
        }
        state.adjustments.push(deltas.to_vec());
        Ok(())
    }

    async fn product_details(&self, product_id: ProductId) -> Result<ProductDetails, ClientError> {
        let mut state = self.state.write().unwrap();
        state.detail_calls += 1;
        Self::take_transient_failure(&mut state)?;

        if state.fail_details_for.contains(&product_id) {
            return Err(ClientError::ProductNotFound(product_id));
        }
        state
            .details
            .get(&product_id)
            .cloned()
            .ok_or(ClientError::ProductNotFound(product_id))
    }
}

#[derive(Debug, Default)]
struct UserState {
    users: HashMap<String, UserId>,
    fail: bool,
}

/// In-memory stand-in for the remote user directory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryUserDirectory {
    state: Arc<RwLock<UserState>>,
}

impl InMemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an email → user id mapping.
    pub fn add_user(&self, email: impl Into<String>, user_id: UserId) {
        self.state.write().unwrap().users.insert(email.into(), user_id);
    }

    /// Makes every lookup fail as unavailable.
    pub fn set_fail(&self, fail: bool) {
        self.state.write().unwrap().fail = fail;
    }
}

#[async_trait]
impl UserDirectory for InMemoryUserDirectory {
    async fn find_user_id(&self, email: &str) -> Result<UserId, ClientError> {
        let state = self.state.read().unwrap();
        if state.fail {
            return Err(ClientError::Unavailable(
                "user directory unreachable".to_string(),
            ));
        }
        state
            .users
            .get(email)
            .copied()
            .ok_or_else(|| ClientError::UserNotFound(email.to_string()))
    }
}

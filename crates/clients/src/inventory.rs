//! Resilient client for the remote product/inventory service.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Mutex;

use common::ProductId;

use crate::error::ClientError;
use crate::product::{ProductDetails, ProductGateway, StockDelta};
use crate::resilience::{CircuitBreaker, RateLimiter, ResilienceConfig};

/// Wraps a [`ProductGateway`] transport in retry, circuit-breaker and
/// rate-limiter policies.
///
/// Policy state (failure window, token bucket) is owned by this instance
/// and shared across all callers of the same remote dependency. When a
/// policy exhausts, the operation surfaces as [`ClientError::Unavailable`];
/// callers must not assume any stock was adjusted in that case.
pub struct InventoryClient<G> {
    gateway: G,
    config: ResilienceConfig,
    breaker: Mutex<CircuitBreaker>,
    limiter: Mutex<RateLimiter>,
}

impl<G: ProductGateway> InventoryClient<G> {
    pub fn new(gateway: G, config: ResilienceConfig) -> Self {
        let breaker = Mutex::new(CircuitBreaker::new(config.circuit_breaker.clone()));
        let limiter = Mutex::new(RateLimiter::new(config.rate_limiter.clone()));
        Self {
            gateway,
            config,
            breaker,
            limiter,
        }
    }

    /// Checks available quantities for the wanted products.
    ///
    /// Products unknown to the remote service are absent from the result.
    pub async fn check_availability(
        &self,
        wanted: &[(ProductId, u32)],
    ) -> Result<HashMap<ProductId, u32>, ClientError> {
        self.execute("check_availability", || {
            self.gateway.check_availability(wanted)
        })
        .await
    }

    /// Applies signed stock deltas; negative reserves, positive releases.
    pub async fn adjust_stock(&self, deltas: &[StockDelta]) -> Result<(), ClientError> {
        self.execute("adjust_stock", || self.gateway.adjust_stock(deltas))
            .await
    }

    /// Fetches descriptive fields for one product.
    pub async fn product_details(
        &self,
        product_id: ProductId,
    ) -> Result<ProductDetails, ClientError> {
        self.execute("product_details", || self.gateway.product_details(product_id))
            .await
    }

    async fn execute<T, F, Fut>(
        &self,
        operation: &'static str,
        call: F,
    ) -> Result<T, ClientError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, ClientError>>,
    {
        if !self.limiter.lock().unwrap().try_acquire() {
            metrics::counter!("inventory_rate_limited_total").increment(1);
            tracing::warn!(operation, "rate limit exceeded");
            return Err(ClientError::Unavailable(format!(
                "{operation}: rate limit exceeded"
            )));
        }

        if !self.breaker.lock().unwrap().allow_call() {
            metrics::counter!("inventory_circuit_rejections_total").increment(1);
            tracing::warn!(operation, "circuit breaker open, call rejected");
            return Err(ClientError::Unavailable(format!(
                "{operation}: circuit breaker open"
            )));
        }

        let mut last_error = ClientError::Unavailable(operation.to_string());
        for attempt in 0..self.config.retry.max_attempts {
            let delay = self.config.retry.delay_for(attempt);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            match tokio::time::timeout(self.config.call_timeout, call()).await {
                Ok(Ok(value)) => {
                    self.breaker.lock().unwrap().record_success();
                    return Ok(value);
                }
                Ok(Err(err)) if !err.is_retryable() => {
                    // Deterministic answer from the remote side (e.g. a 404);
                    // the dependency itself is healthy.
                    self.breaker.lock().unwrap().record_success();
                    return Err(err);
                }
                Ok(Err(err)) => {
                    self.breaker.lock().unwrap().record_failure();
                    tracing::warn!(operation, attempt, error = %err, "inventory call failed");
                    last_error = err;
                }
                Err(_) => {
                    self.breaker.lock().unwrap().record_failure();
                    tracing::warn!(operation, attempt, "inventory call timed out");
                    last_error = ClientError::Timeout { operation };
                }
            }
        }

        metrics::counter!("inventory_calls_exhausted_total").increment(1);
        tracing::error!(operation, error = %last_error, "inventory call exhausted retries");
        Err(ClientError::Unavailable(format!(
            "{operation} failed after {} attempts: {last_error}",
            self.config.retry.max_attempts
        )))
    }
}

//! Clients for the remote collaborators of the order service.
//!
//! The product service is reached through [`InventoryClient`], which wraps a
//! [`ProductGateway`] transport in retry, circuit-breaker and rate-limiter
//! policies. Policy state lives inside the client instance, so each remote
//! dependency carries its own counters.
//!
//! The user directory is a plain lookup with a per-call timeout; its
//! failures are deterministic (not found) or surfaced as unavailable.

pub mod error;
pub mod http;
pub mod inventory;
pub mod memory;
pub mod product;
pub mod resilience;
pub mod user;

pub use error::ClientError;
pub use http::{HttpProductGateway, HttpUserDirectory};
pub use inventory::InventoryClient;
pub use memory::{InMemoryProductService, InMemoryUserDirectory};
pub use product::{ProductDetails, ProductGateway, StockDelta, StockDirection};
pub use resilience::{
    CircuitBreaker, CircuitBreakerConfig, CircuitState, RateLimiter, RateLimiterConfig,
    ResilienceConfig, RetryPolicy,
};
pub use user::UserDirectory;

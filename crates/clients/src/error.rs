//! Client error types.

use common::ProductId;
use thiserror::Error;

/// Errors surfaced by the remote service clients.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// The user directory has no entry for the given email.
    #[error("no user found for email {0}")]
    UserNotFound(String),

    /// The product service has no entry for the given product.
    #[error("product {0} not found")]
    ProductNotFound(ProductId),

    /// The remote service could not be reached; the call may be retried.
    #[error("transport error: {0}")]
    Transport(String),

    /// The call did not complete within the configured timeout.
    #[error("call to {operation} timed out")]
    Timeout { operation: &'static str },

    /// All resilience policies are exhausted; the caller must not assume
    /// any remote side effect took place.
    #[error("service unavailable: {0}")]
    Unavailable(String),
}

impl ClientError {
    /// Returns true if retrying the call could succeed.
    ///
    /// Not-found answers are deterministic and never retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ClientError::Transport(_) | ClientError::Timeout { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transport_and_timeout_are_retryable() {
        assert!(ClientError::Transport("boom".into()).is_retryable());
        assert!(ClientError::Timeout { operation: "adjust_stock" }.is_retryable());
        assert!(!ClientError::UserNotFound("a@b.c".into()).is_retryable());
        assert!(!ClientError::ProductNotFound(ProductId::new(1)).is_retryable());
        assert!(!ClientError::Unavailable("circuit open".into()).is_retryable());
    }
}

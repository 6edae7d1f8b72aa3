use common::{OrderId, OrderItemId, ProductId, UserId};
use domain::OrderError;
use store::StoreError;
use thiserror::Error;

/// Errors surfaced by the order workflows.
#[derive(Debug, Error)]
pub enum OrderFlowError {
    #[error("order {0} not found")]
    OrderNotFound(OrderId),

    #[error("order item {0} not found")]
    ItemNotFound(OrderItemId),

    #[error("no user registered for email {0}")]
    UserNotFound(String),

    #[error("product {0} not found")]
    ProductNotFound(ProductId),

    #[error("not enough stock for product {0}")]
    InsufficientStock(ProductId),

    #[error("order {order_id} does not belong to user {user_id}")]
    Forbidden { order_id: OrderId, user_id: UserId },

    #[error("{0}")]
    InvalidState(String),

    #[error("{0}")]
    InvalidInput(String),

    #[error("{service} is unavailable: {reason}")]
    Unavailable { service: &'static str, reason: String },

    #[error("order creation failed: {source}")]
    CreationFailed {
        #[source]
        source: Box<OrderFlowError>,
    },

    #[error(transparent)]
    Store(StoreError),

    #[error("failed to encode event payload: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl OrderFlowError {
    pub(crate) fn creation_failed(source: OrderFlowError) -> Self {
        Self::CreationFailed {
            source: Box::new(source),
        }
    }

    /// Maps a failure from the user directory.
    pub(crate) fn from_user_lookup(err: clients::ClientError) -> Self {
        match err {
            clients::ClientError::UserNotFound(email) => Self::UserNotFound(email),
            other => Self::Unavailable {
                service: "user service",
                reason: other.to_string(),
            },
        }
    }

    /// Maps a failure from the product service.
    pub(crate) fn from_inventory(err: clients::ClientError) -> Self {
        match err {
            clients::ClientError::ProductNotFound(id) => Self::ProductNotFound(id),
            other => Self::Unavailable {
                service: "product service",
                reason: other.to_string(),
            },
        }
    }
}

impl From<StoreError> for OrderFlowError {
    fn from(err: StoreError) -> Self {
        match err {
            // A guarded write lost the race against a concurrent
            // completion; to the caller the order is simply no longer
            // mutable.
            StoreError::StatusConflict { order_id } => {
                Self::InvalidState(format!("order {order_id} was no longer pending"))
            }
            other => Self::Store(other),
        }
    }
}

impl From<OrderError> for OrderFlowError {
    fn from(err: OrderError) -> Self {
        match err {
            OrderError::ItemNotFound(id) => Self::ItemNotFound(id),
            OrderError::NotPending { .. } | OrderError::AlreadyCompleted => {
                Self::InvalidState(err.to_string())
            }
            OrderError::InvalidQuantity { .. } | OrderError::DuplicateProduct(_) => {
                Self::InvalidInput(err.to_string())
            }
        }
    }
}

use serde::{Deserialize, Serialize};

macro_rules! id_type {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        ///
        /// Wraps an `i64` assigned by the persistence layer so different
        /// kinds of identifiers cannot be mixed up at compile time.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            /// Creates an identifier from a raw database value.
            pub const fn new(raw: i64) -> Self {
                Self(raw)
            }

            /// Returns the underlying raw value.
            pub const fn as_i64(&self) -> i64 {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            fn from(raw: i64) -> Self {
                Self(raw)
            }
        }

        impl From<$name> for i64 {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

id_type! {
    /// Unique identifier for an order.
    OrderId
}

id_type! {
    /// Unique identifier for an order line item.
    OrderItemId
}

id_type! {
    /// Unique identifier for a user in the remote user directory.
    UserId
}

id_type! {
    /// Unique identifier for a product in the remote product service.
    ProductId
}

id_type! {
    /// Unique identifier for a durable outbox event.
    OutboxEventId
}

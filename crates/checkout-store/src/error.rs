use common::{CartId, OrderId, ProductId};
use domain::DomainError;
use thiserror::Error;

/// Errors that can occur when interacting with the checkout store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A business-rule violation caught before any write.
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// The cart does not exist or is no longer active.
    #[error("Cart not found or not active: {0}")]
    CartNotFound(CartId),

    /// The product is missing or inactive, so its price cannot be
    /// resolved.
    #[error("Product not found or inactive: {0}")]
    ProductUnavailable(ProductId),

    /// An order row vanished between write and read-back.
    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    /// A stored column holds a value the domain cannot interpret.
    #[error("Invalid stored value for {column}: {value}")]
    InvalidColumn {
        column: &'static str,
        value: String,
    },

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for checkout store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

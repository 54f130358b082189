//! Domain error types.

use common::{Money, ProductId};
use thiserror::Error;

/// Errors raised by cart and order business rules, before any write.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    /// Add operations require a positive quantity.
    #[error("Invalid quantity: {quantity} (must be greater than 0)")]
    InvalidQuantity { quantity: u32 },

    /// Customer type is required to place an order.
    #[error("customer_type is required")]
    MissingCustomerType,

    /// Payment method is required to place an order.
    #[error("payment_method is required")]
    MissingPaymentMethod,

    /// An order must contain at least one item.
    #[error("Order has no items")]
    NoItems,

    /// A submitted line total does not equal quantity × unit price.
    #[error("Line total mismatch for product {product_id}: claimed {claimed}, expected {expected}")]
    LineTotalMismatch {
        product_id: ProductId,
        claimed: Money,
        expected: Money,
    },

    /// The submitted subtotal does not equal the sum of line totals.
    #[error("Subtotal mismatch: claimed {claimed}, expected {expected}")]
    SubtotalMismatch { claimed: Money, expected: Money },

    /// The submitted discount does not match the customer-type policy.
    #[error("Discount mismatch: claimed {claimed}, expected {expected}")]
    DiscountMismatch { claimed: Money, expected: Money },

    /// The submitted grand total does not match the server-side
    /// recomputation from items and the discount policy.
    #[error("Grand total mismatch: claimed {claimed}, expected {expected}")]
    GrandTotalMismatch { claimed: Money, expected: Money },
}

//! Shared types used across the checkout system.

pub mod money;
pub mod types;

pub use money::Money;
pub use types::{CartId, GuestKey, GuestKeyError, OrderId, ProductId, UserId};

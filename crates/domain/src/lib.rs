//! Business rules for the storefront checkout core.
//!
//! Everything in this crate is pure: cart and order value types, the
//! customer-type discount policy, and the validation applied to an order
//! before anything touches the database. Persistence lives in the
//! `checkout-store` crate.

pub mod cart;
pub mod error;
pub mod order;
pub mod pricing;

pub use cart::{Cart, CartItem, CartOwner, CartStatus};
pub use error::DomainError;
pub use order::{
    BuyerInfo, CreateOrderInput, NewOrderItem, Order, OrderItem, OrderStatus, PaymentMethod,
    order_number,
};
pub use pricing::CustomerType;

pub use common::{CartId, GuestKey, Money, OrderId, ProductId, UserId};

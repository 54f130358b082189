//! Datastore interface for the checkout core.
//!
//! [`CheckoutStore`] is the single seam between business rules and
//! persistence. [`PostgresCheckoutStore`] backs production;
//! [`InMemoryCheckoutStore`] backs tests with the same semantics.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod store;

pub use error::{Result, StoreError};
pub use memory::InMemoryCheckoutStore;
pub use postgres::PostgresCheckoutStore;
pub use store::{CheckoutStore, OrderQuery, Product};

//! The `CheckoutStore` trait and its query types.

use async_trait::async_trait;
use common::{CartId, GuestKey, Money, OrderId, ProductId, UserId};
use domain::{Cart, CartOwner, CreateOrderInput, Order};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Catalog product as the checkout core sees it: enough to resolve a
/// price and snapshot identity onto an order item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub code: Option<String>,
    pub title: String,
    pub unit_price: Money,
    pub currency: String,
    pub image_path: Option<String>,
    pub is_active: bool,
}

/// Filter and pagination for order listings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderQuery {
    /// Case-insensitive substring matched against contact name, email,
    /// and phone.
    pub search: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl OrderQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn search(mut self, term: impl Into<String>) -> Self {
        self.search = Some(term.into());
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }
}

/// Persistence seam for carts and orders.
///
/// Every mutating cart operation recomputes the cart's rolled-up totals
/// in the same transaction as the item write, and returns the full
/// updated cart. `create_order` is all-or-nothing: either the complete
/// order (numbered header plus all items) exists afterwards, or nothing
/// does.
#[async_trait]
pub trait CheckoutStore: Send + Sync {
    /// Returns the owner's active cart, creating an empty one if none
    /// exists. Safe against concurrent first-add-to-cart requests for
    /// the same owner.
    async fn ensure_active_cart(&self, owner: CartOwner, currency: Option<String>) -> Result<Cart>;

    /// Returns the owner's active cart without creating one.
    async fn get_active_cart(&self, owner: CartOwner) -> Result<Option<Cart>>;

    /// Adds quantity for a product. An existing line accumulates; the
    /// unit price is the supplied one, falling back to the active
    /// catalog price. Zero quantity is a validation error.
    async fn add_item(
        &self,
        cart_id: CartId,
        product_id: ProductId,
        quantity: u32,
        unit_price: Option<Money>,
    ) -> Result<Cart>;

    /// Sets an absolute quantity for a product; zero deletes the line.
    /// A missing unit price keeps the line's captured price, or resolves
    /// the catalog price for a new line.
    async fn set_item_quantity(
        &self,
        cart_id: CartId,
        product_id: ProductId,
        quantity: u32,
        unit_price: Option<Money>,
    ) -> Result<Cart>;

    /// Deletes a product's line; succeeds even if the line is absent.
    async fn remove_item(&self, cart_id: CartId, product_id: ProductId) -> Result<Cart>;

    /// Deletes every line in the cart.
    async fn clear_cart(&self, cart_id: CartId) -> Result<Cart>;

    /// On login, folds a guest's active cart into the user's.
    ///
    /// If the user already has an active cart, each guest line is
    /// re-added to it (quantities merge additively) and the guest cart
    /// is marked cancelled; otherwise the guest cart is re-parented to
    /// the user. Returns the resulting cart, or `None` if the guest had
    /// no active cart.
    async fn attach_guest_cart(&self, guest_key: GuestKey, user_id: UserId)
    -> Result<Option<Cart>>;

    /// Places an order atomically: validates the input, inserts the
    /// header, backfills the derived order number, inserts the item
    /// snapshots, and marks the originating cart converted — in one
    /// transaction. Returns the fully assembled order.
    async fn create_order(&self, input: CreateOrderInput) -> Result<Order>;

    /// Loads an order with its items.
    async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>>;

    /// Lists orders newest-first with optional contact search and
    /// pagination.
    async fn list_orders(&self, query: OrderQuery) -> Result<Vec<Order>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_query_builder() {
        let query = OrderQuery::new().search("ayşe").limit(10).offset(20);
        assert_eq!(query.search.as_deref(), Some("ayşe"));
        assert_eq!(query.limit, Some(10));
        assert_eq!(query.offset, Some(20));
    }

    #[test]
    fn order_query_default_is_unfiltered() {
        let query = OrderQuery::new();
        assert_eq!(query, OrderQuery::default());
        assert!(query.search.is_none());
    }
}

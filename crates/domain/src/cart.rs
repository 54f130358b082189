//! Cart aggregate: mutable pre-checkout line items with rolled-up totals.

use chrono::{DateTime, Utc};
use common::{CartId, GuestKey, Money, ProductId, UserId};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Lifecycle status of a cart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CartStatus {
    /// The single live cart for its owner; mutable.
    #[default]
    Active,

    /// Checked out into an order.
    Converted,

    /// Left behind by its shopper.
    Abandoned,

    /// Closed without checkout, e.g. a guest cart merged away on login.
    Cancelled,
}

impl CartStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CartStatus::Active => "active",
            CartStatus::Converted => "converted",
            CartStatus::Abandoned => "abandoned",
            CartStatus::Cancelled => "cancelled",
        }
    }

    /// Parses the stored wire spelling.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(CartStatus::Active),
            "converted" => Some(CartStatus::Converted),
            "abandoned" => Some(CartStatus::Abandoned),
            "cancelled" => Some(CartStatus::Cancelled),
            _ => None,
        }
    }
}

impl std::fmt::Display for CartStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The party a cart belongs to: exactly one of an authenticated user or
/// an anonymous guest key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CartOwner {
    User(UserId),
    Guest(GuestKey),
}

impl CartOwner {
    pub fn user_id(&self) -> Option<UserId> {
        match self {
            CartOwner::User(id) => Some(*id),
            CartOwner::Guest(_) => None,
        }
    }

    pub fn guest_key(&self) -> Option<GuestKey> {
        match self {
            CartOwner::User(_) => None,
            CartOwner::Guest(key) => Some(*key),
        }
    }
}

/// One line in a cart, unique per (cart, product).
///
/// The unit price is captured at add time rather than live-repriced, so a
/// cart keeps the price the shopper saw.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    pub product_id: ProductId,
    pub quantity: u32,
    pub unit_price: Money,
    pub currency: String,
    pub line_total: Money,
}

impl CartItem {
    /// Creates a line with its total derived from quantity × unit price.
    pub fn new(
        product_id: ProductId,
        quantity: u32,
        unit_price: Money,
        currency: impl Into<String>,
    ) -> Self {
        Self {
            product_id,
            quantity,
            unit_price,
            currency: currency.into(),
            line_total: unit_price.times(quantity),
        }
    }

    fn reprice(&mut self, quantity: u32, unit_price: Money) {
        self.quantity = quantity;
        self.unit_price = unit_price;
        self.line_total = unit_price.times(quantity);
    }
}

/// A shopper's pre-checkout cart with derived totals.
///
/// Totals are never set by callers; every item mutation goes through a
/// method that recomputes them, keeping
/// `grand_total == subtotal - discount_total + shipping_total + tax_total`
/// true at all times.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cart {
    pub id: CartId,
    pub user_id: Option<UserId>,
    pub guest_key: Option<GuestKey>,
    pub status: CartStatus,
    pub currency: String,
    pub subtotal: Money,
    pub discount_total: Money,
    pub shipping_total: Money,
    pub tax_total: Money,
    pub grand_total: Money,
    pub items: Vec<CartItem>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Cart {
    /// Creates an empty active cart for an owner.
    pub fn new(id: CartId, owner: CartOwner, currency: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            user_id: owner.user_id(),
            guest_key: owner.guest_key(),
            status: CartStatus::Active,
            currency: currency.into(),
            subtotal: Money::zero(),
            discount_total: Money::zero(),
            shipping_total: Money::zero(),
            tax_total: Money::zero(),
            grand_total: Money::zero(),
            items: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Adds quantity for a product, creating the line if absent.
    ///
    /// An existing line accumulates quantity and takes the supplied unit
    /// price as its new price. Zero quantity is rejected.
    pub fn add_item(
        &mut self,
        product_id: ProductId,
        quantity: u32,
        unit_price: Money,
    ) -> Result<(), DomainError> {
        if quantity == 0 {
            return Err(DomainError::InvalidQuantity { quantity });
        }

        match self.items.iter_mut().find(|i| i.product_id == product_id) {
            Some(item) => {
                let total = item.quantity + quantity;
                item.reprice(total, unit_price);
            }
            None => {
                let currency = self.currency.clone();
                self.items
                    .push(CartItem::new(product_id, quantity, unit_price, currency));
            }
        }

        self.recompute_totals();
        Ok(())
    }

    /// Sets an absolute quantity for a product. Zero deletes the line
    /// instead of storing a dead row.
    pub fn set_item_quantity(
        &mut self,
        product_id: ProductId,
        quantity: u32,
        unit_price: Money,
    ) {
        if quantity == 0 {
            self.remove_item(product_id);
            return;
        }

        match self.items.iter_mut().find(|i| i.product_id == product_id) {
            Some(item) => item.reprice(quantity, unit_price),
            None => {
                let currency = self.currency.clone();
                self.items
                    .push(CartItem::new(product_id, quantity, unit_price, currency));
            }
        }

        self.recompute_totals();
    }

    /// Deletes a product's line. No error if the line is absent.
    pub fn remove_item(&mut self, product_id: ProductId) {
        self.items.retain(|i| i.product_id != product_id);
        self.recompute_totals();
    }

    /// Deletes every line.
    pub fn clear_items(&mut self) {
        self.items.clear();
        self.recompute_totals();
    }

    /// Returns the line for a product, if present.
    pub fn item(&self, product_id: ProductId) -> Option<&CartItem> {
        self.items.iter().find(|i| i.product_id == product_id)
    }

    /// Re-derives the rolled-up totals from the current lines.
    pub fn recompute_totals(&mut self) {
        self.subtotal = self.items.iter().map(|i| i.line_total).sum();
        self.grand_total =
            self.subtotal - self.discount_total + self.shipping_total + self.tax_total;
        self.updated_at = Utc::now();
    }

    /// Checks the totals invariant; storage tests lean on this.
    pub fn totals_consistent(&self) -> bool {
        let subtotal: Money = self.items.iter().map(|i| i.line_total).sum();
        self.subtotal == subtotal
            && self.grand_total
                == self.subtotal - self.discount_total + self.shipping_total + self.tax_total
    }
}

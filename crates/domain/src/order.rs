//! Order aggregate: the immutable snapshot written at checkout.

use chrono::{DateTime, Utc};
use common::{CartId, GuestKey, Money, OrderId, ProductId, UserId};
use serde::{Deserialize, Serialize};

use crate::cart::CartOwner;
use crate::error::DomainError;
use crate::pricing::{self, CustomerType};

/// Prefix of every human-readable order number.
pub const ORDER_NUMBER_PREFIX: &str = "ORD";

/// Derives the order number from the generated row id: the fixed prefix
/// plus the id zero-padded to 8 digits.
pub fn order_number(id: OrderId) -> String {
    format!("{ORDER_NUMBER_PREFIX}{:08}", id.as_i64())
}

/// Payment method recorded on an order. No gateway is called; the choice
/// is captured alongside the payment snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PaymentMethod {
    /// Card payment ("kredi-karti" on the wire).
    KrediKarti,

    /// Bank transfer ("havale" on the wire).
    Havale,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::KrediKarti => "kredi-karti",
            PaymentMethod::Havale => "havale",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "kredi-karti" => Some(PaymentMethod::KrediKarti),
            "havale" => Some(PaymentMethod::Havale),
            _ => None,
        }
    }
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Order lifecycle status. Only `Pending` is assigned by this core;
/// later transitions belong to back-office tooling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    #[default]
    Pending,
    Paid,
    Failed,
    Cancelled,
    Refunded,
    Shipped,
    Completed,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Paid => "paid",
            OrderStatus::Failed => "failed",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Refunded => "refunded",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(OrderStatus::Pending),
            "paid" => Some(OrderStatus::Paid),
            "failed" => Some(OrderStatus::Failed),
            "cancelled" => Some(OrderStatus::Cancelled),
            "refunded" => Some(OrderStatus::Refunded),
            "shipped" => Some(OrderStatus::Shipped),
            "completed" => Some(OrderStatus::Completed),
            _ => None,
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Buyer and contact fields. Everything is optional and stored as given.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuyerInfo {
    pub company_title: Option<String>,
    pub tax_number: Option<String>,
    pub tax_office: Option<String>,
    pub contact_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address_text: Option<String>,
    pub note: Option<String>,
}

/// Line item snapshot persisted with an order.
///
/// Product identity and price are duplicated from the catalog at order
/// time so historical orders survive later product edits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub product_id: ProductId,
    pub code: Option<String>,
    pub title: String,
    pub unit_price: Money,
    pub quantity: u32,
    pub currency: String,
    pub line_total: Money,
    pub image_path: Option<String>,
}

/// One line of a `CreateOrderInput`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOrderItem {
    pub product_id: ProductId,
    pub code: Option<String>,
    pub title: String,
    pub unit_price: Money,
    pub quantity: u32,
    pub currency: Option<String>,
    pub line_total: Money,
    pub image_path: Option<String>,
}

impl NewOrderItem {
    /// Returns the line total this item should carry.
    pub fn expected_line_total(&self) -> Money {
        self.unit_price.times(self.quantity)
    }
}

/// Everything needed to place an order. Construct it, call
/// [`CreateOrderInput::validate`], then hand it to the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateOrderInput {
    pub owner: CartOwner,
    pub customer_type: CustomerType,
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub status: OrderStatus,
    pub currency: String,
    pub subtotal: Money,
    #[serde(default)]
    pub discount_total: Money,
    #[serde(default)]
    pub shipping_total: Money,
    #[serde(default)]
    pub tax_total: Money,
    pub grand_total: Money,
    #[serde(default)]
    pub buyer: BuyerInfo,
    pub payment_snapshot: Option<serde_json::Value>,
    pub cart_id: Option<CartId>,
    pub domain: Option<String>,
    pub items: Vec<NewOrderItem>,
}

impl CreateOrderInput {
    /// Validates the input before any write.
    ///
    /// Beyond the basic shape checks (at least one item, positive
    /// quantities), every submitted amount is recomputed server-side:
    /// each line total from quantity × unit price, the subtotal from the
    /// lines, and the grand total from the discount policy for the
    /// stated customer type. A caller-supplied total that disagrees is
    /// rejected rather than stored.
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.items.is_empty() {
            return Err(DomainError::NoItems);
        }

        let mut subtotal = Money::zero();
        for item in &self.items {
            if item.quantity == 0 {
                return Err(DomainError::InvalidQuantity {
                    quantity: item.quantity,
                });
            }
            let expected = item.expected_line_total();
            if item.line_total != expected {
                return Err(DomainError::LineTotalMismatch {
                    product_id: item.product_id,
                    claimed: item.line_total,
                    expected,
                });
            }
            subtotal += expected;
        }

        if self.subtotal != subtotal {
            return Err(DomainError::SubtotalMismatch {
                claimed: self.subtotal,
                expected: subtotal,
            });
        }

        let discounted = pricing::discounted_total(subtotal, Some(self.customer_type));
        let expected_grand = discounted + self.shipping_total + self.tax_total;
        if self.grand_total != expected_grand {
            return Err(DomainError::GrandTotalMismatch {
                claimed: self.grand_total,
                expected: expected_grand,
            });
        }

        let expected_discount = pricing::discount_amount(subtotal, Some(self.customer_type));
        if self.discount_total != expected_discount {
            return Err(DomainError::DiscountMismatch {
                claimed: self.discount_total,
                expected: expected_discount,
            });
        }

        Ok(())
    }
}

/// A placed order: header plus denormalized item snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub order_number: String,
    pub user_id: Option<UserId>,
    pub guest_key: Option<GuestKey>,
    pub customer_type: CustomerType,
    pub payment_method: PaymentMethod,
    pub status: OrderStatus,
    pub currency: String,
    pub subtotal: Money,
    pub discount_total: Money,
    pub shipping_total: Money,
    pub tax_total: Money,
    pub grand_total: Money,
    #[serde(flatten)]
    pub buyer: BuyerInfo,
    pub payment_snapshot: Option<serde_json::Value>,
    pub cart_id: Option<CartId>,
    pub domain: Option<String>,
    pub items: Vec<OrderItem>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(product_id: i64, quantity: u32, unit_minor: i64) -> NewOrderItem {
        let unit_price = Money::from_minor(unit_minor);
        NewOrderItem {
            product_id: ProductId::new(product_id),
            code: None,
            title: format!("Product {product_id}"),
            unit_price,
            quantity,
            currency: None,
            line_total: unit_price.times(quantity),
            image_path: None,
        }
    }

    fn valid_input(customer_type: CustomerType) -> CreateOrderInput {
        let items = vec![line(1, 2, 10_000), line(2, 1, 5_000)];
        let subtotal: Money = items.iter().map(|i| i.line_total).sum();
        let grand_total = crate::pricing::discounted_total(subtotal, Some(customer_type));
        CreateOrderInput {
            owner: CartOwner::User(UserId::new(1)),
            customer_type,
            payment_method: PaymentMethod::Havale,
            status: OrderStatus::default(),
            currency: "TRY".to_string(),
            subtotal,
            discount_total: subtotal - grand_total,
            shipping_total: Money::zero(),
            tax_total: Money::zero(),
            grand_total,
            buyer: BuyerInfo::default(),
            payment_snapshot: None,
            cart_id: None,
            domain: None,
            items,
        }
    }

    #[test]
    fn order_number_zero_pads_to_eight_digits() {
        assert_eq!(order_number(OrderId::new(42)), "ORD00000042");
        assert_eq!(order_number(OrderId::new(12_345_678)), "ORD12345678");
    }

    #[test]
    fn valid_input_passes() {
        assert_eq!(valid_input(CustomerType::Katilimci).validate(), Ok(()));
    }

    #[test]
    fn katilimci_checkout_grand_total() {
        let input = valid_input(CustomerType::Katilimci);
        assert_eq!(input.subtotal, Money::from_major(250));
        assert_eq!(input.grand_total.minor(), 18_750);
        assert_eq!(input.validate(), Ok(()));
    }

    #[test]
    fn empty_items_rejected() {
        let mut input = valid_input(CustomerType::Bireysel);
        input.items.clear();
        assert_eq!(input.validate(), Err(DomainError::NoItems));
    }

    #[test]
    fn zero_quantity_item_rejected() {
        let mut input = valid_input(CustomerType::Bireysel);
        input.items[0].quantity = 0;
        input.items[0].line_total = Money::zero();
        assert!(matches!(
            input.validate(),
            Err(DomainError::InvalidQuantity { quantity: 0 })
        ));
    }

    #[test]
    fn wrong_line_total_rejected() {
        let mut input = valid_input(CustomerType::Bireysel);
        input.items[0].line_total = Money::from_minor(1);
        assert!(matches!(
            input.validate(),
            Err(DomainError::LineTotalMismatch { .. })
        ));
    }

    #[test]
    fn understated_grand_total_rejected() {
        let mut input = valid_input(CustomerType::Bireysel);
        input.grand_total = Money::from_minor(1);
        assert!(matches!(
            input.validate(),
            Err(DomainError::GrandTotalMismatch { .. })
        ));
    }

    #[test]
    fn claiming_a_bigger_discount_is_rejected() {
        // bireysel input priced as if katilimci
        let mut input = valid_input(CustomerType::Bireysel);
        input.grand_total = input.subtotal.less_basis_points(2_500);
        input.discount_total = input.subtotal - input.grand_total;
        assert!(matches!(
            input.validate(),
            Err(DomainError::GrandTotalMismatch { .. })
        ));
    }

    #[test]
    fn shipping_and_tax_feed_the_grand_total() {
        let mut input = valid_input(CustomerType::Kurumsal);
        input.shipping_total = Money::from_minor(500);
        input.tax_total = Money::from_minor(250);
        input.grand_total = input.grand_total + Money::from_minor(750);
        assert_eq!(input.validate(), Ok(()));
    }

    #[test]
    fn payment_method_wire_spelling() {
        assert_eq!(
            serde_json::to_string(&PaymentMethod::KrediKarti).unwrap(),
            "\"kredi-karti\""
        );
        assert_eq!(PaymentMethod::parse("havale"), Some(PaymentMethod::Havale));
        assert_eq!(PaymentMethod::parse("cash"), None);
    }

    #[test]
    fn order_status_defaults_to_pending() {
        assert_eq!(OrderStatus::default(), OrderStatus::Pending);
        assert_eq!(OrderStatus::parse("refunded"), Some(OrderStatus::Refunded));
    }
}

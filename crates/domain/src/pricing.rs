//! Customer-type discount policy.
//!
//! This is the single pricing function in the system. The order
//! validation path and the client-facing preview endpoint both call it,
//! so the amount a shopper sees and the amount an order records can
//! never drift apart.

use common::Money;
use serde::{Deserialize, Serialize};

/// Buyer category driving the flat checkout discount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CustomerType {
    /// Corporate buyer: 15% off.
    Kurumsal,

    /// Individual buyer: no discount.
    Bireysel,

    /// Program participant: 25% off.
    Katilimci,
}

impl CustomerType {
    /// Returns the discount for this customer type in basis points.
    pub fn discount_bps(&self) -> i64 {
        match self {
            CustomerType::Kurumsal => 1_500,
            CustomerType::Bireysel => 0,
            CustomerType::Katilimci => 2_500,
        }
    }

    /// Returns the wire spelling of the customer type.
    pub fn as_str(&self) -> &'static str {
        match self {
            CustomerType::Kurumsal => "kurumsal",
            CustomerType::Bireysel => "bireysel",
            CustomerType::Katilimci => "katilimci",
        }
    }

    /// Parses the stored wire spelling.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "kurumsal" => Some(CustomerType::Kurumsal),
            "bireysel" => Some(CustomerType::Bireysel),
            "katilimci" => Some(CustomerType::Katilimci),
            _ => None,
        }
    }
}

impl std::fmt::Display for CustomerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Applies the customer-type discount to a subtotal.
///
/// An absent customer type pays the full subtotal.
pub fn discounted_total(subtotal: Money, customer_type: Option<CustomerType>) -> Money {
    match customer_type {
        Some(ct) => subtotal.less_basis_points(ct.discount_bps()),
        None => subtotal,
    }
}

/// Returns the discount deducted from a subtotal for a customer type.
pub fn discount_amount(subtotal: Money, customer_type: Option<CustomerType>) -> Money {
    subtotal - discounted_total(subtotal, customer_type)
}

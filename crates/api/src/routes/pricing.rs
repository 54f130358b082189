//! Discount preview endpoint.
//!
//! Runs the same pricing function the order validation path runs, so a
//! client can show the shopper exactly what checkout will accept.

use axum::Json;
use common::Money;
use domain::{CustomerType, pricing};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct PricingPreviewRequest {
    pub subtotal_minor: i64,
    pub customer_type: Option<CustomerType>,
}

#[derive(Serialize)]
pub struct PricingPreviewResponse {
    pub subtotal_minor: i64,
    pub discount_total_minor: i64,
    pub grand_total_minor: i64,
    pub customer_type: Option<String>,
}

/// POST /pricing/preview — apply the customer-type discount to a
/// subtotal without touching any cart or order.
#[tracing::instrument]
pub async fn preview(
    Json(req): Json<PricingPreviewRequest>,
) -> Result<Json<PricingPreviewResponse>, ApiError> {
    let subtotal = Money::from_minor(req.subtotal_minor);
    let grand_total = pricing::discounted_total(subtotal, req.customer_type);
    let discount_total = pricing::discount_amount(subtotal, req.customer_type);

    Ok(Json(PricingPreviewResponse {
        subtotal_minor: subtotal.minor(),
        discount_total_minor: discount_total.minor(),
        grand_total_minor: grand_total.minor(),
        customer_type: req.customer_type.map(|ct| ct.to_string()),
    }))
}

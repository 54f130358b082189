//! Order placement and read-side endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use checkout_store::{CheckoutStore, OrderQuery};
use common::{CartId, Money, OrderId, ProductId};
use domain::{
    BuyerInfo, CreateOrderInput, CustomerType, DomainError, NewOrderItem, Order, OrderStatus,
    PaymentMethod,
};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::routes::{AppState, OwnerParams};

// -- Request types --

#[derive(Deserialize)]
pub struct CreateOrderRequest {
    #[serde(flatten)]
    pub owner: OwnerParams,
    pub customer_type: Option<CustomerType>,
    pub payment_method: Option<PaymentMethod>,
    pub currency: Option<String>,
    pub subtotal_minor: i64,
    #[serde(default)]
    pub discount_total_minor: i64,
    #[serde(default)]
    pub shipping_total_minor: i64,
    #[serde(default)]
    pub tax_total_minor: i64,
    pub grand_total_minor: i64,
    #[serde(default)]
    pub buyer: BuyerInfo,
    pub payment_snapshot: Option<serde_json::Value>,
    pub cart_id: Option<i64>,
    pub domain: Option<String>,
    pub items: Vec<OrderItemRequest>,
}

#[derive(Deserialize)]
pub struct OrderItemRequest {
    pub product_id: i64,
    pub code: Option<String>,
    pub title: String,
    pub unit_price_minor: i64,
    pub quantity: u32,
    pub currency: Option<String>,
    pub line_total_minor: i64,
    pub image_path: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListOrdersParams {
    pub search: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

// -- Response types --

#[derive(Serialize)]
pub struct OrderItemResponse {
    pub product_id: i64,
    pub code: Option<String>,
    pub title: String,
    pub unit_price_minor: i64,
    pub quantity: u32,
    pub currency: String,
    pub line_total_minor: i64,
    pub image_path: Option<String>,
}

#[derive(Serialize)]
pub struct OrderResponse {
    pub id: i64,
    pub order_number: String,
    pub user_id: Option<i64>,
    pub guest_key: Option<String>,
    pub customer_type: String,
    pub payment_method: String,
    pub status: String,
    pub currency: String,
    pub subtotal_minor: i64,
    pub discount_total_minor: i64,
    pub shipping_total_minor: i64,
    pub tax_total_minor: i64,
    pub grand_total_minor: i64,
    #[serde(flatten)]
    pub buyer: BuyerInfo,
    pub payment_snapshot: Option<serde_json::Value>,
    pub cart_id: Option<i64>,
    pub domain: Option<String>,
    pub items: Vec<OrderItemResponse>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Order> for OrderResponse {
    fn from(order: Order) -> Self {
        OrderResponse {
            id: order.id.as_i64(),
            order_number: order.order_number,
            user_id: order.user_id.map(|id| id.as_i64()),
            guest_key: order.guest_key.map(|key| key.to_string()),
            customer_type: order.customer_type.to_string(),
            payment_method: order.payment_method.to_string(),
            status: order.status.to_string(),
            currency: order.currency,
            subtotal_minor: order.subtotal.minor(),
            discount_total_minor: order.discount_total.minor(),
            shipping_total_minor: order.shipping_total.minor(),
            tax_total_minor: order.tax_total.minor(),
            grand_total_minor: order.grand_total.minor(),
            buyer: order.buyer,
            payment_snapshot: order.payment_snapshot,
            cart_id: order.cart_id.map(|id| id.as_i64()),
            domain: order.domain,
            items: order
                .items
                .into_iter()
                .map(|item| OrderItemResponse {
                    product_id: item.product_id.as_i64(),
                    code: item.code,
                    title: item.title,
                    unit_price_minor: item.unit_price.minor(),
                    quantity: item.quantity,
                    currency: item.currency,
                    line_total_minor: item.line_total.minor(),
                    image_path: item.image_path,
                })
                .collect(),
            created_at: order.created_at.to_rfc3339(),
            updated_at: order.updated_at.to_rfc3339(),
        }
    }
}

// -- Handlers --

/// POST /orders — place an order atomically from the submitted totals.
#[tracing::instrument(skip(state, req))]
pub async fn create<S: CheckoutStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(req): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<OrderResponse>), ApiError> {
    let owner = req.owner.resolve()?;
    let customer_type = req.customer_type.ok_or(DomainError::MissingCustomerType)?;
    let payment_method = req
        .payment_method
        .ok_or(DomainError::MissingPaymentMethod)?;

    let input = CreateOrderInput {
        owner,
        customer_type,
        payment_method,
        status: OrderStatus::default(),
        currency: req.currency.unwrap_or_else(|| "TRY".to_string()),
        subtotal: Money::from_minor(req.subtotal_minor),
        discount_total: Money::from_minor(req.discount_total_minor),
        shipping_total: Money::from_minor(req.shipping_total_minor),
        tax_total: Money::from_minor(req.tax_total_minor),
        grand_total: Money::from_minor(req.grand_total_minor),
        buyer: req.buyer,
        payment_snapshot: req.payment_snapshot,
        cart_id: req.cart_id.map(CartId::new),
        domain: req.domain,
        items: req
            .items
            .into_iter()
            .map(|item| NewOrderItem {
                product_id: ProductId::new(item.product_id),
                code: item.code,
                title: item.title,
                unit_price: Money::from_minor(item.unit_price_minor),
                quantity: item.quantity,
                currency: item.currency,
                line_total: Money::from_minor(item.line_total_minor),
                image_path: item.image_path,
            })
            .collect(),
    };

    let order = state.store.create_order(input).await?;

    metrics::counter!("orders_created_total").increment(1);
    tracing::info!(order_number = %order.order_number, "order placed");

    Ok((StatusCode::CREATED, Json(order.into())))
}

/// GET /orders/:id — load an order with its items.
#[tracing::instrument(skip(state))]
pub async fn get<S: CheckoutStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<i64>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order = state
        .store
        .get_order(OrderId::new(id))
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Order {id} not found")))?;
    Ok(Json(order.into()))
}

/// GET /orders — list orders newest-first with contact search and
/// pagination.
#[tracing::instrument(skip(state))]
pub async fn list<S: CheckoutStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Query(params): Query<ListOrdersParams>,
) -> Result<Json<Vec<OrderResponse>>, ApiError> {
    let query = OrderQuery {
        search: params.search,
        limit: params.limit,
        offset: params.offset,
    };
    let orders = state.store.list_orders(query).await?;
    Ok(Json(orders.into_iter().map(OrderResponse::from).collect()))
}

//! Cart endpoints: one active cart per owner, mutated line by line.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use checkout_store::CheckoutStore;
use common::{Money, ProductId, UserId};
use domain::Cart;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::routes::{AppState, OwnerParams};

// -- Request types --

#[derive(Deserialize)]
pub struct EnsureCartRequest {
    #[serde(flatten)]
    pub owner: OwnerParams,
    pub currency: Option<String>,
}

#[derive(Deserialize)]
pub struct CartItemRequest {
    #[serde(flatten)]
    pub owner: OwnerParams,
    pub product_id: i64,
    pub quantity: u32,
    pub unit_price_minor: Option<i64>,
}

#[derive(Deserialize)]
pub struct AttachCartRequest {
    pub guest_key: String,
    pub user_id: i64,
}

// -- Response types --

#[derive(Serialize)]
pub struct CartItemResponse {
    pub product_id: i64,
    pub quantity: u32,
    pub unit_price_minor: i64,
    pub currency: String,
    pub line_total_minor: i64,
}

#[derive(Serialize)]
pub struct CartResponse {
    pub id: i64,
    pub user_id: Option<i64>,
    pub guest_key: Option<String>,
    pub status: String,
    pub currency: String,
    pub subtotal_minor: i64,
    pub discount_total_minor: i64,
    pub shipping_total_minor: i64,
    pub tax_total_minor: i64,
    pub grand_total_minor: i64,
    pub items: Vec<CartItemResponse>,
}

#[derive(Serialize)]
pub struct AttachCartResponse {
    pub cart: Option<CartResponse>,
}

impl From<Cart> for CartResponse {
    fn from(cart: Cart) -> Self {
        CartResponse {
            id: cart.id.as_i64(),
            user_id: cart.user_id.map(|id| id.as_i64()),
            guest_key: cart.guest_key.map(|key| key.to_string()),
            status: cart.status.to_string(),
            currency: cart.currency,
            subtotal_minor: cart.subtotal.minor(),
            discount_total_minor: cart.discount_total.minor(),
            shipping_total_minor: cart.shipping_total.minor(),
            tax_total_minor: cart.tax_total.minor(),
            grand_total_minor: cart.grand_total.minor(),
            items: cart
                .items
                .into_iter()
                .map(|item| CartItemResponse {
                    product_id: item.product_id.as_i64(),
                    quantity: item.quantity,
                    unit_price_minor: item.unit_price.minor(),
                    currency: item.currency,
                    line_total_minor: item.line_total.minor(),
                })
                .collect(),
        }
    }
}

// -- Handlers --

/// POST /cart — return the owner's active cart, creating one if needed.
#[tracing::instrument(skip(state, req))]
pub async fn ensure<S: CheckoutStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(req): Json<EnsureCartRequest>,
) -> Result<Json<CartResponse>, ApiError> {
    let owner = req.owner.resolve()?;
    let cart = state.store.ensure_active_cart(owner, req.currency).await?;
    Ok(Json(cart.into()))
}

/// GET /cart — return the owner's active cart without creating one.
#[tracing::instrument(skip(state))]
pub async fn get<S: CheckoutStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Query(params): Query<OwnerParams>,
) -> Result<Json<CartResponse>, ApiError> {
    let owner = params.resolve()?;
    let cart = state
        .store
        .get_active_cart(owner)
        .await?
        .ok_or_else(|| ApiError::NotFound("No active cart".to_string()))?;
    Ok(Json(cart.into()))
}

/// POST /cart/items — add quantity for a product.
#[tracing::instrument(skip(state, req))]
pub async fn add_item<S: CheckoutStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(req): Json<CartItemRequest>,
) -> Result<Json<CartResponse>, ApiError> {
    let owner = req.owner.resolve()?;
    let cart = state.store.ensure_active_cart(owner, None).await?;
    let cart = state
        .store
        .add_item(
            cart.id,
            ProductId::new(req.product_id),
            req.quantity,
            req.unit_price_minor.map(Money::from_minor),
        )
        .await?;

    metrics::counter!("cart_items_added_total").increment(1);
    Ok(Json(cart.into()))
}

/// PUT /cart/items — set an absolute quantity; zero deletes the line.
#[tracing::instrument(skip(state, req))]
pub async fn set_item<S: CheckoutStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(req): Json<CartItemRequest>,
) -> Result<Json<CartResponse>, ApiError> {
    let owner = req.owner.resolve()?;
    let cart = state.store.ensure_active_cart(owner, None).await?;
    let cart = state
        .store
        .set_item_quantity(
            cart.id,
            ProductId::new(req.product_id),
            req.quantity,
            req.unit_price_minor.map(Money::from_minor),
        )
        .await?;
    Ok(Json(cart.into()))
}

/// DELETE /cart/items/:product_id — drop a product's line.
#[tracing::instrument(skip(state))]
pub async fn remove_item<S: CheckoutStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(product_id): Path<i64>,
    Query(params): Query<OwnerParams>,
) -> Result<Json<CartResponse>, ApiError> {
    let owner = params.resolve()?;
    let cart = state
        .store
        .get_active_cart(owner)
        .await?
        .ok_or_else(|| ApiError::NotFound("No active cart".to_string()))?;
    let cart = state
        .store
        .remove_item(cart.id, ProductId::new(product_id))
        .await?;
    Ok(Json(cart.into()))
}

/// DELETE /cart/items — empty the cart.
#[tracing::instrument(skip(state))]
pub async fn clear<S: CheckoutStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Query(params): Query<OwnerParams>,
) -> Result<Json<CartResponse>, ApiError> {
    let owner = params.resolve()?;
    let cart = state
        .store
        .get_active_cart(owner)
        .await?
        .ok_or_else(|| ApiError::NotFound("No active cart".to_string()))?;
    let cart = state.store.clear_cart(cart.id).await?;
    Ok(Json(cart.into()))
}

/// POST /cart/attach — fold a guest's cart into a user's after login.
#[tracing::instrument(skip(state, req))]
pub async fn attach<S: CheckoutStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(req): Json<AttachCartRequest>,
) -> Result<Json<AttachCartResponse>, ApiError> {
    let guest_key = common::GuestKey::parse(&req.guest_key)
        .map_err(|e| ApiError::BadRequest(format!("Invalid guest_key: {e}")))?;

    let cart = state
        .store
        .attach_guest_cart(guest_key, UserId::new(req.user_id))
        .await?;

    Ok(Json(AttachCartResponse {
        cart: cart.map(CartResponse::from),
    }))
}

//! Route handlers and shared request/response plumbing.

pub mod cart;
pub mod health;
pub mod metrics;
pub mod orders;
pub mod pricing;

use checkout_store::CheckoutStore;
use common::{GuestKey, UserId};
use domain::CartOwner;
use serde::Deserialize;

use crate::error::ApiError;

/// Shared application state accessible from all handlers.
pub struct AppState<S: CheckoutStore> {
    pub store: S,
}

/// Cart owner identification carried in request bodies and query
/// strings: exactly one of `user_id` or `guest_key`.
#[derive(Debug, Clone, Deserialize)]
pub struct OwnerParams {
    pub user_id: Option<i64>,
    pub guest_key: Option<String>,
}

impl OwnerParams {
    /// Resolves the parameters into a [`CartOwner`].
    pub fn resolve(&self) -> Result<CartOwner, ApiError> {
        match (self.user_id, self.guest_key.as_deref()) {
            (Some(_), Some(_)) => Err(ApiError::BadRequest(
                "Provide either user_id or guest_key, not both".to_string(),
            )),
            (None, None) => Err(ApiError::BadRequest(
                "Provide user_id or guest_key".to_string(),
            )),
            (Some(user_id), None) => Ok(CartOwner::User(UserId::new(user_id))),
            (None, Some(raw)) => {
                let key = GuestKey::parse(raw)
                    .map_err(|e| ApiError::BadRequest(format!("Invalid guest_key: {e}")))?;
                Ok(CartOwner::Guest(key))
            }
        }
    }
}

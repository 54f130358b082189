//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use checkout_store::StoreError;
use domain::DomainError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Resource not found.
    NotFound(String),
    /// Bad request from the client.
    BadRequest(String),
    /// Checkout store error.
    Store(StoreError),
    /// Internal server error.
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Store(err) => store_error_to_response(err),
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

fn store_error_to_response(err: StoreError) -> (StatusCode, String) {
    match &err {
        StoreError::Domain(domain_err) => match domain_err {
            DomainError::InvalidQuantity { .. }
            | DomainError::MissingCustomerType
            | DomainError::MissingPaymentMethod
            | DomainError::NoItems
            | DomainError::LineTotalMismatch { .. }
            | DomainError::SubtotalMismatch { .. }
            | DomainError::DiscountMismatch { .. }
            | DomainError::GrandTotalMismatch { .. } => (StatusCode::BAD_REQUEST, err.to_string()),
        },
        StoreError::CartNotFound(_)
        | StoreError::ProductUnavailable(_)
        | StoreError::OrderNotFound(_) => (StatusCode::NOT_FOUND, err.to_string()),
        StoreError::InvalidColumn { .. }
        | StoreError::Database(_)
        | StoreError::Migration(_)
        | StoreError::Serialization(_) => {
            tracing::error!(error = %err, "checkout store failure");
            (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::Store(err)
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        ApiError::Store(StoreError::Domain(err))
    }
}

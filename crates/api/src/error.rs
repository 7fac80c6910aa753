//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use checkout::{CheckoutError, ErrorKind};
use store::StoreError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The caller identity header is missing or not a UUID.
    #[error("missing or invalid x-user-id header")]
    Unauthenticated,
    /// Bad request from the client.
    #[error("{0}")]
    BadRequest(String),
    /// Checkout engine error.
    #[error(transparent)]
    Checkout(#[from] CheckoutError),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthenticated => StatusCode::UNAUTHORIZED,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Checkout(err) => checkout_status(err),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            ApiError::Unauthenticated => ErrorKind::Authorization.as_str(),
            ApiError::BadRequest(_) => ErrorKind::Validation.as_str(),
            ApiError::Checkout(err) => err.kind().as_str(),
        }
    }
}

fn checkout_status(err: &CheckoutError) -> StatusCode {
    match err {
        CheckoutError::EmptyCart
        | CheckoutError::InvalidQuantity { .. }
        | CheckoutError::AmountOverflow => StatusCode::BAD_REQUEST,
        CheckoutError::ProductNotFound(_) | CheckoutError::OrderNotFound(_) => {
            StatusCode::NOT_FOUND
        }
        CheckoutError::InsufficientStock { .. } | CheckoutError::InvalidState { .. } => {
            StatusCode::CONFLICT
        }
        CheckoutError::Forbidden { .. } => StatusCode::FORBIDDEN,
        CheckoutError::OrderExpired(_) => StatusCode::GONE,
        CheckoutError::PaymentFailed { .. } => StatusCode::PAYMENT_REQUIRED,
        CheckoutError::Gateway(_) => StatusCode::BAD_GATEWAY,
        CheckoutError::Store(StoreError::Conflict { .. }) => StatusCode::CONFLICT,
        CheckoutError::HoldOutOfRange | CheckoutError::Ledger(_) | CheckoutError::Store(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "internal server error");
        }

        let body = serde_json::json!({
            "error": self.to_string(),
            "kind": self.kind(),
        });
        (status, axum::Json(body)).into_response()
    }
}

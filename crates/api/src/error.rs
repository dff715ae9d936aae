//! API error type with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use checkout::CheckoutError;

/// API-level error that maps to an HTTP response.
///
/// Provider failures (carrier, payment, store) are logged with full
/// detail but surfaced to the client as a generic category; amounts
/// and credentials never leak.
#[derive(Debug)]
pub enum ApiError {
    /// Bad request from the client.
    BadRequest(String),
    /// Checkout pipeline error.
    Checkout(CheckoutError),
}

impl From<CheckoutError> for ApiError {
    fn from(err: CheckoutError) -> Self {
        ApiError::Checkout(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Checkout(err) => checkout_error_to_response(err),
        };

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

fn checkout_error_to_response(err: CheckoutError) -> (StatusCode, String) {
    match &err {
        CheckoutError::Validation(_)
        | CheckoutError::EmptyCart
        | CheckoutError::InsufficientLoyaltyPoints { .. }
        | CheckoutError::AddressUnresolved(_)
        | CheckoutError::SignatureMismatch => (StatusCode::BAD_REQUEST, err.to_string()),

        CheckoutError::InsufficientStock { .. } | CheckoutError::CouponExhausted { .. } => {
            (StatusCode::CONFLICT, err.to_string())
        }

        CheckoutError::CartNotFound
        | CheckoutError::CouponInvalid { .. }
        | CheckoutError::OrderNotFound { .. } => (StatusCode::NOT_FOUND, err.to_string()),

        CheckoutError::ReconciliationDataMissing(_) => {
            tracing::error!(error = %err, "payment reconciliation failed");
            (
                StatusCode::BAD_REQUEST,
                "order data was invalid, please order again".to_string(),
            )
        }

        CheckoutError::Carrier(_) => {
            tracing::error!(error = %err, "carrier failure");
            (
                StatusCode::BAD_GATEWAY,
                "shipping provider is unavailable".to_string(),
            )
        }

        CheckoutError::PaymentUrlBuild(_) => {
            tracing::error!(error = %err, "payment redirect failure");
            (
                StatusCode::BAD_GATEWAY,
                "payment provider is unavailable".to_string(),
            )
        }

        CheckoutError::ReservationSettled(_) | CheckoutError::Store(_) => {
            tracing::error!(error = %err, "internal checkout failure");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal error".to_string(),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_maps_to_bad_request() {
        let (status, _) = checkout_error_to_response(CheckoutError::Validation("x".into()));
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn stock_contention_maps_to_conflict() {
        let (status, _) = checkout_error_to_response(CheckoutError::InsufficientStock {
            sku_id: "SKU-001".into(),
            requested: 2,
            available: 1,
        });
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[test]
    fn provider_failures_are_generic() {
        let (status, message) = checkout_error_to_response(CheckoutError::Carrier(
            checkout::CarrierError::Rejected {
                code: 400,
                message: "account 123 has balance 456".into(),
            },
        ));
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert!(!message.contains("123"));
        assert!(!message.contains("456"));
    }
}

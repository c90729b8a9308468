//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use checkout::CheckoutError;

use crate::response::{ApiResponse, Reply};

const INTERNAL_MESSAGE: &str = "An unexpected error occurred";

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Missing or malformed caller identity.
    Unauthenticated(String),
    /// Malformed request (body, path or query).
    BadRequest(String),
    /// A checkout workflow failed.
    Checkout(CheckoutError),
}

impl ApiError {
    /// Returns the HTTP status this error is answered with.
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Checkout(err) => checkout_status(err),
        }
    }
}

fn checkout_status(err: &CheckoutError) -> StatusCode {
    match err {
        CheckoutError::NotFound(_) => StatusCode::NOT_FOUND,
        CheckoutError::Validation(_)
        | CheckoutError::InvalidState(_)
        | CheckoutError::InsufficientStock { .. }
        | CheckoutError::InvalidPaymentState { .. } => StatusCode::BAD_REQUEST,
        CheckoutError::DuplicatePayment(_) => StatusCode::CONFLICT,
        CheckoutError::Forbidden => StatusCode::FORBIDDEN,
        CheckoutError::Domain(_) | CheckoutError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match self {
            ApiError::Unauthenticated(msg) | ApiError::BadRequest(msg) => msg,
            ApiError::Checkout(err) if status == StatusCode::INTERNAL_SERVER_ERROR => {
                tracing::error!(error = %err, "internal server error");
                INTERNAL_MESSAGE.to_string()
            }
            ApiError::Checkout(err) => err.to_string(),
        };

        Reply(status, ApiResponse::error(message)).into_response()
    }
}

impl From<CheckoutError> for ApiError {
    fn from(err: CheckoutError) -> Self {
        ApiError::Checkout(err)
    }
}

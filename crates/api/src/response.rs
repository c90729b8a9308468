//! The JSON envelope every endpoint answers with.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// `{ success, message, data, timestamp }`.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub message: String,
    pub data: Option<T>,
    pub timestamp: DateTime<Utc>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(message: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: Some(data),
            timestamp: Utc::now(),
        }
    }

    /// A failed outcome that still carries the affected resource.
    pub fn failed(message: impl Into<String>, data: T) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: Some(data),
            timestamp: Utc::now(),
        }
    }
}

impl ApiResponse<()> {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: None,
            timestamp: Utc::now(),
        }
    }
}

/// An envelope paired with the status code it is sent with.
pub struct Reply<T: Serialize>(pub StatusCode, pub ApiResponse<T>);

impl<T: Serialize> IntoResponse for Reply<T> {
    fn into_response(self) -> Response {
        (self.0, Json(self.1)).into_response()
    }
}

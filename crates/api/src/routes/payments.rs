//! Payment settlement endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use checkout::{PaymentGateway, ProcessPayment};
use chrono::{DateTime, Utc};
use common::{OrderId, PaymentId};
use domain::{Money, Payment, PaymentMethod, PaymentStatus};
use serde::{Deserialize, Serialize};
use store::Store;

use crate::error::ApiError;
use crate::identity::CurrentUser;
use crate::response::{ApiResponse, Reply};
use crate::routes::orders::AppState;

// -- Request types --

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequest {
    pub order_id: OrderId,
    pub payment_method: PaymentMethod,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookQuery {
    pub transaction_id: String,
    pub success: bool,
}

// -- Response types --

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentResponse {
    pub id: PaymentId,
    pub order_id: OrderId,
    pub amount: Money,
    pub status: PaymentStatus,
    pub payment_method: PaymentMethod,
    pub transaction_id: Option<String>,
    pub gateway_reference: Option<String>,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Payment> for PaymentResponse {
    fn from(payment: &Payment) -> Self {
        Self {
            id: payment.id(),
            order_id: payment.order_id(),
            amount: payment.amount(),
            status: payment.status(),
            payment_method: payment.method(),
            transaction_id: payment.transaction_id().map(str::to_string),
            gateway_reference: payment.gateway_reference().map(str::to_string),
            failure_reason: payment.failure_reason().map(str::to_string),
            created_at: payment.created_at(),
            updated_at: payment.updated_at(),
        }
    }
}

/// Maps a settled payment to its HTTP answer.
fn settlement_reply(payment: &Payment) -> Reply<PaymentResponse> {
    let data = PaymentResponse::from(payment);
    match payment.status() {
        PaymentStatus::Success => Reply(
            StatusCode::OK,
            ApiResponse::ok("Payment processed successfully", data),
        ),
        PaymentStatus::Failed => {
            let reason = payment.failure_reason().unwrap_or("unknown reason");
            Reply(
                StatusCode::BAD_REQUEST,
                ApiResponse::failed(format!("Payment failed: {reason}"), data),
            )
        }
        _ => Reply(
            StatusCode::ACCEPTED,
            ApiResponse::ok("Payment is being processed", data),
        ),
    }
}

// -- Handlers --

/// POST /api/payments: settles the payment of one of the caller's orders.
#[tracing::instrument(skip(state, body))]
pub async fn process<S: Store + Clone + 'static, G: PaymentGateway + 'static>(
    State(state): State<Arc<AppState<S, G>>>,
    CurrentUser(user_id): CurrentUser,
    body: Result<Json<PaymentRequest>, JsonRejection>,
) -> Result<Reply<PaymentResponse>, ApiError> {
    let Json(req) = body?;
    let payment = state
        .payments
        .process_payment(ProcessPayment::new(req.order_id, user_id, req.payment_method))
        .await?;
    Ok(settlement_reply(&payment))
}

/// GET /api/payments/order/{order_id}
#[tracing::instrument(skip(state, path))]
pub async fn for_order<S: Store + Clone + 'static, G: PaymentGateway + 'static>(
    State(state): State<Arc<AppState<S, G>>>,
    CurrentUser(user_id): CurrentUser,
    path: Result<Path<OrderId>, PathRejection>,
) -> Result<Reply<PaymentResponse>, ApiError> {
    let Path(order_id) = path?;
    let payment = state
        .payments
        .get_payment_for_order(order_id, user_id)
        .await?;
    Ok(Reply(
        StatusCode::OK,
        ApiResponse::ok("Payment retrieved successfully", PaymentResponse::from(&payment)),
    ))
}

/// POST /api/payments/webhook/simulate?transactionId=&success=
///
/// Called by the gateway, so no caller identity is required.
#[tracing::instrument(skip(state, query))]
pub async fn webhook<S: Store + Clone + 'static, G: PaymentGateway + 'static>(
    State(state): State<Arc<AppState<S, G>>>,
    query: Result<Query<WebhookQuery>, QueryRejection>,
) -> Result<Reply<PaymentResponse>, ApiError> {
    let Query(WebhookQuery {
        transaction_id,
        success,
    }) = query?;
    let payment = state
        .payments
        .settle_by_transaction(&transaction_id, success)
        .await?;
    Ok(Reply(
        StatusCode::OK,
        ApiResponse::ok("Webhook processed", PaymentResponse::from(&payment)),
    ))
}

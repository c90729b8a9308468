//! Order placement, query, cancellation and administration endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use checkout::{OrderLine, OrderService, PaymentGateway, PaymentService, PlaceOrder};
use chrono::{DateTime, Utc};
use common::{OrderId, OrderItemId, ProductId, UserId};
use domain::{Money, Order, OrderItem, OrderStatus};
use serde::{Deserialize, Serialize};
use store::Store;

use crate::error::ApiError;
use crate::identity::CurrentUser;
use crate::response::{ApiResponse, Reply};

/// Shared application state accessible from all handlers.
pub struct AppState<S: Store, G: PaymentGateway> {
    pub orders: OrderService<S>,
    pub payments: PaymentService<S, G>,
}

// -- Request types --

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    pub shipping_address: String,
    #[serde(default)]
    pub notes: Option<String>,
    pub items: Vec<OrderItemRequest>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItemRequest {
    pub product_id: ProductId,
    pub quantity: u32,
}

#[derive(Debug, Deserialize)]
pub struct StatusQuery {
    pub status: String,
}

// -- Response types --

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
    pub id: OrderId,
    pub user_id: UserId,
    pub status: OrderStatus,
    pub total_amount: Money,
    pub shipping_address: String,
    pub notes: Option<String>,
    pub items: Vec<OrderItemResponse>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItemResponse {
    pub id: OrderItemId,
    pub product_id: ProductId,
    pub product_name: String,
    pub unit_price: Money,
    pub quantity: u32,
    pub subtotal: Money,
}

impl From<&OrderItem> for OrderItemResponse {
    fn from(item: &OrderItem) -> Self {
        Self {
            id: item.id,
            product_id: item.product_id,
            product_name: item.product_name.clone(),
            unit_price: item.unit_price,
            quantity: item.quantity,
            subtotal: item.subtotal,
        }
    }
}

impl From<&Order> for OrderResponse {
    fn from(order: &Order) -> Self {
        Self {
            id: order.id(),
            user_id: order.user_id(),
            status: order.status(),
            total_amount: order.total_amount(),
            shipping_address: order.shipping_address().to_string(),
            notes: order.notes().map(str::to_string),
            items: order.items().iter().map(OrderItemResponse::from).collect(),
            created_at: order.created_at(),
            updated_at: order.updated_at(),
        }
    }
}

fn order_list(orders: &[Order]) -> Vec<OrderResponse> {
    orders.iter().map(OrderResponse::from).collect()
}

fn parse_status(raw: &str) -> Result<OrderStatus, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::BadRequest(format!("Invalid order status: {raw}")))
}

// -- Handlers --

/// POST /api/orders: places an order for the caller.
#[tracing::instrument(skip(state, body))]
pub async fn create<S: Store + Clone + 'static, G: PaymentGateway + 'static>(
    State(state): State<Arc<AppState<S, G>>>,
    CurrentUser(user_id): CurrentUser,
    body: Result<Json<CreateOrderRequest>, JsonRejection>,
) -> Result<Reply<OrderResponse>, ApiError> {
    let Json(req) = body?;

    let lines = req
        .items
        .iter()
        .map(|item| OrderLine::new(item.product_id, item.quantity))
        .collect();
    let mut request = PlaceOrder::new(user_id, req.shipping_address, lines);
    if let Some(notes) = req.notes {
        request = request.with_notes(notes);
    }

    let order = state.orders.place_order(request).await?;

    Ok(Reply(
        StatusCode::CREATED,
        ApiResponse::ok("Order created successfully", OrderResponse::from(&order)),
    ))
}

/// GET /api/orders/my-orders: lists the caller's orders, newest first.
#[tracing::instrument(skip(state))]
pub async fn mine<S: Store + Clone + 'static, G: PaymentGateway + 'static>(
    State(state): State<Arc<AppState<S, G>>>,
    CurrentUser(user_id): CurrentUser,
) -> Result<Reply<Vec<OrderResponse>>, ApiError> {
    let orders = state.orders.list_orders(user_id).await?;
    Ok(Reply(
        StatusCode::OK,
        ApiResponse::ok("Orders retrieved successfully", order_list(&orders)),
    ))
}

/// GET /api/orders/{id}: returns one of the caller's orders.
#[tracing::instrument(skip(state, path))]
pub async fn get<S: Store + Clone + 'static, G: PaymentGateway + 'static>(
    State(state): State<Arc<AppState<S, G>>>,
    CurrentUser(user_id): CurrentUser,
    path: Result<Path<OrderId>, PathRejection>,
) -> Result<Reply<OrderResponse>, ApiError> {
    let Path(order_id) = path?;
    let order = state.orders.get_order(order_id, user_id).await?;
    Ok(Reply(
        StatusCode::OK,
        ApiResponse::ok("Order retrieved successfully", OrderResponse::from(&order)),
    ))
}

/// PUT /api/orders/{id}/cancel: cancels one of the caller's orders.
#[tracing::instrument(skip(state, path))]
pub async fn cancel<S: Store + Clone + 'static, G: PaymentGateway + 'static>(
    State(state): State<Arc<AppState<S, G>>>,
    CurrentUser(user_id): CurrentUser,
    path: Result<Path<OrderId>, PathRejection>,
) -> Result<Reply<OrderResponse>, ApiError> {
    let Path(order_id) = path?;
    let order = state.orders.cancel_order(order_id, user_id).await?;
    Ok(Reply(
        StatusCode::OK,
        ApiResponse::ok("Order cancelled successfully", OrderResponse::from(&order)),
    ))
}

/// GET /api/orders/admin/all
#[tracing::instrument(skip(state))]
pub async fn admin_all<S: Store + Clone + 'static, G: PaymentGateway + 'static>(
    State(state): State<Arc<AppState<S, G>>>,
    CurrentUser(user_id): CurrentUser,
) -> Result<Reply<Vec<OrderResponse>>, ApiError> {
    let orders = state.orders.list_all_orders(user_id).await?;
    Ok(Reply(
        StatusCode::OK,
        ApiResponse::ok("Orders retrieved successfully", order_list(&orders)),
    ))
}

/// GET /api/orders/admin/status/{status}
#[tracing::instrument(skip(state, path))]
pub async fn admin_by_status<S: Store + Clone + 'static, G: PaymentGateway + 'static>(
    State(state): State<Arc<AppState<S, G>>>,
    CurrentUser(user_id): CurrentUser,
    path: Result<Path<String>, PathRejection>,
) -> Result<Reply<Vec<OrderResponse>>, ApiError> {
    let Path(raw) = path?;
    let status = parse_status(&raw)?;
    let orders = state.orders.list_orders_by_status(user_id, status).await?;
    Ok(Reply(
        StatusCode::OK,
        ApiResponse::ok("Orders retrieved successfully", order_list(&orders)),
    ))
}

/// PUT /api/orders/admin/{id}/status?status=
#[tracing::instrument(skip(state, path, query))]
pub async fn admin_update_status<S: Store + Clone + 'static, G: PaymentGateway + 'static>(
    State(state): State<Arc<AppState<S, G>>>,
    CurrentUser(user_id): CurrentUser,
    path: Result<Path<OrderId>, PathRejection>,
    query: Result<Query<StatusQuery>, QueryRejection>,
) -> Result<Reply<OrderResponse>, ApiError> {
    let Path(order_id) = path?;
    let Query(StatusQuery { status }) = query?;
    let status = parse_status(&status)?;

    let order = state
        .orders
        .update_order_status(user_id, order_id, status)
        .await?;
    Ok(Reply(
        StatusCode::OK,
        ApiResponse::ok("Order status updated successfully", OrderResponse::from(&order)),
    ))
}

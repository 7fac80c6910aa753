//! Checkout, payment and order lookup endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use checkout::{OrderDetails, Settlement};
use common::OrderId;
use domain::{Order, OrderStatus, Payment};
use serde::{Deserialize, Serialize};
use store::CheckoutStore;

use crate::AppState;
use crate::error::ApiError;
use crate::identity::Caller;

// -- Request types --

#[derive(Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
}

// -- Response types --

#[derive(Serialize)]
pub struct OrderResponse {
    pub id: String,
    pub user_id: String,
    pub status: String,
    pub items: Vec<OrderItemResponse>,
    pub total_cents: i64,
    pub expires_at: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Serialize)]
pub struct OrderItemResponse {
    pub product_id: String,
    pub quantity: u32,
    pub price_at_purchase_cents: i64,
}

#[derive(Serialize)]
pub struct PaymentResponse {
    pub id: String,
    pub transaction_id: String,
    pub amount_cents: i64,
    pub status: String,
    pub created_at: String,
}

#[derive(Serialize)]
pub struct OrderDetailsResponse {
    pub order: OrderResponse,
    pub payment: Option<PaymentResponse>,
}

impl From<&Order> for OrderResponse {
    fn from(order: &Order) -> Self {
        Self {
            id: order.id().to_string(),
            user_id: order.user_id().to_string(),
            status: order.status().to_string(),
            items: order
                .items()
                .iter()
                .map(|item| OrderItemResponse {
                    product_id: item.product_id.to_string(),
                    quantity: item.quantity,
                    price_at_purchase_cents: item.price_at_purchase.cents(),
                })
                .collect(),
            total_cents: order.total_amount().cents(),
            expires_at: order.expires_at().to_rfc3339(),
            created_at: order.created_at().to_rfc3339(),
            updated_at: order.updated_at().to_rfc3339(),
        }
    }
}

impl From<&Payment> for PaymentResponse {
    fn from(payment: &Payment) -> Self {
        Self {
            id: payment.id.to_string(),
            transaction_id: payment.transaction_id.to_string(),
            amount_cents: payment.amount.cents(),
            status: payment.status.to_string(),
            created_at: payment.created_at.to_rfc3339(),
        }
    }
}

impl From<OrderDetails> for OrderDetailsResponse {
    fn from(details: OrderDetails) -> Self {
        Self {
            order: OrderResponse::from(&details.order),
            payment: details.payment.as_ref().map(PaymentResponse::from),
        }
    }
}

impl From<Settlement> for OrderDetailsResponse {
    fn from(settlement: Settlement) -> Self {
        Self {
            order: OrderResponse::from(&settlement.order),
            payment: Some(PaymentResponse::from(&settlement.payment)),
        }
    }
}

// -- Handlers --

/// POST /orders/checkout: reserve the caller's cart as a pending order.
#[tracing::instrument(skip(state))]
pub async fn checkout<S: CheckoutStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Caller(user_id): Caller,
) -> Result<(StatusCode, Json<OrderResponse>), ApiError> {
    let order = state.engine.create_order_from_cart(user_id).await?;
    Ok((StatusCode::CREATED, Json(OrderResponse::from(&order))))
}

/// GET /orders/{id}: the caller's order with its payment, if any.
#[tracing::instrument(skip(state))]
pub async fn get<S: CheckoutStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Caller(user_id): Caller,
    Path(id): Path<String>,
) -> Result<Json<OrderDetailsResponse>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let details = state.engine.order_details(order_id, user_id).await?;
    Ok(Json(details.into()))
}

/// POST /orders/{id}/pay: settle a pending order.
#[tracing::instrument(skip(state))]
pub async fn pay<S: CheckoutStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Caller(user_id): Caller,
    Path(id): Path<String>,
) -> Result<Json<OrderDetailsResponse>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let settlement = state.engine.pay(order_id, user_id).await?;
    Ok(Json(settlement.into()))
}

/// PATCH /admin/orders/{id}/status: advance a paid order to shipped or
/// delivered.
#[tracing::instrument(skip(state, req))]
pub async fn update_status<S: CheckoutStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Json(req): Json<UpdateStatusRequest>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let target: OrderStatus = req
        .status
        .parse()
        .map_err(|e: domain::UnknownOrderStatus| ApiError::BadRequest(e.to_string()))?;

    let order = state.engine.advance_status(order_id, target).await?;
    Ok(Json(OrderResponse::from(&order)))
}

// -- Helpers --

fn parse_order_id(id: &str) -> Result<OrderId, ApiError> {
    let uuid = uuid::Uuid::parse_str(id)
        .map_err(|e| ApiError::BadRequest(format!("Invalid order ID: {e}")))?;
    Ok(OrderId::from_uuid(uuid))
}

//! Cart replacement endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use domain::{Cart, CartItem};
use serde::{Deserialize, Serialize};
use store::CheckoutStore;

use crate::AppState;
use crate::error::ApiError;
use crate::identity::Caller;

#[derive(Deserialize)]
pub struct CartRequest {
    pub items: Vec<CartItemRequest>,
}

#[derive(Deserialize)]
pub struct CartItemRequest {
    pub product_id: String,
    pub quantity: u32,
}

#[derive(Serialize)]
pub struct CartResponse {
    pub user_id: String,
    pub items: Vec<CartItemResponse>,
    pub updated_at: String,
}

#[derive(Serialize)]
pub struct CartItemResponse {
    pub product_id: String,
    pub quantity: u32,
}

impl From<Cart> for CartResponse {
    fn from(cart: Cart) -> Self {
        Self {
            user_id: cart.user_id.to_string(),
            items: cart
                .items
                .into_iter()
                .map(|item| CartItemResponse {
                    product_id: item.product_id.to_string(),
                    quantity: item.quantity,
                })
                .collect(),
            updated_at: cart.updated_at.to_rfc3339(),
        }
    }
}

/// PUT /cart: replace the caller's cart.
#[tracing::instrument(skip(state, req))]
pub async fn replace<S: CheckoutStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Caller(user_id): Caller,
    Json(req): Json<CartRequest>,
) -> Result<Json<CartResponse>, ApiError> {
    let items = req
        .items
        .into_iter()
        .map(|item| CartItem::new(item.product_id, item.quantity))
        .collect();

    let cart = state.engine.replace_cart(user_id, items).await?;
    Ok(Json(cart.into()))
}

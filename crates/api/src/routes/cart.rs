//! Cart route handlers.
//!
//! The cart lives in `cart_items`; checkout turns it into an order in the
//! same transaction that empties it.

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::instrument;

use booknest_core::{BookId, PaymentMethod, UserId};

use crate::db::RepositoryError;
use crate::db::carts::CartRepository;
use crate::db::orders::StockError;
use crate::error::{AppError, Result};
use crate::extract::{ApiJson, ApiPath};
use crate::middleware::AuthUser;
use crate::models::Cart;
use crate::services::orders::{OrderService, ShippingAddressInput};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddItemRequest {
    pub book_id: BookId,
    #[serde(default = "one")]
    pub quantity: i32,
}

const fn one() -> i32 {
    1
}

#[derive(Debug, Deserialize)]
pub struct QuantityRequest {
    pub quantity: i32,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CheckoutRequest {
    pub shipping_address: Option<ShippingAddressInput>,
    pub payment_method: Option<PaymentMethod>,
}

fn item_not_found() -> AppError {
    AppError::NotFound("Item not found in cart".to_owned())
}

async fn cart_response(state: &AppState, user_id: UserId) -> Result<Json<Value>> {
    let cart = Cart::from(CartRepository::new(state.pool()).lines(user_id).await?);
    Ok(super::success(json!({ "cart": cart })))
}

/// The caller's cart with totals.
pub async fn show(State(state): State<AppState>, AuthUser(user): AuthUser) -> Result<Json<Value>> {
    cart_response(&state, user.id).await
}

#[instrument(skip_all, fields(user_id = %user.id, book_id = %body.book_id))]
pub async fn add(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ApiJson(body): ApiJson<AddItemRequest>,
) -> Result<Json<Value>> {
    if body.quantity < 1 {
        return Err(AppError::BadRequest("Quantity must be at least 1".to_owned()));
    }

    CartRepository::new(state.pool())
        .add(user.id, body.book_id, body.quantity)
        .await?;
    cart_response(&state, user.id).await
}

/// Set a line's quantity; zero removes it.
#[instrument(skip_all, fields(user_id = %user.id, book_id = %book_id))]
pub async fn set_quantity(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ApiPath(book_id): ApiPath<BookId>,
    ApiJson(body): ApiJson<QuantityRequest>,
) -> Result<Json<Value>> {
    let carts = CartRepository::new(state.pool());
    match body.quantity {
        q if q < 0 => {
            return Err(AppError::BadRequest("Quantity cannot be negative".to_owned()));
        }
        0 => {
            if !carts.remove(user.id, book_id).await? {
                return Err(item_not_found());
            }
        }
        q => carts
            .set_quantity(user.id, book_id, q)
            .await
            .map_err(|e| match e {
                StockError::Repository(RepositoryError::NotFound) => item_not_found(),
                other => other.into(),
            })?,
    }

    cart_response(&state, user.id).await
}

pub async fn remove(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ApiPath(book_id): ApiPath<BookId>,
) -> Result<Json<Value>> {
    if !CartRepository::new(state.pool())
        .remove(user.id, book_id)
        .await?
    {
        return Err(item_not_found());
    }
    cart_response(&state, user.id).await
}

pub async fn clear(State(state): State<AppState>, AuthUser(user): AuthUser) -> Result<Json<Value>> {
    CartRepository::new(state.pool()).clear(user.id).await?;
    Ok(Json(json!({ "status": "success", "message": "Cart cleared" })))
}

/// Place an order for everything in the cart.
#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn checkout(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ApiJson(body): ApiJson<CheckoutRequest>,
) -> Result<impl IntoResponse> {
    let order = OrderService::new(state.pool(), state.hub())
        .checkout(&user, body.shipping_address.as_ref(), body.payment_method)
        .await?;

    Ok((
        StatusCode::CREATED,
        super::success(json!({ "order": order })),
    ))
}

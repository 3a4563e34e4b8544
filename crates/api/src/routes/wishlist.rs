//! Wishlist route handlers.

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::instrument;

use booknest_core::{BookId, Role, UserId};

use crate::db::RepositoryError;
use crate::db::wishlist::WishlistRepository;
use crate::error::{AppError, Result};
use crate::extract::{ApiJson, ApiPath};
use crate::middleware::AuthUser;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WishlistRequest {
    pub book_id: BookId,
}

pub async fn index(State(state): State<AppState>, AuthUser(user): AuthUser) -> Result<Json<Value>> {
    let items = WishlistRepository::new(state.pool()).list(user.id).await?;
    Ok(super::listing("wishlist", &items))
}

/// Another user's wishlist: only that user or an admin.
pub async fn for_user(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ApiPath(user_id): ApiPath<UserId>,
) -> Result<Json<Value>> {
    if user.id != user_id && user.role != Role::Admin {
        return Err(AppError::permission_denied());
    }

    let items = WishlistRepository::new(state.pool()).list(user_id).await?;
    Ok(super::listing("wishlist", &items))
}

#[instrument(skip_all, fields(user_id = %user.id, book_id = %body.book_id))]
pub async fn add(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ApiJson(body): ApiJson<WishlistRequest>,
) -> Result<impl IntoResponse> {
    let item = WishlistRepository::new(state.pool())
        .add(user.id, &user.name, body.book_id)
        .await?
        .ok_or_else(|| AppError::NotFound("No book found with that ID".to_owned()))?;

    Ok((StatusCode::CREATED, super::success(json!({ "item": item }))))
}

async fn remove_entry(state: &AppState, user_id: UserId, book_id: BookId) -> Result<Json<Value>> {
    WishlistRepository::new(state.pool())
        .remove(user_id, book_id)
        .await
        .map_err(|e| match e {
            RepositoryError::NotFound => {
                AppError::NotFound("Item not found in wishlist".to_owned())
            }
            other => other.into(),
        })?;

    Ok(Json(json!({
        "status": "success",
        "message": "Item removed from wishlist",
    })))
}

pub async fn remove(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ApiJson(body): ApiJson<WishlistRequest>,
) -> Result<Json<Value>> {
    remove_entry(&state, user.id, body.book_id).await
}

pub async fn remove_book(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ApiPath(book_id): ApiPath<BookId>,
) -> Result<Json<Value>> {
    remove_entry(&state, user.id, book_id).await
}

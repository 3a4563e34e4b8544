//! Administration route handlers. Every handler requires the admin role.

use axum::{Json, extract::State, http::StatusCode};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::instrument;

use booknest_core::{BookId, OrderId, Role, UserId};

use crate::db::books::BookRepository;
use crate::db::orders::OrderRepository;
use crate::db::users::UserRepository;
use crate::error::{AppError, Result};
use crate::extract::{ApiJson, ApiPath, ApiQuery};
use crate::middleware::RequireAdmin;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct UserListQuery {
    pub role: Option<Role>,
}

#[derive(Debug, Deserialize)]
pub struct ActiveRequest {
    pub active: bool,
}

pub async fn list_users(
    State(state): State<AppState>,
    _admin: RequireAdmin,
    ApiQuery(query): ApiQuery<UserListQuery>,
) -> Result<Json<Value>> {
    let users = UserRepository::new(state.pool()).list(query.role).await?;
    Ok(super::listing("users", &users))
}

#[instrument(skip_all, fields(admin_id = %user.id, target_id = %id))]
pub async fn delete_user(
    State(state): State<AppState>,
    RequireAdmin { user, .. }: RequireAdmin,
    ApiPath(id): ApiPath<UserId>,
) -> Result<StatusCode> {
    if user.id == id {
        return Err(AppError::BadRequest(
            "You cannot delete your own account".to_owned(),
        ));
    }

    UserRepository::new(state.pool()).delete(id).await?;
    tracing::info!("User deleted by admin");
    Ok(StatusCode::NO_CONTENT)
}

/// Deactivate or reactivate an account.
#[instrument(skip_all, fields(admin_id = %user.id, target_id = %id, active = body.active))]
pub async fn set_active(
    State(state): State<AppState>,
    RequireAdmin { user, .. }: RequireAdmin,
    ApiPath(id): ApiPath<UserId>,
    ApiJson(body): ApiJson<ActiveRequest>,
) -> Result<Json<Value>> {
    if user.id == id && !body.active {
        return Err(AppError::BadRequest(
            "You cannot deactivate your own account".to_owned(),
        ));
    }

    let target = UserRepository::new(state.pool())
        .set_active(id, body.active)
        .await?;
    Ok(super::success(json!({ "user": target })))
}

#[instrument(skip_all, fields(admin_id = %user.id, order_id = %id))]
pub async fn delete_order(
    State(state): State<AppState>,
    RequireAdmin { user, .. }: RequireAdmin,
    ApiPath(id): ApiPath<OrderId>,
) -> Result<StatusCode> {
    OrderRepository::new(state.pool()).delete(id).await?;
    tracing::info!("Order deleted by admin");
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip_all, fields(admin_id = %user.id, book_id = %id))]
pub async fn delete_book(
    State(state): State<AppState>,
    RequireAdmin { user, .. }: RequireAdmin,
    ApiPath(id): ApiPath<BookId>,
) -> Result<StatusCode> {
    BookRepository::new(state.pool()).delete(id).await?;
    state.analytics().invalidate_catalog().await;
    tracing::info!("Book deleted by admin");
    Ok(StatusCode::NO_CONTENT)
}

//! Dashboard route handlers.

use axum::{Json, extract::State};
use serde::Deserialize;
use serde_json::{Value, json};

use booknest_core::{Role, UserId};

use crate::db::analytics::AnalyticsRepository;
use crate::error::{AppError, Result};
use crate::extract::ApiQuery;
use crate::middleware::{RequireAdmin, RequireStaff};
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SellerQuery {
    pub seller_id: Option<UserId>,
}

/// Which seller's dashboard the caller gets.
fn dashboard_owner(user_id: UserId, role: Role, requested: Option<UserId>) -> Result<UserId> {
    match role {
        Role::Admin => requested.ok_or_else(|| {
            AppError::BadRequest("Please provide sellerId".to_owned())
        }),
        _ => Ok(user_id),
    }
}

/// A seller's own dashboard, or any seller's for an admin.
pub async fn seller(
    State(state): State<AppState>,
    RequireStaff { user, .. }: RequireStaff,
    ApiQuery(query): ApiQuery<SellerQuery>,
) -> Result<Json<Value>> {
    let seller_id = dashboard_owner(user.id, user.role, query.seller_id)?;
    let analytics = AnalyticsRepository::new(state.pool())
        .seller(seller_id)
        .await?;
    Ok(super::success(json!({ "analytics": analytics })))
}

/// Site-wide dashboard, cached briefly.
pub async fn admin(State(state): State<AppState>, _admin: RequireAdmin) -> Result<Json<Value>> {
    let analytics = state.analytics().admin_dashboard(state.pool()).await?;
    Ok(super::success(json!({ "analytics": &*analytics })))
}

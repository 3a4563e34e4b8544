//! Order route handlers.
//!
//! Placement, cancellation and status changes go through `OrderService`,
//! which owns stock accounting and buyer notifications.

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::instrument;

use booknest_core::{OrderId, OrderStatus, PaymentMethod, Role, UserId};

use crate::db::orders::OrderRepository;
use crate::error::{AppError, Result};
use crate::extract::{ApiJson, ApiPath, ApiQuery};
use crate::middleware::{AuthUser, RequireAdmin, RequireStaff};
use crate::models::{Order, OrderLine, OrderListFilter};
use crate::services::orders::{OrderService, ShippingAddressInput};
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CreateOrderRequest {
    pub items: Vec<OrderLine>,
    pub shipping_address: Option<ShippingAddressInput>,
    pub payment_method: Option<PaymentMethod>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct StatusRequest {
    pub status: Option<OrderStatus>,
    pub note: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TrackingRequest {
    pub tracking_number: Option<String>,
    pub courier: Option<String>,
    pub estimated_delivery: Option<DateTime<Utc>>,
}

impl TrackingRequest {
    fn tracking_number(&self) -> Result<&str> {
        self.tracking_number
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AppError::BadRequest("Please provide trackingNumber".to_owned()))
    }
}

fn paginated(orders: &[Order], total: i64, filter: &OrderListFilter) -> Json<Value> {
    let page = filter.pagination();
    Json(json!({
        "status": "success",
        "results": orders.len(),
        "total": total,
        "page": page.page(),
        "pages": page.pages(total),
        "data": { "orders": orders },
    }))
}

fn order_body(order: &Order) -> Json<Value> {
    super::success(json!({ "order": order }))
}

/// Sellers are scoped to orders containing their books.
const fn seller_scope(user_id: UserId, role: Role) -> Option<UserId> {
    match role {
        Role::Seller => Some(user_id),
        _ => None,
    }
}

/// Place an order for the listed books.
#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn create(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ApiJson(body): ApiJson<CreateOrderRequest>,
) -> Result<impl IntoResponse> {
    let order = OrderService::new(state.pool(), state.hub())
        .place(
            &user,
            &body.items,
            body.shipping_address.as_ref(),
            body.payment_method,
        )
        .await?;

    Ok((StatusCode::CREATED, order_body(&order)))
}

/// The caller's orders, newest first.
pub async fn my_orders(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<Json<Value>> {
    let orders = OrderRepository::new(state.pool())
        .list_for_user(user.id)
        .await?;
    Ok(super::listing("orders", &orders))
}

/// Staff listing: admins see everything, sellers their own orders.
pub async fn index(
    State(state): State<AppState>,
    RequireStaff { user, .. }: RequireStaff,
    ApiQuery(filter): ApiQuery<OrderListFilter>,
) -> Result<Json<Value>> {
    let (orders, total) = OrderRepository::new(state.pool())
        .list(&filter, seller_scope(user.id, user.role))
        .await?;
    Ok(paginated(&orders, total, &filter))
}

pub async fn stats(
    State(state): State<AppState>,
    RequireStaff { user, .. }: RequireStaff,
) -> Result<Json<Value>> {
    let stats = OrderRepository::new(state.pool())
        .stats(seller_scope(user.id, user.role))
        .await?;
    Ok(super::success(json!({ "stats": stats })))
}

/// Orders containing a seller's books. Sellers may only ask for themselves.
pub async fn by_seller(
    State(state): State<AppState>,
    RequireStaff { user, .. }: RequireStaff,
    ApiPath(seller_id): ApiPath<UserId>,
    ApiQuery(filter): ApiQuery<OrderListFilter>,
) -> Result<Json<Value>> {
    if user.role == Role::Seller && user.id != seller_id {
        return Err(AppError::Forbidden(
            "You can only view your own orders".to_owned(),
        ));
    }

    let (orders, total) = OrderRepository::new(state.pool())
        .list(&filter, Some(seller_id))
        .await?;
    Ok(paginated(&orders, total, &filter))
}

pub async fn show(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ApiPath(id): ApiPath<OrderId>,
) -> Result<Json<Value>> {
    let order = OrderService::new(state.pool(), state.hub())
        .get_for(&user, id)
        .await?;
    Ok(order_body(&order))
}

/// Buyer cancellation.
#[instrument(skip_all, fields(user_id = %user.id, order_id = %id))]
pub async fn cancel(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ApiPath(id): ApiPath<OrderId>,
) -> Result<Json<Value>> {
    let order = OrderService::new(state.pool(), state.hub())
        .cancel(&user, id)
        .await?;
    Ok(order_body(&order))
}

#[instrument(skip_all, fields(user_id = %user.id, order_id = %id))]
pub async fn update_status(
    State(state): State<AppState>,
    RequireStaff { user, .. }: RequireStaff,
    ApiPath(id): ApiPath<OrderId>,
    ApiJson(body): ApiJson<StatusRequest>,
) -> Result<Json<Value>> {
    let next = body
        .status
        .ok_or_else(|| AppError::BadRequest("Please provide status".to_owned()))?;
    let note = body.note.as_deref().map(str::trim).filter(|n| !n.is_empty());

    let order = OrderService::new(state.pool(), state.hub())
        .update_status(&user, id, next, note)
        .await?;
    Ok(order_body(&order))
}

#[instrument(skip_all, fields(user_id = %user.id, order_id = %id))]
pub async fn update_tracking(
    State(state): State<AppState>,
    RequireStaff { user, .. }: RequireStaff,
    ApiPath(id): ApiPath<OrderId>,
    ApiJson(body): ApiJson<TrackingRequest>,
) -> Result<Json<Value>> {
    let tracking_number = body.tracking_number()?;
    let courier = body.courier.as_deref().map(str::trim).filter(|c| !c.is_empty());

    let order = OrderService::new(state.pool(), state.hub())
        .set_tracking(&user, id, tracking_number, courier, body.estimated_delivery)
        .await?;
    Ok(order_body(&order))
}

#[instrument(skip_all, fields(user_id = %user.id, order_id = %id))]
pub async fn remove(
    State(state): State<AppState>,
    RequireAdmin { user, .. }: RequireAdmin,
    ApiPath(id): ApiPath<OrderId>,
) -> Result<StatusCode> {
    OrderRepository::new(state.pool()).delete(id).await?;
    tracing::info!("Order deleted");
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use booknest_core::BookId;

    use super::*;

    #[test]
    fn test_create_order_request() {
        let body: CreateOrderRequest = serde_json::from_str(
            r#"{"items":[{"bookId":3,"quantity":2}],
                "shippingAddress":{"street":"12 Park St","city":"Kolkata","state":"WB","pincode":"700016"},
                "paymentMethod":"card"}"#,
        )
        .unwrap();

        assert_eq!(
            body.items,
            vec![OrderLine {
                book_id: BookId::new(3),
                quantity: 2
            }]
        );
        assert_eq!(body.payment_method, Some(PaymentMethod::Card));
    }

    #[test]
    fn test_status_request_rejects_unknown_status() {
        assert!(serde_json::from_str::<StatusRequest>(r#"{"status":"lost"}"#).is_err());

        let body: StatusRequest =
            serde_json::from_str(r#"{"status":"shipped","note":"Left the warehouse"}"#).unwrap();
        assert_eq!(body.status, Some(OrderStatus::Shipped));
    }

    #[test]
    fn test_tracking_number_required() {
        let body = TrackingRequest {
            tracking_number: Some("  ".to_owned()),
            ..TrackingRequest::default()
        };
        assert_eq!(
            body.tracking_number().unwrap_err().parts().1,
            "Please provide trackingNumber"
        );

        let body: TrackingRequest = serde_json::from_str(
            r#"{"trackingNumber":"BN123","estimatedDelivery":"2026-11-02T10:00:00Z"}"#,
        )
        .unwrap();
        assert_eq!(body.tracking_number().unwrap(), "BN123");
        assert!(body.estimated_delivery.is_some());
    }

    #[test]
    fn test_seller_scope() {
        let id = UserId::new(4);
        assert_eq!(seller_scope(id, Role::Seller), Some(id));
        assert_eq!(seller_scope(id, Role::Admin), None);
    }
}

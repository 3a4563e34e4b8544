//! Order placement and lifecycle.
//!
//! Wraps `OrderRepository` with request validation, permission checks and
//! buyer/seller notifications.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use sqlx::PgPool;
use thiserror::Error;
use tracing::instrument;

use booknest_core::{AddressError, OrderId, OrderStatus, PaymentMethod, Role, ShippingAddress};

use crate::db::RepositoryError;
use crate::db::carts::CartRepository;
use crate::db::orders::{OrderRepository, StockAlert, StockError};
use crate::models::{NewOrder, Order, OrderLine, User, merge_lines};
use crate::services::notifications::{Notification, NotificationHub};

/// Errors from order operations. `Display` strings are client-facing.
#[derive(Debug, Error)]
pub enum OrderError {
    #[error("Please provide at least one item")]
    NoItems,

    #[error("Quantity must be at least 1")]
    InvalidQuantity,

    #[error("Please provide shippingAddress")]
    MissingAddress,

    #[error("{0}")]
    InvalidAddress(#[from] AddressError),

    #[error("Your cart is empty")]
    EmptyCart,

    #[error("No order found with that ID")]
    NotFound,

    #[error("You do not have permission to view this order")]
    ViewForbidden,

    #[error("You do not have permission to cancel this order")]
    CancelForbidden,

    #[error("You do not have permission to update this order")]
    UpdateForbidden,

    #[error("Order cannot be cancelled at this stage")]
    NotCancellable,

    #[error("Cannot change order status from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    #[error("{0}")]
    Stock(#[from] StockError),

    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),
}

/// Shipping address as sent by the client; validated into `ShippingAddress`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ShippingAddressInput {
    #[serde(default)]
    pub street: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub pincode: String,
}

impl ShippingAddressInput {
    /// # Errors
    ///
    /// Returns `AddressError` for a blank field or a malformed pincode.
    pub fn validate(&self) -> Result<ShippingAddress, AddressError> {
        ShippingAddress::new(&self.street, &self.city, &self.state, &self.pincode)
    }
}

/// Check lines and address and build a `NewOrder` for `buyer`.
///
/// # Errors
///
/// Returns `OrderError::NoItems`, `InvalidQuantity`, `MissingAddress` or
/// `InvalidAddress`.
pub fn build_new_order(
    buyer: &User,
    lines: &[OrderLine],
    address: Option<&ShippingAddressInput>,
    payment_method: Option<PaymentMethod>,
) -> Result<NewOrder, OrderError> {
    if lines.is_empty() {
        return Err(OrderError::NoItems);
    }
    if lines.iter().any(|l| l.quantity < 1) {
        return Err(OrderError::InvalidQuantity);
    }
    let shipping_address = address.ok_or(OrderError::MissingAddress)?.validate()?;

    Ok(NewOrder {
        user_id: buyer.id,
        user_name: buyer.name.clone(),
        lines: merge_lines(lines),
        shipping_address,
        payment_method: payment_method.unwrap_or_default(),
    })
}

/// Whether `user` may see `order`: the buyer, an admin, or a seller with
/// an item in it.
#[must_use]
pub fn can_view(order: &Order, user: &User) -> bool {
    order.user_id == user.id || can_manage(order, user)
}

/// Whether `user` may change status or tracking on `order`.
#[must_use]
pub fn can_manage(order: &Order, user: &User) -> bool {
    match user.role {
        Role::Admin => true,
        Role::Seller => order.has_item_from(user.id),
        Role::User => false,
    }
}

/// Order service.
pub struct OrderService<'a> {
    pool: &'a PgPool,
    orders: OrderRepository<'a>,
    hub: &'a NotificationHub,
}

impl<'a> OrderService<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool, hub: &'a NotificationHub) -> Self {
        Self {
            pool,
            orders: OrderRepository::new(pool),
            hub,
        }
    }

    /// Place an order from explicit lines.
    ///
    /// # Errors
    ///
    /// Returns a validation `OrderError`, or `OrderError::Stock` if a book is
    /// missing or short.
    #[instrument(skip_all, fields(user_id = %buyer.id))]
    pub async fn place(
        &self,
        buyer: &User,
        lines: &[OrderLine],
        address: Option<&ShippingAddressInput>,
        payment_method: Option<PaymentMethod>,
    ) -> Result<Order, OrderError> {
        let new = build_new_order(buyer, lines, address, payment_method)?;
        self.submit(&new, false).await
    }

    /// Place an order from the buyer's cart and empty it.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::EmptyCart` if there is nothing to buy.
    #[instrument(skip_all, fields(user_id = %buyer.id))]
    pub async fn checkout(
        &self,
        buyer: &User,
        address: Option<&ShippingAddressInput>,
        payment_method: Option<PaymentMethod>,
    ) -> Result<Order, OrderError> {
        let lines = CartRepository::new(self.pool).order_lines(buyer.id).await?;
        if lines.is_empty() {
            return Err(OrderError::EmptyCart);
        }
        let new = build_new_order(buyer, &lines, address, payment_method)?;
        self.submit(&new, true).await
    }

    async fn submit(&self, new: &NewOrder, clear_cart: bool) -> Result<Order, OrderError> {
        let placed = self.orders.create(new, clear_cart).await?;
        tracing::info!(
            order_id = %placed.order.id,
            total = %placed.order.total_amount,
            "Order placed"
        );

        self.alert_low_stock(&placed.alerts).await;
        Ok(placed.order)
    }

    async fn alert_low_stock(&self, alerts: &[StockAlert]) {
        for alert in alerts {
            self.hub
                .send_to_user(
                    alert.seller_id,
                    Notification::low_stock(alert.book_id, &alert.title, alert.stock),
                )
                .await;
        }
    }

    /// Load an order `viewer` is allowed to see.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::NotFound` or `OrderError::ViewForbidden`.
    pub async fn get_for(&self, viewer: &User, id: OrderId) -> Result<Order, OrderError> {
        let order = self.orders.get(id).await?.ok_or(OrderError::NotFound)?;
        if !can_view(&order, viewer) {
            return Err(OrderError::ViewForbidden);
        }
        Ok(order)
    }

    /// Buyer cancellation. Restores stock.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::CancelForbidden` for anyone but the buyer and
    /// `OrderError::NotCancellable` once the order has shipped.
    #[instrument(skip_all, fields(user_id = %buyer.id, order_id = %id))]
    pub async fn cancel(&self, buyer: &User, id: OrderId) -> Result<Order, OrderError> {
        let order = self.orders.get(id).await?.ok_or(OrderError::NotFound)?;
        if order.user_id != buyer.id {
            return Err(OrderError::CancelForbidden);
        }
        if !order.status.is_cancellable() {
            return Err(OrderError::NotCancellable);
        }

        let order = self
            .transition(&order, OrderStatus::Cancelled, Some("Cancelled by customer"))
            .await?;
        tracing::info!("Order cancelled by customer");
        Ok(order)
    }

    /// Staff status change following the lifecycle table.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::UpdateForbidden` for a seller with no items in
    /// the order, or `OrderError::InvalidTransition`.
    #[instrument(skip_all, fields(user_id = %actor.id, order_id = %id, status = %next))]
    pub async fn update_status(
        &self,
        actor: &User,
        id: OrderId,
        next: OrderStatus,
        note: Option<&str>,
    ) -> Result<Order, OrderError> {
        let order = self.orders.get(id).await?.ok_or(OrderError::NotFound)?;
        if !can_manage(&order, actor) {
            return Err(OrderError::UpdateForbidden);
        }
        if !order.status.can_transition_to(next) {
            return Err(OrderError::InvalidTransition {
                from: order.status,
                to: next,
            });
        }

        let order = self.transition(&order, next, note).await?;
        tracing::info!("Order status updated");
        Ok(order)
    }

    async fn transition(
        &self,
        order: &Order,
        next: OrderStatus,
        note: Option<&str>,
    ) -> Result<Order, OrderError> {
        let updated = self
            .orders
            .set_status(order.id, order.status, next, note)
            .await
            .map_err(|e| match e {
                RepositoryError::Conflict(_) => OrderError::InvalidTransition {
                    from: order.status,
                    to: next,
                },
                other => OrderError::Repository(other),
            })?;

        self.hub
            .send_to_user(
                updated.user_id,
                Notification::order_status(updated.id, updated.status),
            )
            .await;
        Ok(updated)
    }

    /// Record tracking details.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::UpdateForbidden` for a seller with no items in
    /// the order.
    #[instrument(skip_all, fields(user_id = %actor.id, order_id = %id))]
    pub async fn set_tracking(
        &self,
        actor: &User,
        id: OrderId,
        tracking_number: &str,
        courier: Option<&str>,
        estimated_delivery: Option<DateTime<Utc>>,
    ) -> Result<Order, OrderError> {
        let order = self.orders.get(id).await?.ok_or(OrderError::NotFound)?;
        if !can_manage(&order, actor) {
            return Err(OrderError::UpdateForbidden);
        }

        Ok(self
            .orders
            .set_tracking(id, tracking_number, courier, estimated_delivery)
            .await?)
    }
}

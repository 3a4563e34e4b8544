//! Orders, line items and status history.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use booknest_core::{
    BookId, OrderId, OrderItemId, OrderStatus, PaymentMethod, PaymentStatus, ShippingAddress,
    UserId,
};

use super::Pagination;

/// A placed order with its items and status history.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    pub user_name: String,
    pub items: Vec<OrderItem>,
    pub total_amount: Decimal,
    pub status: OrderStatus,
    pub shipping_address: ShippingAddress,
    pub payment_method: PaymentMethod,
    pub payment_status: PaymentStatus,
    pub transaction_id: Option<String>,
    pub tracking_number: Option<String>,
    pub courier: Option<String>,
    pub estimated_delivery: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub status_history: Vec<StatusEntry>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    #[must_use]
    pub fn has_item_from(&self, seller_id: UserId) -> bool {
        self.items.iter().any(|i| i.seller_id == seller_id)
    }
}

/// A purchased line. Title and price are captured at purchase time.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub id: OrderItemId,
    #[serde(skip)]
    pub order_id: OrderId,
    /// `None` once the book has been deleted from the catalog.
    pub book_id: Option<BookId>,
    pub seller_id: UserId,
    pub title: String,
    pub quantity: i32,
    pub price: Decimal,
}

/// One entry in an order's status history.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct StatusEntry {
    #[serde(skip)]
    pub order_id: OrderId,
    pub status: OrderStatus,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A requested line: which book and how many.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderLine {
    pub book_id: BookId,
    pub quantity: i32,
}

/// Merge lines for the same book and sort by book id.
///
/// Sorted lines make every transaction lock book rows in the same order.
#[must_use]
pub fn merge_lines(lines: &[OrderLine]) -> Vec<OrderLine> {
    let mut merged: BTreeMap<BookId, i32> = BTreeMap::new();
    for line in lines {
        let qty = merged.entry(line.book_id).or_insert(0);
        *qty = qty.saturating_add(line.quantity);
    }
    merged
        .into_iter()
        .map(|(book_id, quantity)| OrderLine { book_id, quantity })
        .collect()
}

/// A validated order request.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub user_id: UserId,
    pub user_name: String,
    /// Merged and sorted, every quantity at least 1.
    pub lines: Vec<OrderLine>,
    pub shipping_address: ShippingAddress,
    pub payment_method: PaymentMethod,
}

/// Filters for staff order listings.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct OrderListFilter {
    pub status: Option<OrderStatus>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

impl OrderListFilter {
    #[must_use]
    pub const fn pagination(&self) -> Pagination {
        Pagination {
            page: self.page,
            limit: self.limit,
        }
    }
}

/// Count and revenue for one status.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct StatusCount {
    pub status: OrderStatus,
    pub count: i64,
    pub revenue: Decimal,
}

/// Order statistics for the staff dashboard.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderStats {
    pub by_status: Vec<StatusCount>,
    pub total_orders: i64,
    /// Revenue from orders that were not cancelled.
    pub total_revenue: Decimal,
}

impl From<Vec<StatusCount>> for OrderStats {
    fn from(by_status: Vec<StatusCount>) -> Self {
        let total_orders = by_status.iter().map(|s| s.count).sum();
        let total_revenue = by_status
            .iter()
            .filter(|s| s.status != OrderStatus::Cancelled)
            .map(|s| s.revenue)
            .sum();
        Self {
            by_status,
            total_orders,
            total_revenue,
        }
    }
}

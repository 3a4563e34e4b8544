//! Wishlist entries.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use booknest_core::{BookId, UserId, WishlistItemId};

/// A saved book. Book fields are copied at the time it was added.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct WishlistItem {
    pub id: WishlistItemId,
    pub user_id: UserId,
    pub book_id: BookId,
    pub user_name: String,
    pub title: String,
    pub author: String,
    pub genre: String,
    pub price: Decimal,
    pub item_image: Option<String>,
    pub created_at: DateTime<Utc>,
}

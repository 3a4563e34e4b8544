//! Catalog types.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use booknest_core::{BookId, Price, UserId};

use super::Pagination;

/// Books with fewer units than this trigger low stock alerts.
pub const LOW_STOCK_THRESHOLD: i32 = 5;

/// A book listing.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Book {
    pub id: BookId,
    pub title: String,
    pub author: String,
    pub genre: String,
    pub description: String,
    pub price: Decimal,
    pub stock: i32,
    pub item_image: Option<String>,
    pub seller_id: UserId,
    pub seller_name: String,
    pub average_rating: Decimal,
    pub review_count: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Book {
    #[must_use]
    pub fn is_owned_by(&self, user_id: UserId) -> bool {
        self.seller_id == user_id
    }
}

/// A validated listing ready to insert.
#[derive(Debug, Clone)]
pub struct NewBook {
    pub title: String,
    pub author: String,
    pub genre: String,
    pub description: String,
    pub price: Price,
    pub stock: i32,
    pub item_image: Option<String>,
    pub seller_id: UserId,
    pub seller_name: String,
}

/// A partial update. `None` keeps the current value.
#[derive(Debug, Clone, Default)]
pub struct BookUpdate {
    pub title: Option<String>,
    pub author: Option<String>,
    pub genre: Option<String>,
    pub description: Option<String>,
    pub price: Option<Price>,
    pub stock: Option<i32>,
    pub item_image: Option<String>,
}

impl BookUpdate {
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.author.is_none()
            && self.genre.is_none()
            && self.description.is_none()
            && self.price.is_none()
            && self.stock.is_none()
            && self.item_image.is_none()
    }
}

/// Listing order for `GET /api/books`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookSort {
    #[default]
    Newest,
    Oldest,
    PriceAsc,
    PriceDesc,
    Rating,
    Title,
}

impl BookSort {
    /// `ORDER BY` clause. Each ends with `id` so pages are stable.
    #[must_use]
    pub const fn order_by(self) -> &'static str {
        match self {
            Self::Newest => "created_at DESC, id DESC",
            Self::Oldest => "created_at ASC, id ASC",
            Self::PriceAsc => "price ASC, id ASC",
            Self::PriceDesc => "price DESC, id DESC",
            Self::Rating => "average_rating DESC, review_count DESC, id DESC",
            Self::Title => "lower(title) ASC, id ASC",
        }
    }
}

/// Search and filter parameters for the catalog listing.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookFilter {
    /// Case-insensitive match on title, author or genre.
    pub q: Option<String>,
    pub genre: Option<String>,
    pub author: Option<String>,
    pub seller: Option<UserId>,
    pub min_price: Option<Decimal>,
    pub max_price: Option<Decimal>,
    pub min_rating: Option<Decimal>,
    pub in_stock: Option<bool>,
    #[serde(default)]
    pub sort: BookSort,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

impl BookFilter {
    #[must_use]
    pub const fn pagination(&self) -> Pagination {
        Pagination {
            page: self.page,
            limit: self.limit,
        }
    }

    /// `q` trimmed, `None` when blank.
    #[must_use]
    pub fn search_term(&self) -> Option<&str> {
        self.q.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }
}

/// Per-genre catalog statistics.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct GenreStats {
    pub genre: String,
    pub num_books: i64,
    pub avg_price: Decimal,
    pub min_price: Decimal,
    pub max_price: Decimal,
}

//! Domain models returned by repositories and serialized in API responses.
//!
//! JSON field names are camelCase to match what the web client sends and
//! expects.

pub mod book;
pub mod cart;
pub mod order;
pub mod review;
pub mod user;
pub mod wishlist;

pub use book::{Book, BookFilter, BookSort, BookUpdate, GenreStats, NewBook};
pub use cart::{Cart, CartLine};
pub use order::{
    NewOrder, Order, OrderItem, OrderLine, OrderListFilter, OrderStats, StatusCount, StatusEntry,
    merge_lines,
};
pub use review::Review;
pub use user::{ProfileUpdate, User, UserAddress};
pub use wishlist::WishlistItem;

use serde::Deserialize;

/// Default page size for listings.
pub const DEFAULT_PAGE_SIZE: i64 = 12;
/// Largest page size a client may request.
pub const MAX_PAGE_SIZE: i64 = 100;

/// `page` / `limit` query parameters.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct Pagination {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

impl Pagination {
    /// Page number, at least 1.
    #[must_use]
    pub fn page(&self) -> i64 {
        self.page.unwrap_or(1).max(1)
    }

    /// Page size clamped to `1..=MAX_PAGE_SIZE`.
    #[must_use]
    pub fn limit(&self) -> i64 {
        self.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE)
    }

    #[must_use]
    pub fn offset(&self) -> i64 {
        (self.page() - 1).saturating_mul(self.limit())
    }

    /// Number of pages needed for `total` rows.
    #[must_use]
    pub fn pages(&self, total: i64) -> i64 {
        let limit = self.limit();
        (total + limit - 1) / limit
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_pagination_defaults() {
        let p = Pagination::default();
        assert_eq!(p.page(), 1);
        assert_eq!(p.limit(), DEFAULT_PAGE_SIZE);
        assert_eq!(p.offset(), 0);
    }

    #[test]
    fn test_pagination_clamps() {
        let p = Pagination {
            page: Some(0),
            limit: Some(1000),
        };
        assert_eq!(p.page(), 1);
        assert_eq!(p.limit(), MAX_PAGE_SIZE);

        let p = Pagination {
            page: Some(3),
            limit: Some(-5),
        };
        assert_eq!(p.limit(), 1);
        assert_eq!(p.offset(), 2);
    }

    #[test]
    fn test_pages_rounds_up() {
        let p = Pagination {
            page: None,
            limit: Some(10),
        };
        assert_eq!(p.pages(0), 0);
        assert_eq!(p.pages(10), 1);
        assert_eq!(p.pages(11), 2);
    }
}

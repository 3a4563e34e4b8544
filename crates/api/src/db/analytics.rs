//! Dashboard queries for sellers and admins.
//!
//! Revenue figures always exclude cancelled orders and are computed from
//! line items (`quantity * price` at purchase time).

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::PgPool;
use tracing::instrument;

use booknest_core::{BookId, ReviewId, UserId};

use super::RepositoryError;
use super::orders::OrderRepository;
use crate::models::StatusCount;
use crate::models::book::LOW_STOCK_THRESHOLD;

/// Revenue and order count for one calendar month (`YYYY-MM`).
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyTotal {
    pub month: String,
    pub total: Decimal,
    pub count: i64,
}

/// A best-selling book. `book_id` is `None` for delisted books.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct TopBook {
    pub book_id: Option<BookId>,
    pub title: String,
    pub total_sold: i64,
    pub total_revenue: Decimal,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct TopSeller {
    pub seller_id: UserId,
    pub name: String,
    pub total_sales: Decimal,
    pub total_orders: i64,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct StockItem {
    pub id: BookId,
    pub title: String,
    pub stock: i32,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct GenreInventory {
    pub genre: String,
    pub count: i64,
    pub value: Decimal,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Inventory {
    pub total_books: i64,
    /// Sum of `price * stock`.
    pub inventory_value: Decimal,
    /// In stock but below the alert threshold.
    pub low_stock: Vec<StockItem>,
    pub out_of_stock: Vec<StockItem>,
    pub by_genre: Vec<GenreInventory>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct RecentReview {
    pub id: ReviewId,
    pub book_title: String,
    pub user_name: String,
    pub rating: i32,
    pub comment: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewSummary {
    pub total_reviews: i64,
    pub average_rating: Decimal,
    /// Review count per star rating, 1 through 5.
    pub rating_distribution: BTreeMap<u8, i64>,
    pub recent_reviews: Vec<RecentReview>,
}

/// Seller dashboard.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SellerAnalytics {
    pub seller_id: UserId,
    pub total_sales: Decimal,
    pub total_orders: i64,
    pub total_books: i64,
    /// Mean of the seller's book ratings.
    pub average_rating: Decimal,
    pub sales_by_status: Vec<StatusCount>,
    pub monthly_sales: Vec<MonthlyTotal>,
    pub top_selling_books: Vec<TopBook>,
    pub inventory: Inventory,
    pub reviews: ReviewSummary,
}

/// Admin dashboard.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct AdminTotals {
    pub total_users: i64,
    pub total_sellers: i64,
    pub total_books: i64,
    pub total_orders: i64,
    pub total_revenue: Decimal,
    /// Accounts created in the last 30 days.
    pub new_users: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminAnalytics {
    #[serde(flatten)]
    pub totals: AdminTotals,
    pub monthly_revenue: Vec<MonthlyTotal>,
    pub top_selling_books: Vec<TopBook>,
    pub top_sellers: Vec<TopSeller>,
}

#[derive(Debug, sqlx::FromRow)]
struct SalesRow {
    total_sales: Decimal,
    total_orders: i64,
}

#[derive(Debug, sqlx::FromRow)]
struct CatalogRow {
    total_books: i64,
    average_rating: Decimal,
    inventory_value: Decimal,
}

#[derive(Debug, sqlx::FromRow)]
struct ReviewTotalsRow {
    total_reviews: i64,
    average_rating: Decimal,
    one: i64,
    two: i64,
    three: i64,
    four: i64,
    five: i64,
}

impl ReviewTotalsRow {
    fn distribution(&self) -> BTreeMap<u8, i64> {
        BTreeMap::from([
            (1, self.one),
            (2, self.two),
            (3, self.three),
            (4, self.four),
            (5, self.five),
        ])
    }
}

/// Repository for dashboard aggregates.
pub struct AnalyticsRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> AnalyticsRepository<'a> {
    /// Create a new analytics repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Build the dashboard for one seller.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if any query fails.
    #[instrument(skip(self))]
    pub async fn seller(&self, seller_id: UserId) -> Result<SellerAnalytics, RepositoryError> {
        let orders = OrderRepository::new(self.pool);
        let (sales, catalog, stats, monthly_sales, top_selling_books, inventory, reviews) = tokio::try_join!(
            self.seller_sales(seller_id),
            self.seller_catalog(seller_id),
            orders.stats(Some(seller_id)),
            self.monthly(Some(seller_id)),
            self.top_books(Some(seller_id), 5),
            self.seller_stock(seller_id),
            self.seller_reviews(seller_id),
        )?;
        let (low_stock, out_of_stock, by_genre) = inventory;

        Ok(SellerAnalytics {
            seller_id,
            total_sales: sales.total_sales,
            total_orders: sales.total_orders,
            total_books: catalog.total_books,
            average_rating: catalog.average_rating,
            sales_by_status: stats.by_status,
            monthly_sales,
            top_selling_books,
            inventory: Inventory {
                total_books: catalog.total_books,
                inventory_value: catalog.inventory_value,
                low_stock,
                out_of_stock,
                by_genre,
            },
            reviews,
        })
    }

    /// Build the site-wide dashboard.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if any query fails.
    #[instrument(skip(self))]
    pub async fn admin(&self) -> Result<AdminAnalytics, RepositoryError> {
        let totals = sqlx::query_as::<_, AdminTotals>(
            r"
            SELECT
                (SELECT COUNT(*) FROM users WHERE role = 'user') AS total_users,
                (SELECT COUNT(*) FROM users WHERE role = 'seller') AS total_sellers,
                (SELECT COUNT(*) FROM books) AS total_books,
                (SELECT COUNT(*) FROM orders) AS total_orders,
                (SELECT COALESCE(SUM(total_amount), 0) FROM orders WHERE status <> 'cancelled')
                    AS total_revenue,
                (SELECT COUNT(*) FROM users WHERE created_at >= NOW() - INTERVAL '30 days')
                    AS new_users
            ",
        )
        .fetch_one(self.pool);

        let top_sellers = sqlx::query_as::<_, TopSeller>(
            r"
            SELECT oi.seller_id, u.name,
                   SUM(oi.quantity * oi.price) AS total_sales,
                   COUNT(DISTINCT o.id) AS total_orders
            FROM order_items oi
            JOIN orders o ON o.id = oi.order_id
            JOIN users u ON u.id = oi.seller_id
            WHERE o.status <> 'cancelled'
            GROUP BY oi.seller_id, u.name
            ORDER BY total_sales DESC, oi.seller_id
            LIMIT 10
            ",
        )
        .fetch_all(self.pool);

        let (totals, monthly_revenue, top_selling_books, top_sellers) = tokio::try_join!(
            async { totals.await.map_err(RepositoryError::from) },
            self.monthly(None),
            self.top_books(None, 10),
            async { top_sellers.await.map_err(RepositoryError::from) },
        )?;

        Ok(AdminAnalytics {
            totals,
            monthly_revenue,
            top_selling_books,
            top_sellers,
        })
    }

    async fn seller_sales(&self, seller_id: UserId) -> Result<SalesRow, RepositoryError> {
        let row = sqlx::query_as::<_, SalesRow>(
            r"
            SELECT COALESCE(SUM(oi.quantity * oi.price) FILTER (WHERE o.status <> 'cancelled'), 0)
                       AS total_sales,
                   COUNT(DISTINCT o.id) AS total_orders
            FROM order_items oi
            JOIN orders o ON o.id = oi.order_id
            WHERE oi.seller_id = $1
            ",
        )
        .bind(seller_id)
        .fetch_one(self.pool)
        .await?;
        Ok(row)
    }

    async fn seller_catalog(&self, seller_id: UserId) -> Result<CatalogRow, RepositoryError> {
        let row = sqlx::query_as::<_, CatalogRow>(
            r"
            SELECT COUNT(*) AS total_books,
                   COALESCE(ROUND(AVG(average_rating), 1), 0) AS average_rating,
                   COALESCE(SUM(price * stock), 0) AS inventory_value
            FROM books WHERE seller_id = $1
            ",
        )
        .bind(seller_id)
        .fetch_one(self.pool)
        .await?;
        Ok(row)
    }

    /// Last twelve calendar months, newest first. `None` covers all sellers.
    async fn monthly(&self, seller_id: Option<UserId>) -> Result<Vec<MonthlyTotal>, RepositoryError> {
        let rows = sqlx::query_as::<_, MonthlyTotal>(
            r"
            SELECT to_char(date_trunc('month', o.created_at), 'YYYY-MM') AS month,
                   SUM(oi.quantity * oi.price) AS total,
                   COUNT(DISTINCT o.id) AS count
            FROM order_items oi
            JOIN orders o ON o.id = oi.order_id
            WHERE ($1::int IS NULL OR oi.seller_id = $1)
              AND o.status <> 'cancelled'
              AND o.created_at >= date_trunc('month', NOW()) - INTERVAL '11 months'
            GROUP BY 1
            ORDER BY 1 DESC
            ",
        )
        .bind(seller_id)
        .fetch_all(self.pool)
        .await?;
        Ok(rows)
    }

    async fn top_books(
        &self,
        seller_id: Option<UserId>,
        limit: i64,
    ) -> Result<Vec<TopBook>, RepositoryError> {
        let rows = sqlx::query_as::<_, TopBook>(
            r"
            SELECT oi.book_id,
                   MAX(oi.title) AS title,
                   SUM(oi.quantity)::bigint AS total_sold,
                   SUM(oi.quantity * oi.price) AS total_revenue
            FROM order_items oi
            JOIN orders o ON o.id = oi.order_id
            WHERE ($1::int IS NULL OR oi.seller_id = $1)
              AND o.status <> 'cancelled'
            GROUP BY oi.book_id
            ORDER BY total_sold DESC, total_revenue DESC
            LIMIT $2
            ",
        )
        .bind(seller_id)
        .bind(limit)
        .fetch_all(self.pool)
        .await?;
        Ok(rows)
    }

    async fn seller_stock(
        &self,
        seller_id: UserId,
    ) -> Result<(Vec<StockItem>, Vec<StockItem>, Vec<GenreInventory>), RepositoryError> {
        let low_stock = sqlx::query_as::<_, StockItem>(
            r"
            SELECT id, title, stock, updated_at FROM books
            WHERE seller_id = $1 AND stock > 0 AND stock < $2
            ORDER BY stock, id
            ",
        )
        .bind(seller_id)
        .bind(LOW_STOCK_THRESHOLD)
        .fetch_all(self.pool)
        .await?;

        let out_of_stock = sqlx::query_as::<_, StockItem>(
            "SELECT id, title, stock, updated_at FROM books WHERE seller_id = $1 AND stock = 0 ORDER BY id",
        )
        .bind(seller_id)
        .fetch_all(self.pool)
        .await?;

        let by_genre = sqlx::query_as::<_, GenreInventory>(
            r"
            SELECT genre, COUNT(*) AS count, COALESCE(SUM(price * stock), 0) AS value
            FROM books WHERE seller_id = $1
            GROUP BY genre ORDER BY genre
            ",
        )
        .bind(seller_id)
        .fetch_all(self.pool)
        .await?;

        Ok((low_stock, out_of_stock, by_genre))
    }

    async fn seller_reviews(&self, seller_id: UserId) -> Result<ReviewSummary, RepositoryError> {
        let totals = sqlx::query_as::<_, ReviewTotalsRow>(
            r"
            SELECT COUNT(*) AS total_reviews,
                   COALESCE(ROUND(AVG(r.rating)::numeric, 2), 0) AS average_rating,
                   COUNT(*) FILTER (WHERE r.rating = 1) AS one,
                   COUNT(*) FILTER (WHERE r.rating = 2) AS two,
                   COUNT(*) FILTER (WHERE r.rating = 3) AS three,
                   COUNT(*) FILTER (WHERE r.rating = 4) AS four,
                   COUNT(*) FILTER (WHERE r.rating = 5) AS five
            FROM reviews r
            JOIN books b ON b.id = r.book_id
            WHERE b.seller_id = $1
            ",
        )
        .bind(seller_id)
        .fetch_one(self.pool)
        .await?;

        let recent_reviews = sqlx::query_as::<_, RecentReview>(
            r"
            SELECT r.id, b.title AS book_title, u.name AS user_name, r.rating, r.comment,
                   r.created_at
            FROM reviews r
            JOIN books b ON b.id = r.book_id
            JOIN users u ON u.id = r.user_id
            WHERE b.seller_id = $1
            ORDER BY r.created_at DESC, r.id DESC
            LIMIT 5
            ",
        )
        .bind(seller_id)
        .fetch_all(self.pool)
        .await?;

        Ok(ReviewSummary {
            total_reviews: totals.total_reviews,
            average_rating: totals.average_rating,
            rating_distribution: totals.distribution(),
            recent_reviews,
        })
    }
}

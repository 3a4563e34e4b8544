//! Order repository.
//!
//! Placing an order locks every book row it touches with `FOR UPDATE`, in
//! ascending book id order, so concurrent checkouts cannot oversell and
//! cannot deadlock each other.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool};
use thiserror::Error;
use tracing::instrument;

use booknest_core::{
    BookId, OrderId, OrderStatus, PaymentMethod, PaymentStatus, Pincode, ShippingAddress, UserId,
};

use super::RepositoryError;
use crate::models::book::LOW_STOCK_THRESHOLD;
use crate::models::{NewOrder, Order, OrderItem, OrderListFilter, OrderStats, StatusCount, StatusEntry};

macro_rules! order_columns {
    () => {
        "o.id, o.user_id, o.user_name, o.total_amount, o.status, o.street, o.city, o.state, \
         o.pincode, o.payment_method, o.payment_status, o.transaction_id, o.tracking_number, \
         o.courier, o.estimated_delivery, o.delivered_at, o.created_at, o.updated_at"
    };
}

/// Why requested quantities cannot be filled.
#[derive(Debug, Error)]
pub enum StockError {
    #[error("Book not found with ID: {0}")]
    BookNotFound(BookId),

    #[error("Not enough stock for book: {0}")]
    InsufficientStock(String),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl From<sqlx::Error> for StockError {
    fn from(e: sqlx::Error) -> Self {
        Self::Repository(e.into())
    }
}

/// A book whose stock fell below `LOW_STOCK_THRESHOLD` during checkout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockAlert {
    pub book_id: BookId,
    pub seller_id: UserId,
    pub title: String,
    pub stock: i32,
}

/// Result of placing an order.
#[derive(Debug, Clone)]
pub struct PlacedOrder {
    pub order: Order,
    pub alerts: Vec<StockAlert>,
}

// =============================================================================
// Internal Row Types
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct OrderRow {
    id: OrderId,
    user_id: UserId,
    user_name: String,
    total_amount: Decimal,
    status: OrderStatus,
    street: String,
    city: String,
    state: String,
    pincode: String,
    payment_method: PaymentMethod,
    payment_status: PaymentStatus,
    transaction_id: Option<String>,
    tracking_number: Option<String>,
    courier: Option<String>,
    estimated_delivery: Option<DateTime<Utc>>,
    delivered_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl OrderRow {
    fn into_order(
        self,
        items: Vec<OrderItem>,
        status_history: Vec<StatusEntry>,
    ) -> Result<Order, RepositoryError> {
        let pincode = Pincode::parse(&self.pincode).map_err(|e| {
            RepositoryError::DataCorruption(format!("invalid pincode on order {}: {e}", self.id))
        })?;

        Ok(Order {
            id: self.id,
            user_id: self.user_id,
            user_name: self.user_name,
            items,
            total_amount: self.total_amount,
            status: self.status,
            shipping_address: ShippingAddress {
                street: self.street,
                city: self.city,
                state: self.state,
                pincode,
            },
            payment_method: self.payment_method,
            payment_status: self.payment_status,
            transaction_id: self.transaction_id,
            tracking_number: self.tracking_number,
            courier: self.courier,
            estimated_delivery: self.estimated_delivery,
            delivered_at: self.delivered_at,
            status_history,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct LockedBook {
    id: BookId,
    title: String,
    price: Decimal,
    stock: i32,
    seller_id: UserId,
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for order database operations.
pub struct OrderRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> OrderRepository<'a> {
    /// Create a new order repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Place an order: check and decrement stock, price the lines and record
    /// the order, all in one transaction. With `clear_cart` the buyer's cart
    /// is emptied in the same transaction.
    ///
    /// # Errors
    ///
    /// Returns `StockError::BookNotFound` or `InsufficientStock` for the
    /// first line that cannot be filled; nothing is written in that case.
    #[instrument(skip(self, new), fields(user_id = %new.user_id, lines = new.lines.len()))]
    pub async fn create(
        &self,
        new: &NewOrder,
        clear_cart: bool,
    ) -> Result<PlacedOrder, StockError> {
        let mut tx = self.pool.begin().await?;

        let mut locked = Vec::with_capacity(new.lines.len());
        for line in &new.lines {
            let book = sqlx::query_as::<_, LockedBook>(
                "SELECT id, title, price, stock, seller_id FROM books WHERE id = $1 FOR UPDATE",
            )
            .bind(line.book_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(StockError::BookNotFound(line.book_id))?;

            if book.stock < line.quantity {
                return Err(StockError::InsufficientStock(book.title));
            }
            locked.push((book, line.quantity));
        }

        let total: Decimal = locked
            .iter()
            .map(|(book, qty)| book.price * Decimal::from(*qty))
            .sum();

        let (order_id,) = sqlx::query_as::<_, (OrderId,)>(
            r"
            INSERT INTO orders (user_id, user_name, total_amount, street, city, state, pincode,
                                payment_method)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id
            ",
        )
        .bind(new.user_id)
        .bind(&new.user_name)
        .bind(total)
        .bind(&new.shipping_address.street)
        .bind(&new.shipping_address.city)
        .bind(&new.shipping_address.state)
        .bind(new.shipping_address.pincode.as_str())
        .bind(new.payment_method)
        .fetch_one(&mut *tx)
        .await?;

        let mut alerts = Vec::new();
        for (book, quantity) in locked {
            let (stock,) = sqlx::query_as::<_, (i32,)>(
                "UPDATE books SET stock = stock - $2, updated_at = NOW() WHERE id = $1 RETURNING stock",
            )
            .bind(book.id)
            .bind(quantity)
            .fetch_one(&mut *tx)
            .await?;

            sqlx::query(
                r"
                INSERT INTO order_items (order_id, book_id, seller_id, title, quantity, price)
                VALUES ($1, $2, $3, $4, $5, $6)
                ",
            )
            .bind(order_id)
            .bind(book.id)
            .bind(book.seller_id)
            .bind(&book.title)
            .bind(quantity)
            .bind(book.price)
            .execute(&mut *tx)
            .await?;

            if stock < LOW_STOCK_THRESHOLD {
                alerts.push(StockAlert {
                    book_id: book.id,
                    seller_id: book.seller_id,
                    title: book.title,
                    stock,
                });
            }
        }

        insert_history(&mut tx, order_id, OrderStatus::Pending, Some("Order placed")).await?;

        if clear_cart {
            sqlx::query("DELETE FROM cart_items WHERE user_id = $1")
                .bind(new.user_id)
                .execute(&mut *tx)
                .await?;
        }

        let order = load_one(&mut tx, order_id)
            .await?
            .ok_or(RepositoryError::NotFound)?;
        tx.commit().await?;

        Ok(PlacedOrder { order, alerts })
    }

    /// Get an order with its items and history.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    #[instrument(skip(self))]
    pub async fn get(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        load_one(&mut conn, id).await
    }

    /// A buyer's orders, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    #[instrument(skip(self))]
    pub async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Order>, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        let rows = sqlx::query_as::<_, OrderRow>(concat!(
            "SELECT ",
            order_columns!(),
            " FROM orders o WHERE o.user_id = $1 ORDER BY o.created_at DESC, o.id DESC"
        ))
        .bind(user_id)
        .fetch_all(&mut *conn)
        .await?;

        hydrate(&mut conn, rows).await
    }

    /// Staff listing. With `seller_id`, only orders containing that seller's
    /// items. Returns one page and the total count.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    #[instrument(skip(self))]
    pub async fn list(
        &self,
        filter: &OrderListFilter,
        seller_id: Option<UserId>,
    ) -> Result<(Vec<Order>, i64), RepositoryError> {
        const WHERE: &str = r"
            WHERE ($1::text IS NULL OR o.status = $1)
              AND ($2::int IS NULL OR EXISTS (
                  SELECT 1 FROM order_items oi WHERE oi.order_id = o.id AND oi.seller_id = $2))
        ";
        let page = filter.pagination();
        let mut conn = self.pool.acquire().await?;

        let count_sql = format!("SELECT COUNT(*) FROM orders o {WHERE}");
        let (total,) = sqlx::query_as::<_, (i64,)>(&count_sql)
            .bind(filter.status)
            .bind(seller_id)
            .fetch_one(&mut *conn)
            .await?;

        let list_sql = format!(
            "SELECT {} FROM orders o {WHERE} ORDER BY o.created_at DESC, o.id DESC LIMIT $3 OFFSET $4",
            order_columns!()
        );
        let rows = sqlx::query_as::<_, OrderRow>(&list_sql)
            .bind(filter.status)
            .bind(seller_id)
            .bind(page.limit())
            .bind(page.offset())
            .fetch_all(&mut *conn)
            .await?;

        Ok((hydrate(&mut conn, rows).await?, total))
    }

    /// Order count and item revenue per status. With `seller_id`, only that
    /// seller's items count toward revenue.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    #[instrument(skip(self))]
    pub async fn stats(&self, seller_id: Option<UserId>) -> Result<OrderStats, RepositoryError> {
        let by_status = sqlx::query_as::<_, StatusCount>(
            r"
            SELECT o.status,
                   COUNT(DISTINCT o.id) AS count,
                   COALESCE(SUM(oi.quantity * oi.price), 0) AS revenue
            FROM orders o
            JOIN order_items oi ON oi.order_id = o.id
            WHERE $1::int IS NULL OR oi.seller_id = $1
            GROUP BY o.status
            ORDER BY o.status
            ",
        )
        .bind(seller_id)
        .fetch_all(self.pool)
        .await?;

        Ok(OrderStats::from(by_status))
    }

    /// Move an order from `from` to `to` and append a history entry.
    ///
    /// Cancelling puts the stock back and turns a completed payment into a
    /// refund. Delivering stamps `delivered_at` and settles cash on delivery.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the order is no longer in
    /// status `from`.
    #[instrument(skip(self))]
    pub async fn set_status(
        &self,
        id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
        note: Option<&str>,
    ) -> Result<Order, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            r"
            UPDATE orders SET
                status = $3,
                payment_status = CASE
                    WHEN $3 = 'cancelled' AND payment_status = 'completed' THEN 'refunded'
                    WHEN $3 = 'delivered' AND payment_method = 'cod' THEN 'completed'
                    ELSE payment_status
                END,
                delivered_at = CASE WHEN $3 = 'delivered' THEN NOW() ELSE delivered_at END,
                updated_at = NOW()
            WHERE id = $1 AND status = $2
            ",
        )
        .bind(id)
        .bind(from)
        .bind(to)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(RepositoryError::Conflict(format!(
                "order {id} is no longer {from}"
            )));
        }

        if to == OrderStatus::Cancelled {
            sqlx::query(
                r"
                UPDATE books b SET stock = b.stock + oi.quantity, updated_at = NOW()
                FROM order_items oi
                WHERE oi.order_id = $1 AND oi.book_id = b.id
                ",
            )
            .bind(id)
            .execute(&mut *tx)
            .await?;
        }

        insert_history(&mut tx, id, to, note).await?;

        let order = load_one(&mut tx, id)
            .await?
            .ok_or(RepositoryError::NotFound)?;
        tx.commit().await?;

        Ok(order)
    }

    /// Record shipment tracking details.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the order does not exist.
    #[instrument(skip(self))]
    pub async fn set_tracking(
        &self,
        id: OrderId,
        tracking_number: &str,
        courier: Option<&str>,
        estimated_delivery: Option<DateTime<Utc>>,
    ) -> Result<Order, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        let updated = sqlx::query(
            r"
            UPDATE orders SET
                tracking_number = $2,
                courier = COALESCE($3, courier),
                estimated_delivery = COALESCE($4, estimated_delivery),
                updated_at = NOW()
            WHERE id = $1
            ",
        )
        .bind(id)
        .bind(tracking_number)
        .bind(courier)
        .bind(estimated_delivery)
        .execute(&mut *conn)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        load_one(&mut conn, id).await?.ok_or(RepositoryError::NotFound)
    }

    /// Delete an order. Stock is not adjusted.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the order does not exist.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: OrderId) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM orders WHERE id = $1")
            .bind(id)
            .execute(self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }
}

async fn insert_history(
    conn: &mut PgConnection,
    order_id: OrderId,
    status: OrderStatus,
    note: Option<&str>,
) -> Result<(), sqlx::Error> {
    sqlx::query("INSERT INTO order_status_history (order_id, status, note) VALUES ($1, $2, $3)")
        .bind(order_id)
        .bind(status)
        .bind(note)
        .execute(conn)
        .await?;
    Ok(())
}

async fn load_one(conn: &mut PgConnection, id: OrderId) -> Result<Option<Order>, RepositoryError> {
    let row = sqlx::query_as::<_, OrderRow>(concat!(
        "SELECT ",
        order_columns!(),
        " FROM orders o WHERE o.id = $1"
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;

    match row {
        Some(row) => Ok(hydrate(conn, vec![row]).await?.pop()),
        None => Ok(None),
    }
}

/// Attach items and status history to order rows, keeping row order.
async fn hydrate(conn: &mut PgConnection, rows: Vec<OrderRow>) -> Result<Vec<Order>, RepositoryError> {
    if rows.is_empty() {
        return Ok(Vec::new());
    }
    let ids: Vec<i32> = rows.iter().map(|r| r.id.as_i32()).collect();

    let items = sqlx::query_as::<_, OrderItem>(
        r"
        SELECT id, order_id, book_id, seller_id, title, quantity, price
        FROM order_items WHERE order_id = ANY($1) ORDER BY id
        ",
    )
    .bind(&ids)
    .fetch_all(&mut *conn)
    .await?;

    let history = sqlx::query_as::<_, StatusEntry>(
        r"
        SELECT order_id, status, note, created_at
        FROM order_status_history WHERE order_id = ANY($1) ORDER BY created_at, id
        ",
    )
    .bind(&ids)
    .fetch_all(&mut *conn)
    .await?;

    let mut items_by_order: HashMap<OrderId, Vec<OrderItem>> = HashMap::new();
    for item in items {
        items_by_order.entry(item.order_id).or_default().push(item);
    }
    let mut history_by_order: HashMap<OrderId, Vec<StatusEntry>> = HashMap::new();
    for entry in history {
        history_by_order.entry(entry.order_id).or_default().push(entry);
    }

    rows.into_iter()
        .map(|row| {
            let items = items_by_order.remove(&row.id).unwrap_or_default();
            let history = history_by_order.remove(&row.id).unwrap_or_default();
            row.into_order(items, history)
        })
        .collect()
}

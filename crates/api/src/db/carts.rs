//! Server-side cart repository.

use sqlx::PgPool;
use tracing::instrument;

use booknest_core::{BookId, UserId};

use super::RepositoryError;
use super::orders::StockError;
use crate::models::{CartLine, OrderLine};

#[derive(Debug, sqlx::FromRow)]
struct StockRow {
    title: String,
    stock: i32,
}

/// Repository for cart database operations.
pub struct CartRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> CartRepository<'a> {
    /// Create a new cart repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Cart lines joined with the current book data, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    #[instrument(skip(self))]
    pub async fn lines(&self, user_id: UserId) -> Result<Vec<CartLine>, RepositoryError> {
        let lines = sqlx::query_as::<_, CartLine>(
            r"
            SELECT c.id, c.book_id, b.title, b.author, b.price, b.item_image, b.stock,
                   c.quantity, b.price * c.quantity AS line_total
            FROM cart_items c
            JOIN books b ON b.id = c.book_id
            WHERE c.user_id = $1
            ORDER BY c.created_at, c.id
            ",
        )
        .bind(user_id)
        .fetch_all(self.pool)
        .await?;

        Ok(lines)
    }

    /// Cart contents as order lines for checkout.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    #[instrument(skip(self))]
    pub async fn order_lines(&self, user_id: UserId) -> Result<Vec<OrderLine>, RepositoryError> {
        let rows = sqlx::query_as::<_, (BookId, i32)>(
            "SELECT book_id, quantity FROM cart_items WHERE user_id = $1 ORDER BY book_id",
        )
        .bind(user_id)
        .fetch_all(self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(book_id, quantity)| OrderLine { book_id, quantity })
            .collect())
    }

    /// Add `quantity` of a book, on top of what the cart already holds.
    ///
    /// # Errors
    ///
    /// Returns `StockError::BookNotFound` for an unknown book and
    /// `StockError::InsufficientStock` if the new total exceeds stock.
    #[instrument(skip(self))]
    pub async fn add(
        &self,
        user_id: UserId,
        book_id: BookId,
        quantity: i32,
    ) -> Result<(), StockError> {
        let mut tx = self.pool.begin().await?;

        let book = sqlx::query_as::<_, StockRow>(
            "SELECT title, stock FROM books WHERE id = $1 FOR SHARE",
        )
        .bind(book_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(StockError::BookNotFound(book_id))?;

        if quantity > book.stock {
            return Err(StockError::InsufficientStock(book.title));
        }

        // Concurrent adds for one line queue on its row lock here.
        let (total,) = sqlx::query_as::<_, (i32,)>(
            r"
            INSERT INTO cart_items (user_id, book_id, quantity)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id, book_id)
            DO UPDATE SET quantity = cart_items.quantity + EXCLUDED.quantity, updated_at = NOW()
            RETURNING quantity
            ",
        )
        .bind(user_id)
        .bind(book_id)
        .bind(quantity)
        .fetch_one(&mut *tx)
        .await?;

        // Dropping the transaction rolls the upsert back.
        if total > book.stock {
            return Err(StockError::InsufficientStock(book.title));
        }

        tx.commit().await?;
        Ok(())
    }

    /// Replace the quantity of a line already in the cart.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` (wrapped) if the book is not in
    /// the cart, or `StockError::InsufficientStock`.
    #[instrument(skip(self))]
    pub async fn set_quantity(
        &self,
        user_id: UserId,
        book_id: BookId,
        quantity: i32,
    ) -> Result<(), StockError> {
        let mut tx = self.pool.begin().await?;

        let book = sqlx::query_as::<_, StockRow>(
            r"
            SELECT b.title, b.stock FROM cart_items c
            JOIN books b ON b.id = c.book_id
            WHERE c.user_id = $1 AND c.book_id = $2
            FOR SHARE OF b
            ",
        )
        .bind(user_id)
        .bind(book_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(RepositoryError::NotFound)?;

        if quantity > book.stock {
            return Err(StockError::InsufficientStock(book.title));
        }

        sqlx::query(
            r"
            UPDATE cart_items SET quantity = $3, updated_at = NOW()
            WHERE user_id = $1 AND book_id = $2
            ",
        )
        .bind(user_id)
        .bind(book_id)
        .bind(quantity)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Remove one line. Returns whether it existed.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    #[instrument(skip(self))]
    pub async fn remove(&self, user_id: UserId, book_id: BookId) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM cart_items WHERE user_id = $1 AND book_id = $2")
            .bind(user_id)
            .bind(book_id)
            .execute(self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Empty the cart.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    #[instrument(skip(self))]
    pub async fn clear(&self, user_id: UserId) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM cart_items WHERE user_id = $1")
            .bind(user_id)
            .execute(self.pool)
            .await?;
        Ok(())
    }
}

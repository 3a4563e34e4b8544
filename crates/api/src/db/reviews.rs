//! Review repository.
//!
//! Every write locks the book row first and recomputes its `average_rating`
//! and `review_count` in the same transaction, so concurrent reviews of one
//! book serialize on that lock.

use sqlx::{PgConnection, PgPool};
use tracing::instrument;

use booknest_core::{BookId, Rating, ReviewId, UserId};

use super::RepositoryError;
use crate::models::Review;

const REVIEW_SELECT: &str = r"
    SELECT r.id, r.book_id, r.user_id, u.name AS user_name, r.rating, r.comment, r.verified,
           r.created_at, r.updated_at
    FROM reviews r
    JOIN users u ON u.id = r.user_id
";

/// Repository for review database operations.
pub struct ReviewRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> ReviewRepository<'a> {
    /// Create a new review repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Reviews for a book, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    #[instrument(skip(self))]
    pub async fn list_for_book(&self, book_id: BookId) -> Result<Vec<Review>, RepositoryError> {
        let sql = format!("{REVIEW_SELECT} WHERE r.book_id = $1 ORDER BY r.created_at DESC, r.id DESC");
        let reviews = sqlx::query_as::<_, Review>(&sql)
            .bind(book_id)
            .fetch_all(self.pool)
            .await?;

        Ok(reviews)
    }

    /// Get a review by ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    #[instrument(skip(self))]
    pub async fn get(&self, id: ReviewId) -> Result<Option<Review>, RepositoryError> {
        let sql = format!("{REVIEW_SELECT} WHERE r.id = $1");
        let review = sqlx::query_as::<_, Review>(&sql)
            .bind(id)
            .fetch_optional(self.pool)
            .await?;

        Ok(review)
    }

    /// Add a review. `verified` is set when the reviewer has a delivered
    /// order containing the book.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the user already reviewed the
    /// book, or `RepositoryError::NotFound` if the book does not exist.
    #[instrument(skip(self, comment))]
    pub async fn create(
        &self,
        book_id: BookId,
        user_id: UserId,
        rating: Rating,
        comment: &str,
    ) -> Result<Review, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        lock_book(&mut tx, book_id).await?;

        let (id,) = sqlx::query_as::<_, (ReviewId,)>(
            r"
            INSERT INTO reviews (book_id, user_id, rating, comment, verified)
            VALUES ($1, $2, $3, $4, EXISTS (
                SELECT 1 FROM order_items oi
                JOIN orders o ON o.id = oi.order_id
                WHERE o.user_id = $2 AND oi.book_id = $1 AND o.status = 'delivered'
            ))
            RETURNING id
            ",
        )
        .bind(book_id)
        .bind(user_id)
        .bind(i32::from(rating))
        .bind(comment)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| RepositoryError::conflict_on_unique(e, "You have already reviewed this book"))?;

        recompute_rating(&mut tx, book_id).await?;
        let review = fetch_in(&mut tx, id).await?;
        tx.commit().await?;

        Ok(review)
    }

    /// Change rating and/or comment.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the review does not exist.
    #[instrument(skip(self, comment))]
    pub async fn update(
        &self,
        id: ReviewId,
        rating: Option<Rating>,
        comment: Option<&str>,
    ) -> Result<Review, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let book_id = lock_book_of(&mut tx, id).await?;

        let updated = sqlx::query(
            r"
            UPDATE reviews SET
                rating = COALESCE($2, rating),
                comment = COALESCE($3, comment),
                updated_at = NOW()
            WHERE id = $1
            ",
        )
        .bind(id)
        .bind(rating.map(i32::from))
        .bind(comment)
        .execute(&mut *tx)
        .await?;
        if updated.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }

        recompute_rating(&mut tx, book_id).await?;
        let review = fetch_in(&mut tx, id).await?;
        tx.commit().await?;

        Ok(review)
    }

    /// Delete a review and return the book it belonged to.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the review does not exist.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: ReviewId) -> Result<BookId, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let book_id = lock_book_of(&mut tx, id).await?;

        let deleted = sqlx::query("DELETE FROM reviews WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        if deleted.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }

        recompute_rating(&mut tx, book_id).await?;
        tx.commit().await?;

        Ok(book_id)
    }
}

/// Take the row lock on a book before touching its reviews.
///
/// The aggregate update must not start until every other writer for the same
/// book has committed, otherwise its subqueries read a snapshot that misses
/// their rows.
async fn lock_book(conn: &mut PgConnection, book_id: BookId) -> Result<(), RepositoryError> {
    sqlx::query("SELECT 1 FROM books WHERE id = $1 FOR UPDATE")
        .bind(book_id)
        .fetch_optional(conn)
        .await?
        .ok_or(RepositoryError::NotFound)?;
    Ok(())
}

/// Resolve a review's book and lock it.
async fn lock_book_of(conn: &mut PgConnection, id: ReviewId) -> Result<BookId, RepositoryError> {
    let (book_id,) = sqlx::query_as::<_, (BookId,)>("SELECT book_id FROM reviews WHERE id = $1")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(RepositoryError::NotFound)?;
    lock_book(conn, book_id).await?;
    Ok(book_id)
}

async fn fetch_in(conn: &mut PgConnection, id: ReviewId) -> Result<Review, RepositoryError> {
    let sql = format!("{REVIEW_SELECT} WHERE r.id = $1");
    let review = sqlx::query_as::<_, Review>(&sql)
        .bind(id)
        .fetch_one(conn)
        .await?;
    Ok(review)
}

/// Refresh the cached rating aggregate, rounded to one decimal.
async fn recompute_rating(conn: &mut PgConnection, book_id: BookId) -> Result<(), RepositoryError> {
    sqlx::query(
        r"
        UPDATE books SET
            average_rating = COALESCE(
                (SELECT ROUND(AVG(rating)::numeric, 1) FROM reviews WHERE book_id = $1), 0),
            review_count = (SELECT COUNT(*) FROM reviews WHERE book_id = $1),
            updated_at = NOW()
        WHERE id = $1
        ",
    )
    .bind(book_id)
    .execute(conn)
    .await?;
    Ok(())
}

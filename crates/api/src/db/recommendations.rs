//! Book recommendation queries.

use sqlx::PgPool;
use tracing::instrument;

use booknest_core::{BookId, UserId};

use super::RepositoryError;
use super::books::book_columns;
use crate::models::Book;

/// Most results any recommendation list returns.
pub const MAX_RECOMMENDATIONS: i64 = 50;

/// Repository for recommendation queries.
pub struct RecommendationRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> RecommendationRepository<'a> {
    /// Create a new recommendation repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Books rated four stars or better, best first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    #[instrument(skip(self))]
    pub async fn popular(&self, limit: i64) -> Result<Vec<Book>, RepositoryError> {
        let books = sqlx::query_as::<_, Book>(concat!(
            "SELECT ",
            book_columns!(),
            " FROM books WHERE average_rating >= 4",
            " ORDER BY average_rating DESC, review_count DESC, id DESC LIMIT $1"
        ))
        .bind(limit.clamp(1, MAX_RECOMMENDATIONS))
        .fetch_all(self.pool)
        .await?;

        Ok(books)
    }

    /// Most recently listed books.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    #[instrument(skip(self))]
    pub async fn new_arrivals(&self, limit: i64) -> Result<Vec<Book>, RepositoryError> {
        let books = sqlx::query_as::<_, Book>(concat!(
            "SELECT ",
            book_columns!(),
            " FROM books ORDER BY created_at DESC, id DESC LIMIT $1"
        ))
        .bind(limit.clamp(1, MAX_RECOMMENDATIONS))
        .fetch_all(self.pool)
        .await?;

        Ok(books)
    }

    /// Books ordered, or reviewed with four stars or more, in the last `days`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    #[instrument(skip(self))]
    pub async fn trending(&self, days: i32, limit: i64) -> Result<Vec<Book>, RepositoryError> {
        let books = sqlx::query_as::<_, Book>(concat!(
            "SELECT ",
            book_columns!(),
            r"
            FROM books
            WHERE id IN (
                SELECT oi.book_id FROM order_items oi
                JOIN orders o ON o.id = oi.order_id
                WHERE o.created_at >= NOW() - make_interval(days => $1)
                  AND oi.book_id IS NOT NULL
                UNION
                SELECT book_id FROM reviews
                WHERE created_at >= NOW() - make_interval(days => $1) AND rating >= 4
            )
            ORDER BY average_rating DESC, review_count DESC, id DESC
            LIMIT $2
            "
        ))
        .bind(days.clamp(1, 365))
        .bind(limit.clamp(1, MAX_RECOMMENDATIONS))
        .fetch_all(self.pool)
        .await?;

        Ok(books)
    }

    /// Well-rated books sharing a genre or author with what the user has
    /// bought, excluding books they already bought.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    #[instrument(skip(self))]
    pub async fn personalized(&self, user_id: UserId, limit: i64) -> Result<Vec<Book>, RepositoryError> {
        let books = sqlx::query_as::<_, Book>(concat!(
            r"
            WITH purchased AS (
                SELECT DISTINCT b.id AS book_id, b.genre, b.author
                FROM order_items oi
                JOIN orders o ON o.id = oi.order_id
                JOIN books b ON b.id = oi.book_id
                WHERE o.user_id = $1 AND o.status <> 'cancelled'
            )
            SELECT ",
            book_columns!(),
            r"
            FROM books
            WHERE average_rating >= 4
              AND id NOT IN (SELECT p.book_id FROM purchased p)
              AND (genre IN (SELECT p.genre FROM purchased p)
                   OR author IN (SELECT p.author FROM purchased p))
            ORDER BY average_rating DESC, review_count DESC, id DESC
            LIMIT $2
            "
        ))
        .bind(user_id)
        .bind(limit.clamp(1, MAX_RECOMMENDATIONS))
        .fetch_all(self.pool)
        .await?;

        Ok(books)
    }

    /// Books in the same genre or by the same author as `book_id`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    #[instrument(skip(self))]
    pub async fn similar(&self, book_id: BookId, limit: i64) -> Result<Vec<Book>, RepositoryError> {
        let books = sqlx::query_as::<_, Book>(concat!(
            "SELECT ",
            book_columns!(),
            r"
            FROM books
            WHERE id <> $1
              AND (genre = (SELECT genre FROM books WHERE id = $1)
                   OR author = (SELECT author FROM books WHERE id = $1))
            ORDER BY average_rating DESC, review_count DESC, id DESC
            LIMIT $2
            "
        ))
        .bind(book_id)
        .bind(limit.clamp(1, MAX_RECOMMENDATIONS))
        .fetch_all(self.pool)
        .await?;

        Ok(books)
    }
}

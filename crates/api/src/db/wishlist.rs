//! Wishlist repository.

use sqlx::PgPool;
use tracing::instrument;

use booknest_core::{BookId, UserId};

use super::RepositoryError;
use crate::models::WishlistItem;

/// Repository for wishlist database operations.
pub struct WishlistRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> WishlistRepository<'a> {
    /// Create a new wishlist repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// A user's wishlist, most recently added first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    #[instrument(skip(self))]
    pub async fn list(&self, user_id: UserId) -> Result<Vec<WishlistItem>, RepositoryError> {
        let items = sqlx::query_as::<_, WishlistItem>(
            r"
            SELECT id, user_id, book_id, user_name, title, author, genre, price, item_image,
                   created_at
            FROM wishlist_items
            WHERE user_id = $1
            ORDER BY created_at DESC, id DESC
            ",
        )
        .bind(user_id)
        .fetch_all(self.pool)
        .await?;

        Ok(items)
    }

    /// Copy a book's current details into the user's wishlist.
    ///
    /// Returns `Ok(None)` if the book does not exist.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the book is already saved.
    #[instrument(skip(self))]
    pub async fn add(
        &self,
        user_id: UserId,
        user_name: &str,
        book_id: BookId,
    ) -> Result<Option<WishlistItem>, RepositoryError> {
        let item = sqlx::query_as::<_, WishlistItem>(
            r"
            INSERT INTO wishlist_items (user_id, book_id, user_name, title, author, genre, price,
                                        item_image)
            SELECT $1, b.id, $2, b.title, b.author, b.genre, b.price, b.item_image
            FROM books b WHERE b.id = $3
            RETURNING id, user_id, book_id, user_name, title, author, genre, price, item_image,
                      created_at
            ",
        )
        .bind(user_id)
        .bind(user_name)
        .bind(book_id)
        .fetch_optional(self.pool)
        .await
        .map_err(|e| RepositoryError::conflict_on_unique(e, "Item already in wishlist"))?;

        Ok(item)
    }

    /// Remove the caller's entry for a book.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if there was no such entry.
    #[instrument(skip(self))]
    pub async fn remove(&self, user_id: UserId, book_id: BookId) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM wishlist_items WHERE user_id = $1 AND book_id = $2")
            .bind(user_id)
            .bind(book_id)
            .execute(self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }
}

//! Book repository for catalog operations.

use rust_decimal::Decimal;
use sqlx::postgres::PgArguments;
use sqlx::query::QueryAs;
use sqlx::{PgPool, Postgres};
use tracing::instrument;

use booknest_core::{BookId, UserId};

use super::{RepositoryError, like_pattern};
use crate::models::{Book, BookFilter, BookUpdate, GenreStats, NewBook};

/// Columns selected for every `Book`.
macro_rules! book_columns {
    () => {
        "id, title, author, genre, description, price, stock, item_image, seller_id, \
         seller_name, average_rating, review_count, created_at, updated_at"
    };
}

pub(crate) use book_columns;

/// Shared `WHERE` clause for listing and counting. Parameters `$1..=$8`.
const LIST_FILTER: &str = r"
    WHERE ($1::text IS NULL OR title ILIKE $1 OR author ILIKE $1 OR genre ILIKE $1)
      AND ($2::text IS NULL OR lower(genre) = lower($2))
      AND ($3::text IS NULL OR author ILIKE $3)
      AND ($4::int IS NULL OR seller_id = $4)
      AND ($5::numeric IS NULL OR price >= $5)
      AND ($6::numeric IS NULL OR price <= $6)
      AND ($7::numeric IS NULL OR average_rating >= $7)
      AND ($8::bool IS NULL OR NOT $8 OR stock > 0)
";

/// Owned bind values for `LIST_FILTER`.
struct ListParams {
    q: Option<String>,
    genre: Option<String>,
    author: Option<String>,
    seller: Option<UserId>,
    min_price: Option<Decimal>,
    max_price: Option<Decimal>,
    min_rating: Option<Decimal>,
    in_stock: Option<bool>,
}

impl From<&BookFilter> for ListParams {
    fn from(filter: &BookFilter) -> Self {
        let trimmed = |s: &Option<String>| {
            s.as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_owned)
        };

        Self {
            q: filter.search_term().map(like_pattern),
            genre: trimmed(&filter.genre),
            author: trimmed(&filter.author).as_deref().map(like_pattern),
            seller: filter.seller,
            min_price: filter.min_price,
            max_price: filter.max_price,
            min_rating: filter.min_rating,
            in_stock: filter.in_stock,
        }
    }
}

impl ListParams {
    fn bind<'q, O>(
        &'q self,
        query: QueryAs<'q, Postgres, O, PgArguments>,
    ) -> QueryAs<'q, Postgres, O, PgArguments> {
        query
            .bind(self.q.as_deref())
            .bind(self.genre.as_deref())
            .bind(self.author.as_deref())
            .bind(self.seller)
            .bind(self.min_price)
            .bind(self.max_price)
            .bind(self.min_rating)
            .bind(self.in_stock)
    }
}

/// Repository for book database operations.
pub struct BookRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> BookRepository<'a> {
    /// Create a new book repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// One page of the catalog plus the total number of matching books.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    #[instrument(skip(self))]
    pub async fn list(&self, filter: &BookFilter) -> Result<(Vec<Book>, i64), RepositoryError> {
        let params = ListParams::from(filter);
        let page = filter.pagination();

        let count_sql = format!("SELECT COUNT(*) FROM books {LIST_FILTER}");
        let (total,) = params
            .bind(sqlx::query_as::<_, (i64,)>(&count_sql))
            .fetch_one(self.pool)
            .await?;

        let list_sql = format!(
            "SELECT {} FROM books {LIST_FILTER} ORDER BY {} LIMIT $9 OFFSET $10",
            book_columns!(),
            filter.sort.order_by(),
        );
        let books = params
            .bind(sqlx::query_as::<_, Book>(&list_sql))
            .bind(page.limit())
            .bind(page.offset())
            .fetch_all(self.pool)
            .await?;

        Ok((books, total))
    }

    /// Get a book by ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    #[instrument(skip(self))]
    pub async fn get(&self, id: BookId) -> Result<Option<Book>, RepositoryError> {
        let book = sqlx::query_as::<_, Book>(concat!(
            "SELECT ",
            book_columns!(),
            " FROM books WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        Ok(book)
    }

    /// All books listed by a seller, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    #[instrument(skip(self))]
    pub async fn list_by_seller(&self, seller_id: UserId) -> Result<Vec<Book>, RepositoryError> {
        let books = sqlx::query_as::<_, Book>(concat!(
            "SELECT ",
            book_columns!(),
            " FROM books WHERE seller_id = $1 ORDER BY created_at DESC, id DESC"
        ))
        .bind(seller_id)
        .fetch_all(self.pool)
        .await?;

        Ok(books)
    }

    /// Per-genre count and price statistics.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    #[instrument(skip(self))]
    pub async fn genre_stats(&self) -> Result<Vec<GenreStats>, RepositoryError> {
        let stats = sqlx::query_as::<_, GenreStats>(
            r"
            SELECT genre,
                   COUNT(*) AS num_books,
                   ROUND(AVG(price), 2) AS avg_price,
                   MIN(price) AS min_price,
                   MAX(price) AS max_price
            FROM books
            GROUP BY genre
            ORDER BY num_books DESC, genre
            ",
        )
        .fetch_all(self.pool)
        .await?;

        Ok(stats)
    }

    /// Books rated above four stars, best first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    #[instrument(skip(self))]
    pub async fn top_rated(&self, limit: i64) -> Result<Vec<Book>, RepositoryError> {
        let books = sqlx::query_as::<_, Book>(concat!(
            "SELECT ",
            book_columns!(),
            " FROM books WHERE average_rating > 4",
            " ORDER BY average_rating DESC, review_count DESC, id DESC LIMIT $1"
        ))
        .bind(limit)
        .fetch_all(self.pool)
        .await?;

        Ok(books)
    }

    /// Books with the least stock first, optionally for one seller.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    #[instrument(skip(self))]
    pub async fn low_stock(
        &self,
        seller_id: Option<UserId>,
        limit: i64,
    ) -> Result<Vec<Book>, RepositoryError> {
        let books = sqlx::query_as::<_, Book>(concat!(
            "SELECT ",
            book_columns!(),
            " FROM books WHERE ($1::int IS NULL OR seller_id = $1)",
            " ORDER BY stock ASC, id ASC LIMIT $2"
        ))
        .bind(seller_id)
        .bind(limit)
        .fetch_all(self.pool)
        .await?;

        Ok(books)
    }

    /// Insert a new listing.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the insert fails.
    #[instrument(skip(self, book), fields(title = %book.title, seller_id = %book.seller_id))]
    pub async fn create(&self, book: &NewBook) -> Result<Book, RepositoryError> {
        let book = sqlx::query_as::<_, Book>(concat!(
            r"
            INSERT INTO books (title, author, genre, description, price, stock, item_image,
                               seller_id, seller_name)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING ",
            book_columns!()
        ))
        .bind(&book.title)
        .bind(&book.author)
        .bind(&book.genre)
        .bind(&book.description)
        .bind(book.price.amount())
        .bind(book.stock)
        .bind(book.item_image.as_deref())
        .bind(book.seller_id)
        .bind(&book.seller_name)
        .fetch_one(self.pool)
        .await?;

        Ok(book)
    }

    /// Apply a partial update. `None` fields keep their current value.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the book does not exist.
    #[instrument(skip(self, update))]
    pub async fn update(&self, id: BookId, update: &BookUpdate) -> Result<Book, RepositoryError> {
        sqlx::query_as::<_, Book>(concat!(
            r"
            UPDATE books SET
                title = COALESCE($2, title),
                author = COALESCE($3, author),
                genre = COALESCE($4, genre),
                description = COALESCE($5, description),
                price = COALESCE($6, price),
                stock = COALESCE($7, stock),
                item_image = COALESCE($8, item_image),
                updated_at = NOW()
            WHERE id = $1
            RETURNING ",
            book_columns!()
        ))
        .bind(id)
        .bind(update.title.as_deref())
        .bind(update.author.as_deref())
        .bind(update.genre.as_deref())
        .bind(update.description.as_deref())
        .bind(update.price.map(|p| p.amount()))
        .bind(update.stock)
        .bind(update.item_image.as_deref())
        .fetch_optional(self.pool)
        .await?
        .ok_or(RepositoryError::NotFound)
    }

    /// Point the listing at a newly uploaded cover.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the book does not exist.
    #[instrument(skip(self))]
    pub async fn set_cover(&self, id: BookId, path: &str) -> Result<Book, RepositoryError> {
        sqlx::query_as::<_, Book>(concat!(
            "UPDATE books SET item_image = $2, updated_at = NOW() WHERE id = $1 RETURNING ",
            book_columns!()
        ))
        .bind(id)
        .bind(path)
        .fetch_optional(self.pool)
        .await?
        .ok_or(RepositoryError::NotFound)
    }

    /// Delete a listing. Order items keep their snapshot with a null book.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the book does not exist.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: BookId) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM books WHERE id = $1")
            .bind(id)
            .execute(self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_list_params_normalize_filter() {
        let filter = BookFilter {
            q: Some(" 50% ".to_owned()),
            genre: Some("  ".to_owned()),
            author: Some("Le Guin".to_owned()),
            ..BookFilter::default()
        };
        let params = ListParams::from(&filter);
        assert_eq!(params.q.as_deref(), Some("%50\\%%"));
        assert_eq!(params.genre, None);
        assert_eq!(params.author.as_deref(), Some("%Le Guin%"));
    }
}

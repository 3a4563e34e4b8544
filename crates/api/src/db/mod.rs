//! Database access for the BookNest `PostgreSQL` database.
//!
//! ## Tables
//!
//! - `users` - Accounts, password hashes, lockout and reset state
//! - `books` - Catalog listings with cached rating aggregates
//! - `reviews` - One review per user per book
//! - `orders`, `order_items`, `order_status_history` - Purchases
//! - `cart_items` - Server-side carts
//! - `wishlist_items` - Denormalized favorites
//!
//! All queries are runtime queries (`query_as::<_, Row>`), so building the
//! crate never needs a live database or an offline query cache.
//!
//! # Migrations
//!
//! Migrations are stored in `crates/api/migrations/` and run via:
//! ```bash
//! cargo run -p booknest-cli -- migrate
//! ```

pub mod analytics;
pub mod books;
pub mod carts;
pub mod orders;
pub mod recommendations;
pub mod reviews;
pub mod users;
pub mod wishlist;

use std::time::Duration;

use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,

    /// Constraint violation (e.g., unique email).
    #[error("constraint violation: {0}")]
    Conflict(String),
}

impl RepositoryError {
    /// Map a unique violation to `Conflict(message)`, anything else to `Database`.
    pub(crate) fn conflict_on_unique(e: sqlx::Error, message: &str) -> Self {
        if let sqlx::Error::Database(ref db_err) = e
            && db_err.is_unique_violation()
        {
            return Self::Conflict(message.to_owned());
        }
        Self::Database(e)
    }

    /// Map a foreign-key violation to `Conflict(message)`, anything else to `Database`.
    pub(crate) fn conflict_on_foreign_key(e: sqlx::Error, message: &str) -> Self {
        if let sqlx::Error::Database(ref db_err) = e
            && db_err.is_foreign_key_violation()
        {
            return Self::Conflict(message.to_owned());
        }
        Self::Database(e)
    }
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}

/// Escape `%`, `_` and `\` so user input is matched literally by `ILIKE`.
#[must_use]
pub fn like_pattern(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len() + 2);
    escaped.push('%');
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("dune"), "%dune%");
        assert_eq!(like_pattern("100%_off\\"), "%100\\%\\_off\\\\%");
    }

    #[test]
    fn test_other_errors_are_not_conflicts() {
        assert!(matches!(
            RepositoryError::conflict_on_foreign_key(sqlx::Error::RowNotFound, "in use"),
            RepositoryError::Database(sqlx::Error::RowNotFound)
        ));
        assert!(matches!(
            RepositoryError::conflict_on_unique(sqlx::Error::PoolTimedOut, "taken"),
            RepositoryError::Database(sqlx::Error::PoolTimedOut)
        ));
    }
}

//! Book reviews.

use chrono::{DateTime, Utc};
use serde::Serialize;

use booknest_core::{BookId, ReviewId, UserId};

/// Longest accepted review comment, in characters.
pub const MAX_COMMENT_CHARS: usize = 1000;

/// A review with the reviewer's display name.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    pub id: ReviewId,
    pub book_id: BookId,
    pub user_id: UserId,
    pub user_name: String,
    pub rating: i32,
    pub comment: String,
    /// The reviewer has a delivered order containing this book.
    pub verified: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

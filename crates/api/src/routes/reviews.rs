//! Review route handlers.

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::instrument;

use booknest_core::{BookId, Rating, ReviewId, Role};

use crate::db::books::BookRepository;
use crate::db::reviews::ReviewRepository;
use crate::error::{AppError, Result};
use crate::extract::{ApiJson, ApiPath};
use crate::middleware::AuthUser;
use crate::models::Review;
use crate::models::review::MAX_COMMENT_CHARS;
use crate::services::notifications::Notification;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ReviewRequest {
    pub rating: Option<i32>,
    pub comment: Option<String>,
}

fn parse_rating(stars: i32) -> Result<Rating> {
    Rating::new(stars).map_err(|_| AppError::BadRequest("Rating must be between 1 and 5".to_owned()))
}

fn parse_comment(comment: &str) -> Result<&str> {
    let comment = comment.trim();
    if comment.is_empty() {
        return Err(AppError::BadRequest("Please provide comment".to_owned()));
    }
    if comment.chars().count() > MAX_COMMENT_CHARS {
        return Err(AppError::BadRequest(format!(
            "Comment must be at most {MAX_COMMENT_CHARS} characters"
        )));
    }
    Ok(comment)
}

impl ReviewRequest {
    fn validate_new(&self) -> Result<(Rating, &str)> {
        let rating = self
            .rating
            .ok_or_else(|| AppError::BadRequest("Please provide rating".to_owned()))?;
        let comment = self.comment.as_deref().unwrap_or_default();
        Ok((parse_rating(rating)?, parse_comment(comment)?))
    }

    fn validate_update(&self) -> Result<(Option<Rating>, Option<&str>)> {
        if self.rating.is_none() && self.comment.is_none() {
            return Err(AppError::BadRequest(
                "Please provide rating or comment".to_owned(),
            ));
        }
        let rating = self.rating.map(parse_rating).transpose()?;
        let comment = self.comment.as_deref().map(parse_comment).transpose()?;
        Ok((rating, comment))
    }
}

fn review_not_found() -> AppError {
    AppError::NotFound("No review found with that ID".to_owned())
}

async fn load_review(state: &AppState, id: ReviewId) -> Result<Review> {
    ReviewRepository::new(state.pool())
        .get(id)
        .await?
        .ok_or_else(review_not_found)
}

/// Reviews for a book, newest first.
pub async fn index(
    State(state): State<AppState>,
    ApiPath(book_id): ApiPath<BookId>,
) -> Result<Json<Value>> {
    let reviews = ReviewRepository::new(state.pool())
        .list_for_book(book_id)
        .await?;
    Ok(super::listing("reviews", &reviews))
}

/// Add a review and tell the seller.
#[instrument(skip_all, fields(user_id = %user.id, book_id = %book_id))]
pub async fn create(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ApiPath(book_id): ApiPath<BookId>,
    ApiJson(body): ApiJson<ReviewRequest>,
) -> Result<impl IntoResponse> {
    let (rating, comment) = body.validate_new()?;
    let book = BookRepository::new(state.pool())
        .get(book_id)
        .await?
        .ok_or_else(|| AppError::NotFound("No book found with that ID".to_owned()))?;

    let review = ReviewRepository::new(state.pool())
        .create(book_id, user.id, rating, comment)
        .await?;

    state
        .hub()
        .send_to_user(
            book.seller_id,
            Notification::new_review(book.id, &book.title, review.rating),
        )
        .await;

    Ok((
        StatusCode::CREATED,
        super::success(json!({ "review": review })),
    ))
}

/// Edit a review. Only its author may.
#[instrument(skip_all, fields(user_id = %user.id, review_id = %id))]
pub async fn update(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ApiPath(id): ApiPath<ReviewId>,
    ApiJson(body): ApiJson<ReviewRequest>,
) -> Result<Json<Value>> {
    let (rating, comment) = body.validate_update()?;
    let review = load_review(&state, id).await?;
    if review.user_id != user.id {
        return Err(AppError::Forbidden(
            "You can only update your own reviews".to_owned(),
        ));
    }

    let review = ReviewRepository::new(state.pool())
        .update(id, rating, comment)
        .await?;
    Ok(super::success(json!({ "review": review })))
}

/// Delete a review as its author or an admin.
#[instrument(skip_all, fields(user_id = %user.id, review_id = %id))]
pub async fn remove(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ApiPath(id): ApiPath<ReviewId>,
) -> Result<StatusCode> {
    let review = load_review(&state, id).await?;
    if review.user_id != user.id && user.role != Role::Admin {
        return Err(AppError::Forbidden(
            "You can only delete your own reviews".to_owned(),
        ));
    }

    ReviewRepository::new(state.pool()).delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

//! Unified error handling with Sentry integration.
//!
//! Provides a unified `AppError` type that captures server errors to Sentry
//! before responding. Every response body has the shape
//! `{"status": "fail" | "error", "message": "..."}`: `fail` for 4xx, `error`
//! for 5xx. All route handlers return `Result<T, AppError>`.

use std::borrow::Cow;

use axum::{
    Json,
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::db::RepositoryError;
use crate::db::orders::StockError;
use crate::services::auth::AuthError;
use crate::services::orders::OrderError;
use crate::services::tokens::TokenError;
use crate::services::uploads::UploadError;

const INTERNAL_MESSAGE: &str = "Internal server error";

/// Application-level error type for the API.
#[derive(Debug, Error)]
pub enum AppError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] RepositoryError),

    /// Authentication operation failed.
    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    /// Bearer token could not be issued or verified.
    #[error("Token error: {0}")]
    Token(#[from] TokenError),

    #[error("Order error: {0}")]
    Order(#[from] OrderError),

    /// Cart stock checks.
    #[error("Stock error: {0}")]
    Stock(#[from] StockError),

    #[error("Upload error: {0}")]
    Upload(#[from] UploadError),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// User is not authenticated.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Authenticated but not allowed.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Bad request from client.
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Payload too large")]
    PayloadTooLarge,

    /// A dependency or capacity limit is temporarily unavailable.
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    /// Rate limited.
    #[error("Rate limited")]
    RateLimited,

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Status code and client-facing message.
    ///
    /// Internal details never reach the client.
    #[must_use]
    pub fn parts(&self) -> (StatusCode, Cow<'_, str>) {
        match self {
            Self::Database(err) => repository_parts(err),
            Self::Auth(err) => auth_parts(err),
            Self::Token(err) => match err {
                TokenError::Expired => (
                    StatusCode::UNAUTHORIZED,
                    "Your token has expired! Please log in again.".into(),
                ),
                TokenError::Invalid => (
                    StatusCode::UNAUTHORIZED,
                    "Invalid token. Please log in again!".into(),
                ),
                TokenError::Signing(_) => internal(),
            },
            Self::Order(err) => order_parts(err),
            Self::Stock(err) => stock_parts(err),
            Self::Upload(err) => match err {
                UploadError::Io(_) => internal(),
                UploadError::TooLarge => (StatusCode::PAYLOAD_TOO_LARGE, err.to_string().into()),
                _ => (StatusCode::BAD_REQUEST, err.to_string().into()),
            },
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg.into()),
            Self::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg.into()),
            Self::Forbidden(msg) => (StatusCode::FORBIDDEN, msg.into()),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.into()),
            Self::PayloadTooLarge => (
                StatusCode::PAYLOAD_TOO_LARGE,
                "Request body is too large".into(),
            ),
            Self::ServiceUnavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg.into()),
            Self::RateLimited => (
                StatusCode::TOO_MANY_REQUESTS,
                "Too many requests from this IP, please try again later.".into(),
            ),
            Self::Internal(_) => internal(),
        }
    }

    /// Shorthand for the role guard rejection.
    #[must_use]
    pub fn permission_denied() -> Self {
        Self::Forbidden("You do not have permission to perform this action".to_owned())
    }
}

fn internal() -> (StatusCode, Cow<'static, str>) {
    (StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_MESSAGE.into())
}

fn repository_parts(err: &RepositoryError) -> (StatusCode, Cow<'_, str>) {
    match err {
        RepositoryError::NotFound => (
            StatusCode::NOT_FOUND,
            "No document found with that ID".into(),
        ),
        RepositoryError::Conflict(msg) => (StatusCode::BAD_REQUEST, msg.into()),
        RepositoryError::Database(_) | RepositoryError::DataCorruption(_) => internal(),
    }
}

fn auth_parts(err: &AuthError) -> (StatusCode, Cow<'_, str>) {
    let status = match err {
        AuthError::Repository(inner) => return repository_parts(inner),
        AuthError::PasswordHash => return internal(),
        AuthError::AdminSignupForbidden
        | AuthError::InvalidSignupKey
        | AuthError::AdminSignupDisabled => StatusCode::FORBIDDEN,
        AuthError::InvalidCredentials
        | AuthError::RoleMismatch(_)
        | AuthError::Inactive
        | AuthError::WrongCurrentPassword => StatusCode::UNAUTHORIZED,
        AuthError::Locked { .. } => StatusCode::LOCKED,
        AuthError::UnknownEmail => StatusCode::NOT_FOUND,
        AuthError::MissingField(_)
        | AuthError::InvalidEmail(_)
        | AuthError::InvalidName
        | AuthError::InvalidRole
        | AuthError::PasswordMismatch
        | AuthError::WeakPassword(_)
        | AuthError::EmailTaken
        | AuthError::InvalidResetToken => StatusCode::BAD_REQUEST,
    };
    (status, err.to_string().into())
}

fn stock_parts(err: &StockError) -> (StatusCode, Cow<'_, str>) {
    match err {
        StockError::BookNotFound(_) => (StatusCode::NOT_FOUND, err.to_string().into()),
        StockError::InsufficientStock(_) => (StatusCode::BAD_REQUEST, err.to_string().into()),
        StockError::Repository(inner) => repository_parts(inner),
    }
}

fn order_parts(err: &OrderError) -> (StatusCode, Cow<'_, str>) {
    let status = match err {
        OrderError::Stock(inner) => return stock_parts(inner),
        OrderError::Repository(inner) => return repository_parts(inner),
        OrderError::NotFound => StatusCode::NOT_FOUND,
        OrderError::ViewForbidden | OrderError::CancelForbidden | OrderError::UpdateForbidden => {
            StatusCode::FORBIDDEN
        }
        OrderError::NoItems
        | OrderError::InvalidQuantity
        | OrderError::MissingAddress
        | OrderError::InvalidAddress(_)
        | OrderError::EmptyCart
        | OrderError::NotCancellable
        | OrderError::InvalidTransition { .. } => StatusCode::BAD_REQUEST,
    };
    (status, err.to_string().into())
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = self.parts();

        // Capture server errors to Sentry
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        } else if status.is_server_error() {
            tracing::warn!(error = %self, "Request error");
        }

        let body = Json(json!({
            "status": if status.is_server_error() { "error" } else { "fail" },
            "message": message,
        }));
        (status, body).into_response()
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            return Self::PayloadTooLarge;
        }
        Self::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Set the Sentry user context from a user ID.
///
/// Called after bearer authentication to associate errors with users.
pub fn set_sentry_user(user_id: &impl ToString, email: Option<&str>) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            email: email.map(String::from),
            ..Default::default()
        }));
    });
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::body::to_bytes;
    use booknest_core::{BookId, OrderStatus, Role};

    use super::*;

    async fn body_json(err: AppError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn status_of(err: AppError) -> StatusCode {
        err.parts().0
    }

    #[tokio::test]
    async fn test_client_errors_are_fail() {
        let (status, body) = body_json(AppError::NotFound("No book found with that ID".into())).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["status"], "fail");
        assert_eq!(body["message"], "No book found with that ID");
    }

    #[tokio::test]
    async fn test_internal_details_are_hidden() {
        let (status, body) = body_json(AppError::Internal("pool exhausted at 10.0.0.3".into())).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["status"], "error");
        assert_eq!(body["message"], INTERNAL_MESSAGE);

        let (status, body) =
            body_json(AppError::Database(RepositoryError::DataCorruption("bad".into()))).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["message"], INTERNAL_MESSAGE);
    }

    #[test]
    fn test_auth_status_codes() {
        assert_eq!(
            status_of(AuthError::AdminSignupForbidden.into()),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            status_of(AuthError::InvalidCredentials.into()),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            status_of(AuthError::RoleMismatch(Role::Seller).into()),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            status_of(AuthError::Locked { minutes: 12 }.into()),
            StatusCode::LOCKED
        );
        assert_eq!(status_of(AuthError::UnknownEmail.into()), StatusCode::NOT_FOUND);
        assert_eq!(status_of(AuthError::EmailTaken.into()), StatusCode::BAD_REQUEST);
        assert_eq!(
            status_of(AuthError::Repository(RepositoryError::NotFound).into()),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn test_locked_message_carries_minutes() {
        let err = AppError::from(AuthError::Locked { minutes: 7 });
        assert_eq!(
            err.parts().1,
            "Account is locked. Please try again in 7 minutes."
        );
    }

    #[test]
    fn test_token_messages() {
        let err = AppError::from(TokenError::Expired);
        let (status, msg) = err.parts();
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(msg, "Your token has expired! Please log in again.");

        let err = AppError::from(TokenError::Invalid);
        let (_, msg) = err.parts();
        assert_eq!(msg, "Invalid token. Please log in again!");
    }

    #[test]
    fn test_order_status_codes() {
        assert_eq!(
            status_of(OrderError::Stock(StockError::BookNotFound(BookId::new(9))).into()),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(OrderError::Stock(StockError::InsufficientStock("Dune".into())).into()),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(OrderError::CancelForbidden.into()),
            StatusCode::FORBIDDEN
        );
        let err = AppError::from(OrderError::InvalidTransition {
            from: OrderStatus::Delivered,
            to: OrderStatus::Pending,
        });
        let (status, msg) = err.parts();
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(msg, "Cannot change order status from delivered to pending");
    }

    #[test]
    fn test_conflict_message_is_shown() {
        let err = AppError::from(RepositoryError::Conflict("Item already in wishlist".into()));
        let (status, msg) = err.parts();
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(msg, "Item already in wishlist");
    }

    #[test]
    fn test_misc_status_codes() {
        assert_eq!(status_of(AppError::RateLimited), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            status_of(AppError::ServiceUnavailable("full".into())),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(status_of(AppError::permission_denied()), StatusCode::FORBIDDEN);
        assert_eq!(
            status_of(UploadError::NotAnImage.into()),
            StatusCode::BAD_REQUEST
        );
    }
}

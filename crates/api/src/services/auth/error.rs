//! Authentication error types.
//!
//! `Display` strings are client-facing; `AppError` maps each variant to a
//! status code.

use thiserror::Error;

use booknest_core::Role;

use crate::db::RepositoryError;

/// Errors that can occur during authentication operations.
#[derive(Debug, Error)]
pub enum AuthError {
    /// A required field was missing or blank.
    #[error("Please provide {0}")]
    MissingField(&'static str),

    #[error("Please provide a valid email")]
    InvalidEmail(#[from] booknest_core::EmailError),

    #[error("Name must be at least 2 characters")]
    InvalidName,

    #[error("Invalid role specified. Allowed roles are: user, seller")]
    InvalidRole,

    #[error("Admin accounts cannot be created through signup")]
    AdminSignupForbidden,

    #[error("Passwords do not match")]
    PasswordMismatch,

    /// Password too weak or invalid.
    #[error("{0}")]
    WeakPassword(String),

    #[error("Email already exists. Please use a different email.")]
    EmailTaken,

    /// Unknown email or wrong password.
    #[error("Invalid email or password")]
    InvalidCredentials,

    /// The account exists but the caller asked for a different role's login.
    #[error("Invalid credentials for {0} login")]
    RoleMismatch(Role),

    #[error("Account is locked. Please try again in {minutes} minutes.")]
    Locked { minutes: i64 },

    #[error("Your account is inactive. Please contact support.")]
    Inactive,

    #[error("Your current password is wrong.")]
    WrongCurrentPassword,

    #[error("There is no user with that email address.")]
    UnknownEmail,

    #[error("Token is invalid or has expired")]
    InvalidResetToken,

    #[error("Invalid admin signup key")]
    InvalidSignupKey,

    #[error("Admin signup is disabled")]
    AdminSignupDisabled,

    /// Repository/database error.
    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),

    /// Password hashing error.
    #[error("password hashing error")]
    PasswordHash,
}

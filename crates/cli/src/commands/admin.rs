//! Admin account management commands.
//!
//! # Usage
//!
//! ```bash
//! BOOKNEST_ADMIN_PASSWORD='a long passphrase' \
//!     booknest-cli admin create -e admin@example.com -n "Admin Name"
//! ```
//!
//! # Environment Variables
//!
//! - `BOOKNEST_DATABASE_URL` - `PostgreSQL` connection string
//! - `BOOKNEST_ADMIN_PASSWORD` - Password for the new account

use booknest_api::services::auth::{AuthError, AuthService, MIN_PASSWORD_LENGTH};
use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;

const PASSWORD_VAR: &str = "BOOKNEST_ADMIN_PASSWORD";

/// Errors that can occur during admin operations.
#[derive(Debug, Error)]
pub enum AdminError {
    /// Required environment variable is missing.
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(&'static str),

    #[error("{PASSWORD_VAR} must be at least {MIN_PASSWORD_LENGTH} characters")]
    PasswordTooShort,

    /// Validation or database failure from the account service.
    #[error("{0}")]
    Auth(#[from] AuthError),
}

fn admin_password() -> Result<SecretString, AdminError> {
    let password = std::env::var(PASSWORD_VAR)
        .map(SecretString::from)
        .map_err(|_| AdminError::MissingEnvVar(PASSWORD_VAR))?;
    check_password(&password)?;
    Ok(password)
}

fn check_password(password: &SecretString) -> Result<(), AdminError> {
    if password.expose_secret().chars().count() < MIN_PASSWORD_LENGTH {
        return Err(AdminError::PasswordTooShort);
    }
    Ok(())
}

/// Create a new admin account.
///
/// # Errors
///
/// Returns an error if the password is missing or too short, the email is
/// invalid or taken, or the database is unreachable.
pub async fn create_user(email: &str, name: &str) -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    let password = admin_password()?;

    let pool = super::connect().await?;
    tracing::info!("Creating admin account: {}", email);

    let user = AuthService::new(&pool)
        .create_admin(name, email, password.expose_secret())
        .await
        .map_err(AdminError::from)?;

    tracing::info!(
        "Admin account created successfully! ID: {}, Email: {}",
        user.id,
        user.email
    );
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_password_length() {
        assert!(matches!(
            check_password(&SecretString::from("short")),
            Err(AdminError::PasswordTooShort)
        ));
        assert!(check_password(&SecretString::from("long enough")).is_ok());
    }

    #[test]
    fn test_error_message_names_variable() {
        assert_eq!(
            AdminError::PasswordTooShort.to_string(),
            "BOOKNEST_ADMIN_PASSWORD must be at least 8 characters"
        );
    }
}

//! Authentication service.
//!
//! Password signup and login with account lockout, password changes and
//! email-based password reset. Passwords are hashed with Argon2id; reset
//! tokens are stored as SHA-256 digests.

mod error;

pub use error::AuthError;

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use chrono::{DateTime, Duration, Utc};
use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use tracing::instrument;

use booknest_core::{Email, Role, UserId};

use crate::db::RepositoryError;
use crate::db::users::{NewUser, UserRepository};
use crate::models::{User, UserAddress};

/// Minimum password length.
pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Consecutive failures that lock an account.
pub const MAX_LOGIN_ATTEMPTS: i32 = 5;

/// How long a locked account stays locked.
pub const LOCK_MINUTES: i32 = 30;

/// How long a password reset token stays valid.
pub const RESET_TOKEN_MINUTES: i64 = 10;

/// Signup form fields, as received.
#[derive(Debug, Clone, Default)]
pub struct SignupInput {
    pub name: String,
    pub email: String,
    pub password: String,
    pub password_confirm: String,
    pub role: Option<String>,
    pub address: Option<UserAddress>,
    pub phone: Option<String>,
}

/// Authentication service.
pub struct AuthService<'a> {
    users: UserRepository<'a>,
}

impl<'a> AuthService<'a> {
    /// Create a new authentication service.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self {
            users: UserRepository::new(pool),
        }
    }

    /// Register a reader or seller account.
    ///
    /// # Errors
    ///
    /// Returns the `AuthError` describing the first failed check, or
    /// `AuthError::EmailTaken` if the email is already registered.
    #[instrument(skip_all, fields(email = %input.email))]
    pub async fn signup(&self, input: &SignupInput) -> Result<User, AuthError> {
        for (value, field) in [
            (&input.name, "name"),
            (&input.email, "email"),
            (&input.password, "password"),
            (&input.password_confirm, "passwordConfirm"),
        ] {
            if value.trim().is_empty() {
                return Err(AuthError::MissingField(field));
            }
        }

        let role = parse_signup_role(input.role.as_deref())?;
        if input.password != input.password_confirm {
            return Err(AuthError::PasswordMismatch);
        }

        let user = self
            .create_account(
                &input.name,
                &input.email,
                &input.password,
                role,
                input.address.as_ref(),
                input.phone.as_deref(),
            )
            .await?;

        tracing::info!(user_id = %user.id, role = %user.role, "Account created");
        Ok(user)
    }

    /// Create an admin account. Callers decide whether this is allowed.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::EmailTaken` if the email is registered, or a
    /// validation error for the name, email or password.
    #[instrument(skip(self, password))]
    pub async fn create_admin(
        &self,
        name: &str,
        email: &str,
        password: &str,
    ) -> Result<User, AuthError> {
        let user = self
            .create_account(name, email, password, Role::Admin, None, None)
            .await?;

        tracing::info!(user_id = %user.id, "Admin account created");
        Ok(user)
    }

    async fn create_account(
        &self,
        name: &str,
        email: &str,
        password: &str,
        role: Role,
        address: Option<&UserAddress>,
        phone: Option<&str>,
    ) -> Result<User, AuthError> {
        let name = validate_name(name)?;
        let email = Email::parse(email)?;
        validate_password(password)?;
        let password_hash = hash_password(password)?;
        let address = address.cloned().unwrap_or_default();

        self.users
            .create(&NewUser {
                name,
                email: &email,
                password_hash: &password_hash,
                role,
                address: &address,
                phone: phone.map(str::trim).filter(|p| !p.is_empty()),
            })
            .await
            .map_err(|e| match e {
                RepositoryError::Conflict(_) => AuthError::EmailTaken,
                other => AuthError::Repository(other),
            })
    }

    /// Check a password login.
    ///
    /// When `expected_role` is set the account must have that role; a
    /// mismatch counts as a failed attempt. The fifth consecutive failure
    /// locks the account for thirty minutes.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidCredentials`, `RoleMismatch`, `Locked` or
    /// `Inactive` as appropriate.
    #[instrument(skip(self, password))]
    pub async fn login(
        &self,
        email: &str,
        password: &str,
        expected_role: Option<Role>,
    ) -> Result<User, AuthError> {
        if email.trim().is_empty() || password.is_empty() {
            return Err(AuthError::MissingField("email and password!"));
        }

        let email = Email::parse(email).map_err(|_| AuthError::InvalidCredentials)?;
        let credentials = self
            .users
            .get_credentials_by_email(&email)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;
        let user_id = credentials.user.id;

        if let Some(role) = expected_role
            && credentials.user.role != role
        {
            self.record_failure(user_id).await?;
            return Err(AuthError::RoleMismatch(role));
        }

        let now = Utc::now();
        if let Some(lock_until) = credentials.lock_until
            && lock_until > now
        {
            return Err(AuthError::Locked {
                minutes: lock_minutes_remaining(lock_until, now),
            });
        }

        if verify_password(password, &credentials.password_hash).is_err() {
            self.record_failure(user_id).await?;
            return Err(AuthError::InvalidCredentials);
        }

        if !credentials.user.active {
            return Err(AuthError::Inactive);
        }

        self.users.reset_login_attempts(user_id).await?;
        tracing::info!(user_id = %user_id, "Login succeeded");
        Ok(credentials.user)
    }

    async fn record_failure(&self, user_id: UserId) -> Result<(), AuthError> {
        let attempts = self
            .users
            .record_failed_login(user_id, MAX_LOGIN_ATTEMPTS, LOCK_MINUTES)
            .await?;

        if attempts.lock_until.is_some() {
            tracing::warn!(user_id = %user_id, attempts = attempts.login_attempts, "Account locked");
        }
        Ok(())
    }

    /// Change the password of a logged-in user.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::WrongCurrentPassword` if `current` does not match.
    #[instrument(skip(self, current, password, password_confirm))]
    pub async fn update_password(
        &self,
        user_id: UserId,
        current: &str,
        password: &str,
        password_confirm: &str,
    ) -> Result<User, AuthError> {
        for (value, field) in [
            (current, "currentPassword"),
            (password, "password"),
            (password_confirm, "passwordConfirm"),
        ] {
            if value.is_empty() {
                return Err(AuthError::MissingField(field));
            }
        }

        let credentials = self
            .users
            .get_credentials_by_id(user_id)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        verify_password(current, &credentials.password_hash)
            .map_err(|_| AuthError::WrongCurrentPassword)?;

        self.replace_password(user_id, password, password_confirm)
            .await
    }

    /// Start a password reset. Returns the user and the raw token to send.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::UnknownEmail` if no account has this email.
    #[instrument(skip(self))]
    pub async fn forgot_password(&self, email: &str) -> Result<(User, String), AuthError> {
        if email.trim().is_empty() {
            return Err(AuthError::MissingField("email"));
        }
        let email = Email::parse(email).map_err(|_| AuthError::UnknownEmail)?;
        let user = self
            .users
            .get_by_email(&email)
            .await?
            .ok_or(AuthError::UnknownEmail)?;

        let (raw, digest) = generate_reset_token();
        let expires_at = Utc::now() + Duration::minutes(RESET_TOKEN_MINUTES);
        self.users
            .set_reset_token(user.id, &digest, expires_at)
            .await?;

        tracing::info!(user_id = %user.id, "Password reset requested");
        Ok((user, raw))
    }

    /// Drop a reset token that could not be delivered.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Repository` if the database update fails.
    pub async fn cancel_password_reset(&self, user_id: UserId) -> Result<(), AuthError> {
        self.users.clear_reset_token(user_id).await?;
        Ok(())
    }

    /// Finish a password reset with the raw token from the email.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidResetToken` if the token is unknown or expired.
    #[instrument(skip_all)]
    pub async fn reset_password(
        &self,
        raw_token: &str,
        password: &str,
        password_confirm: &str,
    ) -> Result<User, AuthError> {
        let user = self
            .users
            .get_by_reset_token(&hash_reset_token(raw_token))
            .await?
            .ok_or(AuthError::InvalidResetToken)?;

        let user = self
            .replace_password(user.id, password, password_confirm)
            .await?;
        tracing::info!(user_id = %user.id, "Password reset completed");
        Ok(user)
    }

    async fn replace_password(
        &self,
        user_id: UserId,
        password: &str,
        password_confirm: &str,
    ) -> Result<User, AuthError> {
        if password.is_empty() {
            return Err(AuthError::MissingField("password"));
        }
        if password != password_confirm {
            return Err(AuthError::PasswordMismatch);
        }
        validate_password(password)?;
        let password_hash = hash_password(password)?;

        Ok(self.users.set_password(user_id, &password_hash).await?)
    }
}

/// Resolve the role requested at public signup.
fn parse_signup_role(role: Option<&str>) -> Result<Role, AuthError> {
    let Some(raw) = role.map(str::trim).filter(|r| !r.is_empty()) else {
        return Ok(Role::User);
    };

    match raw.parse::<Role>() {
        Ok(role) if role.can_self_register() => Ok(role),
        Ok(_) => Err(AuthError::AdminSignupForbidden),
        Err(_) => Err(AuthError::InvalidRole),
    }
}

fn validate_name(name: &str) -> Result<&str, AuthError> {
    let name = name.trim();
    if name.chars().count() < 2 {
        return Err(AuthError::InvalidName);
    }
    Ok(name)
}

/// Validate password meets requirements.
///
/// # Errors
///
/// Returns `AuthError::WeakPassword` for passwords shorter than eight characters.
pub fn validate_password(password: &str) -> Result<(), AuthError> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(AuthError::WeakPassword(format!(
            "Password must be at least {MIN_PASSWORD_LENGTH} characters"
        )));
    }
    Ok(())
}

/// Hash a password using Argon2id.
///
/// # Errors
///
/// Returns `AuthError::PasswordHash` if hashing fails.
pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| AuthError::PasswordHash)
}

/// Verify a password against a hash.
fn verify_password(password: &str, hash: &str) -> Result<(), AuthError> {
    let parsed_hash = PasswordHash::new(hash).map_err(|_| AuthError::InvalidCredentials)?;
    let argon2 = Argon2::default();

    argon2
        .verify_password(password.as_bytes(), &parsed_hash)
        .map_err(|_| AuthError::InvalidCredentials)
}

/// Whole minutes until `lock_until`, rounded up.
fn lock_minutes_remaining(lock_until: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let seconds = (lock_until - now).num_seconds().max(0);
    (seconds + 59) / 60
}

/// Generate a reset token: 32 random bytes as hex, plus its SHA-256 digest.
fn generate_reset_token() -> (String, String) {
    let bytes: [u8; 32] = rand::random();
    let raw = hex::encode(bytes);
    let digest = hash_reset_token(&raw);
    (raw, digest)
}

/// SHA-256 of a raw reset token, hex encoded.
fn hash_reset_token(raw: &str) -> String {
    hex::encode(Sha256::digest(raw.as_bytes()))
}

/// Compare a supplied admin signup key against the configured one without
/// leaking the position of the first mismatch.
#[must_use]
pub fn signup_key_matches(expected: &SecretString, provided: &str) -> bool {
    let a = Sha256::digest(expected.expose_secret().as_bytes());
    let b = Sha256::digest(provided.as_bytes());
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify_password() {
        let hash = hash_password("correct horse battery").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password("correct horse battery", &hash).is_ok());
        assert!(verify_password("wrong horse battery", &hash).is_err());
    }

    #[test]
    fn test_verify_password_rejects_garbage_hash() {
        assert!(matches!(
            verify_password("whatever", "not-a-hash"),
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[test]
    fn test_validate_password_length() {
        assert!(validate_password("short").is_err());
        assert!(validate_password("12345678").is_ok());
    }

    #[test]
    fn test_parse_signup_role() {
        assert_eq!(parse_signup_role(None).unwrap(), Role::User);
        assert_eq!(parse_signup_role(Some("")).unwrap(), Role::User);
        assert_eq!(parse_signup_role(Some("seller")).unwrap(), Role::Seller);
        assert!(matches!(
            parse_signup_role(Some("admin")),
            Err(AuthError::AdminSignupForbidden)
        ));
        assert!(matches!(
            parse_signup_role(Some("wizard")),
            Err(AuthError::InvalidRole)
        ));
    }

    #[test]
    fn test_validate_name() {
        assert_eq!(validate_name("  Jo ").unwrap(), "Jo");
        assert!(validate_name(" J ").is_err());
    }

    #[test]
    fn test_lock_minutes_round_up() {
        let now = Utc::now();
        assert_eq!(lock_minutes_remaining(now + Duration::seconds(61), now), 2);
        assert_eq!(lock_minutes_remaining(now + Duration::minutes(30), now), 30);
        assert_eq!(lock_minutes_remaining(now + Duration::seconds(1), now), 1);
        assert_eq!(lock_minutes_remaining(now - Duration::seconds(5), now), 0);
    }

    #[test]
    fn test_reset_token_digest() {
        let (raw, digest) = generate_reset_token();
        assert_eq!(raw.len(), 64);
        assert_eq!(digest.len(), 64);
        assert_ne!(raw, digest);
        assert_eq!(hash_reset_token(&raw), digest);
    }

    #[test]
    fn test_signup_key_matches() {
        let key = SecretString::from("open-sesame-admin");
        assert!(signup_key_matches(&key, "open-sesame-admin"));
        assert!(!signup_key_matches(&key, "open-sesame-admi"));
        assert!(!signup_key_matches(&key, ""));
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(
            AuthError::MissingField("passwordConfirm").to_string(),
            "Please provide passwordConfirm"
        );
        assert_eq!(
            AuthError::RoleMismatch(Role::Seller).to_string(),
            "Invalid credentials for seller login"
        );
        assert_eq!(
            AuthError::Locked { minutes: 12 }.to_string(),
            "Account is locked. Please try again in 12 minutes."
        );
    }
}

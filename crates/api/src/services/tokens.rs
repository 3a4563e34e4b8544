//! Signed bearer tokens (HS256 JWTs).

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode,
    errors::ErrorKind,
};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use booknest_core::{Role, UserId};

use crate::config::JwtConfig;

/// Errors raised while issuing or verifying tokens.
#[derive(Debug, Error)]
pub enum TokenError {
    #[error("token expired")]
    Expired,

    #[error("invalid token")]
    Invalid,

    #[error("failed to sign token: {0}")]
    Signing(#[source] jsonwebtoken::errors::Error),
}

/// Claims carried by every BookNest token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: UserId,
    pub email: String,
    pub role: Role,
    /// Issued at, seconds since the epoch.
    pub iat: i64,
    /// Expiry, seconds since the epoch.
    pub exp: i64,
}

impl Claims {
    /// Whether the token predates a password change.
    ///
    /// Compared at one-second resolution, the precision of `iat`.
    #[must_use]
    pub fn issued_before(&self, changed_at: DateTime<Utc>) -> bool {
        changed_at.timestamp() > self.iat
    }
}

/// Issues and verifies tokens with a shared HMAC secret.
#[derive(Clone)]
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl TokenService {
    #[must_use]
    pub fn new(config: &JwtConfig) -> Self {
        let secret = config.secret.expose_secret().as_bytes();
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp"]);

        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
            ttl: Duration::hours(config.expires_hours),
        }
    }

    /// Sign a token for `user_id` valid from now for the configured lifetime.
    ///
    /// # Errors
    ///
    /// Returns `TokenError::Signing` if encoding fails.
    pub fn issue(&self, user_id: UserId, email: &str, role: Role) -> Result<String, TokenError> {
        self.issue_at(user_id, email, role, Utc::now())
    }

    fn issue_at(
        &self,
        user_id: UserId,
        email: &str,
        role: Role,
        now: DateTime<Utc>,
    ) -> Result<String, TokenError> {
        let claims = Claims {
            sub: user_id,
            email: email.to_owned(),
            role,
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(TokenError::Signing)
    }

    /// Check the signature and expiry of `token` and return its claims.
    ///
    /// # Errors
    ///
    /// Returns `TokenError::Expired` for an expired token and
    /// `TokenError::Invalid` for anything else that fails verification.
    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        decode::<Claims>(token, &self.decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Invalid,
            })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use secrecy::SecretString;

    use super::*;

    fn service(secret: &str) -> TokenService {
        TokenService::new(&JwtConfig {
            secret: SecretString::from(secret.to_owned()),
            expires_hours: 24,
        })
    }

    #[test]
    fn test_issue_then_verify() {
        let tokens = service("k3Yq8vT1zR6mW0pL4sN9bX2cF7hJ5dGa");
        let token = tokens
            .issue(UserId::new(12), "reader@booknest.test", Role::Seller)
            .unwrap();

        let claims = tokens.verify(&token).unwrap();
        assert_eq!(claims.sub, UserId::new(12));
        assert_eq!(claims.role, Role::Seller);
        assert_eq!(claims.email, "reader@booknest.test");
        assert_eq!(claims.exp - claims.iat, 24 * 3600);
    }

    #[test]
    fn test_expired_token() {
        let tokens = service("k3Yq8vT1zR6mW0pL4sN9bX2cF7hJ5dGa");
        let token = tokens
            .issue_at(
                UserId::new(1),
                "a@b.co",
                Role::User,
                Utc::now() - Duration::hours(48),
            )
            .unwrap();

        assert!(matches!(tokens.verify(&token), Err(TokenError::Expired)));
    }

    #[test]
    fn test_wrong_secret_is_invalid() {
        let token = service("k3Yq8vT1zR6mW0pL4sN9bX2cF7hJ5dGa")
            .issue(UserId::new(1), "a@b.co", Role::Admin)
            .unwrap();

        let other = service("Zp4Lr8Tq2Wx6Nc0Vb5Hm9Jk3Fd7Gs1Ae");
        assert!(matches!(other.verify(&token), Err(TokenError::Invalid)));
        assert!(matches!(other.verify("not.a.jwt"), Err(TokenError::Invalid)));
    }

    #[test]
    fn test_issued_before_password_change() {
        let now = Utc::now();
        let claims = Claims {
            sub: UserId::new(1),
            email: "a@b.co".to_owned(),
            role: Role::User,
            iat: now.timestamp(),
            exp: now.timestamp() + 60,
        };

        assert!(claims.issued_before(now + Duration::seconds(5)));
        assert!(!claims.issued_before(now - Duration::seconds(1)));
        assert!(!claims.issued_before(now));
    }
}

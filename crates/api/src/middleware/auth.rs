//! Bearer token authentication and role guards.
//!
//! `AuthUser` resolves `Authorization: Bearer <jwt>` to an active account.
//! `RequireRole<R>` additionally checks the account's role:
//!
//! ```rust,ignore
//! async fn create_book(
//!     State(state): State<AppState>,
//!     RequireStaff { user, .. }: RequireStaff,
//! ) -> Result<impl IntoResponse> { ... }
//! ```

use std::marker::PhantomData;

use axum::{
    extract::FromRequestParts,
    http::{HeaderMap, header::AUTHORIZATION, request::Parts},
};

use booknest_core::Role;

use crate::db::users::UserRepository;
use crate::error::{AppError, set_sentry_user};
use crate::models::User;
use crate::state::AppState;

const NOT_LOGGED_IN: &str = "You are not logged in! Please log in to get access.";
const USER_GONE: &str = "The user belonging to this token no longer exists.";
const PASSWORD_CHANGED: &str = "User recently changed password! Please log in again.";

/// The authenticated account behind the request's bearer token.
#[derive(Debug, Clone)]
pub struct AuthUser(pub User);

/// Token from an `Authorization: Bearer` header.
#[must_use]
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Resolve a raw token to the active user it was issued for.
///
/// # Errors
///
/// Returns `AppError::Token` for a bad or expired token and
/// `AppError::Unauthorized` if the account is gone, inactive, or changed its
/// password after the token was issued.
pub async fn authenticate(state: &AppState, token: &str) -> Result<User, AppError> {
    let claims = state.tokens().verify(token)?;

    let user = UserRepository::new(state.pool())
        .get_by_id(claims.sub)
        .await?
        .filter(|u| u.active)
        .ok_or_else(|| AppError::Unauthorized(USER_GONE.to_owned()))?;

    if let Some(changed_at) = user.password_changed_at
        && claims.issued_before(changed_at)
    {
        return Err(AppError::Unauthorized(PASSWORD_CHANGED.to_owned()));
    }

    Ok(user)
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        // Guards and handlers may both ask for the user
        if let Some(user) = parts.extensions.get::<Self>() {
            return Ok(user.clone());
        }

        let token = bearer_token(&parts.headers)
            .ok_or_else(|| AppError::Unauthorized(NOT_LOGGED_IN.to_owned()))?;
        let user = authenticate(state, token).await?;

        set_sentry_user(&user.id, Some(user.email.as_str()));
        tracing::Span::current().record("user_id", tracing::field::display(user.id));

        let auth = Self(user);
        parts.extensions.insert(auth.clone());
        Ok(auth)
    }
}

/// The set of roles a guard admits.
pub trait AllowedRoles {
    const ROLES: &'static [Role];
}

/// Sellers and admins.
#[derive(Debug, Clone, Copy)]
pub struct Staff;

/// Admins only.
#[derive(Debug, Clone, Copy)]
pub struct Admins;

impl AllowedRoles for Staff {
    const ROLES: &'static [Role] = &[Role::Seller, Role::Admin];
}

impl AllowedRoles for Admins {
    const ROLES: &'static [Role] = &[Role::Admin];
}

/// An authenticated user whose role is in `R::ROLES`.
///
/// Rejects with 401 like `AuthUser`, then 403 for any other role.
#[derive(Debug, Clone)]
pub struct RequireRole<R> {
    pub user: User,
    _roles: PhantomData<R>,
}

pub type RequireStaff = RequireRole<Staff>;
pub type RequireAdmin = RequireRole<Admins>;

/// Whether `role` passes the guard `R`.
#[must_use]
pub fn role_allowed<R: AllowedRoles>(role: Role) -> bool {
    R::ROLES.contains(&role)
}

impl<R> FromRequestParts<AppState> for RequireRole<R>
where
    R: AllowedRoles + Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let AuthUser(user) = AuthUser::from_request_parts(parts, state).await?;

        if !role_allowed::<R>(user.role) {
            tracing::debug!(user_id = %user.id, role = %user.role, "Role guard rejected request");
            return Err(AppError::permission_denied());
        }

        Ok(Self {
            user,
            _roles: PhantomData,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    fn headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn test_bearer_token() {
        assert_eq!(bearer_token(&headers("Bearer abc.def.ghi")), Some("abc.def.ghi"));
        assert_eq!(bearer_token(&headers("Bearer   ")), None);
        assert_eq!(bearer_token(&headers("Basic dXNlcjpwYXNz")), None);
        assert_eq!(bearer_token(&HeaderMap::new()), None);
    }

    #[test]
    fn test_role_sets() {
        assert!(role_allowed::<Staff>(Role::Seller));
        assert!(role_allowed::<Staff>(Role::Admin));
        assert!(!role_allowed::<Staff>(Role::User));

        assert!(role_allowed::<Admins>(Role::Admin));
        assert!(!role_allowed::<Admins>(Role::Seller));
    }
}

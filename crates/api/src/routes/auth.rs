//! Account route handlers: signup, login, profile and password flows.

use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::json;
use tracing::instrument;

use booknest_core::{Email, Role};

use crate::config::Environment;
use crate::db::RepositoryError;
use crate::db::users::UserRepository;
use crate::error::{AppError, Result};
use crate::extract::{ApiJson, ApiPath};
use crate::middleware::AuthUser;
use crate::models::{ProfileUpdate, User, UserAddress};
use crate::services::auth::{AuthError, AuthService, SignupInput, signup_key_matches};
use crate::services::notifications::Notification;
use crate::state::AppState;

/// Signup form data.
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SignupRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    pub password_confirm: String,
    pub role: Option<String>,
    pub address: Option<UserAddress>,
    pub phone: Option<String>,
}

impl SignupRequest {
    fn into_input(self, forced_role: Option<Role>) -> SignupInput {
        SignupInput {
            name: self.name,
            email: self.email,
            password: self.password,
            password_confirm: self.password_confirm,
            role: forced_role.map(|r| r.to_string()).or(self.role),
            address: self.address,
            phone: self.phone,
        }
    }
}

/// Login form data.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    pub role: Option<Role>,
}

/// Admin signup form data.
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AdminSignupRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    pub signup_key: String,
}

/// Profile edit. Password fields are only present to be rejected.
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct UpdateMeRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub address: Option<UserAddress>,
    pub phone: Option<String>,
    pub password: Option<serde_json::Value>,
    pub password_confirm: Option<serde_json::Value>,
    pub current_password: Option<serde_json::Value>,
}

impl UpdateMeRequest {
    fn touches_password(&self) -> bool {
        self.password.is_some() || self.password_confirm.is_some() || self.current_password.is_some()
    }

    fn into_update(self) -> Result<ProfileUpdate> {
        if self.touches_password() {
            return Err(AppError::BadRequest(
                "This route is not for password updates. Please use /update-password.".to_owned(),
            ));
        }

        let name = match self.name.map(|n| n.trim().to_owned()) {
            Some(name) if name.chars().count() < 2 => {
                return Err(AuthError::InvalidName.into());
            }
            other => other,
        };
        let email = self
            .email
            .as_deref()
            .map(Email::parse)
            .transpose()
            .map_err(AuthError::from)?;

        Ok(ProfileUpdate {
            name,
            email,
            address: self.address,
            phone: self.phone.map(|p| p.trim().to_owned()),
        })
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct UpdatePasswordRequest {
    pub current_password: String,
    pub password: String,
    pub password_confirm: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    pub password: String,
    pub password_confirm: String,
}

/// `{status, token, user}` with a fresh token for `user`.
fn token_response(state: &AppState, user: &User, status: StatusCode) -> Result<Response> {
    let token = state
        .tokens()
        .issue(user.id, user.email.as_str(), user.role)?;
    Ok((
        status,
        Json(json!({ "status": "success", "token": token, "user": user })),
    )
        .into_response())
}

async fn register(state: &AppState, input: SignupInput) -> Result<Response> {
    let user = AuthService::new(state.pool()).signup(&input).await?;

    state
        .hub()
        .send_to_role(Role::Admin, Notification::new_user(user.id, &user.name))
        .await;

    token_response(state, &user, StatusCode::CREATED)
}

/// Reader or seller signup.
#[instrument(skip_all)]
pub async fn signup(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<SignupRequest>,
) -> Result<Response> {
    register(&state, body.into_input(None)).await
}

/// Seller signup; the role is forced.
#[instrument(skip_all)]
pub async fn seller_signup(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<SignupRequest>,
) -> Result<Response> {
    register(&state, body.into_input(Some(Role::Seller))).await
}

/// Admin signup, unlocked by the configured signup key.
#[instrument(skip_all)]
pub async fn admin_signup(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<AdminSignupRequest>,
) -> Result<Response> {
    let key = state
        .config()
        .admin_signup_key
        .as_ref()
        .ok_or(AuthError::AdminSignupDisabled)?;
    if !signup_key_matches(key, &body.signup_key) {
        tracing::warn!("Admin signup with wrong key");
        return Err(AuthError::InvalidSignupKey.into());
    }

    let user = AuthService::new(state.pool())
        .create_admin(&body.name, &body.email, &body.password)
        .await?;
    token_response(&state, &user, StatusCode::CREATED)
}

async fn login_with(state: &AppState, body: LoginRequest, role: Option<Role>) -> Result<Response> {
    let user = AuthService::new(state.pool())
        .login(&body.email, &body.password, role)
        .await?;
    token_response(state, &user, StatusCode::OK)
}

/// Login with an optional role check from the body.
#[instrument(skip_all)]
pub async fn login(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<LoginRequest>,
) -> Result<Response> {
    let role = body.role;
    login_with(&state, body, role).await
}

#[instrument(skip_all)]
pub async fn user_login(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<LoginRequest>,
) -> Result<Response> {
    login_with(&state, body, Some(Role::User)).await
}

#[instrument(skip_all)]
pub async fn seller_login(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<LoginRequest>,
) -> Result<Response> {
    login_with(&state, body, Some(Role::Seller)).await
}

#[instrument(skip_all)]
pub async fn admin_login(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<LoginRequest>,
) -> Result<Response> {
    login_with(&state, body, Some(Role::Admin)).await
}

/// Confirm a token is still good.
pub async fn verify(AuthUser(user): AuthUser) -> Json<serde_json::Value> {
    Json(json!({
        "status": "success",
        "data": { "user": { "id": user.id, "email": user.email, "role": user.role } },
    }))
}

/// Tokens are stateless; the client discards its copy.
pub async fn logout() -> Json<serde_json::Value> {
    Json(json!({ "status": "success", "message": "Logged out successfully" }))
}

pub async fn me(AuthUser(user): AuthUser) -> Json<serde_json::Value> {
    super::success(json!({ "user": user }))
}

/// Edit name, email, address or phone.
#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn update_me(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ApiJson(body): ApiJson<UpdateMeRequest>,
) -> Result<Json<serde_json::Value>> {
    let update = body.into_update()?;
    let user = UserRepository::new(state.pool())
        .update_profile(user.id, &update)
        .await
        .map_err(|e| match e {
            RepositoryError::Conflict(_) => AppError::from(AuthError::EmailTaken),
            other => other.into(),
        })?;

    Ok(super::success(json!({ "user": user })))
}

/// Deactivate the caller's account.
#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn delete_me(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<StatusCode> {
    UserRepository::new(state.pool())
        .set_active(user.id, false)
        .await?;
    tracing::info!("Account deactivated by owner");
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn update_password(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ApiJson(body): ApiJson<UpdatePasswordRequest>,
) -> Result<Response> {
    let user = AuthService::new(state.pool())
        .update_password(
            user.id,
            &body.current_password,
            &body.password,
            &body.password_confirm,
        )
        .await?;
    token_response(&state, &user, StatusCode::OK)
}

/// Store a reset token and mail the link. Development echoes the token.
#[instrument(skip_all)]
pub async fn forgot_password(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<ForgotPasswordRequest>,
) -> Result<Json<serde_json::Value>> {
    let auth = AuthService::new(state.pool());
    let (user, token) = auth.forgot_password(&body.email).await?;

    if let Some(email) = state.email() {
        if let Err(e) = email
            .send_password_reset(user.email.as_str(), &user.name, &token)
            .await
        {
            auth.cancel_password_reset(user.id).await?;
            return Err(AppError::Internal(format!(
                "failed to send password reset email: {e}"
            )));
        }
    } else {
        tracing::warn!(user_id = %user.id, "SMTP not configured, reset link not emailed");
    }

    let mut body = json!({ "status": "success", "message": "Token sent to email!" });
    if state.config().environment == Environment::Development {
        body["resetToken"] = json!(token);
    }
    Ok(Json(body))
}

#[instrument(skip_all)]
pub async fn reset_password(
    State(state): State<AppState>,
    ApiPath(token): ApiPath<String>,
    ApiJson(body): ApiJson<ResetPasswordRequest>,
) -> Result<Response> {
    let user = AuthService::new(state.pool())
        .reset_password(&token, &body.password, &body.password_confirm)
        .await?;
    token_response(&state, &user, StatusCode::OK)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_signup_request_is_camel_case() {
        let body: SignupRequest = serde_json::from_str(
            r#"{"name":"Ada","email":"ada@example.com","password":"pw","passwordConfirm":"pw",
                "address":{"city":"Pune"}}"#,
        )
        .unwrap();
        assert_eq!(body.password_confirm, "pw");
        assert_eq!(body.address.unwrap().city.as_deref(), Some("Pune"));
    }

    #[test]
    fn test_seller_signup_forces_role() {
        let body = SignupRequest {
            role: Some("user".to_owned()),
            ..SignupRequest::default()
        };
        assert_eq!(
            body.into_input(Some(Role::Seller)).role.as_deref(),
            Some("seller")
        );
    }

    #[test]
    fn test_update_me_rejects_password_fields() {
        let body: UpdateMeRequest =
            serde_json::from_str(r#"{"name":"Ada","password":"hunter22"}"#).unwrap();
        let err = body.into_update().unwrap_err();
        assert_eq!(
            err.parts().1,
            "This route is not for password updates. Please use /update-password."
        );
    }

    #[test]
    fn test_update_me_validates_fields() {
        let body = UpdateMeRequest {
            name: Some(" A ".to_owned()),
            ..UpdateMeRequest::default()
        };
        assert!(matches!(
            body.into_update(),
            Err(AppError::Auth(AuthError::InvalidName))
        ));

        let body = UpdateMeRequest {
            email: Some("not-an-email".to_owned()),
            ..UpdateMeRequest::default()
        };
        assert!(matches!(
            body.into_update(),
            Err(AppError::Auth(AuthError::InvalidEmail(_)))
        ));

        let body = UpdateMeRequest {
            name: Some("  Ada Lovelace ".to_owned()),
            email: Some("ADA@Example.com".to_owned()),
            ..UpdateMeRequest::default()
        };
        let update = body.into_update().unwrap();
        assert_eq!(update.name.as_deref(), Some("Ada Lovelace"));
        assert_eq!(update.email.unwrap().as_str(), "ada@example.com");
    }

    #[test]
    fn test_login_role_is_optional() {
        let body: LoginRequest =
            serde_json::from_str(r#"{"email":"a@b.co","password":"x"}"#).unwrap();
        assert!(body.role.is_none());

        let body: LoginRequest =
            serde_json::from_str(r#"{"email":"a@b.co","password":"x","role":"seller"}"#).unwrap();
        assert_eq!(body.role, Some(Role::Seller));
    }
}

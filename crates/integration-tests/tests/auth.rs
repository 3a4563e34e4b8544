//! Authentication guards and credential validation.

#![allow(clippy::unwrap_used)]

use axum::body::Body;
use axum::http::header;
use booknest_integration_tests::{
    ADMIN_SIGNUP_KEY, TestApp, bearer, get, json_request, request, test_config,
};
use serde_json::json;

const NOT_LOGGED_IN: &str = "You are not logged in! Please log in to get access.";

#[tokio::test]
async fn test_protected_routes_require_token() {
    let app = TestApp::new();
    for (method, uri) in [
        ("GET", "/api/auth/me"),
        ("GET", "/api/auth/verify"),
        ("GET", "/api/cart"),
        ("GET", "/api/orders/my-orders"),
        ("GET", "/api/wishlist"),
        ("GET", "/api/analytics/seller"),
        ("GET", "/api/admin/users"),
        ("GET", "/api/recommendations/personalized"),
    ] {
        let (status, body) = app
            .send_json(request(method, uri).body(Body::empty()).unwrap())
            .await;
        assert_eq!(status, 401, "{method} {uri}");
        assert_eq!(body["status"], "fail");
        assert_eq!(body["message"], NOT_LOGGED_IN, "{method} {uri}");
    }
}

#[tokio::test]
async fn test_non_bearer_authorization_is_ignored() {
    let app = TestApp::new();
    let (status, body) = app
        .send_json(
            request("GET", "/api/auth/me")
                .header(header::AUTHORIZATION, "Basic dXNlcjpwYXNz")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(status, 401);
    assert_eq!(body["message"], NOT_LOGGED_IN);
}

#[tokio::test]
async fn test_garbage_token_rejected() {
    let app = TestApp::new();
    let (status, body) = app
        .send_json(bearer("GET", "/api/auth/me", "not.a.jwt"))
        .await;
    assert_eq!(status, 401);
    assert_eq!(body["message"], "Invalid token. Please log in again!");
}

#[tokio::test]
async fn test_token_from_other_secret_rejected() {
    let mut config = test_config();
    config.jwt.secret = secrecy::SecretString::from("Zp4Lx8Qw2Nv6Rt1Ys9Ku3Hm7Jc5Gb0Fd");
    let other = TestApp::with_config(config);
    let token = other
        .state
        .tokens()
        .issue(
            booknest_core::UserId::new(1),
            "reader@example.com",
            booknest_core::Role::User,
        )
        .unwrap();

    let app = TestApp::new();
    let (status, body) = app.send_json(bearer("GET", "/api/cart", &token)).await;
    assert_eq!(status, 401);
    assert_eq!(body["message"], "Invalid token. Please log in again!");
}

#[tokio::test]
async fn test_logout_needs_no_account() {
    let app = TestApp::new();
    let response = app.send(get("/api/auth/logout")).await;
    assert!(response.status().is_success());
}

#[tokio::test]
async fn test_signup_validation() {
    let app = TestApp::new();
    let cases = [
        (
            json!({"email": "a@example.com", "password": "password1", "passwordConfirm": "password1"}),
            400,
            "Please provide name",
        ),
        (
            json!({"name": "Ann", "email": "a@example.com", "password": "password1", "passwordConfirm": "password2"}),
            400,
            "Passwords do not match",
        ),
        (
            json!({"name": "Ann", "email": "a@example.com", "password": "password1", "passwordConfirm": "password1", "role": "wizard"}),
            400,
            "Invalid role specified. Allowed roles are: user, seller",
        ),
        (
            json!({"name": "Ann", "email": "a@example.com", "password": "password1", "passwordConfirm": "password1", "role": "admin"}),
            403,
            "Admin accounts cannot be created through signup",
        ),
        (
            json!({"name": "A", "email": "a@example.com", "password": "password1", "passwordConfirm": "password1"}),
            400,
            "Name must be at least 2 characters",
        ),
        (
            json!({"name": "Ann", "email": "not-an-email", "password": "password1", "passwordConfirm": "password1"}),
            400,
            "Please provide a valid email",
        ),
        (
            json!({"name": "Ann", "email": "a@example.com", "password": "short", "passwordConfirm": "short"}),
            400,
            "Password must be at least 8 characters",
        ),
    ];

    for (payload, expected_status, expected_message) in cases {
        let (status, body) = app
            .send_json(json_request("POST", "/api/auth/signup", &payload))
            .await;
        assert_eq!(status, expected_status, "{payload}");
        assert_eq!(body["message"], expected_message, "{payload}");
    }
}

#[tokio::test]
async fn test_login_requires_credentials() {
    let app = TestApp::new();
    for uri in [
        "/api/auth/login",
        "/api/auth/user/login",
        "/api/seller/login",
        "/api/admin/login",
    ] {
        let (status, body) = app
            .send_json(json_request("POST", uri, &json!({"email": "", "password": ""})))
            .await;
        assert_eq!(status, 400, "{uri}");
        assert_eq!(body["message"], "Please provide email and password!");
    }
}

#[tokio::test]
async fn test_login_with_malformed_email() {
    let app = TestApp::new();
    let (status, body) = app
        .send_json(json_request(
            "POST",
            "/api/auth/login",
            &json!({"email": "nobody", "password": "password1"}),
        ))
        .await;
    assert_eq!(status, 401);
    assert_eq!(body["message"], "Invalid email or password");
}

#[tokio::test]
async fn test_malformed_json_is_a_fail_response() {
    let app = TestApp::new();
    let (status, body) = app
        .send_json(
            request("POST", "/api/auth/login")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await;
    assert_eq!(status, 400);
    assert_eq!(body["status"], "fail");
}

#[tokio::test]
async fn test_admin_signup_key() {
    let app = TestApp::new();
    let payload = json!({
        "name": "Root",
        "email": "root@example.com",
        "password": "password1",
        "signupKey": format!("{ADMIN_SIGNUP_KEY}-wrong"),
    });
    let (status, body) = app
        .send_json(json_request("POST", "/api/admin/signup", &payload))
        .await;
    assert_eq!(status, 403);
    assert_eq!(body["message"], "Invalid admin signup key");

    let mut config = test_config();
    config.admin_signup_key = None;
    let closed = TestApp::with_config(config);
    let (status, body) = closed
        .send_json(json_request("POST", "/api/admin/signup", &payload))
        .await;
    assert_eq!(status, 403);
    assert_eq!(body["message"], "Admin signup is disabled");
}

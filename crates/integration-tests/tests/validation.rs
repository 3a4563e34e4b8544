//! Request parsing and rate limiting.

#![allow(clippy::unwrap_used)]

use axum::body::Body;
use booknest_integration_tests::{TestApp, get, json_request};
use serde_json::json;

#[tokio::test]
async fn test_bad_query_parameters() {
    let app = TestApp::new();
    for uri in [
        "/api/books?page=abc",
        "/api/books?minPrice=cheap",
        "/api/books?sort=sideways",
        "/api/recommendations/trending?days=soon",
    ] {
        let (status, body) = app.send_json(get(uri)).await;
        assert_eq!(status, 400, "{uri}");
        assert_eq!(body["status"], "fail", "{uri}");
    }
}

#[tokio::test]
async fn test_auth_rate_limit_returns_json() {
    let app = TestApp::new();
    let payload = json!({"email": "", "password": ""});

    let mut limited = None;
    for _ in 0..60 {
        let response = app
            .send(json_request("POST", "/api/auth/login", &payload))
            .await;
        if response.status().as_u16() == 429 {
            limited = Some(response);
            break;
        }
    }

    let response = limited.expect("limiter should reject within 60 attempts");
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["status"], "fail");
    assert_eq!(
        body["message"],
        "Too many requests from this IP, please try again later."
    );
}

#[tokio::test]
async fn test_limits_are_per_client() {
    let app = TestApp::new();
    let payload = json!({"email": "", "password": ""});
    for _ in 0..60 {
        app.send(json_request("POST", "/api/auth/login", &payload))
            .await;
    }

    let other_client = axum::http::Request::builder()
        .method("POST")
        .uri("/api/auth/login")
        .header("x-forwarded-for", "198.51.100.20")
        .header("content-type", "application/json")
        .body(Body::from(payload.to_string()))
        .unwrap();
    let (status, _) = app.send_json(other_client).await;
    assert_eq!(status, 400);
}

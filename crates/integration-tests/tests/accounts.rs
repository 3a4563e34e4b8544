//! Login lockout, password reset and review aggregates against a real
//! database.
//!
//! Skipped unless `BOOKNEST_DATABASE_URL` is set.

#![allow(clippy::unwrap_used)]

use booknest_api::db::books::BookRepository;
use booknest_api::db::reviews::ReviewRepository;
use booknest_api::services::auth::{AuthError, AuthService, MAX_LOGIN_ATTEMPTS};
use booknest_core::{Rating, Role};
use booknest_integration_tests::{
    PASSWORD, TestApp, database, json_request, list_book, signup, test_config,
};
use rust_decimal::Decimal;
use serde_json::json;

#[tokio::test]
async fn test_fifth_failed_login_locks_account() {
    let Some(pool) = database().await else {
        return;
    };
    let user = signup(&pool, Role::User).await;
    let app = TestApp::with_pool(test_config(), pool);
    let email = user.email.to_string();

    for attempt in 1..=MAX_LOGIN_ATTEMPTS {
        let (status, body) = app
            .send_json(json_request(
                "POST",
                "/api/auth/login",
                &json!({"email": email, "password": "wrong-password"}),
            ))
            .await;
        assert_eq!(status, 401, "attempt {attempt}");
        assert_eq!(body["message"], "Invalid email or password");
    }

    // the right password no longer helps
    let (status, body) = app
        .send_json(json_request(
            "POST",
            "/api/auth/login",
            &json!({"email": email, "password": PASSWORD}),
        ))
        .await;
    assert_eq!(status, 423);
    assert_eq!(body["status"], "fail");
    assert!(
        body["message"]
            .as_str()
            .unwrap()
            .starts_with("Account is locked. Please try again in")
    );
}

#[tokio::test]
async fn test_successful_login_clears_failures() {
    let Some(pool) = database().await else {
        return;
    };
    let user = signup(&pool, Role::User).await;
    let auth = AuthService::new(&pool);
    let email = user.email.to_string();

    for _ in 1..MAX_LOGIN_ATTEMPTS {
        assert!(matches!(
            auth.login(&email, "wrong-password", None).await,
            Err(AuthError::InvalidCredentials)
        ));
    }
    auth.login(&email, PASSWORD, None).await.unwrap();

    // the counter restarted, so one more miss does not lock
    assert!(matches!(
        auth.login(&email, "wrong-password", None).await,
        Err(AuthError::InvalidCredentials)
    ));
    auth.login(&email, PASSWORD, None).await.unwrap();
}

#[tokio::test]
async fn test_expired_reset_token_rejected() {
    let Some(pool) = database().await else {
        return;
    };
    let user = signup(&pool, Role::User).await;
    let auth = AuthService::new(&pool);
    let email = user.email.to_string();

    let (_, stale) = auth.forgot_password(&email).await.unwrap();
    sqlx::query(
        "UPDATE users SET password_reset_expires = NOW() - INTERVAL '1 minute' WHERE id = $1",
    )
    .bind(user.id)
    .execute(&pool)
    .await
    .unwrap();

    assert!(matches!(
        auth.reset_password(&stale, "brand-new-pass", "brand-new-pass")
            .await,
        Err(AuthError::InvalidResetToken)
    ));

    let (_, fresh) = auth.forgot_password(&email).await.unwrap();
    auth.reset_password(&fresh, "brand-new-pass", "brand-new-pass")
        .await
        .unwrap();
    auth.login(&email, "brand-new-pass", None).await.unwrap();

    // a used token is gone
    assert!(matches!(
        auth.reset_password(&fresh, "another-pass-1", "another-pass-1")
            .await,
        Err(AuthError::InvalidResetToken)
    ));
}

#[tokio::test]
async fn test_concurrent_reviews_keep_rating_in_step() {
    let Some(pool) = database().await else {
        return;
    };
    let seller = signup(&pool, Role::Seller).await;
    let book = list_book(&pool, &seller, "14.00", 3).await;

    let mut reviewers = Vec::new();
    for _ in 0..4 {
        reviewers.push(signup(&pool, Role::User).await);
    }

    let mut tasks = Vec::new();
    for (reviewer, stars) in reviewers.iter().zip([5, 4, 4, 2]) {
        let pool = pool.clone();
        let (book_id, user_id) = (book.id, reviewer.id);
        tasks.push(tokio::spawn(async move {
            ReviewRepository::new(&pool)
                .create(book_id, user_id, Rating::new(stars).unwrap(), "Read it twice")
                .await
        }));
    }
    let mut created = Vec::new();
    for task in tasks {
        created.push(task.await.unwrap().unwrap());
    }

    let books = BookRepository::new(&pool);
    let rated = books.get(book.id).await.unwrap().unwrap();
    assert_eq!(rated.review_count, 4);
    // 15 / 4 = 3.75, rounded half away from zero
    assert_eq!(rated.average_rating, Decimal::new(38, 1));

    let reviews = ReviewRepository::new(&pool);
    let lowest = created.iter().find(|r| r.rating == 2).unwrap();
    reviews.delete(lowest.id).await.unwrap();
    let rated = books.get(book.id).await.unwrap().unwrap();
    assert_eq!(rated.review_count, 3);
    assert_eq!(rated.average_rating, Decimal::new(43, 1));

    let duplicate = reviews
        .create(book.id, reviewers[0].id, Rating::new(1).unwrap(), "Again")
        .await;
    assert!(duplicate.is_err());
    assert_eq!(books.get(book.id).await.unwrap().unwrap().review_count, 3);
}

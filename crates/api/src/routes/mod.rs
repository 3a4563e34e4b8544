//! HTTP route handlers for the API.
//!
//! # Route Structure
//!
//! ```text
//! # Auth (credential routes use the strict rate limiter)
//! POST  /api/auth/signup                 - Reader or seller signup
//! POST  /api/auth/login                  - Login, optional `role`
//! POST  /api/auth/{user,seller,admin}/login - Role-scoped login
//! GET   /api/auth/verify                 - Check a token
//! GET   /api/auth/logout                 - Stateless logout (also POST)
//! GET   /api/auth/me                     - Current profile
//! PATCH /api/auth/update-me              - Edit profile
//! DELETE /api/auth/delete-me             - Deactivate account
//! PATCH /api/auth/update-password        - Change password
//! POST  /api/auth/forgot-password        - Email a reset link
//! PATCH /api/auth/reset-password/{token} - Finish a reset
//! POST  /api/seller/{signup,login}       - Seller aliases
//! POST  /api/admin/{signup,login}        - Admin signup (key) and login
//!
//! # Books and reviews
//! GET   /api/books                       - Search, filter, paginate
//! GET   /api/books/stats                 - Per-genre stats
//! GET   /api/books/top-rated             - Best rated
//! GET   /api/books/low-stock             - Staff: lowest stock first
//! GET   /api/books/seller/{seller_id}    - A seller's listings
//! POST  /api/books                       - Staff: create
//! GET   /api/books/{id}                  - Detail (PATCH, DELETE: owner/admin)
//! POST  /api/books/{id}/cover            - Owner/admin: multipart cover upload
//! GET   /api/books/{id}/similar          - Same genre or author
//! GET   /api/books/{id}/reviews          - Reviews (POST: add)
//! PATCH /api/books/reviews/{review_id}   - Author: edit (DELETE: author/admin)
//!
//! # Cart
//! GET   /api/cart                        - View (DELETE: clear)
//! POST  /api/cart/items                  - Add
//! PATCH /api/cart/items/{book_id}        - Set quantity (DELETE: remove)
//! POST  /api/cart/checkout               - Order from cart
//!
//! # Orders
//! POST  /api/orders                      - Place (GET: staff listing)
//! GET   /api/orders/my-orders            - Buyer history
//! GET   /api/orders/stats                - Staff stats
//! GET   /api/orders/seller/{seller_id}   - A seller's orders
//! GET   /api/orders/{id}                 - Detail (DELETE: admin)
//! PATCH /api/orders/{id}/cancel          - Buyer cancel (also /cancel/{id})
//! PATCH /api/orders/{id}/status          - Staff status change
//! PATCH /api/orders/{id}/tracking        - Staff tracking details
//!
//! # Wishlist
//! GET   /api/wishlist                    - Own list
//! GET   /api/wishlist/{user_id}          - Self or admin
//! POST  /api/wishlist/add                - Save a book
//! POST  /api/wishlist/remove             - Remove (also DELETE /{book_id})
//!
//! # Admin, analytics, recommendations
//! GET   /api/admin/users                 - List users
//! DELETE /api/admin/users/{id}           - Delete user
//! PATCH /api/admin/users/{id}/active     - (De)activate
//! DELETE /api/admin/orders/{id}          - Delete order
//! DELETE /api/admin/items/{id}           - Delete book
//! GET   /api/analytics/seller            - Seller dashboard
//! GET   /api/analytics/admin             - Admin dashboard (cached)
//! GET   /api/recommendations/{popular,new-arrivals,trending,personalized}
//!
//! # Notifications
//! GET   /api/ws?token=<jwt>              - WebSocket upgrade
//! ```

pub mod admin;
pub mod analytics;
pub mod auth;
pub mod books;
pub mod cart;
pub mod orders;
pub mod recommendations;
pub mod reviews;
pub mod wishlist;
pub mod ws;

use axum::{
    Json, Router,
    extract::DefaultBodyLimit,
    routing::{delete, get, patch, post},
};
use serde::Serialize;
use serde_json::{Value, json};

use crate::middleware::auth_rate_limiter;
use crate::services::uploads::MAX_COVER_BYTES;
use crate::state::AppState;

/// Largest JSON body accepted.
pub const JSON_BODY_LIMIT: usize = 10 * 1024;

/// Cover uploads get room for the image plus multipart framing.
const COVER_BODY_LIMIT: usize = MAX_COVER_BYTES + 64 * 1024;

/// `{"status": "success", "data": data}`
pub(crate) fn success(data: Value) -> Json<Value> {
    Json(json!({ "status": "success", "data": data }))
}

/// `{"status": "success", "results": n, "data": {key: items}}`
pub(crate) fn listing<T: Serialize>(key: &str, items: &[T]) -> Json<Value> {
    let mut data = serde_json::Map::new();
    data.insert(key.to_owned(), json!(items));
    Json(json!({
        "status": "success",
        "results": items.len(),
        "data": data,
    }))
}

/// Everything under `/api`.
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/auth", auth_routes())
        .nest("/seller", seller_routes())
        .nest("/admin", admin_routes())
        .nest("/books", book_routes())
        .nest("/cart", cart_routes())
        .nest("/orders", order_routes())
        .nest("/wishlist", wishlist_routes())
        .nest("/analytics", analytics_routes())
        .nest("/recommendations", recommendation_routes())
        .route("/ws", get(ws::connect))
        .layer(DefaultBodyLimit::max(JSON_BODY_LIMIT))
}

/// Create the auth routes router.
pub fn auth_routes() -> Router<AppState> {
    let credentials = Router::new()
        .route("/signup", post(auth::signup))
        .route("/login", post(auth::login))
        .route("/user/login", post(auth::user_login))
        .route("/seller/login", post(auth::seller_login))
        .route("/admin/login", post(auth::admin_login))
        .route("/forgot-password", post(auth::forgot_password))
        .route("/reset-password/{token}", patch(auth::reset_password))
        .route("/update-password", patch(auth::update_password))
        .layer(auth_rate_limiter());

    Router::new()
        .route("/verify", get(auth::verify))
        .route("/logout", get(auth::logout).post(auth::logout))
        .route("/me", get(auth::me))
        .route("/update-me", patch(auth::update_me))
        .route("/delete-me", delete(auth::delete_me))
        .merge(credentials)
}

/// Seller signup and login aliases.
pub fn seller_routes() -> Router<AppState> {
    Router::new()
        .route("/signup", post(auth::seller_signup))
        .route("/login", post(auth::seller_login))
        .layer(auth_rate_limiter())
}

/// Create the admin routes router.
pub fn admin_routes() -> Router<AppState> {
    let credentials = Router::new()
        .route("/signup", post(auth::admin_signup))
        .route("/login", post(auth::admin_login))
        .layer(auth_rate_limiter());

    Router::new()
        .route("/users", get(admin::list_users))
        .route("/users/{id}", delete(admin::delete_user))
        .route("/users/{id}/active", patch(admin::set_active))
        .route("/orders/{id}", delete(admin::delete_order))
        .route("/items/{id}", delete(admin::delete_book))
        .merge(credentials)
}

/// Create the book and review routes router.
pub fn book_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(books::index).post(books::create))
        .route("/stats", get(books::stats))
        .route("/top-rated", get(books::top_rated))
        .route("/low-stock", get(books::low_stock))
        .route("/seller/{seller_id}", get(books::by_seller))
        .route(
            "/reviews/{review_id}",
            patch(reviews::update).delete(reviews::remove),
        )
        .route(
            "/{id}",
            get(books::show).patch(books::update).delete(books::remove),
        )
        .route(
            "/{id}/cover",
            post(books::upload_cover).layer(DefaultBodyLimit::max(COVER_BODY_LIMIT)),
        )
        .route("/{id}/similar", get(books::similar))
        .route("/{id}/reviews", get(reviews::index).post(reviews::create))
}

/// Create the cart routes router.
pub fn cart_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(cart::show).delete(cart::clear))
        .route("/items", post(cart::add))
        .route(
            "/items/{book_id}",
            patch(cart::set_quantity).delete(cart::remove),
        )
        .route("/checkout", post(cart::checkout))
}

/// Create the order routes router.
pub fn order_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(orders::index).post(orders::create))
        .route("/my-orders", get(orders::my_orders))
        .route("/stats", get(orders::stats))
        .route("/seller/{seller_id}", get(orders::by_seller))
        .route("/cancel/{id}", patch(orders::cancel))
        .route("/{id}", get(orders::show).delete(orders::remove))
        .route("/{id}/cancel", patch(orders::cancel))
        .route("/{id}/status", patch(orders::update_status))
        .route("/{id}/tracking", patch(orders::update_tracking))
}

/// Create the wishlist routes router.
pub fn wishlist_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(wishlist::index))
        .route("/add", post(wishlist::add))
        .route("/remove", post(wishlist::remove))
        // Same path: GET takes a user id, DELETE a book id
        .route(
            "/{id}",
            get(wishlist::for_user).delete(wishlist::remove_book),
        )
}

/// Create the analytics routes router.
pub fn analytics_routes() -> Router<AppState> {
    Router::new()
        .route("/seller", get(analytics::seller))
        .route("/admin", get(analytics::admin))
}

/// Create the recommendation routes router.
pub fn recommendation_routes() -> Router<AppState> {
    Router::new()
        .route("/popular", get(recommendations::popular))
        .route("/new-arrivals", get(recommendations::new_arrivals))
        .route("/trending", get(recommendations::trending))
        .route("/personalized", get(recommendations::personalized))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::body::to_bytes;
    use axum::response::IntoResponse;

    use super::*;

    #[tokio::test]
    async fn test_listing_shape() {
        let response = listing("books", &["a", "b"]).into_response();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(body["status"], "success");
        assert_eq!(body["results"], 2);
        assert_eq!(body["data"]["books"][1], "b");
    }
}

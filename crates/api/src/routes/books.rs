//! Catalog route handlers.

use axum::{
    Json,
    extract::{Multipart, State},
    http::StatusCode,
    response::IntoResponse,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::instrument;

use booknest_core::{BookId, Price, Role, UserId};

use crate::db::books::BookRepository;
use crate::db::recommendations::RecommendationRepository;
use crate::error::{AppError, Result};
use crate::extract::{ApiJson, ApiPath, ApiQuery};
use crate::middleware::RequireStaff;
use crate::models::book::LOW_STOCK_THRESHOLD;
use crate::models::{Book, BookFilter, BookUpdate, NewBook, User};
use crate::services::notifications::Notification;
use crate::services::uploads::{read_cover, store_cover};
use crate::state::AppState;

/// Length of the top-rated and low-stock lists.
const SHORT_LIST: i64 = 10;

const DEFAULT_SIMILAR: i64 = 5;

/// Book fields as sent by the client.
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BookRequest {
    pub title: Option<String>,
    pub author: Option<String>,
    pub genre: Option<String>,
    pub description: Option<String>,
    pub price: Option<Decimal>,
    pub stock: Option<i32>,
    pub item_image: Option<String>,
}

fn required(value: Option<String>, field: &str) -> Result<String> {
    value
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::BadRequest(format!("Please provide {field}")))
}

fn optional_text(value: Option<String>, field: &str) -> Result<Option<String>> {
    value.map(|v| required(Some(v), field)).transpose()
}

fn parse_price(amount: Decimal) -> Result<Price> {
    Price::new(amount).map_err(|_| AppError::BadRequest("Price cannot be negative".to_owned()))
}

fn check_stock(stock: i32) -> Result<i32> {
    if stock < 0 {
        return Err(AppError::BadRequest("Stock cannot be negative".to_owned()));
    }
    Ok(stock)
}

fn clean_image(image: Option<String>) -> Option<String> {
    image.map(|i| i.trim().to_owned()).filter(|i| !i.is_empty())
}

impl BookRequest {
    /// Validate a new listing for `seller`.
    fn into_new_book(self, seller: &User) -> Result<NewBook> {
        let title = required(self.title, "title")?;
        let author = required(self.author, "author")?;
        let genre = required(self.genre, "genre")?;
        let description = required(self.description, "description")?;
        let price = parse_price(
            self.price
                .ok_or_else(|| AppError::BadRequest("Please provide price".to_owned()))?,
        )?;

        Ok(NewBook {
            title,
            author,
            genre,
            description,
            price,
            stock: check_stock(self.stock.unwrap_or(0))?,
            item_image: clean_image(self.item_image),
            seller_id: seller.id,
            seller_name: seller.name.clone(),
        })
    }

    fn into_update(self) -> Result<BookUpdate> {
        let update = BookUpdate {
            title: optional_text(self.title, "title")?,
            author: optional_text(self.author, "author")?,
            genre: optional_text(self.genre, "genre")?,
            description: optional_text(self.description, "description")?,
            price: self.price.map(parse_price).transpose()?,
            stock: self.stock.map(check_stock).transpose()?,
            item_image: clean_image(self.item_image),
        };

        if update.is_empty() {
            return Err(AppError::BadRequest(
                "Please provide at least one field to update".to_owned(),
            ));
        }
        Ok(update)
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct SimilarQuery {
    pub limit: Option<i64>,
}

fn book_not_found() -> AppError {
    AppError::NotFound("No book found with that ID".to_owned())
}

/// Load a book the caller may modify.
async fn owned_book(state: &AppState, user: &User, id: BookId, action: &str) -> Result<Book> {
    let book = BookRepository::new(state.pool())
        .get(id)
        .await?
        .ok_or_else(book_not_found)?;

    if user.role != Role::Admin && !book.is_owned_by(user.id) {
        return Err(AppError::Forbidden(format!(
            "You do not have permission to {action} this book"
        )));
    }
    Ok(book)
}

/// Search, filter and paginate the catalog.
#[instrument(skip(state))]
pub async fn index(
    State(state): State<AppState>,
    ApiQuery(filter): ApiQuery<BookFilter>,
) -> Result<Json<Value>> {
    let (books, total) = BookRepository::new(state.pool()).list(&filter).await?;
    let page = filter.pagination();

    Ok(Json(json!({
        "status": "success",
        "results": books.len(),
        "total": total,
        "page": page.page(),
        "pages": page.pages(total),
        "data": { "books": books },
    })))
}

pub async fn show(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<BookId>,
) -> Result<Json<Value>> {
    let book = BookRepository::new(state.pool())
        .get(id)
        .await?
        .ok_or_else(book_not_found)?;
    Ok(super::success(json!({ "book": book })))
}

pub async fn by_seller(
    State(state): State<AppState>,
    ApiPath(seller_id): ApiPath<UserId>,
) -> Result<Json<Value>> {
    let books = BookRepository::new(state.pool())
        .list_by_seller(seller_id)
        .await?;
    Ok(super::listing("books", &books))
}

/// Per-genre stats, served from the analytics cache.
pub async fn stats(State(state): State<AppState>) -> Result<Json<Value>> {
    let stats = state.analytics().genre_stats(state.pool()).await?;
    Ok(super::success(json!({ "stats": stats.as_slice() })))
}

pub async fn top_rated(State(state): State<AppState>) -> Result<Json<Value>> {
    let books = BookRepository::new(state.pool())
        .top_rated(SHORT_LIST)
        .await?;
    Ok(super::listing("books", &books))
}

/// Lowest stock first. Sellers only see their own books.
pub async fn low_stock(
    State(state): State<AppState>,
    RequireStaff { user, .. }: RequireStaff,
) -> Result<Json<Value>> {
    let seller = (user.role == Role::Seller).then_some(user.id);
    let books = BookRepository::new(state.pool())
        .low_stock(seller, SHORT_LIST)
        .await?;
    Ok(super::listing("books", &books))
}

#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn create(
    State(state): State<AppState>,
    RequireStaff { user, .. }: RequireStaff,
    ApiJson(body): ApiJson<BookRequest>,
) -> Result<impl IntoResponse> {
    let new = body.into_new_book(&user)?;
    let book = BookRepository::new(state.pool()).create(&new).await?;
    state.analytics().invalidate_catalog().await;

    tracing::info!(book_id = %book.id, "Book created");
    Ok((
        StatusCode::CREATED,
        super::success(json!({ "book": book })),
    ))
}

/// Partial update by the owner or an admin.
#[instrument(skip_all, fields(user_id = %user.id, book_id = %id))]
pub async fn update(
    State(state): State<AppState>,
    RequireStaff { user, .. }: RequireStaff,
    ApiPath(id): ApiPath<BookId>,
    ApiJson(body): ApiJson<BookRequest>,
) -> Result<Json<Value>> {
    let update = body.into_update()?;
    let before = owned_book(&state, &user, id, "update").await?;

    let book = BookRepository::new(state.pool()).update(id, &update).await?;
    state.analytics().invalidate_catalog().await;

    if book.price != before.price {
        state
            .hub()
            .broadcast(Notification::price_change(
                book.id,
                &book.title,
                before.price,
                book.price,
            ))
            .await;
    }
    if update.stock.is_some() && book.stock < LOW_STOCK_THRESHOLD {
        state
            .hub()
            .send_to_user(
                book.seller_id,
                Notification::low_stock(book.id, &book.title, book.stock),
            )
            .await;
    }

    Ok(super::success(json!({ "book": book })))
}

#[instrument(skip_all, fields(user_id = %user.id, book_id = %id))]
pub async fn remove(
    State(state): State<AppState>,
    RequireStaff { user, .. }: RequireStaff,
    ApiPath(id): ApiPath<BookId>,
) -> Result<StatusCode> {
    owned_book(&state, &user, id, "delete").await?;
    BookRepository::new(state.pool()).delete(id).await?;
    state.analytics().invalidate_catalog().await;

    tracing::info!("Book deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// Replace the cover image with a multipart `itemImage` upload.
#[instrument(skip_all, fields(user_id = %user.id, book_id = %id))]
pub async fn upload_cover(
    State(state): State<AppState>,
    RequireStaff { user, .. }: RequireStaff,
    ApiPath(id): ApiPath<BookId>,
    mut multipart: Multipart,
) -> Result<Json<Value>> {
    owned_book(&state, &user, id, "update").await?;

    let upload = read_cover(&mut multipart).await?;
    let path = store_cover(&state.config().uploads_dir, &upload).await?;
    let book = BookRepository::new(state.pool()).set_cover(id, &path).await?;

    tracing::info!(path = %path, "Cover uploaded");
    Ok(super::success(json!({ "book": book })))
}

/// Books sharing the genre or author.
pub async fn similar(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<BookId>,
    ApiQuery(query): ApiQuery<SimilarQuery>,
) -> Result<Json<Value>> {
    let books = RecommendationRepository::new(state.pool())
        .similar(id, query.limit.unwrap_or(DEFAULT_SIMILAR))
        .await?;
    Ok(super::listing("books", &books))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use booknest_core::Email;
    use chrono::Utc;

    use super::*;
    use crate::models::UserAddress;

    fn seller() -> User {
        User {
            id: UserId::new(7),
            name: "Paper Trail Books".to_owned(),
            email: Email::parse("shop@papertrail.test").unwrap(),
            role: Role::Seller,
            address: UserAddress::default(),
            phone: None,
            active: true,
            password_changed_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn message(err: &AppError) -> String {
        err.parts().1.into_owned()
    }

    #[test]
    fn test_new_book_requires_fields() {
        let body: BookRequest =
            serde_json::from_str(r#"{"title":"Dune","author":"Frank Herbert","genre":"Sci-Fi"}"#)
                .unwrap();
        let err = body.into_new_book(&seller()).unwrap_err();
        assert_eq!(message(&err), "Please provide description");

        let body: BookRequest = serde_json::from_str(
            r#"{"title":"  ","author":"Frank Herbert","genre":"Sci-Fi","description":"Spice"}"#,
        )
        .unwrap();
        assert_eq!(
            message(&body.into_new_book(&seller()).unwrap_err()),
            "Please provide title"
        );
    }

    #[test]
    fn test_new_book_defaults_and_seller() {
        let body: BookRequest = serde_json::from_str(
            r#"{"title":"Dune","author":"Frank Herbert","genre":"Sci-Fi",
                "description":"Spice","price":"9.99"}"#,
        )
        .unwrap();
        let book = body.into_new_book(&seller()).unwrap();

        assert_eq!(book.stock, 0);
        assert_eq!(book.seller_id, UserId::new(7));
        assert_eq!(book.seller_name, "Paper Trail Books");
        assert_eq!(book.price.amount(), Decimal::new(999, 2));
        assert!(book.item_image.is_none());
    }

    #[test]
    fn test_new_book_rejects_negative_values() {
        let base = || BookRequest {
            title: Some("Dune".to_owned()),
            author: Some("Frank Herbert".to_owned()),
            genre: Some("Sci-Fi".to_owned()),
            description: Some("Spice".to_owned()),
            price: Some(Decimal::ONE),
            ..BookRequest::default()
        };

        let body = BookRequest {
            price: Some(Decimal::NEGATIVE_ONE),
            ..base()
        };
        assert_eq!(
            message(&body.into_new_book(&seller()).unwrap_err()),
            "Price cannot be negative"
        );

        let body = BookRequest {
            stock: Some(-1),
            ..base()
        };
        assert_eq!(
            message(&body.into_new_book(&seller()).unwrap_err()),
            "Stock cannot be negative"
        );
    }

    #[test]
    fn test_update_must_change_something() {
        let err = BookRequest::default().into_update().unwrap_err();
        assert_eq!(message(&err), "Please provide at least one field to update");

        let update = BookRequest {
            stock: Some(3),
            ..BookRequest::default()
        }
        .into_update()
        .unwrap();
        assert_eq!(update.stock, Some(3));
        assert!(update.price.is_none());
    }

    #[test]
    fn test_update_rejects_blank_title() {
        let err = BookRequest {
            title: Some("   ".to_owned()),
            ..BookRequest::default()
        }
        .into_update()
        .unwrap_err();
        assert_eq!(message(&err), "Please provide title");
    }
}

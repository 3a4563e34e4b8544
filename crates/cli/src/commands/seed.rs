//! Catalog seeding command.
//!
//! Loads a YAML list of books and inserts them for an existing seller.
//!
//! # Usage
//!
//! ```bash
//! booknest-cli seed catalog books.yaml --seller-email shop@example.com
//! ```
//!
//! # File Format
//!
//! ```yaml
//! - title: The Hobbit
//!   author: J. R. R. Tolkien
//!   genre: Fantasy
//!   description: There and back again.
//!   price: 12.99
//!   stock: 40
//!   item_image: /uploads/hobbit.jpg
//! ```

use std::path::Path;

use booknest_api::db::books::BookRepository;
use booknest_api::db::users::UserRepository;
use booknest_api::models::{NewBook, User};
use booknest_core::{Email, Price, Role};
use rust_decimal::Decimal;
use serde::Deserialize;
use thiserror::Error;

/// Errors that can occur while seeding.
#[derive(Debug, Error)]
pub enum SeedError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("Invalid catalog file: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Invalid seller email: {0}")]
    InvalidEmail(String),

    #[error("No user found with email {0}")]
    SellerNotFound(String),

    #[error("{0} is not a seller account")]
    NotASeller(String),

    /// An entry failed validation. `index` is zero-based.
    #[error("Entry {index}: {message}")]
    InvalidEntry { index: usize, message: String },
}

/// One book in the catalog file.
#[derive(Debug, Deserialize)]
pub struct CatalogEntry {
    pub title: String,
    pub author: String,
    pub genre: String,
    pub description: String,
    pub price: Decimal,
    #[serde(default)]
    pub stock: i32,
    #[serde(default)]
    pub item_image: Option<String>,
}

impl CatalogEntry {
    fn into_new_book(self, seller: &User) -> Result<NewBook, String> {
        for (field, value) in [
            ("title", &self.title),
            ("author", &self.author),
            ("genre", &self.genre),
            ("description", &self.description),
        ] {
            if value.trim().is_empty() {
                return Err(format!("Please provide {field}"));
            }
        }
        if self.stock < 0 {
            return Err("Stock cannot be negative".to_owned());
        }
        let price = Price::new(self.price).map_err(|e| e.to_string())?;

        Ok(NewBook {
            title: self.title.trim().to_owned(),
            author: self.author.trim().to_owned(),
            genre: self.genre.trim().to_owned(),
            description: self.description,
            price,
            stock: self.stock,
            item_image: self.item_image.filter(|s| !s.trim().is_empty()),
            seller_id: seller.id,
            seller_name: seller.name.clone(),
        })
    }
}

/// Parse the catalog file contents.
///
/// # Errors
///
/// Returns [`SeedError::Parse`] if the YAML is not a list of entries.
pub fn parse_catalog(contents: &str) -> Result<Vec<CatalogEntry>, SeedError> {
    Ok(serde_yaml::from_str(contents)?)
}

/// Validate every entry before anything is written.
fn prepare(entries: Vec<CatalogEntry>, seller: &User) -> Result<Vec<NewBook>, SeedError> {
    entries
        .into_iter()
        .enumerate()
        .map(|(index, entry)| {
            entry
                .into_new_book(seller)
                .map_err(|message| SeedError::InvalidEntry { index, message })
        })
        .collect()
}

/// Insert the books listed in `file` for the seller with `seller_email`.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed, the seller does not
/// exist or is not a seller, an entry is invalid, or an insert fails.
pub async fn catalog(file: &Path, seller_email: &str) -> Result<(), Box<dyn std::error::Error>> {
    let contents = std::fs::read_to_string(file).map_err(|source| SeedError::Read {
        path: file.display().to_string(),
        source,
    })?;
    let entries = parse_catalog(&contents)?;
    let email =
        Email::parse(seller_email).map_err(|_| SeedError::InvalidEmail(seller_email.to_owned()))?;

    let pool = super::connect().await?;

    let seller = UserRepository::new(&pool)
        .get_by_email(&email)
        .await?
        .ok_or_else(|| SeedError::SellerNotFound(seller_email.to_owned()))?;
    if seller.role != Role::Seller {
        return Err(SeedError::NotASeller(seller_email.to_owned()).into());
    }

    let books = prepare(entries, &seller)?;
    let repo = BookRepository::new(&pool);
    for book in &books {
        let created = repo.create(book).await?;
        tracing::info!(book_id = %created.id, title = %created.title, "Book inserted");
    }

    tracing::info!("Seeded {} books for {}", books.len(), seller_email);
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use booknest_api::models::UserAddress;
    use booknest_core::UserId;
    use chrono::Utc;

    fn seller() -> User {
        User {
            id: UserId::new(7),
            name: "Paper Trail Books".to_owned(),
            email: Email::parse("shop@example.com").unwrap(),
            role: Role::Seller,
            address: UserAddress::default(),
            phone: None,
            active: true,
            password_changed_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_parse_catalog() {
        let yaml = r"
- title: The Hobbit
  author: J. R. R. Tolkien
  genre: Fantasy
  description: There and back again.
  price: 12.99
  stock: 40
  item_image: /uploads/hobbit.jpg
- title: Dune
  author: Frank Herbert
  genre: Science Fiction
  description: Spice.
  price: 9.5
";
        let entries = parse_catalog(yaml).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].price, Decimal::new(1299, 2));
        assert_eq!(entries[1].stock, 0);
        assert!(entries[1].item_image.is_none());
    }

    #[test]
    fn test_prepare_sets_seller() {
        let entries = parse_catalog(
            "- {title: Emma, author: Jane Austen, genre: Classic, description: Matchmaking., price: 4}",
        )
        .unwrap();
        let books = prepare(entries, &seller()).unwrap();
        assert_eq!(books[0].seller_id, UserId::new(7));
        assert_eq!(books[0].seller_name, "Paper Trail Books");
        assert_eq!(books[0].price.amount(), Decimal::new(4, 0));
    }

    #[test]
    fn test_prepare_rejects_invalid_entries() {
        let entries = parse_catalog(
            "- {title: Emma, author: '', genre: Classic, description: x, price: 4}",
        )
        .unwrap();
        let err = prepare(entries, &seller()).unwrap_err();
        assert_eq!(err.to_string(), "Entry 0: Please provide author");

        let entries = parse_catalog(
            "- {title: Emma, author: Austen, genre: Classic, description: x, price: 4, stock: -1}",
        )
        .unwrap();
        let err = prepare(entries, &seller()).unwrap_err();
        assert_eq!(err.to_string(), "Entry 0: Stock cannot be negative");

        let entries = parse_catalog(
            "- {title: Emma, author: Austen, genre: Classic, description: x, price: -4}",
        )
        .unwrap();
        assert!(prepare(entries, &seller()).is_err());
    }

    #[test]
    fn test_parse_rejects_non_list() {
        assert!(matches!(
            parse_catalog("title: Emma"),
            Err(SeedError::Parse(_))
        ));
    }
}

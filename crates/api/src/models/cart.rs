//! Server-side shopping cart.

use rust_decimal::Decimal;
use serde::Serialize;

use booknest_core::{BookId, CartItemId};

/// One cart line joined with the current book data.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
    pub id: CartItemId,
    pub book_id: BookId,
    pub title: String,
    pub author: String,
    pub price: Decimal,
    pub item_image: Option<String>,
    pub stock: i32,
    pub quantity: i32,
    pub line_total: Decimal,
}

/// The caller's cart with totals.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Cart {
    pub items: Vec<CartLine>,
    pub item_count: i64,
    pub subtotal: Decimal,
}

impl From<Vec<CartLine>> for Cart {
    fn from(items: Vec<CartLine>) -> Self {
        let item_count = items.iter().map(|l| i64::from(l.quantity)).sum();
        let subtotal = items.iter().map(|l| l.line_total).sum();
        Self {
            items,
            item_count,
            subtotal,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn line(id: i32, price: Decimal, quantity: i32) -> CartLine {
        CartLine {
            id: CartItemId::new(id),
            book_id: BookId::new(id),
            title: format!("Book {id}"),
            author: "Anon".to_owned(),
            price,
            item_image: None,
            stock: 10,
            quantity,
            line_total: price * Decimal::from(quantity),
        }
    }

    #[test]
    fn test_cart_totals() {
        let cart = Cart::from(vec![
            line(1, Decimal::new(1000, 2), 2),
            line(2, Decimal::new(550, 2), 1),
        ]);
        assert_eq!(cart.item_count, 3);
        assert_eq!(cart.subtotal, Decimal::new(2550, 2));
    }

    #[test]
    fn test_empty_cart() {
        let cart = Cart::from(Vec::new());
        assert_eq!(cart.item_count, 0);
        assert_eq!(cart.subtotal, Decimal::ZERO);
    }
}

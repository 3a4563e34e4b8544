//! Order placement, lifecycle and cart checkout against a real database.
//!
//! Skipped unless `BOOKNEST_DATABASE_URL` is set.

#![allow(clippy::unwrap_used)]

use booknest_api::db::RepositoryError;
use booknest_api::db::carts::CartRepository;
use booknest_api::db::orders::{OrderRepository, StockError};
use booknest_api::db::users::UserRepository;
use booknest_api::models::OrderLine;
use booknest_api::services::notifications::NotificationHub;
use booknest_api::services::orders::{OrderError, OrderService, ShippingAddressInput};
use booknest_core::{OrderStatus, PaymentMethod, PaymentStatus, Role};
use booknest_integration_tests::{database, list_book, signup, stock_of};
use rust_decimal::Decimal;

fn address() -> ShippingAddressInput {
    ShippingAddressInput {
        street: "12 Park Lane".to_owned(),
        city: "Pune".to_owned(),
        state: "Maharashtra".to_owned(),
        pincode: "411001".to_owned(),
    }
}

#[tokio::test]
async fn test_order_decrements_stock() {
    let Some(pool) = database().await else {
        return;
    };
    let hub = NotificationHub::new();
    let seller = signup(&pool, Role::Seller).await;
    let buyer = signup(&pool, Role::User).await;
    let book = list_book(&pool, &seller, "12.50", 5).await;

    let order = OrderService::new(&pool, &hub)
        .place(
            &buyer,
            &[OrderLine { book_id: book.id, quantity: 2 }],
            Some(&address()),
            None,
        )
        .await
        .unwrap();

    assert_eq!(order.status, OrderStatus::Pending);
    assert_eq!(order.payment_method, PaymentMethod::Cod);
    assert_eq!(order.total_amount, Decimal::new(2500, 2));
    assert_eq!(order.items.len(), 1);
    assert_eq!(order.items[0].seller_id, seller.id);
    assert_eq!(order.status_history.len(), 1);
    assert_eq!(stock_of(&pool, &book).await, 3);
}

#[tokio::test]
async fn test_short_stock_rolls_back_whole_order() {
    let Some(pool) = database().await else {
        return;
    };
    let hub = NotificationHub::new();
    let seller = signup(&pool, Role::Seller).await;
    let buyer = signup(&pool, Role::User).await;
    let plenty = list_book(&pool, &seller, "9.99", 5).await;
    let scarce = list_book(&pool, &seller, "19.99", 1).await;

    let err = OrderService::new(&pool, &hub)
        .place(
            &buyer,
            &[
                OrderLine { book_id: plenty.id, quantity: 2 },
                OrderLine { book_id: scarce.id, quantity: 3 },
            ],
            Some(&address()),
            None,
        )
        .await
        .unwrap_err();

    let OrderError::Stock(StockError::InsufficientStock(title)) = &err else {
        panic!("expected insufficient stock, got {err:?}");
    };
    assert_eq!(title, &scarce.title);
    assert_eq!(stock_of(&pool, &plenty).await, 5);
    assert_eq!(stock_of(&pool, &scarce).await, 1);
    assert!(
        OrderRepository::new(&pool)
            .list_for_user(buyer.id)
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn test_cancel_restores_stock_and_refunds() {
    let Some(pool) = database().await else {
        return;
    };
    let hub = NotificationHub::new();
    let service = OrderService::new(&pool, &hub);
    let seller = signup(&pool, Role::Seller).await;
    let buyer = signup(&pool, Role::User).await;
    let book = list_book(&pool, &seller, "15.00", 4).await;

    let order = service
        .place(
            &buyer,
            &[OrderLine { book_id: book.id, quantity: 3 }],
            Some(&address()),
            Some(PaymentMethod::Card),
        )
        .await
        .unwrap();
    assert_eq!(stock_of(&pool, &book).await, 1);

    // card payment captured by the gateway
    sqlx::query("UPDATE orders SET payment_status = 'completed' WHERE id = $1")
        .bind(order.id)
        .execute(&pool)
        .await
        .unwrap();

    let other = signup(&pool, Role::User).await;
    assert!(matches!(
        service.cancel(&other, order.id).await,
        Err(OrderError::CancelForbidden)
    ));

    let cancelled = service.cancel(&buyer, order.id).await.unwrap();
    assert_eq!(cancelled.status, OrderStatus::Cancelled);
    assert_eq!(cancelled.payment_status, PaymentStatus::Refunded);
    assert_eq!(cancelled.status_history.len(), 2);
    assert_eq!(stock_of(&pool, &book).await, 4);

    assert!(matches!(
        service.cancel(&buyer, order.id).await,
        Err(OrderError::NotCancellable)
    ));
    assert_eq!(stock_of(&pool, &book).await, 4);
}

#[tokio::test]
async fn test_delivery_settles_cash_on_delivery() {
    let Some(pool) = database().await else {
        return;
    };
    let hub = NotificationHub::new();
    let service = OrderService::new(&pool, &hub);
    let seller = signup(&pool, Role::Seller).await;
    let buyer = signup(&pool, Role::User).await;
    let book = list_book(&pool, &seller, "7.25", 10).await;

    let order = service
        .place(
            &buyer,
            &[OrderLine { book_id: book.id, quantity: 1 }],
            Some(&address()),
            Some(PaymentMethod::Cod),
        )
        .await
        .unwrap();

    assert!(matches!(
        service
            .update_status(&seller, order.id, OrderStatus::Delivered, None)
            .await,
        Err(OrderError::InvalidTransition { .. })
    ));

    let mut current = order;
    for next in [
        OrderStatus::Confirmed,
        OrderStatus::Processing,
        OrderStatus::Shipped,
    ] {
        current = service
            .update_status(&seller, current.id, next, None)
            .await
            .unwrap();
        assert_eq!(current.payment_status, PaymentStatus::Pending);
        assert!(current.delivered_at.is_none());
    }

    let delivered = service
        .update_status(&seller, current.id, OrderStatus::Delivered, Some("Left at door"))
        .await
        .unwrap();
    assert_eq!(delivered.status, OrderStatus::Delivered);
    assert_eq!(delivered.payment_status, PaymentStatus::Completed);
    assert!(delivered.delivered_at.is_some());
    assert_eq!(delivered.status_history.len(), 5);
    assert!(matches!(
        service.cancel(&buyer, delivered.id).await,
        Err(OrderError::NotCancellable)
    ));
}

#[tokio::test]
async fn test_checkout_empties_cart() {
    let Some(pool) = database().await else {
        return;
    };
    let hub = NotificationHub::new();
    let service = OrderService::new(&pool, &hub);
    let carts = CartRepository::new(&pool);
    let seller = signup(&pool, Role::Seller).await;
    let buyer = signup(&pool, Role::User).await;
    let first = list_book(&pool, &seller, "10.00", 6).await;
    let second = list_book(&pool, &seller, "4.50", 6).await;

    carts.add(buyer.id, first.id, 1).await.unwrap();
    carts.add(buyer.id, first.id, 1).await.unwrap();
    carts.add(buyer.id, second.id, 3).await.unwrap();

    let order = service
        .checkout(&buyer, Some(&address()), None)
        .await
        .unwrap();

    assert_eq!(order.items.len(), 2);
    assert_eq!(order.total_amount, Decimal::new(3350, 2));
    assert!(carts.lines(buyer.id).await.unwrap().is_empty());
    assert_eq!(stock_of(&pool, &first).await, 4);
    assert_eq!(stock_of(&pool, &second).await, 3);

    assert!(matches!(
        service.checkout(&buyer, Some(&address()), None).await,
        Err(OrderError::EmptyCart)
    ));
}

#[tokio::test]
async fn test_failed_checkout_keeps_cart() {
    let Some(pool) = database().await else {
        return;
    };
    let hub = NotificationHub::new();
    let carts = CartRepository::new(&pool);
    let seller = signup(&pool, Role::Seller).await;
    let buyer = signup(&pool, Role::User).await;
    let book = list_book(&pool, &seller, "10.00", 2).await;

    carts.add(buyer.id, book.id, 2).await.unwrap();
    sqlx::query("UPDATE books SET stock = 1 WHERE id = $1")
        .bind(book.id)
        .execute(&pool)
        .await
        .unwrap();

    let result = OrderService::new(&pool, &hub)
        .checkout(&buyer, Some(&address()), None)
        .await;
    assert!(matches!(
        result,
        Err(OrderError::Stock(StockError::InsufficientStock(_)))
    ));
    assert_eq!(carts.lines(buyer.id).await.unwrap().len(), 1);
    assert_eq!(stock_of(&pool, &book).await, 1);
}

#[tokio::test]
async fn test_concurrent_cart_adds_are_summed() {
    let Some(pool) = database().await else {
        return;
    };
    let seller = signup(&pool, Role::Seller).await;
    let buyer = signup(&pool, Role::User).await;
    let book = list_book(&pool, &seller, "3.00", 20).await;

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let pool = pool.clone();
        let (user_id, book_id) = (buyer.id, book.id);
        tasks.push(tokio::spawn(async move {
            CartRepository::new(&pool).add(user_id, book_id, 2).await
        }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let carts = CartRepository::new(&pool);
    let lines = carts.lines(buyer.id).await.unwrap();
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0].quantity, 16);

    // 16 + 5 > 20, and the rejected add leaves the line untouched
    assert!(matches!(
        carts.add(buyer.id, book.id, 5).await,
        Err(StockError::InsufficientStock(_))
    ));
    assert_eq!(carts.lines(buyer.id).await.unwrap()[0].quantity, 16);
}

#[tokio::test]
async fn test_seller_with_sales_cannot_be_deleted() {
    let Some(pool) = database().await else {
        return;
    };
    let hub = NotificationHub::new();
    let users = UserRepository::new(&pool);
    let seller = signup(&pool, Role::Seller).await;
    let buyer = signup(&pool, Role::User).await;
    let book = list_book(&pool, &seller, "11.00", 3).await;

    let order = OrderService::new(&pool, &hub)
        .place(
            &buyer,
            &[OrderLine { book_id: book.id, quantity: 1 }],
            Some(&address()),
            None,
        )
        .await
        .unwrap();

    let err = users.delete(seller.id).await.unwrap_err();
    assert!(matches!(err, RepositoryError::Conflict(_)), "{err:?}");
    assert!(users.get_by_id(seller.id).await.unwrap().is_some());

    // the buyer's record of the sale is intact
    let kept = OrderRepository::new(&pool).get(order.id).await.unwrap().unwrap();
    assert_eq!(kept.items.len(), 1);
    assert_eq!(kept.items[0].seller_id, seller.id);

    // a seller with nothing sold can still be removed
    let idle = signup(&pool, Role::Seller).await;
    list_book(&pool, &idle, "5.00", 1).await;
    users.delete(idle.id).await.unwrap();
    assert!(users.get_by_id(idle.id).await.unwrap().is_none());
}

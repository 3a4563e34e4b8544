//! Notification fan-out and tokens, driven through the shared app state.

#![allow(clippy::unwrap_used)]

use booknest_api::services::notifications::Notification;
use booknest_core::{BookId, OrderId, OrderStatus, Role, UserId};
use booknest_integration_tests::TestApp;

#[tokio::test]
async fn test_role_and_user_fan_out() {
    let app = TestApp::new();
    let hub = app.state.hub();

    let mut admin = hub.register(UserId::new(1), Role::Admin).await.unwrap();
    let mut seller = hub.register(UserId::new(2), Role::Seller).await.unwrap();
    let mut reader = hub.register(UserId::new(3), Role::User).await.unwrap();
    assert_eq!(hub.connection_count().await, 3);

    let sent = hub
        .send_to_role(Role::Admin, Notification::new_user(UserId::new(9), "Ann"))
        .await;
    assert_eq!(sent, 1);
    assert!(matches!(
        admin.receiver.recv().await.unwrap(),
        Notification::NewUser { .. }
    ));

    assert!(
        hub.send_to_user(
            UserId::new(2),
            Notification::low_stock(BookId::new(5), "Dune", 3)
        )
        .await
    );
    assert!(matches!(
        seller.receiver.recv().await.unwrap(),
        Notification::LowStock { quantity: 3, .. }
    ));

    let everyone = hub
        .broadcast(Notification::order_status(
            OrderId::new(4),
            OrderStatus::Shipped,
        ))
        .await;
    assert_eq!(everyone, 3);
    assert!(reader.receiver.try_recv().is_ok());
    assert!(reader.receiver.try_recv().is_err());
}

#[tokio::test]
async fn test_reconnect_replaces_previous_connection() {
    let app = TestApp::new();
    let hub = app.state.hub();

    let mut first = hub.register(UserId::new(7), Role::User).await.unwrap();
    let second = hub.register(UserId::new(7), Role::User).await.unwrap();
    assert_eq!(hub.connection_count().await, 1);

    // The old sender was dropped, so its task sees the channel close
    assert!(first.receiver.recv().await.is_none());

    // A late unregister from the replaced socket leaves the new one in place
    hub.unregister(UserId::new(7), first.id).await;
    assert!(hub.is_connected(UserId::new(7)).await);

    hub.unregister(UserId::new(7), second.id).await;
    assert!(!hub.is_connected(UserId::new(7)).await);
}

#[tokio::test]
async fn test_issued_token_verifies() {
    let app = TestApp::new();
    let tokens = app.state.tokens();

    let token = tokens
        .issue(UserId::new(12), "seller@example.com", Role::Seller)
        .unwrap();
    let claims = tokens.verify(&token).unwrap();

    assert_eq!(claims.sub, UserId::new(12));
    assert_eq!(claims.email, "seller@example.com");
    assert_eq!(claims.role, Role::Seller);
    assert_eq!(claims.exp - claims.iat, 24 * 3600);
}

//! Real-time notification hub for WebSocket clients.
//!
//! Each user holds at most one live connection. A connection is a bounded
//! channel drained by the socket task in `routes::ws`; dropping the sender
//! ends that task, so replacing or removing an entry closes the socket. A
//! client that lets its buffer fill up is disconnected.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{RwLock, mpsc};
use uuid::Uuid;

use booknest_core::{BookId, OrderId, OrderStatus, Role, UserId};

/// Upper bound on concurrent connections.
pub const MAX_CONNECTIONS: usize = 1000;

/// Notifications queued per connection before it is dropped as stalled.
pub const CONNECTION_BUFFER: usize = 64;

/// Returned when the hub is full.
#[derive(Debug, Error)]
#[error("too many open notification connections")]
pub struct HubFull;

/// A message pushed to a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum Notification {
    Connection {
        message: String,
    },
    Pong {
        /// Milliseconds since the epoch.
        timestamp: i64,
    },
    OrderStatus {
        order_id: OrderId,
        status: OrderStatus,
        message: String,
        timestamp: DateTime<Utc>,
    },
    LowStock {
        book_id: BookId,
        title: String,
        quantity: i32,
        message: String,
        timestamp: DateTime<Utc>,
    },
    NewReview {
        book_id: BookId,
        title: String,
        rating: i32,
        message: String,
        timestamp: DateTime<Utc>,
    },
    PriceChange {
        book_id: BookId,
        title: String,
        old_price: Decimal,
        new_price: Decimal,
        message: String,
        timestamp: DateTime<Utc>,
    },
    NewUser {
        user_id: UserId,
        message: String,
        timestamp: DateTime<Utc>,
    },
}

impl Notification {
    #[must_use]
    pub fn connected() -> Self {
        Self::Connection {
            message: "Connected to BookNest notifications".to_owned(),
        }
    }

    #[must_use]
    pub fn pong(now: DateTime<Utc>) -> Self {
        Self::Pong {
            timestamp: now.timestamp_millis(),
        }
    }

    #[must_use]
    pub fn order_status(order_id: OrderId, status: OrderStatus) -> Self {
        Self::OrderStatus {
            order_id,
            status,
            message: format!("Your order #{order_id} is {status}"),
            timestamp: Utc::now(),
        }
    }

    #[must_use]
    pub fn low_stock(book_id: BookId, title: &str, quantity: i32) -> Self {
        Self::LowStock {
            book_id,
            title: title.to_owned(),
            quantity,
            message: format!("Low stock alert: \"{title}\" has only {quantity} units left"),
            timestamp: Utc::now(),
        }
    }

    #[must_use]
    pub fn new_review(book_id: BookId, title: &str, rating: i32) -> Self {
        Self::NewReview {
            book_id,
            title: title.to_owned(),
            rating,
            message: format!("New {rating}-star review for \"{title}\""),
            timestamp: Utc::now(),
        }
    }

    #[must_use]
    pub fn price_change(book_id: BookId, title: &str, old_price: Decimal, new_price: Decimal) -> Self {
        Self::PriceChange {
            book_id,
            title: title.to_owned(),
            old_price,
            new_price,
            message: format!(
                "Price updated for \"{title}\" from ${old_price:.2} to ${new_price:.2}"
            ),
            timestamp: Utc::now(),
        }
    }

    #[must_use]
    pub fn new_user(user_id: UserId, name: &str) -> Self {
        Self::NewUser {
            user_id,
            message: format!("New user registered: {name}"),
            timestamp: Utc::now(),
        }
    }
}

struct Connection {
    id: Uuid,
    role: Role,
    sender: mpsc::Sender<Notification>,
}

/// The receiving half handed to a socket task.
pub struct Subscription {
    /// Identifies this connection when unregistering.
    pub id: Uuid,
    pub receiver: mpsc::Receiver<Notification>,
}

/// Registry of live connections keyed by user.
#[derive(Clone, Default)]
pub struct NotificationHub {
    connections: Arc<RwLock<HashMap<UserId, Connection>>>,
}

impl NotificationHub {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection for `user_id`, replacing any existing one.
    ///
    /// # Errors
    ///
    /// Returns `HubFull` when `MAX_CONNECTIONS` other users are connected.
    pub async fn register(&self, user_id: UserId, role: Role) -> Result<Subscription, HubFull> {
        let mut connections = self.connections.write().await;
        if !connections.contains_key(&user_id) && connections.len() >= MAX_CONNECTIONS {
            tracing::warn!(user_id = %user_id, "Notification hub full");
            return Err(HubFull);
        }

        let (sender, receiver) = mpsc::channel(CONNECTION_BUFFER);
        let id = Uuid::new_v4();
        if connections
            .insert(user_id, Connection { id, role, sender })
            .is_some()
        {
            tracing::debug!(user_id = %user_id, "Replaced existing notification connection");
        }

        tracing::info!(user_id = %user_id, role = %role, total = connections.len(), "Notification client connected");
        Ok(Subscription { id, receiver })
    }

    /// Remove the entry for `user_id` if it is still connection `id`.
    pub async fn unregister(&self, user_id: UserId, id: Uuid) {
        let mut connections = self.connections.write().await;
        if connections.get(&user_id).is_some_and(|c| c.id == id) {
            connections.remove(&user_id);
            tracing::info!(user_id = %user_id, total = connections.len(), "Notification client disconnected");
        }
    }

    /// Number of live connections.
    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Whether `user_id` has a live connection.
    pub async fn is_connected(&self, user_id: UserId) -> bool {
        self.connections.read().await.contains_key(&user_id)
    }

    /// Send to one user. Returns whether it was delivered to a live channel.
    pub async fn send_to_user(&self, user_id: UserId, notification: Notification) -> bool {
        self.fan_out(notification, |uid, _| uid == user_id).await > 0
    }

    /// Send to every connection whose role matched `role` at connect time.
    pub async fn send_to_role(&self, role: Role, notification: Notification) -> usize {
        self.fan_out(notification, |_, r| r == role).await
    }

    /// Send to everyone.
    pub async fn broadcast(&self, notification: Notification) -> usize {
        self.fan_out(notification, |_, _| true).await
    }

    async fn fan_out<F>(&self, notification: Notification, matches: F) -> usize
    where
        F: Fn(UserId, Role) -> bool,
    {
        let mut delivered = 0;
        let mut dead = Vec::new();
        {
            let connections = self.connections.read().await;
            for (user_id, conn) in connections.iter() {
                if !matches(*user_id, conn.role) {
                    continue;
                }
                match conn.sender.try_send(notification.clone()) {
                    Ok(()) => delivered += 1,
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        tracing::warn!(user_id = %user_id, "Notification buffer full, dropping connection");
                        dead.push((*user_id, conn.id));
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => dead.push((*user_id, conn.id)),
                }
            }
        }

        for (user_id, id) in dead {
            self.unregister(user_id, id).await;
        }
        delivered
    }
}

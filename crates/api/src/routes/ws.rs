//! WebSocket notification channel.
//!
//! The client connects with `GET /api/ws?token=<jwt>`. The connection is
//! registered in the hub before the upgrade, so a full hub or a bad token is
//! reported as a normal JSON error response.

use std::time::Duration;

use axum::{
    body::Bytes,
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use chrono::Utc;
use futures::{Sink, SinkExt, StreamExt};
use serde::Deserialize;
use tracing::{debug, instrument, warn};

use booknest_core::UserId;

use crate::error::{AppError, Result};
use crate::extract::ApiQuery;
use crate::middleware::authenticate;
use crate::services::notifications::{Notification, NotificationHub, Subscription};
use crate::state::AppState;

/// Largest frame accepted from a client.
pub const MAX_MESSAGE_BYTES: usize = 512 * 1024;

/// A ping goes out this often; a socket that missed the last one is dropped.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(45);

#[derive(Debug, Default, Deserialize)]
pub struct ConnectQuery {
    pub token: Option<String>,
}

/// Messages a client may send. Anything else is ignored.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClientMessage {
    Ping,
}

/// The reply to a text frame, if any.
fn reply_to(text: &str) -> Option<Notification> {
    match serde_json::from_str::<ClientMessage>(text).ok()? {
        ClientMessage::Ping => Some(Notification::pong(Utc::now())),
    }
}

/// Authenticate, register with the hub and upgrade.
#[instrument(skip_all)]
pub async fn connect(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<ConnectQuery>,
    ws: WebSocketUpgrade,
) -> Result<Response> {
    let token = query
        .token
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AppError::Unauthorized("Authentication token required".to_owned()))?;
    let user = authenticate(&state, token).await?;

    let subscription = state
        .hub()
        .register(user.id, user.role)
        .await
        .map_err(|_| {
            AppError::ServiceUnavailable("Too many connections, please try again later".to_owned())
        })?;

    let user_id = user.id;
    let connection_id = subscription.id;
    let hub = state.hub().clone();
    let cleanup = hub.clone();

    Ok(ws
        .max_message_size(MAX_MESSAGE_BYTES)
        .on_failed_upgrade(move |err| {
            warn!(user_id = %user_id, error = %err, "WebSocket upgrade failed");
            tokio::spawn(async move { cleanup.unregister(user_id, connection_id).await });
        })
        .on_upgrade(move |socket| serve(socket, hub, user_id, subscription)))
}

async fn send_json<S>(sink: &mut S, notification: &Notification) -> std::result::Result<(), axum::Error>
where
    S: Sink<Message, Error = axum::Error> + Unpin,
{
    let text = serde_json::to_string(notification).map_err(axum::Error::new)?;
    sink.send(Message::Text(text.into())).await
}

/// Pump hub notifications out and client frames in until either side ends.
async fn serve(
    socket: WebSocket,
    hub: NotificationHub,
    user_id: UserId,
    subscription: Subscription,
) {
    let Subscription {
        id: connection_id,
        mut receiver,
    } = subscription;
    let (mut sink, mut stream) = socket.split();

    if send_json(&mut sink, &Notification::connected()).await.is_ok() {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        // The first tick completes immediately
        heartbeat.tick().await;
        let mut alive = true;

        loop {
            tokio::select! {
                _ = heartbeat.tick() => {
                    if !alive {
                        debug!(user_id = %user_id, "No pong since last heartbeat, terminating");
                        break;
                    }
                    alive = false;
                    if sink.send(Message::Ping(Bytes::new())).await.is_err() {
                        break;
                    }
                }
                notification = receiver.recv() => {
                    let Some(notification) = notification else {
                        // Replaced by a newer connection
                        let _ = sink.send(Message::Close(None)).await;
                        break;
                    };
                    if send_json(&mut sink, &notification).await.is_err() {
                        break;
                    }
                }
                frame = stream.next() => match frame {
                    Some(Ok(Message::Text(text))) => {
                        if let Some(reply) = reply_to(text.as_str())
                            && send_json(&mut sink, &reply).await.is_err()
                        {
                            break;
                        }
                    }
                    Some(Ok(Message::Pong(_))) => alive = true,
                    Some(Ok(Message::Close(_)) | Err(_)) | None => break,
                    Some(Ok(_)) => {}
                },
            }
        }
    }

    hub.unregister(user_id, connection_id).await;
}

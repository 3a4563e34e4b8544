//! Business logic services.
//!
//! - `auth` - Signup, login with lockout, password change and reset
//! - `tokens` - JWT issuing and verification
//! - `orders` - Order placement, cancellation and status changes
//! - `notifications` - In-memory hub behind the WebSocket channel
//! - `analytics` - Cached dashboard aggregates
//! - `uploads` - Book cover storage
//! - `email` - Password reset mail

pub mod analytics;
pub mod auth;
pub mod email;
pub mod notifications;
pub mod orders;
pub mod tokens;
pub mod uploads;

//! HTTP middleware stack for the API.
//!
//! # Middleware Order (outermost first)
//!
//! 1. Sentry layers (capture errors, transactions)
//! 2. `TraceLayer` (request tracing)
//! 3. Request ID (add unique ID to each request)
//! 4. Security headers
//! 5. CORS
//! 6. Rate limiting (governor), per route group
//!
//! Authentication is not a layer: handlers take `AuthUser` or a
//! `RequireRole` guard as an extractor.

pub mod auth;
pub mod rate_limit;
pub mod request_id;
pub mod security_headers;

pub use auth::{AuthUser, RequireAdmin, RequireRole, RequireStaff, authenticate};
pub use rate_limit::{api_rate_limiter, auth_rate_limiter, rate_limit_errors};
pub use request_id::request_id_middleware;
pub use security_headers::security_headers_middleware;

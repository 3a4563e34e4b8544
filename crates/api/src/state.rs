//! Application state shared across handlers.

use std::sync::Arc;

use sqlx::PgPool;

use crate::config::ApiConfig;
use crate::services::analytics::AnalyticsCache;
use crate::services::email::EmailService;
use crate::services::notifications::NotificationHub;
use crate::services::tokens::TokenService;

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to
/// shared resources like database connections and configuration.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: ApiConfig,
    pool: PgPool,
    tokens: TokenService,
    hub: NotificationHub,
    analytics: AnalyticsCache,
    email: Option<EmailService>,
}

impl AppState {
    /// Create a new application state.
    ///
    /// Password reset mail is disabled when SMTP is not configured or the
    /// relay settings are rejected.
    #[must_use]
    pub fn new(config: ApiConfig, pool: PgPool) -> Self {
        let tokens = TokenService::new(&config.jwt);
        let email = config
            .email
            .as_ref()
            .and_then(|email_config| match EmailService::new(email_config) {
                Ok(service) => Some(service),
                Err(e) => {
                    tracing::warn!(error = %e, "SMTP relay misconfigured, email disabled");
                    None
                }
            });

        Self {
            inner: Arc::new(AppStateInner {
                config,
                pool,
                tokens,
                hub: NotificationHub::new(),
                analytics: AnalyticsCache::default(),
                email,
            }),
        }
    }

    #[must_use]
    pub fn config(&self) -> &ApiConfig {
        &self.inner.config
    }

    /// Get a reference to the database connection pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.inner.pool
    }

    #[must_use]
    pub fn tokens(&self) -> &TokenService {
        &self.inner.tokens
    }

    /// The WebSocket notification hub.
    #[must_use]
    pub fn hub(&self) -> &NotificationHub {
        &self.inner.hub
    }

    #[must_use]
    pub fn analytics(&self) -> &AnalyticsCache {
        &self.inner.analytics
    }

    /// The mailer, when SMTP is configured.
    #[must_use]
    pub fn email(&self) -> Option<&EmailService> {
        self.inner.email.as_ref()
    }
}

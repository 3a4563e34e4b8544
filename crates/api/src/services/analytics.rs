//! Short-lived cache in front of the expensive dashboard queries.

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use sqlx::PgPool;
use tracing::debug;

use crate::db::RepositoryError;
use crate::db::analytics::{AdminAnalytics, AnalyticsRepository};
use crate::db::books::BookRepository;
use crate::models::GenreStats;

/// How long cached aggregates are served.
pub const CACHE_TTL: Duration = Duration::from_secs(60);

/// Cache key for dashboard aggregates.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub enum CacheKey {
    AdminDashboard,
    GenreStats,
}

/// Cached value types.
#[derive(Debug, Clone)]
pub enum CacheValue {
    AdminDashboard(Arc<AdminAnalytics>),
    GenreStats(Arc<Vec<GenreStats>>),
}

/// Caches the admin dashboard and the public genre stats.
#[derive(Clone)]
pub struct AnalyticsCache {
    cache: Cache<CacheKey, CacheValue>,
}

impl Default for AnalyticsCache {
    fn default() -> Self {
        Self::new(CACHE_TTL)
    }
}

impl AnalyticsCache {
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        let cache = Cache::builder().max_capacity(16).time_to_live(ttl).build();
        Self { cache }
    }

    /// Site-wide dashboard, from cache when fresh.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if the dashboard has to be rebuilt and a
    /// query fails.
    pub async fn admin_dashboard(
        &self,
        pool: &PgPool,
    ) -> Result<Arc<AdminAnalytics>, RepositoryError> {
        if let Some(CacheValue::AdminDashboard(dashboard)) =
            self.cache.get(&CacheKey::AdminDashboard).await
        {
            debug!("Cache hit for admin dashboard");
            return Ok(dashboard);
        }

        let dashboard = Arc::new(AnalyticsRepository::new(pool).admin().await?);
        self.cache
            .insert(
                CacheKey::AdminDashboard,
                CacheValue::AdminDashboard(Arc::clone(&dashboard)),
            )
            .await;
        Ok(dashboard)
    }

    /// Per-genre catalog stats, from cache when fresh.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if the stats have to be recomputed and the
    /// query fails.
    pub async fn genre_stats(&self, pool: &PgPool) -> Result<Arc<Vec<GenreStats>>, RepositoryError> {
        if let Some(stats) = self.cached_genre_stats().await {
            debug!("Cache hit for genre stats");
            return Ok(stats);
        }

        let stats = Arc::new(BookRepository::new(pool).genre_stats().await?);
        self.store_genre_stats(Arc::clone(&stats)).await;
        Ok(stats)
    }

    /// Drop the genre stats after the catalog changes.
    pub async fn invalidate_catalog(&self) {
        self.cache.invalidate(&CacheKey::GenreStats).await;
    }

    async fn cached_genre_stats(&self) -> Option<Arc<Vec<GenreStats>>> {
        match self.cache.get(&CacheKey::GenreStats).await {
            Some(CacheValue::GenreStats(stats)) => Some(stats),
            _ => None,
        }
    }

    async fn store_genre_stats(&self, stats: Arc<Vec<GenreStats>>) {
        self.cache
            .insert(CacheKey::GenreStats, CacheValue::GenreStats(stats))
            .await;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rust_decimal::Decimal;

    use super::*;

    fn fiction() -> GenreStats {
        GenreStats {
            genre: "Fiction".to_owned(),
            num_books: 3,
            avg_price: Decimal::new(1500, 2),
            min_price: Decimal::new(999, 2),
            max_price: Decimal::new(2499, 2),
        }
    }

    #[tokio::test]
    async fn test_genre_stats_round_trip_through_cache() {
        let cache = AnalyticsCache::default();
        assert!(cache.cached_genre_stats().await.is_none());

        cache.store_genre_stats(Arc::new(vec![fiction()])).await;
        let cached = cache.cached_genre_stats().await.unwrap();
        assert_eq!(cached.len(), 1);
        assert_eq!(cached.first().unwrap().genre, "Fiction");
    }

    #[tokio::test]
    async fn test_invalidate_catalog_drops_genre_stats() {
        let cache = AnalyticsCache::default();
        cache.store_genre_stats(Arc::new(vec![fiction()])).await;

        cache.invalidate_catalog().await;
        assert!(cache.cached_genre_stats().await.is_none());
    }

    #[tokio::test]
    async fn test_entries_expire() {
        let cache = AnalyticsCache::new(Duration::from_millis(50));
        cache.store_genre_stats(Arc::new(vec![fiction()])).await;

        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(cache.cached_genre_stats().await.is_none());
    }
}

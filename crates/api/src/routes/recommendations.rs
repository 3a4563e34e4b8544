//! Recommendation route handlers.

use axum::{Json, extract::State};
use serde::Deserialize;
use serde_json::Value;

use crate::db::recommendations::RecommendationRepository;
use crate::error::Result;
use crate::extract::ApiQuery;
use crate::middleware::AuthUser;
use crate::state::AppState;

const DEFAULT_LIMIT: i64 = 10;
const DEFAULT_TRENDING_DAYS: i32 = 30;

#[derive(Debug, Default, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<i64>,
}

impl LimitQuery {
    fn limit(&self) -> i64 {
        self.limit.unwrap_or(DEFAULT_LIMIT)
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct TrendingQuery {
    pub days: Option<i32>,
    pub limit: Option<i64>,
}

pub async fn popular(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<LimitQuery>,
) -> Result<Json<Value>> {
    let books = RecommendationRepository::new(state.pool())
        .popular(query.limit())
        .await?;
    Ok(super::listing("books", &books))
}

pub async fn new_arrivals(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<LimitQuery>,
) -> Result<Json<Value>> {
    let books = RecommendationRepository::new(state.pool())
        .new_arrivals(query.limit())
        .await?;
    Ok(super::listing("books", &books))
}

/// Books ordered or well reviewed in the last `days` days.
pub async fn trending(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<TrendingQuery>,
) -> Result<Json<Value>> {
    let days = query.days.unwrap_or(DEFAULT_TRENDING_DAYS).clamp(1, 365);
    let books = RecommendationRepository::new(state.pool())
        .trending(days, query.limit.unwrap_or(DEFAULT_LIMIT))
        .await?;
    Ok(super::listing("books", &books))
}

/// Based on the caller's purchase history.
pub async fn personalized(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ApiQuery(query): ApiQuery<LimitQuery>,
) -> Result<Json<Value>> {
    let books = RecommendationRepository::new(state.pool())
        .personalized(user.id, query.limit())
        .await?;
    Ok(super::listing("books", &books))
}

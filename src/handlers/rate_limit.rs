//! Rate Limit API Handlers
//! /api/v1/rate-limit エンドポイント（カウンタの参照とリセット）

use axum::{
    extract::State,
    response::Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use crate::auth::AdminKey;
use crate::error::AppResult;
use crate::extract::{AppPath, AppQuery};
use crate::rate_limit::{ApiKeyInfo, ApiKeyStats, RateLimitStats, ResetScope, TopApiKeys};
use crate::AppState;

// ========================================
// Query / Response Types
// ========================================

#[derive(Debug, Deserialize)]
pub struct ResetQuery {
    #[serde(default, rename = "type")]
    pub scope: String,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub pattern: String,
}

#[derive(Debug, Deserialize)]
pub struct TopQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct ResetResponse {
    pub success: bool,
    pub api_key: String,
    #[serde(rename = "type")]
    pub scope: ResetScope,
    pub deleted_keys: u64,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub pattern: String,
    pub api_keys: Vec<String>,
    pub count: usize,
}

// ========================================
// Handlers
// ========================================

/// GET /api/v1/rate-limit/stats
pub async fn stats(
    State(state): State<Arc<AppState>>,
    _admin: AdminKey,
) -> AppResult<Json<RateLimitStats>> {
    Ok(Json(state.limiter.stats().await?))
}

/// GET /api/v1/rate-limit/api-keys/:key
pub async fn key_info(
    State(state): State<Arc<AppState>>,
    _admin: AdminKey,
    AppPath(api_key): AppPath<String>,
) -> AppResult<Json<ApiKeyInfo>> {
    Ok(Json(state.limiter.key_info(&api_key).await?))
}

/// GET /api/v1/rate-limit/api-keys/:key/stats
pub async fn key_stats(
    State(state): State<Arc<AppState>>,
    _admin: AdminKey,
    AppPath(api_key): AppPath<String>,
) -> AppResult<Json<ApiKeyStats>> {
    Ok(Json(state.limiter.key_stats(&api_key).await?))
}

/// POST /api/v1/rate-limit/api-keys/:key/reset?type=all|minute|day
pub async fn reset(
    State(state): State<Arc<AppState>>,
    _admin: AdminKey,
    AppPath(api_key): AppPath<String>,
    AppQuery(query): AppQuery<ResetQuery>,
) -> AppResult<Json<ResetResponse>> {
    let scope: ResetScope = query.scope.parse()?;
    let deleted_keys = state.limiter.reset(&api_key, scope).await?;
    info!(api_key = %api_key, ?scope, deleted_keys, "🔄 Rate limit counters reset");
    Ok(Json(ResetResponse {
        success: true,
        api_key,
        scope,
        deleted_keys,
    }))
}

/// GET /api/v1/rate-limit/search?pattern=
pub async fn search(
    State(state): State<Arc<AppState>>,
    _admin: AdminKey,
    AppQuery(query): AppQuery<SearchQuery>,
) -> AppResult<Json<SearchResponse>> {
    let pattern = if query.pattern.trim().is_empty() {
        "*".to_string()
    } else {
        query.pattern
    };
    let api_keys = state.limiter.search(&pattern).await?;
    Ok(Json(SearchResponse {
        count: api_keys.len(),
        pattern,
        api_keys,
    }))
}

/// GET /api/v1/rate-limit/top?limit=
pub async fn top(
    State(state): State<Arc<AppState>>,
    _admin: AdminKey,
    AppQuery(query): AppQuery<TopQuery>,
) -> AppResult<Json<TopApiKeys>> {
    Ok(Json(state.limiter.top(query.limit).await?))
}

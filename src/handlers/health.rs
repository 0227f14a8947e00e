//! Health Check

use axum::{extract::State, response::Json};
use serde::Serialize;
use std::sync::Arc;

use crate::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
    pub database: String,
    pub counter_store: &'static str,
}

/// GET /api/health
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let database = match sqlx::query("SELECT 1").execute(&state.db).await {
        Ok(_) => "ok".to_string(),
        Err(e) => format!("error: {}", e),
    };
    Json(HealthResponse {
        status: "ok".to_string(),
        service: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        database,
        counter_store: state.limiter.store().backend(),
    })
}

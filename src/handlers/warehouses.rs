//! Warehouses API Handlers
//! /api/v1/warehouses エンドポイント

use axum::{
    extract::State,
    http::StatusCode,
    response::Json,
};
use std::sync::Arc;

use crate::auth::AuthUser;
use crate::error::AppResult;
use crate::extract::{AppJson, AppPath};
use crate::models::{ApiResponse, CreateWarehouseRequest, UpdateWarehouseRequest, Warehouse};
use crate::services::warehouses;
use crate::AppState;

/// POST /api/v1/warehouses
pub async fn create_warehouse(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    AppJson(req): AppJson<CreateWarehouseRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<Warehouse>>)> {
    let warehouse = warehouses::create_warehouse(&state.db, user.user_id, req).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(warehouse))))
}

/// GET /api/v1/warehouses - 自分の倉庫一覧
pub async fn list_warehouses(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> AppResult<Json<ApiResponse<Vec<Warehouse>>>> {
    let list = warehouses::list_warehouses(&state.db, user.user_id).await?;
    Ok(Json(ApiResponse::ok(list)))
}

/// GET /api/v1/warehouses/:id
pub async fn get_warehouse(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    AppPath(id): AppPath<i64>,
) -> AppResult<Json<ApiResponse<Warehouse>>> {
    let warehouse = warehouses::get_warehouse(&state.db, user.user_id, id).await?;
    Ok(Json(ApiResponse::ok(warehouse)))
}

/// PUT /api/v1/warehouses/:id
pub async fn update_warehouse(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    AppPath(id): AppPath<i64>,
    AppJson(req): AppJson<UpdateWarehouseRequest>,
) -> AppResult<Json<ApiResponse<Warehouse>>> {
    let warehouse = warehouses::update_warehouse(&state.db, user.user_id, id, req).await?;
    Ok(Json(ApiResponse::ok(warehouse)))
}

/// DELETE /api/v1/warehouses/:id
pub async fn delete_warehouse(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    AppPath(id): AppPath<i64>,
) -> AppResult<Json<ApiResponse<serde_json::Value>>> {
    warehouses::delete_warehouse(&state.db, user.user_id, id).await?;
    Ok(Json(ApiResponse::ok(serde_json::json!({ "id": id, "deleted": true }))))
}

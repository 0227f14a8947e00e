//! Products API Handlers
//! /api/v1/products エンドポイント

use axum::{
    extract::State,
    http::StatusCode,
    response::Json,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::auth::AuthUser;
use crate::error::AppResult;
use crate::extract::{AppJson, AppPath, AppQuery};
use crate::models::{
    ApiResponse, CreateProductRequest, CreateProductsRequest, Page, Product, ProductScope,
    UpdateProductRequest,
};
use crate::services::products;
use crate::AppState;

// ========================================
// Query Parameters
// ========================================

#[derive(Debug, Deserialize)]
pub struct ListProductsQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    #[serde(default)]
    pub owner: String,
}

// ========================================
// Handlers
// ========================================

/// POST /api/v1/products - 商品作成（分類キューへ投入）
pub async fn create_product(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    AppJson(req): AppJson<CreateProductRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<Product>>)> {
    let product =
        products::create_product(&state.db, state.classifier.as_ref(), user.user_id, req).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(product))))
}

/// POST /api/v1/products/batch - 一括作成
pub async fn create_products(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    AppJson(req): AppJson<CreateProductsRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<Vec<Product>>>)> {
    let created =
        products::create_products(&state.db, state.classifier.as_ref(), user.user_id, req.products)
            .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(created))))
}

/// GET /api/v1/products - 一覧
pub async fn list_products(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    AppQuery(query): AppQuery<ListProductsQuery>,
) -> AppResult<Json<ApiResponse<Page<Product>>>> {
    let scope: ProductScope = query.owner.parse()?;
    let page = products::list_products(&state.db, user.user_id, scope, query.page, query.limit).await?;
    Ok(Json(ApiResponse::ok(page)))
}

/// GET /api/v1/products/:id
pub async fn get_product(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    AppPath(id): AppPath<i64>,
) -> AppResult<Json<ApiResponse<Product>>> {
    let product = products::get_product(&state.db, &state.cache, id).await?;
    Ok(Json(ApiResponse::ok(product)))
}

/// PUT /api/v1/products/:id - 部分更新
pub async fn update_product(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    AppPath(id): AppPath<i64>,
    AppJson(req): AppJson<UpdateProductRequest>,
) -> AppResult<Json<ApiResponse<Product>>> {
    let product = products::update_product(&state.db, &state.cache, user.user_id, id, req).await?;
    Ok(Json(ApiResponse::ok(product)))
}

/// DELETE /api/v1/products/:id
pub async fn delete_product(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    AppPath(id): AppPath<i64>,
) -> AppResult<Json<ApiResponse<serde_json::Value>>> {
    products::delete_product(&state.db, &state.cache, user.user_id, id).await?;
    Ok(Json(ApiResponse::ok(serde_json::json!({ "id": id, "deleted": true }))))
}

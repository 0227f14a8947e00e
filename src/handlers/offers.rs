//! Offers API Handlers
//! /api/v1/offers エンドポイント

use axum::{
    extract::State,
    http::StatusCode,
    response::Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::auth::AuthUser;
use crate::error::AppResult;
use crate::extract::{AppJson, AppPath, AppQuery};
use crate::models::{
    ApiResponse, CreateOfferRequest, CreateOffersRequest, Offer, OfferType, Page, PublicOffer,
    UpdateOfferRequest,
};
use crate::services::offers::{self, OfferScope, PublicOfferFilter};
use crate::AppState;

// ========================================
// Query Parameters
// ========================================

#[derive(Debug, Deserialize)]
pub struct ListOffersQuery {
    #[serde(default)]
    pub owner: String,
    pub offer_type: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct WbStockQuery {
    pub product_id: i64,
    pub warehouse_id: i64,
    pub supplier_id: i64,
}

#[derive(Debug, Serialize)]
pub struct WbStockResponse {
    pub product_id: i64,
    pub warehouse_id: i64,
    pub supplier_id: i64,
    pub quantity: i64,
}

// ========================================
// Handlers
// ========================================

/// POST /api/v1/offers
pub async fn create_offer(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    AppJson(req): AppJson<CreateOfferRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<Offer>>)> {
    let offer = offers::create_offer(&state.db, user.user_id, req).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(offer))))
}

/// POST /api/v1/offers/batch
pub async fn create_offers(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    AppJson(req): AppJson<CreateOffersRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<Vec<Offer>>>)> {
    let created = offers::create_offers(&state.db, user.user_id, req.offers).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(created))))
}

/// GET /api/v1/offers
pub async fn list_offers(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    AppQuery(query): AppQuery<ListOffersQuery>,
) -> AppResult<Json<ApiResponse<Page<Offer>>>> {
    let scope: OfferScope = query.owner.parse()?;
    let offer_type = query
        .offer_type
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .map(str::parse::<OfferType>)
        .transpose()?;
    let page = offers::list_offers(&state.db, user.user_id, scope, offer_type, query.page, query.limit)
        .await?;
    Ok(Json(ApiResponse::ok(page)))
}

/// GET /api/v1/offers/public - 認証不要
pub async fn list_public_offers(
    State(state): State<Arc<AppState>>,
    AppQuery(filter): AppQuery<PublicOfferFilter>,
) -> AppResult<Json<ApiResponse<Page<PublicOffer>>>> {
    let page = offers::list_public_offers(&state.db, filter).await?;
    Ok(Json(ApiResponse::ok(page)))
}

/// GET /api/v1/offers/wb_stock - WB 在庫キャッシュ参照
pub async fn wb_stock(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    AppQuery(query): AppQuery<WbStockQuery>,
) -> AppResult<Json<ApiResponse<WbStockResponse>>> {
    let quantity = state
        .wb_stock
        .quantity(query.product_id, query.warehouse_id, query.supplier_id)
        .await?;
    Ok(Json(ApiResponse::ok(WbStockResponse {
        product_id: query.product_id,
        warehouse_id: query.warehouse_id,
        supplier_id: query.supplier_id,
        quantity,
    })))
}

/// GET /api/v1/offers/:id
pub async fn get_offer(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    AppPath(id): AppPath<i64>,
) -> AppResult<Json<ApiResponse<Offer>>> {
    let offer = offers::get_offer(&state.db, id).await?;
    Ok(Json(ApiResponse::ok(offer)))
}

/// PUT /api/v1/offers/:id
pub async fn update_offer(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    AppPath(id): AppPath<i64>,
    AppJson(req): AppJson<UpdateOfferRequest>,
) -> AppResult<Json<ApiResponse<Offer>>> {
    let offer = offers::update_offer(&state.db, user.user_id, id, req).await?;
    Ok(Json(ApiResponse::ok(offer)))
}

/// DELETE /api/v1/offers/:id
pub async fn delete_offer(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    AppPath(id): AppPath<i64>,
) -> AppResult<Json<ApiResponse<serde_json::Value>>> {
    offers::delete_offer(&state.db, user.user_id, id).await?;
    Ok(Json(ApiResponse::ok(serde_json::json!({ "offer_id": id, "deleted": true }))))
}

//! Orders API Handlers
//! /api/v1/orders エンドポイント

use axum::{
    extract::State,
    http::StatusCode,
    response::Json,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::auth::AuthUser;
use crate::error::{AppError, AppResult};
use crate::extract::{AppJson, AppPath, AppQuery};
use crate::models::{
    ApiResponse, CreateOrderRequest, Order, OrderDetail, OrderStatus, Page,
    UpdateOrderStatusRequest,
};
use crate::services::orders::{self, OrderRole};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ListOrdersQuery {
    pub status: Option<String>,
    #[serde(default)]
    pub role: String,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

/// POST /api/v1/orders
pub async fn create_order(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    AppJson(req): AppJson<CreateOrderRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<Order>>)> {
    let order = orders::create_order(&state.db, user.user_id, req.offer_id, req.quantity).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(order))))
}

/// GET /api/v1/orders
pub async fn list_orders(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    AppQuery(query): AppQuery<ListOrdersQuery>,
) -> AppResult<Json<ApiResponse<Page<Order>>>> {
    let role: OrderRole = query.role.parse()?;
    let status = query
        .status
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .map(|s| {
            s.parse::<OrderStatus>()
                .map_err(|bad| AppError::validation(format!("unknown order status '{}'", bad)))
        })
        .transpose()?;
    let page =
        orders::list_orders(&state.db, user.user_id, role, status, query.page, query.per_page).await?;
    Ok(Json(ApiResponse::ok(page)))
}

/// GET /api/v1/orders/:id - 当事者以外は 404
pub async fn get_order(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    AppPath(id): AppPath<i64>,
) -> AppResult<Json<ApiResponse<OrderDetail>>> {
    let detail = orders::get_order(&state.db, user.user_id, id).await?;
    Ok(Json(ApiResponse::ok(detail)))
}

/// PUT /api/v1/orders/:id/status
pub async fn update_order_status(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    AppPath(id): AppPath<i64>,
    AppJson(req): AppJson<UpdateOrderStatusRequest>,
) -> AppResult<Json<ApiResponse<Order>>> {
    let order =
        orders::update_order_status(&state.db, user.user_id, id, &req.status, req.reason).await?;
    Ok(Json(ApiResponse::ok(order)))
}

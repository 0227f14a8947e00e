//! Portal Trade API
//! 商品カタログ・売買オファー・注文・倉庫を扱う B2B 取引バックエンド

pub mod auth;
pub mod cache;
pub mod category_id;
pub mod classifier;
pub mod config;
pub mod counter;
pub mod db;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod media;
pub mod models;
pub mod rate_limit;
pub mod services;
pub mod wb_stock;

use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::cache::ProductCache;
use crate::classifier::ClassificationQueue;
use crate::db::DbPool;
use crate::rate_limit::RateLimiter;
use crate::wb_stock::WbStockReader;

// ========================================
// 共有状態
// ========================================

pub struct AppState {
    pub db: DbPool,
    pub limiter: Arc<RateLimiter>,
    pub classifier: Arc<dyn ClassificationQueue>,
    pub cache: ProductCache,
    pub wb_stock: WbStockReader,
    pub admin_key: Option<String>,
}

// ========================================
// ルーター構築
// ========================================

pub fn build_router(state: Arc<AppState>) -> Router {
    use handlers::{health, offers, orders, products, rate_limit as limits, warehouses};

    let api = Router::new()
        // Products
        .route(
            "/products",
            get(products::list_products).post(products::create_product),
        )
        .route("/products/batch", post(products::create_products))
        .route(
            "/products/:id",
            get(products::get_product)
                .put(products::update_product)
                .delete(products::delete_product),
        )
        // Offers
        .route("/offers", get(offers::list_offers).post(offers::create_offer))
        .route("/offers/batch", post(offers::create_offers))
        .route("/offers/public", get(offers::list_public_offers))
        .route("/offers/wb_stock", get(offers::wb_stock))
        .route(
            "/offers/:id",
            get(offers::get_offer)
                .put(offers::update_offer)
                .delete(offers::delete_offer),
        )
        // Orders
        .route("/orders", get(orders::list_orders).post(orders::create_order))
        .route("/orders/:id", get(orders::get_order))
        .route("/orders/:id/status", put(orders::update_order_status))
        // Warehouses
        .route(
            "/warehouses",
            get(warehouses::list_warehouses).post(warehouses::create_warehouse),
        )
        .route(
            "/warehouses/:id",
            get(warehouses::get_warehouse)
                .put(warehouses::update_warehouse)
                .delete(warehouses::delete_warehouse),
        )
        // Rate limit introspection
        .route("/rate-limit/stats", get(limits::stats))
        .route("/rate-limit/api-keys/:key", get(limits::key_info))
        .route("/rate-limit/api-keys/:key/stats", get(limits::key_stats))
        .route("/rate-limit/api-keys/:key/reset", post(limits::reset))
        .route("/rate-limit/search", get(limits::search))
        .route("/rate-limit/top", get(limits::top));

    Router::new()
        .route("/api/health", get(health::health_check))
        .nest("/api/v1", api)
        .layer(middleware::from_fn_with_state(
            state.limiter.clone(),
            crate::rate_limit::middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

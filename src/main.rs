use anyhow::Context;
use std::sync::Arc;
use tracing::{info, warn};

use portal_trade::{
    build_router,
    cache::ProductCache,
    classifier::{ClassificationApplier, ClassifierClient},
    config::{load_config, RedisConfig},
    counter::{KeyStore, MemoryStore, RedisStore, SystemClock},
    db::init_db,
    rate_limit::{RateLimiter, SqlTariffSource},
    wb_stock::WbStockReader,
    AppState,
};

/// Redis が使えなければプロセス内カウンタにフォールバック
async fn connect_counter_store(redis: Option<&RedisConfig>) -> Arc<dyn KeyStore> {
    let Some(redis) = redis else {
        warn!("⚠️  REDIS_ADDR not set, using in-memory counter store");
        return MemoryStore::global();
    };

    match RedisStore::connect(&redis.url(), redis.timeout).await {
        Ok(store) => {
            info!(addr = %redis.addr, db = redis.db, "✅ Connected to Redis");
            Arc::new(store)
        }
        Err(e) => {
            warn!(addr = %redis.addr, error = %e, "⚠️  Redis unavailable, using in-memory counter store");
            MemoryStore::global()
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    info!("🛑 Shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ログ初期化
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = load_config().context("invalid configuration")?;

    if let Some(parent) = std::path::Path::new(&config.database.path).parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("create database directory {:?}", parent))?;
        }
    }
    let db = init_db(&config.database.url(), config.database.max_connections).await?;

    let store = connect_counter_store(config.redis.as_ref()).await;
    let cache = ProductCache::new(store.clone(), config.product_cache_ttl);

    let limiter = Arc::new(RateLimiter::new(
        store,
        Arc::new(SqlTariffSource::new(db.clone())),
        config.rate_limits.clone(),
        Arc::new(SystemClock),
    ));

    let applier = Arc::new(ClassificationApplier::new(
        db.clone(),
        Some(cache.clone()),
        config.classifier.min_confidence,
    ));
    let classifier = ClassifierClient::start(config.classifier.clone(), applier)?;

    let state = Arc::new(AppState {
        db,
        limiter,
        classifier: classifier.clone(),
        cache,
        wb_stock: WbStockReader::new(&config.wb_stock_dir),
        admin_key: config.admin_key.clone(),
    });
    if config.admin_key.is_none() {
        warn!("⚠️  ADMIN_API_KEY not set, rate-limit administration endpoints are disabled");
    }
    let app = build_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("bind {}", addr))?;
    info!("🚀 Portal Trade API listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    classifier.shutdown().await;
    info!("👋 Server stopped");
    Ok(())
}

//! Database Module
//! SQLite を使用した products/media/offers/warehouses/orders の管理

use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
    Pool, Sqlite, SqliteConnection,
};
use anyhow::Result;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

/// データベース接続プール
pub type DbPool = Pool<Sqlite>;

/// データベースを初期化
pub async fn init_db(db_url: &str, max_connections: u32) -> Result<DbPool> {
    info!("Initializing database: {}", db_url);

    let options = SqliteConnectOptions::from_str(db_url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .foreign_keys(true)
        .busy_timeout(Duration::from_secs(30));

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await?;

    // スキーマ作成
    create_schema(&pool).await?;

    info!("Database initialized successfully");
    Ok(pool)
}

/// Takes the pessimistic lock on one row for the rest of the transaction.
///
/// SQLite has no `SELECT ... FOR UPDATE`; a write as the first statement of
/// a transaction acquires the database write lock, which every other writer
/// waits on (busy timeout) until this transaction commits or rolls back.
/// Returns `false` when the row does not exist.
pub async fn lock_row(conn: &mut SqliteConnection, table: LockTable, id: i64) -> sqlx::Result<bool> {
    let (name, pk) = table.parts();
    let sql = format!("UPDATE {name} SET {pk} = {pk} WHERE {pk} = ?");
    let result = sqlx::query(&sql).bind(id).execute(conn).await?;
    Ok(result.rows_affected() > 0)
}

/// Tables whose rows are locked by [`lock_row`].
#[derive(Debug, Clone, Copy)]
pub enum LockTable {
    Offers,
    Orders,
    Products,
}

impl LockTable {
    fn parts(self) -> (&'static str, &'static str) {
        match self {
            LockTable::Offers => ("offers", "offer_id"),
            LockTable::Orders => ("orders", "order_id"),
            LockTable::Products => ("products", "id"),
        }
    }
}

/// スキーマ作成
async fn create_schema(pool: &DbPool) -> Result<()> {
    // tariffs テーブル
    sqlx::query(r#"
        CREATE TABLE IF NOT EXISTS tariffs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            minute_limit INTEGER NOT NULL,
            day_limit INTEGER NOT NULL,
            is_active INTEGER NOT NULL DEFAULT 1
        )
    "#)
    .execute(pool)
    .await?;

    // users テーブル（API キー → user_id → tariff）
    sqlx::query(r#"
        CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL DEFAULT '',
            email TEXT,
            api_token TEXT NOT NULL,
            tariff_id INTEGER,
            is_active INTEGER NOT NULL DEFAULT 1,
            created_at TEXT,
            FOREIGN KEY (tariff_id) REFERENCES tariffs(id)
        )
    "#)
    .execute(pool)
    .await?;

    sqlx::query("CREATE UNIQUE INDEX IF NOT EXISTS idx_users_api_token ON users(api_token)")
        .execute(pool).await?;

    // products テーブル（メタ商品）
    sqlx::query(r#"
        CREATE TABLE IF NOT EXISTS products (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            vendor_article TEXT NOT NULL DEFAULT '',
            recommend_price REAL NOT NULL DEFAULT 0,
            brand TEXT NOT NULL DEFAULT '',
            category TEXT NOT NULL DEFAULT '',
            brand_id INTEGER,
            category_id INTEGER,
            description TEXT NOT NULL DEFAULT '',
            barcode TEXT,
            user_id INTEGER NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending',
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
    "#)
    .execute(pool)
    .await?;

    sqlx::query("CREATE UNIQUE INDEX IF NOT EXISTS idx_products_brand_article ON products(brand, vendor_article)")
        .execute(pool).await?;

    // media テーブル（product と 1:1）
    sqlx::query(r#"
        CREATE TABLE IF NOT EXISTS media (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            product_id INTEGER NOT NULL UNIQUE,
            image_urls TEXT NOT NULL DEFAULT '[]',
            video_urls TEXT NOT NULL DEFAULT '[]',
            model_3d_urls TEXT NOT NULL DEFAULT '[]',
            FOREIGN KEY (product_id) REFERENCES products(id) ON DELETE CASCADE
        )
    "#)
    .execute(pool)
    .await?;

    // warehouses テーブル
    sqlx::query(r#"
        CREATE TABLE IF NOT EXISTS warehouses (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL,
            name TEXT NOT NULL,
            address TEXT NOT NULL,
            latitude REAL NOT NULL,
            longitude REAL NOT NULL,
            working_hours TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
    "#)
    .execute(pool)
    .await?;

    // offers テーブル
    sqlx::query(r#"
        CREATE TABLE IF NOT EXISTS offers (
            offer_id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL,
            product_id INTEGER NOT NULL,
            offer_type TEXT NOT NULL,
            price_per_unit REAL NOT NULL,
            units_per_lot INTEGER NOT NULL,
            available_lots INTEGER NOT NULL CHECK (available_lots >= 0),
            tax_nds INTEGER NOT NULL,
            warehouse_id INTEGER NOT NULL,
            is_public INTEGER NOT NULL DEFAULT 1,
            max_shipping_days INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            FOREIGN KEY (product_id) REFERENCES products(id),
            FOREIGN KEY (warehouse_id) REFERENCES warehouses(id)
        )
    "#)
    .execute(pool)
    .await?;

    // orders テーブル
    sqlx::query(r#"
        CREATE TABLE IF NOT EXISTS orders (
            order_id INTEGER PRIMARY KEY AUTOINCREMENT,
            offer_id INTEGER NOT NULL,
            initiator_user_id INTEGER NOT NULL,
            counterparty_user_id INTEGER NOT NULL,
            order_type TEXT NOT NULL,
            price_per_unit REAL NOT NULL,
            units_per_lot INTEGER NOT NULL,
            lot_count INTEGER NOT NULL CHECK (lot_count >= 1),
            total_amount REAL NOT NULL,
            max_shipping_days INTEGER NOT NULL DEFAULT 0,
            order_status TEXT NOT NULL DEFAULT 'pending',
            status_reason TEXT,
            status_changed_at TEXT,
            status_changed_by INTEGER,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            FOREIGN KEY (offer_id) REFERENCES offers(offer_id),
            CHECK (initiator_user_id <> counterparty_user_id)
        )
    "#)
    .execute(pool)
    .await?;

    // order_items テーブル
    sqlx::query(r#"
        CREATE TABLE IF NOT EXISTS order_items (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            order_id INTEGER NOT NULL,
            offer_id INTEGER NOT NULL,
            qty INTEGER NOT NULL,
            price_per_unit REAL NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending',
            created_at TEXT NOT NULL,
            FOREIGN KEY (order_id) REFERENCES orders(order_id) ON DELETE CASCADE
        )
    "#)
    .execute(pool)
    .await?;

    // api_rate_limits テーブル（旧方式、カウンタストア移行後は参照のみ）
    sqlx::query(r#"
        CREATE TABLE IF NOT EXISTS api_rate_limits (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            api_key TEXT NOT NULL,
            endpoint TEXT NOT NULL,
            minute_count INTEGER NOT NULL DEFAULT 0,
            day_count INTEGER NOT NULL DEFAULT 0,
            last_request_at TEXT
        )
    "#)
    .execute(pool)
    .await?;

    // インデックス作成
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_products_user ON products(user_id)")
        .execute(pool).await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_products_status ON products(status)")
        .execute(pool).await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_warehouses_user ON warehouses(user_id)")
        .execute(pool).await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_offers_user ON offers(user_id)")
        .execute(pool).await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_offers_product ON offers(product_id)")
        .execute(pool).await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_offers_warehouse ON offers(warehouse_id)")
        .execute(pool).await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_offers_public ON offers(is_public)")
        .execute(pool).await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_orders_offer ON orders(offer_id)")
        .execute(pool).await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_orders_initiator ON orders(initiator_user_id)")
        .execute(pool).await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_orders_counterparty ON orders(counterparty_user_id)")
        .execute(pool).await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_order_items_order ON order_items(order_id)")
        .execute(pool).await?;

    Ok(())
}

// ========================================
// Test helpers
// ========================================

/// In-memory database with a single connection; every test gets its own.
#[cfg(test)]
pub(crate) async fn test_pool() -> DbPool {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")
        .expect("memory url")
        .foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await
        .expect("connect memory db");
    create_schema(&pool).await.expect("schema");
    pool
}

/// Inserts an active user (and its tariff when limits are given).
pub async fn insert_user(pool: &DbPool, api_token: &str, limits: Option<(i64, i64)>) -> sqlx::Result<i64> {
    let tariff_id = match limits {
        Some((minute, day)) => {
            let result = sqlx::query("INSERT INTO tariffs (name, minute_limit, day_limit) VALUES (?, ?, ?)")
                .bind(format!("tariff-{}", api_token))
                .bind(minute)
                .bind(day)
                .execute(pool)
                .await?;
            Some(result.last_insert_rowid())
        }
        None => None,
    };

    let result = sqlx::query(
        "INSERT INTO users (name, api_token, tariff_id, is_active, created_at) VALUES (?, ?, ?, 1, ?)"
    )
    .bind(api_token)
    .bind(api_token)
    .bind(tariff_id)
    .bind(chrono::Utc::now())
    .execute(pool)
    .await?;

    Ok(result.last_insert_rowid())
}

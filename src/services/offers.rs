//! Offer Service
//! 売買オファーの作成・更新・削除・一覧、公開オファー検索

use chrono::Utc;
use serde::Deserialize;
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};
use tracing::info;

use crate::db::{lock_row, DbPool, LockTable};
use crate::error::{AppError, AppResult};
use crate::models::{
    clamp_page, CreateOfferRequest, Offer, OfferType, Page, PublicOffer, UpdateOfferRequest,
};

pub const MAX_BATCH: usize = 1000;

const OFFER_COLUMNS: &str = "offer_id, user_id, product_id, offer_type, price_per_unit, units_per_lot, \
     available_lots, tax_nds, warehouse_id, is_public, max_shipping_days, created_at, updated_at";

/// 一覧の owner フィルタ
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OfferScope {
    My,
    Others,
    All,
}

impl std::str::FromStr for OfferScope {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" | "my" => Ok(OfferScope::My),
            "others" => Ok(OfferScope::Others),
            "all" => Ok(OfferScope::All),
            other => Err(AppError::validation(format!(
                "owner must be one of my, others, all (got '{}')",
                other
            ))),
        }
    }
}

/// `GET /offers/public` のフィルタ
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PublicOfferFilter {
    pub offer_type: Option<String>,
    pub price_min: Option<f64>,
    pub price_max: Option<f64>,
    pub min_lots: Option<i64>,
    pub product_id: Option<i64>,
    pub warehouse_id: Option<i64>,
    pub min_lat: Option<f64>,
    pub max_lat: Option<f64>,
    pub min_lng: Option<f64>,
    pub max_lng: Option<f64>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

/// Create request after required-field and range checks.
#[derive(Debug)]
struct NewOffer {
    product_id: i64,
    offer_type: OfferType,
    price_per_unit: f64,
    available_lots: i64,
    tax_nds: i64,
    units_per_lot: i64,
    warehouse_id: i64,
    is_public: bool,
    max_shipping_days: i64,
}

fn required<T>(value: Option<T>, field: &str) -> AppResult<T> {
    value.ok_or_else(|| AppError::validation(format!("{} is required", field)))
}

fn check_price(price: f64) -> AppResult<()> {
    if !(price.is_finite() && price > 0.0) {
        return Err(AppError::validation("price_per_unit must be greater than 0"));
    }
    Ok(())
}

fn check_tax(tax: i64) -> AppResult<()> {
    if !(0..=100).contains(&tax) {
        return Err(AppError::validation("tax_nds must be between 0 and 100"));
    }
    Ok(())
}

fn check_units(units: i64) -> AppResult<()> {
    if units <= 0 {
        return Err(AppError::validation("units_per_lot must be greater than 0"));
    }
    Ok(())
}

fn check_shipping_days(days: i64) -> AppResult<()> {
    if days < 0 {
        return Err(AppError::validation("max_shipping_days must not be negative"));
    }
    Ok(())
}

impl TryFrom<CreateOfferRequest> for NewOffer {
    type Error = AppError;

    fn try_from(req: CreateOfferRequest) -> AppResult<Self> {
        let offer = NewOffer {
            product_id: required(req.product_id, "product_id")?,
            offer_type: required(req.offer_type, "offer_type")?.parse()?,
            price_per_unit: required(req.price_per_unit, "price_per_unit")?,
            available_lots: required(req.available_lots, "available_lots")?,
            tax_nds: required(req.tax_nds, "tax_nds")?,
            units_per_lot: required(req.units_per_lot, "units_per_lot")?,
            warehouse_id: required(req.warehouse_id, "warehouse_id")?,
            is_public: req.is_public.unwrap_or(true),
            max_shipping_days: req.max_shipping_days.unwrap_or(0),
        };
        check_price(offer.price_per_unit)?;
        if offer.available_lots <= 0 {
            return Err(AppError::validation("available_lots must be greater than 0"));
        }
        check_tax(offer.tax_nds)?;
        check_units(offer.units_per_lot)?;
        check_shipping_days(offer.max_shipping_days)?;
        Ok(offer)
    }
}

async fn ensure_own_warehouse(
    conn: &mut SqliteConnection,
    user_id: i64,
    warehouse_id: i64,
) -> AppResult<()> {
    let owner: Option<i64> = sqlx::query_scalar("SELECT user_id FROM warehouses WHERE id = ?")
        .bind(warehouse_id)
        .fetch_optional(conn)
        .await?;
    match owner {
        Some(owner) if owner == user_id => Ok(()),
        Some(_) => Err(AppError::validation("warehouse belongs to another user")),
        None => Err(AppError::validation(format!(
            "warehouse {} does not exist",
            warehouse_id
        ))),
    }
}

async fn fetch_offer(conn: &mut SqliteConnection, offer_id: i64) -> AppResult<Option<Offer>> {
    let offer = sqlx::query_as(&format!("SELECT {} FROM offers WHERE offer_id = ?", OFFER_COLUMNS))
        .bind(offer_id)
        .fetch_optional(conn)
        .await?;
    Ok(offer)
}

async fn insert_offer(conn: &mut SqliteConnection, user_id: i64, offer: &NewOffer) -> AppResult<Offer> {
    let exists: Option<i64> = sqlx::query_scalar("SELECT id FROM products WHERE id = ?")
        .bind(offer.product_id)
        .fetch_optional(&mut *conn)
        .await?;
    if exists.is_none() {
        return Err(AppError::validation(format!(
            "product {} does not exist",
            offer.product_id
        )));
    }
    ensure_own_warehouse(conn, user_id, offer.warehouse_id).await?;

    let now = Utc::now();
    let id = sqlx::query(
        r#"
        INSERT INTO offers (
            user_id, product_id, offer_type, price_per_unit, units_per_lot, available_lots,
            tax_nds, warehouse_id, is_public, max_shipping_days, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(user_id)
    .bind(offer.product_id)
    .bind(offer.offer_type.as_str())
    .bind(offer.price_per_unit)
    .bind(offer.units_per_lot)
    .bind(offer.available_lots)
    .bind(offer.tax_nds)
    .bind(offer.warehouse_id)
    .bind(offer.is_public)
    .bind(offer.max_shipping_days)
    .bind(now)
    .bind(now)
    .execute(&mut *conn)
    .await?
    .last_insert_rowid();

    fetch_offer(conn, id)
        .await?
        .ok_or_else(|| AppError::internal("offer vanished after insert"))
}

// ========================================
// Operations
// ========================================

pub async fn create_offer(db: &DbPool, user_id: i64, req: CreateOfferRequest) -> AppResult<Offer> {
    let new = NewOffer::try_from(req)?;
    let mut tx = db.begin().await?;
    let offer = insert_offer(&mut tx, user_id, &new).await?;
    tx.commit().await?;

    info!(
        offer_id = offer.offer_id,
        user_id,
        offer_type = %offer.offer_type,
        lots = offer.available_lots,
        "Offer created"
    );
    Ok(offer)
}

pub async fn create_offers(
    db: &DbPool,
    user_id: i64,
    reqs: Vec<CreateOfferRequest>,
) -> AppResult<Vec<Offer>> {
    if reqs.is_empty() {
        return Err(AppError::validation("offers must not be empty"));
    }
    if reqs.len() > MAX_BATCH {
        return Err(AppError::validation(format!("at most {} offers per batch", MAX_BATCH)));
    }
    let news = reqs
        .into_iter()
        .enumerate()
        .map(|(i, req)| {
            NewOffer::try_from(req).map_err(|e| AppError::validation(format!("offers[{}]: {}", i, e)))
        })
        .collect::<AppResult<Vec<_>>>()?;

    let mut tx = db.begin().await?;
    let mut created = Vec::with_capacity(news.len());
    for new in &news {
        created.push(insert_offer(&mut tx, user_id, new).await?);
    }
    tx.commit().await?;

    info!(count = created.len(), user_id, "Offer batch created");
    Ok(created)
}

pub async fn get_offer(db: &DbPool, offer_id: i64) -> AppResult<Offer> {
    let mut conn = db.acquire().await?;
    fetch_offer(&mut conn, offer_id)
        .await?
        .ok_or_else(|| AppError::not_found("offer not found"))
}

/// Partial update under the offer row lock.
pub async fn update_offer(
    db: &DbPool,
    user_id: i64,
    offer_id: i64,
    req: UpdateOfferRequest,
) -> AppResult<Offer> {
    if let Some(price) = req.price_per_unit {
        check_price(price)?;
    }
    if let Some(lots) = req.available_lots {
        if lots < 0 {
            return Err(AppError::validation("available_lots must not be negative"));
        }
    }
    if let Some(tax) = req.tax_nds {
        check_tax(tax)?;
    }
    if let Some(units) = req.units_per_lot {
        check_units(units)?;
    }
    if let Some(days) = req.max_shipping_days {
        check_shipping_days(days)?;
    }

    let mut tx = db.begin().await?;
    if !lock_row(&mut tx, LockTable::Offers, offer_id).await? {
        return Err(AppError::not_found("offer not found"));
    }
    let current = fetch_offer(&mut tx, offer_id)
        .await?
        .ok_or_else(|| AppError::not_found("offer not found"))?;
    if current.user_id != user_id {
        return Err(AppError::forbidden("offer belongs to another user"));
    }
    if let Some(warehouse_id) = req.warehouse_id {
        ensure_own_warehouse(&mut tx, user_id, warehouse_id).await?;
    }

    sqlx::query(
        r#"
        UPDATE offers SET
            price_per_unit = COALESCE(?, price_per_unit),
            available_lots = COALESCE(?, available_lots),
            tax_nds = COALESCE(?, tax_nds),
            units_per_lot = COALESCE(?, units_per_lot),
            is_public = COALESCE(?, is_public),
            max_shipping_days = COALESCE(?, max_shipping_days),
            warehouse_id = COALESCE(?, warehouse_id),
            updated_at = ?
        WHERE offer_id = ?
        "#,
    )
    .bind(req.price_per_unit)
    .bind(req.available_lots)
    .bind(req.tax_nds)
    .bind(req.units_per_lot)
    .bind(req.is_public)
    .bind(req.max_shipping_days)
    .bind(req.warehouse_id)
    .bind(Utc::now())
    .bind(offer_id)
    .execute(&mut *tx)
    .await?;

    let offer = fetch_offer(&mut tx, offer_id)
        .await?
        .ok_or_else(|| AppError::internal("offer vanished during update"))?;
    tx.commit().await?;

    info!(offer_id, user_id, lots = offer.available_lots, "Offer updated");
    Ok(offer)
}

pub async fn delete_offer(db: &DbPool, user_id: i64, offer_id: i64) -> AppResult<()> {
    let mut tx = db.begin().await?;
    if !lock_row(&mut tx, LockTable::Offers, offer_id).await? {
        return Err(AppError::not_found("offer not found"));
    }
    let owner: i64 = sqlx::query_scalar("SELECT user_id FROM offers WHERE offer_id = ?")
        .bind(offer_id)
        .fetch_one(&mut *tx)
        .await?;
    if owner != user_id {
        return Err(AppError::forbidden("offer belongs to another user"));
    }

    let open: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM orders WHERE offer_id = ? AND order_status IN ('pending', 'confirmed', 'processing', 'shipped')",
    )
    .bind(offer_id)
    .fetch_one(&mut *tx)
    .await?;
    if open > 0 {
        return Err(AppError::conflict(format!(
            "offer has {} open order(s)",
            open
        )));
    }

    let closed: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM orders WHERE offer_id = ?")
        .bind(offer_id)
        .fetch_one(&mut *tx)
        .await?;
    if closed > 0 {
        // Finished orders keep their history; the offer is withdrawn instead.
        sqlx::query("UPDATE offers SET available_lots = 0, is_public = 0, updated_at = ? WHERE offer_id = ?")
            .bind(Utc::now())
            .bind(offer_id)
            .execute(&mut *tx)
            .await?;
    } else {
        sqlx::query("DELETE FROM offers WHERE offer_id = ?")
            .bind(offer_id)
            .execute(&mut *tx)
            .await?;
    }
    tx.commit().await?;

    info!(offer_id, user_id, withdrawn = closed > 0, "Offer deleted");
    Ok(())
}

pub async fn list_offers(
    db: &DbPool,
    user_id: i64,
    scope: OfferScope,
    offer_type: Option<OfferType>,
    page: Option<i64>,
    limit: Option<i64>,
) -> AppResult<Page<Offer>> {
    let (page, limit, offset) = clamp_page(page, limit, 20);

    fn push_filters(qb: &mut QueryBuilder<'_, Sqlite>, scope: OfferScope, offer_type: Option<OfferType>, user_id: i64) {
        qb.push(" WHERE 1 = 1");
        match scope {
            OfferScope::My => {
                qb.push(" AND user_id = ").push_bind(user_id);
            }
            OfferScope::Others => {
                qb.push(" AND user_id <> ").push_bind(user_id).push(" AND is_public = 1");
            }
            OfferScope::All => {
                qb.push(" AND (user_id = ").push_bind(user_id).push(" OR is_public = 1)");
            }
        }
        if let Some(t) = offer_type {
            qb.push(" AND offer_type = ").push_bind(t.as_str());
        }
    }

    let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM offers");
    push_filters(&mut count, scope, offer_type, user_id);
    let total: i64 = count.build_query_scalar().fetch_one(db).await?;

    let mut qb = QueryBuilder::<Sqlite>::new(format!("SELECT {} FROM offers", OFFER_COLUMNS));
    push_filters(&mut qb, scope, offer_type, user_id);
    qb.push(" ORDER BY created_at DESC, offer_id DESC LIMIT ")
        .push_bind(limit)
        .push(" OFFSET ")
        .push_bind(offset);
    let items: Vec<Offer> = qb.build_query_as().fetch_all(db).await?;

    Ok(Page {
        items,
        total,
        page,
        limit,
    })
}

fn push_public_filters(
    qb: &mut QueryBuilder<'_, Sqlite>,
    filter: &PublicOfferFilter,
    offer_type: Option<OfferType>,
) {
    qb.push(" WHERE o.is_public = 1 AND o.available_lots > 0");
    if let Some(t) = offer_type {
        qb.push(" AND o.offer_type = ").push_bind(t.as_str());
    }
    if let Some(v) = filter.price_min {
        qb.push(" AND o.price_per_unit >= ").push_bind(v);
    }
    if let Some(v) = filter.price_max {
        qb.push(" AND o.price_per_unit <= ").push_bind(v);
    }
    if let Some(v) = filter.min_lots {
        qb.push(" AND o.available_lots >= ").push_bind(v);
    }
    if let Some(v) = filter.product_id {
        qb.push(" AND o.product_id = ").push_bind(v);
    }
    if let Some(v) = filter.warehouse_id {
        qb.push(" AND o.warehouse_id = ").push_bind(v);
    }
    if let Some(v) = filter.min_lat {
        qb.push(" AND w.latitude >= ").push_bind(v);
    }
    if let Some(v) = filter.max_lat {
        qb.push(" AND w.latitude <= ").push_bind(v);
    }
    if let Some(v) = filter.min_lng {
        qb.push(" AND w.longitude >= ").push_bind(v);
    }
    if let Some(v) = filter.max_lng {
        qb.push(" AND w.longitude <= ").push_bind(v);
    }
}

/// Public offers joined with product and warehouse data.
pub async fn list_public_offers(db: &DbPool, filter: PublicOfferFilter) -> AppResult<Page<PublicOffer>> {
    let (page, limit, offset) = clamp_page(filter.page, filter.limit, 20);
    let offer_type = filter
        .offer_type
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .map(str::parse::<OfferType>)
        .transpose()?;

    const FROM: &str = " FROM offers o JOIN products p ON p.id = o.product_id JOIN warehouses w ON w.id = o.warehouse_id";

    let mut count = QueryBuilder::<Sqlite>::new(format!("SELECT COUNT(*){}", FROM));
    push_public_filters(&mut count, &filter, offer_type);
    let total: i64 = count.build_query_scalar().fetch_one(db).await?;

    let mut qb = QueryBuilder::<Sqlite>::new(format!(
        r#"SELECT o.offer_id, o.user_id, o.product_id, o.offer_type, o.price_per_unit,
                  o.units_per_lot, o.available_lots, o.tax_nds, o.warehouse_id,
                  o.max_shipping_days, o.created_at,
                  p.name AS product_name, p.vendor_article, p.recommend_price,
                  w.name AS warehouse_name, w.address AS warehouse_address,
                  w.latitude, w.longitude{}"#,
        FROM
    ));
    push_public_filters(&mut qb, &filter, offer_type);
    qb.push(" ORDER BY o.created_at DESC, o.offer_id DESC LIMIT ")
        .push_bind(limit)
        .push(" OFFSET ")
        .push_bind(offset);
    let items: Vec<PublicOffer> = qb.build_query_as().fetch_all(db).await?;

    Ok(Page {
        items,
        total,
        page,
        limit,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;

    async fn seed(pool: &DbPool) -> (i64, i64) {
        let now = Utc::now();
        let product = sqlx::query(
            "INSERT INTO products (name, vendor_article, user_id, created_at, updated_at) VALUES ('Welder', 'SW-200', 1, ?, ?)",
        )
        .bind(now)
        .bind(now)
        .execute(pool)
        .await
        .unwrap()
        .last_insert_rowid();
        let warehouse = sqlx::query(
            "INSERT INTO warehouses (user_id, name, address, latitude, longitude, created_at, updated_at)
             VALUES (1, 'Main', 'Moscow', 55.75, 37.61, ?, ?)",
        )
        .bind(now)
        .bind(now)
        .execute(pool)
        .await
        .unwrap()
        .last_insert_rowid();
        (product, warehouse)
    }

    fn request(product_id: i64, warehouse_id: i64) -> CreateOfferRequest {
        CreateOfferRequest {
            product_id: Some(product_id),
            offer_type: Some("sell".into()),
            price_per_unit: Some(100.0),
            available_lots: Some(5),
            tax_nds: Some(20),
            units_per_lot: Some(2),
            warehouse_id: Some(warehouse_id),
            is_public: None,
            max_shipping_days: Some(3),
        }
    }

    #[tokio::test]
    async fn create_canonicalises_offer_type() {
        let pool = test_pool().await;
        let (product, warehouse) = seed(&pool).await;
        let offer = create_offer(&pool, 1, request(product, warehouse)).await.unwrap();
        assert_eq!(offer.offer_type, "sale");
        assert!(offer.is_public);
        assert_eq!(offer.available_lots, 5);
    }

    #[tokio::test]
    async fn create_validates_fields() {
        let pool = test_pool().await;
        let (product, warehouse) = seed(&pool).await;

        let mut req = request(product, warehouse);
        req.tax_nds = Some(101);
        assert!(matches!(create_offer(&pool, 1, req).await, Err(AppError::Validation(_))));

        let mut req = request(product, warehouse);
        req.available_lots = Some(0);
        assert!(matches!(create_offer(&pool, 1, req).await, Err(AppError::Validation(_))));

        let mut req = request(product, warehouse);
        req.offer_type = None;
        assert!(matches!(create_offer(&pool, 1, req).await, Err(AppError::Validation(_))));

        let mut req = request(product, warehouse);
        req.offer_type = Some("rent".into());
        assert!(matches!(create_offer(&pool, 1, req).await, Err(AppError::Validation(_))));

        // someone else's warehouse
        assert!(matches!(
            create_offer(&pool, 2, request(product, warehouse)).await,
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            create_offer(&pool, 1, request(999, warehouse)).await,
            Err(AppError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn update_is_owner_only_and_keeps_lots_non_negative() {
        let pool = test_pool().await;
        let (product, warehouse) = seed(&pool).await;
        let offer = create_offer(&pool, 1, request(product, warehouse)).await.unwrap();

        let req = UpdateOfferRequest {
            available_lots: Some(9),
            ..Default::default()
        };
        assert!(matches!(
            update_offer(&pool, 2, offer.offer_id, req.clone()).await,
            Err(AppError::Forbidden(_))
        ));
        let updated = update_offer(&pool, 1, offer.offer_id, req).await.unwrap();
        assert_eq!(updated.available_lots, 9);
        assert_eq!(updated.price_per_unit, 100.0);

        let req = UpdateOfferRequest {
            available_lots: Some(-1),
            ..Default::default()
        };
        assert!(matches!(
            update_offer(&pool, 1, offer.offer_id, req).await,
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            update_offer(&pool, 1, 404, UpdateOfferRequest::default()).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn delete_refuses_with_open_orders() {
        let pool = test_pool().await;
        let (product, warehouse) = seed(&pool).await;
        let offer = create_offer(&pool, 1, request(product, warehouse)).await.unwrap();
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO orders (offer_id, initiator_user_id, counterparty_user_id, order_type, price_per_unit, units_per_lot, lot_count, total_amount, order_status, created_at, updated_at)
             VALUES (?, 2, 1, 'buy', 100, 2, 1, 200, 'shipped', ?, ?)",
        )
        .bind(offer.offer_id)
        .bind(now)
        .bind(now)
        .execute(&pool)
        .await
        .unwrap();

        assert!(matches!(
            delete_offer(&pool, 2, offer.offer_id).await,
            Err(AppError::Forbidden(_))
        ));
        assert!(matches!(
            delete_offer(&pool, 1, offer.offer_id).await,
            Err(AppError::Conflict(_))
        ));

        sqlx::query("UPDATE orders SET order_status = 'delivered'")
            .execute(&pool)
            .await
            .unwrap();
        delete_offer(&pool, 1, offer.offer_id).await.unwrap();
        let withdrawn = get_offer(&pool, offer.offer_id).await.unwrap();
        assert_eq!(withdrawn.available_lots, 0);
        assert!(!withdrawn.is_public);

        let fresh = create_offer(&pool, 1, request(product, warehouse)).await.unwrap();
        delete_offer(&pool, 1, fresh.offer_id).await.unwrap();
        assert!(matches!(
            get_offer(&pool, fresh.offer_id).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn batch_rolls_back_on_error() {
        let pool = test_pool().await;
        let (product, warehouse) = seed(&pool).await;
        let batch = vec![request(product, warehouse), request(999, warehouse)];
        assert!(create_offers(&pool, 1, batch).await.is_err());
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM offers")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 0);

        let created = create_offers(&pool, 1, vec![request(product, warehouse); 3]).await.unwrap();
        assert_eq!(created.len(), 3);
    }

    #[tokio::test]
    async fn listing_and_public_filters() {
        let pool = test_pool().await;
        let (product, warehouse) = seed(&pool).await;
        create_offer(&pool, 1, request(product, warehouse)).await.unwrap();
        let mut buy = request(product, warehouse);
        buy.offer_type = Some("purchase".into());
        buy.price_per_unit = Some(50.0);
        create_offer(&pool, 1, buy).await.unwrap();
        let mut hidden = request(product, warehouse);
        hidden.is_public = Some(false);
        create_offer(&pool, 1, hidden).await.unwrap();

        let mine = list_offers(&pool, 1, OfferScope::My, None, None, None).await.unwrap();
        assert_eq!(mine.total, 3);
        let buys = list_offers(&pool, 1, OfferScope::My, Some(OfferType::Buy), None, None)
            .await
            .unwrap();
        assert_eq!(buys.total, 1);
        let others = list_offers(&pool, 2, OfferScope::Others, None, None, None).await.unwrap();
        assert_eq!(others.total, 2);

        let public = list_public_offers(&pool, PublicOfferFilter::default()).await.unwrap();
        assert_eq!(public.total, 2);
        assert_eq!(public.items[0].warehouse_name, "Main");
        assert_eq!(public.items[0].product_name, "Welder");

        let cheap = list_public_offers(
            &pool,
            PublicOfferFilter {
                price_max: Some(60.0),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(cheap.total, 1);
        assert_eq!(cheap.items[0].offer_type, "buy");

        let far = list_public_offers(
            &pool,
            PublicOfferFilter {
                min_lat: Some(59.0),
                max_lat: Some(61.0),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(far.total, 0);
    }
}

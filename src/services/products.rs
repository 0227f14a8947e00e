//! Product Service
//! メタ商品の作成・取得・一覧・更新・削除

use chrono::Utc;
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};
use tracing::{info, warn};

use crate::cache::ProductCache;
use crate::category_id;
use crate::classifier::{ClassificationQueue, ClassificationTask};
use crate::db::{lock_row, DbPool, LockTable};
use crate::error::{AppError, AppResult};
use crate::media::{validate_urls, MediaKind};
use crate::models::{
    clamp_page, CreateProductRequest, Page, Product, ProductRow, ProductScope, ProductStatus,
    UpdateProductRequest,
};

/// 一度に作成できる商品数の上限
pub const MAX_BATCH: usize = 1000;

const PRODUCT_SELECT: &str = r#"
    SELECT p.id, p.name, p.vendor_article, p.recommend_price, p.brand, p.category,
           p.brand_id, p.category_id, p.description, p.barcode, p.user_id, p.status,
           p.created_at, p.updated_at,
           m.image_urls, m.video_urls, m.model_3d_urls
    FROM products p
    LEFT JOIN media m ON m.product_id = p.id
"#;

// ========================================
// Helpers
// ========================================

fn to_json(urls: &[String]) -> AppResult<String> {
    serde_json::to_string(urls).map_err(|e| AppError::internal(format!("encode media: {}", e)))
}

fn validate_create(req: &CreateProductRequest) -> AppResult<()> {
    if req.name.trim().is_empty() {
        return Err(AppError::validation("name is required"));
    }
    validate_urls(MediaKind::Image, &req.image_urls)?;
    validate_urls(MediaKind::Video, &req.video_urls)?;
    validate_urls(MediaKind::Model3d, &req.model_3d_urls)?;
    Ok(())
}

/// An explicit id wins; otherwise a WB category string derives one.
fn resolve_category_id(req: &CreateProductRequest) -> Option<i64> {
    req.category_id
        .or_else(|| Some(category_id::generate(&req.category)).filter(|id| *id != 0))
}

async fn fetch_product(conn: &mut SqliteConnection, id: i64) -> AppResult<Option<Product>> {
    let row: Option<ProductRow> = sqlx::query_as(&format!("{} WHERE p.id = ?", PRODUCT_SELECT))
        .bind(id)
        .fetch_optional(conn)
        .await?;
    row.map(Product::try_from).transpose()
}

async fn insert_product(
    conn: &mut SqliteConnection,
    user_id: i64,
    req: &CreateProductRequest,
) -> AppResult<i64> {
    let now = Utc::now();
    let id = sqlx::query(
        r#"
        INSERT INTO products (
            name, vendor_article, recommend_price, brand, category, brand_id, category_id,
            description, barcode, user_id, status, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(req.name.trim())
    .bind(&req.vendor_article)
    .bind(req.recommend_price)
    .bind(&req.brand)
    .bind(&req.category)
    .bind(req.brand_id)
    .bind(resolve_category_id(req))
    .bind(&req.description)
    .bind(&req.barcode)
    .bind(user_id)
    .bind(ProductStatus::Pending.as_str())
    .bind(now)
    .bind(now)
    .execute(&mut *conn)
    .await?
    .last_insert_rowid();

    if !req.image_urls.is_empty() || !req.video_urls.is_empty() || !req.model_3d_urls.is_empty() {
        sqlx::query(
            "INSERT INTO media (product_id, image_urls, video_urls, model_3d_urls) VALUES (?, ?, ?, ?)",
        )
        .bind(id)
        .bind(to_json(&req.image_urls)?)
        .bind(to_json(&req.video_urls)?)
        .bind(to_json(&req.model_3d_urls)?)
        .execute(&mut *conn)
        .await?;
    }

    Ok(id)
}

fn enqueue(queue: &dyn ClassificationQueue, product: &Product) {
    let task = ClassificationTask {
        product_id: product.id,
        product_name: product.name.clone(),
        user_id: product.user_id,
        user_category: product.category.clone(),
        brand: product.brand.clone(),
    };
    if let Err(e) = queue.enqueue(task) {
        warn!(product_id = product.id, error = %e, "Product not queued for classification");
    }
}

async fn owned_product(conn: &mut SqliteConnection, user_id: i64, id: i64) -> AppResult<Product> {
    let product = fetch_product(conn, id)
        .await?
        .ok_or_else(|| AppError::not_found("product not found"))?;
    if product.user_id != user_id {
        return Err(AppError::forbidden("product belongs to another user"));
    }
    Ok(product)
}

// ========================================
// Operations
// ========================================

pub async fn create_product(
    db: &DbPool,
    queue: &dyn ClassificationQueue,
    user_id: i64,
    req: CreateProductRequest,
) -> AppResult<Product> {
    validate_create(&req)?;

    let mut tx = db.begin().await?;
    let id = insert_product(&mut tx, user_id, &req).await?;
    let product = fetch_product(&mut tx, id)
        .await?
        .ok_or_else(|| AppError::internal("product vanished after insert"))?;
    tx.commit().await?;

    info!(product_id = id, user_id, "Product created");
    enqueue(queue, &product);
    Ok(product)
}

/// All-or-nothing: one bad item rolls back the whole batch.
pub async fn create_products(
    db: &DbPool,
    queue: &dyn ClassificationQueue,
    user_id: i64,
    reqs: Vec<CreateProductRequest>,
) -> AppResult<Vec<Product>> {
    if reqs.is_empty() {
        return Err(AppError::validation("products must not be empty"));
    }
    if reqs.len() > MAX_BATCH {
        return Err(AppError::validation(format!(
            "at most {} products per batch",
            MAX_BATCH
        )));
    }
    for (i, req) in reqs.iter().enumerate() {
        validate_create(req).map_err(|e| AppError::validation(format!("products[{}]: {}", i, e)))?;
    }

    let mut tx = db.begin().await?;
    let mut created = Vec::with_capacity(reqs.len());
    for req in &reqs {
        let id = insert_product(&mut tx, user_id, req).await?;
        let product = fetch_product(&mut tx, id)
            .await?
            .ok_or_else(|| AppError::internal("product vanished after insert"))?;
        created.push(product);
    }
    tx.commit().await?;

    info!(count = created.len(), user_id, "Product batch created");
    for product in &created {
        enqueue(queue, product);
    }
    Ok(created)
}

pub async fn get_product(db: &DbPool, cache: &ProductCache, id: i64) -> AppResult<Product> {
    if let Some(product) = cache.get(id).await {
        return Ok(product);
    }
    let ticket = cache.ticket(id).await;
    let mut conn = db.acquire().await?;
    let product = fetch_product(&mut conn, id)
        .await?
        .ok_or_else(|| AppError::not_found("product not found"))?;
    if let Some(ticket) = ticket {
        cache.fill(ticket, &product).await;
    }
    Ok(product)
}

fn push_scope(qb: &mut QueryBuilder<'_, Sqlite>, scope: ProductScope, user_id: i64) {
    match scope {
        ProductScope::All => {}
        ProductScope::My => {
            qb.push(" WHERE p.user_id = ").push_bind(user_id);
        }
        ProductScope::Others => {
            qb.push(" WHERE p.user_id <> ").push_bind(user_id);
        }
        ProductScope::Pending | ProductScope::NotClassified | ProductScope::Classified => {
            let status = match scope {
                ProductScope::Pending => ProductStatus::Pending,
                ProductScope::NotClassified => ProductStatus::NotClassified,
                _ => ProductStatus::Classified,
            };
            qb.push(" WHERE p.user_id = ")
                .push_bind(user_id)
                .push(" AND p.status = ")
                .push_bind(status.as_str());
        }
    }
}

pub async fn list_products(
    db: &DbPool,
    user_id: i64,
    scope: ProductScope,
    page: Option<i64>,
    limit: Option<i64>,
) -> AppResult<Page<Product>> {
    let (page, limit, offset) = clamp_page(page, limit, 20);

    let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM products p");
    push_scope(&mut count, scope, user_id);
    let total: i64 = count.build_query_scalar().fetch_one(db).await?;

    let mut qb = QueryBuilder::<Sqlite>::new(PRODUCT_SELECT);
    push_scope(&mut qb, scope, user_id);
    qb.push(" ORDER BY p.created_at DESC, p.id DESC LIMIT ")
        .push_bind(limit)
        .push(" OFFSET ")
        .push_bind(offset);
    let rows: Vec<ProductRow> = qb.build_query_as().fetch_all(db).await?;

    let items = rows
        .into_iter()
        .map(Product::try_from)
        .collect::<AppResult<Vec<_>>>()?;
    Ok(Page {
        items,
        total,
        page,
        limit,
    })
}

/// Partial update. With no fields set nothing is written and the stored
/// row (including `updated_at`) is returned as is.
pub async fn update_product(
    db: &DbPool,
    cache: &ProductCache,
    user_id: i64,
    id: i64,
    req: UpdateProductRequest,
) -> AppResult<Product> {
    if let Some(name) = &req.name {
        if name.trim().is_empty() {
            return Err(AppError::validation("name must not be empty"));
        }
    }
    if let Some(urls) = &req.image_urls {
        validate_urls(MediaKind::Image, urls)?;
    }
    if let Some(urls) = &req.video_urls {
        validate_urls(MediaKind::Video, urls)?;
    }
    if let Some(urls) = &req.model_3d_urls {
        validate_urls(MediaKind::Model3d, urls)?;
    }

    if !req.has_product_fields() && !req.has_media_fields() {
        let mut conn = db.acquire().await?;
        return owned_product(&mut conn, user_id, id).await;
    }

    let mut tx = db.begin().await?;
    if !lock_row(&mut tx, LockTable::Products, id).await? {
        return Err(AppError::not_found("product not found"));
    }
    owned_product(&mut tx, user_id, id).await?;

    let now = Utc::now();
    sqlx::query(
        r#"
        UPDATE products SET
            name = COALESCE(?, name),
            vendor_article = COALESCE(?, vendor_article),
            recommend_price = COALESCE(?, recommend_price),
            brand = COALESCE(?, brand),
            category = COALESCE(?, category),
            brand_id = COALESCE(?, brand_id),
            category_id = COALESCE(?, category_id),
            description = COALESCE(?, description),
            barcode = COALESCE(?, barcode),
            updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(req.name.as_deref().map(str::trim))
    .bind(&req.vendor_article)
    .bind(req.recommend_price)
    .bind(&req.brand)
    .bind(&req.category)
    .bind(req.brand_id)
    .bind(req.category_id)
    .bind(&req.description)
    .bind(&req.barcode)
    .bind(now)
    .bind(id)
    .execute(&mut *tx)
    .await?;

    if req.has_media_fields() {
        let image = req.image_urls.as_deref().map(to_json).transpose()?;
        let video = req.video_urls.as_deref().map(to_json).transpose()?;
        let model = req.model_3d_urls.as_deref().map(to_json).transpose()?;
        sqlx::query(
            r#"
            INSERT INTO media (product_id, image_urls, video_urls, model_3d_urls)
            VALUES (?, COALESCE(?, '[]'), COALESCE(?, '[]'), COALESCE(?, '[]'))
            ON CONFLICT(product_id) DO UPDATE SET
                image_urls = COALESCE(?, image_urls),
                video_urls = COALESCE(?, video_urls),
                model_3d_urls = COALESCE(?, model_3d_urls)
            "#,
        )
        .bind(id)
        .bind(image.as_deref())
        .bind(video.as_deref())
        .bind(model.as_deref())
        .bind(image.as_deref())
        .bind(video.as_deref())
        .bind(model.as_deref())
        .execute(&mut *tx)
        .await?;
    }

    let product = fetch_product(&mut tx, id)
        .await?
        .ok_or_else(|| AppError::internal("product vanished during update"))?;
    tx.commit().await?;

    cache.invalidate(id).await;
    info!(product_id = id, user_id, "Product updated");
    Ok(product)
}

pub async fn delete_product(
    db: &DbPool,
    cache: &ProductCache,
    user_id: i64,
    id: i64,
) -> AppResult<()> {
    let mut tx = db.begin().await?;
    if !lock_row(&mut tx, LockTable::Products, id).await? {
        return Err(AppError::not_found("product not found"));
    }
    owned_product(&mut tx, user_id, id).await?;

    let offers: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM offers WHERE product_id = ?")
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;
    if offers > 0 {
        return Err(AppError::conflict(format!(
            "product is referenced by {} offer(s)",
            offers
        )));
    }

    sqlx::query("DELETE FROM media WHERE product_id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM products WHERE id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    cache.invalidate(id).await;
    info!(product_id = id, user_id, "Product deleted");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::{ClassificationApplier, ClassificationResult, ClassifierError};
    use crate::counter::{MemoryStore, SystemClock};
    use crate::db::test_pool;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingQueue {
        tasks: Mutex<Vec<ClassificationTask>>,
        full: bool,
    }

    impl ClassificationQueue for RecordingQueue {
        fn enqueue(&self, task: ClassificationTask) -> Result<(), ClassifierError> {
            if self.full {
                return Err(ClassifierError::QueueFull);
            }
            self.tasks.lock().unwrap().push(task);
            Ok(())
        }
    }

    fn cache() -> ProductCache {
        ProductCache::new(Arc::new(MemoryStore::new(Arc::new(SystemClock))), Duration::from_secs(60))
    }

    fn welder(article: &str) -> CreateProductRequest {
        CreateProductRequest {
            name: "Сварочный аппарат инверторный".into(),
            vendor_article: article.into(),
            recommend_price: 15000.0,
            brand: "Ресанта".into(),
            category: "wb: 1318 - сварочные аппараты".into(),
            description: "…".into(),
            image_urls: vec!["https://cdn.example.com/w.jpg".into()],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn create_stores_pending_product_with_media_and_enqueues() {
        let pool = test_pool().await;
        let queue = RecordingQueue::default();

        let product = create_product(&pool, &queue, 1, welder("SW-200")).await.unwrap();
        assert_eq!(product.status, "pending");
        assert_eq!(product.category_id, Some(1496952285));
        assert_eq!(product.image_urls, vec!["https://cdn.example.com/w.jpg"]);
        assert!(product.video_urls.is_empty());

        let tasks = queue.tasks.lock().unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].product_id, product.id);
        assert_eq!(tasks[0].user_category, "wb: 1318 - сварочные аппараты");
    }

    #[tokio::test]
    async fn full_queue_does_not_fail_creation() {
        let pool = test_pool().await;
        let queue = RecordingQueue {
            full: true,
            ..Default::default()
        };
        let product = create_product(&pool, &queue, 1, welder("SW-1")).await.unwrap();
        assert_eq!(product.status, "pending");
    }

    #[tokio::test]
    async fn explicit_category_id_wins_and_plain_category_gets_none() {
        let pool = test_pool().await;
        let queue = RecordingQueue::default();

        let mut req = welder("A");
        req.category_id = Some(5);
        assert_eq!(create_product(&pool, &queue, 1, req).await.unwrap().category_id, Some(5));

        let mut req = welder("B");
        req.category = "Сварка".into();
        assert_eq!(create_product(&pool, &queue, 1, req).await.unwrap().category_id, None);
    }

    #[tokio::test]
    async fn validation_errors() {
        let pool = test_pool().await;
        let queue = RecordingQueue::default();

        let mut req = welder("A");
        req.name = "  ".into();
        assert!(matches!(
            create_product(&pool, &queue, 1, req).await,
            Err(AppError::Validation(_))
        ));

        let mut req = welder("A");
        req.video_urls = vec!["https://cdn.example.com/v.exe".into()];
        assert!(matches!(
            create_product(&pool, &queue, 1, req).await,
            Err(AppError::Validation(_))
        ));
        assert!(queue.tasks.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn duplicate_brand_article_is_conflict() {
        let pool = test_pool().await;
        let queue = RecordingQueue::default();
        create_product(&pool, &queue, 1, welder("SW-200")).await.unwrap();
        assert!(matches!(
            create_product(&pool, &queue, 2, welder("SW-200")).await,
            Err(AppError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn batch_is_all_or_nothing() {
        let pool = test_pool().await;
        let queue = RecordingQueue::default();

        let batch = vec![welder("X-1"), welder("X-2"), welder("X-1")];
        assert!(matches!(
            create_products(&pool, &queue, 1, batch).await,
            Err(AppError::Conflict(_))
        ));
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 0);
        assert!(queue.tasks.lock().unwrap().is_empty());

        let created = create_products(&pool, &queue, 1, vec![welder("X-1"), welder("X-2")])
            .await
            .unwrap();
        assert_eq!(created.len(), 2);
        assert_eq!(queue.tasks.lock().unwrap().len(), 2);

        assert!(matches!(
            create_products(&pool, &queue, 1, vec![]).await,
            Err(AppError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn update_is_owner_only_and_partial() {
        let pool = test_pool().await;
        let queue = RecordingQueue::default();
        let cache = cache();
        let product = create_product(&pool, &queue, 1, welder("U-1")).await.unwrap();

        let req = UpdateProductRequest {
            description: Some("new".into()),
            ..Default::default()
        };
        assert!(matches!(
            update_product(&pool, &cache, 2, product.id, req.clone()).await,
            Err(AppError::Forbidden(_))
        ));

        let updated = update_product(&pool, &cache, 1, product.id, req).await.unwrap();
        assert_eq!(updated.description, "new");
        assert_eq!(updated.name, product.name);
        assert_eq!(updated.image_urls, product.image_urls);
    }

    #[tokio::test]
    async fn empty_update_changes_nothing() {
        let pool = test_pool().await;
        let queue = RecordingQueue::default();
        let cache = cache();
        let product = create_product(&pool, &queue, 1, welder("E-1")).await.unwrap();

        let same = update_product(&pool, &cache, 1, product.id, UpdateProductRequest::default())
            .await
            .unwrap();
        assert_eq!(same, product);
    }

    #[tokio::test]
    async fn media_update_touches_only_supplied_arrays() {
        let pool = test_pool().await;
        let queue = RecordingQueue::default();
        let cache = cache();
        let mut req = welder("M-1");
        req.image_urls.clear();
        let product = create_product(&pool, &queue, 1, req).await.unwrap();

        let req = UpdateProductRequest {
            video_urls: Some(vec!["https://v.example.com/a.mp4".into()]),
            ..Default::default()
        };
        let updated = update_product(&pool, &cache, 1, product.id, req).await.unwrap();
        assert_eq!(updated.video_urls, vec!["https://v.example.com/a.mp4"]);
        assert!(updated.image_urls.is_empty());

        let req = UpdateProductRequest {
            image_urls: Some(vec!["https://a.example.com/b.png".into()]),
            ..Default::default()
        };
        let updated = update_product(&pool, &cache, 1, product.id, req).await.unwrap();
        assert_eq!(updated.video_urls, vec!["https://v.example.com/a.mp4"]);
        assert_eq!(updated.image_urls, vec!["https://a.example.com/b.png"]);
    }

    #[tokio::test]
    async fn delete_refuses_when_offers_exist() {
        let pool = test_pool().await;
        let queue = RecordingQueue::default();
        let cache = cache();
        let product = create_product(&pool, &queue, 1, welder("D-1")).await.unwrap();

        let now = Utc::now();
        let wh = sqlx::query(
            "INSERT INTO warehouses (user_id, name, address, latitude, longitude, created_at, updated_at) VALUES (1, 'W', 'A', 0, 0, ?, ?)",
        )
        .bind(now)
        .bind(now)
        .execute(&pool)
        .await
        .unwrap()
        .last_insert_rowid();
        sqlx::query(
            "INSERT INTO offers (user_id, product_id, offer_type, price_per_unit, units_per_lot, available_lots, tax_nds, warehouse_id, created_at, updated_at)
             VALUES (1, ?, 'sale', 1, 1, 1, 0, ?, ?, ?)",
        )
        .bind(product.id)
        .bind(wh)
        .bind(now)
        .bind(now)
        .execute(&pool)
        .await
        .unwrap();

        assert!(matches!(
            delete_product(&pool, &cache, 1, product.id).await,
            Err(AppError::Conflict(_))
        ));

        let other = create_product(&pool, &queue, 1, welder("D-2")).await.unwrap();
        delete_product(&pool, &cache, 1, other.id).await.unwrap();
        assert!(matches!(
            get_product(&pool, &cache, other.id).await,
            Err(AppError::NotFound(_))
        ));
        let media: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM media WHERE product_id = ?")
            .bind(other.id)
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(media, 0);
    }

    #[tokio::test]
    async fn list_scopes() {
        let pool = test_pool().await;
        let queue = RecordingQueue::default();
        create_product(&pool, &queue, 1, welder("L-1")).await.unwrap();
        create_product(&pool, &queue, 1, welder("L-2")).await.unwrap();
        create_product(&pool, &queue, 2, welder("L-3")).await.unwrap();

        let mine = list_products(&pool, 1, ProductScope::My, None, None).await.unwrap();
        assert_eq!(mine.total, 2);
        let others = list_products(&pool, 1, ProductScope::Others, None, None).await.unwrap();
        assert_eq!(others.total, 1);
        let all = list_products(&pool, 1, ProductScope::All, Some(1), Some(2)).await.unwrap();
        assert_eq!((all.total, all.items.len(), all.limit), (3, 2, 2));
        let pending = list_products(&pool, 1, ProductScope::Pending, None, None).await.unwrap();
        assert_eq!(pending.total, 2);
        let classified = list_products(&pool, 1, ProductScope::Classified, None, None).await.unwrap();
        assert_eq!(classified.total, 0);
    }

    #[tokio::test]
    async fn get_uses_cache() {
        let pool = test_pool().await;
        let queue = RecordingQueue::default();
        let cache = cache();
        let product = create_product(&pool, &queue, 1, welder("C-1")).await.unwrap();

        assert_eq!(get_product(&pool, &cache, product.id).await.unwrap(), product);
        sqlx::query("UPDATE products SET name = 'changed behind the cache' WHERE id = ?")
            .bind(product.id)
            .execute(&pool)
            .await
            .unwrap();
        assert_eq!(get_product(&pool, &cache, product.id).await.unwrap().name, product.name);

        cache.invalidate(product.id).await;
        assert_eq!(
            get_product(&pool, &cache, product.id).await.unwrap().name,
            "changed behind the cache"
        );
    }

    #[tokio::test]
    async fn read_before_classification_does_not_cache_stale_row() {
        let pool = test_pool().await;
        let queue = RecordingQueue::default();
        let cache = cache();
        let product = create_product(&pool, &queue, 1, welder("R-1")).await.unwrap();

        // a GET misses, takes its ticket and reads the pending row
        let ticket = cache.ticket(product.id).await.unwrap();
        let mut conn = pool.acquire().await.unwrap();
        let stale = fetch_product(&mut conn, product.id).await.unwrap().unwrap();
        drop(conn);
        assert_eq!(stale.status, "pending");

        // the worker commits and invalidates before the GET fills
        let applier = ClassificationApplier::new(pool.clone(), Some(cache.clone()), 0.99);
        let answer: ClassificationResult = serde_json::from_value(serde_json::json!({
            "status": "found",
            "found_category_id": 1318,
            "brand_id": "42",
            "accuracy": 0.995,
            "brand_accuracy": 0.99,
        }))
        .unwrap();
        applier.apply(product.id, &answer).await.unwrap();
        cache.fill(ticket, &stale).await;

        let seen = get_product(&pool, &cache, product.id).await.unwrap();
        assert_eq!(seen.status, "classified");
        assert_eq!(seen.category_id, Some(1318));
    }

    #[tokio::test]
    async fn read_before_delete_does_not_resurrect_product() {
        let pool = test_pool().await;
        let queue = RecordingQueue::default();
        let cache = cache();
        let product = create_product(&pool, &queue, 1, welder("R-2")).await.unwrap();

        let ticket = cache.ticket(product.id).await.unwrap();
        let mut conn = pool.acquire().await.unwrap();
        let stale = fetch_product(&mut conn, product.id).await.unwrap().unwrap();
        drop(conn);

        delete_product(&pool, &cache, 1, product.id).await.unwrap();
        cache.fill(ticket, &stale).await;

        assert!(matches!(
            get_product(&pool, &cache, product.id).await,
            Err(AppError::NotFound(_))
        ));
    }
}

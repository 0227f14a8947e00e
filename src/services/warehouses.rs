//! Warehouse Service
//! 倉庫の CRUD（所有者スコープ）

use chrono::Utc;
use sqlx::SqliteConnection;
use tracing::info;

use crate::db::DbPool;
use crate::error::{AppError, AppResult};
use crate::models::{CreateWarehouseRequest, UpdateWarehouseRequest, Warehouse};

fn check_coordinates(latitude: Option<f64>, longitude: Option<f64>) -> AppResult<()> {
    if let Some(lat) = latitude {
        if !(-90.0..=90.0).contains(&lat) {
            return Err(AppError::validation("latitude must be between -90 and 90"));
        }
    }
    if let Some(lng) = longitude {
        if !(-180.0..=180.0).contains(&lng) {
            return Err(AppError::validation("longitude must be between -180 and 180"));
        }
    }
    Ok(())
}

async fn fetch(conn: &mut SqliteConnection, id: i64) -> AppResult<Option<Warehouse>> {
    let row = sqlx::query_as(
        "SELECT id, user_id, name, address, latitude, longitude, working_hours, created_at, updated_at
         FROM warehouses WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(conn)
    .await?;
    Ok(row)
}

/// Loads a warehouse the caller is about to mutate.
async fn owned_for_write(conn: &mut SqliteConnection, user_id: i64, id: i64) -> AppResult<Warehouse> {
    let warehouse = fetch(conn, id)
        .await?
        .ok_or_else(|| AppError::not_found("warehouse not found"))?;
    if warehouse.user_id != user_id {
        return Err(AppError::forbidden("warehouse belongs to another user"));
    }
    Ok(warehouse)
}

pub async fn create_warehouse(
    db: &DbPool,
    user_id: i64,
    req: CreateWarehouseRequest,
) -> AppResult<Warehouse> {
    if req.name.trim().is_empty() {
        return Err(AppError::validation("name is required"));
    }
    if req.address.trim().is_empty() {
        return Err(AppError::validation("address is required"));
    }
    check_coordinates(Some(req.latitude), Some(req.longitude))?;

    let now = Utc::now();
    let id = sqlx::query(
        r#"
        INSERT INTO warehouses (user_id, name, address, latitude, longitude, working_hours, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(user_id)
    .bind(req.name.trim())
    .bind(req.address.trim())
    .bind(req.latitude)
    .bind(req.longitude)
    .bind(&req.working_hours)
    .bind(now)
    .bind(now)
    .execute(db)
    .await?
    .last_insert_rowid();

    info!(warehouse_id = id, user_id, "Warehouse created");
    get_warehouse(db, user_id, id).await
}

/// Someone else's warehouse is reported as missing.
pub async fn get_warehouse(db: &DbPool, user_id: i64, id: i64) -> AppResult<Warehouse> {
    let mut conn = db.acquire().await?;
    match fetch(&mut conn, id).await? {
        Some(w) if w.user_id == user_id => Ok(w),
        _ => Err(AppError::not_found("warehouse not found")),
    }
}

pub async fn list_warehouses(db: &DbPool, user_id: i64) -> AppResult<Vec<Warehouse>> {
    let rows = sqlx::query_as(
        "SELECT id, user_id, name, address, latitude, longitude, working_hours, created_at, updated_at
         FROM warehouses WHERE user_id = ? ORDER BY id",
    )
    .bind(user_id)
    .fetch_all(db)
    .await?;
    Ok(rows)
}

pub async fn update_warehouse(
    db: &DbPool,
    user_id: i64,
    id: i64,
    req: UpdateWarehouseRequest,
) -> AppResult<Warehouse> {
    if matches!(&req.name, Some(n) if n.trim().is_empty()) {
        return Err(AppError::validation("name must not be empty"));
    }
    if matches!(&req.address, Some(a) if a.trim().is_empty()) {
        return Err(AppError::validation("address must not be empty"));
    }
    check_coordinates(req.latitude, req.longitude)?;

    let mut tx = db.begin().await?;
    owned_for_write(&mut tx, user_id, id).await?;
    sqlx::query(
        r#"
        UPDATE warehouses SET
            name = COALESCE(?, name),
            address = COALESCE(?, address),
            latitude = COALESCE(?, latitude),
            longitude = COALESCE(?, longitude),
            working_hours = COALESCE(?, working_hours),
            updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(req.name.as_deref().map(str::trim))
    .bind(req.address.as_deref().map(str::trim))
    .bind(req.latitude)
    .bind(req.longitude)
    .bind(&req.working_hours)
    .bind(Utc::now())
    .bind(id)
    .execute(&mut *tx)
    .await?;
    let warehouse = fetch(&mut tx, id)
        .await?
        .ok_or_else(|| AppError::internal("warehouse vanished during update"))?;
    tx.commit().await?;

    info!(warehouse_id = id, user_id, "Warehouse updated");
    Ok(warehouse)
}

pub async fn delete_warehouse(db: &DbPool, user_id: i64, id: i64) -> AppResult<()> {
    let mut tx = db.begin().await?;
    owned_for_write(&mut tx, user_id, id).await?;

    let offers: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM offers WHERE warehouse_id = ?")
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;
    if offers > 0 {
        return Err(AppError::conflict(format!(
            "warehouse is used by {} offer(s)",
            offers
        )));
    }

    sqlx::query("DELETE FROM warehouses WHERE id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    info!(warehouse_id = id, user_id, "Warehouse deleted");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;

    fn moscow() -> CreateWarehouseRequest {
        CreateWarehouseRequest {
            name: "Main".into(),
            address: "Moscow, Tverskaya 1".into(),
            latitude: 55.75,
            longitude: 37.61,
            working_hours: Some("9-18".into()),
        }
    }

    #[tokio::test]
    async fn create_validates_coordinates() {
        let pool = test_pool().await;
        let mut req = moscow();
        req.latitude = 91.0;
        assert!(matches!(
            create_warehouse(&pool, 1, req).await,
            Err(AppError::Validation(_))
        ));
        let mut req = moscow();
        req.longitude = -180.5;
        assert!(matches!(
            create_warehouse(&pool, 1, req).await,
            Err(AppError::Validation(_))
        ));
        let mut req = moscow();
        req.address = " ".into();
        assert!(matches!(
            create_warehouse(&pool, 1, req).await,
            Err(AppError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn owner_scoping() {
        let pool = test_pool().await;
        let w = create_warehouse(&pool, 1, moscow()).await.unwrap();

        assert!(matches!(
            get_warehouse(&pool, 2, w.id).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            update_warehouse(&pool, 2, w.id, UpdateWarehouseRequest::default()).await,
            Err(AppError::Forbidden(_))
        ));
        assert!(matches!(
            delete_warehouse(&pool, 2, w.id).await,
            Err(AppError::Forbidden(_))
        ));
        assert!(list_warehouses(&pool, 2).await.unwrap().is_empty());
        assert_eq!(list_warehouses(&pool, 1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn partial_update() {
        let pool = test_pool().await;
        let w = create_warehouse(&pool, 1, moscow()).await.unwrap();
        let req = UpdateWarehouseRequest {
            latitude: Some(59.93),
            ..Default::default()
        };
        let updated = update_warehouse(&pool, 1, w.id, req).await.unwrap();
        assert_eq!(updated.latitude, 59.93);
        assert_eq!(updated.longitude, 37.61);
        assert_eq!(updated.name, "Main");

        let bad = UpdateWarehouseRequest {
            longitude: Some(200.0),
            ..Default::default()
        };
        assert!(matches!(
            update_warehouse(&pool, 1, w.id, bad).await,
            Err(AppError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn delete_refuses_while_offers_exist() {
        let pool = test_pool().await;
        let w = create_warehouse(&pool, 1, moscow()).await.unwrap();
        let now = Utc::now();
        let product = sqlx::query(
            "INSERT INTO products (name, user_id, created_at, updated_at) VALUES ('P', 1, ?, ?)",
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
        .bind(product)
        .bind(w.id)
        .bind(now)
        .bind(now)
        .execute(&pool)
        .await
        .unwrap();

        assert!(matches!(
            delete_warehouse(&pool, 1, w.id).await,
            Err(AppError::Conflict(_))
        ));
        sqlx::query("DELETE FROM offers").execute(&pool).await.unwrap();
        delete_warehouse(&pool, 1, w.id).await.unwrap();
        assert!(matches!(
            get_warehouse(&pool, 1, w.id).await,
            Err(AppError::NotFound(_))
        ));
    }
}

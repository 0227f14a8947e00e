//! Order engine scenarios against a file-backed SQLite database.

use portal_trade::classifier::{ClassificationQueue, ClassificationTask, ClassifierError};
use portal_trade::db::{init_db, DbPool};
use portal_trade::error::AppError;
use portal_trade::models::{CreateOfferRequest, CreateProductRequest, CreateWarehouseRequest};
use portal_trade::services::orders::{self, OrderError};
use portal_trade::services::{offers, products, warehouses};

const SELLER: i64 = 1;
const BUYER: i64 = 2;

struct DropQueue;

impl ClassificationQueue for DropQueue {
    fn enqueue(&self, _: ClassificationTask) -> Result<(), ClassifierError> {
        Ok(())
    }
}

async fn open_db(dir: &tempfile::TempDir) -> DbPool {
    let url = format!("sqlite:{}", dir.path().join("portal.db").display());
    init_db(&url, 8).await.unwrap()
}

/// Seller offer `{price 100, 2 units per lot, lots, tax 20}`.
async fn sale_offer(db: &DbPool, lots: i64) -> i64 {
    let product = products::create_product(
        db,
        &DropQueue,
        SELLER,
        CreateProductRequest {
            name: "Сварочный аппарат инверторный".into(),
            vendor_article: format!("SW-{}", lots),
            brand: "Ресанта".into(),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    let warehouse = warehouses::create_warehouse(
        db,
        SELLER,
        CreateWarehouseRequest {
            name: "Склад".into(),
            address: "Москва".into(),
            latitude: 55.75,
            longitude: 37.61,
            working_hours: None,
        },
    )
    .await
    .unwrap();
    offers::create_offer(
        db,
        SELLER,
        CreateOfferRequest {
            product_id: Some(product.id),
            offer_type: Some("sale".into()),
            price_per_unit: Some(100.0),
            available_lots: Some(lots),
            tax_nds: Some(20),
            units_per_lot: Some(2),
            warehouse_id: Some(warehouse.id),
            is_public: Some(true),
            max_shipping_days: None,
        },
    )
    .await
    .unwrap()
    .offer_id
}

async fn available(db: &DbPool, offer_id: i64) -> i64 {
    offers::get_offer(db, offer_id).await.unwrap().available_lots
}

#[tokio::test]
async fn happy_path_reserves_stock() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_db(&dir).await;
    let offer = sale_offer(&db, 5).await;

    let order = orders::create_order(&db, BUYER, offer, 3).await.unwrap();
    assert_eq!(order.total_amount, 600.0);
    assert_eq!(order.initiator_user_id, BUYER);
    assert_eq!(order.counterparty_user_id, SELLER);
    assert_eq!(order.order_type, "buy");
    assert_eq!(order.order_status, "pending");
    assert_eq!(available(&db, offer).await, 2);
}

#[tokio::test]
async fn two_concurrent_orders_cannot_oversell() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_db(&dir).await;
    let offer = sale_offer(&db, 5).await;

    let (a, b) = tokio::join!(
        orders::create_order(&db, BUYER, offer, 3),
        orders::create_order(&db, BUYER, offer, 3),
    );
    let results = [a, b];
    let ok: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
    assert_eq!(ok.len(), 1);
    assert_eq!(ok[0].total_amount, 600.0);

    let failure = results.into_iter().find_map(Result::err).unwrap();
    assert!(matches!(
        failure,
        OrderError::InsufficientStock {
            available: 2,
            requested: 3
        }
    ));
    let err = AppError::from(failure);
    assert_eq!(err.status(), axum::http::StatusCode::BAD_REQUEST);
    assert_eq!(available(&db, offer).await, 2);
}

#[tokio::test]
async fn parallel_orders_sell_exactly_the_stock() {
    const N: usize = 12;
    const K: i64 = 5;

    let dir = tempfile::tempdir().unwrap();
    let db = open_db(&dir).await;
    let offer = sale_offer(&db, K).await;

    let mut handles = Vec::with_capacity(N);
    for i in 0..N {
        let db = db.clone();
        // distinct buyers, none of them the seller
        let buyer = 100 + i as i64;
        handles.push(tokio::spawn(async move {
            orders::create_order(&db, buyer, offer, 1).await
        }));
    }

    let mut succeeded = 0;
    let mut out_of_stock = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => succeeded += 1,
            Err(OrderError::InsufficientStock { available: 0, .. }) => out_of_stock += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    assert_eq!(succeeded, K as usize);
    assert_eq!(out_of_stock, N - K as usize);
    assert_eq!(available(&db, offer).await, 0);
}

#[tokio::test]
async fn ordering_the_last_lots_empties_the_offer() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_db(&dir).await;
    let offer = sale_offer(&db, 3).await;

    orders::create_order(&db, BUYER, offer, 3).await.unwrap();
    assert_eq!(available(&db, offer).await, 0);
    assert!(matches!(
        orders::create_order(&db, BUYER, offer, 3).await,
        Err(OrderError::InsufficientStock {
            available: 0,
            requested: 3
        })
    ));
}

#[tokio::test]
async fn status_machine_walkthrough() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_db(&dir).await;
    let offer = sale_offer(&db, 5).await;
    let order = orders::create_order(&db, BUYER, offer, 3).await.unwrap().order_id;

    let refused = orders::update_order_status(&db, BUYER, order, "delivered", None).await;
    assert!(matches!(refused, Err(OrderError::InvalidTransition { .. })));

    for (actor, status) in [(SELLER, "confirmed"), (SELLER, "shipped"), (BUYER, "delivered")] {
        let updated = orders::update_order_status(&db, actor, order, status, None)
            .await
            .unwrap();
        assert_eq!(updated.order_status, status);
        assert_eq!(updated.status_changed_by, Some(actor));
    }

    for (actor, status) in [(SELLER, "rejected"), (BUYER, "cancelled"), (SELLER, "pending")] {
        let err = orders::update_order_status(&db, actor, order, status, None)
            .await
            .unwrap_err();
        assert_eq!(
            AppError::from(err).status(),
            axum::http::StatusCode::FORBIDDEN
        );
    }
}

#[tokio::test]
async fn racing_status_updates_stay_consistent() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_db(&dir).await;
    let offer = sale_offer(&db, 5).await;
    let order = orders::create_order(&db, BUYER, offer, 1).await.unwrap().order_id;

    // confirm and cancel race; whichever lands second sees the new status
    let (confirm, cancel) = tokio::join!(
        orders::update_order_status(&db, SELLER, order, "confirmed", None),
        orders::update_order_status(&db, BUYER, order, "cancelled", None),
    );
    let final_status = orders::get_order(&db, BUYER, order).await.unwrap().order.order_status;
    match (confirm.is_ok(), cancel.is_ok()) {
        // confirmed then cancelled is a legal path
        (true, true) => assert_eq!(final_status, "cancelled"),
        (false, true) => assert_eq!(final_status, "cancelled"),
        other => panic!("unexpected outcome {:?}, final {}", other, final_status),
    }
}

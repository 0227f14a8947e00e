//! Order Service
//! 注文エンジン：在庫引当（行ロック）と注文ステータス遷移
//!
//! Order creation locks the offer row before reading its stock, so
//! concurrent orders against one offer are serialised and
//! `available_lots` never drops below zero. Status updates lock the
//! order row the same way.

use chrono::Utc;
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};
use std::str::FromStr;
use tracing::{info, warn};

use crate::db::{lock_row, DbPool, LockTable};
use crate::error::{AppError, AppResult};
use crate::models::{clamp_page, OfferType, Order, OrderDetail, OrderItem, OrderStatus, Page};

const ORDER_COLUMNS: &str = "order_id, offer_id, initiator_user_id, counterparty_user_id, order_type, \
     price_per_unit, units_per_lot, lot_count, total_amount, max_shipping_days, order_status, \
     status_reason, status_changed_at, status_changed_by, created_at, updated_at";

// ========================================
// Errors
// ========================================

#[derive(Debug, thiserror::Error)]
pub enum OrderError {
    #[error("offer not found")]
    OfferNotFound,

    #[error("order not found")]
    OrderNotFound,

    #[error("cannot order from your own offer")]
    SelfOrder,

    #[error("insufficient stock: available {available} lots, requested {requested}")]
    InsufficientStock { available: i64, requested: i64 },

    #[error("unsupported offer type '{0}'")]
    UnsupportedOfferType(String),

    #[error("lot count must be at least 1")]
    InvalidLotCount,

    #[error("unknown order status '{0}'")]
    InvalidStatus(String),

    #[error("transition from {from} to {to} is not allowed")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),
}

impl From<OrderError> for AppError {
    fn from(e: OrderError) -> Self {
        match e {
            OrderError::OfferNotFound | OrderError::OrderNotFound => AppError::not_found(e.to_string()),
            OrderError::InvalidTransition { .. } => AppError::forbidden(e.to_string()),
            OrderError::Storage(inner) => AppError::from(inner),
            other => AppError::validation(other.to_string()),
        }
    }
}

pub type OrderResult<T> = Result<T, OrderError>;

// ========================================
// State machine
// ========================================

/// Who may perform a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actor {
    Seller,
    Buyer,
    Either,
}

/// The party allowed to move an order from `from` to `to`, or `None` when
/// the edge does not exist.
pub fn allowed_actor(from: OrderStatus, to: OrderStatus) -> Option<Actor> {
    use OrderStatus::*;
    match (from, to) {
        (Pending, Confirmed) => Some(Actor::Seller),
        (Pending, Cancelled) => Some(Actor::Either),
        (Confirmed, Processing) | (Confirmed, Shipped) => Some(Actor::Seller),
        (Confirmed, Cancelled) => Some(Actor::Either),
        (Processing, Shipped) | (Processing, Rejected) => Some(Actor::Seller),
        (Shipped, Delivered) => Some(Actor::Buyer),
        (Shipped, Rejected) => Some(Actor::Seller),
        _ => None,
    }
}

/// Order role filter for listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderRole {
    Initiator,
    Counterparty,
    All,
}

impl FromStr for OrderRole {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "initiator" => Ok(OrderRole::Initiator),
            "counterparty" => Ok(OrderRole::Counterparty),
            "" | "all" => Ok(OrderRole::All),
            other => Err(AppError::validation(format!(
                "role must be one of initiator, counterparty, all (got '{}')",
                other
            ))),
        }
    }
}

// ========================================
// Queries
// ========================================

#[derive(sqlx::FromRow)]
struct LockedOffer {
    user_id: i64,
    price_per_unit: f64,
    units_per_lot: i64,
    max_shipping_days: i64,
    available_lots: i64,
    offer_type: String,
}

async fn fetch_order(conn: &mut SqliteConnection, order_id: i64) -> sqlx::Result<Option<Order>> {
    sqlx::query_as(&format!("SELECT {} FROM orders WHERE order_id = ?", ORDER_COLUMNS))
        .bind(order_id)
        .fetch_optional(conn)
        .await
}

fn is_party(order: &Order, user_id: i64) -> bool {
    order.initiator_user_id == user_id || order.counterparty_user_id == user_id
}

// ========================================
// Operations
// ========================================

/// Places an order of `lot_count` lots against `offer_id`.
///
/// The stored `initiator_user_id` is always the buyer and
/// `counterparty_user_id` the seller, whichever side placed the order.
pub async fn create_order(
    db: &DbPool,
    initiator_user_id: i64,
    offer_id: i64,
    lot_count: i64,
) -> OrderResult<Order> {
    if lot_count < 1 {
        return Err(OrderError::InvalidLotCount);
    }

    let mut tx = db.begin().await?;
    if !lock_row(&mut tx, LockTable::Offers, offer_id).await? {
        return Err(OrderError::OfferNotFound);
    }
    let offer: LockedOffer = sqlx::query_as(
        "SELECT user_id, price_per_unit, units_per_lot, max_shipping_days, available_lots, offer_type
         FROM offers WHERE offer_id = ?",
    )
    .bind(offer_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(OrderError::OfferNotFound)?;

    if offer.user_id == initiator_user_id {
        return Err(OrderError::SelfOrder);
    }
    if offer.available_lots < lot_count {
        return Err(OrderError::InsufficientStock {
            available: offer.available_lots,
            requested: lot_count,
        });
    }

    let offer_type = OfferType::from_str(&offer.offer_type)
        .map_err(|_| OrderError::UnsupportedOfferType(offer.offer_type.clone()))?;
    let (order_type, buyer, seller) = match offer_type {
        OfferType::Sale => ("buy", initiator_user_id, offer.user_id),
        OfferType::Buy => ("sell", offer.user_id, initiator_user_id),
    };

    sqlx::query("UPDATE offers SET available_lots = available_lots - ?, updated_at = ? WHERE offer_id = ?")
        .bind(lot_count)
        .bind(Utc::now())
        .bind(offer_id)
        .execute(&mut *tx)
        .await?;

    let total_amount = offer.price_per_unit * offer.units_per_lot as f64 * lot_count as f64;
    let now = Utc::now();
    let order_id = sqlx::query(
        r#"
        INSERT INTO orders (
            offer_id, initiator_user_id, counterparty_user_id, order_type, price_per_unit,
            units_per_lot, lot_count, total_amount, max_shipping_days, order_status,
            status_changed_at, status_changed_by, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(offer_id)
    .bind(buyer)
    .bind(seller)
    .bind(order_type)
    .bind(offer.price_per_unit)
    .bind(offer.units_per_lot)
    .bind(lot_count)
    .bind(total_amount)
    .bind(offer.max_shipping_days)
    .bind(OrderStatus::Pending.as_str())
    .bind(now)
    .bind(buyer)
    .bind(now)
    .bind(now)
    .execute(&mut *tx)
    .await?
    .last_insert_rowid();

    sqlx::query(
        "INSERT INTO order_items (order_id, offer_id, qty, price_per_unit, status, created_at) VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(order_id)
    .bind(offer_id)
    .bind(lot_count)
    .bind(offer.price_per_unit)
    .bind(OrderStatus::Pending.as_str())
    .bind(now)
    .execute(&mut *tx)
    .await?;

    let order = fetch_order(&mut tx, order_id)
        .await?
        .ok_or(OrderError::OrderNotFound)?;
    tx.commit().await?;

    info!(
        order_id,
        offer_id,
        buyer,
        seller,
        lot_count,
        total_amount,
        remaining_lots = offer.available_lots - lot_count,
        "🛒 Order created"
    );
    Ok(order)
}

/// Order with its items. Only the two parties can see it.
pub async fn get_order(db: &DbPool, user_id: i64, order_id: i64) -> OrderResult<OrderDetail> {
    let mut conn = db.acquire().await?;
    let order = fetch_order(&mut conn, order_id)
        .await?
        .filter(|o| is_party(o, user_id))
        .ok_or(OrderError::OrderNotFound)?;
    let order_items: Vec<OrderItem> = sqlx::query_as(
        "SELECT id, order_id, offer_id, qty, price_per_unit, status, created_at FROM order_items WHERE order_id = ? ORDER BY id",
    )
    .bind(order_id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(OrderDetail { order, order_items })
}

pub async fn list_orders(
    db: &DbPool,
    user_id: i64,
    role: OrderRole,
    status: Option<OrderStatus>,
    page: Option<i64>,
    per_page: Option<i64>,
) -> AppResult<Page<Order>> {
    let (page, limit, offset) = clamp_page(page, per_page, 20);

    fn push_filters(qb: &mut QueryBuilder<'_, Sqlite>, user_id: i64, role: OrderRole, status: Option<OrderStatus>) {
        match role {
            OrderRole::Initiator => {
                qb.push(" WHERE initiator_user_id = ").push_bind(user_id);
            }
            OrderRole::Counterparty => {
                qb.push(" WHERE counterparty_user_id = ").push_bind(user_id);
            }
            OrderRole::All => {
                qb.push(" WHERE (initiator_user_id = ")
                    .push_bind(user_id)
                    .push(" OR counterparty_user_id = ")
                    .push_bind(user_id)
                    .push(")");
            }
        }
        if let Some(s) = status {
            qb.push(" AND order_status = ").push_bind(s.as_str());
        }
    }

    let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM orders");
    push_filters(&mut count, user_id, role, status);
    let total: i64 = count.build_query_scalar().fetch_one(db).await?;

    let mut qb = QueryBuilder::<Sqlite>::new(format!("SELECT {} FROM orders", ORDER_COLUMNS));
    push_filters(&mut qb, user_id, role, status);
    qb.push(" ORDER BY created_at DESC, order_id DESC LIMIT ")
        .push_bind(limit)
        .push(" OFFSET ")
        .push_bind(offset);
    let items: Vec<Order> = qb.build_query_as().fetch_all(db).await?;

    Ok(Page {
        items,
        total,
        page,
        limit,
    })
}

/// Moves an order to `status` on behalf of `user_id`.
pub async fn update_order_status(
    db: &DbPool,
    user_id: i64,
    order_id: i64,
    status: &str,
    reason: Option<String>,
) -> OrderResult<Order> {
    let to = OrderStatus::from_str(status).map_err(OrderError::InvalidStatus)?;

    let mut tx = db.begin().await?;
    if !lock_row(&mut tx, LockTable::Orders, order_id).await? {
        return Err(OrderError::OrderNotFound);
    }
    let order = fetch_order(&mut tx, order_id)
        .await?
        .filter(|o| is_party(o, user_id))
        .ok_or(OrderError::OrderNotFound)?;
    let from = OrderStatus::from_str(&order.order_status).map_err(OrderError::InvalidStatus)?;

    let permitted = match allowed_actor(from, to) {
        Some(Actor::Seller) => user_id == order.counterparty_user_id,
        Some(Actor::Buyer) => user_id == order.initiator_user_id,
        Some(Actor::Either) => true,
        None => false,
    };
    if !permitted {
        warn!(order_id, user_id, %from, %to, "Order transition refused");
        return Err(OrderError::InvalidTransition { from, to });
    }

    let now = Utc::now();
    sqlx::query(
        r#"
        UPDATE orders SET
            order_status = ?, status_reason = ?, status_changed_by = ?,
            status_changed_at = ?, updated_at = ?
        WHERE order_id = ?
        "#,
    )
    .bind(to.as_str())
    .bind(&reason)
    .bind(user_id)
    .bind(now)
    .bind(now)
    .bind(order_id)
    .execute(&mut *tx)
    .await?;
    sqlx::query("UPDATE order_items SET status = ? WHERE order_id = ?")
        .bind(to.as_str())
        .bind(order_id)
        .execute(&mut *tx)
        .await?;

    let order = fetch_order(&mut tx, order_id)
        .await?
        .ok_or(OrderError::OrderNotFound)?;
    tx.commit().await?;

    info!(order_id, user_id, %from, %to, "Order status changed");
    Ok(order)
}

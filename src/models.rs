//! Data Models
//! Product, Offer, Warehouse, Order などのデータ構造定義

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::AppError;

// ========================================
// Envelope
// ========================================

/// 成功レスポンス `{success: true, data: ...}`
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self { success: true, data }
    }
}

/// ページング済み一覧
#[derive(Debug, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: i64,
    pub limit: i64,
}

/// page/limit を [1, 100] に丸めて OFFSET を返す
pub fn clamp_page(page: Option<i64>, limit: Option<i64>, default_limit: i64) -> (i64, i64, i64) {
    let page = page.unwrap_or(1).max(1);
    let limit = limit.unwrap_or(default_limit).clamp(1, 100);
    (page, limit, (page - 1).saturating_mul(limit))
}

// ========================================
// Product
// ========================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductStatus {
    Pending,
    Classified,
    NotClassified,
}

impl ProductStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProductStatus::Pending => "pending",
            ProductStatus::Classified => "classified",
            ProductStatus::NotClassified => "not_classified",
        }
    }
}

/// Product + media (DB row, LEFT JOIN media)
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ProductRow {
    pub id: i64,
    pub name: String,
    pub vendor_article: String,
    pub recommend_price: f64,
    pub brand: String,
    pub category: String,
    pub brand_id: Option<i64>,
    pub category_id: Option<i64>,
    pub description: String,
    pub barcode: Option<String>,
    pub user_id: i64,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub image_urls: Option<String>,
    pub video_urls: Option<String>,
    pub model_3d_urls: Option<String>,
}

/// Product（API返却用）
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub vendor_article: String,
    pub recommend_price: f64,
    pub brand: String,
    pub category: String,
    pub brand_id: Option<i64>,
    pub category_id: Option<i64>,
    pub description: String,
    pub barcode: Option<String>,
    pub user_id: i64,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub image_urls: Vec<String>,
    pub video_urls: Vec<String>,
    pub model_3d_urls: Vec<String>,
}

fn url_list(raw: Option<String>) -> Result<Vec<String>, AppError> {
    match raw {
        None => Ok(Vec::new()),
        Some(text) => serde_json::from_str(&text)
            .map_err(|e| AppError::internal(format!("corrupt media row: {}", e))),
    }
}

impl TryFrom<ProductRow> for Product {
    type Error = AppError;

    fn try_from(row: ProductRow) -> Result<Self, Self::Error> {
        Ok(Product {
            image_urls: url_list(row.image_urls)?,
            video_urls: url_list(row.video_urls)?,
            model_3d_urls: url_list(row.model_3d_urls)?,
            id: row.id,
            name: row.name,
            vendor_article: row.vendor_article,
            recommend_price: row.recommend_price,
            brand: row.brand,
            category: row.category,
            brand_id: row.brand_id,
            category_id: row.category_id,
            description: row.description,
            barcode: row.barcode,
            user_id: row.user_id,
            status: row.status,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Product 作成リクエスト
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateProductRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub vendor_article: String,
    #[serde(default)]
    pub recommend_price: f64,
    #[serde(default)]
    pub brand: String,
    #[serde(default)]
    pub category: String,
    pub category_id: Option<i64>,
    pub brand_id: Option<i64>,
    #[serde(default)]
    pub description: String,
    pub barcode: Option<String>,
    #[serde(default)]
    pub image_urls: Vec<String>,
    #[serde(default)]
    pub video_urls: Vec<String>,
    #[serde(default)]
    pub model_3d_urls: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateProductsRequest {
    pub products: Vec<CreateProductRequest>,
}

/// Product 更新リクエスト（指定されたフィールドのみ更新）
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateProductRequest {
    pub name: Option<String>,
    pub vendor_article: Option<String>,
    pub recommend_price: Option<f64>,
    pub brand: Option<String>,
    pub category: Option<String>,
    pub brand_id: Option<i64>,
    pub category_id: Option<i64>,
    pub description: Option<String>,
    pub barcode: Option<String>,
    pub image_urls: Option<Vec<String>>,
    pub video_urls: Option<Vec<String>>,
    pub model_3d_urls: Option<Vec<String>>,
}

impl UpdateProductRequest {
    pub fn has_product_fields(&self) -> bool {
        self.name.is_some()
            || self.vendor_article.is_some()
            || self.recommend_price.is_some()
            || self.brand.is_some()
            || self.category.is_some()
            || self.brand_id.is_some()
            || self.category_id.is_some()
            || self.description.is_some()
            || self.barcode.is_some()
    }

    pub fn has_media_fields(&self) -> bool {
        self.image_urls.is_some() || self.video_urls.is_some() || self.model_3d_urls.is_some()
    }
}

/// owner フィルタ（status 系は自分の商品のみ）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProductScope {
    My,
    Others,
    All,
    Pending,
    NotClassified,
    Classified,
}

impl FromStr for ProductScope {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "my" => Ok(ProductScope::My),
            "others" => Ok(ProductScope::Others),
            "" | "all" => Ok(ProductScope::All),
            "pending" => Ok(ProductScope::Pending),
            "not_classified" => Ok(ProductScope::NotClassified),
            "classified" => Ok(ProductScope::Classified),
            other => Err(AppError::validation(format!(
                "owner must be one of my, others, all, pending, not_classified, classified (got '{}')",
                other
            ))),
        }
    }
}

// ========================================
// Offer
// ========================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OfferType {
    Sale,
    Buy,
}

impl OfferType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OfferType::Sale => "sale",
            OfferType::Buy => "buy",
        }
    }
}

impl fmt::Display for OfferType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `sell`/`purchase` are accepted as synonyms.
impl FromStr for OfferType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sale" | "sell" => Ok(OfferType::Sale),
            "buy" | "purchase" => Ok(OfferType::Buy),
            other => Err(AppError::validation(format!(
                "offer_type must be sale/sell or buy/purchase (got '{}')",
                other
            ))),
        }
    }
}

/// Offer (DB row)
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Offer {
    pub offer_id: i64,
    pub user_id: i64,
    pub product_id: i64,
    pub offer_type: String,
    pub price_per_unit: f64,
    pub units_per_lot: i64,
    pub available_lots: i64,
    pub tax_nds: i64,
    pub warehouse_id: i64,
    pub is_public: bool,
    pub max_shipping_days: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 公開オファー（product / warehouse を JOIN）
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct PublicOffer {
    pub offer_id: i64,
    pub user_id: i64,
    pub product_id: i64,
    pub offer_type: String,
    pub price_per_unit: f64,
    pub units_per_lot: i64,
    pub available_lots: i64,
    pub tax_nds: i64,
    pub warehouse_id: i64,
    pub max_shipping_days: i64,
    pub created_at: DateTime<Utc>,
    pub product_name: String,
    pub vendor_article: String,
    pub recommend_price: f64,
    pub warehouse_name: String,
    pub warehouse_address: String,
    pub latitude: f64,
    pub longitude: f64,
}

/// Offer 作成リクエスト
#[derive(Debug, Clone, Deserialize)]
pub struct CreateOfferRequest {
    pub product_id: Option<i64>,
    pub offer_type: Option<String>,
    pub price_per_unit: Option<f64>,
    pub available_lots: Option<i64>,
    pub tax_nds: Option<i64>,
    pub units_per_lot: Option<i64>,
    pub warehouse_id: Option<i64>,
    pub is_public: Option<bool>,
    pub max_shipping_days: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct CreateOffersRequest {
    pub offers: Vec<CreateOfferRequest>,
}

/// Offer 更新リクエスト
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateOfferRequest {
    pub price_per_unit: Option<f64>,
    pub available_lots: Option<i64>,
    pub tax_nds: Option<i64>,
    pub units_per_lot: Option<i64>,
    pub is_public: Option<bool>,
    pub max_shipping_days: Option<i64>,
    pub warehouse_id: Option<i64>,
}

// ========================================
// Warehouse
// ========================================

/// Warehouse (DB row)
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Warehouse {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
    pub address: String,
    pub latitude: f64,
    pub longitude: f64,
    pub working_hours: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateWarehouseRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub address: String,
    pub latitude: f64,
    pub longitude: f64,
    pub working_hours: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateWarehouseRequest {
    pub name: Option<String>,
    pub address: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub working_hours: Option<String>,
}

// ========================================
// Order
// ========================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
    Rejected,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Processing => "processing",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Rejected => "rejected",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Delivered | OrderStatus::Cancelled | OrderStatus::Rejected
        )
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(OrderStatus::Pending),
            "confirmed" => Ok(OrderStatus::Confirmed),
            "processing" => Ok(OrderStatus::Processing),
            "shipped" => Ok(OrderStatus::Shipped),
            "delivered" => Ok(OrderStatus::Delivered),
            "cancelled" => Ok(OrderStatus::Cancelled),
            "rejected" => Ok(OrderStatus::Rejected),
            other => Err(other.to_string()),
        }
    }
}

/// Order (DB row)
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Order {
    pub order_id: i64,
    pub offer_id: i64,
    pub initiator_user_id: i64,
    pub counterparty_user_id: i64,
    pub order_type: String,
    pub price_per_unit: f64,
    pub units_per_lot: i64,
    pub lot_count: i64,
    pub total_amount: f64,
    pub max_shipping_days: i64,
    pub order_status: String,
    pub status_reason: Option<String>,
    pub status_changed_at: Option<DateTime<Utc>>,
    pub status_changed_by: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// OrderItem (DB row)
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct OrderItem {
    pub id: i64,
    pub order_id: i64,
    pub offer_id: i64,
    pub qty: i64,
    pub price_per_unit: f64,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

/// Order + items
#[derive(Debug, Serialize)]
pub struct OrderDetail {
    pub order: Order,
    pub order_items: Vec<OrderItem>,
}

/// Order 作成リクエスト（`lot_count` は `quantity` の別名）
#[derive(Debug, Clone, Deserialize)]
pub struct CreateOrderRequest {
    pub offer_id: i64,
    #[serde(alias = "lot_count")]
    pub quantity: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateOrderStatusRequest {
    pub status: String,
    pub reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offer_type_synonyms_canonicalise() {
        assert_eq!("sell".parse::<OfferType>().unwrap(), OfferType::Sale);
        assert_eq!(" SALE ".parse::<OfferType>().unwrap(), OfferType::Sale);
        assert_eq!("purchase".parse::<OfferType>().unwrap(), OfferType::Buy);
        assert!("rent".parse::<OfferType>().is_err());
    }

    #[test]
    fn order_status_parsing_and_terminals() {
        assert_eq!("Shipped".parse::<OrderStatus>().unwrap(), OrderStatus::Shipped);
        assert!("lost".parse::<OrderStatus>().is_err());
        assert!(OrderStatus::Rejected.is_terminal());
        assert!(!OrderStatus::Shipped.is_terminal());
    }

    #[test]
    fn page_bounds_are_clamped() {
        assert_eq!(clamp_page(None, None, 20), (1, 20, 0));
        assert_eq!(clamp_page(Some(0), Some(500), 20), (1, 100, 0));
        let (page, _, offset) = clamp_page(Some(i64::MAX), Some(50), 20);
        assert_eq!(page, i64::MAX);
        assert_eq!(offset, i64::MAX);
        assert_eq!(clamp_page(Some(3), Some(0), 20), (3, 1, 2));
    }

    #[test]
    fn order_request_accepts_lot_count_alias() {
        let req: CreateOrderRequest =
            serde_json::from_str(r#"{"offer_id": 1, "lot_count": 2}"#).unwrap();
        assert_eq!(req.quantity, 2);
    }

    #[test]
    fn product_scope_defaults_to_all() {
        assert_eq!("".parse::<ProductScope>().unwrap(), ProductScope::All);
        assert!("mine".parse::<ProductScope>().is_err());
    }
}

//! WB Stock Module
//! サプライヤー別 WB 在庫キャッシュファイルの読み取り
//!
//! Layout: `<root>/<supplier_id>/product_<product_id>.json`.

use serde::Deserialize;
use std::path::PathBuf;
use tokio::fs;
use tracing::debug;

use crate::error::{AppError, AppResult};

#[derive(Debug, Deserialize)]
struct StockFile {
    #[serde(default)]
    sizes: Vec<Size>,
}

#[derive(Debug, Deserialize)]
struct Size {
    #[serde(default)]
    stocks: Vec<Stock>,
}

#[derive(Debug, Deserialize)]
struct Stock {
    wh: i64,
    qty: i64,
}

#[derive(Debug, Clone)]
pub struct WbStockReader {
    root: PathBuf,
}

impl WbStockReader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn product_file(&self, supplier_id: i64, product_id: i64) -> PathBuf {
        self.root
            .join(supplier_id.to_string())
            .join(format!("product_{}.json", product_id))
    }

    /// Quantity of `product_id` held in `warehouse_id`, summed over sizes.
    pub async fn quantity(&self, product_id: i64, warehouse_id: i64, supplier_id: i64) -> AppResult<i64> {
        let path = self.product_file(supplier_id, product_id);
        let raw = match fs::read(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(AppError::not_found("no WB stock cache for this product"));
            }
            Err(e) => {
                return Err(AppError::internal(format!("read {:?}: {}", path, e)));
            }
        };

        let file: StockFile = serde_json::from_slice(&raw)
            .map_err(|e| AppError::internal(format!("parse {:?}: {}", path, e)))?;

        let total: i64 = file
            .sizes
            .iter()
            .filter_map(|size| size.stocks.iter().find(|s| s.wh == warehouse_id))
            .map(|s| s.qty)
            .sum();
        debug!(product_id, warehouse_id, supplier_id, total, "WB stock read");
        Ok(total)
    }
}

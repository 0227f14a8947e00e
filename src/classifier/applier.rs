//! Writes classifier answers back onto product rows.

use async_trait::async_trait;
use chrono::Utc;
use tracing::{info, warn};

use super::result::{decide, ClassificationResult, Outcome};
use super::ResultHandler;
use crate::cache::ProductCache;
use crate::db::{lock_row, DbPool, LockTable};
use crate::models::ProductStatus;

pub struct ClassificationApplier {
    db: DbPool,
    cache: Option<ProductCache>,
    min_confidence: f64,
}

impl ClassificationApplier {
    pub fn new(db: DbPool, cache: Option<ProductCache>, min_confidence: f64) -> Self {
        Self {
            db,
            cache,
            min_confidence,
        }
    }

    /// Applies one answer in a single transaction. Returns the outcome that
    /// was written (`Unchanged` also when the product no longer exists).
    pub async fn apply(&self, product_id: i64, result: &ClassificationResult) -> sqlx::Result<Outcome> {
        let outcome = decide(result, self.min_confidence);
        if outcome == Outcome::Unchanged {
            info!(product_id, status = %result.status, "Classifier found nothing, product stays pending");
            return Ok(outcome);
        }

        let mut tx = self.db.begin().await?;
        if !lock_row(&mut tx, LockTable::Products, product_id).await? {
            warn!(product_id, "Classified product no longer exists");
            return Ok(Outcome::Unchanged);
        }

        let now = Utc::now();
        match outcome {
            Outcome::Classified {
                category_id,
                brand_id,
            } => {
                sqlx::query(
                    "UPDATE products SET status = ?, category_id = ?, brand_id = ?, updated_at = ? WHERE id = ?",
                )
                .bind(ProductStatus::Classified.as_str())
                .bind(category_id)
                .bind(brand_id)
                .bind(now)
                .bind(product_id)
                .execute(&mut *tx)
                .await?;
            }
            Outcome::NotClassified => {
                sqlx::query("UPDATE products SET status = ?, updated_at = ? WHERE id = ?")
                    .bind(ProductStatus::NotClassified.as_str())
                    .bind(now)
                    .bind(product_id)
                    .execute(&mut *tx)
                    .await?;
            }
            Outcome::Unchanged => {}
        }
        tx.commit().await?;

        if let Some(cache) = &self.cache {
            cache.invalidate(product_id).await;
        }
        info!(product_id, ?outcome, "📊 Classification applied");
        Ok(outcome)
    }
}

#[async_trait]
impl ResultHandler for ClassificationApplier {
    async fn handle(&self, product_id: i64, result: &ClassificationResult) -> anyhow::Result<()> {
        self.apply(product_id, result).await?;
        Ok(())
    }
}

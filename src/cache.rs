//! Product read cache on top of the counter store (`product:<id>`).
//!
//! Every failure here is logged and swallowed; the database stays the
//! source of truth.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::counter::KeyStore;
use crate::models::Product;

static GENERATION_SEQ: AtomicU64 = AtomicU64::new(0);

#[derive(Clone)]
pub struct ProductCache {
    store: Arc<dyn KeyStore>,
    ttl: Duration,
}

pub fn product_key(id: i64) -> String {
    format!("product:{}", id)
}

fn generation_key(id: i64) -> String {
    format!("product:{}:gen", id)
}

/// A cached row is tagged with the generation that was current before the
/// row was read. Invalidation moves the generation, so a fill that read
/// the database before an invalidation never becomes visible after it.
#[derive(Debug, Serialize, Deserialize)]
struct CachedProduct {
    generation: Option<String>,
    product: Product,
}

/// Taken before reading the database; required to fill the cache.
#[derive(Debug)]
pub struct FillTicket {
    id: i64,
    generation: Option<String>,
}

impl ProductCache {
    pub fn new(store: Arc<dyn KeyStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    async fn current_generation(&self, id: i64) -> Option<Option<String>> {
        match self.store.get_raw(&generation_key(id)).await {
            Ok(generation) => Some(generation),
            Err(e) => {
                warn!(product_id = id, error = %e, "Product cache generation read failed");
                None
            }
        }
    }

    pub async fn get(&self, id: i64) -> Option<Product> {
        let raw = match self.store.get_raw(&product_key(id)).await {
            Ok(raw) => raw?,
            Err(e) => {
                warn!(product_id = id, error = %e, "Product cache read failed");
                return None;
            }
        };
        let cached: CachedProduct = match serde_json::from_str(&raw) {
            Ok(cached) => cached,
            Err(e) => {
                warn!(product_id = id, error = %e, "Dropping undecodable product cache entry");
                self.drop_entry(id).await;
                return None;
            }
        };
        if self.current_generation(id).await? != cached.generation {
            debug!(product_id = id, "Ignoring product cache entry from an older generation");
            return None;
        }
        debug!(product_id = id, "Product cache hit");
        Some(cached.product)
    }

    /// `None` when the generation cannot be read; the caller then skips the fill.
    pub async fn ticket(&self, id: i64) -> Option<FillTicket> {
        let generation = self.current_generation(id).await?;
        Some(FillTicket { id, generation })
    }

    pub async fn fill(&self, ticket: FillTicket, product: &Product) {
        let id = ticket.id;
        let cached = CachedProduct {
            generation: ticket.generation,
            product: product.clone(),
        };
        let raw = match serde_json::to_string(&cached) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(product_id = id, error = %e, "Product cache encode failed");
                return;
            }
        };
        if let Err(e) = self.store.set_with_ttl(&product_key(id), &raw, self.ttl).await {
            warn!(product_id = id, error = %e, "Product cache write failed");
        }
    }

    pub async fn invalidate(&self, id: i64) {
        let generation = format!(
            "{}-{}",
            Utc::now().timestamp_nanos_opt().unwrap_or_default(),
            GENERATION_SEQ.fetch_add(1, Ordering::Relaxed)
        );
        // outlives any entry filled under the previous generation
        if let Err(e) = self
            .store
            .set_with_ttl(&generation_key(id), &generation, self.ttl * 2)
            .await
        {
            warn!(product_id = id, error = %e, "Product cache generation bump failed");
        }
        self.drop_entry(id).await;
    }

    async fn drop_entry(&self, id: i64) {
        if let Err(e) = self.store.del(&[product_key(id)]).await {
            warn!(product_id = id, error = %e, "Product cache invalidation failed");
        }
    }
}

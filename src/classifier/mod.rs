//! Classifier Module
//! 外部 catformat API による商品分類（バウンデッドキュー + 単一ワーカー）
//!
//! Products are handed to [`ClassifierClient::enqueue`] after creation. A
//! single worker task calls the upstream API one task at a time, with a
//! per-task deadline and a pause between tasks, and passes each answer to a
//! [`ResultHandler`]. Failed calls are logged and dropped; the product simply
//! stays `pending`.

pub mod applier;
pub mod result;

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::config::ClassifierConfig;

pub use applier::ClassificationApplier;
pub use result::{decide, ClassificationResult, ClassifierId, Outcome};

// ========================================
// Types
// ========================================

/// One product waiting for classification.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationTask {
    pub product_id: i64,
    pub product_name: String,
    pub user_id: i64,
    pub user_category: String,
    pub brand: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ClassifierError {
    #[error("classification queue is full")]
    QueueFull,

    #[error("classifier is shut down")]
    Closed,

    #[error("classifier request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("classifier returned status {0}")]
    Status(u16),

    #[error("classifier response is not valid JSON: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("classifier did not answer within {0:?}")]
    Timeout(Duration),
}

/// Where product services hand off new products.
pub trait ClassificationQueue: Send + Sync {
    /// Never blocks; a full or closed queue is an error.
    fn enqueue(&self, task: ClassificationTask) -> Result<(), ClassifierError>;
}

#[async_trait]
pub trait ResultHandler: Send + Sync {
    async fn handle(&self, product_id: i64, result: &ClassificationResult) -> anyhow::Result<()>;
}

// ========================================
// Upstream API
// ========================================

#[derive(Clone)]
struct CatformatApi {
    http: reqwest::Client,
    endpoint: String,
}

impl CatformatApi {
    fn new(base_url: &str) -> Result<Self, ClassifierError> {
        let http = reqwest::Client::builder().build()?;
        Ok(Self {
            http,
            endpoint: format!("{}/products/catformat.php", base_url.trim_end_matches('/')),
        })
    }

    async fn classify(&self, task: &ClassificationTask) -> Result<ClassificationResult, ClassifierError> {
        let user = task.user_id.to_string();
        let response = self
            .http
            .get(&self.endpoint)
            .query(&[
                ("product_name", task.product_name.as_str()),
                ("user", user.as_str()),
                ("user_category", task.user_category.as_str()),
                ("brand", task.brand.as_str()),
                ("findbrand", "1"),
                ("findcat", "1"),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ClassifierError::Status(status.as_u16()));
        }
        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }
}

// ========================================
// Client
// ========================================

pub struct ClassifierClient {
    sender: Mutex<Option<mpsc::Sender<ClassificationTask>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl ClassifierClient {
    /// Spawns the worker. Must be called inside a tokio runtime.
    pub fn start(
        config: ClassifierConfig,
        handler: Arc<dyn ResultHandler>,
    ) -> Result<Arc<Self>, ClassifierError> {
        let api = CatformatApi::new(&config.api_base_url)?;
        let (tx, rx) = mpsc::channel(config.queue_size.max(1));
        let worker = tokio::spawn(run_worker(api, rx, handler, config.http_timeout, config.request_delay));

        info!(
            base_url = %config.api_base_url,
            queue_size = config.queue_size,
            "🚀 Classifier worker started"
        );
        Ok(Arc::new(Self {
            sender: Mutex::new(Some(tx)),
            worker: Mutex::new(Some(worker)),
        }))
    }

    /// Closes the queue and waits until the worker has drained it.
    pub async fn shutdown(&self) {
        let sender = match self.sender.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        drop(sender);

        let worker = match self.worker.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(handle) = worker {
            if let Err(e) = handle.await {
                error!(error = %e, "Classifier worker panicked");
            }
        }
        info!("🔒 Classifier closed");
    }
}

impl ClassificationQueue for ClassifierClient {
    fn enqueue(&self, task: ClassificationTask) -> Result<(), ClassifierError> {
        let guard = match self.sender.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let sender = guard.as_ref().ok_or(ClassifierError::Closed)?;
        let product_id = task.product_id;
        match sender.try_send(task) {
            Ok(()) => {
                info!(product_id, "✅ Classification task queued");
                Ok(())
            }
            Err(TrySendError::Full(_)) => Err(ClassifierError::QueueFull),
            Err(TrySendError::Closed(_)) => Err(ClassifierError::Closed),
        }
    }
}

async fn run_worker(
    api: CatformatApi,
    mut rx: mpsc::Receiver<ClassificationTask>,
    handler: Arc<dyn ResultHandler>,
    deadline: Duration,
    pace: Duration,
) {
    while let Some(task) = rx.recv().await {
        info!(product_id = task.product_id, name = %task.product_name, "🔍 Classifying product");

        let outcome = match tokio::time::timeout(deadline, api.classify(&task)).await {
            Ok(result) => result,
            Err(_) => Err(ClassifierError::Timeout(deadline)),
        };

        match outcome {
            Ok(result) => {
                if let Err(e) = handler.handle(task.product_id, &result).await {
                    error!(product_id = task.product_id, error = %e, "❌ Failed to apply classification");
                }
            }
            Err(e) => {
                warn!(product_id = task.product_id, error = %e, "❌ Classification failed");
            }
        }

        tokio::time::sleep(pace).await;
    }
    info!("🔒 Classification queue closed, worker exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{extract::Query, routing::get, Json, Router};
    use std::collections::HashMap;
    use tokio::sync::Mutex as AsyncMutex;

    #[derive(Default)]
    struct Recorder {
        seen: AsyncMutex<Vec<(i64, ClassificationResult)>>,
    }

    #[async_trait]
    impl ResultHandler for Recorder {
        async fn handle(&self, product_id: i64, result: &ClassificationResult) -> anyhow::Result<()> {
            self.seen.lock().await.push((product_id, result.clone()));
            Ok(())
        }
    }

    async fn catformat(Query(q): Query<HashMap<String, String>>) -> Json<serde_json::Value> {
        let ok = q.get("findbrand").map(String::as_str) == Some("1")
            && q.get("findcat").map(String::as_str) == Some("1");
        Json(serde_json::json!({
            "status": if ok { "found" } else { "bad_request" },
            "request": q.get("product_name").cloned().unwrap_or_default(),
            "found_category_id": "1318",
            "brand_id": 42,
            "accuracy": 0.995,
            "brand_accuracy": 0.99,
            "user": q.get("user").cloned().unwrap_or_default(),
        }))
    }

    async fn spawn_upstream() -> String {
        let app = Router::new().route("/products/catformat.php", get(catformat));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn task(id: i64) -> ClassificationTask {
        ClassificationTask {
            product_id: id,
            product_name: format!("Product {}", id),
            user_id: 5,
            user_category: "tools".into(),
            brand: "Acme".into(),
        }
    }

    fn config(base: String, queue_size: usize) -> ClassifierConfig {
        ClassifierConfig {
            api_base_url: base,
            http_timeout: Duration::from_secs(5),
            queue_size,
            request_delay: Duration::from_millis(1),
            min_confidence: 0.99,
        }
    }

    #[tokio::test]
    async fn worker_drains_queue_on_shutdown() {
        let base = spawn_upstream().await;
        let recorder = Arc::new(Recorder::default());
        let client = ClassifierClient::start(config(base, 10), recorder.clone()).unwrap();

        for id in 1..=3 {
            client.enqueue(task(id)).unwrap();
        }
        client.shutdown().await;

        let seen = recorder.seen.lock().await;
        let ids: Vec<i64> = seen.iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(seen[0].1.status, "found");
        assert_eq!(seen[0].1.request.as_deref(), Some("Product 1"));
        assert_eq!(seen[0].1.user.as_deref(), Some("5"));

        assert!(matches!(client.enqueue(task(4)), Err(ClassifierError::Closed)));
    }

    #[tokio::test]
    async fn unreachable_upstream_is_absorbed() {
        // Nothing listens on port 9 on a test box; the call fails and the
        // worker moves on without reporting a result.
        let recorder = Arc::new(Recorder::default());
        let client = ClassifierClient::start(config("http://127.0.0.1:9".into(), 10), recorder.clone()).unwrap();
        client.enqueue(task(1)).unwrap();
        client.shutdown().await;
        assert!(recorder.seen.lock().await.is_empty());
    }

    #[tokio::test]
    async fn full_queue_rejects_without_blocking() {
        // A handler that never finishes keeps the worker busy on the first task.
        struct Stuck;
        #[async_trait]
        impl ResultHandler for Stuck {
            async fn handle(&self, _: i64, _: &ClassificationResult) -> anyhow::Result<()> {
                std::future::pending::<()>().await;
                Ok(())
            }
        }

        let base = spawn_upstream().await;
        let client = ClassifierClient::start(config(base, 1), Arc::new(Stuck)).unwrap();

        let mut full = false;
        for id in 0..10 {
            if let Err(ClassifierError::QueueFull) = client.enqueue(task(id)) {
                full = true;
                break;
            }
        }
        assert!(full);
    }
}

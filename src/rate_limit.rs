//! Rate Limit Module
//! API キー × エンドポイントクラス × ウィンドウ（minute/day）のカウンタ制御
//!
//! Counter keys have the form `rate_limit:<api_key>:<class>:<window>`, with
//! `window` one of `minute`, `day` or `last_request`. Non-GET requests are
//! never gated by the day window and never consume it.

use async_trait::async_trait;
use axum::{
    extract::{Request, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use serde_json::json;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, error, warn};

use crate::auth::extract_api_key;
use crate::counter::{
    next_day_boundary, next_minute_boundary, ttl_until, Clock, KeyStore, StoreResult,
    WindowCounter,
};
use crate::db::DbPool;
use crate::error::{AppError, AppResult};

// ========================================
// Limits
// ========================================

/// Rate-limit bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EndpointClass {
    All,
    Public,
}

impl EndpointClass {
    pub const ALL: [EndpointClass; 2] = [EndpointClass::All, EndpointClass::Public];

    pub fn as_str(&self) -> &'static str {
        match self {
            EndpointClass::All => "all",
            EndpointClass::Public => "public",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Limits {
    pub minute: i64,
    pub day: i64,
}

/// Default limits per endpoint class, used when no tariff applies.
#[derive(Debug, Clone, Copy)]
pub struct ClassLimits {
    pub all: Limits,
    pub public: Limits,
}

impl ClassLimits {
    pub fn for_class(&self, class: EndpointClass) -> Limits {
        match class {
            EndpointClass::All => self.all,
            EndpointClass::Public => self.public,
        }
    }
}

/// Resolves an API key to its tariff limits.
#[async_trait]
pub trait TariffSource: Send + Sync {
    async fn limits_for(&self, api_key: &str) -> anyhow::Result<Option<Limits>>;
}

/// Tariff lookup through `users.api_token → tariffs`.
pub struct SqlTariffSource {
    db: DbPool,
}

impl SqlTariffSource {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl TariffSource for SqlTariffSource {
    async fn limits_for(&self, api_key: &str) -> anyhow::Result<Option<Limits>> {
        let row: Option<(i64, i64)> = sqlx::query_as(
            r#"
            SELECT t.minute_limit, t.day_limit
            FROM users u
            JOIN tariffs t ON t.id = u.tariff_id
            WHERE u.api_token = ? AND u.is_active = 1 AND t.is_active = 1
            "#,
        )
        .bind(api_key)
        .fetch_optional(&self.db)
        .await?;

        Ok(row
            .filter(|(minute, day)| *minute > 0 && *day > 0)
            .map(|(minute, day)| Limits { minute, day }))
    }
}

// ========================================
// Check
// ========================================

/// Outcome of one [`RateLimiter::check`]. The used counts are the values
/// read before this request was counted.
#[derive(Debug, Clone, Serialize)]
pub struct RateLimitCheck {
    pub allowed: bool,
    pub minute_limit: i64,
    pub day_limit: i64,
    pub minute_used: i64,
    pub day_used: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip)]
    pub is_get: bool,
}

impl RateLimitCheck {
    pub fn remaining_minute(&self) -> i64 {
        let consumed = if self.allowed { 1 } else { 0 };
        (self.minute_limit - self.minute_used - consumed).max(0)
    }

    pub fn remaining_day(&self) -> i64 {
        let consumed = if self.allowed && self.is_get { 1 } else { 0 };
        (self.day_limit - self.day_used - consumed).max(0)
    }
}

fn counter_key(api_key: &str, class: EndpointClass, window: &str) -> String {
    format!("rate_limit:{}:{}:{}", api_key, class.as_str(), window)
}

pub struct RateLimiter {
    store: Arc<dyn KeyStore>,
    tariffs: Arc<dyn TariffSource>,
    defaults: ClassLimits,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    pub fn new(
        store: Arc<dyn KeyStore>,
        tariffs: Arc<dyn TariffSource>,
        defaults: ClassLimits,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            tariffs,
            defaults,
            clock,
        }
    }

    pub fn store(&self) -> &Arc<dyn KeyStore> {
        &self.store
    }

    /// Tariff limits for the key, or the class defaults when there is no
    /// tariff or the lookup fails.
    pub async fn resolve_limits(&self, api_key: &str, class: EndpointClass) -> Limits {
        match self.tariffs.limits_for(api_key).await {
            Ok(Some(limits)) => limits,
            Ok(None) => self.defaults.for_class(class),
            Err(e) => {
                debug!(api_key = %api_key, error = %e, "Tariff lookup failed, using defaults");
                self.defaults.for_class(class)
            }
        }
    }

    pub async fn check(
        &self,
        api_key: &str,
        class: EndpointClass,
        is_get: bool,
    ) -> StoreResult<RateLimitCheck> {
        let minute_key = counter_key(api_key, class, "minute");
        let day_key = counter_key(api_key, class, "day");
        let limits = self.resolve_limits(api_key, class).await;

        let now = self.clock.now();
        let day_ttl = ttl_until(next_day_boundary(now), now);
        let mut windows = vec![WindowCounter {
            key: minute_key,
            limit: limits.minute,
            ttl: ttl_until(next_minute_boundary(now), now),
        }];
        // only GET requests count against the daily window
        if is_get {
            windows.push(WindowCounter {
                key: day_key.clone(),
                limit: limits.day,
                ttl: day_ttl,
            });
        }

        let admission = self.store.admit(&windows).await?;
        let minute_used = admission.used.first().copied().unwrap_or_default();
        let day_used = match admission.used.get(1) {
            Some(&used) => used,
            None => self.store.get(&day_key).await?,
        };

        let mut check = RateLimitCheck {
            allowed: admission.denied_by.is_none(),
            minute_limit: limits.minute,
            day_limit: limits.day,
            minute_used,
            day_used,
            message: None,
            is_get,
        };

        match admission.denied_by {
            Some(0) => {
                check.message = Some(format!(
                    "Minute limit exceeded: {} requests per minute",
                    limits.minute
                ));
            }
            Some(_) => {
                check.message = Some(format!(
                    "Daily limit exceeded: {} GET requests per day",
                    limits.day
                ));
            }
            None => {
                self.store
                    .set_with_ttl(
                        &counter_key(api_key, class, "last_request"),
                        &now.to_rfc3339(),
                        day_ttl,
                    )
                    .await?;
            }
        }

        Ok(check)
    }

    // ========================================
    // Introspection
    // ========================================

    pub async fn key_info(&self, api_key: &str) -> StoreResult<ApiKeyInfo> {
        let mut endpoints = Vec::with_capacity(EndpointClass::ALL.len());
        let mut total_requests = 0;
        let mut last_request: Option<String> = None;

        for class in EndpointClass::ALL {
            let minute_count = self.store.get(&counter_key(api_key, class, "minute")).await?;
            let day_count = self.store.get(&counter_key(api_key, class, "day")).await?;
            let stamp = self
                .store
                .get_raw(&counter_key(api_key, class, "last_request"))
                .await?;

            total_requests += day_count;
            // RFC 3339 stamps in UTC compare correctly as strings.
            if stamp.as_deref() > last_request.as_deref() {
                last_request = stamp.clone();
            }
            endpoints.push(EndpointUsage {
                class,
                minute_count,
                day_count,
                last_request: stamp,
            });
        }

        Ok(ApiKeyInfo {
            api_key: api_key.to_string(),
            endpoints,
            total_requests,
            last_request,
        })
    }

    pub async fn key_stats(&self, api_key: &str) -> StoreResult<ApiKeyStats> {
        let info = self.key_info(api_key).await?;
        let limits = self.resolve_limits(api_key, EndpointClass::All).await;
        Ok(ApiKeyStats { info, limits })
    }

    /// Distinct API keys with live counters under `rate_limit:<pattern>:*`.
    pub async fn search(&self, pattern: &str) -> StoreResult<Vec<String>> {
        let keys = self
            .store
            .scan(&format!("rate_limit:{}:*", pattern))
            .await?;
        Ok(api_keys_of(&keys))
    }

    pub async fn stats(&self) -> StoreResult<RateLimitStats> {
        let keys = self.store.scan("rate_limit:*").await?;
        let active = api_keys_of(&keys);
        Ok(RateLimitStats {
            total_keys: keys.len(),
            total_api_keys: active.len(),
            active_api_keys: active,
            backend: self.store.backend(),
        })
    }

    pub async fn top(&self, limit: Option<i64>) -> StoreResult<TopApiKeys> {
        let limit = limit.filter(|l| *l > 0).unwrap_or(10).min(100) as usize;
        let all_keys = self.search("*").await?;

        let mut usage = Vec::with_capacity(all_keys.len());
        for api_key in &all_keys {
            let info = self.key_info(api_key).await?;
            let all = info.endpoints.iter().find(|e| e.class == EndpointClass::All);
            usage.push(ApiKeyUsage {
                api_key: api_key.clone(),
                total_requests: info.total_requests,
                minute_count: all.map(|e| e.minute_count).unwrap_or(0),
                day_count: all.map(|e| e.day_count).unwrap_or(0),
            });
        }
        usage.sort_by(|a, b| {
            b.total_requests
                .cmp(&a.total_requests)
                .then_with(|| a.api_key.cmp(&b.api_key))
        });
        usage.truncate(limit);

        Ok(TopApiKeys {
            top_api_keys: usage,
            limit,
            total_found: all_keys.len(),
        })
    }

    pub async fn reset(&self, api_key: &str, scope: ResetScope) -> StoreResult<u64> {
        let windows: &[&str] = match scope {
            ResetScope::All => &["minute", "day", "last_request"],
            ResetScope::Minute => &["minute"],
            ResetScope::Day => &["day"],
        };
        let keys: Vec<String> = EndpointClass::ALL
            .iter()
            .flat_map(|class| windows.iter().map(move |w| counter_key(api_key, *class, w)))
            .collect();
        self.store.del(&keys).await
    }
}

fn api_keys_of(keys: &[String]) -> Vec<String> {
    keys.iter()
        .filter_map(|k| k.split(':').nth(1))
        .map(str::to_string)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResetScope {
    All,
    Minute,
    Day,
}

impl std::str::FromStr for ResetScope {
    type Err = AppError;

    fn from_str(s: &str) -> AppResult<Self> {
        match s {
            "" | "all" => Ok(ResetScope::All),
            "minute" => Ok(ResetScope::Minute),
            "day" => Ok(ResetScope::Day),
            other => Err(AppError::validation(format!(
                "type must be one of all, minute, day (got '{}')",
                other
            ))),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct EndpointUsage {
    pub class: EndpointClass,
    pub minute_count: i64,
    pub day_count: i64,
    pub last_request: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ApiKeyInfo {
    pub api_key: String,
    pub endpoints: Vec<EndpointUsage>,
    pub total_requests: i64,
    pub last_request: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ApiKeyStats {
    #[serde(flatten)]
    pub info: ApiKeyInfo,
    pub limits: Limits,
}

#[derive(Debug, Serialize)]
pub struct RateLimitStats {
    pub total_keys: usize,
    pub total_api_keys: usize,
    pub active_api_keys: Vec<String>,
    pub backend: &'static str,
}

#[derive(Debug, Serialize)]
pub struct ApiKeyUsage {
    pub api_key: String,
    pub total_requests: i64,
    pub minute_count: i64,
    pub day_count: i64,
}

#[derive(Debug, Serialize)]
pub struct TopApiKeys {
    pub top_api_keys: Vec<ApiKeyUsage>,
    pub limit: usize,
    pub total_found: usize,
}

// ========================================
// Middleware
// ========================================

const PUBLIC_OFFERS_PATH: &str = "/api/v1/offers/public";
const PUBLIC_OFFERS_KEY: &str = "public_offers";
const ANONYMOUS_KEY: &str = "anonymous";

fn is_exempt(path: &str) -> bool {
    path == "/" || path == "/api/health" || path.starts_with("/api/v1/rate-limit")
}

fn apply_headers(headers: &mut HeaderMap, check: &RateLimitCheck) {
    let pairs = [
        ("x-ratelimit-limit-minute", check.minute_limit),
        ("x-ratelimit-limit-day", check.day_limit),
        ("x-ratelimit-remaining-minute", check.remaining_minute()),
        ("x-ratelimit-remaining-day", check.remaining_day()),
        ("x-ratelimit-reset-minute", 60),
        ("x-ratelimit-reset-day", 86_400),
    ];
    for (name, value) in pairs {
        headers.insert(name, HeaderValue::from(value));
    }
}

fn limit_exceeded(check: &RateLimitCheck) -> Response {
    let body = json!({
        "error": "Rate limit exceeded",
        "message": check.message.clone().unwrap_or_default(),
        "limits": {
            "minute": {
                "limit": check.minute_limit,
                "used": check.minute_used,
                "remaining": check.remaining_minute(),
            },
            "day": {
                "limit": check.day_limit,
                "used": check.day_used,
                "remaining": check.remaining_day(),
            },
        },
    });
    (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response()
}

/// Axum middleware gating every request through [`RateLimiter::check`].
pub async fn middleware(
    State(limiter): State<Arc<RateLimiter>>,
    req: Request,
    next: Next,
) -> Response {
    let path = req.uri().path().to_string();
    if is_exempt(&path) {
        return next.run(req).await;
    }

    let (api_key, class) = if path == PUBLIC_OFFERS_PATH {
        (PUBLIC_OFFERS_KEY.to_string(), EndpointClass::Public)
    } else {
        let key = extract_api_key(req.headers(), req.uri())
            .unwrap_or_else(|| ANONYMOUS_KEY.to_string());
        (key, EndpointClass::All)
    };
    let is_get = req.method() == axum::http::Method::GET;

    let check = match limiter.check(&api_key, class, is_get).await {
        Ok(check) => check,
        Err(e) => {
            error!(error = %e, "Rate limit check failed");
            return AppError::internal(format!("rate limit check failed: {}", e)).into_response();
        }
    };

    if !check.allowed {
        warn!(api_key = %api_key, class = class.as_str(), "Rate limit exceeded");
        let mut response = limit_exceeded(&check);
        apply_headers(response.headers_mut(), &check);
        return response;
    }

    let mut response = next.run(req).await;
    apply_headers(response.headers_mut(), &check);
    response
}

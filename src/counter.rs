//! Counter Store Module
//! レート制限カウンタと商品キャッシュ用のキー・バリューストア
//!
//! Two backends share the [`KeyStore`] contract: Redis (preferred) and an
//! in-process map used when Redis is not configured or unreachable. Both
//! set a key's TTL only when the key is created, so a counter always
//! expires at the window boundary that was current when it was born.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, DurationRound, Utc};
use once_cell::sync::Lazy;
use redis::{aio::ConnectionManager, AsyncCommands};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::info;

// ========================================
// Errors
// ========================================

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("value at {key} is not an integer: {value}")]
    Corrupt { key: String, value: String },

    #[error("redis {op} timed out after {after:?}")]
    Timeout { op: &'static str, after: Duration },
}

pub type StoreResult<T> = Result<T, StoreError>;

// ========================================
// Clock
// ========================================

/// Source of "now" for window arithmetic.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self { now: Mutex::new(start) }
    }

    pub fn set(&self, at: DateTime<Utc>) {
        if let Ok(mut now) = self.now.lock() {
            *now = at;
        }
    }

    pub fn advance(&self, by: Duration) {
        if let Ok(mut now) = self.now.lock() {
            *now += ChronoDuration::from_std(by).unwrap_or_else(|_| ChronoDuration::zero());
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        match self.now.lock() {
            Ok(now) => *now,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

/// Start of the next UTC minute.
pub fn next_minute_boundary(now: DateTime<Utc>) -> DateTime<Utc> {
    let floor = now
        .duration_trunc(ChronoDuration::minutes(1))
        .unwrap_or(now);
    floor + ChronoDuration::minutes(1)
}

/// Next UTC midnight.
pub fn next_day_boundary(now: DateTime<Utc>) -> DateTime<Utc> {
    let floor = now
        .duration_trunc(ChronoDuration::days(1))
        .unwrap_or(now);
    floor + ChronoDuration::days(1)
}

/// `boundary - now`, never shorter than one second.
pub fn ttl_until(boundary: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    (boundary - now)
        .to_std()
        .unwrap_or(Duration::ZERO)
        .max(Duration::from_secs(1))
}

// ========================================
// KeyStore
// ========================================

/// A fixed-window counter taking part in an admission decision.
#[derive(Debug, Clone)]
pub struct WindowCounter {
    pub key: String,
    pub limit: i64,
    /// Applied only when the counter is created.
    pub ttl: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Admission {
    /// Counter values seen before this request, in the order given.
    pub used: Vec<i64>,
    /// First window already at its limit. `None` means admitted and counted.
    pub denied_by: Option<usize>,
}

#[async_trait]
pub trait KeyStore: Send + Sync {
    /// Increments `key`, creating it at 1 with `ttl` when absent.
    /// Returns the post-increment value.
    async fn incr_with_ttl(&self, key: &str, ttl: Duration) -> StoreResult<i64>;

    /// Integer value of `key`, 0 when absent.
    async fn get(&self, key: &str) -> StoreResult<i64>;

    /// Atomically checks every window against its limit and, only when all
    /// are below it, increments them all.
    async fn admit(&self, windows: &[WindowCounter]) -> StoreResult<Admission>;

    async fn get_raw(&self, key: &str) -> StoreResult<Option<String>>;

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()>;

    /// All live keys matching a glob pattern (`*`, `?`).
    async fn scan(&self, pattern: &str) -> StoreResult<Vec<String>>;

    /// Deletes the given keys and returns how many existed.
    async fn del(&self, keys: &[String]) -> StoreResult<u64>;

    fn backend(&self) -> &'static str;
}

// ========================================
// Redis
// ========================================

const INCR_WITH_TTL_SCRIPT: &str = r#"
local c = redis.call('INCR', KEYS[1])
if c == 1 then
    redis.call('EXPIRE', KEYS[1], ARGV[1])
end
return c
"#;

/// KEYS[i] with ARGV[2i-1] = limit, ARGV[2i] = ttl seconds.
/// Replies `{denied_index (0 = admitted), used_1, ..., used_n}`.
const ADMIT_SCRIPT: &str = r#"
local used = {}
for i = 1, #KEYS do
    local v = redis.call('GET', KEYS[i])
    if v then
        used[i] = tonumber(v)
    else
        used[i] = 0
    end
end
for i = 1, #KEYS do
    if used[i] >= tonumber(ARGV[2 * i - 1]) then
        table.insert(used, 1, i)
        return used
    end
end
for i = 1, #KEYS do
    if redis.call('INCR', KEYS[i]) == 1 then
        redis.call('EXPIRE', KEYS[i], ARGV[2 * i])
    end
end
table.insert(used, 1, 0)
return used
"#;

const SCAN_BATCH: usize = 100;

fn admission_from_reply(reply: Vec<i64>) -> StoreResult<Admission> {
    let Some((&denied, used)) = reply.split_first() else {
        return Err(StoreError::Corrupt {
            key: "admit".to_string(),
            value: "empty reply".to_string(),
        });
    };
    Ok(Admission {
        used: used.to_vec(),
        denied_by: usize::try_from(denied - 1).ok(),
    })
}

pub struct RedisStore {
    conn: ConnectionManager,
    incr_script: redis::Script,
    admit_script: redis::Script,
    timeout: Duration,
}

/// Every Redis round trip is bounded by `timeout`.
async fn bounded<T>(
    op: &'static str,
    timeout: Duration,
    fut: impl Future<Output = redis::RedisResult<T>>,
) -> StoreResult<T> {
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => Ok(result?),
        Err(_) => Err(StoreError::Timeout { op, after: timeout }),
    }
}

impl RedisStore {
    pub async fn connect(url: &str, timeout: Duration) -> StoreResult<Self> {
        let client = redis::Client::open(url)?;
        let mut conn = bounded("connect", timeout, ConnectionManager::new(client)).await?;
        let _: String = bounded("PING", timeout, redis::cmd("PING").query_async(&mut conn)).await?;
        info!(?timeout, "Connected to Redis counter store");
        Ok(Self {
            conn,
            incr_script: redis::Script::new(INCR_WITH_TTL_SCRIPT),
            admit_script: redis::Script::new(ADMIT_SCRIPT),
            timeout,
        })
    }
}

#[async_trait]
impl KeyStore for RedisStore {
    async fn incr_with_ttl(&self, key: &str, ttl: Duration) -> StoreResult<i64> {
        let mut conn = self.conn.clone();
        let mut invocation = self.incr_script.key(key);
        invocation.arg(ttl.as_secs().max(1));
        bounded("INCR", self.timeout, invocation.invoke_async(&mut conn)).await
    }

    async fn get(&self, key: &str) -> StoreResult<i64> {
        let raw = self.get_raw(key).await?;
        parse_count(key, raw)
    }

    async fn admit(&self, windows: &[WindowCounter]) -> StoreResult<Admission> {
        let mut conn = self.conn.clone();
        let mut invocation = self.admit_script.prepare_invoke();
        for window in windows {
            invocation
                .key(&window.key)
                .arg(window.limit)
                .arg(window.ttl.as_secs().max(1));
        }
        let reply: Vec<i64> =
            bounded("ADMIT", self.timeout, invocation.invoke_async(&mut conn)).await?;
        admission_from_reply(reply)
    }

    async fn get_raw(&self, key: &str) -> StoreResult<Option<String>> {
        let mut conn = self.conn.clone();
        bounded("GET", self.timeout, conn.get(key)).await
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        bounded("SET", self.timeout, conn.set_ex(key, value, ttl.as_secs().max(1))).await
    }

    async fn scan(&self, pattern: &str) -> StoreResult<Vec<String>> {
        let mut conn = self.conn.clone();
        let mut cursor: u64 = 0;
        let mut keys = Vec::new();
        loop {
            let (next, batch): (u64, Vec<String>) = bounded(
                "SCAN",
                self.timeout,
                redis::cmd("SCAN")
                    .arg(cursor)
                    .arg("MATCH")
                    .arg(pattern)
                    .arg("COUNT")
                    .arg(SCAN_BATCH)
                    .query_async(&mut conn),
            )
            .await?;
            keys.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }
        keys.sort();
        keys.dedup();
        Ok(keys)
    }

    async fn del(&self, keys: &[String]) -> StoreResult<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn.clone();
        bounded("DEL", self.timeout, conn.del(keys.to_vec())).await
    }

    fn backend(&self) -> &'static str {
        "redis"
    }
}

// ========================================
// In-memory fallback
// ========================================

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: DateTime<Utc>,
}

/// Process-local store with lazy per-key expiry.
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
    clock: Arc<dyn Clock>,
}

static GLOBAL_MEMORY_STORE: Lazy<Arc<MemoryStore>> =
    Lazy::new(|| Arc::new(MemoryStore::new(Arc::new(SystemClock))));

impl MemoryStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            clock,
        }
    }

    /// The process-wide instance used when Redis is unavailable.
    pub fn global() -> Arc<MemoryStore> {
        GLOBAL_MEMORY_STORE.clone()
    }

    fn with_entries<T>(&self, f: impl FnOnce(&mut HashMap<String, Entry>, DateTime<Utc>) -> T) -> T {
        let now = self.clock.now();
        let mut guard = match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.retain(|_, entry| entry.expires_at > now);
        f(&mut guard, now)
    }
}

fn expiry(now: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    now + ChronoDuration::from_std(ttl).unwrap_or_else(|_| ChronoDuration::days(1))
}

fn parse_count(key: &str, raw: Option<String>) -> StoreResult<i64> {
    match raw {
        None => Ok(0),
        Some(value) => value.trim().parse::<i64>().map_err(|_| StoreError::Corrupt {
            key: key.to_string(),
            value,
        }),
    }
}

#[async_trait]
impl KeyStore for MemoryStore {
    async fn incr_with_ttl(&self, key: &str, ttl: Duration) -> StoreResult<i64> {
        self.with_entries(|entries, now| match entries.get_mut(key) {
            Some(entry) => {
                let current = parse_count(key, Some(entry.value.clone()))?;
                let next = current + 1;
                entry.value = next.to_string();
                Ok(next)
            }
            None => {
                entries.insert(
                    key.to_string(),
                    Entry {
                        value: "1".to_string(),
                        expires_at: expiry(now, ttl),
                    },
                );
                Ok(1)
            }
        })
    }

    async fn get(&self, key: &str) -> StoreResult<i64> {
        let raw = self.get_raw(key).await?;
        parse_count(key, raw)
    }

    async fn admit(&self, windows: &[WindowCounter]) -> StoreResult<Admission> {
        self.with_entries(|entries, now| {
            let used = windows
                .iter()
                .map(|w| parse_count(&w.key, entries.get(&w.key).map(|e| e.value.clone())))
                .collect::<StoreResult<Vec<i64>>>()?;
            let denied_by = windows.iter().zip(&used).position(|(w, u)| *u >= w.limit);
            if denied_by.is_none() {
                for (w, u) in windows.iter().zip(&used) {
                    entries
                        .entry(w.key.clone())
                        .and_modify(|e| e.value = (u + 1).to_string())
                        .or_insert_with(|| Entry {
                            value: "1".to_string(),
                            expires_at: expiry(now, w.ttl),
                        });
                }
            }
            Ok(Admission { used, denied_by })
        })
    }

    async fn get_raw(&self, key: &str) -> StoreResult<Option<String>> {
        Ok(self.with_entries(|entries, _| entries.get(key).map(|e| e.value.clone())))
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()> {
        self.with_entries(|entries, now| {
            entries.insert(
                key.to_string(),
                Entry {
                    value: value.to_string(),
                    expires_at: expiry(now, ttl),
                },
            );
        });
        Ok(())
    }

    async fn scan(&self, pattern: &str) -> StoreResult<Vec<String>> {
        let mut keys: Vec<String> = self.with_entries(|entries, _| {
            entries
                .keys()
                .filter(|k| glob_match(pattern, k))
                .cloned()
                .collect()
        });
        keys.sort();
        Ok(keys)
    }

    async fn del(&self, keys: &[String]) -> StoreResult<u64> {
        Ok(self.with_entries(|entries, _| {
            keys.iter().filter(|k| entries.remove(k.as_str()).is_some()).count() as u64
        }))
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

/// Redis-style glob: `*` matches any run, `?` one character.
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    let (mut pi, mut ti) = (0usize, 0usize);
    let mut star: Option<(usize, usize)> = None;

    while ti < t.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == t[ti]) {
            pi += 1;
            ti += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some((pi, ti));
            pi += 1;
        } else if let Some((sp, st)) = star {
            pi = sp + 1;
            ti = st + 1;
            star = Some((sp, st + 1));
        } else {
            return false;
        }
    }
    while pi < p.len() && p[pi] == '*' {
        pi += 1;
    }
    pi == p.len()
}

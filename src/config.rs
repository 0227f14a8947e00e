//! Config Module
//! 環境変数からの設定読み込み

use anyhow::{anyhow, Result};
use std::time::Duration;

use crate::rate_limit::{ClassLimits, Limits};

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub redis: Option<RedisConfig>,
    pub classifier: ClassifierConfig,
    pub rate_limits: ClassLimits,
    pub wb_stock_dir: String,
    pub product_cache_ttl: Duration,
    /// Required in `X-Admin-Key` by the rate-limit endpoints; unset disables them.
    pub admin_key: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub path: String,
    pub max_connections: u32,
}

impl DatabaseConfig {
    pub fn url(&self) -> String {
        format!("sqlite:{}", self.path)
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct RedisConfig {
    pub addr: String,
    pub password: String,
    pub db: i64,
    /// Deadline for connecting and for every command.
    pub timeout: Duration,
}

impl RedisConfig {
    pub fn url(&self) -> String {
        if self.password.is_empty() {
            format!("redis://{}/{}", self.addr, self.db)
        } else {
            format!("redis://:{}@{}/{}", self.password, self.addr, self.db)
        }
    }
}

/// Settings for the external product classifier (OSTK catformat).
#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    pub api_base_url: String,
    pub http_timeout: Duration,
    pub queue_size: usize,
    pub request_delay: Duration,
    pub min_confidence: f64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            api_base_url: "https://api.ostk.ru".to_string(),
            http_timeout: Duration::from_secs(30),
            queue_size: 1000,
            request_delay: Duration::from_millis(100),
            min_confidence: 0.99,
        }
    }
}

impl ClassifierConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            api_base_url: env_string("OSTK_API_BASE_URL", &defaults.api_base_url),
            http_timeout: Duration::from_secs(env_u64("OSTK_HTTP_TIMEOUT", 30)),
            queue_size: env_u64("OSTK_QUEUE_SIZE", 1000) as usize,
            request_delay: Duration::from_millis(env_u64("OSTK_REQUEST_DELAY", 100)),
            min_confidence: env_f64("OSTK_MIN_CONFIDENCE", defaults.min_confidence),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.api_base_url.trim().is_empty() {
            return Err(anyhow!("OSTK_API_BASE_URL must not be empty"));
        }
        if self.http_timeout.is_zero() {
            return Err(anyhow!("OSTK_HTTP_TIMEOUT must be greater than 0"));
        }
        if self.queue_size == 0 {
            return Err(anyhow!("OSTK_QUEUE_SIZE must be greater than 0"));
        }
        if !(0.0..=1.0).contains(&self.min_confidence) {
            return Err(anyhow!("OSTK_MIN_CONFIDENCE must be within [0, 1]"));
        }
        Ok(())
    }
}

pub fn load_config() -> Result<AppConfig> {
    // .env があれば読み込む（無くてもOK）
    dotenv::dotenv().ok();

    let redis = std::env::var("REDIS_ADDR")
        .ok()
        .filter(|addr| !addr.trim().is_empty())
        .map(|addr| RedisConfig {
            addr,
            password: env_string("REDIS_PASSWORD", ""),
            db: env_i64("REDIS_DB", 0),
            timeout: Duration::from_secs(env_u64("REDIS_TIMEOUT", 30).max(1)),
        });

    let cfg = AppConfig {
        database: DatabaseConfig {
            path: env_string("DB_PATH", "data/portal.db"),
            max_connections: env_u32("DB_MAX_CONNECTIONS", 10),
        },
        server: ServerConfig {
            host: env_string("HOST", "0.0.0.0"),
            port: env_u16("PORT", 8080),
        },
        redis,
        classifier: ClassifierConfig::from_env(),
        rate_limits: ClassLimits {
            all: Limits {
                minute: env_i64("RATE_LIMIT_MINUTE", 60),
                day: env_i64("RATE_LIMIT_DAY", 1000),
            },
            public: Limits {
                minute: env_i64("RATE_LIMIT_PUBLIC_MINUTE", 120),
                day: env_i64("RATE_LIMIT_PUBLIC_DAY", 2000),
            },
        },
        wb_stock_dir: env_string("WB_STOCK_DIR", "data/wb_stock"),
        product_cache_ttl: Duration::from_secs(env_u64("PRODUCT_CACHE_TTL", 3600)),
        admin_key: std::env::var("ADMIN_API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty()),
    };

    cfg.classifier.validate()?;
    if cfg.rate_limits.all.minute <= 0 || cfg.rate_limits.all.day <= 0 {
        return Err(anyhow!("rate limits must be positive"));
    }
    Ok(cfg)
}

fn env_string(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_u16(key: &str, default: u16) -> u16 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u16>().ok())
        .unwrap_or(default)
}

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(default)
}

fn env_i64(key: &str, default: i64) -> i64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<i64>().ok())
        .unwrap_or(default)
}

fn env_f64(key: &str, default: f64) -> f64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<f64>().ok())
        .unwrap_or(default)
}

//! 响应缓存
//!
//! 缓存门位于状态机之前：命中时直接返回缓存的答案，未命中时在产生最终答案后写回。
//! 底层存储的任何读写失败都降级为未命中/空操作，不影响请求本身。

pub mod key;
pub mod memory;
pub mod redis_store;

pub use key::CacheKeyCanonicalizer;
pub use memory::MemoryCacheStore;
pub use redis_store::{LazyRedisConnection, RedisCacheStore};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::config::{CacheBackend, CacheConfig};
use crate::error::{AppError, Result};
use crate::observability::AppMetrics;

/// 缓存条目
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub response_text: String,
    pub timestamp: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn new(key: &str, response_text: &str, ttl: Duration) -> Self {
        let timestamp = Utc::now();
        let ttl = chrono::Duration::from_std(ttl)
            .unwrap_or_else(|_| chrono::Duration::days(365 * 100));
        Self {
            key: key.to_string(),
            response_text: response_text.to_string(),
            timestamp,
            expires_at: timestamp.checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC),
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// 缓存存储后端
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;

    fn backend_name(&self) -> &'static str;

    /// 检查后端是否可用
    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

pub fn create_cache_store(config: &CacheConfig) -> Result<Arc<dyn CacheStore>> {
    match config.backend {
        CacheBackend::Redis => {
            info!("Using Redis response cache at {}", config.redis_url);
            Ok(Arc::new(RedisCacheStore::new(
                &config.redis_url,
                Duration::from_millis(config.timeout_ms),
            )?))
        }
        CacheBackend::Memory => {
            info!("Using in-memory response cache (capacity {})", config.capacity);
            Ok(Arc::new(MemoryCacheStore::new(config.capacity)?))
        }
    }
}

/// 缓存门
///
/// 每次存储调用都有超时，存储无响应时按未命中处理。
pub struct CacheGate {
    store: Option<Arc<dyn CacheStore>>,
    canonicalizer: CacheKeyCanonicalizer,
    ttl: Duration,
    timeout: Duration,
    min_answer_len: usize,
    metrics: Arc<AppMetrics>,
}

impl CacheGate {
    pub fn new(
        store: Option<Arc<dyn CacheStore>>,
        config: &CacheConfig,
        metrics: Arc<AppMetrics>,
    ) -> Result<Self> {
        let canonicalizer =
            CacheKeyCanonicalizer::new(&config.namespace, &config.synonyms, &config.temporal)?;
        Ok(Self {
            store,
            canonicalizer,
            ttl: Duration::from_secs(config.ttl_secs),
            timeout: Duration::from_millis(config.timeout_ms),
            min_answer_len: config.min_answer_len,
            metrics,
        })
    }

    /// 按配置创建缓存门，缓存关闭时不创建存储
    pub fn from_config(config: &CacheConfig, metrics: Arc<AppMetrics>) -> Result<Self> {
        let store = if config.enabled {
            Some(create_cache_store(config)?)
        } else {
            info!("Response cache disabled");
            None
        };
        Self::new(store, config, metrics)
    }

    pub fn enabled(&self) -> bool {
        self.store.is_some()
    }

    pub fn store(&self) -> Option<&Arc<dyn CacheStore>> {
        self.store.as_ref()
    }

    pub fn key_for(&self, query: &str, partition: Option<&str>) -> String {
        self.canonicalizer
            .canonical_key_with_partition(query, partition)
    }

    /// 只有足够长的最终答案才会被缓存
    pub fn is_cacheable(&self, answer: &str) -> bool {
        answer.trim().chars().count() >= self.min_answer_len
    }

    async fn bounded<T>(&self, operation: &str, call: impl Future<Output = Result<T>>) -> Result<T> {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(AppError::CacheStore(format!(
                "{} timed out after {}ms",
                operation,
                self.timeout.as_millis()
            ))),
        }
    }

    /// 检查存储是否可用，缓存关闭时视为可用
    pub async fn ping(&self) -> Result<()> {
        match self.store.as_ref() {
            Some(store) => self.bounded("ping", store.ping()).await,
            None => Ok(()),
        }
    }

    /// 查询缓存，存储错误视为未命中
    pub async fn lookup(&self, key: &str) -> Option<String> {
        let store = self.store.as_ref()?;

        match self.bounded("get", store.get(key)).await {
            Ok(Some(text)) => {
                debug!("Cache hit for {}", key);
                self.metrics.record_cache_lookup(true);
                Some(text)
            }
            Ok(None) => {
                self.metrics.record_cache_lookup(false);
                None
            }
            Err(e) => {
                warn!("Cache read failed for {}: {}", key, e);
                self.metrics.record_cache_store_error();
                self.metrics.record_cache_lookup(false);
                None
            }
        }
    }

    /// 写回答案，返回是否实际写入
    pub async fn store_answer(&self, key: &str, answer: &str) -> bool {
        let Some(store) = self.store.as_ref() else {
            return false;
        };
        if !self.is_cacheable(answer) {
            debug!("Answer too short to cache ({} chars)", answer.chars().count());
            return false;
        }

        match self.bounded("set", store.set(key, answer, self.ttl)).await {
            Ok(()) => {
                self.metrics.record_cache_write();
                true
            }
            Err(e) => {
                warn!("Cache write failed for {}: {}", key, e);
                self.metrics.record_cache_store_error();
                false
            }
        }
    }
}

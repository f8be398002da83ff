//! 会话历史存储
//!
//! 会话标识只用于选择要恢复的对话历史。内存后端按容量和闲置时间淘汰会话，
//! Redis 后端以 JSON 保存对话并由 Redis 负责过期，进程重启后仍可恢复。

use async_trait::async_trait;
use chrono::Utc;
use lru::LruCache;
use parking_lot::Mutex;
use redis::AsyncCommands;
use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::cache::LazyRedisConnection;
use crate::config::config::{SessionBackend, SessionConfig};
use crate::error::{AppError, Result};
use crate::models::session::Conversation;

/// 会话存储
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// 载入会话历史，不存在或已过期时返回空对话
    async fn load(&self, session_id: &str) -> Result<Conversation>;

    /// 保存会话历史
    async fn save(&self, conversation: Conversation) -> Result<()>;
}

/// 闲置时间是否超过 `idle_ttl`
fn is_idle(conversation: &Conversation, idle_ttl: Duration) -> bool {
    let idle = Utc::now()
        .signed_duration_since(conversation.updated_at)
        .to_std()
        .unwrap_or_default();
    idle >= idle_ttl
}

/// 进程内会话存储，容量受限的 LRU，读取时惰性淘汰闲置会话
pub struct MemorySessionStore {
    sessions: Mutex<LruCache<String, Conversation>>,
    max_turns: usize,
    idle_ttl: Duration,
}

impl MemorySessionStore {
    pub fn new(max_turns: usize, capacity: usize, idle_ttl: Duration) -> Result<Self> {
        let capacity = NonZeroUsize::new(capacity)
            .ok_or_else(|| AppError::Config("session capacity must be positive".into()))?;
        Ok(Self {
            sessions: Mutex::new(LruCache::new(capacity)),
            max_turns,
            idle_ttl,
        })
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.lock().is_empty()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn load(&self, session_id: &str) -> Result<Conversation> {
        let mut sessions = self.sessions.lock();

        match sessions.get(session_id) {
            Some(conversation) if !is_idle(conversation, self.idle_ttl) => Ok(conversation.clone()),
            Some(_) => {
                debug!("Session {} expired after idling", session_id);
                sessions.pop(session_id);
                Ok(Conversation::new(session_id))
            }
            None => Ok(Conversation::new(session_id)),
        }
    }

    async fn save(&self, mut conversation: Conversation) -> Result<()> {
        conversation.trim_history(self.max_turns);
        debug!(
            "Saving session {} with {} turns",
            conversation.session_id,
            conversation.len()
        );
        self.sessions
            .lock()
            .put(conversation.session_id.clone(), conversation);
        Ok(())
    }
}

/// Redis 会话存储，每个会话一个 JSON 值，闲置过期由 `SETEX` 负责
pub struct RedisSessionStore {
    redis: LazyRedisConnection,
    namespace: String,
    max_turns: usize,
    idle_ttl: Duration,
    timeout: Duration,
}

impl RedisSessionStore {
    pub fn new(config: &SessionConfig, max_turns: usize) -> Result<Self> {
        let timeout = Duration::from_millis(config.timeout_ms);
        Ok(Self {
            redis: LazyRedisConnection::open(&config.redis_url, timeout)?,
            namespace: config.namespace.clone(),
            max_turns,
            idle_ttl: Duration::from_secs(config.idle_ttl_secs),
            timeout,
        })
    }

    pub fn key_for(&self, session_id: &str) -> String {
        format!("{}:session:{}", self.namespace, session_id)
    }

    async fn bounded<T>(&self, call: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::time::timeout(self.timeout, call)
            .await
            .map_err(|_| {
                AppError::Timeout(format!(
                    "session store did not answer within {}ms",
                    self.timeout.as_millis()
                ))
            })?
    }
}

#[async_trait]
impl SessionStore for RedisSessionStore {
    async fn load(&self, session_id: &str) -> Result<Conversation> {
        let key = self.key_for(session_id);
        let raw = self
            .bounded(async {
                let mut connection = self.redis.get().await?;
                let raw: Option<String> = connection.get(&key).await?;
                Ok::<_, AppError>(raw)
            })
            .await?;

        match raw {
            Some(raw) => Ok(serde_json::from_str(&raw)?),
            None => Ok(Conversation::new(session_id)),
        }
    }

    async fn save(&self, mut conversation: Conversation) -> Result<()> {
        conversation.trim_history(self.max_turns);
        let key = self.key_for(&conversation.session_id);
        let raw = serde_json::to_string(&conversation)?;
        let seconds = self.idle_ttl.as_secs().max(1);

        self.bounded(async {
            let mut connection = self.redis.get().await?;
            connection.set_ex::<_, _, ()>(&key, raw, seconds).await?;
            Ok::<_, AppError>(())
        })
        .await
    }
}

pub fn create_session_store(config: &SessionConfig, max_turns: usize) -> Result<Arc<dyn SessionStore>> {
    match config.backend {
        SessionBackend::Memory => {
            info!("Using in-memory session store (capacity {})", config.capacity);
            Ok(Arc::new(MemorySessionStore::new(
                max_turns,
                config.capacity,
                Duration::from_secs(config.idle_ttl_secs),
            )?))
        }
        SessionBackend::Redis => {
            info!("Using Redis session store at {}", config.redis_url);
            Ok(Arc::new(RedisSessionStore::new(config, max_turns)?))
        }
    }
}

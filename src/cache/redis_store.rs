//! Redis 缓存存储

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::MultiplexedConnection;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::info;

use crate::cache::CacheStore;
use crate::error::Result;

/// 惰性建立的 Redis 多路复用连接
///
/// 连接在首次使用时建立，Redis 不可用不会阻止服务启动。
/// 建立连接和每条命令的响应都受 `timeout` 限制。
pub struct LazyRedisConnection {
    client: redis::Client,
    connection: OnceCell<MultiplexedConnection>,
    timeout: Duration,
}

impl LazyRedisConnection {
    pub fn open(url: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: redis::Client::open(url)?,
            connection: OnceCell::new(),
            timeout,
        })
    }

    pub async fn get(&self) -> Result<MultiplexedConnection> {
        let connection = self
            .connection
            .get_or_try_init(|| async {
                let connection = self
                    .client
                    .get_multiplexed_async_connection_with_timeouts(self.timeout, self.timeout)
                    .await?;
                info!("Connected to Redis");
                Ok::<_, redis::RedisError>(connection)
            })
            .await?;
        Ok(connection.clone())
    }
}

/// 基于 Redis 的存储，过期由 Redis 的 `SETEX` 负责
pub struct RedisCacheStore {
    redis: LazyRedisConnection,
}

impl RedisCacheStore {
    pub fn new(url: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            redis: LazyRedisConnection::open(url, timeout)?,
        })
    }
}

#[async_trait]
impl CacheStore for RedisCacheStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut connection = self.redis.get().await?;
        let value: Option<String> = connection.get(key).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let mut connection = self.redis.get().await?;
        let seconds = ttl.as_secs().max(1);
        connection.set_ex::<_, _, ()>(key, value, seconds).await?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "redis"
    }

    async fn ping(&self) -> Result<()> {
        let mut connection = self.redis.get().await?;
        redis::cmd("PING")
            .query_async::<_, String>(&mut connection)
            .await?;
        Ok(())
    }
}

use crate::config::config::{AppConfig, ScanDepth};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use std::path::{Path, PathBuf};

/// 配置加载器
pub struct ConfigLoader;

impl ConfigLoader {
    /// 从默认路径加载配置
    ///
    /// 合并顺序：
    /// 1. 内置默认值
    /// 2. ./janus.toml
    /// 3. 环境变量（JANUS_ 前缀，`__` 分隔层级）
    pub fn load() -> Result<AppConfig, figment::Error> {
        Self::figment(default_config_path()).extract()
    }

    /// 从指定路径加载配置
    pub fn load_from(path: PathBuf) -> Result<AppConfig, figment::Error> {
        Self::figment(path).extract()
    }

    fn figment(path: impl AsRef<Path>) -> Figment {
        Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("JANUS_").split("__"))
    }

    /// 验证配置
    pub fn validate(config: &AppConfig) -> Result<(), ConfigValidationError> {
        if config.server.port == 0 {
            return Err(ConfigValidationError::InvalidPort);
        }

        if config.agent.max_iterations == 0 {
            return Err(ConfigValidationError::InvalidIterationLimit);
        }

        if config.retrieval.top_k == 0 {
            return Err(ConfigValidationError::InvalidTopK);
        }

        if config.retrieval.earliest_year > config.retrieval.latest_year {
            return Err(ConfigValidationError::InvalidYearRange(
                config.retrieval.earliest_year,
                config.retrieval.latest_year,
            ));
        }

        if config.retrieval.scan_depth == (ScanDepth::Window { years: 0 }) {
            return Err(ConfigValidationError::InvalidScanWindow);
        }

        if config.cache.ttl_secs == 0 {
            return Err(ConfigValidationError::InvalidCacheTtl);
        }

        if config.cache.timeout_ms == 0 {
            return Err(ConfigValidationError::InvalidCacheTimeout);
        }

        if config.cache.namespace.trim().is_empty() {
            return Err(ConfigValidationError::MissingCacheNamespace);
        }

        if config.session.capacity == 0
            || config.session.idle_ttl_secs == 0
            || config.session.timeout_ms == 0
        {
            return Err(ConfigValidationError::InvalidSessionLimits);
        }

        Ok(())
    }
}

/// 配置验证错误
#[derive(thiserror::Error, Debug)]
pub enum ConfigValidationError {
    #[error("服务端口无效，必须大于 0")]
    InvalidPort,

    #[error("迭代上限无效，必须大于 0")]
    InvalidIterationLimit,

    #[error("top_k 无效，必须大于 0")]
    InvalidTopK,

    #[error("年份范围无效: {0} > {1}")]
    InvalidYearRange(i32, i32),

    #[error("扫描窗口无效，必须至少包含一个年份")]
    InvalidScanWindow,

    #[error("缓存过期时间无效，必须大于 0")]
    InvalidCacheTtl,

    #[error("缓存超时无效，必须大于 0")]
    InvalidCacheTimeout,

    #[error("缓存命名空间未配置")]
    MissingCacheNamespace,

    #[error("会话存储的容量、闲置过期时间和超时都必须大于 0")]
    InvalidSessionLimits,
}

/// 获取默认配置文件路径
pub fn default_config_path() -> PathBuf {
    PathBuf::from("janus.toml")
}

/// 检查配置文件是否存在
pub fn config_exists() -> bool {
    default_config_path().exists()
}

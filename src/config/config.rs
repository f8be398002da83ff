use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// 服务地址
    pub host: String,
    /// 服务端口
    pub port: u16,
    /// 允许跨域的前端地址
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8000,
            cors_origins: vec![
                "http://localhost:5173".into(),
                "http://127.0.0.1:5173".into(),
            ],
        }
    }
}

/// 对话状态机配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// 单次请求允许的推理/工具往返次数上限
    pub max_iterations: u32,
    /// 单个工具调用超时（秒）
    pub tool_timeout_secs: u64,
    /// 答案分块大小（字符）
    pub answer_chunk_size: usize,
    /// 每个会话保留的历史轮次数
    pub history_turns: usize,
    /// 未提供会话标识时使用的默认会话
    pub default_session_id: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: 7,
            tool_timeout_secs: 30,
            answer_chunk_size: 256,
            history_turns: 40,
            default_session_id: "default".into(),
        }
    }
}

/// 推理模型配置（OpenAI 兼容接口）
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReasoningConfig {
    /// 接口地址
    pub base_url: String,
    /// 模型名称
    pub model: String,
    /// API 密钥
    pub api_key: String,
    /// 采样温度
    pub temperature: f32,
    /// 请求超时（秒）
    pub timeout_secs: u64,
    /// 客户端层面的重试次数
    pub max_retries: u32,
    /// 系统提示词
    pub system_prompt: String,
}

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are Janus, the F1 Technical Director.\n\
1. DEFAULT TO THE NEWEST REGULATIONS: prioritise the most recent year unless the user names another.\n\
2. STRICT ISOLATION: do not mix years unless comparing. Never apply a newer rule to an older question.\n\
3. CONTINUITY: if a value is missing for a year, older years may be used; say the value is carried over.\n\
4. AUTHORITY: AUTHORITATIVE segments override PROVISIONAL and SUPERSEDED DRAFT segments.\n\
5. ROUTING: use search_web for people, teams and news; use search_knowledge_base for technical rules.\n\
6. ANTI-LOOPING: if a search fails, broaden the query instead of repeating it.\n\
7. CITE: use [Source: Filename | Year: 20XX]. Use Markdown tables for comparisons.";

impl Default for ReasoningConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.deepseek.com".into(),
            model: "deepseek-chat".into(),
            api_key: String::new(),
            temperature: 0.0,
            timeout_secs: 120,
            max_retries: 2,
            system_prompt: DEFAULT_SYSTEM_PROMPT.into(),
        }
    }
}

/// 年份回退的扫描深度
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ScanDepth {
    /// 从目标年份一直扫描到语料库最早年份
    #[default]
    Full,
    /// 只扫描从目标年份开始的若干个年份
    Window { years: u32 },
}

/// 知识库后端类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum IndexBackend {
    /// 进程内索引
    #[default]
    Memory,
    /// 远程相似度检索服务
    Remote,
}

/// 知识检索配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// 后端类型
    pub backend: IndexBackend,
    /// 远程索引地址
    pub url: String,
    /// 远程索引密钥
    pub api_key: String,
    /// 索引名称
    pub index_name: String,
    /// 每个年份分区返回的片段数
    pub top_k: usize,
    /// 语料库最早年份
    pub earliest_year: i32,
    /// 语料库最新年份（默认目标年份）
    pub latest_year: i32,
    /// 回退扫描深度
    pub scan_depth: ScanDepth,
    /// 内存索引的种子文件
    pub seed_path: Option<PathBuf>,
    /// 远程索引请求超时（秒）
    pub timeout_secs: u64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            backend: IndexBackend::Memory,
            url: "http://localhost:6333".into(),
            api_key: String::new(),
            index_name: "f1-regulations-all".into(),
            top_k: 4,
            earliest_year: 2022,
            latest_year: 2026,
            scan_depth: ScanDepth::Full,
            seed_path: None,
            timeout_secs: 20,
        }
    }
}

/// 实时搜索配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebSearchConfig {
    /// 是否注册 search_web 工具
    pub enabled: bool,
    /// 搜索接口地址
    pub base_url: String,
    /// 附加在每个查询后的后缀
    pub query_suffix: String,
    /// 请求超时（秒）
    pub timeout_secs: u64,
}

impl Default for WebSearchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: "https://api.duckduckgo.com".into(),
            query_suffix: "F1 2026".into(),
            timeout_secs: 15,
        }
    }
}

/// 缓存后端类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CacheBackend {
    /// Redis
    #[default]
    Redis,
    /// 进程内 LRU
    Memory,
}

/// 同义词改写规则
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SynonymRule {
    pub from: String,
    pub to: String,
}

impl SynonymRule {
    pub fn new(from: &str, to: &str) -> Self {
        Self {
            from: from.to_string(),
            to: to.to_string(),
        }
    }
}

/// 缓存键的时间分区规则
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TemporalPartitionConfig {
    /// 指向较旧时期的关键词
    pub older_markers: Vec<String>,
    /// 指向较新时期的关键词
    pub newer_markers: Vec<String>,
    /// 较旧时期的分区名
    pub older_partition: String,
    /// 默认（较新时期）的分区名
    pub default_partition: String,
}

impl Default for TemporalPartitionConfig {
    fn default() -> Self {
        Self {
            older_markers: vec!["2025".into(), "current era".into(), "ground effect".into()],
            newer_markers: vec!["2026".into(), "new era".into()],
            older_partition: "2025".into(),
            default_partition: "2026".into(),
        }
    }
}

/// 响应缓存配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// 是否启用缓存
    pub enabled: bool,
    /// 后端类型
    pub backend: CacheBackend,
    /// Redis 地址
    pub redis_url: String,
    /// 缓存键命名空间
    pub namespace: String,
    /// 过期时间（秒）
    pub ttl_secs: u64,
    /// 可缓存答案的最小长度（字符）
    pub min_answer_len: usize,
    /// 内存后端容量
    pub capacity: usize,
    /// 单次存储读写的超时（毫秒）
    pub timeout_ms: u64,
    /// 同义词映射
    pub synonyms: Vec<SynonymRule>,
    /// 时间分区规则
    pub temporal: TemporalPartitionConfig,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            backend: CacheBackend::Redis,
            redis_url: "redis://localhost:6379".into(),
            namespace: "janus".into(),
            ttl_secs: 24 * 60 * 60,
            min_answer_len: 50,
            capacity: 1024,
            timeout_ms: 500,
            synonyms: default_synonyms(),
            temporal: TemporalPartitionConfig::default(),
        }
    }
}

/// 内置的术语改写表
pub fn default_synonyms() -> Vec<SynonymRule> {
    vec![
        SynonymRule::new("x-mode", "straight mode"),
        SynonymRule::new("x mode", "straight mode"),
        SynonymRule::new("z-mode", "corner mode"),
        SynonymRule::new("z mode", "corner mode"),
        SynonymRule::new("manual override", "overtake mode"),
        SynonymRule::new("mom", "overtake mode"),
        SynonymRule::new("minimum weight", "minimum mass"),
        SynonymRule::new("min weight", "minimum mass"),
        SynonymRule::new("weight limit", "minimum mass"),
        SynonymRule::new("mgu k", "mgu-k"),
    ]
}

/// 会话存储后端类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionBackend {
    /// 进程内 LRU
    #[default]
    Memory,
    /// Redis，进程重启后仍可恢复会话
    Redis,
}

/// 会话历史存储配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// 后端类型
    pub backend: SessionBackend,
    /// Redis 地址
    pub redis_url: String,
    /// 会话键命名空间
    pub namespace: String,
    /// 会话闲置多久后过期（秒）
    pub idle_ttl_secs: u64,
    /// 内存后端最多保留的会话数
    pub capacity: usize,
    /// 单次存储读写的超时（毫秒）
    pub timeout_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            backend: SessionBackend::Memory,
            redis_url: "redis://localhost:6379".into(),
            namespace: "janus".into(),
            idle_ttl_secs: 7 * 24 * 60 * 60,
            capacity: 10_000,
            timeout_ms: 500,
        }
    }
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// 日志级别
    pub level: String,
    /// 结构化日志格式
    pub structured: bool,
    /// 日志文件目录
    pub log_dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            structured: false,
            log_dir: None,
        }
    }
}

/// 应用配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// 服务器配置
    pub server: ServerConfig,
    /// 对话状态机配置
    pub agent: AgentConfig,
    /// 推理模型配置
    pub reasoning: ReasoningConfig,
    /// 知识检索配置
    pub retrieval: RetrievalConfig,
    /// 实时搜索配置
    pub web_search: WebSearchConfig,
    /// 响应缓存配置
    pub cache: CacheConfig,
    /// 会话存储配置
    pub session: SessionConfig,
    /// 日志配置
    pub logging: LoggingConfig,
    /// 应用名称
    pub app_name: String,
    /// 环境
    pub environment: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::development()
    }
}

impl AppConfig {
    /// 创建开发环境配置
    pub fn development() -> Self {
        Self {
            server: ServerConfig::default(),
            agent: AgentConfig::default(),
            reasoning: ReasoningConfig::default(),
            retrieval: RetrievalConfig::default(),
            web_search: WebSearchConfig::default(),
            cache: CacheConfig {
                backend: CacheBackend::Memory,
                ..CacheConfig::default()
            },
            session: SessionConfig::default(),
            logging: LoggingConfig {
                level: "debug".into(),
                ..LoggingConfig::default()
            },
            app_name: "janus".into(),
            environment: "development".into(),
        }
    }

    /// 创建生产环境配置
    pub fn production() -> Self {
        let mut config = Self::development();
        config.environment = "production".into();
        config.logging.level = "info".into();
        config.logging.structured = true;
        config.cache.backend = CacheBackend::Redis;
        config.session.backend = SessionBackend::Redis;
        config.retrieval.backend = IndexBackend::Remote;
        config
    }
}

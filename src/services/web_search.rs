//! 实时网络搜索
//!
//! 非版本化的实时数据源（车手、车队、新闻），调用约定与知识检索一致：
//! 输入查询文本，输出文本，任何失败都转换为固定的降级提示。

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::config::WebSearchConfig;
use crate::error::{AppError, Result};

/// 搜索失败时的降级文本
pub const WEB_SEARCH_UNAVAILABLE: &str = "WEB SEARCH UNAVAILABLE: live search is degraded right now. \
Answer from the knowledge base or state that live data could not be retrieved.";

/// 实时搜索后端
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ExternalSearch: Send + Sync {
    async fn search(&self, query: &str) -> Result<String>;
}

/// DuckDuckGo Instant Answer 接口
pub struct DuckDuckGoSearch {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct InstantAnswer {
    #[serde(rename = "AbstractText")]
    abstract_text: String,
    #[serde(rename = "AbstractSource")]
    abstract_source: String,
    #[serde(rename = "RelatedTopics")]
    related_topics: Vec<RelatedTopic>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RelatedTopic {
    #[serde(rename = "Text")]
    text: Option<String>,
    #[serde(rename = "FirstURL")]
    first_url: Option<String>,
}

impl DuckDuckGoSearch {
    pub fn new(config: &WebSearchConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn summarize(answer: InstantAnswer) -> String {
        let mut lines = Vec::new();
        if !answer.abstract_text.is_empty() {
            lines.push(format!("{} ({})", answer.abstract_text, answer.abstract_source));
        }
        for topic in answer.related_topics {
            if let Some(text) = topic.text.filter(|t| !t.is_empty()) {
                match topic.first_url {
                    Some(url) => lines.push(format!("- {} <{}>", text, url)),
                    None => lines.push(format!("- {}", text)),
                }
            }
        }
        lines.join("\n")
    }
}

#[async_trait]
impl ExternalSearch for DuckDuckGoSearch {
    async fn search(&self, query: &str) -> Result<String> {
        let response = self
            .client
            .get(format!("{}/", self.base_url))
            .query(&[
                ("q", query),
                ("format", "json"),
                ("no_html", "1"),
                ("skip_disambig", "1"),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AppError::Http(format!(
                "web search returned {}",
                response.status()
            )));
        }

        let answer: InstantAnswer = response.json().await?;
        Ok(Self::summarize(answer))
    }
}

/// 搜索适配器：附加查询后缀、包装结果、吸收错误
pub struct WebSearchAdapter {
    backend: Arc<dyn ExternalSearch>,
    query_suffix: String,
}

impl WebSearchAdapter {
    pub fn new(backend: Arc<dyn ExternalSearch>, query_suffix: &str) -> Self {
        Self {
            backend,
            query_suffix: query_suffix.trim().to_string(),
        }
    }

    /// 执行搜索，永不返回错误
    pub async fn invoke(&self, query: &str) -> String {
        let full_query = if self.query_suffix.is_empty() {
            query.trim().to_string()
        } else {
            format!("{} {}", query.trim(), self.query_suffix)
        };
        info!("Searching web for '{}'", full_query);

        match self.backend.search(&full_query).await {
            Ok(raw) if raw.trim().is_empty() => {
                format!("VERIFIED WEB SEARCH RESULTS\nNo live results for '{}'.\n", full_query)
            }
            Ok(raw) => {
                info!("Web result length: {} chars", raw.len());
                format!("VERIFIED WEB SEARCH RESULTS\n{}\n", raw)
            }
            Err(e) => {
                warn!("Web search failed: {}", e);
                WEB_SEARCH_UNAVAILABLE.to_string()
            }
        }
    }
}

pub fn create_web_search_adapter(config: &WebSearchConfig) -> Result<WebSearchAdapter> {
    let backend = DuckDuckGoSearch::new(config)?;
    Ok(WebSearchAdapter::new(Arc::new(backend), &config.query_suffix))
}

//! 远程相似度检索服务客户端

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use crate::config::config::RetrievalConfig;
use crate::error::{AppError, Result};
use crate::index::KnowledgeIndex;
use crate::models::segment::{KnowledgeSegment, PRIORITY_DRAFT, sanitize_priority};

/// 远程索引客户端
///
/// 向 `{url}/query` 发送带年份元数据过滤的文本查询，由服务端完成向量化与检索。
pub struct RemoteKnowledgeIndex {
    client: reqwest::Client,
    base_url: String,
    index_name: String,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<QueryMatch>,
}

#[derive(Debug, Deserialize)]
struct QueryMatch {
    #[serde(default)]
    metadata: MatchMetadata,
}

#[derive(Debug, Default, Deserialize)]
struct MatchMetadata {
    source: Option<String>,
    year: Option<i32>,
    section: Option<String>,
    priority: Option<u8>,
    #[serde(default)]
    text: String,
}

impl RemoteKnowledgeIndex {
    pub fn new(config: &RetrievalConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            index_name: config.index_name.clone(),
            api_key: config.api_key.clone(),
        })
    }

    fn into_segment(m: QueryMatch, year: i32) -> KnowledgeSegment {
        let meta = m.metadata;
        KnowledgeSegment {
            source: meta.source.unwrap_or_else(|| "Unknown".to_string()),
            year: meta.year.unwrap_or(year),
            section: meta.section.unwrap_or_else(|| "Unknown".to_string()),
            priority: meta.priority.map_or(PRIORITY_DRAFT, sanitize_priority),
            content: meta.text,
        }
    }
}

#[async_trait]
impl KnowledgeIndex for RemoteKnowledgeIndex {
    async fn similarity_search(
        &self,
        query: &str,
        year: i32,
        k: usize,
    ) -> Result<Vec<KnowledgeSegment>> {
        debug!(index = %self.index_name, year, k, "Querying remote knowledge index");

        let response = self
            .client
            .post(format!("{}/query", self.base_url))
            .header("Api-Key", &self.api_key)
            .json(&serde_json::json!({
                "index": self.index_name,
                "query": query,
                "top_k": k,
                "filter": { "year": { "$eq": year } },
                "include_metadata": true
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(AppError::Retrieval(format!(
                "index query failed ({}): {}",
                status, error_text
            )));
        }

        let body: QueryResponse = response.json().await?;
        Ok(body
            .matches
            .into_iter()
            .map(|m| Self::into_segment(m, year))
            .collect())
    }
}

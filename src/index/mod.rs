//! 索引模块
//!
//! 按年份分区的知识相似度检索。

pub mod memory;
pub mod remote;

pub use memory::MemoryKnowledgeIndex;
pub use remote::RemoteKnowledgeIndex;

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::config::{IndexBackend, RetrievalConfig};
use crate::error::Result;
use crate::models::segment::KnowledgeSegment;

/// 知识索引
#[async_trait]
pub trait KnowledgeIndex: Send + Sync {
    /// 在指定年份分区内取回最相似的 `k` 个片段
    async fn similarity_search(
        &self,
        query: &str,
        year: i32,
        k: usize,
    ) -> Result<Vec<KnowledgeSegment>>;
}

pub fn create_knowledge_index(config: &RetrievalConfig) -> Result<Arc<dyn KnowledgeIndex>> {
    match config.backend {
        IndexBackend::Remote => {
            info!("Using remote knowledge index at {}", config.url);
            Ok(Arc::new(RemoteKnowledgeIndex::new(config)?))
        }
        IndexBackend::Memory => {
            let index = match &config.seed_path {
                Some(path) => MemoryKnowledgeIndex::load_json(path)?,
                None => {
                    warn!("No seed file configured, in-memory knowledge index starts empty");
                    MemoryKnowledgeIndex::new()
                }
            };
            Ok(Arc::new(index))
        }
    }
}

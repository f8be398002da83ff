//! 进程内知识索引

use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::HashMap;
use std::path::Path;
use tracing::info;

use crate::error::Result;
use crate::index::KnowledgeIndex;
use crate::models::segment::KnowledgeSegment;

type TermVector = HashMap<String, f32>;

/// 基于词频向量与余弦相似度的内存索引
///
/// 用于本地运行与测试；生产环境由远程相似度检索服务替代。
pub struct MemoryKnowledgeIndex {
    segments: DashMap<String, (TermVector, KnowledgeSegment)>,
}

impl Default for MemoryKnowledgeIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryKnowledgeIndex {
    pub fn new() -> Self {
        Self {
            segments: DashMap::new(),
        }
    }

    /// 从片段列表构建
    pub fn from_segments(segments: Vec<KnowledgeSegment>) -> Self {
        let index = Self::new();
        for (i, segment) in segments.into_iter().enumerate() {
            index.add(&format!("seg_{i}"), segment);
        }
        index
    }

    /// 从 JSON 文件加载（片段数组）
    pub fn load_json(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let segments: Vec<KnowledgeSegment> = serde_json::from_str(&raw)?;
        info!(
            "Loaded {} knowledge segments from {}",
            segments.len(),
            path.display()
        );
        Ok(Self::from_segments(segments))
    }

    pub fn add(&self, id: &str, segment: KnowledgeSegment) {
        let vector = Self::term_vector(&format!("{} {}", segment.section, segment.content));
        self.segments.insert(id.to_string(), (vector, segment));
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    fn term_vector(text: &str) -> TermVector {
        let mut vector = TermVector::new();
        for token in text
            .split(|c: char| !c.is_alphanumeric() && c != '-')
            .filter(|t| !t.is_empty())
        {
            *vector.entry(token.to_lowercase()).or_insert(0.0) += 1.0;
        }
        vector
    }

    fn cosine_similarity(a: &TermVector, b: &TermVector) -> f32 {
        let dot_product: f32 = a
            .iter()
            .filter_map(|(term, x)| b.get(term).map(|y| x * y))
            .sum();
        let norm_a: f32 = a.values().map(|x| x * x).sum::<f32>().sqrt();
        let norm_b: f32 = b.values().map(|x| x * x).sum::<f32>().sqrt();

        if norm_a == 0.0 || norm_b == 0.0 {
            return 0.0;
        }

        dot_product / (norm_a * norm_b)
    }
}

#[async_trait]
impl KnowledgeIndex for MemoryKnowledgeIndex {
    async fn similarity_search(
        &self,
        query: &str,
        year: i32,
        k: usize,
    ) -> Result<Vec<KnowledgeSegment>> {
        let query_vector = Self::term_vector(query);

        let mut results: Vec<_> = self
            .segments
            .iter()
            .filter(|entry| entry.value().1.year == year)
            .map(|entry| {
                let (id, (vector, segment)) = entry.pair();
                let score = Self::cosine_similarity(&query_vector, vector);
                (score, id.clone(), segment.clone())
            })
            .collect();

        results.sort_by(|a, b| b.0.total_cmp(&a.0).then_with(|| a.1.cmp(&b.1)));
        results.truncate(k);

        Ok(results.into_iter().map(|(_, _, segment)| segment).collect())
    }
}

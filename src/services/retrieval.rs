//! 检索服务
//!
//! 按年份从新到旧检索知识库，遇到定稿片段即停止，防止旧时期的条文覆盖新时期的定稿。

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::config::{RetrievalConfig, ScanDepth};
use crate::error::Result;
use crate::index::KnowledgeIndex;
use crate::models::segment::{AuthorityLabel, KnowledgeSegment, LabeledSegment};

/// 未检索到任何片段时返回的哨兵文本
pub const NOT_FOUND_SENTINEL: &str =
    "RESULT: No relevant knowledge found. The requested item may have been renamed or removed.";

/// 检索失败时返回文本的前缀
pub const RETRIEVAL_ERROR_PREFIX: &str = "CRITICAL ERROR: Knowledge base access failed:";

/// 检索结果
#[derive(Debug, Clone, PartialEq)]
pub enum RetrievalOutcome {
    /// 按年份从新到旧累积的带标签片段
    Found(Vec<LabeledSegment>),
    /// 所有候选年份都没有片段
    NotFound,
}

impl RetrievalOutcome {
    pub fn segments(&self) -> &[LabeledSegment] {
        match self {
            RetrievalOutcome::Found(segments) => segments,
            RetrievalOutcome::NotFound => &[],
        }
    }

    /// 渲染为供推理步骤阅读的文本
    pub fn render(&self) -> String {
        match self {
            RetrievalOutcome::Found(segments) => render_segments(segments),
            RetrievalOutcome::NotFound => NOT_FOUND_SENTINEL.to_string(),
        }
    }
}

/// 计算候选年份（从新到旧）
pub fn candidate_years(target_year: i32, earliest_year: i32, scan: ScanDepth) -> Vec<i32> {
    let all = (earliest_year..=target_year).rev();
    match scan {
        ScanDepth::Full => all.collect(),
        ScanDepth::Window { years } => all.take(years as usize).collect(),
    }
}

/// 为单个年份的片段打标签
///
/// 返回带标签的片段以及该年份是否存在定稿（即是否应停止向更早年份回退）。
pub fn label_year(mut segments: Vec<KnowledgeSegment>) -> (Vec<LabeledSegment>, bool) {
    let has_finalized = segments.iter().any(KnowledgeSegment::is_finalized);

    if !has_finalized {
        let labeled = segments
            .into_iter()
            .map(|s| LabeledSegment::new(s, AuthorityLabel::Provisional))
            .collect();
        return (labeled, false);
    }

    segments.sort_by_key(|s| s.priority);
    let labeled = segments
        .into_iter()
        .map(|s| {
            let label = if s.is_finalized() {
                AuthorityLabel::Authoritative
            } else {
                AuthorityLabel::SupersededDraft
            };
            LabeledSegment::new(s, label)
        })
        .collect();
    (labeled, true)
}

/// 渲染单个片段
pub fn render_segment(labeled: &LabeledSegment) -> String {
    let s = &labeled.segment;
    format!(
        "--- KNOWLEDGE SEGMENT ---\nSOURCE: {}\nYEAR: {}\nSECTION: {}\nSTATUS: {}\nCONTENT: {}\n\n",
        s.source, s.year, s.section, labeled.label, s.content
    )
}

/// 把有序片段折叠成一段文本
pub fn render_segments(segments: &[LabeledSegment]) -> String {
    segments.iter().fold(String::new(), |mut acc, labeled| {
        acc.push_str(&render_segment(labeled));
        acc
    })
}

#[async_trait]
pub trait RetrievalService: Send + Sync {
    /// 最近的受支持年份
    fn default_year(&self) -> i32;

    /// 执行优先级门控的年份回退检索
    async fn retrieve(&self, query: &str, target_year: i32) -> Result<RetrievalOutcome>;

    /// 检索并渲染；索引错误被转换为带标签的错误文本
    async fn search(&self, query: &str, target_year: i32) -> String {
        match self.retrieve(query, target_year).await {
            Ok(outcome) => outcome.render(),
            Err(e) => {
                warn!("Knowledge retrieval failed: {}", e);
                format!("{} {}", RETRIEVAL_ERROR_PREFIX, e)
            }
        }
    }
}

pub struct TemporalRetriever {
    index: Arc<dyn KnowledgeIndex>,
    top_k: usize,
    earliest_year: i32,
    latest_year: i32,
    scan_depth: ScanDepth,
}

impl TemporalRetriever {
    pub fn new(index: Arc<dyn KnowledgeIndex>, config: &RetrievalConfig) -> Self {
        Self {
            index,
            top_k: config.top_k,
            earliest_year: config.earliest_year,
            latest_year: config.latest_year,
            scan_depth: config.scan_depth,
        }
    }
}

#[async_trait]
impl RetrievalService for TemporalRetriever {
    fn default_year(&self) -> i32 {
        self.latest_year
    }

    async fn retrieve(&self, query: &str, target_year: i32) -> Result<RetrievalOutcome> {
        let start_year = target_year.min(self.latest_year);
        let years = candidate_years(start_year, self.earliest_year, self.scan_depth);
        info!(
            "Searching knowledge base for '{}' starting in {} ({} candidate years)",
            query,
            start_year,
            years.len()
        );

        let mut accumulated = Vec::new();

        for year in years {
            let results = self.index.similarity_search(query, year, self.top_k).await?;
            debug!(year, hits = results.len(), "Year partition searched");

            let (labeled, finalized) = label_year(results);
            accumulated.extend(labeled);

            if finalized {
                debug!(year, "Finalized segment found, stopping fallback");
                break;
            }
        }

        if accumulated.is_empty() {
            Ok(RetrievalOutcome::NotFound)
        } else {
            Ok(RetrievalOutcome::Found(accumulated))
        }
    }
}

pub fn create_retrieval_service(
    index: Arc<dyn KnowledgeIndex>,
    config: &RetrievalConfig,
) -> Arc<dyn RetrievalService> {
    Arc::new(TemporalRetriever::new(index, config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::index::MemoryKnowledgeIndex;
    use std::sync::Mutex;

    /// 记录被查询年份的索引包装
    struct RecordingIndex {
        inner: MemoryKnowledgeIndex,
        years: Mutex<Vec<i32>>,
    }

    impl RecordingIndex {
        fn new(segments: Vec<KnowledgeSegment>) -> Self {
            Self {
                inner: MemoryKnowledgeIndex::from_segments(segments),
                years: Mutex::new(Vec::new()),
            }
        }

        fn queried_years(&self) -> Vec<i32> {
            self.years.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl KnowledgeIndex for RecordingIndex {
        async fn similarity_search(
            &self,
            query: &str,
            year: i32,
            k: usize,
        ) -> Result<Vec<KnowledgeSegment>> {
            self.years.lock().unwrap().push(year);
            self.inner.similarity_search(query, year, k).await
        }
    }

    struct UnreachableIndex;

    #[async_trait]
    impl KnowledgeIndex for UnreachableIndex {
        async fn similarity_search(
            &self,
            _query: &str,
            _year: i32,
            _k: usize,
        ) -> Result<Vec<KnowledgeSegment>> {
            Err(AppError::Retrieval("connection refused".into()))
        }
    }

    fn retriever(index: Arc<dyn KnowledgeIndex>, scan_depth: ScanDepth) -> TemporalRetriever {
        let config = RetrievalConfig {
            scan_depth,
            ..RetrievalConfig::default()
        };
        TemporalRetriever::new(index, &config)
    }

    #[test]
    fn test_candidate_years() {
        assert_eq!(
            candidate_years(2026, 2022, ScanDepth::Full),
            vec![2026, 2025, 2024, 2023, 2022]
        );
        assert_eq!(
            candidate_years(2026, 2022, ScanDepth::Window { years: 2 }),
            vec![2026, 2025]
        );
        assert_eq!(
            candidate_years(2022, 2022, ScanDepth::Window { years: 2 }),
            vec![2022]
        );
        assert!(candidate_years(2020, 2022, ScanDepth::Full).is_empty());
    }

    #[test]
    fn test_label_year_sorts_finalized_first() {
        let (labeled, stop) = label_year(vec![
            KnowledgeSegment::new("draft.pdf", 2026, "4.1", 2, "770 kg"),
            KnowledgeSegment::new("final.pdf", 2026, "4.1", 1, "768 kg"),
        ]);

        assert!(stop);
        assert_eq!(labeled[0].label, AuthorityLabel::Authoritative);
        assert_eq!(labeled[0].segment.source, "final.pdf");
        assert_eq!(labeled[1].label, AuthorityLabel::SupersededDraft);
    }

    #[test]
    fn test_zero_priority_never_outranks_finalized() {
        let (labeled, stop) = label_year(vec![
            KnowledgeSegment::new("stray.pdf", 2026, "4.1", 0, "700 kg"),
            KnowledgeSegment::new("final.pdf", 2026, "4.1", 1, "768 kg"),
        ]);

        assert!(stop);
        assert_eq!(labeled[0].segment.source, "final.pdf");
        assert_eq!(labeled[0].label, AuthorityLabel::Authoritative);
        assert_eq!(labeled[1].label, AuthorityLabel::SupersededDraft);
    }

    #[test]
    fn test_label_year_without_finalized_is_provisional() {
        let (labeled, stop) = label_year(vec![KnowledgeSegment::new("d.pdf", 2026, "", 3, "x")]);
        assert!(!stop);
        assert_eq!(labeled[0].label, AuthorityLabel::Provisional);

        let (labeled, stop) = label_year(Vec::new());
        assert!(!stop);
        assert!(labeled.is_empty());
    }

    #[tokio::test]
    async fn test_finalized_target_year_stops_descent() {
        let index = Arc::new(RecordingIndex::new(vec![
            KnowledgeSegment::new("tech_2026.pdf", 2026, "4.1", 1, "minimum mass is 768 kg"),
            KnowledgeSegment::new("tech_2025.pdf", 2025, "4.1", 1, "minimum mass is 800 kg"),
        ]));
        let retriever = retriever(index.clone(), ScanDepth::Full);

        let outcome = retriever.retrieve("what is the minimum mass", 2026).await.unwrap();

        assert_eq!(index.queried_years(), vec![2026]);
        assert!(outcome.segments().iter().all(|s| s.segment.year == 2026));
        assert_eq!(outcome.segments()[0].label, AuthorityLabel::Authoritative);
    }

    #[tokio::test]
    async fn test_draft_year_falls_back_to_finalized_year() {
        let index = Arc::new(RecordingIndex::new(vec![
            KnowledgeSegment::new("draft_2026.pdf", 2026, "4.1", 2, "minimum mass is 770 kg"),
            KnowledgeSegment::new("tech_2025.pdf", 2025, "4.1", 1, "minimum mass is 800 kg"),
            KnowledgeSegment::new("tech_2024.pdf", 2024, "4.1", 1, "minimum mass is 798 kg"),
        ]));
        let retriever = retriever(index.clone(), ScanDepth::Full);

        let outcome = retriever.retrieve("what is the minimum mass", 2026).await.unwrap();
        let segments = outcome.segments();

        assert_eq!(index.queried_years(), vec![2026, 2025]);
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].segment.year, 2026);
        assert_eq!(segments[0].label, AuthorityLabel::Provisional);
        assert_eq!(segments[1].segment.year, 2025);
        assert_eq!(segments[1].label, AuthorityLabel::Authoritative);
    }

    #[tokio::test]
    async fn test_window_scan_limits_depth() {
        let index = Arc::new(RecordingIndex::new(vec![KnowledgeSegment::new(
            "tech_2023.pdf",
            2023,
            "4.1",
            1,
            "minimum mass",
        )]));
        let retriever = retriever(index.clone(), ScanDepth::Window { years: 2 });

        let outcome = retriever.retrieve("minimum mass", 2026).await.unwrap();

        assert_eq!(index.queried_years(), vec![2026, 2025]);
        assert_eq!(outcome, RetrievalOutcome::NotFound);
    }

    #[tokio::test]
    async fn test_target_beyond_latest_is_clamped() {
        let index = Arc::new(RecordingIndex::new(Vec::new()));
        let retriever = retriever(index.clone(), ScanDepth::Window { years: 1 });

        retriever.retrieve("anything", 2031).await.unwrap();
        assert_eq!(index.queried_years(), vec![2026]);
    }

    #[tokio::test]
    async fn test_search_renders_labels_and_sentinel() {
        let index = Arc::new(RecordingIndex::new(vec![KnowledgeSegment::new(
            "tech_2026.pdf",
            2026,
            "4.1",
            1,
            "minimum mass is 768 kg",
        )]));
        let retriever = retriever(index, ScanDepth::Full);

        let text = retriever.search("minimum mass", 2026).await;
        assert!(text.contains("SOURCE: tech_2026.pdf"));
        assert!(text.contains("YEAR: 2026"));
        assert!(text.contains("STATUS: AUTHORITATIVE"));

        let text = retriever.search("minimum mass", 2021).await;
        assert_eq!(text, NOT_FOUND_SENTINEL);
    }

    #[tokio::test]
    async fn test_unreachable_index_returns_labeled_error() {
        let retriever = retriever(Arc::new(UnreachableIndex), ScanDepth::Full);

        let text = retriever.search("minimum mass", 2026).await;
        assert!(text.starts_with(RETRIEVAL_ERROR_PREFIX));
        assert!(text.contains("connection refused"));
        assert_ne!(text, NOT_FOUND_SENTINEL);
    }

    #[test]
    fn test_render_segments_preserves_order() {
        let segments = vec![
            LabeledSegment::new(
                KnowledgeSegment::new("a.pdf", 2026, "1", 2, "first"),
                AuthorityLabel::Provisional,
            ),
            LabeledSegment::new(
                KnowledgeSegment::new("b.pdf", 2025, "1", 1, "second"),
                AuthorityLabel::Authoritative,
            ),
        ];

        let text = render_segments(&segments);
        let first = text.find("first").unwrap();
        let second = text.find("second").unwrap();
        assert!(first < second);
        assert_eq!(text.matches("--- KNOWLEDGE SEGMENT ---").count(), 2);
    }
}

use serde::{Deserialize, Serialize};
use std::fmt;

/// 定稿文件的优先级
pub const PRIORITY_FINALIZED: u8 = 1;

/// 缺省优先级（草稿/存档）
pub const PRIORITY_DRAFT: u8 = 2;

fn default_priority() -> u8 {
    PRIORITY_DRAFT
}

/// 把超出取值范围的优先级（0）按缺省草稿处理
pub fn sanitize_priority(priority: u8) -> u8 {
    if priority < PRIORITY_FINALIZED {
        PRIORITY_DRAFT
    } else {
        priority
    }
}

fn deserialize_priority<'de, D>(deserializer: D) -> Result<u8, D::Error>
where
    D: serde::Deserializer<'de>,
{
    u8::deserialize(deserializer).map(sanitize_priority)
}

/// 知识片段
///
/// 由知识检索器按年份分区取回，创建后不再修改。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KnowledgeSegment {
    /// 来源文件
    pub source: String,
    /// 所属年份分区
    pub year: i32,
    /// 章节标签
    #[serde(default)]
    pub section: String,
    /// 优先级：1 为定稿，≥2 为草稿
    #[serde(default = "default_priority", deserialize_with = "deserialize_priority")]
    pub priority: u8,
    /// 片段正文
    pub content: String,
}

impl KnowledgeSegment {
    pub fn new(source: &str, year: i32, section: &str, priority: u8, content: &str) -> Self {
        Self {
            source: source.to_string(),
            year,
            section: section.to_string(),
            priority: sanitize_priority(priority),
            content: content.to_string(),
        }
    }

    /// 是否为定稿片段
    pub fn is_finalized(&self) -> bool {
        self.priority == PRIORITY_FINALIZED
    }
}

/// 片段的权威性标签
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthorityLabel {
    /// 定稿，且该年份存在定稿
    Authoritative,
    /// 同一年份已有定稿时的草稿
    SupersededDraft,
    /// 该年份没有定稿时的片段
    Provisional,
}

impl fmt::Display for AuthorityLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            AuthorityLabel::Authoritative => "AUTHORITATIVE",
            AuthorityLabel::SupersededDraft => "SUPERSEDED DRAFT",
            AuthorityLabel::Provisional => "PROVISIONAL",
        };
        f.write_str(label)
    }
}

/// 带权威性标签的片段
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LabeledSegment {
    pub segment: KnowledgeSegment,
    pub label: AuthorityLabel,
}

impl LabeledSegment {
    pub fn new(segment: KnowledgeSegment, label: AuthorityLabel) -> Self {
        Self { segment, label }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_priority_defaults_to_draft() {
        let segment: KnowledgeSegment = serde_json::from_str(
            r#"{"source":"tech_regs.pdf","year":2026,"content":"768 kg"}"#,
        )
        .unwrap();

        assert_eq!(segment.priority, PRIORITY_DRAFT);
        assert!(!segment.is_finalized());
        assert!(segment.section.is_empty());
    }

    #[test]
    fn test_zero_priority_is_treated_as_draft() {
        let segment: KnowledgeSegment = serde_json::from_str(
            r#"{"source":"tech_regs.pdf","year":2026,"priority":0,"content":"768 kg"}"#,
        )
        .unwrap();
        assert_eq!(segment.priority, PRIORITY_DRAFT);

        let built = KnowledgeSegment::new("tech_regs.pdf", 2026, "C4.1", 0, "768 kg");
        assert_eq!(built.priority, PRIORITY_DRAFT);
        assert_eq!(sanitize_priority(PRIORITY_FINALIZED), PRIORITY_FINALIZED);
        assert_eq!(sanitize_priority(3), 3);
    }

    #[test]
    fn test_label_display() {
        assert_eq!(AuthorityLabel::Authoritative.to_string(), "AUTHORITATIVE");
        assert_eq!(AuthorityLabel::SupersededDraft.to_string(), "SUPERSEDED DRAFT");
        assert_eq!(AuthorityLabel::Provisional.to_string(), "PROVISIONAL");
    }
}

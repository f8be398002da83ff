//! 缓存键规范化
//!
//! 键格式为 `{namespace}:{partition}:{digest}`，其中 digest 是规范化查询文本的 SHA-256。

use regex::Regex;
use sha2::{Digest, Sha256};

use crate::config::config::{SynonymRule, TemporalPartitionConfig};
use crate::error::{AppError, Result};

/// 同义词改写的最大轮数
const MAX_REWRITE_PASSES: usize = 8;

struct CompiledRule {
    pattern: Regex,
    replacement: String,
}

pub struct CacheKeyCanonicalizer {
    namespace: String,
    rules: Vec<CompiledRule>,
    older_markers: Vec<Regex>,
    newer_markers: Vec<Regex>,
    older_partition: String,
    default_partition: String,
}

fn word_pattern(term: &str) -> Result<Regex> {
    Regex::new(&format!(r"\b{}\b", regex::escape(term)))
        .map_err(|e| AppError::Config(format!("invalid term '{}': {}", term, e)))
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

impl CacheKeyCanonicalizer {
    /// 编译同义词表与时间标记
    ///
    /// 若某条规则的源词能在任一改写目标中匹配，改写就不会收敛，此时返回配置错误。
    pub fn new(
        namespace: &str,
        synonyms: &[SynonymRule],
        temporal: &TemporalPartitionConfig,
    ) -> Result<Self> {
        let mut rules = Vec::with_capacity(synonyms.len());
        for rule in synonyms {
            let from = collapse_whitespace(&rule.from.to_lowercase());
            let to = collapse_whitespace(&rule.to.to_lowercase());
            if from.is_empty() {
                return Err(AppError::Config("synonym source must not be empty".into()));
            }
            rules.push(CompiledRule {
                pattern: word_pattern(&from)?,
                replacement: to,
            });
        }

        for rule in &rules {
            if let Some(target) = rules
                .iter()
                .find(|other| rule.pattern.is_match(&other.replacement))
            {
                return Err(AppError::Config(format!(
                    "synonym rule '{}' matches rewrite target '{}'",
                    rule.pattern.as_str(),
                    target.replacement
                )));
            }
        }

        let compile = |markers: &[String]| -> Result<Vec<Regex>> {
            markers
                .iter()
                .map(|m| collapse_whitespace(&m.to_lowercase()))
                .filter(|m| !m.is_empty())
                .map(|m| word_pattern(&m))
                .collect()
        };

        Ok(Self {
            namespace: namespace.to_string(),
            rules,
            older_markers: compile(&temporal.older_markers)?,
            newer_markers: compile(&temporal.newer_markers)?,
            older_partition: temporal.older_partition.clone(),
            default_partition: temporal.default_partition.clone(),
        })
    }

    /// 规范化查询文本
    pub fn normalize(&self, query: &str) -> String {
        let lowered = collapse_whitespace(&query.to_lowercase());
        let mut text = lowered
            .trim_end_matches(|c: char| matches!(c, '?' | '!' | '.') || c.is_whitespace())
            .to_string();

        for _ in 0..MAX_REWRITE_PASSES {
            let mut changed = false;
            for rule in &self.rules {
                if rule.pattern.is_match(&text) {
                    text = rule
                        .pattern
                        .replace_all(&text, rule.replacement.as_str())
                        .into_owned();
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }

        collapse_whitespace(&text)
    }

    /// 时间分区：只提到旧时代标记 ⇒ 旧分区，否则默认分区
    pub fn partition(&self, normalized: &str) -> &str {
        let older = self.older_markers.iter().any(|m| m.is_match(normalized));
        let newer = self.newer_markers.iter().any(|m| m.is_match(normalized));
        if older && !newer {
            &self.older_partition
        } else {
            &self.default_partition
        }
    }

    pub fn canonical_key(&self, query: &str) -> String {
        self.canonical_key_with_partition(query, None)
    }

    /// 调用方可显式指定分区，覆盖关键词判断
    pub fn canonical_key_with_partition(&self, query: &str, partition: Option<&str>) -> String {
        let normalized = self.normalize(query);
        let partition = partition
            .and_then(sanitize_partition)
            .unwrap_or_else(|| self.partition(&normalized).to_string());
        format!("{}:{}:{}", self.namespace, partition, digest(&normalized))
    }
}

/// 只保留字母数字、`-` 和 `_`
fn sanitize_partition(raw: &str) -> Option<String> {
    let cleaned: String = raw
        .trim()
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .collect();
    (!cleaned.is_empty()).then_some(cleaned)
}

pub fn digest(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::config::default_synonyms;
    use rstest::rstest;

    fn canonicalizer() -> CacheKeyCanonicalizer {
        CacheKeyCanonicalizer::new("janus", &default_synonyms(), &TemporalPartitionConfig::default())
            .unwrap()
    }

    #[rstest]
    #[case("What is the Minimum Weight?", "what is the minimum mass")]
    #[case("  explain   X-Mode  ", "explain straight mode")]
    #[case("how does MOM work!", "how does overtake mode work")]
    #[case("mgu k power in 2025.", "mgu-k power in 2025")]
    #[case("momentum of the car", "momentum of the car")]
    fn test_normalize(#[case] raw: &str, #[case] expected: &str) {
        assert_eq!(canonicalizer().normalize(raw), expected);
    }

    #[rstest]
    #[case("What is the minimum weight?")]
    #[case("Z mode vs X mode in the new era")]
    #[case("manual override rules 2025 ??")]
    fn test_normalization_is_idempotent(#[case] raw: &str) {
        let c = canonicalizer();
        let once = c.normalize(raw);
        assert_eq!(c.normalize(&once), once);
        assert_eq!(c.canonical_key(&once), c.canonical_key(raw));
    }

    #[rstest]
    #[case("what is the minimum weight", "What is the MIN WEIGHT?")]
    #[case("explain x-mode", "explain straight mode")]
    #[case("manual override energy", "MoM energy")]
    fn test_synonyms_collapse_to_same_key(#[case] a: &str, #[case] b: &str) {
        let c = canonicalizer();
        assert_eq!(c.canonical_key(a), c.canonical_key(b));
    }

    #[rstest]
    #[case("minimum mass in 2025", "2025")]
    #[case("minimum mass in the ground effect era", "2025")]
    #[case("minimum mass in 2026", "2026")]
    #[case("minimum mass 2025 vs 2026", "2026")]
    #[case("minimum mass", "2026")]
    fn test_partition(#[case] query: &str, #[case] expected: &str) {
        let c = canonicalizer();
        assert_eq!(c.partition(&c.normalize(query)), expected);
    }

    #[test]
    fn test_older_and_newer_markers_do_not_collide() {
        let c = canonicalizer();
        let older = c.canonical_key("what is the minimum mass in 2025");
        let newer = c.canonical_key("what is the minimum mass in 2026");
        assert_ne!(older, newer);
        assert!(older.starts_with("janus:2025:"));
        assert!(newer.starts_with("janus:2026:"));
    }

    #[test]
    fn test_key_shape_and_override() {
        let c = canonicalizer();
        let key = c.canonical_key("minimum mass");
        let parts: Vec<&str> = key.split(':').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[2].len(), 64);

        let forced = c.canonical_key_with_partition("minimum mass", Some(" 2025 "));
        assert!(forced.starts_with("janus:2025:"));
        assert_eq!(forced.split(':').nth(2), Some(parts[2]));

        let ignored = c.canonical_key_with_partition("minimum mass", Some("::"));
        assert_eq!(ignored, key);
    }

    #[test]
    fn test_non_converging_rules_are_rejected() {
        let rules = vec![
            SynonymRule::new("drs", "drag reduction"),
            SynonymRule::new("drag", "drs"),
        ];
        let result =
            CacheKeyCanonicalizer::new("janus", &rules, &TemporalPartitionConfig::default());
        assert!(result.is_err());
    }
}

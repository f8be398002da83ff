//! Versioned knowledge base tool.

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::error::{AppError, Result};
use crate::services::retrieval::RetrievalService;
use crate::tools::{Tool, ToolSpec, parse_arguments};

pub const KNOWLEDGE_TOOL_NAME: &str = "search_knowledge_base";

const KNOWLEDGE_TOOL_DESCRIPTION: &str = "Search the official regulations knowledge base. \
Use this for rules, technical limits, procedures and definitions. Results are labeled \
AUTHORITATIVE, SUPERSEDED DRAFT or PROVISIONAL; prefer AUTHORITATIVE segments when they conflict.";

/// Knowledge base search input
#[derive(Debug, Deserialize, JsonSchema)]
pub struct KnowledgeSearchInput {
    /// Specific technical search terms, e.g. "minimum mass of the car"
    pub query: String,
    /// Regulation year to search; defaults to the newest year
    #[serde(default)]
    pub target_year: Option<i32>,
}

pub struct KnowledgeBaseTool {
    retrieval: Arc<dyn RetrievalService>,
}

impl KnowledgeBaseTool {
    pub fn new(retrieval: Arc<dyn RetrievalService>) -> Self {
        Self { retrieval }
    }

    fn year_of(&self, arguments: &Map<String, Value>) -> i32 {
        arguments
            .get("target_year")
            .and_then(Value::as_i64)
            .and_then(|y| i32::try_from(y).ok())
            .unwrap_or_else(|| self.retrieval.default_year())
    }
}

#[async_trait]
impl Tool for KnowledgeBaseTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec::for_input::<KnowledgeSearchInput>(KNOWLEDGE_TOOL_NAME, KNOWLEDGE_TOOL_DESCRIPTION)
    }

    async fn invoke(&self, arguments: &Map<String, Value>) -> Result<String> {
        let input: KnowledgeSearchInput = parse_arguments(KNOWLEDGE_TOOL_NAME, arguments)?;
        if input.query.trim().is_empty() {
            return Err(AppError::Validation("query must not be empty".into()));
        }

        let year = input
            .target_year
            .unwrap_or_else(|| self.retrieval.default_year());
        Ok(self.retrieval.search(input.query.trim(), year).await)
    }

    fn describe_call(&self, arguments: &Map<String, Value>) -> String {
        format!("ANALYZING {} KNOWLEDGE...", self.year_of(arguments))
    }
}

//! Live web search tool.

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::error::{AppError, Result};
use crate::services::web_search::WebSearchAdapter;
use crate::tools::{Tool, ToolSpec, parse_arguments};

pub const WEB_TOOL_NAME: &str = "search_web";

const WEB_TOOL_DESCRIPTION: &str = "Search the live web for current, non-versioned facts: \
drivers, teams, results and news. Do not use this for regulation text.";

/// Web search input
#[derive(Debug, Deserialize, JsonSchema)]
pub struct WebSearchInput {
    /// Search terms
    pub query: String,
}

pub struct WebSearchTool {
    adapter: Arc<WebSearchAdapter>,
}

impl WebSearchTool {
    pub fn new(adapter: Arc<WebSearchAdapter>) -> Self {
        Self { adapter }
    }
}

#[async_trait]
impl Tool for WebSearchTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec::for_input::<WebSearchInput>(WEB_TOOL_NAME, WEB_TOOL_DESCRIPTION)
    }

    async fn invoke(&self, arguments: &Map<String, Value>) -> Result<String> {
        let input: WebSearchInput = parse_arguments(WEB_TOOL_NAME, arguments)?;
        if input.query.trim().is_empty() {
            return Err(AppError::Validation("query must not be empty".into()));
        }
        Ok(self.adapter.invoke(&input.query).await)
    }

    fn describe_call(&self, _arguments: &Map<String, Value>) -> String {
        "SEARCHING LIVE SOURCES...".to_string()
    }
}

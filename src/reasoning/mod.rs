//! 推理步骤
//!
//! 给定对话历史和工具目录，推理步骤要么产出最终答案，要么产出一批工具调用请求。

pub mod chat_completions;

pub use chat_completions::ChatCompletionsClient;

use async_trait::async_trait;
use std::sync::Arc;

use crate::config::config::ReasoningConfig;
use crate::error::Result;
use crate::models::session::Conversation;
use crate::models::turn::ToolRequest;
use crate::tools::ToolSpec;

/// 一次推理的结果
#[derive(Debug, Clone, PartialEq)]
pub enum ReasoningOutcome {
    /// 最终答案
    Answer(String),
    /// 需要执行的工具调用（`requests` 非空）
    ToolRequests {
        text: String,
        requests: Vec<ToolRequest>,
    },
}

impl ReasoningOutcome {
    /// 根据请求是否为空构造结果
    pub fn from_parts(text: String, requests: Vec<ToolRequest>) -> Self {
        if requests.is_empty() {
            Self::Answer(text)
        } else {
            Self::ToolRequests { text, requests }
        }
    }

    pub fn text(&self) -> &str {
        match self {
            Self::Answer(text) | Self::ToolRequests { text, .. } => text,
        }
    }
}

/// 推理步骤
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ReasoningStep: Send + Sync {
    async fn reason(
        &self,
        conversation: &Conversation,
        tools: &[ToolSpec],
    ) -> Result<ReasoningOutcome>;
}

pub fn create_reasoning_step(config: &ReasoningConfig) -> Result<Arc<dyn ReasoningStep>> {
    Ok(Arc::new(ChatCompletionsClient::new(config)?))
}

//! 对话状态机
//!
//! 驱动推理/工具循环：推理 → 根据是否请求工具分支 → 执行工具 → 回填结果 → 再次推理，
//! 由迭代计数器保证循环终止。

pub mod state;

pub use state::{AgentState, FORCED_FINALIZE_DIRECTIVE, IterationGovernor};

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::{AppError, Result};
use crate::models::event::{EventSink, StreamEvent};
use crate::models::session::Conversation;
use crate::models::turn::{ToolRequest, ToolResult};
use crate::observability::AppMetrics;
use crate::reasoning::{ReasoningOutcome, ReasoningStep};
use crate::tools::{ToolDispatcher, ToolSpec};
use state::FINALIZE_FALLBACK_ANSWER;

/// 一次请求的处理结果
#[derive(Debug, Clone, PartialEq)]
pub struct AgentRun {
    /// 最终答案
    pub answer: String,
    /// 完成的推理/工具往返次数
    pub rounds: u32,
    /// 是否经过强制收尾
    pub forced: bool,
}

/// 对话状态机
pub struct ConversationStateMachine {
    reasoning: Arc<dyn ReasoningStep>,
    dispatcher: Arc<ToolDispatcher>,
    catalog: Vec<ToolSpec>,
    max_iterations: u32,
    metrics: Arc<AppMetrics>,
}

impl ConversationStateMachine {
    pub fn new(
        reasoning: Arc<dyn ReasoningStep>,
        dispatcher: Arc<ToolDispatcher>,
        max_iterations: u32,
        metrics: Arc<AppMetrics>,
    ) -> Self {
        let catalog = dispatcher.registry().catalog();
        Self {
            reasoning,
            dispatcher,
            catalog,
            max_iterations,
            metrics,
        }
    }

    /// 声明给推理步骤的工具目录
    pub fn catalog(&self) -> &[ToolSpec] {
        &self.catalog
    }

    /// 处理对话直到产生最终答案
    ///
    /// 对话的最后一个轮次应为用户轮次。推理步骤失败时直接返回错误，不做重试。
    pub async fn run(&self, conversation: &mut Conversation, sink: &EventSink) -> Result<AgentRun> {
        let mut governor = IterationGovernor::new(self.max_iterations);
        let mut state = AgentState::Reasoning;
        let mut pending: Vec<ToolRequest> = Vec::new();
        let mut finalizing = false;
        let mut answer = String::new();

        loop {
            debug!(session = %conversation.session_id, %state, rounds = governor.rounds(), "State transition");

            state = match state {
                AgentState::Reasoning => {
                    if sink.is_closed() {
                        return Err(AppError::Internal("caller disconnected".into()));
                    }

                    let outcome = self.reasoning.reason(conversation, &self.catalog).await;
                    self.metrics.record_reasoning_step(outcome.is_err());

                    match outcome? {
                        ReasoningOutcome::Answer(text) => {
                            conversation.push_assistant(&text, Vec::new());
                            answer = text;
                            AgentState::Done
                        }
                        ReasoningOutcome::ToolRequests { text, requests } if finalizing => {
                            warn!(
                                "Ignoring {} tool requests issued after forced finalize",
                                requests.len()
                            );
                            conversation.push_assistant(&text, Vec::new());
                            answer = if text.trim().is_empty() {
                                FINALIZE_FALLBACK_ANSWER.to_string()
                            } else {
                                text
                            };
                            AgentState::Done
                        }
                        ReasoningOutcome::ToolRequests { text, requests } => {
                            conversation.push_assistant(&text, requests.clone());
                            pending = requests;
                            if governor.record_round() {
                                AgentState::ForcedFinalize
                            } else {
                                AgentState::ExecutingTools
                            }
                        }
                    }
                }
                AgentState::ExecutingTools => {
                    let results = self.dispatcher.dispatch_with_events(&pending, sink).await;
                    let failed = results.iter().filter(|r| r.is_error).count();
                    self.metrics
                        .record_tool_calls(results.len() as u64, failed as u64);
                    conversation.push_tool_results(results);
                    pending.clear();
                    AgentState::Reasoning
                }
                AgentState::ForcedFinalize => {
                    info!(
                        session = %conversation.session_id,
                        "Iteration limit {} reached, forcing final answer",
                        governor.limit()
                    );
                    self.metrics.record_forced_finalization();
                    sink.emit(StreamEvent::log("SEARCH LIMIT REACHED. SYNTHESIZING..."))
                        .await;

                    let directives = pending
                        .drain(..)
                        .map(|r| ToolResult::success(&r, FORCED_FINALIZE_DIRECTIVE))
                        .collect();
                    conversation.push_tool_results(directives);
                    finalizing = true;
                    AgentState::Reasoning
                }
                AgentState::Done => {
                    return Ok(AgentRun {
                        answer,
                        rounds: governor.rounds(),
                        forced: finalizing,
                    });
                }
            };
        }
    }
}

//! 状态机的状态与迭代上限

use std::fmt;

/// 达到迭代上限后，代替工具结果返回给推理步骤的指令
pub const FORCED_FINALIZE_DIRECTIVE: &str = "SYSTEM ALERT: Maximum search steps reached. \
You have sufficient information. STOP SEARCHING. \
Synthesize your final answer immediately based on what you already know.";

/// 强制收尾后仍未得到文本答案时返回的内容
pub const FINALIZE_FALLBACK_ANSWER: &str =
    "Unable to produce a final answer within the search budget for this request.";

/// 对话状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentState {
    Reasoning,
    ExecutingTools,
    ForcedFinalize,
    Done,
}

impl fmt::Display for AgentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AgentState::Reasoning => "REASONING",
            AgentState::ExecutingTools => "EXECUTING_TOOLS",
            AgentState::ForcedFinalize => "FORCED_FINALIZE",
            AgentState::Done => "DONE",
        };
        f.write_str(name)
    }
}

/// 迭代计数器
///
/// 每次推理步骤请求工具计一次往返，计数达到上限时必须强制收尾。
#[derive(Debug, Clone)]
pub struct IterationGovernor {
    limit: u32,
    rounds: u32,
}

impl IterationGovernor {
    pub fn new(limit: u32) -> Self {
        Self {
            limit: limit.max(1),
            rounds: 0,
        }
    }

    /// 记录一次往返，返回是否已达到上限
    pub fn record_round(&mut self) -> bool {
        if self.rounds < self.limit {
            self.rounds += 1;
        }
        self.exhausted()
    }

    pub fn exhausted(&self) -> bool {
        self.rounds >= self.limit
    }

    pub fn rounds(&self) -> u32 {
        self.rounds
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }
}

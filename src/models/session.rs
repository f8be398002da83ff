use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::turn::{ToolRequest, ToolResult, Turn};

/// 会话对话记录
///
/// 在一次请求的生命周期内由状态机独占并追加；请求之间由会话存储保存，
/// 以便同一会话的下一次请求恢复上下文。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    /// 会话标识
    pub session_id: String,
    /// 有序轮次
    pub turns: Vec<Turn>,
    /// 最后更新时间
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    /// 创建空对话
    pub fn new(session_id: &str) -> Self {
        Self {
            session_id: session_id.to_string(),
            turns: Vec::new(),
            updated_at: Utc::now(),
        }
    }

    /// 轮次数量
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// 追加用户轮次
    pub fn push_user(&mut self, text: &str) {
        self.push(Turn::user(text));
    }

    /// 追加助手轮次
    pub fn push_assistant(&mut self, text: &str, tool_requests: Vec<ToolRequest>) {
        self.push(Turn::Assistant {
            text: text.to_string(),
            tool_requests,
        });
    }

    /// 追加一批工具结果
    pub fn push_tool_results(&mut self, results: Vec<ToolResult>) {
        for result in results {
            self.push(Turn::Tool(result));
        }
    }

    fn push(&mut self, turn: Turn) {
        self.turns.push(turn);
        self.updated_at = Utc::now();
    }

    /// 检查每个工具请求都恰好被一个工具结果按顺序响应
    pub fn is_well_formed(&self) -> bool {
        let mut expected: Vec<&str> = Vec::new();

        for turn in &self.turns {
            match turn {
                Turn::User { .. } => {
                    if !expected.is_empty() {
                        return false;
                    }
                }
                Turn::Assistant { tool_requests, .. } => {
                    if !expected.is_empty() {
                        return false;
                    }
                    expected = tool_requests.iter().map(|r| r.id.as_str()).collect();
                }
                Turn::Tool(result) => {
                    if expected.first() != Some(&result.request_id.as_str()) {
                        return false;
                    }
                    expected.remove(0);
                }
            }
        }

        expected.is_empty()
    }

    /// 最后一个助手轮次的文本
    pub fn last_answer(&self) -> Option<&str> {
        self.turns.iter().rev().find_map(|t| match t {
            Turn::Assistant { text, tool_requests } if tool_requests.is_empty() => {
                Some(text.as_str())
            }
            _ => None,
        })
    }

    /// 保留最近的轮次，并从用户轮次处截断
    ///
    /// 最近一次问答本身超过上限时整段保留，从其用户轮次开始。
    pub fn trim_history(&mut self, max_turns: usize) {
        if self.turns.len() <= max_turns {
            return;
        }

        let window = self.turns.len() - max_turns;
        let start = self.turns[window..]
            .iter()
            .position(Turn::is_user)
            .map(|offset| window + offset)
            .or_else(|| self.turns.iter().rposition(Turn::is_user));

        if let Some(start) = start {
            self.turns.drain(..start);
        }
    }
}

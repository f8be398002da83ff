use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// 工具调用请求
///
/// 由推理步骤产生，创建后不再修改。`id` 在同一个助手轮次内唯一。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolRequest {
    /// 请求标识
    pub id: String,
    /// 工具名称
    pub tool_name: String,
    /// 命名参数
    #[serde(default)]
    pub arguments: Map<String, Value>,
}

impl ToolRequest {
    /// 创建新的工具请求
    pub fn new(id: &str, tool_name: &str, arguments: Map<String, Value>) -> Self {
        Self {
            id: id.to_string(),
            tool_name: tool_name.to_string(),
            arguments,
        }
    }

    /// 使用随机 ID 创建工具请求
    pub fn with_generated_id(tool_name: &str, arguments: Map<String, Value>) -> Self {
        Self::new(&format!("call_{}", Uuid::new_v4().simple()), tool_name, arguments)
    }
}

/// 工具执行结果
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolResult {
    /// 对应的请求标识
    pub request_id: String,
    /// 工具名称
    pub tool_name: String,
    /// 结果文本
    pub result_text: String,
    /// 是否为错误结果
    pub is_error: bool,
}

impl ToolResult {
    /// 成功结果
    pub fn success(request: &ToolRequest, text: impl Into<String>) -> Self {
        Self {
            request_id: request.id.clone(),
            tool_name: request.tool_name.clone(),
            result_text: text.into(),
            is_error: false,
        }
    }

    /// 错误结果
    pub fn failure(request: &ToolRequest, text: impl Into<String>) -> Self {
        Self {
            request_id: request.id.clone(),
            tool_name: request.tool_name.clone(),
            result_text: text.into(),
            is_error: true,
        }
    }
}

/// 对话轮次
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Turn {
    /// 用户消息
    User { text: String },
    /// 助手消息，可能携带工具请求
    Assistant {
        text: String,
        #[serde(default)]
        tool_requests: Vec<ToolRequest>,
    },
    /// 工具结果
    Tool(ToolResult),
}

impl Turn {
    /// 创建用户轮次
    pub fn user(text: impl Into<String>) -> Self {
        Turn::User { text: text.into() }
    }

    /// 是否为用户轮次
    pub fn is_user(&self) -> bool {
        matches!(self, Turn::User { .. })
    }

    /// 该轮次携带的工具请求
    pub fn tool_requests(&self) -> &[ToolRequest] {
        match self {
            Turn::Assistant { tool_requests, .. } => tool_requests,
            _ => &[],
        }
    }
}

//! 核心数据模型模块
//!
//! 对话轮次、工具请求与结果、知识片段和流式事件。

pub mod event;
pub mod segment;
pub mod session;
pub mod turn;

pub use event::{EventSink, StreamEvent};
pub use segment::{AuthorityLabel, KnowledgeSegment, LabeledSegment};
pub use session::Conversation;
pub use turn::{ToolRequest, ToolResult, Turn};

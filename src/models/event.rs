use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// 纯文本流中日志行的前缀
pub const LOG_PREFIX: &str = "__LOG__";

/// 流式事件
///
/// 调用方可以据此区分状态日志与答案内容。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum StreamEvent {
    /// 状态/日志
    Log(String),
    /// 答案内容分块
    AnswerChunk(String),
    /// 终止性错误
    Error(String),
}

impl StreamEvent {
    pub fn log(text: impl Into<String>) -> Self {
        StreamEvent::Log(text.into())
    }

    pub fn is_answer(&self) -> bool {
        matches!(self, StreamEvent::AnswerChunk(_))
    }

    /// SSE 事件名
    pub fn event_name(&self) -> &'static str {
        match self {
            StreamEvent::Log(_) => "log",
            StreamEvent::AnswerChunk(_) => "answer",
            StreamEvent::Error(_) => "error",
        }
    }

    /// 事件的文本负载
    pub fn text(&self) -> &str {
        match self {
            StreamEvent::Log(text) | StreamEvent::AnswerChunk(text) | StreamEvent::Error(text) => {
                text
            }
        }
    }

    /// 纯文本流的线上格式
    pub fn to_wire(&self) -> String {
        match self {
            StreamEvent::Log(text) => format!("{LOG_PREFIX}{text}\n"),
            StreamEvent::AnswerChunk(text) => text.clone(),
            StreamEvent::Error(text) => format!("\n[CRITICAL ERROR: {text}]"),
        }
    }
}

/// 按字符边界切分答案
pub fn chunk_answer(text: &str, max_chars: usize) -> Vec<String> {
    if text.is_empty() {
        return Vec::new();
    }
    if max_chars == 0 {
        return vec![text.to_string()];
    }

    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(max_chars)
        .map(|chunk| chunk.iter().collect())
        .collect()
}

/// 事件发送端
///
/// 接收端关闭（客户端断开）后发送失败会被忽略。
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::Sender<StreamEvent>,
}

impl EventSink {
    pub fn new(tx: mpsc::Sender<StreamEvent>) -> Self {
        Self { tx }
    }

    /// 创建一对发送端/接收端
    pub fn channel(buffer: usize) -> (Self, mpsc::Receiver<StreamEvent>) {
        let (tx, rx) = mpsc::channel(buffer);
        (Self::new(tx), rx)
    }

    /// 发送事件，返回接收端是否仍然存在
    pub async fn emit(&self, event: StreamEvent) -> bool {
        self.tx.send(event).await.is_ok()
    }

    /// 接收端是否已关闭
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

//! 对话 DTO
//!
//! 定义对话接口的请求数据结构。

use serde::Deserialize;

use crate::error::AppError;

/// 对话请求
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ChatRequest {
    /// 用户消息
    pub message: String,
    /// 会话标识，缺省时使用共享的匿名会话
    pub session_id: Option<String>,
    /// 显式指定的缓存时间分区
    pub partition: Option<String>,
}

impl ChatRequest {
    /// 在打开事件流之前校验请求
    pub fn validate(&self) -> Result<(), AppError> {
        if self.message.trim().is_empty() {
            return Err(AppError::Validation("message cannot be empty".to_string()));
        }
        Ok(())
    }
}

//! 请求处理器

pub mod chat_handler;

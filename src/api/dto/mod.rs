//! DTO 模块

pub mod chat_dto;

pub use chat_dto::ChatRequest;

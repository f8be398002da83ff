//! Janus - 多轮工具增强问答编排服务
//!
//! 在推理步骤与工具之间循环直到得出最终答案：按年份回退检索版本化的知识库，
//! 查询实时网络来源，并在模型调用之前用规范化的缓存键短路重复问题。

pub mod agent;
pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod index;
pub mod models;
pub mod observability;
pub mod reasoning;
pub mod services;
pub mod tools;

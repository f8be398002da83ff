//! 服务模块

pub mod orchestrator;
pub mod retrieval;
pub mod session;
pub mod web_search;

pub use orchestrator::Orchestrator;
pub use retrieval::{RetrievalService, TemporalRetriever, create_retrieval_service};
pub use session::{MemorySessionStore, RedisSessionStore, SessionStore, create_session_store};
pub use web_search::{WebSearchAdapter, create_web_search_adapter};

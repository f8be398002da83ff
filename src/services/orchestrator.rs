//! 对话入口
//!
//! `process` 把一次请求串起来：缓存门 → 状态机 → 写回缓存 → 事件流。
//! 每个请求在独立任务中处理，调用方断开后未完成的工作会被放弃。

use std::sync::Arc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error, info, warn};

use crate::agent::ConversationStateMachine;
use crate::cache::CacheGate;
use crate::config::config::AgentConfig;
use crate::models::event::{EventSink, StreamEvent, chunk_answer};
use crate::models::session::Conversation;
use crate::observability::AppMetrics;
use crate::services::session::SessionStore;

/// 事件通道容量
const EVENT_BUFFER: usize = 64;

#[derive(Clone)]
pub struct Orchestrator {
    machine: Arc<ConversationStateMachine>,
    cache: Arc<CacheGate>,
    sessions: Arc<dyn SessionStore>,
    metrics: Arc<AppMetrics>,
    default_session_id: String,
    chunk_size: usize,
}

impl Orchestrator {
    pub fn new(
        machine: Arc<ConversationStateMachine>,
        cache: Arc<CacheGate>,
        sessions: Arc<dyn SessionStore>,
        metrics: Arc<AppMetrics>,
        config: &AgentConfig,
    ) -> Self {
        Self {
            machine,
            cache,
            sessions,
            metrics,
            default_session_id: config.default_session_id.clone(),
            chunk_size: config.answer_chunk_size,
        }
    }

    pub fn machine(&self) -> &ConversationStateMachine {
        &self.machine
    }

    /// 处理一次查询，返回有序的事件流
    pub fn process(
        &self,
        query: &str,
        session_id: Option<&str>,
        partition: Option<&str>,
    ) -> ReceiverStream<StreamEvent> {
        let (sink, rx) = EventSink::channel(EVENT_BUFFER);
        let this = self.clone();
        let query = query.to_string();
        let session_id = self.resolve_session(session_id);
        let partition = partition.map(str::to_string);

        tokio::spawn(async move {
            this.run_request(&query, &session_id, partition.as_deref(), &sink)
                .await;
        });

        ReceiverStream::new(rx)
    }

    fn resolve_session(&self, session_id: Option<&str>) -> String {
        session_id
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(&self.default_session_id)
            .to_string()
    }

    /// 在当前任务中处理一次查询，把事件写入 `sink`
    pub async fn run_request(
        &self,
        query: &str,
        session_id: &str,
        partition: Option<&str>,
        sink: &EventSink,
    ) {
        self.metrics.record_chat_request();
        sink.emit(StreamEvent::log("ESTABLISHING UPLINK...")).await;

        let query = query.trim();
        if query.is_empty() {
            sink.emit(StreamEvent::Error("message must not be empty".into()))
                .await;
            return;
        }

        let mut conversation = match self.sessions.load(session_id).await {
            Ok(conversation) => conversation,
            Err(e) => {
                warn!("Failed to load session {}: {}", session_id, e);
                Conversation::new(session_id)
            }
        };

        let key = self.cache.key_for(query, partition);
        if let Some(cached) = self.cache.lookup(&key).await {
            info!(session = %session_id, "Serving answer from cache");
            sink.emit(StreamEvent::log("RETRIEVED FROM CACHE.")).await;
            self.emit_answer(&cached, sink).await;

            conversation.push_user(query);
            conversation.push_assistant(&cached, Vec::new());
            self.save(conversation).await;
            return;
        }

        conversation.push_user(query);
        match self.machine.run(&mut conversation, sink).await {
            Ok(run) => {
                info!(
                    session = %session_id,
                    rounds = run.rounds,
                    forced = run.forced,
                    "Request completed"
                );
                self.emit_answer(&run.answer, sink).await;

                if !run.forced {
                    self.cache.store_answer(&key, &run.answer).await;
                }
                self.save(conversation).await;
            }
            Err(_) if sink.is_closed() => {
                debug!(session = %session_id, "Caller disconnected, request abandoned");
            }
            Err(e) => {
                error!(session = %session_id, "Reasoning failed: {}", e);
                sink.emit(StreamEvent::Error(e.to_string())).await;
            }
        }
    }

    async fn emit_answer(&self, answer: &str, sink: &EventSink) {
        for chunk in chunk_answer(answer, self.chunk_size) {
            if !sink.emit(StreamEvent::AnswerChunk(chunk)).await {
                debug!("Caller disconnected while streaming answer");
                return;
            }
        }
    }

    async fn save(&self, conversation: Conversation) {
        let session_id = conversation.session_id.clone();
        if let Err(e) = self.sessions.save(conversation).await {
            warn!("Failed to save session {}: {}", session_id, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheStore;
    use crate::config::config::{CacheBackend, CacheConfig};
    use crate::error::{AppError, Result};
    use crate::models::turn::ToolRequest;
    use crate::reasoning::{ReasoningOutcome, ReasoningStep};
    use crate::services::session::MemorySessionStore;
    use crate::tools::{ToolDispatcher, ToolRegistry, ToolSpec};
    use async_trait::async_trait;
    use futures_util::StreamExt;
    use serde_json::Map;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    const ANSWER: &str = "The minimum mass is 768 kg, excluding fuel, under the 2026 regulations.";

    /// 第一次推理请求一个未注册的工具，之后给出答案
    #[derive(Default)]
    struct TwoStepReasoning {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl ReasoningStep for TwoStepReasoning {
        async fn reason(&self, conversation: &Conversation, _: &[ToolSpec]) -> Result<ReasoningOutcome> {
            if self.fail {
                return Err(AppError::Reasoning("model offline".into()));
            }
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if conversation.turns.last().is_some_and(|t| t.is_user()) && call % 2 == 0 {
                Ok(ReasoningOutcome::ToolRequests {
                    text: String::new(),
                    requests: vec![ToolRequest::new("c1", "missing_tool", Map::new())],
                })
            } else {
                Ok(ReasoningOutcome::Answer(ANSWER.into()))
            }
        }
    }

    fn orchestrator(reasoning: Arc<TwoStepReasoning>) -> (Orchestrator, Arc<AppMetrics>) {
        let metrics = Arc::new(AppMetrics::default());
        let cache_config = CacheConfig {
            backend: CacheBackend::Memory,
            ..CacheConfig::default()
        };
        let cache = CacheGate::from_config(&cache_config, metrics.clone()).unwrap();
        (with_cache(reasoning, cache, metrics.clone()), metrics)
    }

    fn with_cache(
        reasoning: Arc<TwoStepReasoning>,
        cache: CacheGate,
        metrics: Arc<AppMetrics>,
    ) -> Orchestrator {
        let dispatcher = ToolDispatcher::new(Arc::new(ToolRegistry::new()), Duration::from_secs(1));
        let machine = ConversationStateMachine::new(reasoning, Arc::new(dispatcher), 7, metrics.clone());
        Orchestrator::new(
            Arc::new(machine),
            Arc::new(cache),
            Arc::new(MemorySessionStore::new(40, 16, Duration::from_secs(3600)).unwrap()),
            metrics.clone(),
            &AgentConfig {
                answer_chunk_size: 16,
                ..AgentConfig::default()
            },
        )
    }

    async fn collect(orchestrator: &Orchestrator, query: &str) -> Vec<StreamEvent> {
        orchestrator.process(query, Some("s1"), None).collect().await
    }

    fn answer_of(events: &[StreamEvent]) -> String {
        events
            .iter()
            .filter(|e| e.is_answer())
            .map(|e| e.text())
            .collect()
    }

    #[tokio::test]
    async fn test_full_run_streams_logs_then_answer() {
        let (orchestrator, _) = orchestrator(Arc::new(TwoStepReasoning::default()));
        let events = collect(&orchestrator, "What is the minimum mass?").await;

        assert_eq!(events[0], StreamEvent::log("ESTABLISHING UPLINK..."));
        assert!(events.contains(&StreamEvent::log("MISSING_TOOL FAILED.")));
        assert_eq!(answer_of(&events), ANSWER);

        let first_answer = events.iter().position(|e| e.is_answer()).unwrap();
        assert!(events[first_answer..].iter().all(|e| e.is_answer()));
    }

    #[tokio::test]
    async fn test_second_request_hits_cache() {
        let reasoning = Arc::new(TwoStepReasoning::default());
        let (orchestrator, metrics) = orchestrator(reasoning.clone());

        collect(&orchestrator, "What is the minimum weight?").await;
        let calls_after_first = reasoning.calls.load(Ordering::SeqCst);

        let events = collect(&orchestrator, "what is the minimum mass").await;

        assert_eq!(reasoning.calls.load(Ordering::SeqCst), calls_after_first);
        assert!(events.contains(&StreamEvent::log("RETRIEVED FROM CACHE.")));
        assert_eq!(answer_of(&events), ANSWER);
        assert_eq!(metrics.cache_hits_total.load(Ordering::Relaxed), 1);
    }

    /// 接受请求但从不应答的缓存存储
    struct StalledStore;

    #[async_trait]
    impl CacheStore for StalledStore {
        async fn get(&self, _key: &str) -> Result<Option<String>> {
            std::future::pending().await
        }

        async fn set(&self, _key: &str, _value: &str, _ttl: Duration) -> Result<()> {
            std::future::pending().await
        }

        fn backend_name(&self) -> &'static str {
            "stalled"
        }
    }

    #[tokio::test]
    async fn test_unresponsive_cache_does_not_stall_request() {
        let metrics = Arc::new(AppMetrics::default());
        let cache_config = CacheConfig {
            timeout_ms: 50,
            ..CacheConfig::default()
        };
        let cache = CacheGate::new(Some(Arc::new(StalledStore)), &cache_config, metrics.clone()).unwrap();
        let orchestrator = with_cache(Arc::new(TwoStepReasoning::default()), cache, metrics.clone());

        let events = tokio::time::timeout(Duration::from_secs(3), collect(&orchestrator, "minimum mass"))
            .await
            .expect("request waited on the cache store");

        assert_eq!(answer_of(&events), ANSWER);
        assert!(!events.iter().any(|e| matches!(e, StreamEvent::Error(_))));
        assert_eq!(metrics.cache_store_errors_total.load(Ordering::Relaxed), 2);
    }

    #[tokio::test]
    async fn test_reasoning_failure_is_terminal_error() {
        let reasoning = Arc::new(TwoStepReasoning {
            fail: true,
            ..TwoStepReasoning::default()
        });
        let (orchestrator, _) = orchestrator(reasoning);

        let events = collect(&orchestrator, "minimum mass").await;

        assert!(matches!(events.last(), Some(StreamEvent::Error(msg)) if msg.contains("model offline")));
        assert!(events.iter().all(|e| !e.is_answer()));
    }

    #[tokio::test]
    async fn test_empty_query_is_rejected() {
        let (orchestrator, _) = orchestrator(Arc::new(TwoStepReasoning::default()));
        let events = collect(&orchestrator, "   ").await;

        assert_eq!(events.len(), 2);
        assert!(matches!(events[1], StreamEvent::Error(_)));
    }

    #[test]
    fn test_default_session() {
        let (orchestrator, _) = orchestrator(Arc::new(TwoStepReasoning::default()));
        assert_eq!(orchestrator.resolve_session(None), "default");
        assert_eq!(orchestrator.resolve_session(Some("  ")), "default");
        assert_eq!(orchestrator.resolve_session(Some("abc")), "abc");
    }
}

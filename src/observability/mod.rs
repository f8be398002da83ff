//! 可观测性模块
//!
//! 提供 Prometheus 指标、结构化日志和健康检查。

pub mod logging;

pub use logging::init_tracing;

use axum::{
    Json, Router,
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
    routing::get,
};

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;

// ===== Simple Metrics (atomics) =====

/// 应用指标
#[derive(Default)]
pub struct AppMetrics {
    pub http_requests_total: AtomicU64,
    pub http_request_duration_sum: AtomicU64,
    pub chat_requests_total: AtomicU64,
    pub cache_hits_total: AtomicU64,
    pub cache_misses_total: AtomicU64,
    pub cache_writes_total: AtomicU64,
    pub cache_store_errors_total: AtomicU64,
    pub reasoning_steps_total: AtomicU64,
    pub reasoning_errors_total: AtomicU64,
    pub tool_calls_total: AtomicU64,
    pub tool_errors_total: AtomicU64,
    pub forced_finalizations_total: AtomicU64,
}

impl AppMetrics {
    /// 记录 HTTP 请求
    pub fn record_http_request(&self, duration_ms: u64) {
        self.http_requests_total.fetch_add(1, Ordering::Relaxed);
        self.http_request_duration_sum
            .fetch_add(duration_ms, Ordering::Relaxed);
    }

    pub fn record_chat_request(&self) {
        self.chat_requests_total.fetch_add(1, Ordering::Relaxed);
    }

    /// 记录缓存查询结果
    pub fn record_cache_lookup(&self, hit: bool) {
        let counter = if hit {
            &self.cache_hits_total
        } else {
            &self.cache_misses_total
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_write(&self) {
        self.cache_writes_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_store_error(&self) {
        self.cache_store_errors_total.fetch_add(1, Ordering::Relaxed);
    }

    /// 记录一次推理步骤
    pub fn record_reasoning_step(&self, failed: bool) {
        self.reasoning_steps_total.fetch_add(1, Ordering::Relaxed);
        if failed {
            self.reasoning_errors_total.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// 记录一批工具调用
    pub fn record_tool_calls(&self, total: u64, failed: u64) {
        self.tool_calls_total.fetch_add(total, Ordering::Relaxed);
        self.tool_errors_total.fetch_add(failed, Ordering::Relaxed);
    }

    pub fn record_forced_finalization(&self) {
        self.forced_finalizations_total
            .fetch_add(1, Ordering::Relaxed);
    }

    /// 生成 Prometheus 格式指标
    pub fn gather(&self) -> String {
        let counters: [(&str, &str, &AtomicU64); 11] = [
            ("http_requests_total", "Total HTTP requests", &self.http_requests_total),
            ("chat_requests_total", "Total chat requests", &self.chat_requests_total),
            ("cache_hits_total", "Response cache hits", &self.cache_hits_total),
            ("cache_misses_total", "Response cache misses", &self.cache_misses_total),
            ("cache_writes_total", "Responses written to the cache", &self.cache_writes_total),
            (
                "cache_store_errors_total",
                "Cache store failures absorbed by the gate",
                &self.cache_store_errors_total,
            ),
            ("reasoning_steps_total", "Reasoning steps executed", &self.reasoning_steps_total),
            ("reasoning_errors_total", "Failed reasoning steps", &self.reasoning_errors_total),
            ("tool_calls_total", "Tool calls dispatched", &self.tool_calls_total),
            ("tool_errors_total", "Tool calls that produced an error result", &self.tool_errors_total),
            (
                "forced_finalizations_total",
                "Requests that hit the iteration limit",
                &self.forced_finalizations_total,
            ),
        ];

        let mut output = String::new();
        for (name, help, value) in counters {
            output.push_str(&format!(
                "# HELP {name} {help}\n# TYPE {name} counter\n{name} {}\n",
                value.load(Ordering::Relaxed)
            ));
        }
        output.push_str(&format!(
            "# HELP http_request_duration_seconds HTTP request duration in seconds\n\
# TYPE http_request_duration_seconds summary\n\
http_request_duration_seconds_sum {}\n\
http_request_duration_seconds_count {}\n",
            self.http_request_duration_sum.load(Ordering::Relaxed) as f64 / 1000.0,
            self.http_requests_total.load(Ordering::Relaxed),
        ));
        output
    }
}

// ===== Health Check =====

/// 健康检查状态
#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub status: String,
    pub timestamp: String,
    pub version: String,
    pub uptime_seconds: f64,
    pub checks: Vec<HealthCheck>,
}

/// 单个健康检查项
#[derive(Debug, Serialize)]
pub struct HealthCheck {
    pub name: String,
    pub status: String,
    pub message: Option<String>,
}

/// 健康检查结果
#[derive(Clone)]
pub struct HealthCheckResult {
    pub name: String,
    pub healthy: bool,
    pub message: String,
}

impl HealthCheckResult {
    pub fn new(name: &str, healthy: bool, message: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            healthy,
            message: message.into(),
        }
    }
}

/// 可观测性状态
#[derive(Clone)]
pub struct ObservabilityState {
    pub metrics: Arc<AppMetrics>,
    pub health_checks: Arc<Mutex<Vec<HealthCheckResult>>>,
    pub start_time: DateTime<Utc>,
    pub version: String,
}

impl ObservabilityState {
    pub fn new(version: String, metrics: Arc<AppMetrics>) -> Self {
        Self {
            metrics,
            health_checks: Arc::new(Mutex::new(Vec::new())),
            start_time: Utc::now(),
            version,
        }
    }

    /// 记录检查结果，同名检查会被替换
    pub async fn set_health_check(&self, result: HealthCheckResult) {
        let mut checks = self.health_checks.lock().await;
        checks.retain(|c| c.name != result.name);
        checks.push(result);
    }

    /// 获取应用正常运行时间
    pub fn uptime_seconds(&self) -> f64 {
        (Utc::now() - self.start_time).num_seconds() as f64
    }
}

// ===== Health Check Handlers =====

/// 获取完整健康状态
///
/// 缓存等可降级依赖不健康时服务仍可用，因此只报告为 `degraded`。
pub async fn health_check(State(state): State<Arc<ObservabilityState>>) -> impl IntoResponse {
    let checks = state.health_checks.lock().await;
    let all_healthy = checks.iter().all(|c| c.healthy);

    let health_status = HealthStatus {
        status: if all_healthy { "healthy" } else { "degraded" }.to_string(),
        timestamp: Utc::now().to_rfc3339(),
        version: state.version.clone(),
        uptime_seconds: state.uptime_seconds(),
        checks: checks
            .iter()
            .map(|c| HealthCheck {
                name: c.name.clone(),
                status: if c.healthy { "healthy" } else { "unhealthy" }.to_string(),
                message: Some(c.message.clone()),
            })
            .collect(),
    };

    Json(health_status)
}

/// 简单存活检查
pub async fn liveness() -> impl IntoResponse {
    "OK"
}

/// Prometheus 指标端点
pub async fn metrics(State(state): State<Arc<ObservabilityState>>) -> impl IntoResponse {
    state.metrics.gather()
}

/// 版本信息端点
pub async fn version(State(state): State<Arc<ObservabilityState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "version": state.version,
        "uptime_seconds": state.uptime_seconds(),
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

/// 创建可观测性路由
pub fn create_observability_router(state: Arc<ObservabilityState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/health/live", get(liveness))
        .route("/metrics", get(metrics))
        .route("/version", get(version))
        .with_state(state)
}

// ===== Request Metrics Middleware =====

/// 记录请求指标的中间件
pub async fn track_requests(
    State(state): State<Arc<ObservabilityState>>,
    req: Request,
    next: Next,
) -> Response {
    let start = std::time::Instant::now();
    let response = next.run(req).await;
    state
        .metrics
        .record_http_request(start.elapsed().as_millis() as u64);
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request as HttpRequest, StatusCode};
    use tower::ServiceExt;

    #[test]
    fn test_metrics_gather() {
        let metrics = AppMetrics::default();
        metrics.record_http_request(100);
        metrics.record_cache_lookup(true);
        metrics.record_cache_lookup(false);
        metrics.record_cache_lookup(false);
        metrics.record_reasoning_step(true);
        metrics.record_tool_calls(3, 1);
        metrics.record_forced_finalization();

        let output = metrics.gather();
        assert!(output.contains("http_requests_total 1\n"));
        assert!(output.contains("cache_hits_total 1\n"));
        assert!(output.contains("cache_misses_total 2\n"));
        assert!(output.contains("reasoning_errors_total 1\n"));
        assert!(output.contains("tool_calls_total 3\n"));
        assert!(output.contains("tool_errors_total 1\n"));
        assert!(output.contains("forced_finalizations_total 1\n"));
        assert!(output.contains("http_request_duration_seconds_sum 0.1\n"));
    }

    #[tokio::test]
    async fn test_health_check_replaces_same_name() {
        let state = ObservabilityState::new("0.2.0".into(), Arc::new(AppMetrics::default()));
        state
            .set_health_check(HealthCheckResult::new("cache", false, "unreachable"))
            .await;
        state
            .set_health_check(HealthCheckResult::new("cache", true, "connected"))
            .await;

        let checks = state.health_checks.lock().await;
        assert_eq!(checks.len(), 1);
        assert!(checks[0].healthy);
    }

    #[tokio::test]
    async fn test_router_serves_metrics() {
        let state = Arc::new(ObservabilityState::new(
            "0.2.0".into(),
            Arc::new(AppMetrics::default()),
        ));
        state.metrics.record_chat_request();

        let response = create_observability_router(state)
            .oneshot(HttpRequest::get("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert!(String::from_utf8_lossy(&bytes).contains("chat_requests_total 1"));
    }
}

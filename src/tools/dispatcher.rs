//! Tool dispatcher.
//!
//! Executes one batch of tool requests. Per-call failures (unknown tool, invalid
//! arguments, errors, panics, timeouts) become `is_error` results; the batch
//! always yields one result per request, in request order.

use futures_util::FutureExt;
use futures_util::future::join_all;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::models::event::{EventSink, StreamEvent};
use crate::models::turn::{ToolRequest, ToolResult};
use crate::tools::ToolRegistry;

pub struct ToolDispatcher {
    registry: Arc<ToolRegistry>,
    timeout: Duration,
}

impl ToolDispatcher {
    pub fn new(registry: Arc<ToolRegistry>, timeout: Duration) -> Self {
        Self { registry, timeout }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Execute a batch without emitting progress events
    pub async fn dispatch(&self, requests: &[ToolRequest]) -> Vec<ToolResult> {
        join_all(requests.iter().map(|r| self.execute(r))).await
    }

    /// Execute a batch, reporting start and completion of every call
    pub async fn dispatch_with_events(
        &self,
        requests: &[ToolRequest],
        sink: &EventSink,
    ) -> Vec<ToolResult> {
        join_all(requests.iter().map(|request| async move {
            let start_line = match self.registry.get(&request.tool_name) {
                Some(tool) => tool.describe_call(&request.arguments),
                None => format!("UNKNOWN TOOL {}", request.tool_name),
            };
            sink.emit(StreamEvent::log(start_line)).await;

            let result = self.execute(request).await;

            let done_line = if result.is_error {
                format!("{} FAILED.", request.tool_name.to_uppercase())
            } else {
                "DATA SECURED.".to_string()
            };
            sink.emit(StreamEvent::log(done_line)).await;
            result
        }))
        .await
    }

    /// Execute a single request
    pub async fn execute(&self, request: &ToolRequest) -> ToolResult {
        let Some(tool) = self.registry.get(&request.tool_name) else {
            warn!("Tool not found: {}", request.tool_name);
            return ToolResult::failure(
                request,
                format!("Error: Tool {} not found.", request.tool_name),
            );
        };

        debug!(tool = %request.tool_name, id = %request.id, "Executing tool");
        let call = AssertUnwindSafe(tool.invoke(&request.arguments)).catch_unwind();

        match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(Ok(text))) => ToolResult::success(request, text),
            Ok(Ok(Err(e))) => {
                warn!(tool = %request.tool_name, "Tool execution failed: {}", e);
                ToolResult::failure(request, format!("Error executing tool: {}", e))
            }
            Ok(Err(payload)) => {
                let message = panic_message(payload.as_ref());
                warn!(tool = %request.tool_name, "Tool panicked: {}", message);
                ToolResult::failure(request, format!("Error executing tool: {}", message))
            }
            Err(_) => {
                warn!(tool = %request.tool_name, "Tool timed out after {:?}", self.timeout);
                ToolResult::failure(
                    request,
                    format!("Error executing tool: timed out after {}s", self.timeout.as_secs()),
                )
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "tool panicked".to_string()
    }
}

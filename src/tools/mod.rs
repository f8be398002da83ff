//! Tool catalog and registry.
//!
//! Every tool is declared to the reasoning step as `{name, description, parameters}`
//! where `parameters` is a JSON schema; the reasoning step's tool requests are
//! matched against this catalog by name.

pub mod dispatcher;
pub mod knowledge;
pub mod web;

pub use dispatcher::ToolDispatcher;
pub use knowledge::KnowledgeBaseTool;
pub use web::WebSearchTool;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{AppError, Result};

/// Tool declaration exposed to the reasoning step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

impl ToolSpec {
    /// Build a spec whose parameter schema is derived from `T`
    pub fn for_input<T: JsonSchema>(name: &str, description: &str) -> Self {
        let mut parameters =
            serde_json::to_value(schemars::schema_for!(T)).unwrap_or_else(|_| Value::Null);
        if let Some(object) = parameters.as_object_mut() {
            object.remove("$schema");
            object.remove("title");
        }

        Self {
            name: name.to_string(),
            description: description.to_string(),
            parameters,
        }
    }
}

/// Parse named arguments into a typed input
pub fn parse_arguments<T: for<'de> Deserialize<'de>>(
    tool_name: &str,
    arguments: &Map<String, Value>,
) -> Result<T> {
    serde_json::from_value(Value::Object(arguments.clone())).map_err(|e| {
        AppError::Validation(format!("invalid arguments for {}: {}", tool_name, e))
    })
}

/// A capability the reasoning step can invoke
#[async_trait]
pub trait Tool: Send + Sync {
    fn spec(&self) -> ToolSpec;

    async fn invoke(&self, arguments: &Map<String, Value>) -> Result<String>;

    /// Status line emitted when the call starts
    fn describe_call(&self, _arguments: &Map<String, Value>) -> String {
        format!("INVOKING {}...", self.spec().name.to_uppercase())
    }
}

/// Registered tools, in declaration order
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
    by_name: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Result<()> {
        let name = tool.spec().name;
        if self.by_name.contains_key(&name) {
            return Err(AppError::Config(format!("tool '{}' registered twice", name)));
        }
        self.by_name.insert(name, self.tools.len());
        self.tools.push(tool);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.by_name.get(name).map(|&i| self.tools[i].clone())
    }

    pub fn catalog(&self) -> Vec<ToolSpec> {
        self.tools.iter().map(|t| t.spec()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

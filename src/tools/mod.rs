//! Tool trait and registry
//!
//! Tools are schema-described actions bound to expense store operations.
//! Dispatch never fails: every call yields a text result for the model,
//! including unknown names, bad arguments, store errors and panics.

use crate::config::Principal;
use crate::error::OrchestrationError;
use crate::llm::{ToolCallRequest, ToolDeclaration, ToolResult};
use crate::models::StoreOutcome;
use crate::store::ExpenseStore;
use crate::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, warn};

pub mod expense;

pub use expense::{
    ApproveExpenseTool, CreateExpenseTool, GetAllExpensesTool, GetCategoriesTool,
    GetExpensesByStatusTool, GetPendingExpensesTool,
};

/// Trait for a single tool
#[async_trait::async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    /// JSON schema of the arguments object
    fn parameters(&self) -> Value;
    /// `InvalidToolInput` errors are reported as argument problems; any
    /// other error is reported as an execution failure.
    async fn execute(&self, arguments: &Value) -> Result<StoreOutcome<Value>>;
}

/// Ordered tool registry. Registration order is the advertised order.
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
    index: HashMap<String, usize>,
    declarations: Vec<ToolDeclaration>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: Vec::new(),
            index: HashMap::new(),
            declarations: Vec::new(),
        }
    }

    /// Register a tool; a tool with the same name is replaced in place
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let declaration = ToolDeclaration {
            name: tool.name().to_string(),
            description: tool.description().to_string(),
            parameters: tool.parameters(),
        };

        match self.index.get(tool.name()) {
            Some(&position) => {
                self.tools[position] = tool;
                self.declarations[position] = declaration;
            }
            None => {
                self.index.insert(tool.name().to_string(), self.tools.len());
                self.tools.push(tool);
                self.declarations.push(declaration);
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.index.get(name).map(|&i| Arc::clone(&self.tools[i]))
    }

    pub fn list(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    /// Declarations in registration order, for advertising to the backend
    pub fn declarations(&self) -> &[ToolDeclaration] {
        &self.declarations
    }

    /// Execute one call. Always produces a result.
    pub async fn execute(&self, call: &ToolCallRequest) -> ToolResult {
        let Some(tool) = self.get(&call.name) else {
            warn!(tool_name = %call.name, "Model requested an unknown function");
            return ToolResult {
                tool_call_id: call.id.clone(),
                text: format!("Unknown function: {}", call.name),
            };
        };

        let start = Instant::now();
        let text = match tool.execute(&call.arguments).await {
            Ok(outcome) => render_outcome(outcome),
            Err(OrchestrationError::InvalidToolInput(detail)) => {
                warn!(tool_name = %call.name, %detail, "Invalid tool arguments");
                format!("Invalid arguments for {}: {}", call.name, detail)
            }
            Err(e) => {
                warn!(tool_name = %call.name, error = %e, "Tool execution failed");
                format!("Error executing {}: {}", call.name, e)
            }
        };

        debug!(
            tool_name = %call.name,
            execution_time_ms = start.elapsed().as_millis() as u64,
            "Tool executed"
        );

        ToolResult {
            tool_call_id: call.id.clone(),
            text,
        }
    }

    /// Execute calls concurrently; results come back in request order.
    /// Calls still running when the returned future is dropped are aborted.
    pub async fn execute_all(self: &Arc<Self>, calls: &[ToolCallRequest]) -> Vec<ToolResult> {
        let mut tasks = AbortOnDrop(
            calls
                .iter()
                .cloned()
                .map(|call| {
                    let registry = Arc::clone(self);
                    tokio::spawn(async move { registry.execute(&call).await })
                })
                .collect(),
        );

        let mut results = Vec::with_capacity(calls.len());
        for (call, handle) in calls.iter().zip(tasks.0.iter_mut()) {
            let result = match handle.await {
                Ok(result) => result,
                Err(join_error) => {
                    let detail = describe_join_error(join_error);
                    warn!(tool_name = %call.name, %detail, "Tool task failed");
                    ToolResult {
                        tool_call_id: call.id.clone(),
                        text: format!("Error executing {}: {}", call.name, detail),
                    }
                }
            };
            results.push(result);
        }

        results
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

struct AbortOnDrop(Vec<JoinHandle<ToolResult>>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        for handle in &self.0 {
            handle.abort();
        }
    }
}

fn describe_join_error(error: JoinError) -> String {
    if !error.is_panic() {
        return "task was cancelled".to_string();
    }

    let payload = error.into_panic();
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "tool panicked".to_string()
    }
}

/// Text handed back to the model. Degraded results keep the store's
/// diagnostic next to the placeholder data.
fn render_outcome(outcome: StoreOutcome<Value>) -> String {
    match outcome {
        StoreOutcome::Ok(data) => data.to_string(),
        StoreOutcome::OkWithWarning(data, warning) => {
            json!({ "data": data, "error": warning }).to_string()
        }
        StoreOutcome::Err(error) => format!("Error: {}", error),
    }
}

/// Serialize the payload of a store outcome
pub(crate) fn outcome_to_json<T: Serialize>(outcome: StoreOutcome<T>) -> Result<StoreOutcome<Value>> {
    Ok(match outcome {
        StoreOutcome::Ok(data) => StoreOutcome::Ok(serde_json::to_value(data)?),
        StoreOutcome::OkWithWarning(data, warning) => {
            StoreOutcome::OkWithWarning(serde_json::to_value(data)?, warning)
        }
        StoreOutcome::Err(error) => StoreOutcome::Err(error),
    })
}

/// Deserialize tool arguments; any mismatch is an `InvalidToolInput`
pub(crate) fn parse_arguments<T: DeserializeOwned>(arguments: &Value) -> Result<T> {
    let arguments = match arguments {
        Value::Null => json!({}),
        other => other.clone(),
    };

    serde_json::from_value(arguments)
        .map_err(|e| OrchestrationError::InvalidToolInput(e.to_string()))
}

/// Registry with the six expense tools, in catalog order
pub fn create_expense_registry(store: Arc<dyn ExpenseStore>, principal: Principal) -> ToolRegistry {
    let mut registry = ToolRegistry::new();

    registry.register(Arc::new(GetAllExpensesTool::new(store.clone())));
    registry.register(Arc::new(GetExpensesByStatusTool::new(store.clone())));
    registry.register(Arc::new(GetPendingExpensesTool::new(store.clone())));
    registry.register(Arc::new(CreateExpenseTool::new(store.clone(), principal)));
    registry.register(Arc::new(ApproveExpenseTool::new(store.clone(), principal)));
    registry.register(Arc::new(GetCategoriesTool::new(store)));

    registry
}

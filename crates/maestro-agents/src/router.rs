use crate::agent::{Agent, AgentRole};
use crate::metrics::{AgentMetrics, MetricsRecorder};
use maestro_core::{MaestroError, MaestroResult, Task, ToolRegistry};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, warn};
use uuid::Uuid;

/// Routing decision for one task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    pub task_id: Uuid,
    /// Executor capability the task is bound to.
    pub capability: String,
    /// At most one tool, chosen from the enabled set.
    pub tool: Option<String>,
}

/// One affinity-table entry: capability plus tools in preference order.
#[derive(Debug, Clone)]
pub struct Route {
    pub capability: String,
    pub preferred_tools: Vec<String>,
}

impl Route {
    pub fn new(capability: &str) -> Self {
        Self {
            capability: capability.to_string(),
            preferred_tools: Vec::new(),
        }
    }

    pub fn with_tools(mut self, tools: &[&str]) -> Self {
        self.preferred_tools = tools.iter().map(|t| (*t).to_string()).collect();
        self
    }
}

/// Assigns each task to an executor capability and at most one tool using
/// a declarative affinity table — no model call. Deterministic: the same
/// task type and the same enabled-tool set always yield the same
/// assignment.
pub struct Router {
    name: String,
    table: HashMap<String, Route>,
    default_route: Option<Route>,
    metrics: MetricsRecorder,
}

impl Router {
    /// Router with the built-in affinity table and a `general` fallback.
    pub fn new() -> Self {
        let mut table = HashMap::new();
        table.insert(
            "analysis".to_string(),
            Route::new("analysis").with_tools(&["document_search"]),
        );
        table.insert("generation".to_string(), Route::new("generation"));
        table.insert(
            "execution".to_string(),
            Route::new("execution").with_tools(&["shell", "http_fetch"]),
        );
        table.insert(
            "research".to_string(),
            Route::new("analysis").with_tools(&["web_search", "document_search"]),
        );
        Self {
            name: "router".to_string(),
            table,
            default_route: Some(Route::new("general")),
            metrics: MetricsRecorder::new(),
        }
    }

    /// Router with a custom table and no fallback: unknown types become
    /// unroutable.
    pub fn with_table(table: HashMap<String, Route>) -> Self {
        Self {
            name: "router".to_string(),
            table,
            default_route: None,
            metrics: MetricsRecorder::new(),
        }
    }

    pub fn with_default_route(mut self, route: Route) -> Self {
        self.default_route = Some(route);
        self
    }

    /// Route one task. Errors with `Routing` when no capability matches;
    /// the caller marks the task failed and keeps routing the rest.
    pub fn route(&self, task: &Task, tools: &ToolRegistry) -> MaestroResult<Assignment> {
        let route = match self.table.get(&task.task_type) {
            Some(route) => route,
            None => match &self.default_route {
                Some(route) => {
                    debug!(task_id = %task.id, task_type = %task.task_type, "Router: falling back to default capability");
                    route
                }
                None => {
                    warn!(task_id = %task.id, task_type = %task.task_type, "Router: no capability matches");
                    self.metrics.record(false, 0);
                    return Err(MaestroError::Routing(format!(
                        "no executor capability for task type '{}'",
                        task.task_type
                    )));
                }
            },
        };

        // First enabled preferred tool wins; none is a valid outcome.
        let tool = route
            .preferred_tools
            .iter()
            .find(|t| tools.is_available(t))
            .cloned();

        self.metrics.record(true, 0);
        Ok(Assignment {
            task_id: task.id,
            capability: route.capability.clone(),
            tool,
        })
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

impl Agent for Router {
    fn name(&self) -> &str {
        &self.name
    }

    fn role(&self) -> AgentRole {
        AgentRole::Router
    }

    fn metrics(&self) -> AgentMetrics {
        self.metrics.snapshot()
    }
}

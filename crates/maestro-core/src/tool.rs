use crate::error::{MaestroError, MaestroResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Metadata describing a tool's interface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub parameters_schema: serde_json::Value,
    pub category: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

/// A capability the executor can invoke on behalf of a task.
///
/// Tools are process-wide singletons registered once; sessions reference
/// them by name only and never clone or mutate them.
#[async_trait]
pub trait Tool: Send + Sync {
    fn descriptor(&self) -> &ToolDescriptor;

    async fn invoke(&self, params: serde_json::Value) -> MaestroResult<serde_json::Value>;
}

/// Central registry for all available tools.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    usage: Mutex<HashMap<String, u64>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
            usage: Mutex::new(HashMap::new()),
        }
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.descriptor().name.clone();
        info!(tool = %name, "Registered tool");
        self.tools.insert(name, tool);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.get(name)
    }

    /// Whether a tool exists and is enabled.
    pub fn is_available(&self, name: &str) -> bool {
        self.tools
            .get(name)
            .map(|t| t.descriptor().enabled)
            .unwrap_or(false)
    }

    pub fn list_descriptors(&self) -> Vec<&ToolDescriptor> {
        self.tools.values().map(|t| t.descriptor()).collect()
    }

    /// Invoke a tool by name, recording usage.
    pub async fn invoke(
        &self,
        name: &str,
        params: serde_json::Value,
    ) -> MaestroResult<serde_json::Value> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| MaestroError::Execution(format!("unknown tool: {name}")))?;

        if !tool.descriptor().enabled {
            warn!(tool = %name, "Invocation of disabled tool rejected");
            return Err(MaestroError::Execution(format!("tool '{name}' is disabled")));
        }

        *self.usage.lock().entry(name.to_string()).or_insert(0) += 1;
        tool.invoke(params).await
    }

    /// How many times a tool has been invoked.
    pub fn usage(&self, name: &str) -> u64 {
        self.usage.lock().get(name).copied().unwrap_or(0)
    }

    pub fn tool_count(&self) -> usize {
        self.tools.len()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

use crate::metrics::AgentMetrics;
use serde::{Deserialize, Serialize};

/// The four pipeline capabilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentRole {
    Planner,
    Router,
    Executor,
    Validator,
}

impl std::fmt::Display for AgentRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentRole::Planner => write!(f, "planner"),
            AgentRole::Router => write!(f, "router"),
            AgentRole::Executor => write!(f, "executor"),
            AgentRole::Validator => write!(f, "validator"),
        }
    }
}

/// Common surface over the pipeline agents: an explicit capability
/// interface instead of any-object-with-an-execute-method. Tools keep
/// their own narrower `Tool::invoke` interface.
pub trait Agent: Send + Sync {
    fn name(&self) -> &str;
    fn role(&self) -> AgentRole;
    fn metrics(&self) -> AgentMetrics;
}

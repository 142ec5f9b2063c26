use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Priority of a task within its plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    Low,
    Medium,
    High,
}

impl TaskPriority {
    /// Parse a priority string, defaulting to `Medium` for unknown values.
    pub fn parse_priority(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "low" => TaskPriority::Low,
            "high" => TaskPriority::High,
            _ => TaskPriority::Medium,
        }
    }
}

/// Status of a task. Only ever advances forward: a task that left `Pending`
/// is never resurrected — a retry is modeled as a fresh task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed { reason: String },
    /// The owning session was cancelled before this task started.
    Cancelled,
}

impl TaskStatus {
    /// Whether the status is terminal for the task.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed { .. } | TaskStatus::Cancelled
        )
    }
}

/// The payload a task produced: prose content, tool output, or both.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskResult {
    /// Textual output from a completion-backed execution.
    #[serde(default)]
    pub content: Option<String>,
    /// Structured output from a tool invocation.
    #[serde(default)]
    pub tool_output: Option<serde_json::Value>,
}

impl TaskResult {
    /// A result carrying only text content.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            tool_output: None,
        }
    }

    /// A result carrying only tool output.
    pub fn tool(output: serde_json::Value) -> Self {
        Self {
            content: None,
            tool_output: Some(output),
        }
    }

    /// True when neither content nor tool output is present.
    pub fn is_empty(&self) -> bool {
        self.content.is_none() && self.tool_output.is_none()
    }
}

/// One atomic unit of work inside an execution plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub description: String,
    /// Free-form category such as "analysis", "generation", "execution".
    pub task_type: String,
    pub priority: TaskPriority,
    /// Ids of tasks in the same plan that must complete first.
    pub dependencies: Vec<Uuid>,
    pub status: TaskStatus,
    /// Executor capability this task was routed to.
    #[serde(default)]
    pub assigned_to: Option<String>,
    /// Tool selected by the router, if any.
    #[serde(default)]
    pub assigned_tool: Option<String>,
    #[serde(default)]
    pub result: Option<TaskResult>,
    #[serde(default)]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Wall-clock execution time recorded by the executor.
    #[serde(default)]
    pub execution_ms: Option<u64>,
}

impl Task {
    pub fn new(description: impl Into<String>, task_type: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            description: description.into(),
            task_type: task_type.into(),
            priority: TaskPriority::Medium,
            dependencies: Vec::new(),
            status: TaskStatus::Pending,
            assigned_to: None,
            assigned_tool: None,
            result: None,
            error: None,
            created_at: now,
            updated_at: now,
            execution_ms: None,
        }
    }

    pub fn with_priority(mut self, priority: TaskPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_dependencies(mut self, deps: Vec<Uuid>) -> Self {
        self.dependencies = deps;
        self
    }

    /// A task is ready when it is pending and every dependency id is in the
    /// completed set.
    pub fn is_ready(&self, completed_ids: &[Uuid]) -> bool {
        self.status == TaskStatus::Pending
            && self
                .dependencies
                .iter()
                .all(|dep| completed_ids.contains(dep))
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Move the task to `Running`. Refuses to resurrect a terminal task.
    pub fn mark_running(&mut self) -> bool {
        if self.status != TaskStatus::Pending {
            return false;
        }
        self.status = TaskStatus::Running;
        self.touch();
        true
    }

    /// Move the task to `Completed` with its result.
    pub fn mark_completed(&mut self, result: TaskResult) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = TaskStatus::Completed;
        self.result = Some(result);
        self.touch();
        true
    }

    /// Move the task to `Failed`, retaining the error.
    pub fn mark_failed(&mut self, reason: impl Into<String>) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        let reason = reason.into();
        self.error = Some(reason.clone());
        self.status = TaskStatus::Failed { reason };
        self.touch();
        true
    }

    /// Move a never-started task to `Cancelled`.
    pub fn mark_cancelled(&mut self) -> bool {
        if self.status != TaskStatus::Pending {
            return false;
        }
        self.status = TaskStatus::Cancelled;
        self.touch();
        true
    }
}

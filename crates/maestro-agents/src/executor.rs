use crate::agent::{Agent, AgentRole};
use crate::metrics::{AgentMetrics, MetricsRecorder};
use crate::router::Assignment;
use maestro_core::{
    CompletionBackend, CompletionRequest, MaestroError, MaestroResult, Message, Task, TaskResult,
    ToolRegistry,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tracing::{info, warn};

/// Retry behaviour for task execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Attempts beyond the first.
    pub max_retries: u32,
    /// Base delay in milliseconds for exponential backoff.
    pub backoff_base_ms: u64,
    /// Cap for the backoff delay.
    pub backoff_max_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_base_ms: 200,
            backoff_max_ms: 10_000,
        }
    }
}

/// Exponential backoff capped at `backoff_max_ms`.
fn compute_backoff(policy: &RetryPolicy, attempt: u32) -> u64 {
    let delay = policy
        .backoff_base_ms
        .saturating_mul(2u64.saturating_pow(attempt));
    delay.min(policy.backoff_max_ms)
}

/// Performs one task using its routed tool or a completion call.
///
/// The executor mutates the task in place (status, result, timestamps,
/// execution time) and records its own rolling metrics.
pub struct Executor {
    name: String,
    completion: Arc<dyn CompletionBackend>,
    tools: Arc<ToolRegistry>,
    policy: RetryPolicy,
    metrics: MetricsRecorder,
}

impl Executor {
    pub fn new(completion: Arc<dyn CompletionBackend>, tools: Arc<ToolRegistry>) -> Self {
        Self {
            name: "executor".to_string(),
            completion,
            tools,
            policy: RetryPolicy::default(),
            metrics: MetricsRecorder::new(),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Execute `task` under `assignment`. The cancel receiver makes the
    /// wait cooperative: a signal before the task starts leaves it
    /// `Cancelled`; a signal mid-attempt abandons the in-flight call.
    pub async fn execute(
        &self,
        task: &mut Task,
        assignment: &Assignment,
        mut cancel: watch::Receiver<bool>,
    ) {
        if *cancel.borrow() {
            task.mark_cancelled();
            return;
        }

        task.assigned_to = Some(assignment.capability.clone());
        task.assigned_tool = assignment.tool.clone();
        if !task.mark_running() {
            warn!(task_id = %task.id, status = ?task.status, "Executor: task not runnable");
            return;
        }

        let start = Instant::now();
        let mut last_err: Option<MaestroError> = None;

        for attempt in 0..=self.policy.max_retries {
            let outcome = tokio::select! {
                result = self.attempt(task, assignment) => result,
                _ = cancel.changed() => {
                    // Session-level cancel: abandon the in-flight attempt.
                    let elapsed = start.elapsed().as_millis() as u64;
                    task.execution_ms = Some(elapsed);
                    task.mark_failed("execution interrupted by session cancel");
                    self.metrics.record(false, elapsed);
                    return;
                }
            };

            match outcome {
                Ok(result) => {
                    let elapsed = start.elapsed().as_millis() as u64;
                    task.execution_ms = Some(elapsed);
                    task.mark_completed(result);
                    self.metrics.record(true, elapsed);
                    info!(task_id = %task.id, attempt, elapsed_ms = elapsed, "Executor: task completed");
                    return;
                }
                Err(e) => {
                    if attempt < self.policy.max_retries {
                        let delay = compute_backoff(&self.policy, attempt);
                        warn!(
                            task_id = %task.id,
                            attempt,
                            delay_ms = delay,
                            error = %e,
                            "Executor: attempt failed, backing off"
                        );
                        tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
                    }
                    last_err = Some(e);
                }
            }
        }

        let elapsed = start.elapsed().as_millis() as u64;
        task.execution_ms = Some(elapsed);
        let reason = last_err
            .map(|e| e.to_string())
            .unwrap_or_else(|| "retry budget exhausted".to_string());
        task.mark_failed(reason);
        self.metrics.record(false, elapsed);
    }

    async fn attempt(&self, task: &Task, assignment: &Assignment) -> MaestroResult<TaskResult> {
        match &assignment.tool {
            Some(tool) => {
                let params = serde_json::json!({
                    "task": task.description,
                    "type": task.task_type,
                });
                let output = self.tools.invoke(tool, params).await?;
                Ok(TaskResult::tool(output))
            }
            None => {
                let prompt = format!(
                    "Perform this {} task and reply with the result only.\n\nTask: {}",
                    task.task_type, task.description
                );
                let completion = self
                    .completion
                    .complete(CompletionRequest::new(vec![Message::user(prompt)]))
                    .await
                    .map_err(|e| MaestroError::Execution(e.to_string()))?;
                Ok(TaskResult::text(completion.text))
            }
        }
    }
}

impl Agent for Executor {
    fn name(&self) -> &str {
        &self.name
    }

    fn role(&self) -> AgentRole {
        AgentRole::Executor
    }

    fn metrics(&self) -> AgentMetrics {
        self.metrics.snapshot()
    }
}

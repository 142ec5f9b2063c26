use crate::agent::{Agent, AgentRole};
use crate::metrics::{AgentMetrics, MetricsRecorder};
use maestro_core::{
    CompletionBackend, CompletionRequest, ExecutionPlan, MaestroError, MaestroResult, Message,
    Task, TaskPriority,
};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Default ceiling on tasks per plan.
pub const DEFAULT_MAX_TASKS: usize = 20;

/// Sampling temperature for decomposition: low, for determinism.
const PLAN_TEMPERATURE: f32 = 0.2;

/// One task as emitted by the completion backend. `depends_on` holds
/// zero-based indices of earlier tasks in the same array; forward or
/// out-of-range references are planning errors, never dropped edges.
#[derive(Debug, Deserialize)]
struct PlannedTask {
    description: String,
    #[serde(rename = "type")]
    task_type: String,
    #[serde(default)]
    priority: Option<String>,
    #[serde(default)]
    depends_on: Vec<usize>,
}

/// Decomposes a request into an [`ExecutionPlan`] via one low-temperature
/// completion call.
pub struct Planner {
    name: String,
    completion: Arc<dyn CompletionBackend>,
    max_tasks: usize,
    metrics: MetricsRecorder,
}

impl Planner {
    pub fn new(completion: Arc<dyn CompletionBackend>) -> Self {
        Self {
            name: "planner".to_string(),
            completion,
            max_tasks: DEFAULT_MAX_TASKS,
            metrics: MetricsRecorder::new(),
        }
    }

    pub fn with_max_tasks(mut self, max_tasks: usize) -> Self {
        self.max_tasks = max_tasks;
        self
    }

    /// Produce a plan for `request`. Context entries are free-form hints
    /// (deadline, budget) surfaced to the model verbatim.
    pub async fn plan(
        &self,
        request: &str,
        user_id: &str,
        context: &HashMap<String, serde_json::Value>,
    ) -> MaestroResult<ExecutionPlan> {
        let start = Instant::now();
        let result = self.plan_inner(request, user_id, context).await;
        self.metrics
            .record(result.is_ok(), start.elapsed().as_millis() as u64);
        result
    }

    async fn plan_inner(
        &self,
        request: &str,
        user_id: &str,
        context: &HashMap<String, serde_json::Value>,
    ) -> MaestroResult<ExecutionPlan> {
        let prompt = self.build_prompt(request, context);
        let completion = self
            .completion
            .complete(
                CompletionRequest::new(vec![
                    Message::system(
                        "You are a task planner. Reply with a JSON array of tasks only.",
                    ),
                    Message::user(prompt),
                ])
                .with_temperature(PLAN_TEMPERATURE),
            )
            .await
            .map_err(|e| MaestroError::Planning(format!("completion call failed: {e}")))?;

        let planned = parse_task_list(&completion.text)?;

        if planned.is_empty() {
            return Err(MaestroError::Planning(
                "planner produced an empty task list".to_string(),
            ));
        }
        if planned.len() > self.max_tasks {
            return Err(MaestroError::Planning(format!(
                "planner produced {} tasks, ceiling is {}",
                planned.len(),
                self.max_tasks
            )));
        }

        // Materialize tasks first so dependency indices can be resolved to
        // ids within this invocation only.
        let mut tasks: Vec<Task> = planned
            .iter()
            .map(|p| {
                let priority = p
                    .priority
                    .as_deref()
                    .map(TaskPriority::parse_priority)
                    .unwrap_or(TaskPriority::Medium);
                Task::new(p.description.clone(), p.task_type.clone()).with_priority(priority)
            })
            .collect();

        for (i, p) in planned.iter().enumerate() {
            for &dep in &p.depends_on {
                if dep >= tasks.len() {
                    return Err(MaestroError::Planning(format!(
                        "task {i} ('{}') references out-of-range dependency index {dep}",
                        p.description
                    )));
                }
                if dep >= i {
                    return Err(MaestroError::Planning(format!(
                        "task {i} ('{}') forward-references task {dep}",
                        p.description
                    )));
                }
                let dep_id = tasks[dep].id;
                tasks[i].dependencies.push(dep_id);
            }
        }

        let plan = ExecutionPlan::new(request, user_id, tasks);
        plan.validate_dependencies()?;

        info!(
            plan_id = %plan.id,
            task_count = plan.tasks.len(),
            "Planner: decomposition complete"
        );
        Ok(plan)
    }

    fn build_prompt(&self, request: &str, context: &HashMap<String, serde_json::Value>) -> String {
        let mut prompt = format!(
            "Decompose the following request into at most {} tasks.\n\
             Each task: {{\"description\", \"type\", \"priority\", \"depends_on\": [indices]}}.\n\
             Types are free-form categories such as \"analysis\", \"generation\", \"execution\".\n\
             Priorities: low, medium, high. depends_on indices refer to earlier tasks in the\n\
             same array.\n\nRequest: {request}",
            self.max_tasks
        );
        if !context.is_empty() {
            let mut hints: Vec<String> = context.iter().map(|(k, v)| format!("{k}: {v}")).collect();
            hints.sort();
            prompt.push_str("\n\nContext hints:\n");
            prompt.push_str(&hints.join("\n"));
        }
        prompt
    }
}

impl Agent for Planner {
    fn name(&self) -> &str {
        &self.name
    }

    fn role(&self) -> AgentRole {
        AgentRole::Planner
    }

    fn metrics(&self) -> AgentMetrics {
        self.metrics.snapshot()
    }
}

/// Extract the first JSON array from completion text and parse it as a task
/// list. Code fences and surrounding prose are tolerated; anything without
/// a parsable array is a planning error.
fn parse_task_list(text: &str) -> MaestroResult<Vec<PlannedTask>> {
    let start = text.find('[').ok_or_else(|| {
        warn!("Planner: completion contained no JSON array");
        MaestroError::Planning("completion did not contain a JSON task array".to_string())
    })?;

    // Walk to the matching close bracket, ignoring brackets inside strings.
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    let mut end = None;
    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'[' => depth += 1,
            b']' => {
                depth -= 1;
                if depth == 0 {
                    end = Some(i);
                    break;
                }
            }
            _ => {}
        }
    }

    let end = end.ok_or_else(|| {
        MaestroError::Planning("unterminated JSON array in completion".to_string())
    })?;

    serde_json::from_str(&text[start..=end])
        .map_err(|e| MaestroError::Planning(format!("malformed task list: {e}")))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use maestro_core::Completion;

    struct FixedBackend {
        reply: String,
    }

    #[async_trait]
    impl CompletionBackend for FixedBackend {
        async fn complete(&self, _request: CompletionRequest) -> MaestroResult<Completion> {
            Ok(Completion {
                text: self.reply.clone(),
                tokens_used: 42,
            })
        }
    }

    fn planner_with(reply: &str) -> Planner {
        Planner::new(Arc::new(FixedBackend {
            reply: reply.to_string(),
        }))
    }

    #[tokio::test]
    async fn test_plan_with_dependencies() {
        let reply = r#"Here is the plan:
```json
[
  {"description": "Gather requirements", "type": "analysis", "priority": "high", "depends_on": []},
  {"description": "Write the email", "type": "generation", "depends_on": [0]}
]
```"#;
        let plan = planner_with(reply)
            .plan("Generate a short professional email", "user-1", &HashMap::new())
            .await
            .unwrap();

        assert_eq!(plan.tasks.len(), 2);
        assert_eq!(plan.tasks[0].priority, TaskPriority::High);
        assert_eq!(plan.tasks[1].dependencies, vec![plan.tasks[0].id]);
        assert!(!plan.has_cycle());
        plan.validate_dependencies().unwrap();
    }

    #[tokio::test]
    async fn test_unparsable_reply_is_planning_error() {
        let err = planner_with("I cannot help with that.")
            .plan("req", "user-1", &HashMap::new())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "PLANNING_ERROR");
    }

    #[tokio::test]
    async fn test_empty_task_list_is_planning_error() {
        let err = planner_with("[]")
            .plan("req", "user-1", &HashMap::new())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "PLANNING_ERROR");
    }

    #[tokio::test]
    async fn test_task_ceiling_enforced() {
        let tasks: Vec<String> = (0..4)
            .map(|i| format!(r#"{{"description": "t{i}", "type": "analysis"}}"#))
            .collect();
        let reply = format!("[{}]", tasks.join(","));

        let err = planner_with(&reply)
            .with_max_tasks(3)
            .plan("req", "user-1", &HashMap::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("ceiling"));
    }

    #[tokio::test]
    async fn test_dangling_index_is_planning_error() {
        let reply = r#"[{"description": "t0", "type": "analysis", "depends_on": [7]}]"#;
        let err = planner_with(reply)
            .plan("req", "user-1", &HashMap::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("out-of-range"));
    }

    #[tokio::test]
    async fn test_forward_reference_is_planning_error() {
        let reply = r#"[
            {"description": "t0", "type": "analysis", "depends_on": [1]},
            {"description": "t1", "type": "analysis"}
        ]"#;
        let err = planner_with(reply)
            .plan("req", "user-1", &HashMap::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("forward-references"));
    }

    #[tokio::test]
    async fn test_metrics_record_outcomes() {
        let planner = planner_with(r#"[{"description": "t", "type": "analysis"}]"#);
        planner.plan("req", "user-1", &HashMap::new()).await.unwrap();
        let m = planner.metrics();
        assert_eq!(m.invocations, 1);
        assert_eq!(m.successes, 1);
    }

    #[test]
    fn test_parse_ignores_brackets_in_strings() {
        let reply = r#"[{"description": "use [brackets] carefully", "type": "analysis"}]"#;
        let tasks = parse_task_list(reply).unwrap();
        assert_eq!(tasks.len(), 1);
        assert!(tasks[0].description.contains("[brackets]"));
    }
}

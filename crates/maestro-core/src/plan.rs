use crate::error::{MaestroError, MaestroResult};
use crate::task::{Task, TaskStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Overall status of an execution plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanStatus {
    Draft,
    Active,
    Completed,
    Failed,
}

/// The dependency-ordered task graph produced for one request.
///
/// Tasks are owned exclusively by their plan; callers mutate them through
/// [`ExecutionPlan::task_mut`] so status bookkeeping stays in one place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub id: Uuid,
    /// The original natural-language request.
    pub request: String,
    pub user_id: String,
    pub tasks: Vec<Task>,
    pub status: PlanStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Optional duration estimate supplied by the planner.
    #[serde(default)]
    pub estimated_ms: Option<u64>,
}

impl ExecutionPlan {
    pub fn new(request: impl Into<String>, user_id: impl Into<String>, tasks: Vec<Task>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            request: request.into(),
            user_id: user_id.into(),
            tasks,
            status: PlanStatus::Draft,
            created_at: now,
            updated_at: now,
            estimated_ms: None,
        }
    }

    pub fn set_status(&mut self, status: PlanStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }

    pub fn task(&self, id: Uuid) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub fn task_mut(&mut self, id: Uuid) -> Option<&mut Task> {
        self.updated_at = Utc::now();
        self.tasks.iter_mut().find(|t| t.id == id)
    }

    fn completed_ids(&self) -> Vec<Uuid> {
        self.tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Completed)
            .map(|t| t.id)
            .collect()
    }

    /// Tasks whose dependencies are all completed, in creation order.
    /// A cyclic plan yields no ready tasks; callers detect that via
    /// [`ExecutionPlan::has_cycle`] before execution starts.
    pub fn ready_tasks(&self) -> Vec<&Task> {
        let completed = self.completed_ids();
        let mut ready: Vec<&Task> = self
            .tasks
            .iter()
            .filter(|t| t.is_ready(&completed))
            .collect();
        ready.sort_by_key(|t| t.created_at);
        ready
    }

    /// Pending tasks that can never become ready because a dependency is
    /// already failed or cancelled.
    pub fn blocked_tasks(&self) -> Vec<Uuid> {
        let dead: Vec<Uuid> = self
            .tasks
            .iter()
            .filter(|t| matches!(t.status, TaskStatus::Failed { .. } | TaskStatus::Cancelled))
            .map(|t| t.id)
            .collect();
        self.tasks
            .iter()
            .filter(|t| {
                t.status == TaskStatus::Pending && t.dependencies.iter().any(|d| dead.contains(d))
            })
            .map(|t| t.id)
            .collect()
    }

    pub fn all_terminal(&self) -> bool {
        self.tasks.iter().all(|t| t.status.is_terminal())
    }

    pub fn completed_count(&self) -> usize {
        self.tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Completed)
            .count()
    }

    pub fn failed_count(&self) -> usize {
        self.tasks
            .iter()
            .filter(|t| matches!(t.status, TaskStatus::Failed { .. }))
            .count()
    }

    /// Every dependency id must resolve to a task in this plan.
    pub fn validate_dependencies(&self) -> MaestroResult<()> {
        let known: Vec<Uuid> = self.tasks.iter().map(|t| t.id).collect();
        for task in &self.tasks {
            for dep in &task.dependencies {
                if !known.contains(dep) {
                    return Err(MaestroError::Planning(format!(
                        "task '{}' depends on unknown task id {}",
                        task.description, dep
                    )));
                }
            }
        }
        Ok(())
    }

    /// Tri-color DFS over the dependency edges. Returns true if any cycle
    /// exists, which makes the plan a terminal failure.
    pub fn has_cycle(&self) -> bool {
        let mut visited: HashMap<Uuid, u8> = HashMap::new();
        for task in &self.tasks {
            if self.dfs_cycle(task.id, &mut visited) {
                return true;
            }
        }
        false
    }

    fn dfs_cycle(&self, id: Uuid, visited: &mut HashMap<Uuid, u8>) -> bool {
        match visited.get(&id) {
            Some(1) => return true,  // back edge = cycle
            Some(2) => return false, // already processed
            _ => {}
        }
        visited.insert(id, 1);
        if let Some(task) = self.task(id) {
            for dep in &task.dependencies {
                if self.dfs_cycle(*dep, visited) {
                    return true;
                }
            }
        }
        visited.insert(id, 2);
        false
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::task::TaskResult;

    fn chain_plan() -> (ExecutionPlan, Uuid, Uuid) {
        let t1 = Task::new("Collect figures", "analysis");
        let t1_id = t1.id;
        let t2 = Task::new("Draft summary", "generation").with_dependencies(vec![t1_id]);
        let t2_id = t2.id;
        let plan = ExecutionPlan::new("Summarize the report", "user-1", vec![t1, t2]);
        (plan, t1_id, t2_id)
    }

    #[test]
    fn test_ready_respects_dependencies() {
        let (mut plan, t1_id, t2_id) = chain_plan();

        let ready: Vec<Uuid> = plan.ready_tasks().iter().map(|t| t.id).collect();
        assert_eq!(ready, vec![t1_id]);

        let t1 = plan.task_mut(t1_id).unwrap();
        t1.mark_running();
        t1.mark_completed(TaskResult::text("figures collected."));

        let ready: Vec<Uuid> = plan.ready_tasks().iter().map(|t| t.id).collect();
        assert_eq!(ready, vec![t2_id]);
    }

    #[test]
    fn test_ready_tasks_never_have_unsatisfied_deps() {
        let (plan, _, _) = chain_plan();
        let completed: Vec<Uuid> = plan
            .tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Completed)
            .map(|t| t.id)
            .collect();
        for task in plan.ready_tasks() {
            assert!(task.dependencies.iter().all(|d| completed.contains(d)));
        }
    }

    #[test]
    fn test_cycle_detection() {
        let mut a = Task::new("A", "analysis");
        let mut b = Task::new("B", "analysis");
        let (a_id, b_id) = (a.id, b.id);
        a.dependencies = vec![b_id];
        b.dependencies = vec![a_id];
        let plan = ExecutionPlan::new("cyclic", "user-1", vec![a, b]);

        assert!(plan.has_cycle());
        assert!(plan.ready_tasks().is_empty());
    }

    #[test]
    fn test_no_cycle_for_chain() {
        let (plan, _, _) = chain_plan();
        assert!(!plan.has_cycle());
    }

    #[test]
    fn test_dangling_dependency_is_error() {
        let task = Task::new("Orphan dep", "analysis").with_dependencies(vec![Uuid::new_v4()]);
        let plan = ExecutionPlan::new("req", "user-1", vec![task]);
        let err = plan.validate_dependencies().unwrap_err();
        assert_eq!(err.code(), "PLANNING_ERROR");
    }

    #[test]
    fn test_blocked_tasks_after_failure() {
        let (mut plan, t1_id, t2_id) = chain_plan();
        let t1 = plan.task_mut(t1_id).unwrap();
        t1.mark_running();
        t1.mark_failed("boom");

        assert_eq!(plan.blocked_tasks(), vec![t2_id]);
        assert!(plan.ready_tasks().is_empty());
    }

    #[test]
    fn test_counts_and_terminal() {
        let (mut plan, t1_id, t2_id) = chain_plan();
        assert!(!plan.all_terminal());

        plan.task_mut(t1_id).unwrap().mark_failed("boom");
        plan.task_mut(t2_id).unwrap().mark_cancelled();
        assert!(plan.all_terminal());
        assert_eq!(plan.completed_count(), 0);
        assert_eq!(plan.failed_count(), 1);
    }
}

use crate::config::EngineConfig;
use futures_util::future::join_all;
use maestro_agents::{
    Agent, Assignment, Executor, Planner, RetryPolicy, Router, Validator,
};
use maestro_core::{
    CompletionBackend, ExecutionPlan, MaestroError, MaestroResult, PlanStatus, Task, TaskResult,
    TaskStatus, ToolRegistry,
};
use maestro_session::{
    RetentionSweeper, Session, SessionPhase, SessionResult, SessionStatus, SessionStore,
    SessionSummary, TaskOutput,
};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tracing::{info, warn};
use uuid::Uuid;

/// What `orchestrate` hands back: either a finished session or one parked
/// at the approval gate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestrateResponse {
    pub session_id: Uuid,
    pub status: SessionStatus,
    pub requires_approval: bool,
    pub preview: Option<String>,
    pub result: Option<SessionResult>,
}

impl From<&Session> for OrchestrateResponse {
    fn from(session: &Session) -> Self {
        Self {
            session_id: session.id,
            status: session.status,
            requires_approval: session.status == SessionStatus::AwaitingApproval,
            preview: session.preview.clone(),
            result: session.result.clone(),
        }
    }
}

/// Liveness and load snapshot for the health endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub active_sessions: usize,
    pub capacity_remaining: usize,
    pub agent_metrics: HashMap<String, maestro_agents::AgentMetrics>,
}

/// Drives sessions through the pipeline: planning, routing, execution,
/// validation, the optional approval gate, and final assembly.
///
/// Sessions are independent; per-session mutation is serialized through a
/// per-id mutex, and the ceiling on concurrently active sessions is a set
/// of slot-holding session ids checked at `orchestrate` entry. Slot
/// ownership is explicit: resolving a session this process never admitted
/// (one restored from the store after a restart) does not touch the count.
pub struct Orchestrator {
    config: EngineConfig,
    store: Arc<dyn SessionStore>,
    tools: Arc<ToolRegistry>,
    planner: Planner,
    router: Router,
    executor: Executor,
    validator: Validator,
    /// Ids of sessions holding a capacity slot in this process.
    slots: parking_lot::Mutex<HashSet<Uuid>>,
    locks: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
    cancels: Mutex<HashMap<Uuid, watch::Sender<bool>>>,
}

impl Orchestrator {
    pub fn new(
        config: EngineConfig,
        store: Arc<dyn SessionStore>,
        completion: Arc<dyn CompletionBackend>,
        tools: Arc<ToolRegistry>,
    ) -> Self {
        let planner = Planner::new(completion.clone()).with_max_tasks(config.max_plan_tasks);
        let executor = Executor::new(completion.clone(), tools.clone()).with_policy(RetryPolicy {
            max_retries: config.max_retries,
            ..RetryPolicy::default()
        });
        let mut validator = Validator::new(completion);
        if config.strict_validation {
            validator = validator.strict();
        }
        Self {
            config,
            store,
            tools,
            planner,
            router: Router::new(),
            executor,
            validator,
            slots: parking_lot::Mutex::new(HashSet::new()),
            locks: Mutex::new(HashMap::new()),
            cancels: Mutex::new(HashMap::new()),
        }
    }

    /// A retention sweeper over this engine's store, configured from the
    /// engine config. The caller owns starting and stopping it.
    pub fn sweeper(&self) -> RetentionSweeper {
        RetentionSweeper::new(self.store.clone())
            .with_max_age_hours(self.config.retention_max_age_hours)
    }

    /// Run one request end to end. Returns when the session reaches a
    /// terminal status or parks at the approval gate. Over-capacity
    /// requests are rejected up front, never queued.
    pub async fn orchestrate(
        &self,
        request: &str,
        user_id: &str,
        context: HashMap<String, serde_json::Value>,
    ) -> MaestroResult<OrchestrateResponse> {
        let session = Session::new(request, user_id, self.config.enable_approval);
        self.acquire_slot(session.id)?;

        let (cancel_tx, cancel_rx) = watch::channel(false);
        self.cancels.lock().await.insert(session.id, cancel_tx);

        info!(session_id = %session.id, user_id, "Session started");
        if let Err(e) = self.store.create(&session).await {
            self.release(session.id).await;
            return Err(e);
        }

        self.run_pipeline(session, &context, cancel_rx).await
    }

    async fn run_pipeline(
        &self,
        mut session: Session,
        context: &HashMap<String, serde_json::Value>,
        cancel_rx: watch::Receiver<bool>,
    ) -> MaestroResult<OrchestrateResponse> {
        session.register_agent(self.planner.name(), self.planner.role().to_string());
        let plan = match self
            .planner
            .plan(&session.request, &session.user_id, context)
            .await
        {
            Ok(plan) => plan,
            Err(e) => return self.fail_session(session, e.to_string()).await,
        };
        self.drive_plan(session, plan, cancel_rx).await
    }

    /// Everything after planning: plan admission, routing, execution,
    /// validation, result assembly, and the approval gate or finalization.
    async fn drive_plan(
        &self,
        mut session: Session,
        mut plan: ExecutionPlan,
        cancel_rx: watch::Receiver<bool>,
    ) -> MaestroResult<OrchestrateResponse> {
        if plan.has_cycle() {
            return self
                .fail_session(session, "dependency cycle detected in plan")
                .await;
        }
        plan.set_status(PlanStatus::Active);
        session.record(format!("plan ready with {} tasks", plan.tasks.len()));
        self.checkpoint(&mut session, &plan).await?;

        // --- routing ---
        session.enter_phase(SessionPhase::Routing);
        session.register_agent(self.router.name(), self.router.role().to_string());
        let mut assignments: HashMap<Uuid, Assignment> = HashMap::new();
        for i in 0..plan.tasks.len() {
            match self.router.route(&plan.tasks[i], &self.tools) {
                Ok(assignment) => {
                    assignments.insert(plan.tasks[i].id, assignment);
                }
                Err(e) => {
                    let reason = e.to_string();
                    let id = plan.tasks[i].id;
                    plan.tasks[i].mark_failed(reason.as_str());
                    session.record_error(format!("task {id} unroutable: {reason}"));
                }
            }
        }

        // --- execution ---
        session.enter_phase(SessionPhase::Execution);
        session.register_agent(self.executor.name(), self.executor.role().to_string());
        while !plan.all_terminal() {
            if *cancel_rx.borrow() {
                session.stats.tasks_completed = plan.completed_count() as u32;
                session.stats.tasks_failed = plan.failed_count() as u32;
                session.plan = Some(plan);
                return self.cancel_in_flight(session).await;
            }

            let ready: Vec<Uuid> = plan.ready_tasks().iter().map(|t| t.id).collect();
            if ready.is_empty() {
                let blocked = plan.blocked_tasks();
                if blocked.is_empty() {
                    // No ready and no blocked tasks with work remaining
                    // should be impossible in an acyclic plan.
                    for task in plan.tasks.iter_mut() {
                        if !task.status.is_terminal() {
                            task.mark_failed("task never became ready");
                        }
                    }
                    break;
                }
                for id in blocked {
                    if let Some(task) = plan.task_mut(id) {
                        task.mark_failed("blocked by failed dependency");
                    }
                    session.record_error(format!("task {id} blocked by failed dependency"));
                }
                continue;
            }

            let mut batch: Vec<(Task, Assignment)> = Vec::new();
            for id in ready {
                let task = match plan.task(id) {
                    Some(t) => t.clone(),
                    None => continue,
                };
                match assignments.get(&id) {
                    Some(assignment) => batch.push((task, assignment.clone())),
                    None => {
                        if let Some(t) = plan.task_mut(id) {
                            t.mark_failed("no routing assignment");
                        }
                    }
                }
            }

            // Ready tasks within one batch run concurrently; readiness is
            // re-evaluated once the whole batch has settled.
            let futures: Vec<_> = batch
                .iter_mut()
                .map(|(task, assignment)| {
                    self.executor.execute(task, assignment, cancel_rx.clone())
                })
                .collect();
            join_all(futures).await;

            for (task, _) in batch {
                if let Some(slot) = plan.task_mut(task.id) {
                    *slot = task;
                }
            }
        }

        session.stats.tasks_completed = plan.completed_count() as u32;
        session.stats.tasks_failed = plan.failed_count() as u32;
        session.record(format!(
            "execution finished: {} completed, {} failed",
            plan.completed_count(),
            plan.failed_count()
        ));

        if plan.completed_count() == 0 {
            plan.set_status(PlanStatus::Failed);
            session.plan = Some(plan);
            return self.fail_session(session, "no tasks completed").await;
        }
        plan.set_status(PlanStatus::Completed);

        // --- validation ---
        let mut reports = Vec::new();
        if self.config.enable_validation {
            session.enter_phase(SessionPhase::Validation);
            session.register_agent(self.validator.name(), self.validator.role().to_string());
            let completed: Vec<Task> = plan
                .tasks
                .iter()
                .filter(|t| t.status == TaskStatus::Completed)
                .cloned()
                .collect();
            let mut prior: Option<TaskResult> = None;
            for task in &completed {
                // Each validation is a completion call; honor a cancel
                // that arrived since the last suspension point.
                if *cancel_rx.borrow() {
                    session.plan = Some(plan);
                    return self.cancel_in_flight(session).await;
                }
                let report = self
                    .validator
                    .validate(task, &session.request, prior.as_ref())
                    .await;
                session.record(format!(
                    "validation {} for task {} (confidence {})",
                    if report.passed { "passed" } else { "failed" },
                    task.id,
                    report.confidence
                ));
                prior = task.result.clone();
                reports.push(report);
            }
        }

        // Outputs that failed validation are excluded from the final
        // result; the session still completes.
        let passing: Option<HashSet<Uuid>> = if self.config.enable_validation {
            Some(reports.iter().filter(|r| r.passed).map(|r| r.task_id).collect())
        } else {
            None
        };
        let outputs: Vec<TaskOutput> = plan
            .tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Completed)
            .filter(|t| passing.as_ref().map_or(true, |ids| ids.contains(&t.id)))
            .map(|t| TaskOutput {
                task_id: t.id,
                task_type: t.task_type.clone(),
                content: task_text(t),
            })
            .collect();
        session.result = Some(SessionResult {
            summary: format!(
                "{} of {} tasks completed",
                plan.completed_count(),
                plan.tasks.len()
            ),
            outputs,
            validation: reports,
        });
        session.plan = Some(plan);

        // --- approval gate ---
        if self.config.enable_approval {
            session.enter_phase(SessionPhase::Approval);
            session.preview = session.result.as_ref().map(build_preview);

            let lock = self.session_lock(session.id).await;
            let guard = lock.lock().await;
            if *cancel_rx.borrow() {
                drop(guard);
                return self.cancel_in_flight(session).await;
            }
            session.status = SessionStatus::AwaitingApproval;
            session.record("awaiting approval");
            self.store.update(&session).await?;
            drop(guard);
            // The capacity slot stays held until the gate resolves; only
            // the cancel channel is retired with the pipeline.
            self.drop_cancel(session.id).await;
            info!(session_id = %session.id, "Session awaiting approval");
            return Ok(OrchestrateResponse::from(&session));
        }

        self.finalize(session, &cancel_rx).await
    }

    /// Resolve the approval gate positively and complete the session.
    pub async fn approve_session(&self, id: Uuid, user_id: &str) -> MaestroResult<Session> {
        let lock = self.session_lock(id).await;
        let _guard = lock.lock().await;

        let mut session = self.load_owned(id, user_id).await?;
        session.approve()?;
        session.enter_phase(SessionPhase::Final);
        session.status = SessionStatus::Completed;
        session.record("session completed");
        self.store.update(&session).await?;
        drop(_guard);
        self.release(id).await;
        info!(session_id = %id, "Session approved and completed");
        Ok(session)
    }

    /// Resolve the approval gate negatively. Terminal.
    pub async fn reject_session(
        &self,
        id: Uuid,
        user_id: &str,
        reason: &str,
    ) -> MaestroResult<Session> {
        let lock = self.session_lock(id).await;
        let _guard = lock.lock().await;

        let mut session = self.load_owned(id, user_id).await?;
        session.reject(reason)?;
        self.store.update(&session).await?;
        drop(_guard);
        self.release(id).await;
        info!(session_id = %id, reason, "Session rejected");
        Ok(session)
    }

    /// Cancel a running or parked session, returning the status the
    /// session holds when the call completes. A session mid-pipeline is
    /// signalled through its watch channel and persists its own terminal
    /// state at the next cancellation point, so the returned status is
    /// still `Active` in that case; parked and idle sessions are cancelled
    /// and persisted directly.
    pub async fn cancel_session(&self, id: Uuid, user_id: &str) -> MaestroResult<SessionStatus> {
        let lock = self.session_lock(id).await;
        let _guard = lock.lock().await;

        let session = self.load_owned(id, user_id).await?;
        if session.status == SessionStatus::Active {
            if let Some(tx) = self.cancels.lock().await.get(&id) {
                let _ = tx.send(true);
                info!(session_id = %id, "Cancel signalled to running session");
                return Ok(session.status);
            }
        }
        // The pipeline may have persisted a terminal state between the
        // load and the channel lookup; act on a fresh snapshot so a
        // finished session is never overwritten.
        let mut session = self.load_owned(id, user_id).await?;
        session.cancel()?;
        self.store.update(&session).await?;
        drop(_guard);
        self.release(id).await;
        info!(session_id = %id, "Session cancelled");
        Ok(session.status)
    }

    /// Snapshot of one session, owner only.
    pub async fn get_session(&self, id: Uuid, user_id: &str) -> MaestroResult<Session> {
        self.load_owned(id, user_id).await
    }

    /// Summaries of the caller's sessions, newest first.
    pub async fn list_sessions(
        &self,
        user_id: &str,
        status: Option<SessionStatus>,
        offset: usize,
        limit: usize,
    ) -> MaestroResult<Vec<SessionSummary>> {
        let mut sessions = self.store.list_for_user(user_id).await?;
        if let Some(status) = status {
            sessions.retain(|s| s.status == status);
        }
        sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(sessions
            .iter()
            .skip(offset)
            .take(limit)
            .map(Session::summary)
            .collect())
    }

    pub fn health(&self) -> HealthStatus {
        let active = self.slots.lock().len();
        let mut agent_metrics = HashMap::new();
        for agent in [
            &self.planner as &dyn Agent,
            &self.router,
            &self.executor,
            &self.validator,
        ] {
            agent_metrics.insert(agent.name().to_string(), agent.metrics());
        }
        HealthStatus {
            active_sessions: active,
            capacity_remaining: self.config.max_active_sessions.saturating_sub(active),
            agent_metrics,
        }
    }

    fn acquire_slot(&self, id: Uuid) -> MaestroResult<()> {
        let mut slots = self.slots.lock();
        if slots.len() >= self.config.max_active_sessions {
            warn!(
                active = slots.len(),
                ceiling = self.config.max_active_sessions,
                "Orchestrate rejected: at capacity"
            );
            return Err(MaestroError::Capacity(format!(
                "engine at capacity: {} of {} sessions active",
                slots.len(),
                self.config.max_active_sessions
            )));
        }
        slots.insert(id);
        Ok(())
    }

    /// Free the session's capacity slot, cancel channel, and mutex entry.
    /// Idempotent, and a no-op for sessions this process never admitted:
    /// the slot set shrinks only when the id was actually in it, so the
    /// count can never underflow.
    async fn release(&self, id: Uuid) {
        self.slots.lock().remove(&id);
        self.cancels.lock().await.remove(&id);
        self.locks.lock().await.remove(&id);
    }

    async fn drop_cancel(&self, id: Uuid) {
        self.cancels.lock().await.remove(&id);
    }

    async fn session_lock(&self, id: Uuid) -> Arc<Mutex<()>> {
        self.locks
            .lock()
            .await
            .entry(id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    async fn load_owned(&self, id: Uuid, user_id: &str) -> MaestroResult<Session> {
        let session = self
            .store
            .get(id)
            .await?
            .ok_or_else(|| MaestroError::State(format!("unknown session {id}")))?;
        if session.user_id != user_id {
            return Err(MaestroError::Permission(format!(
                "session {id} does not belong to user {user_id}"
            )));
        }
        Ok(session)
    }

    async fn checkpoint(
        &self,
        session: &mut Session,
        plan: &ExecutionPlan,
    ) -> MaestroResult<()> {
        session.plan = Some(plan.clone());
        self.store.update(session).await
    }

    async fn fail_session(
        &self,
        mut session: Session,
        reason: impl Into<String>,
    ) -> MaestroResult<OrchestrateResponse> {
        let reason = reason.into();
        warn!(session_id = %session.id, reason = %reason, "Session failed");
        session.fail(reason);

        let lock = self.session_lock(session.id).await;
        let guard = lock.lock().await;
        self.store.update(&session).await?;
        drop(guard);
        self.release(session.id).await;
        Ok(OrchestrateResponse::from(&session))
    }

    /// Persist a cancel observed by the pipeline. The plan, with its task
    /// states, must already be attached to the session.
    async fn cancel_in_flight(&self, mut session: Session) -> MaestroResult<OrchestrateResponse> {
        let lock = self.session_lock(session.id).await;
        let guard = lock.lock().await;
        session.cancel()?;
        self.store.update(&session).await?;
        drop(guard);
        self.release(session.id).await;
        info!(session_id = %session.id, "Session cancelled mid-pipeline");
        Ok(OrchestrateResponse::from(&session))
    }

    /// Complete the session. The terminal persist happens under the
    /// session lock and re-checks the cancel flag first, so a cancel
    /// signalled while the lock was contended wins over completion.
    async fn finalize(
        &self,
        mut session: Session,
        cancel_rx: &watch::Receiver<bool>,
    ) -> MaestroResult<OrchestrateResponse> {
        let lock = self.session_lock(session.id).await;
        let guard = lock.lock().await;
        if *cancel_rx.borrow() {
            drop(guard);
            return self.cancel_in_flight(session).await;
        }
        session.enter_phase(SessionPhase::Final);
        session.status = SessionStatus::Completed;
        session.record("session completed");
        self.store.update(&session).await?;
        drop(guard);
        self.release(session.id).await;
        info!(session_id = %session.id, "Session completed");
        Ok(OrchestrateResponse::from(&session))
    }
}

fn task_text(task: &Task) -> String {
    match &task.result {
        Some(result) => match &result.content {
            Some(content) => content.clone(),
            None => result
                .tool_output
                .as_ref()
                .map(|v| v.to_string())
                .unwrap_or_default(),
        },
        None => String::new(),
    }
}

fn build_preview(result: &SessionResult) -> String {
    let mut preview = result.summary.clone();
    if let Some(first) = result.outputs.first() {
        let snippet: String = first.content.chars().take(200).collect();
        preview.push_str("\n\nFirst output: ");
        preview.push_str(&snippet);
    }
    preview
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use maestro_core::{Completion, CompletionRequest};
    use maestro_session::MemorySessionStore;

    struct SilentBackend;

    #[async_trait]
    impl CompletionBackend for SilentBackend {
        async fn complete(&self, _request: CompletionRequest) -> MaestroResult<Completion> {
            Ok(Completion {
                text: String::new(),
                tokens_used: 0,
            })
        }
    }

    fn bare_engine() -> Orchestrator {
        Orchestrator::new(
            EngineConfig::default(),
            Arc::new(MemorySessionStore::new()),
            Arc::new(SilentBackend),
            Arc::new(ToolRegistry::new()),
        )
    }

    #[tokio::test]
    async fn test_cyclic_plan_fails_session_without_hanging() {
        let engine = bare_engine();
        let session = Session::new("cyclic request", "alice", false);
        let id = session.id;
        engine.store.create(&session).await.unwrap();

        let mut a = Task::new("A", "analysis");
        let mut b = Task::new("B", "analysis");
        let (a_id, b_id) = (a.id, b.id);
        a.dependencies = vec![b_id];
        b.dependencies = vec![a_id];
        let plan = ExecutionPlan::new("cyclic request", "alice", vec![a, b]);

        let (_tx, rx) = watch::channel(false);
        let response = engine.drive_plan(session, plan, rx).await.unwrap();

        assert_eq!(response.status, SessionStatus::Failed);
        let stored = engine.store.get(id).await.unwrap().unwrap();
        assert_eq!(stored.status, SessionStatus::Failed);
        assert!(stored
            .history
            .iter()
            .any(|e| e.is_error && e.message.contains("cycle")));
    }

    #[tokio::test]
    async fn test_release_of_unadmitted_session_never_underflows() {
        let engine = bare_engine();
        // A session restored from a shared store after a restart was
        // never admitted by this process.
        engine.release(Uuid::new_v4()).await;
        engine.release(Uuid::new_v4()).await;

        let health = engine.health();
        assert_eq!(health.active_sessions, 0);
        assert_eq!(health.capacity_remaining, 10);
    }

    #[tokio::test]
    async fn test_release_prunes_bookkeeping_maps() {
        let engine = bare_engine();
        let id = Uuid::new_v4();
        engine.acquire_slot(id).unwrap();
        let _lock = engine.session_lock(id).await;
        assert_eq!(engine.locks.lock().await.len(), 1);

        engine.release(id).await;
        assert!(engine.slots.lock().is_empty());
        assert!(engine.locks.lock().await.is_empty());
        assert!(engine.cancels.lock().await.is_empty());
    }
}

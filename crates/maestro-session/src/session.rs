use crate::history::{HistoryEntry, HistoryLog, REPORTED_HISTORY};
use chrono::{DateTime, Utc};
use maestro_core::{ExecutionPlan, MaestroError, MaestroResult, ValidationReport};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Current schema version written by this build. Older snapshots are
/// upgraded in place on load via serde defaults.
pub const SCHEMA_VERSION: u32 = 2;

/// One step of the per-session pipeline, distinct from [`SessionStatus`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionPhase {
    Planning,
    Routing,
    Execution,
    Validation,
    Approval,
    Final,
}

impl std::fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionPhase::Planning => write!(f, "planning"),
            SessionPhase::Routing => write!(f, "routing"),
            SessionPhase::Execution => write!(f, "execution"),
            SessionPhase::Validation => write!(f, "validation"),
            SessionPhase::Approval => write!(f, "approval"),
            SessionPhase::Final => write!(f, "final"),
        }
    }
}

/// Overall lifecycle status of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    AwaitingApproval,
    Completed,
    Rejected,
    Cancelled,
    Failed,
}

impl SessionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionStatus::Completed
                | SessionStatus::Rejected
                | SessionStatus::Cancelled
                | SessionStatus::Failed
        )
    }
}

/// State of the approval gate. Once approved or rejected it is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
}

impl Default for ApprovalStatus {
    fn default() -> Self {
        ApprovalStatus::Pending
    }
}

/// Counters reported on session snapshots.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionStats {
    pub agents_used: u32,
    pub tasks_completed: u32,
    pub tasks_failed: u32,
}

/// Output of one completed task included in the final result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskOutput {
    pub task_id: Uuid,
    pub task_type: String,
    pub content: String,
}

/// The assembled result of a finished session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionResult {
    pub summary: String,
    pub outputs: Vec<TaskOutput>,
    #[serde(default)]
    pub validation: Vec<ValidationReport>,
}

/// The end-to-end lifecycle record for one orchestrated request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub user_id: String,
    pub request: String,
    #[serde(default)]
    pub plan: Option<ExecutionPlan>,
    pub phase: SessionPhase,
    pub status: SessionStatus,
    /// Participating agents: name → role.
    #[serde(default)]
    pub agents: HashMap<String, String>,
    #[serde(default)]
    pub history: HistoryLog,
    #[serde(default)]
    pub approval_required: bool,
    #[serde(default)]
    pub approval: ApprovalStatus,
    #[serde(default)]
    pub preview: Option<String>,
    #[serde(default)]
    pub stats: SessionStats,
    #[serde(default)]
    pub result: Option<SessionResult>,
    #[serde(default = "default_version")]
    pub version: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn default_version() -> u32 {
    1
}

impl Session {
    pub fn new(
        request: impl Into<String>,
        user_id: impl Into<String>,
        approval_required: bool,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            request: request.into(),
            plan: None,
            phase: SessionPhase::Planning,
            status: SessionStatus::Active,
            agents: HashMap::new(),
            history: HistoryLog::new(),
            approval_required,
            approval: ApprovalStatus::Pending,
            preview: None,
            stats: SessionStats::default(),
            result: None,
            version: SCHEMA_VERSION,
            created_at: now,
            updated_at: now,
        }
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Append an audit entry for the current phase.
    pub fn record(&mut self, message: impl Into<String>) {
        let phase = self.phase.to_string();
        self.history.push(&phase, message, false);
        self.touch();
    }

    /// Append an audit entry marked as an error.
    pub fn record_error(&mut self, message: impl Into<String>) {
        let phase = self.phase.to_string();
        self.history.push(&phase, message, true);
        self.touch();
    }

    /// Advance to a new phase, logging the transition.
    pub fn enter_phase(&mut self, phase: SessionPhase) {
        self.phase = phase;
        self.record(format!("entered phase {phase}"));
    }

    pub fn register_agent(&mut self, name: impl Into<String>, role: impl Into<String>) {
        if self.agents.insert(name.into(), role.into()).is_none() {
            self.stats.agents_used += 1;
        }
        self.touch();
    }

    /// Mark the session failed with an audit entry. Phase is left where the
    /// failure happened.
    pub fn fail(&mut self, reason: impl Into<String>) {
        let reason = reason.into();
        self.record_error(reason);
        self.status = SessionStatus::Failed;
        self.touch();
    }

    /// Resolve the approval gate positively. Legal only while awaiting.
    pub fn approve(&mut self) -> MaestroResult<()> {
        if self.status != SessionStatus::AwaitingApproval {
            return Err(MaestroError::State(format!(
                "cannot approve session {} in status {:?}",
                self.id, self.status
            )));
        }
        self.approval = ApprovalStatus::Approved;
        self.record("approval granted");
        Ok(())
    }

    /// Resolve the approval gate negatively, recording the reason.
    pub fn reject(&mut self, reason: &str) -> MaestroResult<()> {
        if self.status != SessionStatus::AwaitingApproval {
            return Err(MaestroError::State(format!(
                "cannot reject session {} in status {:?}",
                self.id, self.status
            )));
        }
        self.approval = ApprovalStatus::Rejected;
        self.status = SessionStatus::Rejected;
        self.record(format!("approval rejected: {reason}"));
        Ok(())
    }

    /// Cancel the session. Legal only from `Active` or `AwaitingApproval`.
    pub fn cancel(&mut self) -> MaestroResult<()> {
        match self.status {
            SessionStatus::Active | SessionStatus::AwaitingApproval => {
                self.status = SessionStatus::Cancelled;
                if let Some(plan) = &mut self.plan {
                    for task in &mut plan.tasks {
                        task.mark_cancelled();
                    }
                }
                self.record("session cancelled");
                Ok(())
            }
            status => Err(MaestroError::State(format!(
                "cannot cancel session {} in terminal status {status:?}",
                self.id
            ))),
        }
    }

    /// The externally reported slice of history.
    pub fn reported_history(&self) -> Vec<&HistoryEntry> {
        self.history.recent(REPORTED_HISTORY)
    }

    /// Compact summary for list endpoints.
    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            id: self.id,
            user_id: self.user_id.clone(),
            request: self.request.clone(),
            phase: self.phase,
            status: self.status,
            tasks_completed: self.stats.tasks_completed,
            tasks_failed: self.stats.tasks_failed,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Compact session view returned by list operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: Uuid,
    pub user_id: String,
    pub request: String,
    pub phase: SessionPhase,
    pub status: SessionStatus,
    pub tasks_completed: u32,
    pub tasks_failed: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

use serde::{Deserialize, Serialize};

/// Engine-level tuning knobs. Every field has a serde default so partial
/// config files stay loadable across releases.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Ceiling on concurrently active sessions. Requests over the ceiling
    /// are rejected, never queued.
    #[serde(default = "default_max_active_sessions")]
    pub max_active_sessions: usize,
    /// Run the validator over completed task results.
    #[serde(default = "default_enable_validation")]
    pub enable_validation: bool,
    /// Gate final results behind an explicit approval step.
    #[serde(default)]
    pub enable_approval: bool,
    /// Raise the validation pass threshold from 0.70 to 0.90.
    #[serde(default)]
    pub strict_validation: bool,
    /// Ceiling on tasks per plan.
    #[serde(default = "default_max_plan_tasks")]
    pub max_plan_tasks: usize,
    /// Executor retry budget per task.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Retention age for terminal sessions, in hours.
    #[serde(default = "default_retention_max_age_hours")]
    pub retention_max_age_hours: i64,
}

fn default_max_active_sessions() -> usize {
    10
}

fn default_enable_validation() -> bool {
    true
}

fn default_max_plan_tasks() -> usize {
    20
}

fn default_max_retries() -> u32 {
    3
}

fn default_retention_max_age_hours() -> i64 {
    24
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_active_sessions: default_max_active_sessions(),
            enable_validation: default_enable_validation(),
            enable_approval: false,
            strict_validation: false,
            max_plan_tasks: default_max_plan_tasks(),
            max_retries: default_max_retries(),
            retention_max_age_hours: default_retention_max_age_hours(),
        }
    }
}

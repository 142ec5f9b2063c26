use thiserror::Error;

/// A convenience `Result` alias using [`MaestroError`].
pub type MaestroResult<T> = Result<T, MaestroError>;

/// Top-level error type for the maestro engine.
///
/// Each variant corresponds to one failure class of the pipeline. Task-level
/// errors (`Routing`, `Execution`, `Validation`) are recorded on the task
/// that produced them; only plan-level and store-level errors escalate to a
/// failed session.
#[derive(Debug, Error)]
pub enum MaestroError {
    /// The planner produced a malformed or oversized plan. Fails the session.
    #[error("Planning error: {0}")]
    Planning(String),

    /// No executor capability matched a task. Fails the task only.
    #[error("Routing error: {0}")]
    Routing(String),

    /// A task exhausted its retry budget. Fails the task only.
    #[error("Execution error: {0}")]
    Execution(String),

    /// A validation check could not run to completion.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The active-session ceiling was reached; the request was rejected.
    #[error("Capacity error: {0}")]
    Capacity(String),

    /// An illegal state transition was attempted (double-approve,
    /// cancel-from-terminal, and similar).
    #[error("State error: {0}")]
    State(String),

    /// The caller does not own the session it tried to access.
    #[error("Permission error: {0}")]
    Permission(String),

    /// An error from the session repository.
    #[error("Store error: {0}")]
    Store(String),

    /// A JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl MaestroError {
    /// Stable machine-readable code for API envelopes.
    pub fn code(&self) -> &'static str {
        match self {
            MaestroError::Planning(_) => "PLANNING_ERROR",
            MaestroError::Routing(_) => "ROUTING_ERROR",
            MaestroError::Execution(_) => "EXECUTION_ERROR",
            MaestroError::Validation(_) => "VALIDATION_ERROR",
            MaestroError::Capacity(_) => "CAPACITY_ERROR",
            MaestroError::State(_) => "STATE_ERROR",
            MaestroError::Permission(_) => "PERMISSION_ERROR",
            MaestroError::Store(_) => "STORE_ERROR",
            MaestroError::Json(_) => "JSON_ERROR",
            MaestroError::Io(_) => "IO_ERROR",
        }
    }
}

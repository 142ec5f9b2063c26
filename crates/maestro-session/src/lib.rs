//! Session lifecycle, durable storage, and retention cleanup.
//!
//! A [`Session`] is the stateful wrapper around one orchestrated request:
//! its phase, execution plan, approval state, bounded history, and result.
//! The [`SessionStore`] trait provides durable CRUD over sessions, and the
//! [`RetentionSweeper`] purges terminal sessions past their retention age.

pub mod history;
pub mod retention;
pub mod session;
pub mod store;

pub use history::{HistoryEntry, HistoryLog, HISTORY_CAPACITY, REPORTED_HISTORY};
pub use retention::{RetentionSweeper, SweeperHandle, DEFAULT_MAX_AGE_HOURS};
pub use session::{
    ApprovalStatus, Session, SessionPhase, SessionResult, SessionStats, SessionStatus,
    SessionSummary, TaskOutput, SCHEMA_VERSION,
};
pub use store::{FileSessionStore, MemorySessionStore, SessionStore};

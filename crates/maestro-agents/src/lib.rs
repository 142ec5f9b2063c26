//! The four pipeline agents: planner, router, executor and validator.
//!
//! Each agent owns one phase of a session. The planner decomposes a request
//! into an execution plan, the router binds tasks to capabilities and tools,
//! the executor performs tasks with retry and cooperative cancellation, and
//! the validator scores completed results.
//!
//! # Main types
//! - [`Agent`] / [`AgentRole`]: common capability surface
//! - [`Planner`]: request decomposition via a completion backend
//! - [`Router`] / [`Assignment`]: deterministic affinity-table routing
//! - [`Executor`] / [`RetryPolicy`]: task execution with backoff
//! - [`Validator`]: five-check result validation
//! - [`AgentMetrics`]: per-agent rolling counters

pub mod agent;
pub mod executor;
pub mod metrics;
pub mod planner;
pub mod router;
pub mod validator;

pub use agent::{Agent, AgentRole};
pub use executor::{Executor, RetryPolicy};
pub use metrics::{AgentMetrics, MetricsRecorder};
pub use planner::{Planner, DEFAULT_MAX_TASKS};
pub use router::{Assignment, Route, Router};
pub use validator::{Validator, NORMAL_THRESHOLD, STRICT_THRESHOLD};

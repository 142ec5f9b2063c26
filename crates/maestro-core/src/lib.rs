//! Core types and contracts for the maestro orchestration engine.
//!
//! This crate provides the foundational types shared across all maestro
//! crates: the error taxonomy, the task and execution-plan data model, the
//! abstract text-completion capability, and the tool registry.
//!
//! # Main types
//!
//! - [`MaestroError`] — Unified error enum for all maestro subsystems.
//! - [`MaestroResult`] — Convenience alias for `Result<T, MaestroError>`.
//! - [`Task`] — One atomic unit of work with explicit dependency ids.
//! - [`ExecutionPlan`] — The dependency-ordered task graph for one request.
//! - [`CompletionBackend`] — Abstract text-completion capability.
//! - [`ToolRegistry`] — Process-wide registry of invocable tools.

pub mod completion;
pub mod error;
pub mod plan;
pub mod task;
pub mod tool;
pub mod validation;

pub use completion::{Completion, CompletionBackend, CompletionRequest, Message, Role};
pub use error::{MaestroError, MaestroResult};
pub use plan::{ExecutionPlan, PlanStatus};
pub use task::{Task, TaskPriority, TaskResult, TaskStatus};
pub use tool::{Tool, ToolDescriptor, ToolRegistry};
pub use validation::{ValidationCheck, ValidationReport};

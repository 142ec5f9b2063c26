//! The orchestration engine: session pipeline, capacity control, and the
//! externally visible operation surface.
//!
//! [`Orchestrator`] drives each request through planning, routing,
//! execution, validation, the optional approval gate, and final assembly,
//! persisting the session at every boundary. [`ApiResponse`] is the uniform
//! envelope callers consume.
//!
//! # Main types
//! - [`Orchestrator`]: the engine itself
//! - [`EngineConfig`]: tuning knobs with serde defaults
//! - [`OrchestrateResponse`] / [`HealthStatus`]: operation results
//! - [`ApiResponse`] / [`ApiError`]: the API envelope

pub mod config;
pub mod engine;
pub mod response;

pub use config::EngineConfig;
pub use engine::{HealthStatus, OrchestrateResponse, Orchestrator};
pub use response::{ApiError, ApiResponse};

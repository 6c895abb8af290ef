//! acpctl - governed, spec-driven development workflow engine
//!
//! This crate drives a natural-language feature description through
//! specification, planning, and implementation phases, each validated
//! against a project-local constitution. State is checkpointed after every
//! phase so any run can be interrupted and resumed, and every decision is
//! surfaced as an auditable artifact on disk.

/// Returns the acpctl version.
#[must_use]
pub fn acpctl_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

pub mod paths;

pub mod agent;
pub mod agents;
pub mod artifact;
pub mod atomic_write;
pub mod checkpoint;
pub mod cli;
pub mod constitution;
pub mod engine;
pub mod error;
pub mod error_reporter;
pub mod exit_codes;
pub mod governance;
pub mod interaction;
pub mod llm;
pub mod logging;
pub mod state;
pub mod types;
pub mod workspace;

// Core types and errors used by external consumers
pub use checkpoint::{CheckpointData, CheckpointError, CheckpointStore, RunMetadata};
pub use engine::{route_governance, RouteLabel, RunSummary, WorkflowEngine};
pub use error::AcpError;
pub use exit_codes::ExitCode;
pub use state::{transition, StateError, WorkflowState, MAX_RETRIES, SCHEMA_VERSION};
pub use types::{Phase, Remediation, RunStatus, Severity, Violation};

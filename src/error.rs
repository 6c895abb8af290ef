//! Library-level error type with exit-code mapping
//!
//! `AcpError` is the error type the engine and CLI surface to users. Agents
//! and stores return their own typed errors; everything converges here so
//! the reporter can print one consistent shape: a one-line summary, the
//! phase and node when known, and a suggested next command.

use thiserror::Error;

use crate::agent::AgentError;
use crate::checkpoint::CheckpointError;
use crate::constitution::ConstitutionError;
use crate::exit_codes::ExitCode;
use crate::interaction::InteractionError;
use crate::llm::LlmError;
use crate::state::StateError;
use crate::types::Phase;

/// Top-level error for engine and CLI operations.
#[derive(Debug, Error)]
pub enum AcpError {
    #[error("constitution error: {0}")]
    Constitution(#[from] ConstitutionError),

    #[error("checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    #[error("state invariant error: {0}")]
    State(#[from] StateError),

    #[error("interaction error: {0}")]
    Interaction(#[from] InteractionError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("agent error: {0}")]
    Agent(#[from] AgentError),

    #[error("{message}")]
    UserInput {
        message: String,
        hint: Option<String>,
    },

    #[error("run '{run_id}' failed in phase '{phase}' at node '{node}': {message}")]
    RunFailed {
        run_id: String,
        phase: Phase,
        node: String,
        message: String,
    },

    #[error("run '{run_id}' aborted during phase '{phase}'")]
    Aborted { run_id: String, phase: Phase },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AcpError {
    /// Convenience constructor for user-input failures with a remediation
    /// hint.
    #[must_use]
    pub fn user(message: impl Into<String>, hint: Option<String>) -> Self {
        Self::UserInput {
            message: message.into(),
            hint,
        }
    }

    /// Map to the CLI exit code table: user-level failures are 1,
    /// engine/internal failures are 2.
    #[must_use]
    pub fn to_exit_code(&self) -> ExitCode {
        match self {
            // User-level: bad input, governance outcomes, missing pieces
            // the user can supply.
            Self::Constitution(_)
            | Self::UserInput { .. }
            | Self::RunFailed { .. }
            | Self::Aborted { .. }
            | Self::Interaction(_)
            | Self::Llm(_) => ExitCode::USER,

            Self::Agent(agent) => match agent {
                AgentError::MissingInput { .. }
                | AgentError::Interaction(_)
                | AgentError::UnresolvedUnknowns { .. } => ExitCode::USER,
                _ => ExitCode::INTERNAL,
            },

            Self::Checkpoint(checkpoint) => match checkpoint {
                CheckpointError::NotFound { .. } => ExitCode::USER,
                _ => ExitCode::INTERNAL,
            },

            // Engine-level: corrupted state, invariant bugs, filesystem.
            Self::State(_) | Self::Io(_) | Self::Internal(_) => ExitCode::INTERNAL,
        }
    }

    /// Suggested next command, when one obviously follows from the error.
    #[must_use]
    pub fn suggestion(&self) -> Option<String> {
        match self {
            Self::Constitution(ConstitutionError::NotFound { .. }) => {
                Some("Run `acpctl init` to create the workspace and a starter constitution".to_string())
            }
            Self::Checkpoint(CheckpointError::NotFound { run_id }) => Some(format!(
                "Run `acpctl history` to list runs; '{run_id}' has no checkpoint"
            )),
            Self::Checkpoint(CheckpointError::Corrupted { run_id, .. }) => Some(format!(
                "The checkpoint for '{run_id}' is unreadable; other runs are unaffected"
            )),
            Self::UserInput { hint, .. } => hint.clone(),
            Self::RunFailed { run_id, .. } => Some(format!(
                "Inspect the run with `acpctl status {run_id}`; regenerate by re-running the phase"
            )),
            Self::Interaction(InteractionError::MissingAnswer { .. }) => {
                Some("Answer every pre-flight question, or run interactively".to_string())
            }
            _ => None,
        }
    }
}

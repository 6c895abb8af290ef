//! Core types shared across the workflow engine
//!
//! Defines the phase enum, run status, violation reports, and the small
//! value types that travel inside the workflow state and across the
//! interaction port.

use serde::{Deserialize, Serialize};

/// Identifies the phases of a run, in execution order.
///
/// Only forward transitions are legal; re-entry of the current phase is
/// legal during governance retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    #[default]
    Init,
    Specify,
    Plan,
    Implement,
    Complete,
}

impl Phase {
    /// All phases in execution order.
    pub const ALL: [Phase; 5] = [
        Phase::Init,
        Phase::Specify,
        Phase::Plan,
        Phase::Implement,
        Phase::Complete,
    ];

    /// Returns the string representation of the phase
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Specify => "specify",
            Self::Plan => "plan",
            Self::Implement => "implement",
            Self::Complete => "complete",
        }
    }

    /// Position of this phase in the execution order.
    #[must_use]
    pub fn index(&self) -> usize {
        Self::ALL.iter().position(|p| p == self).unwrap_or(0)
    }

    /// The next phase in the execution order, or `None` from `complete`.
    #[must_use]
    pub fn next(&self) -> Option<Phase> {
        Self::ALL.get(self.index() + 1).copied()
    }

    /// True for the phases that run an agent (everything between the
    /// `init` and `complete` markers).
    #[must_use]
    pub const fn has_agent(&self) -> bool {
        matches!(self, Self::Specify | Self::Plan | Self::Implement)
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Phase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "init" => Ok(Self::Init),
            "specify" => Ok(Self::Specify),
            "plan" => Ok(Self::Plan),
            "implement" => Ok(Self::Implement),
            "complete" => Ok(Self::Complete),
            other => Err(format!("unknown phase '{other}'")),
        }
    }
}

/// Overall status of a run, tracked in checkpoint metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    InProgress,
    Paused,
    Completed,
    Failed,
}

impl RunStatus {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of the implementation agent's structural validation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationStatus {
    #[default]
    Pending,
    Pass,
    Fail,
}

/// Severity of a governance violation.
///
/// The engine treats any violation as a gate failure regardless of severity;
/// severity only affects how the finding is presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    High,
    Medium,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Critical => write!(f, "critical"),
            Self::High => write!(f, "high"),
            Self::Medium => write!(f, "medium"),
        }
    }
}

/// A structured finding from the governance validator.
///
/// Violations are serialized into the workflow state, grouped by artifact,
/// so they survive a checkpoint and can be displayed after resume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    /// Name or synthetic id of the violated principle
    pub principle: String,
    /// Artifact the violation was found in (e.g. "spec.md")
    pub artifact: String,
    /// 1-based line number of the first offending line, when known
    pub line: Option<u32>,
    /// What was violated and why
    pub description: String,
    /// Actionable fix recommendation
    pub suggestion: String,
    pub severity: Severity,
}

/// Kinds of artifact the governance validator knows how to judge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Spec,
    Research,
    Plan,
    DataModel,
    Contract,
    Quickstart,
    TestCode,
    ImplementationCode,
}

impl ArtifactKind {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Spec => "spec",
            Self::Research => "research",
            Self::Plan => "plan",
            Self::DataModel => "data-model",
            Self::Contract => "contract",
            Self::Quickstart => "quickstart",
            Self::TestCode => "test-code",
            Self::ImplementationCode => "implementation-code",
        }
    }

    /// True for the two code kinds produced by the implementation agent.
    #[must_use]
    pub const fn is_code(&self) -> bool {
        matches!(self, Self::TestCode | Self::ImplementationCode)
    }
}

/// Distinguishes the two code artifact kinds tracked in the state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CodeKind {
    Test,
    Implementation,
}

impl CodeKind {
    #[must_use]
    pub const fn artifact_kind(&self) -> ArtifactKind {
        match self {
            Self::Test => ArtifactKind::TestCode,
            Self::Implementation => ArtifactKind::ImplementationCode,
        }
    }
}

/// One generated code file, keyed by its path in the state's code map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeArtifact {
    pub kind: CodeKind,
    pub content: String,
}

/// One implementation task derived from the plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Stable id, e.g. "T001"
    pub id: String,
    pub description: String,
}

/// A resolved pre-flight question/answer pair, kept in order of asking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Clarification {
    pub question: String,
    pub answer: String,
}

/// A clarifying question emitted by the specification agent before it
/// generates the spec. At most [`MAX_PREFLIGHT_QUESTIONS`] are asked per run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreflightQuestion {
    /// 1-based ordinal within the batch
    pub index: usize,
    pub text: String,
    pub context: Option<String>,
}

/// Upper bound on pre-flight questions per run.
pub const MAX_PREFLIGHT_QUESTIONS: usize = 10;

/// The human decision after a governance failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Remediation {
    /// Loop back to the same phase agent and regenerate the artifact
    Regenerate,
    /// Re-read the (human-edited) constitution and re-validate without
    /// regenerating
    EditConstitution,
    /// Terminate the run as failed
    Abort,
    /// Advance despite violations; only available with the override flag
    Ignore,
}

impl std::fmt::Display for Remediation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Regenerate => write!(f, "regenerate"),
            Self::EditConstitution => write!(f, "edit-constitution"),
            Self::Abort => write!(f, "abort"),
            Self::Ignore => write!(f, "ignore"),
        }
    }
}

/// Progress notifications pushed through the interaction port.
///
/// `announce` never blocks the engine; ports are free to drop events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    RunStarted { run_id: String },
    RunResumed { run_id: String, phase: Phase },
    PhaseStarted { phase: Phase },
    PhaseCompleted { phase: Phase },
    PhaseSkipped { phase: Phase },
    GovernanceRetry { phase: Phase, attempt: u32 },
    IgnoreUnavailable,
    RunCompleted { run_id: String },
    RunFailed { run_id: String, reason: String },
}

/// Record of the most recent node failure, carried in the state so a failed
/// run can explain itself after resume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastError {
    /// Node that failed (e.g. "governance(spec)")
    pub node: String,
    pub message: String,
    pub phase: Phase,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_order_is_forward_only() {
        assert_eq!(Phase::Init.next(), Some(Phase::Specify));
        assert_eq!(Phase::Specify.next(), Some(Phase::Plan));
        assert_eq!(Phase::Plan.next(), Some(Phase::Implement));
        assert_eq!(Phase::Implement.next(), Some(Phase::Complete));
        assert_eq!(Phase::Complete.next(), None);
    }

    #[test]
    fn phase_round_trips_through_str() {
        for phase in Phase::ALL {
            assert_eq!(phase.as_str().parse::<Phase>().unwrap(), phase);
        }
    }

    #[test]
    fn run_status_serializes_snake_case() {
        let json = serde_json::to_string(&RunStatus::InProgress).unwrap();
        assert_eq!(json, "\"in_progress\"");
    }

    #[test]
    fn agent_phases_exclude_markers() {
        assert!(!Phase::Init.has_agent());
        assert!(Phase::Specify.has_agent());
        assert!(Phase::Implement.has_agent());
        assert!(!Phase::Complete.has_agent());
    }
}

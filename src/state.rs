//! Workflow state model and invariant validation
//!
//! The state is a single record carried through the phase graph. Nodes
//! mutate it freely; validation runs at the boundaries (checkpoint save,
//! checkpoint load, and the [`transition`] helper) rather than per
//! assignment. `validate` enforces the cross-field invariants and returns a
//! typed error naming the offending rule.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::types::{
    Clarification, CodeArtifact, LastError, Phase, Task, ValidationStatus, Violation,
};

/// Current checkpoint/state schema version.
pub const SCHEMA_VERSION: &str = "1.0.0";

/// Bound on the governance error counter before a run is marked failed.
pub const MAX_RETRIES: u32 = 3;

/// The payload carried through the phase graph.
///
/// Maps are `BTreeMap` so serialization is stable and checkpoint diffs stay
/// meaningful.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct WorkflowState {
    // Constitution layer
    pub constitution: String,
    /// Latest governance verdict
    pub governance_passes: bool,

    // Specification layer
    pub feature_description: String,
    pub spec: String,
    /// Ordered question/answer pairs collected pre-flight; reused verbatim on
    /// regeneration
    pub clarifications: Vec<Clarification>,

    // Planning layer
    /// Open questions the architect must discharge; empty when planning
    /// completes
    pub unknowns: Vec<String>,
    pub research: String,
    pub plan: String,
    pub data_model: String,
    /// contract name -> contract text
    pub contracts: BTreeMap<String, String>,
    pub quickstart: String,

    // Implementation layer
    pub tasks: Vec<Task>,
    pub completed_tasks: Vec<String>,
    /// path -> generated file, test and implementation kinds distinguished
    pub code_artifacts: BTreeMap<String, CodeArtifact>,
    pub validation_status: ValidationStatus,

    /// Latest governance findings, grouped by artifact name
    pub violations: BTreeMap<String, Vec<Violation>>,

    // Control layer
    pub phase: Phase,
    pub error_count: u32,
    pub last_error: Option<LastError>,
}

/// Invariant violations detected by [`WorkflowState::validate`] or
/// [`transition`]. Each variant names the rule it enforces.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StateError {
    #[error("spec is present but no constitution is loaded")]
    SpecWithoutConstitution,

    #[error("plan is present but no spec has been generated")]
    PlanWithoutSpec,

    #[error("implementation state is present but plan or data model is missing")]
    ImplementationWithoutPlan,

    #[error("phase is complete but {remaining} task(s) are not marked completed")]
    IncompleteTasks { remaining: usize },

    #[error("completed task '{id}' does not appear in the task list")]
    UnknownCompletedTask { id: String },

    #[error("clarification {index} has an empty question or answer")]
    EmptyClarification { index: usize },

    #[error("cannot move backwards from phase '{from}' to phase '{to}'")]
    PhaseRegression { from: Phase, to: Phase },

    #[error("cannot enter phase '{to}': {requirement}")]
    EntryRequirement { to: Phase, requirement: &'static str },
}

impl WorkflowState {
    /// A fresh state for a new run: constitution loaded, init gate passed.
    #[must_use]
    pub fn for_run(feature_description: impl Into<String>, constitution: impl Into<String>) -> Self {
        Self {
            constitution: constitution.into(),
            governance_passes: true,
            feature_description: feature_description.into(),
            ..Self::default()
        }
    }

    /// Check every cross-field invariant. Runs at checkpoint boundaries and
    /// inside [`transition`]; never per node assignment.
    pub fn validate(&self) -> Result<(), StateError> {
        // Spec requires a constitution to have been loaded.
        if !self.spec.is_empty() && self.constitution.is_empty() {
            return Err(StateError::SpecWithoutConstitution);
        }

        // Planning requires a specification.
        if !self.plan.is_empty() && self.spec.is_empty() {
            return Err(StateError::PlanWithoutSpec);
        }

        // Implementation requires a plan and a data model.
        let has_implementation = !self.tasks.is_empty() || !self.code_artifacts.is_empty();
        if has_implementation && (self.plan.is_empty() || self.data_model.is_empty()) {
            return Err(StateError::ImplementationWithoutPlan);
        }

        // Completed tasks must be a subset of the task list.
        for id in &self.completed_tasks {
            if !self.tasks.iter().any(|t| &t.id == id) {
                return Err(StateError::UnknownCompletedTask { id: id.clone() });
            }
        }

        // A complete run has every task finished.
        if self.phase == Phase::Complete {
            let remaining = self
                .tasks
                .iter()
                .filter(|t| !self.completed_tasks.contains(&t.id))
                .count();
            if remaining > 0 {
                return Err(StateError::IncompleteTasks { remaining });
            }
        }

        // Clarifications carry both halves of the exchange.
        for (index, c) in self.clarifications.iter().enumerate() {
            if c.question.trim().is_empty() || c.answer.trim().is_empty() {
                return Err(StateError::EmptyClarification { index });
            }
        }

        Ok(())
    }

    /// True once the run has reached its terminal phase.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.phase == Phase::Complete
    }
}

/// Advance the state to a new phase.
///
/// This is the only supported way to change `phase`: it copies the state,
/// applies the updates, sets the phase, and runs full validation including
/// the phase entry gates. Re-entering the current phase is allowed (the
/// retry path); moving backwards is not.
pub fn transition(
    state: &WorkflowState,
    new_phase: Phase,
    apply: impl FnOnce(&mut WorkflowState),
) -> Result<WorkflowState, StateError> {
    if new_phase.index() < state.phase.index() {
        return Err(StateError::PhaseRegression {
            from: state.phase,
            to: new_phase,
        });
    }

    let mut next = state.clone();
    apply(&mut next);
    next.phase = new_phase;

    // Entry gates apply only when actually advancing; retry re-entry skips
    // them because the artifact under rework may legitimately be failing
    // governance at that moment.
    if new_phase.index() > state.phase.index() {
        check_entry_requirements(&next, new_phase)?;
    }

    next.validate()?;
    Ok(next)
}

/// Gate conditions for entering each phase: the prior phase's artifact must
/// exist and must have passed governance at the moment of the transition.
fn check_entry_requirements(state: &WorkflowState, to: Phase) -> Result<(), StateError> {
    match to {
        Phase::Init => Ok(()),
        Phase::Specify => {
            if state.constitution.is_empty() || !state.governance_passes {
                return Err(StateError::EntryRequirement {
                    to,
                    requirement: "requires a loaded constitution and a passing governance gate",
                });
            }
            Ok(())
        }
        Phase::Plan => {
            if state.spec.is_empty() || !state.governance_passes {
                return Err(StateError::EntryRequirement {
                    to,
                    requirement: "requires an approved specification",
                });
            }
            Ok(())
        }
        Phase::Implement => {
            if state.plan.is_empty() || state.data_model.is_empty() || !state.governance_passes {
                return Err(StateError::EntryRequirement {
                    to,
                    requirement: "requires an approved plan and data model",
                });
            }
            Ok(())
        }
        Phase::Complete => {
            if !state.governance_passes {
                return Err(StateError::EntryRequirement {
                    to,
                    requirement: "requires a passing final governance gate",
                });
            }
            Ok(())
        }
    }
}

//! Governance agent
//!
//! Thin adapter over the rule validator: collect the artifacts produced by
//! the prior phase, validate each against the constitution, attach the
//! grouped violations to the state, and set the `governance_passes` flag.
//! Routing on the outcome belongs to the engine, not to this agent.

use async_trait::async_trait;
use std::collections::BTreeMap;
use tracing::{info, warn};

use crate::agent::{AgentContext, AgentError, PhaseAgent};
use crate::artifact::{DATA_MODEL_FILE, PLAN_FILE, QUICKSTART_FILE, RESEARCH_FILE, SPEC_FILE};
use crate::governance::validate_artifact;
use crate::state::WorkflowState;
use crate::types::{ArtifactKind, Phase, ValidationStatus, Violation};

#[derive(Debug, Default)]
pub struct GovernanceAgent;

impl GovernanceAgent {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// The artifact set a phase is judged on: name, kind, and content.
    fn artifacts_for_phase(state: &WorkflowState) -> Vec<(String, ArtifactKind, &str)> {
        match state.phase {
            Phase::Specify => vec![(SPEC_FILE.to_string(), ArtifactKind::Spec, state.spec.as_str())],
            Phase::Plan => {
                let mut set = vec![
                    (RESEARCH_FILE.to_string(), ArtifactKind::Research, state.research.as_str()),
                    (PLAN_FILE.to_string(), ArtifactKind::Plan, state.plan.as_str()),
                    (
                        DATA_MODEL_FILE.to_string(),
                        ArtifactKind::DataModel,
                        state.data_model.as_str(),
                    ),
                    (
                        QUICKSTART_FILE.to_string(),
                        ArtifactKind::Quickstart,
                        state.quickstart.as_str(),
                    ),
                ];
                for (name, content) in &state.contracts {
                    set.push((
                        format!("contracts/{name}"),
                        ArtifactKind::Contract,
                        content.as_str(),
                    ));
                }
                set
            }
            Phase::Implement => state
                .code_artifacts
                .iter()
                .map(|(path, artifact)| {
                    (path.clone(), artifact.kind.artifact_kind(), artifact.content.as_str())
                })
                .collect(),
            Phase::Init | Phase::Complete => Vec::new(),
        }
    }
}

#[async_trait]
impl PhaseAgent for GovernanceAgent {
    fn name(&self) -> &'static str {
        "governance"
    }

    async fn run(
        &self,
        state: WorkflowState,
        ctx: &AgentContext<'_>,
    ) -> Result<WorkflowState, AgentError> {
        let artifacts = Self::artifacts_for_phase(&state);

        let mut grouped: BTreeMap<String, Vec<Violation>> = BTreeMap::new();
        let mut total = 0usize;
        for (name, kind, content) in artifacts {
            let found = validate_artifact(ctx.constitution, kind, &name, content);
            if !found.is_empty() {
                total += found.len();
                grouped.insert(name, found);
            }
        }

        let passes = grouped.is_empty();
        if passes {
            info!(run_id = ctx.run_id, phase = %state.phase, "governance gate passed");
        } else {
            warn!(
                run_id = ctx.run_id,
                phase = %state.phase,
                violations = total,
                "governance gate failed"
            );
        }

        let mut next = state;
        next.governance_passes = passes;
        next.violations = grouped;
        if next.phase == Phase::Implement {
            next.validation_status = if passes {
                ValidationStatus::Pass
            } else {
                ValidationStatus::Fail
            };
        }
        Ok(next)
    }
}

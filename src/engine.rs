//! Workflow engine: phase sequencing, routing, retry, and remediation
//!
//! The engine is a graph in form but a state machine in spirit: at most
//! seven nodes, with routing a pure function of `governance_passes` and
//! `error_count`. Each command executes exactly one phase node followed by
//! its governance gate, then writes a checkpoint. The three-way
//! [`RouteLabel`] distinguishes bounded retry from unrecoverable failure;
//! `MAX_RETRIES` bounds the error counter and the counter resets to zero
//! every time governance passes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

use crate::agent::{AgentContext, PhaseAgent};
use crate::agents::{ArchitectAgent, GovernanceAgent, ImplementationAgent, SpecificationAgent};
use crate::artifact::{is_valid_run_id, slugify, ArtifactStore};
use crate::checkpoint::{CheckpointStore, RunMetadata};
use crate::constitution::Constitution;
use crate::error::AcpError;
use crate::interaction::InteractionPort;
use crate::llm::LlmClient;
use crate::paths::AcpPaths;
use crate::state::{transition, WorkflowState, MAX_RETRIES};
use crate::types::{Event, LastError, Phase, Remediation, RunStatus, Violation};
use crate::workspace;

/// Symbolic label returned by the governance routing function. The graph
/// picks an edge from the label alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteLabel {
    /// Gate passed; advance to the next phase
    Passed,
    /// Violations present and retry budget remains; route to remediation
    Retry,
    /// Retry budget exhausted; terminate the run as failed
    Failed,
}

/// Pure routing function over the two control fields.
#[must_use]
pub fn route_governance(state: &WorkflowState) -> RouteLabel {
    if state.governance_passes {
        RouteLabel::Passed
    } else if state.error_count < MAX_RETRIES {
        RouteLabel::Retry
    } else {
        RouteLabel::Failed
    }
}

/// What a finished engine invocation looks like to the CLI.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_id: String,
    pub status: RunStatus,
    pub phase: Phase,
    pub phases_completed: Vec<Phase>,
}

/// The workflow engine. Owns the state during graph execution; hands
/// snapshots to the checkpoint store at phase boundaries.
pub struct WorkflowEngine {
    paths: AcpPaths,
    checkpoints: CheckpointStore,
    artifacts: ArtifactStore,
    llm: Arc<dyn LlmClient>,
    interaction: Arc<dyn InteractionPort>,
    cancel: Arc<AtomicBool>,
    /// The explicit override that makes the `Ignore` remediation available
    force: bool,
}

impl WorkflowEngine {
    #[must_use]
    pub fn new(
        paths: AcpPaths,
        llm: Arc<dyn LlmClient>,
        interaction: Arc<dyn InteractionPort>,
    ) -> Self {
        let checkpoints = CheckpointStore::new(paths.state_dir());
        let artifacts = ArtifactStore::new(paths.specs_dir());
        Self {
            paths,
            checkpoints,
            artifacts,
            llm,
            interaction,
            cancel: Arc::new(AtomicBool::new(false)),
            force: false,
        }
    }

    #[must_use]
    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// Flag a graceful stop: the engine finishes the current node, writes a
    /// paused checkpoint, and returns.
    #[must_use]
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    #[must_use]
    pub fn checkpoints(&self) -> &CheckpointStore {
        &self.checkpoints
    }

    #[must_use]
    pub fn artifacts(&self) -> &ArtifactStore {
        &self.artifacts
    }

    fn agent_for(phase: Phase) -> Option<Box<dyn PhaseAgent>> {
        match phase {
            Phase::Specify => Some(Box::new(SpecificationAgent::new())),
            Phase::Plan => Some(Box::new(ArchitectAgent::new())),
            Phase::Implement => Some(Box::new(ImplementationAgent::new())),
            Phase::Init | Phase::Complete => None,
        }
    }

    /// Start a new run: allocate the id, create the artifact directory and
    /// optional git branch, then run the specification phase.
    pub async fn start(&self, description: &str, no_branch: bool) -> Result<RunSummary, AcpError> {
        let description = description.trim();
        if description.is_empty() {
            return Err(AcpError::user(
                "a feature description is required",
                Some("Example: acpctl specify \"Add full text search\"".to_string()),
            ));
        }

        let constitution = Constitution::load(&self.paths)?;
        let run_id = self.artifacts.next_run_id(description).map_err(AcpError::Internal)?;
        if self.checkpoints.exists(&run_id) {
            return Err(AcpError::user(
                format!("run '{run_id}' already has a checkpoint"),
                Some(format!("Resume it with `acpctl resume {run_id}`")),
            ));
        }

        let run_dir = self
            .artifacts
            .create_run_dir(&run_id)
            .map_err(AcpError::Internal)?;

        if !no_branch && workspace::is_git_repository(self.paths.root()) {
            // Branch creation is best-effort; the run proceeds either way.
            if let Err(e) = workspace::create_git_branch(self.paths.root(), &run_id) {
                warn!(run_id = %run_id, error = %e, "could not create git branch");
            }
        }

        let metadata = RunMetadata::new(&run_id, &slugify(description), run_dir.as_str());
        let state = WorkflowState::for_run(description, constitution.text.clone());

        self.interaction.announce(&Event::RunStarted {
            run_id: run_id.clone(),
        });
        self.execute_phase(metadata, state, constitution, Phase::Specify)
            .await
    }

    /// Run one named phase (`plan` or `implement`) of an existing run.
    pub async fn run_phase(
        &self,
        run_id: Option<&str>,
        target: Phase,
    ) -> Result<RunSummary, AcpError> {
        let run_id = self.resolve_run_id(run_id)?;
        let (metadata, state) = self.load_run(&run_id)?;
        let constitution = Constitution::load(&self.paths)?;

        match next_pending_phase(&metadata) {
            None => Err(AcpError::user(
                format!("run '{run_id}' is already complete"),
                Some("Start a new run with `acpctl specify`".to_string()),
            )),
            Some(next) if next == target => {
                self.execute_phase(metadata, state, constitution, target).await
            }
            Some(next) => Err(AcpError::user(
                format!(
                    "run '{run_id}' is not ready for '{target}'; its next phase is '{next}'"
                ),
                Some(format!("Run `acpctl {next}` (or `acpctl resume {run_id}`)")),
            )),
        }
    }

    /// Resume the latest paused run (or the named one): announce the
    /// completed phases as skipped, then run the next pending phase.
    pub async fn resume(&self, run_id: Option<&str>) -> Result<RunSummary, AcpError> {
        let run_id = match run_id {
            Some(id) => self.resolve_run_id(Some(id))?,
            None => self.latest_paused()?,
        };
        let (metadata, state) = self.load_run(&run_id)?;
        let constitution = Constitution::load(&self.paths)?;

        let Some(target) = next_pending_phase(&metadata) else {
            return Err(AcpError::user(
                format!("run '{run_id}' is already complete; nothing to resume"),
                Some("Start a new run with `acpctl specify`".to_string()),
            ));
        };

        self.interaction.announce(&Event::RunResumed {
            run_id: run_id.clone(),
            phase: target,
        });
        for phase in &metadata.phases_completed {
            self.interaction.announce(&Event::PhaseSkipped { phase: *phase });
        }

        self.execute_phase(metadata, state, constitution, target).await
    }

    fn resolve_run_id(&self, run_id: Option<&str>) -> Result<String, AcpError> {
        match run_id {
            Some(id) => {
                if !is_valid_run_id(id) {
                    return Err(AcpError::user(
                        format!("'{id}' is not a valid run id"),
                        Some("Run ids look like 001-add-search; see `acpctl history`".to_string()),
                    ));
                }
                Ok(id.to_string())
            }
            None => self
                .checkpoints
                .latest()?
                .ok_or_else(|| {
                    AcpError::user(
                        "no runs found in this workspace",
                        Some("Start one with `acpctl specify \"<description>\"`".to_string()),
                    )
                }),
        }
    }

    fn latest_paused(&self) -> Result<String, AcpError> {
        self.checkpoints
            .list()?
            .into_iter()
            .find(|m| m.status == RunStatus::Paused)
            .map(|m| m.run_id)
            .ok_or_else(|| {
                AcpError::user(
                    "no paused run to resume",
                    Some("See `acpctl history` for run states".to_string()),
                )
            })
    }

    fn load_run(&self, run_id: &str) -> Result<(RunMetadata, WorkflowState), AcpError> {
        let loaded = self.checkpoints.load(run_id)?;
        if loaded.migrated {
            info!(run_id = %run_id, "checkpoint migrated to the current schema");
        }
        Ok((loaded.metadata, loaded.state))
    }

    /// Execute one phase node plus its governance gate, with bounded retry
    /// and the remediation loop, then checkpoint.
    async fn execute_phase(
        &self,
        mut metadata: RunMetadata,
        mut state: WorkflowState,
        mut constitution: Constitution,
        phase: Phase,
    ) -> Result<RunSummary, AcpError> {
        let Some(agent) = Self::agent_for(phase) else {
            return Err(AcpError::user(
                format!("phase '{phase}' has no agent to run"),
                None,
            ));
        };
        let governance = GovernanceAgent::new();
        let run_id = metadata.run_id.clone();

        metadata.status = RunStatus::InProgress;
        // Keep the state's constitution copy current with the file.
        state.constitution = constitution.text.clone();

        'attempt: loop {
            if self.cancel.load(Ordering::SeqCst) {
                return self.pause(metadata, state);
            }

            self.interaction.announce(&Event::PhaseStarted { phase });
            let attempt_result = {
                let ctx = AgentContext {
                    run_id: &run_id,
                    llm: self.llm.as_ref(),
                    interaction: self.interaction.as_ref(),
                    artifacts: &self.artifacts,
                    constitution: &constitution,
                };
                agent.run(state.clone(), &ctx).await
            };

            let mut candidate = match attempt_result {
                Ok(next) => next,
                Err(e) if e.is_transient() => {
                    state.error_count += 1;
                    state.last_error = Some(LastError {
                        node: agent.name().to_string(),
                        message: e.to_string(),
                        phase,
                    });
                    warn!(
                        run_id = %run_id,
                        phase = %phase,
                        error_count = state.error_count,
                        error = %e,
                        "transient agent failure"
                    );
                    if state.error_count >= MAX_RETRIES {
                        return self.fail(metadata, state, phase, agent.name(), &e.to_string());
                    }
                    continue 'attempt;
                }
                Err(e) => return Err(e.into()),
            };

            'gate: loop {
                if self.cancel.load(Ordering::SeqCst) {
                    return self.pause(metadata, candidate);
                }

                candidate = {
                    let ctx = AgentContext {
                        run_id: &run_id,
                        llm: self.llm.as_ref(),
                        interaction: self.interaction.as_ref(),
                        artifacts: &self.artifacts,
                        constitution: &constitution,
                    };
                    governance.run(candidate, &ctx).await?
                };

                match route_governance(&candidate) {
                    RouteLabel::Passed => {
                        candidate.error_count = 0;
                        candidate.last_error = None;
                        return self.complete_phase(metadata, candidate, phase);
                    }
                    RouteLabel::Retry => {
                        let violations = flatten_violations(&candidate);
                        self.interaction.report_violations(&violations);

                        match self.choose_remediation(&violations)? {
                            Remediation::Regenerate => {
                                // The counter increments on re-entry to the agent.
                                candidate.error_count += 1;
                                candidate.last_error = Some(LastError {
                                    node: format!("governance({})", agent.name()),
                                    message: format!(
                                        "{} violation(s); regenerating",
                                        violations.len()
                                    ),
                                    phase,
                                });
                                self.interaction.announce(&Event::GovernanceRetry {
                                    phase,
                                    attempt: candidate.error_count,
                                });
                                state = candidate;
                                continue 'attempt;
                            }
                            Remediation::EditConstitution => {
                                // The human edited the file; observe it and
                                // re-validate without regenerating.
                                constitution = Constitution::load(&self.paths)?;
                                candidate.constitution = constitution.text.clone();
                                continue 'gate;
                            }
                            Remediation::Abort => {
                                candidate.last_error = Some(LastError {
                                    node: format!("governance({})", agent.name()),
                                    message: "aborted by user after violations".to_string(),
                                    phase,
                                });
                                metadata.status = RunStatus::Failed;
                                metadata = self.checkpoints.save(metadata, &candidate)?;
                                self.interaction.announce(&Event::RunFailed {
                                    run_id: run_id.clone(),
                                    reason: "aborted".to_string(),
                                });
                                return Err(AcpError::Aborted { run_id, phase });
                            }
                            Remediation::Ignore => {
                                info!(run_id = %run_id, phase = %phase, "violations ignored by override");
                                candidate.governance_passes = true;
                                candidate.error_count = 0;
                                return self.complete_phase(metadata, candidate, phase);
                            }
                        }
                    }
                    RouteLabel::Failed => {
                        let node = format!("governance({})", agent.name());
                        let message = format!(
                            "governance failed after {MAX_RETRIES} retries ({} violation(s) remain)",
                            flatten_violations(&candidate).len()
                        );
                        return self.fail(metadata, candidate, phase, &node, &message);
                    }
                }
            }
        }
    }

    /// Collect the remediation decision, honoring the override gate on
    /// `Ignore`.
    fn choose_remediation(&self, violations: &[Violation]) -> Result<Remediation, AcpError> {
        if self.force {
            return Ok(Remediation::Ignore);
        }
        loop {
            let choice = self.interaction.remediate(violations)?;
            if choice == Remediation::Ignore {
                // Only available with the explicit override flag.
                self.interaction.announce(&Event::IgnoreUnavailable);
                continue;
            }
            return Ok(choice);
        }
    }

    /// Record a passed phase: update metadata, advance terminal state, and
    /// write the checkpoint.
    fn complete_phase(
        &self,
        mut metadata: RunMetadata,
        mut state: WorkflowState,
        phase: Phase,
    ) -> Result<RunSummary, AcpError> {
        if !metadata.phases_completed.contains(&phase) {
            metadata.phases_completed.push(phase);
        }

        if phase == Phase::Implement {
            state = transition(&state, Phase::Complete, |_| {})?;
            metadata.status = RunStatus::Completed;
        } else {
            metadata.status = RunStatus::Paused;
        }

        let metadata = self.checkpoints.save(metadata, &state)?;
        self.interaction.announce(&Event::PhaseCompleted { phase });
        if metadata.status == RunStatus::Completed {
            self.interaction.announce(&Event::RunCompleted {
                run_id: metadata.run_id.clone(),
            });
        }

        info!(
            run_id = %metadata.run_id,
            phase = %phase,
            status = %metadata.status,
            "checkpoint written"
        );
        Ok(summary(&metadata))
    }

    /// Graceful stop between nodes: checkpoint as paused and return.
    fn pause(
        &self,
        mut metadata: RunMetadata,
        state: WorkflowState,
    ) -> Result<RunSummary, AcpError> {
        metadata.status = RunStatus::Paused;
        let metadata = self.checkpoints.save(metadata, &state)?;
        info!(run_id = %metadata.run_id, "stopped on request; checkpoint written");
        Ok(summary(&metadata))
    }

    /// Terminal failure: checkpoint with `status = failed` and a populated
    /// `last_error`, then surface the run failure.
    fn fail(
        &self,
        mut metadata: RunMetadata,
        mut state: WorkflowState,
        phase: Phase,
        node: &str,
        message: &str,
    ) -> Result<RunSummary, AcpError> {
        if state.last_error.is_none() {
            state.last_error = Some(LastError {
                node: node.to_string(),
                message: message.to_string(),
                phase,
            });
        }
        metadata.status = RunStatus::Failed;
        let metadata = self.checkpoints.save(metadata, &state)?;
        self.interaction.announce(&Event::RunFailed {
            run_id: metadata.run_id.clone(),
            reason: message.to_string(),
        });

        Err(AcpError::RunFailed {
            run_id: metadata.run_id,
            phase,
            node: node.to_string(),
            message: message.to_string(),
        })
    }
}

/// The first agent phase not yet recorded as completed, or `None` when the
/// run is done.
#[must_use]
pub fn next_pending_phase(metadata: &RunMetadata) -> Option<Phase> {
    [Phase::Specify, Phase::Plan, Phase::Implement]
        .into_iter()
        .find(|phase| !metadata.phases_completed.contains(phase))
}

fn flatten_violations(state: &WorkflowState) -> Vec<Violation> {
    state.violations.values().flatten().cloned().collect()
}

fn summary(metadata: &RunMetadata) -> RunSummary {
    RunSummary {
        run_id: metadata.run_id.clone(),
        status: metadata.status,
        phase: metadata.phase,
        phases_completed: metadata.phases_completed.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn routing_is_a_pure_function_of_two_fields() {
        let mut state = WorkflowState::default();
        state.governance_passes = true;
        assert_eq!(route_governance(&state), RouteLabel::Passed);

        state.governance_passes = false;
        state.error_count = 0;
        assert_eq!(route_governance(&state), RouteLabel::Retry);

        state.error_count = MAX_RETRIES - 1;
        assert_eq!(route_governance(&state), RouteLabel::Retry);

        state.error_count = MAX_RETRIES;
        assert_eq!(route_governance(&state), RouteLabel::Failed);
    }

    #[test]
    fn next_pending_phase_walks_the_enum_order() {
        let mut metadata = RunMetadata::new("001-x", "x", "specs/001-x");
        assert_eq!(next_pending_phase(&metadata), Some(Phase::Specify));

        metadata.phases_completed.push(Phase::Specify);
        assert_eq!(next_pending_phase(&metadata), Some(Phase::Plan));

        metadata.phases_completed.push(Phase::Plan);
        assert_eq!(next_pending_phase(&metadata), Some(Phase::Implement));

        metadata.phases_completed.push(Phase::Implement);
        assert_eq!(next_pending_phase(&metadata), None);
    }
}

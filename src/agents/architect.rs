//! Architect agent
//!
//! Runs in two observable sub-phases. Phase 0 produces `research.md`, a
//! document that discharges every open unknown in the state; the unknowns
//! list must be empty on exit and clarifications are never re-opened. Phase
//! 1 produces `plan.md`, `data-model.md`, zero or more contract files under
//! `contracts/`, and `quickstart.md`.

use async_trait::async_trait;
use std::collections::BTreeMap;
use tracing::{debug, info};

use crate::agent::{parse_file_blocks, AgentContext, AgentError, PhaseAgent};
use crate::artifact::{CONTRACTS_DIR, DATA_MODEL_FILE, PLAN_FILE, QUICKSTART_FILE, RESEARCH_FILE};
use crate::llm::{LlmOp, LlmRequest, Message};
use crate::state::{transition, WorkflowState};
use crate::types::Phase;

/// Marker an LLM may leave in research output for a question it could not
/// settle; any remaining occurrence fails the phase.
const UNRESOLVED_MARKER: &str = "NEEDS CLARIFICATION";

#[derive(Debug, Default)]
pub struct ArchitectAgent;

impl ArchitectAgent {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    async fn invoke(
        &self,
        ctx: &AgentContext<'_>,
        op: LlmOp,
        prompt: String,
    ) -> Result<String, AgentError> {
        let request = LlmRequest::new(ctx.run_id, op, vec![Message::user(prompt)]);
        let response = ctx.llm.complete(request).await?;
        if response.text.trim().is_empty() {
            return Err(AgentError::Malformed {
                what: format!("empty {op} output"),
            });
        }
        Ok(response.text)
    }

    /// Phase 0: discharge unknowns into research.md.
    async fn research(
        &self,
        state: &WorkflowState,
        ctx: &AgentContext<'_>,
    ) -> Result<String, AgentError> {
        let unknowns_text = if state.unknowns.is_empty() {
            "None recorded; confirm the defaults in the specification.".to_string()
        } else {
            state
                .unknowns
                .iter()
                .map(|u| format!("- {u}"))
                .collect::<Vec<_>>()
                .join("\n")
        };

        let prompt = format!(
            "You are resolving the open technical unknowns for a planned feature.\n\n\
             Feature Description:\n{}\n\n\
             Specification:\n{}\n\n\
             Open Unknowns:\n{unknowns_text}\n\n\
             Produce a research document with a '## Decisions' section that settles \
             every unknown with a decision and rationale. Do not re-open questions the \
             specification already answers. If something truly cannot be settled, mark \
             it '{UNRESOLVED_MARKER}'.",
            state.feature_description, state.spec,
        );

        let research = self.invoke(ctx, LlmOp::Research, prompt).await?;

        let unresolved = research.matches(UNRESOLVED_MARKER).count();
        if unresolved > 0 {
            return Err(AgentError::UnresolvedUnknowns { count: unresolved });
        }
        Ok(research)
    }

    async fn plan(&self, state: &WorkflowState, ctx: &AgentContext<'_>) -> Result<String, AgentError> {
        let prompt = format!(
            "You are writing the implementation plan for an approved specification.\n\n\
             Feature Description:\n{}\n\n\
             Specification:\n{}\n\n\
             Research:\n{}\n\n\
             Produce a plan with '## Summary', '## Technical Context', \
             '## Project Structure', and '## Components' sections. List each component \
             as '- **name**: purpose'.",
            state.feature_description, state.spec, state.research,
        );
        self.invoke(ctx, LlmOp::Plan, prompt).await
    }

    async fn data_model(
        &self,
        state: &WorkflowState,
        plan: &str,
        ctx: &AgentContext<'_>,
    ) -> Result<String, AgentError> {
        let prompt = format!(
            "You are documenting the data model for a planned feature.\n\n\
             Feature Description:\n{}\n\n\
             Specification:\n{}\n\n\
             Plan:\n{plan}\n\n\
             Produce a data model document with a '## Core Entities' section naming \
             every persisted entity and its attributes, without implementation detail. \
             A feature that persists nothing still documents its in-memory entities.",
            state.feature_description, state.spec,
        );
        self.invoke(ctx, LlmOp::DataModel, prompt).await
    }

    async fn contracts(
        &self,
        state: &WorkflowState,
        plan: &str,
        ctx: &AgentContext<'_>,
    ) -> Result<BTreeMap<String, String>, AgentError> {
        if !needs_contracts(&state.spec) {
            debug!("specification exposes no interfaces; skipping contracts");
            return Ok(BTreeMap::new());
        }

        let prompt = format!(
            "You are writing interface contracts for a planned feature.\n\n\
             Feature Description:\n{}\n\n\
             Specification:\n{}\n\n\
             Plan:\n{plan}\n\n\
             Produce one or more contract files. Start each with a line \
             'FILE: <name>.yaml' followed by its content as an interface document \
             with an 'openapi:' header and a 'paths:' map.",
            state.feature_description, state.spec,
        );
        let response = self.invoke(ctx, LlmOp::Contracts, prompt).await?;

        let blocks = parse_file_blocks(&response);
        if blocks.is_empty() {
            return Err(AgentError::Malformed {
                what: "contracts output contained no FILE blocks".to_string(),
            });
        }
        Ok(blocks.into_iter().collect())
    }

    async fn quickstart(
        &self,
        state: &WorkflowState,
        plan: &str,
        ctx: &AgentContext<'_>,
    ) -> Result<String, AgentError> {
        let prompt = format!(
            "You are writing the quickstart walkthrough for a planned feature.\n\n\
             Feature Description:\n{}\n\n\
             Plan:\n{plan}\n\n\
             Produce a short numbered walkthrough a developer follows to exercise the \
             feature end to end.",
            state.feature_description,
        );
        self.invoke(ctx, LlmOp::Quickstart, prompt).await
    }
}

/// Contracts are emitted by default; a spec opts out only by declaring it
/// exposes no interface surface.
fn needs_contracts(spec: &str) -> bool {
    !spec.to_lowercase().contains("no external interface")
}

#[async_trait]
impl PhaseAgent for ArchitectAgent {
    fn name(&self) -> &'static str {
        "plan"
    }

    async fn run(
        &self,
        state: WorkflowState,
        ctx: &AgentContext<'_>,
    ) -> Result<WorkflowState, AgentError> {
        if state.spec.is_empty() {
            return Err(AgentError::MissingInput { field: "spec" });
        }

        // Phase 0: research.
        let research = self.research(&state, ctx).await?;
        ctx.artifacts.write_text(ctx.run_id, RESEARCH_FILE, &research)?;
        info!(run_id = ctx.run_id, "wrote {RESEARCH_FILE}");

        // Phase 1: design artifacts.
        let plan = self.plan(&state, ctx).await?;
        let data_model = self.data_model(&state, &plan, ctx).await?;
        let contracts = self.contracts(&state, &plan, ctx).await?;
        let quickstart = self.quickstart(&state, &plan, ctx).await?;

        ctx.artifacts.write_text(ctx.run_id, PLAN_FILE, &plan)?;
        ctx.artifacts
            .write_text(ctx.run_id, DATA_MODEL_FILE, &data_model)?;
        for (name, content) in &contracts {
            ctx.artifacts
                .write_text(ctx.run_id, &format!("{CONTRACTS_DIR}/{name}"), content)?;
        }
        ctx.artifacts
            .write_text(ctx.run_id, QUICKSTART_FILE, &quickstart)?;
        info!(
            run_id = ctx.run_id,
            contracts = contracts.len(),
            "wrote design artifacts"
        );

        Ok(transition(&state, Phase::Plan, |s| {
            s.research = research;
            s.unknowns.clear();
            s.plan = plan;
            s.data_model = data_model;
            s.contracts = contracts;
            s.quickstart = quickstart;
        })?)
    }
}

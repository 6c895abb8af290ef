//! Specification agent
//!
//! Two sub-phases in a single node. First, on the initial run only,
//! generate up to ten pre-flight questions resolving ambiguities in the
//! feature description and push them through the interaction port as one
//! batch; all answers are required before proceeding. Second, synthesize
//! `spec.md` conforming to the required-sections schema, incorporating
//! every answer. Regeneration after a governance failure reuses the
//! already-collected clarifications and never re-prompts.

use async_trait::async_trait;
use tracing::{debug, info};

use crate::agent::{AgentContext, AgentError, PhaseAgent};
use crate::artifact::SPEC_FILE;
use crate::llm::{LlmOp, LlmRequest, Message};
use crate::state::{transition, WorkflowState};
use crate::types::{Clarification, Phase, PreflightQuestion, MAX_PREFLIGHT_QUESTIONS};

#[derive(Debug, Default)]
pub struct SpecificationAgent;

impl SpecificationAgent {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Generate the pre-flight question batch from the description.
    async fn generate_questions(
        &self,
        state: &WorkflowState,
        ctx: &AgentContext<'_>,
    ) -> Result<Vec<PreflightQuestion>, AgentError> {
        let prompt = format!(
            "You are a product analyst preparing to write a feature specification.\n\n\
             Feature Description:\n{}\n\n\
             List the ambiguities that must be resolved before a complete specification \
             can be written. Ask at most {MAX_PREFLIGHT_QUESTIONS} specific, answerable \
             questions about WHAT and WHY; never about implementation. Return a numbered \
             list, one question per line, each ending with '?'.",
            state.feature_description,
        );

        let request = LlmRequest::new(
            ctx.run_id,
            LlmOp::PreflightQuestions,
            vec![Message::user(prompt)],
        );
        let response = ctx.llm.complete(request).await?;

        let mut questions = Vec::new();
        for line in response.text.lines() {
            let cleaned = line
                .trim()
                .trim_start_matches(|c: char| c.is_ascii_digit() || c == '.' || c == ')')
                .trim();
            if cleaned.ends_with('?') {
                questions.push(PreflightQuestion {
                    index: questions.len() + 1,
                    text: cleaned.to_string(),
                    context: None,
                });
            }
            if questions.len() == MAX_PREFLIGHT_QUESTIONS {
                debug!("truncating pre-flight questions at the batch bound");
                break;
            }
        }
        Ok(questions)
    }

    /// Collect clarifications through the port; all-or-nothing.
    async fn preflight(
        &self,
        state: &WorkflowState,
        ctx: &AgentContext<'_>,
    ) -> Result<Vec<Clarification>, AgentError> {
        let questions = self.generate_questions(state, ctx).await?;
        if questions.is_empty() {
            info!("feature description is unambiguous; no clarifications needed");
            return Ok(Vec::new());
        }

        let answers = ctx.interaction.ask(&questions)?;
        Ok(questions
            .into_iter()
            .zip(answers)
            .map(|(q, answer)| Clarification {
                question: q.text,
                answer,
            })
            .collect())
    }

    async fn generate_spec(
        &self,
        state: &WorkflowState,
        clarifications: &[Clarification],
        ctx: &AgentContext<'_>,
    ) -> Result<String, AgentError> {
        let clarifications_text = if clarifications.is_empty() {
            "None; the description was complete.".to_string()
        } else {
            clarifications
                .iter()
                .enumerate()
                .map(|(i, c)| format!("{}. Q: {}\n   A: {}", i + 1, c.question, c.answer))
                .collect::<Vec<_>>()
                .join("\n")
        };

        let prompt = format!(
            "You are writing a feature specification document.\n\n\
             Feature Description:\n{}\n\n\
             Clarifications:\n{clarifications_text}\n\n\
             Governing principles:\n{}\n\n\
             Rules:\n\
             - Describe WHAT and WHY, never HOW\n\
             - Name no languages, frameworks, databases, or cloud services\n\
             - Include '## User Scenarios', '## Requirements', and \
             '## Success Criteria' sections\n\
             - Output the document itself, with no surrounding commentary",
            state.feature_description, ctx.constitution.text,
        );

        let request = LlmRequest::new(ctx.run_id, LlmOp::Spec, vec![Message::user(prompt)]);
        let response = ctx.llm.complete(request).await?;

        if response.text.trim().is_empty() {
            return Err(AgentError::Malformed {
                what: "empty specification".to_string(),
            });
        }
        Ok(response.text)
    }
}

#[async_trait]
impl PhaseAgent for SpecificationAgent {
    fn name(&self) -> &'static str {
        "specify"
    }

    async fn run(
        &self,
        state: WorkflowState,
        ctx: &AgentContext<'_>,
    ) -> Result<WorkflowState, AgentError> {
        if state.feature_description.is_empty() {
            return Err(AgentError::MissingInput {
                field: "feature_description",
            });
        }
        if state.constitution.is_empty() {
            return Err(AgentError::MissingInput {
                field: "constitution",
            });
        }

        // Pre-flight runs once, before the first generation. Regeneration
        // keeps the collected clarifications verbatim.
        let clarifications = if state.spec.is_empty() {
            self.preflight(&state, ctx).await?
        } else {
            debug!("regenerating spec; reusing existing clarifications");
            state.clarifications.clone()
        };

        let spec = self.generate_spec(&state, &clarifications, ctx).await?;
        ctx.artifacts.write_text(ctx.run_id, SPEC_FILE, &spec)?;
        info!(run_id = ctx.run_id, "wrote {SPEC_FILE}");

        // Anything the spec leaves marked unresolved becomes an unknown for
        // the architect's research sub-phase to discharge.
        let unknowns = extract_unknowns(&spec);

        Ok(transition(&state, Phase::Specify, |s| {
            s.spec = spec;
            s.clarifications = clarifications;
            s.unknowns = unknowns;
        })?)
    }
}

/// Collect `[NEEDS CLARIFICATION: ...]` markers left in a spec. These feed
/// the planning phase's open-unknowns list.
fn extract_unknowns(spec: &str) -> Vec<String> {
    let mut unknowns = Vec::new();
    for line in spec.lines() {
        let mut rest = line;
        while let Some(start) = rest.find("[NEEDS CLARIFICATION:") {
            let tail = &rest[start + "[NEEDS CLARIFICATION:".len()..];
            let Some(end) = tail.find(']') else { break };
            let unknown = tail[..end].trim();
            if !unknown.is_empty() {
                unknowns.push(unknown.to_string());
            }
            rest = &tail[end + 1..];
        }
    }
    unknowns
}

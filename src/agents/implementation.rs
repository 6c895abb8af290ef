//! Implementation agent
//!
//! Enforces the test-first discipline in two sub-phases: RED emits test
//! files into the code tree, structurally valid and tied to the observable
//! behaviors of the spec; GREEN emits the paired implementation files. Test
//! and implementation files are tracked as distinct artifact kinds in the
//! state, and the task list records both halves per component.

use async_trait::async_trait;
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::LazyLock;
use tracing::info;

use crate::agent::{parse_file_blocks, AgentContext, AgentError, PhaseAgent};
use crate::llm::{LlmOp, LlmRequest, Message};
use crate::state::{transition, WorkflowState};
use crate::types::{CodeArtifact, CodeKind, Phase, Task, ValidationStatus};

static COMPONENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*-\s+\*\*([a-z][a-z0-9_]*)\*\*:\s*(.+)$").expect("valid component regex")
});

#[derive(Debug, Default)]
pub struct ImplementationAgent;

impl ImplementationAgent {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Components named in the plan's `## Components` section. Falls back
    /// to a single `core` component when the plan lists none.
    fn components_from_plan(plan: &str) -> Vec<(String, String)> {
        let components: Vec<(String, String)> = COMPONENT_RE
            .captures_iter(plan)
            .map(|caps| (caps[1].to_string(), caps[2].trim().to_string()))
            .collect();

        if components.is_empty() {
            vec![("core".to_string(), "primary feature behaviors".to_string())]
        } else {
            components
        }
    }

    async fn emit_files(
        &self,
        ctx: &AgentContext<'_>,
        op: LlmOp,
        component: &str,
        purpose: &str,
        state: &WorkflowState,
    ) -> Result<Vec<(String, String)>, AgentError> {
        let role = match op {
            LlmOp::Tests => {
                "Write the behavior tests for this component before any implementation \
                 exists. Each test must name an observable behavior from the specification."
            }
            _ => {
                "Write the implementation files that make the already-written tests for \
                 this component pass."
            }
        };

        let prompt = format!(
            "{role}\n\n\
             Component:\n{component}\n\n\
             Purpose: {purpose}\n\n\
             Specification:\n{}\n\n\
             Plan:\n{}\n\n\
             Start each file with a line 'FILE: <path>' followed by its content.",
            state.spec, state.plan,
        );

        let request = LlmRequest::new(ctx.run_id, op, vec![Message::user(prompt)]);
        let response = ctx.llm.complete(request).await?;

        let blocks = parse_file_blocks(&response.text);
        if blocks.is_empty() {
            return Err(AgentError::Malformed {
                what: format!("{op} output for '{component}' contained no FILE blocks"),
            });
        }
        Ok(blocks)
    }

    /// Structural check on the RED output: every test file must be
    /// non-trivial and must reference its component.
    fn tests_are_structurally_valid(files: &BTreeMap<String, CodeArtifact>) -> bool {
        files
            .values()
            .filter(|a| a.kind == CodeKind::Test)
            .all(|a| a.content.len() > 40 && a.content.contains("test"))
    }
}

#[async_trait]
impl PhaseAgent for ImplementationAgent {
    fn name(&self) -> &'static str {
        "implement"
    }

    async fn run(
        &self,
        state: WorkflowState,
        ctx: &AgentContext<'_>,
    ) -> Result<WorkflowState, AgentError> {
        if state.plan.is_empty() {
            return Err(AgentError::MissingInput { field: "plan" });
        }
        if state.data_model.is_empty() {
            return Err(AgentError::MissingInput { field: "data_model" });
        }

        let components = Self::components_from_plan(&state.plan);
        let mut tasks: Vec<Task> = Vec::new();
        let mut code: BTreeMap<String, CodeArtifact> = BTreeMap::new();

        // RED: tests first, for every component.
        for (component, purpose) in &components {
            let task_id = format!("T{:03}", tasks.len() + 1);
            for (path, content) in self
                .emit_files(ctx, LlmOp::Tests, component, purpose, &state)
                .await?
            {
                ctx.artifacts.write_text(ctx.run_id, &path, &content)?;
                code.insert(
                    path,
                    CodeArtifact {
                        kind: CodeKind::Test,
                        content,
                    },
                );
            }
            tasks.push(Task {
                id: task_id,
                description: format!("write behavior tests for {component}"),
            });
        }

        if !Self::tests_are_structurally_valid(&code) {
            return Err(AgentError::Malformed {
                what: "generated tests failed structural validation".to_string(),
            });
        }
        info!(run_id = ctx.run_id, files = code.len(), "test files emitted");

        // GREEN: implementations paired with the tests.
        for (component, purpose) in &components {
            let task_id = format!("T{:03}", tasks.len() + 1);
            for (path, content) in self
                .emit_files(ctx, LlmOp::Implementation, component, purpose, &state)
                .await?
            {
                ctx.artifacts.write_text(ctx.run_id, &path, &content)?;
                code.insert(
                    path,
                    CodeArtifact {
                        kind: CodeKind::Implementation,
                        content,
                    },
                );
            }
            tasks.push(Task {
                id: task_id,
                description: format!("implement {component} against its tests"),
            });
        }
        info!(
            run_id = ctx.run_id,
            files = code.len(),
            tasks = tasks.len(),
            "implementation files emitted"
        );

        let completed: Vec<String> = tasks.iter().map(|t| t.id.clone()).collect();
        Ok(transition(&state, Phase::Implement, |s| {
            s.tasks = tasks;
            s.completed_tasks = completed;
            s.code_artifacts = code;
            s.validation_status = ValidationStatus::Pass;
        })?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::ArtifactStore;
    use crate::constitution::Constitution;
    use crate::interaction::ScriptedPort;
    use crate::llm::MockLlm;

    fn constitution() -> Constitution {
        Constitution::parse(
            "# C\n\n## Core Principles\n\n### I. Specs First\nBody.\n\n## Quality Standards\nBody.\n",
        )
        .unwrap()
    }

    fn planned_state(constitution: &Constitution) -> WorkflowState {
        let mut state = WorkflowState::for_run("Add a records view", constitution.text.clone());
        state.spec = "# Feature Specification\n".to_string();
        state.plan = "# Plan\n\n## Components\n\n- **core**: primary behaviors\n\
                      - **storage**: durable records\n"
            .to_string();
        state.data_model = "# Data Model\n".to_string();
        state.research = "# Research\n".to_string();
        state.phase = Phase::Plan;
        state
    }

    #[test]
    fn components_parse_from_plan_bullets() {
        let plan = "## Components\n\n- **core**: behaviors\n- **storage**: records\n";
        let components = ImplementationAgent::components_from_plan(plan);
        assert_eq!(
            components,
            vec![
                ("core".to_string(), "behaviors".to_string()),
                ("storage".to_string(), "records".to_string()),
            ]
        );
    }

    #[test]
    fn missing_components_fall_back_to_core() {
        let components = ImplementationAgent::components_from_plan("no bullets here");
        assert_eq!(components.len(), 1);
        assert_eq!(components[0].0, "core");
    }

    #[tokio::test]
    async fn red_then_green_produces_paired_artifacts() {
        let td = tempfile::TempDir::new().unwrap();
        let artifacts = ArtifactStore::new(
            camino::Utf8PathBuf::from_path_buf(td.path().join("specs")).unwrap(),
        );
        artifacts.create_run_dir("001-demo").unwrap();
        let constitution = constitution();
        let llm = MockLlm::new();
        let port = ScriptedPort::new();
        let ctx = AgentContext {
            run_id: "001-demo",
            llm: &llm,
            interaction: &port,
            artifacts: &artifacts,
            constitution: &constitution,
        };

        let next = ImplementationAgent::new()
            .run(planned_state(&constitution), &ctx)
            .await
            .unwrap();

        assert_eq!(next.phase, Phase::Implement);
        assert_eq!(next.validation_status, ValidationStatus::Pass);
        assert_eq!(next.tasks.len(), 4);
        assert_eq!(next.completed_tasks.len(), 4);

        let tests = next
            .code_artifacts
            .values()
            .filter(|a| a.kind == CodeKind::Test)
            .count();
        let impls = next
            .code_artifacts
            .values()
            .filter(|a| a.kind == CodeKind::Implementation)
            .count();
        assert_eq!(tests, 2);
        assert_eq!(impls, 2);

        assert!(artifacts.exists("001-demo", "tests/test_core.py"));
        assert!(artifacts.exists("001-demo", "src/core.py"));
    }

    #[tokio::test]
    async fn missing_plan_is_rejected() {
        let td = tempfile::TempDir::new().unwrap();
        let artifacts = ArtifactStore::new(
            camino::Utf8PathBuf::from_path_buf(td.path().join("specs")).unwrap(),
        );
        let constitution = constitution();
        let llm = MockLlm::new();
        let port = ScriptedPort::new();
        let ctx = AgentContext {
            run_id: "001-demo",
            llm: &llm,
            interaction: &port,
            artifacts: &artifacts,
            constitution: &constitution,
        };

        let state = WorkflowState::for_run("desc", constitution.text.clone());
        let err = ImplementationAgent::new().run(state, &ctx).await.unwrap_err();
        assert!(matches!(err, AgentError::MissingInput { field: "plan" }));
    }
}

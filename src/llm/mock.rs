//! Deterministic mock LLM binding
//!
//! Produces template artifacts per operation so the whole workflow can run
//! end-to-end with no provider configured. Tests drive the failure paths
//! through the leak / secret / transient-failure knobs.

use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, Ordering};

use super::{LlmClient, LlmError, LlmOp, LlmRequest, LlmResponse};
use crate::governance::implementation_keywords;

/// Whether the mock's generated specs name a concrete technology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LeakMode {
    /// Specs are always clean
    #[default]
    Never,
    /// The first generated spec leaks; regenerations are clean
    FirstAttempt,
    /// Every generated spec leaks (drives the retry-exhaustion path)
    Always,
}

/// Mock LLM with deterministic per-operation templates.
#[derive(Debug, Default)]
pub struct MockLlm {
    leak: LeakMode,
    embed_secret: bool,
    fail_remaining: AtomicU32,
    spec_calls: AtomicU32,
}

impl MockLlm {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Configure whether generated specs leak implementation details.
    #[must_use]
    pub fn with_leak(mut self, leak: LeakMode) -> Self {
        self.leak = leak;
        self
    }

    /// Embed a secret-shaped literal in generated implementation files.
    #[must_use]
    pub fn with_secret(mut self) -> Self {
        self.embed_secret = true;
        self
    }

    /// Fail the next `n` invocations with a transport error, then recover.
    #[must_use]
    pub fn with_transient_failures(self, n: u32) -> Self {
        self.fail_remaining.store(n, Ordering::SeqCst);
        self
    }

    /// Feature title for templates: the description with any
    /// technology-naming words dropped, so clean output stays clean.
    fn title_for(request: &LlmRequest) -> String {
        let description = request
            .context_line("Feature Description:")
            .unwrap_or_default();

        let title: String = description
            .split_whitespace()
            .filter(|word| {
                let bare: String = word
                    .chars()
                    .filter(char::is_ascii_alphanumeric)
                    .collect::<String>()
                    .to_ascii_lowercase();
                !implementation_keywords().contains(&bare.as_str())
            })
            .collect::<Vec<_>>()
            .join(" ");

        if title.is_empty() {
            "Feature".to_string()
        } else {
            title
        }
    }

    fn component_for(request: &LlmRequest) -> String {
        request
            .context_line("Component:")
            .unwrap_or_else(|| "core".to_string())
    }

    fn spec(&self, request: &LlmRequest) -> String {
        let title = Self::title_for(request);
        let attempt = self.spec_calls.fetch_add(1, Ordering::SeqCst);
        let leaking = match self.leak {
            LeakMode::Never => false,
            LeakMode::FirstAttempt => attempt == 0,
            LeakMode::Always => true,
        };

        let mut spec = format!(
            "# Feature Specification: {title}\n\n\
             ## User Scenarios\n\n\
             ### Primary Story\n\n\
             A user relies on {lower} to accomplish their goal end to end.\n\n\
             **Acceptance Scenarios**:\n\n\
             1. **Given** a prepared workspace, **When** the user performs the primary action, \
             **Then** the expected outcome is recorded\n\
             2. **Given** invalid input, **When** the user retries, **Then** the failure is \
             explained with a next step\n\n\
             ### Edge Cases\n\n\
             - Interrupted sessions can be resumed without losing progress\n\
             - Concurrent use of the same workspace is rejected cleanly\n\n\
             ## Requirements\n\n\
             - The system MUST implement the described capability completely\n\
             - The system MUST validate all inputs before acting on them\n\
             - The system MUST report failures with actionable messages\n\n\
             ## Success Criteria\n\n\
             - The primary action completes within one second\n\
             - Interrupted work is recoverable in every observed case\n",
            lower = title.to_lowercase(),
        );

        if leaking {
            spec.push_str("\nSession and account data are persisted in a PostgreSQL cluster.\n");
        }
        spec
    }

    fn research(request: &LlmRequest) -> String {
        let title = Self::title_for(request);
        format!(
            "# Research: {title}\n\n\
             ## Decisions\n\n\
             - Persistence approach: durable files with atomic replacement; chosen for \
             recoverability over a shared service\n\
             - Interface shape: a single well-described operation surface per capability\n\
             - Failure policy: bounded retry with explicit escalation\n\n\
             ## Alternatives Considered\n\n\
             - A shared coordination service; rejected as out of proportion for one workspace\n",
        )
    }

    fn plan(request: &LlmRequest) -> String {
        let title = Self::title_for(request);
        format!(
            "# Implementation Plan: {title}\n\n\
             ## Summary\n\n\
             Deliver {title} as a small library with a thin command wrapper, keeping the \
             behavior testable without its surroundings.\n\n\
             ## Technical Context\n\n\
             **Storage**: file-based with atomic replacement\n\
             **Testing**: behavior-level tests written before implementation\n\
             **Target Platform**: cross-platform\n\n\
             ## Project Structure\n\n\
             ```\n\
             src/\n\
             tests/\n\
             ```\n\n\
             ## Components\n\n\
             - **core**: primary feature behaviors and input validation\n\
             - **storage**: durable records with crash-safe writes\n",
        )
    }

    fn data_model(request: &LlmRequest) -> String {
        let title = Self::title_for(request);
        format!(
            "# Data Model: {title}\n\n\
             ## Core Entities\n\n\
             ### Record\n\n\
             - **id**: unique identifier, assigned once\n\
             - **status**: lifecycle state (active, archived)\n\
             - **created_at**: creation timestamp, immutable\n\n\
             ### Audit Entry\n\n\
             - **record_id**: the record acted upon\n\
             - **action**: what changed\n\
             - **occurred_at**: when it changed\n",
        )
    }

    fn contracts(request: &LlmRequest) -> String {
        let title = Self::title_for(request);
        format!(
            "FILE: api.yaml\n\
             openapi: 3.0.0\n\
             info:\n\
             \x20 title: {title} interface\n\
             \x20 version: 1.0.0\n\
             paths:\n\
             \x20 /records:\n\
             \x20   get:\n\
             \x20     summary: List records\n\
             \x20     responses:\n\
             \x20       '200':\n\
             \x20         description: Successful response\n\
             \x20   post:\n\
             \x20     summary: Create a record\n\
             \x20     responses:\n\
             \x20       '201':\n\
             \x20         description: Record created\n",
        )
    }

    fn quickstart(request: &LlmRequest) -> String {
        let title = Self::title_for(request);
        format!(
            "# Quickstart: {title}\n\n\
             1. Initialize the workspace\n\
             2. Run the primary action with a small input\n\
             3. Confirm the recorded outcome matches the acceptance scenarios\n",
        )
    }

    fn tests(request: &LlmRequest) -> String {
        let component = Self::component_for(request);
        let class = capitalize(&component);
        format!(
            "FILE: tests/test_{component}.py\n\
             \"\"\"Behavior tests for {component}, written before the implementation.\n\n\
             Each test names an acceptance scenario from the specification.\n\
             \"\"\"\n\n\n\
             class Test{class}:\n\
             \x20   def test_primary_action_records_outcome(self):\n\
             \x20       ...\n\n\
             \x20   def test_invalid_input_is_rejected_with_next_step(self):\n\
             \x20       ...\n\n\n\
             class Test{class}EdgeCases:\n\
             \x20   def test_interrupted_session_resumes(self):\n\
             \x20       ...\n",
        )
    }

    fn implementation(&self, request: &LlmRequest) -> String {
        let component = Self::component_for(request);
        let class = capitalize(&component);
        let mut file = format!(
            "FILE: src/{component}.py\n\
             \"\"\"{class} implementation satisfying the generated tests.\"\"\"\n\n\n\
             class {class}:\n\
             \x20   def perform(self, request):\n\
             \x20       self._validate(request)\n\
             \x20       return self._record_outcome(request)\n\n\
             \x20   def _validate(self, request):\n\
             \x20       if not request:\n\
             \x20           raise ValueError(\"request must not be empty\")\n\n\
             \x20   def _record_outcome(self, request):\n\
             \x20       return {{\"status\": \"recorded\", \"input\": request}}\n",
        );
        if self.embed_secret {
            file.push_str("\nAPI_KEY = \"sk-0123456789abcdefghij\"\n");
        }
        file
    }
}

#[async_trait]
impl LlmClient for MockLlm {
    async fn complete(&self, request: LlmRequest) -> Result<LlmResponse, LlmError> {
        let remaining = self.fail_remaining.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_remaining.store(remaining - 1, Ordering::SeqCst);
            return Err(LlmError::Transport("simulated provider outage".to_string()));
        }

        let text = match request.op {
            LlmOp::PreflightQuestions => "\
1. Who is the primary user of this capability?
2. Which existing records or systems does it need to touch?
3. Are there compliance constraints on the handled data?
"
            .to_string(),
            LlmOp::Spec => self.spec(&request),
            LlmOp::Research => Self::research(&request),
            LlmOp::Plan => Self::plan(&request),
            LlmOp::DataModel => Self::data_model(&request),
            LlmOp::Contracts => Self::contracts(&request),
            LlmOp::Quickstart => Self::quickstart(&request),
            LlmOp::Tests => Self::tests(&request),
            LlmOp::Implementation => self.implementation(&request),
        };

        Ok(LlmResponse::new(text, "mock", request.model))
    }

    fn provider(&self) -> &'static str {
        "mock"
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

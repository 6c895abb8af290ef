//! LLM client abstraction
//!
//! The engine never talks to a provider directly: phase agents build an
//! [`LlmRequest`] and hand it to an injected [`LlmClient`]. Two bindings
//! ship with the crate: a deterministic [`MockLlm`](mock::MockLlm) used by
//! tests and when no provider is configured, and a
//! [`CommandLlm`](command::CommandLlm) that pipes the rendered prompt to an
//! external command.

mod command;
mod mock;

pub use command::CommandLlm;
pub use mock::{LeakMode, MockLlm};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default model identifier passed to bindings that care.
pub const DEFAULT_MODEL: &str = "default";

/// Role of a message in a conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A single message in a conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    #[must_use]
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }
}

/// The operation an agent is asking the model to perform. Carried as
/// request metadata so bindings can log it and the mock can dispatch on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LlmOp {
    PreflightQuestions,
    Spec,
    Research,
    Plan,
    DataModel,
    Contracts,
    Quickstart,
    Tests,
    Implementation,
}

impl LlmOp {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::PreflightQuestions => "preflight-questions",
            Self::Spec => "spec",
            Self::Research => "research",
            Self::Plan => "plan",
            Self::DataModel => "data-model",
            Self::Contracts => "contracts",
            Self::Quickstart => "quickstart",
            Self::Tests => "tests",
            Self::Implementation => "implementation",
        }
    }
}

impl std::fmt::Display for LlmOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Input to an LLM invocation.
#[derive(Debug, Clone)]
pub struct LlmRequest {
    /// Run id, for context and logging
    pub run_id: String,
    /// What the agent is asking for
    pub op: LlmOp,
    /// Model to use for this invocation
    pub model: String,
    /// Ordered conversation
    pub messages: Vec<Message>,
}

impl LlmRequest {
    #[must_use]
    pub fn new(run_id: impl Into<String>, op: LlmOp, messages: Vec<Message>) -> Self {
        Self {
            run_id: run_id.into(),
            op,
            model: DEFAULT_MODEL.to_string(),
            messages,
        }
    }

    /// Render the conversation into a single prompt string for bindings
    /// that take plain text.
    #[must_use]
    pub fn render_prompt(&self) -> String {
        let mut out = String::new();
        for message in &self.messages {
            let role = match message.role {
                Role::System => "system",
                Role::User => "user",
                Role::Assistant => "assistant",
            };
            out.push_str(&format!("[{role}]\n{}\n\n", message.content));
        }
        out
    }

    /// First line following a `marker` line in any user message. The mock
    /// binding uses this to echo request context into its templates.
    #[must_use]
    pub fn context_line(&self, marker: &str) -> Option<String> {
        for message in &self.messages {
            let mut lines = message.content.lines();
            while let Some(line) = lines.next() {
                if line.trim() == marker {
                    if let Some(value) = lines.next() {
                        return Some(value.trim().to_string());
                    }
                }
            }
        }
        None
    }
}

/// Result of an LLM invocation.
#[derive(Debug, Clone)]
pub struct LlmResponse {
    /// Raw response text
    pub text: String,
    /// Provider name (e.g. "mock", "command")
    pub provider: String,
    /// Model that was actually used
    pub model_used: String,
}

impl LlmResponse {
    #[must_use]
    pub fn new(
        text: impl Into<String>,
        provider: impl Into<String>,
        model_used: impl Into<String>,
    ) -> Self {
        Self {
            text: text.into(),
            provider: provider.into(),
            model_used: model_used.into(),
        }
    }
}

/// Errors surfaced by LLM bindings. All of these route through the engine's
/// transient-failure path: the error counter increments and the node
/// retries up to the budget.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("LLM transport failure: {0}")]
    Transport(String),

    #[error("LLM invocation timed out after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("LLM returned an empty response")]
    EmptyResponse,

    #[error("LLM command exited with status {code}: {stderr}")]
    CommandFailed { code: i32, stderr: String },

    #[error("failed to spawn LLM command '{program}': {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },
}

/// Trait every LLM binding implements.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Invoke the model with the given request.
    async fn complete(&self, request: LlmRequest) -> Result<LlmResponse, LlmError>;

    /// Short provider name for logging and status output.
    fn provider(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_prompt_labels_roles() {
        let req = LlmRequest::new(
            "001-demo",
            LlmOp::Spec,
            vec![Message::system("be terse"), Message::user("write the spec")],
        );
        let prompt = req.render_prompt();
        assert!(prompt.contains("[system]\nbe terse"));
        assert!(prompt.contains("[user]\nwrite the spec"));
    }

    #[test]
    fn context_line_reads_the_line_after_marker() {
        let req = LlmRequest::new(
            "001-demo",
            LlmOp::Spec,
            vec![Message::user("Feature Description:\nAdd search\n\nMore text")],
        );
        assert_eq!(req.context_line("Feature Description:").as_deref(), Some("Add search"));
        assert_eq!(req.context_line("Absent:"), None);
    }
}

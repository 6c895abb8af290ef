//! Phase agent abstraction
//!
//! A phase agent is a function from the current state and a set of
//! collaborators to a new state. Agents never mutate shared globals: they
//! receive an owned state, call the LLM client as often as they need, write
//! artifacts through the store, ask questions through the interaction port,
//! and return the updated state or a typed error.

use async_trait::async_trait;
use thiserror::Error;

use crate::artifact::ArtifactStore;
use crate::constitution::Constitution;
use crate::interaction::{InteractionError, InteractionPort};
use crate::llm::{LlmClient, LlmError};
use crate::state::{StateError, WorkflowState};

/// Collaborators handed to every agent invocation.
pub struct AgentContext<'a> {
    pub run_id: &'a str,
    pub llm: &'a dyn LlmClient,
    pub interaction: &'a dyn InteractionPort,
    /// Store scoped to the whole `specs/` tree; agents address their run by
    /// id
    pub artifacts: &'a ArtifactStore,
    pub constitution: &'a Constitution,
}

/// Errors returned by agents across the engine boundary. The engine owns
/// the retry counter; agents only describe what went wrong.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("agent requires '{field}' to be present in the state")]
    MissingInput { field: &'static str },

    #[error("{count} unknown(s) remain unresolved after research")]
    UnresolvedUnknowns { count: usize },

    #[error("could not parse agent output: {what}")]
    Malformed { what: String },

    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Interaction(#[from] InteractionError),

    #[error(transparent)]
    Artifact(#[from] anyhow::Error),
}

impl AgentError {
    /// Transient errors are retried by the engine; the rest surface as
    /// user-input or engine errors.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Llm(_) | Self::State(_) | Self::Malformed { .. })
    }
}

/// One phase of the workflow, expressed as a pure state transformer.
#[async_trait]
pub trait PhaseAgent: Send + Sync {
    /// Name used in error reports and `last_error.node`.
    fn name(&self) -> &'static str;

    /// Run the agent against an owned state snapshot.
    async fn run(
        &self,
        state: WorkflowState,
        ctx: &AgentContext<'_>,
    ) -> Result<WorkflowState, AgentError>;
}

/// Parse `FILE: <path>` blocks out of an LLM response. Each marker starts a
/// new file; everything until the next marker is its content.
#[must_use]
pub fn parse_file_blocks(text: &str) -> Vec<(String, String)> {
    let mut blocks: Vec<(String, String)> = Vec::new();

    for line in text.lines() {
        if let Some(path) = line.trim().strip_prefix("FILE:") {
            blocks.push((path.trim().to_string(), String::new()));
        } else if let Some((_, content)) = blocks.last_mut() {
            content.push_str(line);
            content.push('\n');
        }
    }

    blocks
        .into_iter()
        .filter(|(path, _)| !path.is_empty())
        .map(|(path, content)| (path, content.trim_start_matches('\n').to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_blocks_split_on_markers() {
        let text = "FILE: a.yaml\nkey: 1\n\nFILE: b.yaml\nkey: 2\n";
        let blocks = parse_file_blocks(text);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].0, "a.yaml");
        assert!(blocks[0].1.contains("key: 1"));
        assert_eq!(blocks[1].0, "b.yaml");
    }

    #[test]
    fn preamble_before_first_marker_is_dropped() {
        let text = "Some chatter.\nFILE: only.txt\nbody\n";
        let blocks = parse_file_blocks(text);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].0, "only.txt");
        assert_eq!(blocks[0].1, "body\n");
    }

    #[test]
    fn no_markers_means_no_blocks() {
        assert!(parse_file_blocks("plain text\n").is_empty());
    }
}

//! Process-backed LLM binding
//!
//! Pipes the rendered prompt to an external command's stdin and reads the
//! response from stdout, one process per invocation. The command is
//! whatever the operator configured (a provider CLI, a wrapper script); the
//! engine only sees prompt-in, text-out.

use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use super::{LlmClient, LlmError, LlmRequest, LlmResponse};

/// Default per-invocation timeout.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// LLM binding backed by an external command.
#[derive(Debug, Clone)]
pub struct CommandLlm {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandLlm {
    /// Binding for a command line like `"my-llm --flag"`. The first word is
    /// the program; the rest are arguments.
    #[must_use]
    pub fn from_command_line(command_line: &str) -> Self {
        let mut parts = command_line.split_whitespace().map(str::to_string);
        let program = parts.next().unwrap_or_default();
        Self {
            program,
            args: parts.collect(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl LlmClient for CommandLlm {
    async fn complete(&self, request: LlmRequest) -> Result<LlmResponse, LlmError> {
        let prompt = request.render_prompt();
        debug!(
            run_id = %request.run_id,
            op = %request.op,
            program = %self.program,
            "invoking LLM command"
        );

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| LlmError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(prompt.as_bytes())
                .await
                .map_err(|e| LlmError::Transport(format!("failed to write prompt: {e}")))?;
            // Close stdin so the child sees EOF.
            drop(stdin);
        }

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| LlmError::Timeout {
                seconds: self.timeout.as_secs(),
            })?
            .map_err(|e| LlmError::Transport(format!("failed to collect output: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(LlmError::CommandFailed {
                code: output.status.code().unwrap_or(-1),
                stderr: stderr.trim().chars().take(500).collect(),
            });
        }

        let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if text.is_empty() {
            return Err(LlmError::EmptyResponse);
        }

        Ok(LlmResponse::new(text, "command", request.model))
    }

    fn provider(&self) -> &'static str {
        "command"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{LlmOp, Message};

    fn request() -> LlmRequest {
        LlmRequest::new("001-demo", LlmOp::Spec, vec![Message::user("hello")])
    }

    #[tokio::test]
    async fn cat_echoes_the_prompt_back() {
        let llm = CommandLlm::from_command_line("cat");
        let response = llm.complete(request()).await.unwrap();
        assert!(response.text.contains("hello"));
        assert_eq!(response.provider, "command");
    }

    #[tokio::test]
    async fn missing_program_is_a_spawn_error() {
        let llm = CommandLlm::from_command_line("acpctl-test-no-such-program");
        let err = llm.complete(request()).await.unwrap_err();
        assert!(matches!(err, LlmError::Spawn { .. }));
    }

    #[tokio::test]
    async fn nonzero_exit_surfaces_stderr() {
        let llm = CommandLlm::from_command_line("false");
        let err = llm.complete(request()).await.unwrap_err();
        assert!(matches!(
            err,
            LlmError::CommandFailed { .. } | LlmError::EmptyResponse
        ));
    }
}

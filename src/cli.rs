//! Command-line interface for acpctl
//!
//! Thin layer over the engine: parse arguments, pick the LLM binding and
//! interaction port, create the runtime, dispatch. Every failure is mapped
//! to the documented exit codes by the caller.

use clap::{Parser, Subcommand};
use std::sync::atomic::Ordering;
use std::sync::Arc;

use crate::engine::{next_pending_phase, RunSummary, WorkflowEngine};
use crate::error::AcpError;
use crate::interaction::{ConsolePort, InteractionPort, ScriptedPort};
use crate::llm::{CommandLlm, LlmClient, MockLlm};
use crate::paths::AcpPaths;
use crate::types::{Phase, RunStatus};
use crate::{logging, workspace};

/// Environment variable naming an external LLM command. When unset, the
/// mock binding runs; the engine itself reads no environment.
pub const LLM_COMMAND_ENV: &str = "ACPCTL_LLM_COMMAND";

/// acpctl - governed, spec-driven development workflow engine
#[derive(Parser)]
#[command(name = "acpctl")]
#[command(about = "Drive a feature from description to implementation through governed phases")]
#[command(long_about = r#"
acpctl drives a natural-language feature description through specification,
planning, and implementation. Every phase is validated against the
project-local constitution, and state is checkpointed after each phase so
any run can be interrupted and resumed.

EXAMPLES:
  # Create the workspace and a starter constitution
  acpctl init

  # Start a run through the specification phase
  acpctl specify "Add OAuth2 authentication with Google and GitHub providers"

  # Continue the latest paused run phase by phase
  acpctl plan
  acpctl implement

  # Or just resume whatever is next
  acpctl resume

  # Inspect runs
  acpctl status
  acpctl history

PHASES:
  specify -> plan -> implement
  Each phase ends at a governance gate; failures offer regenerate /
  edit-constitution / abort (/ ignore with --force).
"#)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Only errors on stderr
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Debug-level logging
    #[arg(long, global = true)]
    pub verbose: bool,

    /// Use the deterministic mock LLM binding regardless of configuration
    #[arg(long, global = true, hide = true)]
    pub mock: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create the .acp/ tree and a starter constitution (idempotent)
    Init,

    /// Start a new run through the specification phase
    Specify {
        /// Natural-language feature description
        description: String,

        /// Make the 'ignore' remediation available, bypassing governance
        /// violations
        #[arg(long)]
        force: bool,

        /// Skip automatic git branch creation
        #[arg(long)]
        no_branch: bool,
    },

    /// Run the planning phase for a run (default: the latest)
    Plan {
        /// Run id, e.g. 001-add-search
        run_id: Option<String>,
    },

    /// Run the implementation phase for a run (default: the latest)
    Implement {
        /// Run id, e.g. 001-add-search
        run_id: Option<String>,
    },

    /// Resume the latest paused run (or the named one) at its next phase
    Resume {
        /// Run id, e.g. 001-add-search
        run_id: Option<String>,
    },

    /// Show a run's phase, completed phases, timestamps, and next action
    Status {
        /// Run id, e.g. 001-add-search
        run_id: Option<String>,
    },

    /// List all runs, most recently updated first
    History,
}

/// Parse arguments and run the selected command.
pub fn run() -> Result<(), AcpError> {
    let cli = Cli::parse();
    logging::init_tracing(cli.verbose, cli.quiet);

    let paths = AcpPaths::discover();

    match cli.command {
        Commands::Init => run_init(&paths, cli.quiet),
        Commands::Status { run_id } => run_status(&paths, run_id.as_deref()),
        Commands::History => run_history(&paths),
        // The workflow commands need the async engine.
        command => {
            let runtime = tokio::runtime::Runtime::new()
                .map_err(|e| AcpError::Internal(anyhow::anyhow!("failed to start runtime: {e}")))?;
            runtime.block_on(run_workflow_command(&paths, command, cli.mock, cli.quiet))
        }
    }
}

fn run_init(paths: &AcpPaths, quiet: bool) -> Result<(), AcpError> {
    let outcome = workspace::init(paths).map_err(AcpError::Internal)?;
    if !quiet {
        if outcome.wrote_constitution {
            println!("Initialized workspace; edit .acp/templates/constitution.md to taste");
        } else {
            println!("Workspace already initialized; nothing changed");
        }
    }
    Ok(())
}

async fn run_workflow_command(
    paths: &AcpPaths,
    command: Commands,
    mock: bool,
    quiet: bool,
) -> Result<(), AcpError> {
    let llm = make_llm(mock);
    let interaction = make_port();

    let force = matches!(&command, Commands::Specify { force: true, .. });
    let engine = WorkflowEngine::new(paths.clone(), llm, interaction).with_force(force);

    // Graceful stop: first Ctrl-C finishes the current node and pauses.
    let cancel = engine.cancel_flag();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.store(true, Ordering::SeqCst);
        }
    });

    let summary = match command {
        Commands::Specify {
            description,
            no_branch,
            ..
        } => engine.start(&description, no_branch).await?,
        Commands::Plan { run_id } => engine.run_phase(run_id.as_deref(), Phase::Plan).await?,
        Commands::Implement { run_id } => {
            engine.run_phase(run_id.as_deref(), Phase::Implement).await?
        }
        Commands::Resume { run_id } => engine.resume(run_id.as_deref()).await?,
        Commands::Init | Commands::Status { .. } | Commands::History => unreachable!(),
    };

    if !quiet {
        print_summary(&summary);
    }
    Ok(())
}

fn make_llm(mock: bool) -> Arc<dyn LlmClient> {
    if mock {
        return Arc::new(MockLlm::new());
    }
    match std::env::var(LLM_COMMAND_ENV) {
        Ok(command_line) if !command_line.trim().is_empty() => {
            Arc::new(CommandLlm::from_command_line(&command_line))
        }
        _ => Arc::new(MockLlm::new()),
    }
}

fn make_port() -> Arc<dyn InteractionPort> {
    if ConsolePort::is_interactive() {
        Arc::new(ConsolePort::new())
    } else {
        // Non-interactive: no answers configured, remediation aborts.
        Arc::new(ScriptedPort::new())
    }
}

fn print_summary(summary: &RunSummary) {
    let phases: Vec<&str> = summary
        .phases_completed
        .iter()
        .map(Phase::as_str)
        .collect();
    println!(
        "{}: {} (completed: [{}])",
        summary.run_id,
        summary.status,
        phases.join(", ")
    );
    if summary.status == RunStatus::Paused {
        println!("next: acpctl resume {}", summary.run_id);
    }
}

fn run_status(paths: &AcpPaths, run_id: Option<&str>) -> Result<(), AcpError> {
    let engine_store = crate::checkpoint::CheckpointStore::new(paths.state_dir());
    let run_id = match run_id {
        Some(id) => id.to_string(),
        None => engine_store.latest()?.ok_or_else(|| {
            AcpError::user(
                "no runs found in this workspace",
                Some("Start one with `acpctl specify \"<description>\"`".to_string()),
            )
        })?,
    };

    let loaded = engine_store.load(&run_id)?;
    let metadata = &loaded.metadata;

    println!("run:        {}", metadata.run_id);
    println!("status:     {}", metadata.status);
    println!("phase:      {}", metadata.phase);
    let phases: Vec<&str> = metadata.phases_completed.iter().map(Phase::as_str).collect();
    println!("completed:  [{}]", phases.join(", "));
    println!("created:    {}", metadata.created_at.to_rfc3339());
    println!("updated:    {}", metadata.updated_at.to_rfc3339());
    println!("artifacts:  {}", metadata.spec_path);

    if let Some(last_error) = &loaded.state.last_error {
        println!(
            "last error: {} in {}: {}",
            last_error.node, last_error.phase, last_error.message
        );
    }

    let next_action = match metadata.status {
        RunStatus::Completed => "run complete".to_string(),
        RunStatus::Failed => format!("inspect artifacts, then re-run `acpctl resume {run_id}`"),
        _ => match next_pending_phase(metadata) {
            Some(phase) => format!("acpctl {phase} {run_id}"),
            None => "run complete".to_string(),
        },
    };
    println!("next:       {next_action}");
    Ok(())
}

fn run_history(paths: &AcpPaths) -> Result<(), AcpError> {
    let store = crate::checkpoint::CheckpointStore::new(paths.state_dir());
    let runs = store.list()?;

    if runs.is_empty() {
        println!("no runs yet");
        return Ok(());
    }

    for metadata in runs {
        let phases: Vec<&str> = metadata.phases_completed.iter().map(Phase::as_str).collect();
        println!(
            "{}  {:<11}  phase={:<9}  completed=[{}]  updated={}",
            metadata.run_id,
            metadata.status.as_str(),
            metadata.phase.as_str(),
            phases.join(", "),
            metadata.updated_at.to_rfc3339()
        );
    }
    Ok(())
}

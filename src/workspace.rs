//! Workspace initialization and git integration
//!
//! `init` creates the `.acp/` tree, writes a starter constitution, and
//! appends `.acp/` to `.gitignore`. Running it twice leaves the tree and
//! `.gitignore` exactly as running it once: existing files are never
//! overwritten.

use anyhow::{Context, Result};
use camino::Utf8Path;
use std::process::Command;
use tracing::debug;

use crate::atomic_write::write_file_atomic;
use crate::paths::{ensure_dir_all, AcpPaths};

/// Starter constitution written by `init`. Carries the section skeleton the
/// loader validates; teams edit the principles in place.
pub const STARTER_CONSTITUTION: &str = "\
# Project Constitution

Principles in this document govern every artifact the workflow produces.
Edit them to match your team's standards; the engine re-reads this file
whenever you choose \"edit constitution\" during remediation.

## Core Principles

### I. Specifications as First-Class Artifacts

Specifications describe WHAT and WHY, never HOW. They name no languages,
frameworks, databases, or cloud services.

### II. Constitutional Governance

Every generated artifact passes the governance gate before the workflow
advances. Violations are remediated, not silenced.

### III. Checkpoint Everything

Workflow state survives interruption. Any run can be resumed from its last
completed phase.

### IV. Test-First

Behavior tests are written before the implementation they verify.

## Quality Standards

- Artifacts are complete: every required section is present.
- No hardcoded credentials anywhere, including generated samples.
- Failures carry an actionable next step.
";

/// Result of an `init` call, for reporting what actually changed.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct InitOutcome {
    pub created_tree: bool,
    pub wrote_constitution: bool,
    pub updated_gitignore: bool,
}

/// Create the workspace tree. Idempotent: a second call is a no-op.
pub fn init(paths: &AcpPaths) -> Result<InitOutcome> {
    let mut outcome = InitOutcome::default();

    let templates = paths.templates_dir();
    let state = paths.state_dir();
    let specs = paths.specs_dir();

    outcome.created_tree = !paths.acp_dir().is_dir();
    ensure_dir_all(&templates).with_context(|| format!("Failed to create {templates}"))?;
    ensure_dir_all(&state).with_context(|| format!("Failed to create {state}"))?;
    ensure_dir_all(&specs).with_context(|| format!("Failed to create {specs}"))?;

    let constitution = paths.constitution_path();
    if !constitution.is_file() {
        write_file_atomic(&constitution, STARTER_CONSTITUTION)?;
        outcome.wrote_constitution = true;
    }

    outcome.updated_gitignore = append_gitignore_entry(paths, ".acp/")?;
    Ok(outcome)
}

/// Append an entry to `.gitignore` unless an equivalent line exists.
/// Returns true if the file changed.
fn append_gitignore_entry(paths: &AcpPaths, entry: &str) -> Result<bool> {
    let path = paths.gitignore_path();
    let existing = match std::fs::read_to_string(&path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(e).with_context(|| format!("Failed to read {path}")),
    };

    let already_listed = existing
        .lines()
        .any(|line| line.trim() == entry || line.trim() == entry.trim_end_matches('/'));
    if already_listed {
        return Ok(false);
    }

    let mut updated = existing;
    if !updated.is_empty() && !updated.ends_with('\n') {
        updated.push('\n');
    }
    updated.push_str(entry);
    updated.push('\n');
    write_file_atomic(&path, &updated)?;
    Ok(true)
}

/// True when `root` sits inside a git work tree.
#[must_use]
pub fn is_git_repository(root: &Utf8Path) -> bool {
    Command::new("git")
        .args(["rev-parse", "--git-dir"])
        .current_dir(root)
        .output()
        .map(|output| output.status.success())
        .unwrap_or(false)
}

/// Create and switch to a branch named after the run id.
pub fn create_git_branch(root: &Utf8Path, branch: &str) -> Result<()> {
    let output = Command::new("git")
        .args(["checkout", "-b", branch])
        .current_dir(root)
        .output()
        .context("Failed to invoke git")?;

    if !output.status.success() {
        anyhow::bail!(
            "git checkout -b {branch} failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    debug!(branch, "created git branch");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;

    fn workspace() -> (tempfile::TempDir, AcpPaths) {
        let td = tempfile::TempDir::new().unwrap();
        let root = Utf8PathBuf::from_path_buf(td.path().to_path_buf()).unwrap();
        (td, AcpPaths::new(root))
    }

    #[test]
    fn init_creates_tree_constitution_and_gitignore() {
        let (_td, paths) = workspace();
        let outcome = init(&paths).unwrap();

        assert!(outcome.wrote_constitution);
        assert!(outcome.updated_gitignore);
        assert!(paths.constitution_path().is_file());
        assert!(paths.state_dir().is_dir());
        assert!(paths.specs_dir().is_dir());

        let gitignore = std::fs::read_to_string(paths.gitignore_path()).unwrap();
        assert!(gitignore.lines().any(|l| l.trim() == ".acp/"));
    }

    #[test]
    fn init_is_idempotent() {
        let (_td, paths) = workspace();
        init(&paths).unwrap();

        let constitution_before = std::fs::read_to_string(paths.constitution_path()).unwrap();
        let gitignore_before = std::fs::read_to_string(paths.gitignore_path()).unwrap();

        let second = init(&paths).unwrap();
        assert_eq!(second, InitOutcome::default());
        assert_eq!(
            std::fs::read_to_string(paths.constitution_path()).unwrap(),
            constitution_before
        );
        assert_eq!(
            std::fs::read_to_string(paths.gitignore_path()).unwrap(),
            gitignore_before
        );
    }

    #[test]
    fn init_preserves_an_edited_constitution() {
        let (_td, paths) = workspace();
        init(&paths).unwrap();

        let edited = "# Project Constitution\n\n## Core Principles\n\n### Mine\nBody.\n\n\
                      ## Quality Standards\nBody.\n";
        std::fs::write(paths.constitution_path(), edited).unwrap();

        init(&paths).unwrap();
        assert_eq!(
            std::fs::read_to_string(paths.constitution_path()).unwrap(),
            edited
        );
    }

    #[test]
    fn gitignore_entry_is_appended_not_duplicated() {
        let (_td, paths) = workspace();
        std::fs::write(paths.gitignore_path(), "target/\n").unwrap();

        init(&paths).unwrap();
        init(&paths).unwrap();

        let gitignore = std::fs::read_to_string(paths.gitignore_path()).unwrap();
        assert_eq!(gitignore.matches(".acp/").count(), 1);
        assert!(gitignore.starts_with("target/\n"));
    }

    #[test]
    fn starter_constitution_parses() {
        crate::constitution::Constitution::parse(STARTER_CONSTITUTION).unwrap();
    }
}

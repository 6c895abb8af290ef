//! CLI surface tests
//!
//! Exercises the binary: init idempotence, history/status output, exit
//! codes for user-level and engine-level failures.

use assert_cmd::Command;
use predicates::prelude::*;

use acpctl::checkpoint::{CheckpointStore, RunMetadata};
use acpctl::paths::AcpPaths;
use acpctl::state::WorkflowState;
use acpctl::types::{Phase, RunStatus};

fn workspace() -> (tempfile::TempDir, AcpPaths) {
    let td = tempfile::TempDir::new().unwrap();
    let root = camino::Utf8PathBuf::from_path_buf(td.path().to_path_buf()).unwrap();
    (td, AcpPaths::new(root))
}

fn acpctl(root: &AcpPaths) -> Command {
    let mut cmd = Command::cargo_bin("acpctl").unwrap();
    cmd.current_dir(root.root());
    cmd.env_remove("ACPCTL_LLM_COMMAND");
    cmd.env_remove("RUST_LOG");
    cmd
}

/// Seed a paused run directly through the store.
fn seed_run(paths: &AcpPaths, run_id: &str) {
    let store = CheckpointStore::new(paths.state_dir());
    let mut state = WorkflowState::for_run("Seeded feature", "# Constitution");
    state.spec = "# Feature Specification\n".to_string();
    state.phase = Phase::Specify;

    let mut metadata = RunMetadata::new(run_id, "seeded-feature", &format!("specs/{run_id}"));
    metadata.status = RunStatus::Paused;
    metadata.phases_completed.push(Phase::Specify);
    store.save(metadata, &state).unwrap();
}

#[test]
fn version_flag_succeeds() {
    let (_td, paths) = workspace();
    acpctl(&paths)
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("acpctl"));
}

#[test]
fn init_is_idempotent_at_the_cli() {
    let (_td, paths) = workspace();

    acpctl(&paths).arg("init").assert().success();
    let constitution = std::fs::read_to_string(paths.constitution_path()).unwrap();
    let gitignore = std::fs::read_to_string(paths.gitignore_path()).unwrap();

    acpctl(&paths)
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("nothing changed"));

    assert_eq!(
        std::fs::read_to_string(paths.constitution_path()).unwrap(),
        constitution
    );
    assert_eq!(
        std::fs::read_to_string(paths.gitignore_path()).unwrap(),
        gitignore
    );
}

#[test]
fn history_with_no_runs_succeeds() {
    let (_td, paths) = workspace();
    acpctl(&paths)
        .arg("history")
        .assert()
        .success()
        .stdout(predicate::str::contains("no runs yet"));
}

#[test]
fn status_with_no_runs_is_a_user_error() {
    let (_td, paths) = workspace();
    acpctl(&paths)
        .arg("status")
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("no runs found"));
}

#[test]
fn status_shows_phase_and_next_action() {
    let (_td, paths) = workspace();
    acpctl(&paths).arg("init").assert().success();
    seed_run(&paths, "001-seeded-feature");

    acpctl(&paths)
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("001-seeded-feature"))
        .stdout(predicate::str::contains("paused"))
        .stdout(predicate::str::contains("completed:  [specify]"))
        .stdout(predicate::str::contains("acpctl plan 001-seeded-feature"));
}

#[test]
fn history_lists_runs_most_recent_first() {
    let (_td, paths) = workspace();
    acpctl(&paths).arg("init").assert().success();
    seed_run(&paths, "001-first");
    std::thread::sleep(std::time::Duration::from_millis(5));
    seed_run(&paths, "002-second");

    let assert = acpctl(&paths).arg("history").assert().success();
    let stdout = String::from_utf8(assert.get_output().stdout.clone()).unwrap();
    let first_pos = stdout.find("002-second").expect("second run listed");
    let second_pos = stdout.find("001-first").expect("first run listed");
    assert!(first_pos < second_pos, "expected most-recent-first ordering");
}

#[test]
fn corrupted_checkpoint_is_skipped_by_history_but_fatal_for_status() {
    let (_td, paths) = workspace();
    acpctl(&paths).arg("init").assert().success();
    seed_run(&paths, "001-healthy");
    seed_run(&paths, "002-broken");

    let broken = paths.state_dir().join("002-broken.json");
    std::fs::write(&broken, "{ not json").unwrap();

    acpctl(&paths)
        .arg("history")
        .assert()
        .success()
        .stdout(predicate::str::contains("001-healthy"))
        .stdout(predicate::str::contains("002-broken").not());

    acpctl(&paths)
        .args(["status", "002-broken"])
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("corrupted checkpoint"));
}

#[test]
fn specify_without_init_hints_at_init() {
    let (_td, paths) = workspace();
    acpctl(&paths)
        .args(["specify", "Add search", "--no-branch", "--mock"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("acpctl init"));
}

#[test]
fn invalid_run_id_is_a_user_error() {
    let (_td, paths) = workspace();
    acpctl(&paths).arg("init").assert().success();

    acpctl(&paths)
        .args(["plan", "Not-A-Run-Id"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("not a valid run id"));
}

#[test]
fn plan_for_missing_run_is_a_user_error() {
    let (_td, paths) = workspace();
    acpctl(&paths).arg("init").assert().success();

    acpctl(&paths)
        .args(["plan", "007-ghost"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("no checkpoint"));
}

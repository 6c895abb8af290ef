//! Checkpoint store laws
//!
//! Round-trip equality, timestamp behavior across rewrites, one file per
//! run, and the stable on-disk JSON shape consumers depend on.

use std::collections::BTreeMap;

use acpctl::checkpoint::{CheckpointStore, RunMetadata};
use acpctl::state::WorkflowState;
use acpctl::types::{Clarification, CodeArtifact, CodeKind, Phase, RunStatus, Task};

fn store() -> (tempfile::TempDir, CheckpointStore) {
    let td = tempfile::TempDir::new().unwrap();
    let dir = camino::Utf8PathBuf::from_path_buf(td.path().join("state")).unwrap();
    (td, CheckpointStore::new(dir))
}

/// A state exercising every field group.
fn rich_state() -> WorkflowState {
    let mut state = WorkflowState::for_run(
        "Add OAuth2 authentication",
        "# Constitution\n\n## Core Principles\n",
    );
    state.spec = "# Feature Specification\n".to_string();
    state.clarifications = vec![
        Clarification {
            question: "Which providers?".to_string(),
            answer: "Google and GitHub".to_string(),
        },
        Clarification {
            question: "Session lifetime?".to_string(),
            answer: "24 hours".to_string(),
        },
    ];
    state.research = "# Research\n".to_string();
    state.plan = "# Plan\n".to_string();
    state.data_model = "# Data Model\n".to_string();
    state.quickstart = "# Quickstart\n".to_string();
    state.contracts = BTreeMap::from([
        ("api.yaml".to_string(), "openapi: 3.0.0\n".to_string()),
        ("auth.yaml".to_string(), "openapi: 3.0.0\n".to_string()),
    ]);
    state.tasks = vec![
        Task {
            id: "T001".to_string(),
            description: "write tests".to_string(),
        },
        Task {
            id: "T002".to_string(),
            description: "implement".to_string(),
        },
    ];
    state.completed_tasks = vec!["T001".to_string()];
    state.code_artifacts = BTreeMap::from([
        (
            "tests/test_core.py".to_string(),
            CodeArtifact {
                kind: CodeKind::Test,
                content: "def test_core(): ...\n".to_string(),
            },
        ),
        (
            "src/core.py".to_string(),
            CodeArtifact {
                kind: CodeKind::Implementation,
                content: "class Core: ...\n".to_string(),
            },
        ),
    ]);
    state.phase = Phase::Plan;
    state
}

#[test]
fn save_load_round_trip_is_structurally_equal() {
    let (_td, store) = store();
    let state = rich_state();
    let metadata = RunMetadata::new("001-oauth", "oauth", "specs/001-oauth");

    store.save(metadata, &state).unwrap();
    let loaded = store.load("001-oauth").unwrap();

    assert_eq!(loaded.state, state);
    assert!(!loaded.migrated);
}

#[test]
fn exactly_one_file_per_run_across_rewrites() {
    let (_td, store) = store();
    let state = rich_state();
    let mut metadata = RunMetadata::new("001-oauth", "oauth", "specs/001-oauth");

    for phase in [Phase::Specify, Phase::Plan] {
        metadata.phases_completed.push(phase);
        metadata.status = RunStatus::Paused;
        metadata = store.save(metadata, &state).unwrap();
    }

    let files: Vec<_> = std::fs::read_dir(store.state_dir())
        .unwrap()
        .map(|e| e.unwrap().file_name())
        .collect();
    assert_eq!(files, vec![std::ffi::OsString::from("001-oauth.json")]);
}

#[test]
fn updated_at_is_monotonic_and_created_at_is_pinned() {
    let (_td, store) = store();
    let state = rich_state();
    let metadata = RunMetadata::new("001-oauth", "oauth", "specs/001-oauth");

    let mut previous = store.save(metadata, &state).unwrap();
    let created = previous.created_at;

    for _ in 0..3 {
        std::thread::sleep(std::time::Duration::from_millis(3));
        let next = store.save(previous.clone(), &state).unwrap();
        assert!(next.updated_at >= previous.updated_at);
        assert_eq!(next.created_at, created);
        previous = next;
    }
}

#[test]
fn checkpoint_json_has_the_stable_top_level_shape() {
    let (_td, store) = store();
    let state = rich_state();
    let metadata = RunMetadata::new("001-oauth", "oauth", "specs/001-oauth");
    store.save(metadata, &state).unwrap();

    let path = store.state_dir().join("001-oauth.json");
    let raw: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();

    assert_eq!(raw["schema_version"], acpctl::SCHEMA_VERSION);
    for key in [
        "run_id",
        "name",
        "thread_id",
        "status",
        "phase",
        "phases_completed",
        "created_at",
        "updated_at",
        "spec_path",
    ] {
        assert!(raw["metadata"].get(key).is_some(), "metadata missing {key}");
    }
    assert!(raw["state"].get("clarifications").is_some());
    assert!(raw["state"].get("error_count").is_some());
}

#[test]
fn unknown_top_level_keys_are_ignored_on_load() {
    let (_td, store) = store();
    let state = rich_state();
    let metadata = RunMetadata::new("001-oauth", "oauth", "specs/001-oauth");
    store.save(metadata, &state).unwrap();

    let path = store.state_dir().join("001-oauth.json");
    let mut raw: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    raw["future_extension"] = serde_json::json!({"anything": true});
    std::fs::write(&path, serde_json::to_string_pretty(&raw).unwrap()).unwrap();

    let loaded = store.load("001-oauth").unwrap();
    assert_eq!(loaded.state, state);
}

#[test]
fn serialized_output_is_stable_across_identical_saves() {
    let (_td, store) = store();
    let state = rich_state();
    let metadata = RunMetadata::new("001-oauth", "oauth", "specs/001-oauth");

    let saved = store.save(metadata, &state).unwrap();
    let path = store.state_dir().join("001-oauth.json");
    let first = std::fs::read_to_string(&path).unwrap();

    // Identical state, identical metadata: only updated_at may differ.
    store.save(saved, &state).unwrap();
    let second = std::fs::read_to_string(&path).unwrap();

    let strip = |s: &str| {
        s.lines()
            .filter(|l| !l.contains("updated_at"))
            .collect::<Vec<_>>()
            .join("\n")
    };
    assert_eq!(strip(&first), strip(&second));
}

//! Durable checkpoint persistence for workflow runs
//!
//! One JSON file per run under `<root>/.acp/state/<run-id>.json`, holding a
//! schema version, a metadata block, and the full serialized state. Writes
//! are atomic; loads run the migration chain when the stored schema is
//! older than the current one. The metadata file is the source of truth for
//! run enumeration and auto-resume.

use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

use crate::atomic_write::write_file_atomic;
use crate::state::{StateError, WorkflowState, MAX_RETRIES, SCHEMA_VERSION};
use crate::types::{Phase, RunStatus};

/// Per-run metadata stored alongside the state in each checkpoint file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMetadata {
    /// Run id in `NNN-slug` form; assigned once, immutable
    pub run_id: String,
    /// Slug of the original description, for display
    pub name: String,
    /// Stable identifier used by the checkpointer
    pub thread_id: String,
    pub status: RunStatus,
    pub phase: Phase,
    pub phases_completed: Vec<Phase>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Path to the run's artifact directory
    pub spec_path: String,
}

impl RunMetadata {
    /// Metadata for a brand-new run, stamped now.
    #[must_use]
    pub fn new(run_id: &str, name: &str, spec_path: &str) -> Self {
        let now = Utc::now();
        Self {
            run_id: run_id.to_string(),
            name: name.to_string(),
            thread_id: format!("thread-{run_id}"),
            status: RunStatus::Pending,
            phase: Phase::Init,
            phases_completed: Vec::new(),
            created_at: now,
            updated_at: now,
            spec_path: spec_path.to_string(),
        }
    }
}

/// Top-level checkpoint file structure (v1.0.0).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointData {
    pub schema_version: String,
    pub metadata: RunMetadata,
    pub state: WorkflowState,
}

/// Result of a successful [`CheckpointStore::load`].
#[derive(Debug)]
pub struct LoadedCheckpoint {
    pub state: WorkflowState,
    pub metadata: RunMetadata,
    /// True if the stored schema was older and a migration chain ran
    pub migrated: bool,
}

/// Errors raised by the checkpoint store.
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("no checkpoint found for run '{run_id}'")]
    NotFound { run_id: String },

    #[error("corrupted checkpoint for run '{run_id}': {reason}")]
    Corrupted { run_id: String, reason: String },

    #[error("checkpoint for run '{run_id}' has schema '{found}' with no migration path to '{current}'")]
    UnsupportedSchema {
        run_id: String,
        found: String,
        current: String,
    },

    #[error("migration {from} -> {to} failed for run '{run_id}': {reason}")]
    MigrationFailed {
        run_id: String,
        from: String,
        to: String,
        reason: String,
    },

    #[error("refusing to write run '{run_id}' as in_progress with {error_count} errors (retry budget exhausted)")]
    RetriesExhausted { run_id: String, error_count: u32 },

    #[error("state validation failed: {0}")]
    State(#[from] StateError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A migrator rewrites the raw checkpoint JSON from one schema version to
/// the next. Migrators never touch the typed state model.
type Migrator = fn(Value) -> Result<Value, String>;

/// Registry of `(from, to, migrator)` steps. `load` chains these until the
/// stored version reaches [`SCHEMA_VERSION`].
const MIGRATIONS: &[(&str, &str, Migrator)] = &[("0.9.0", "1.0.0", migrate_0_9_0_to_1_0_0)];

/// 0.9.0 -> 1.0.0: the metadata block used `feature_id` / `feature_name` /
/// `started_at` before those keys were renamed to `run_id` / `name` /
/// `created_at`.
fn migrate_0_9_0_to_1_0_0(mut raw: Value) -> Result<Value, String> {
    let metadata = raw
        .get_mut("metadata")
        .and_then(Value::as_object_mut)
        .ok_or_else(|| "missing metadata block".to_string())?;

    for (old, new) in [
        ("feature_id", "run_id"),
        ("feature_name", "name"),
        ("started_at", "created_at"),
    ] {
        if let Some(value) = metadata.remove(old) {
            metadata.entry(new).or_insert(value);
        }
    }

    if let Some(version) = raw.get_mut("schema_version") {
        *version = Value::String("1.0.0".to_string());
    }
    Ok(raw)
}

/// Durable save/load of run state plus metadata, keyed by run id.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    state_dir: Utf8PathBuf,
}

impl CheckpointStore {
    #[must_use]
    pub fn new(state_dir: impl Into<Utf8PathBuf>) -> Self {
        Self {
            state_dir: state_dir.into(),
        }
    }

    #[must_use]
    pub fn state_dir(&self) -> &Utf8Path {
        &self.state_dir
    }

    fn file_path(&self, run_id: &str) -> Utf8PathBuf {
        self.state_dir.join(format!("{run_id}.json"))
    }

    /// Validate and persist a checkpoint.
    ///
    /// `updated_at` is stamped here; `created_at` is preserved from the
    /// prior file if one exists. Returns the metadata as written.
    pub fn save(
        &self,
        mut metadata: RunMetadata,
        state: &WorkflowState,
    ) -> Result<RunMetadata, CheckpointError> {
        state.validate()?;

        // An exhausted retry budget must never be persisted as in_progress.
        if state.error_count >= MAX_RETRIES && metadata.status == RunStatus::InProgress {
            return Err(CheckpointError::RetriesExhausted {
                run_id: metadata.run_id.clone(),
                error_count: state.error_count,
            });
        }

        let path = self.file_path(&metadata.run_id);
        if let Ok(prior) = std::fs::read_to_string(&path) {
            if let Ok(data) = serde_json::from_str::<CheckpointData>(&prior) {
                metadata.created_at = data.metadata.created_at;
            }
        }
        metadata.updated_at = Utc::now();
        metadata.phase = state.phase;

        let data = CheckpointData {
            schema_version: SCHEMA_VERSION.to_string(),
            metadata: metadata.clone(),
            state: state.clone(),
        };

        let json = serde_json::to_string_pretty(&data).map_err(|e| CheckpointError::Corrupted {
            run_id: metadata.run_id.clone(),
            reason: format!("serialization failed: {e}"),
        })?;

        write_file_atomic(&path, &json).map_err(|e| {
            std::io::Error::other(format!("checkpoint write failed at {path}: {e:#}"))
        })?;

        Ok(metadata)
    }

    /// Load a checkpoint, migrating older schemas up to the current version.
    pub fn load(&self, run_id: &str) -> Result<LoadedCheckpoint, CheckpointError> {
        let path = self.file_path(run_id);
        let raw_text = std::fs::read_to_string(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                CheckpointError::NotFound {
                    run_id: run_id.to_string(),
                }
            } else {
                CheckpointError::Io(e)
            }
        })?;

        let mut raw: Value =
            serde_json::from_str(&raw_text).map_err(|e| CheckpointError::Corrupted {
                run_id: run_id.to_string(),
                reason: format!("invalid JSON: {e}"),
            })?;

        let mut version = raw
            .get("schema_version")
            .and_then(Value::as_str)
            .ok_or_else(|| CheckpointError::Corrupted {
                run_id: run_id.to_string(),
                reason: "missing schema_version".to_string(),
            })?
            .to_string();

        let mut migrated = false;
        while version != SCHEMA_VERSION {
            let step = MIGRATIONS
                .iter()
                .find(|(from, _, _)| *from == version)
                .ok_or_else(|| CheckpointError::UnsupportedSchema {
                    run_id: run_id.to_string(),
                    found: version.clone(),
                    current: SCHEMA_VERSION.to_string(),
                })?;

            raw = step.2(raw).map_err(|reason| CheckpointError::MigrationFailed {
                run_id: run_id.to_string(),
                from: step.0.to_string(),
                to: step.1.to_string(),
                reason,
            })?;
            version = step.1.to_string();
            migrated = true;
        }

        let data: CheckpointData =
            serde_json::from_value(raw).map_err(|e| CheckpointError::Corrupted {
                run_id: run_id.to_string(),
                reason: format!("schema mismatch: {e}"),
            })?;

        data.state.validate()?;

        Ok(LoadedCheckpoint {
            state: data.state,
            metadata: data.metadata,
            migrated,
        })
    }

    /// Enumerate all runs, most recently updated first. Corrupted files are
    /// skipped with a warning; enumeration itself never fails on them.
    pub fn list(&self) -> Result<Vec<RunMetadata>, CheckpointError> {
        let mut runs = Vec::new();

        let entries = match std::fs::read_dir(&self.state_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(runs),
            Err(e) => return Err(CheckpointError::Io(e)),
        };

        for entry in entries {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(run_id) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };

            match self.load(run_id) {
                Ok(loaded) => runs.push(loaded.metadata),
                Err(e) => {
                    warn!(run_id, error = %e, "skipping unreadable checkpoint");
                }
            }
        }

        runs.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(runs)
    }

    /// Run id of the most recently updated checkpoint, if any.
    pub fn latest(&self) -> Result<Option<String>, CheckpointError> {
        Ok(self.list()?.into_iter().next().map(|m| m.run_id))
    }

    /// Exact lookup by run id.
    pub fn by_id(&self, run_id: &str) -> Result<LoadedCheckpoint, CheckpointError> {
        self.load(run_id)
    }

    /// True if a checkpoint file exists for the run.
    #[must_use]
    pub fn exists(&self, run_id: &str) -> bool {
        self.file_path(run_id).is_file()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;

    fn store() -> (tempfile::TempDir, CheckpointStore) {
        let td = tempfile::TempDir::new().unwrap();
        let dir = Utf8PathBuf::from_path_buf(td.path().join("state")).unwrap();
        (td, CheckpointStore::new(dir))
    }

    fn sample() -> (RunMetadata, WorkflowState) {
        let metadata = RunMetadata::new("001-add-search", "add-search", "specs/001-add-search");
        let state = WorkflowState::for_run("Add search", "# Constitution");
        (metadata, state)
    }

    #[test]
    fn save_then_load_round_trips() {
        let (_td, store) = store();
        let (metadata, state) = sample();

        store.save(metadata.clone(), &state).unwrap();
        let loaded = store.load("001-add-search").unwrap();

        assert_eq!(loaded.state, state);
        assert_eq!(loaded.metadata.run_id, metadata.run_id);
        assert!(!loaded.migrated);
    }

    #[test]
    fn save_preserves_created_at_and_bumps_updated_at() {
        let (_td, store) = store();
        let (metadata, state) = sample();

        let first = store.save(metadata, &state).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        let second = store.save(first.clone(), &state).unwrap();

        assert_eq!(second.created_at, first.created_at);
        assert!(second.updated_at >= first.updated_at);
    }

    #[test]
    fn load_missing_is_not_found() {
        let (_td, store) = store();
        let err = store.load("404-missing").unwrap_err();
        assert!(matches!(err, CheckpointError::NotFound { .. }));
    }

    #[test]
    fn load_invalid_json_is_corrupted() {
        let (_td, store) = store();
        let (metadata, state) = sample();
        store.save(metadata, &state).unwrap();

        let path = store.file_path("001-add-search");
        std::fs::write(&path, "{ not json").unwrap();

        let err = store.load("001-add-search").unwrap_err();
        assert!(matches!(err, CheckpointError::Corrupted { .. }));
    }

    #[test]
    fn list_skips_corrupted_files() {
        let (_td, store) = store();
        let (metadata, state) = sample();
        store.save(metadata, &state).unwrap();

        let other = RunMetadata::new("002-other", "other", "specs/002-other");
        store.save(other, &state).unwrap();
        std::fs::write(store.file_path("002-other"), "truncated{").unwrap();

        let runs = store.list().unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].run_id, "001-add-search");
    }

    #[test]
    fn latest_orders_by_updated_at() {
        let (_td, store) = store();
        let (_, state) = sample();

        let a = RunMetadata::new("001-first", "first", "specs/001-first");
        let b = RunMetadata::new("002-second", "second", "specs/002-second");
        store.save(a, &state).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        store.save(b, &state).unwrap();

        assert_eq!(store.latest().unwrap().as_deref(), Some("002-second"));
    }

    #[test]
    fn exhausted_retry_budget_cannot_be_in_progress() {
        let (_td, store) = store();
        let (mut metadata, mut state) = sample();
        state.error_count = MAX_RETRIES;
        metadata.status = RunStatus::InProgress;

        let err = store.save(metadata.clone(), &state).unwrap_err();
        assert!(matches!(err, CheckpointError::RetriesExhausted { .. }));

        // The same state persists fine once the run is marked failed.
        metadata.status = RunStatus::Failed;
        store.save(metadata, &state).unwrap();
    }

    #[test]
    fn migration_chain_renames_legacy_metadata_keys() {
        let (_td, store) = store();
        crate::paths::ensure_dir_all(store.state_dir()).unwrap();

        let legacy = serde_json::json!({
            "schema_version": "0.9.0",
            "metadata": {
                "feature_id": "001-legacy",
                "feature_name": "legacy",
                "thread_id": "thread-001-legacy",
                "status": "paused",
                "phase": "specify",
                "phases_completed": ["specify"],
                "started_at": "2025-01-01T00:00:00Z",
                "updated_at": "2025-01-02T00:00:00Z",
                "spec_path": "specs/001-legacy"
            },
            "state": {
                "constitution": "# Constitution",
                "governance_passes": true,
                "feature_description": "legacy feature",
                "spec": "# Spec",
                "phase": "specify"
            }
        });
        std::fs::write(store.file_path("001-legacy"), legacy.to_string()).unwrap();

        let loaded = store.load("001-legacy").unwrap();
        assert!(loaded.migrated);
        assert_eq!(loaded.metadata.run_id, "001-legacy");
        assert_eq!(loaded.metadata.name, "legacy");
    }

    #[test]
    fn unknown_schema_with_no_path_is_unsupported() {
        let (_td, store) = store();
        crate::paths::ensure_dir_all(store.state_dir()).unwrap();

        let future = serde_json::json!({
            "schema_version": "9.9.9",
            "metadata": {},
            "state": {}
        });
        std::fs::write(store.file_path("001-future"), future.to_string()).unwrap();

        let err = store.load("001-future").unwrap_err();
        assert!(matches!(err, CheckpointError::UnsupportedSchema { .. }));
    }
}

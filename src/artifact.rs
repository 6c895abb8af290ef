//! Artifact storage under `specs/<run-id>/`
//!
//! Owns the per-run artifact tree with its fixed inventory: `spec.md`,
//! `research.md`, `plan.md`, `data-model.md`, `quickstart.md`, zero or more
//! `contracts/<name>.yaml`, and a code subtree for the implementation phase.
//! Run-id allocation lives here because the next ordinal is a property of
//! the directory tree.

use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use regex::Regex;
use std::sync::LazyLock;
use unicode_normalization::UnicodeNormalization;

use crate::atomic_write::write_file_atomic;
use crate::paths::ensure_dir_all;

/// Fixed artifact filenames.
pub const SPEC_FILE: &str = "spec.md";
pub const RESEARCH_FILE: &str = "research.md";
pub const PLAN_FILE: &str = "plan.md";
pub const DATA_MODEL_FILE: &str = "data-model.md";
pub const QUICKSTART_FILE: &str = "quickstart.md";
pub const CONTRACTS_DIR: &str = "contracts";

/// Maximum slug length in a run id. Longer descriptions are cut on a hyphen
/// boundary where one exists within the bound.
pub const MAX_SLUG_LEN: usize = 50;

static RUN_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]{3}-[a-z0-9]+(-[a-z0-9]+)*$").expect("valid run id regex"));

static ORDINAL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([0-9]{3})-").expect("valid ordinal regex"));

/// True if `id` is a well-formed `NNN-slug` run id.
#[must_use]
pub fn is_valid_run_id(id: &str) -> bool {
    RUN_ID_RE.is_match(id)
}

/// Derive a slug from a feature description: NFKC-normalize, lowercase,
/// strip non-word characters, collapse whitespace and runs of hyphens into
/// single hyphens, then truncate to [`MAX_SLUG_LEN`].
///
/// Returns "feature" for descriptions with no usable characters so run ids
/// always satisfy the id grammar.
#[must_use]
pub fn slugify(description: &str) -> String {
    let normalized: String = description.nfkc().collect();

    let mut slug = String::with_capacity(normalized.len());
    let mut last_was_hyphen = true; // suppress leading hyphens
    for c in normalized.chars() {
        let c = c.to_ascii_lowercase();
        if c.is_ascii_alphanumeric() {
            slug.push(c);
            last_was_hyphen = false;
        } else if !last_was_hyphen {
            slug.push('-');
            last_was_hyphen = true;
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }

    if slug.len() > MAX_SLUG_LEN {
        // Prefer cutting at a hyphen so the slug stays readable.
        let cut = slug[..=MAX_SLUG_LEN]
            .rfind('-')
            .unwrap_or(MAX_SLUG_LEN);
        slug.truncate(cut);
        while slug.ends_with('-') {
            slug.pop();
        }
    }

    if slug.is_empty() {
        "feature".to_string()
    } else {
        slug
    }
}

/// Read/write access to the on-disk artifact tree rooted at `specs/`.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    specs_dir: Utf8PathBuf,
}

impl ArtifactStore {
    #[must_use]
    pub fn new(specs_dir: impl Into<Utf8PathBuf>) -> Self {
        Self {
            specs_dir: specs_dir.into(),
        }
    }

    #[must_use]
    pub fn specs_dir(&self) -> &Utf8Path {
        &self.specs_dir
    }

    /// Directory for one run's artifacts.
    #[must_use]
    pub fn run_dir(&self, run_id: &str) -> Utf8PathBuf {
        self.specs_dir.join(run_id)
    }

    /// Create the run directory together with its `contracts/` subdirectory.
    pub fn create_run_dir(&self, run_id: &str) -> Result<Utf8PathBuf> {
        let dir = self.run_dir(run_id);
        ensure_dir_all(&dir).with_context(|| format!("Failed to create run directory: {dir}"))?;
        ensure_dir_all(dir.join(CONTRACTS_DIR))
            .with_context(|| format!("Failed to create contracts directory under: {dir}"))?;
        Ok(dir)
    }

    /// Atomically write a text artifact at a path relative to the run
    /// directory. Overwrites are idempotent.
    pub fn write_text(&self, run_id: &str, rel_path: &str, content: &str) -> Result<Utf8PathBuf> {
        let path = self.run_dir(run_id).join(rel_path);
        write_file_atomic(&path, content)?;
        Ok(path)
    }

    /// Read a text artifact relative to the run directory.
    pub fn read_text(&self, run_id: &str, rel_path: &str) -> Result<String> {
        let path = self.run_dir(run_id).join(rel_path);
        std::fs::read_to_string(&path).with_context(|| format!("Failed to read artifact: {path}"))
    }

    /// True if the artifact exists on disk.
    #[must_use]
    pub fn exists(&self, run_id: &str, rel_path: &str) -> bool {
        self.run_dir(run_id).join(rel_path).is_file()
    }

    /// Contract filenames present under `contracts/`, sorted by name.
    pub fn list_contracts(&self, run_id: &str) -> Result<Vec<String>> {
        let dir = self.run_dir(run_id).join(CONTRACTS_DIR);
        let mut names = Vec::new();

        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(names),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to list contracts under: {dir}"))
            }
        };

        for entry in entries {
            let entry = entry.with_context(|| format!("Failed to list contracts under: {dir}"))?;
            if entry.path().is_file() {
                if let Some(name) = entry.file_name().to_str() {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    /// Allocate the next run id for a description: scan existing run
    /// directories for the highest ordinal, add one, and append the slug.
    ///
    /// Allocation is racy across concurrent processes; callers serialize.
    pub fn next_run_id(&self, description: &str) -> Result<String> {
        let mut max_ordinal: u32 = 0;

        if let Ok(entries) = std::fs::read_dir(&self.specs_dir) {
            for entry in entries.flatten() {
                if !entry.path().is_dir() {
                    continue;
                }
                let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                    continue;
                };
                if let Some(caps) = ORDINAL_RE.captures(&name) {
                    if let Ok(ordinal) = caps[1].parse::<u32>() {
                        max_ordinal = max_ordinal.max(ordinal);
                    }
                }
            }
        }

        let ordinal = max_ordinal + 1;
        let slug = slugify(description);
        Ok(format!("{ordinal:03}-{slug}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, ArtifactStore) {
        let td = tempfile::TempDir::new().unwrap();
        let dir = Utf8PathBuf::from_path_buf(td.path().join("specs")).unwrap();
        (td, ArtifactStore::new(dir))
    }

    #[test]
    fn slugify_lowercases_and_hyphenates() {
        assert_eq!(
            slugify("Add OAuth2 authentication with Google and GitHub providers"),
            "add-oauth2-authentication-with-google-and-github"
        );
        assert_eq!(slugify("Build REST API using PostgreSQL"), "build-rest-api-using-postgresql");
    }

    #[test]
    fn slugify_strips_punctuation_and_collapses() {
        assert_eq!(slugify("  hello,   world!!  "), "hello-world");
        assert_eq!(slugify("a--b__c"), "a-b-c");
    }

    #[test]
    fn slugify_normalizes_unicode_confusables() {
        assert_eq!(slugify("ｆｕｌｌｗｉｄｔｈ ｓｌｕｇ"), "fullwidth-slug");
    }

    #[test]
    fn slugify_truncates_on_hyphen_boundary() {
        let long = "this description is quite long and keeps going with many words";
        let slug = slugify(long);
        assert!(slug.len() <= MAX_SLUG_LEN);
        assert!(!slug.ends_with('-'));
    }

    #[test]
    fn slugify_never_produces_empty_slug() {
        assert_eq!(slugify("!!!"), "feature");
        assert_eq!(slugify(""), "feature");
    }

    #[test]
    fn slugs_always_fit_run_id_grammar() {
        for desc in ["Add search", "REST!", "123 numbers", "ｗｉｄｅ"] {
            let id = format!("001-{}", slugify(desc));
            assert!(is_valid_run_id(&id), "invalid run id from {desc:?}: {id}");
        }
    }

    #[test]
    fn run_id_grammar() {
        assert!(is_valid_run_id("001-add-search"));
        assert!(is_valid_run_id("042-a"));
        assert!(!is_valid_run_id("1-add-search"));
        assert!(!is_valid_run_id("001-Add-Search"));
        assert!(!is_valid_run_id("001-"));
        assert!(!is_valid_run_id("001-add--search"));
    }

    #[test]
    fn next_run_id_starts_at_one_and_increments() {
        let (_td, store) = store();
        assert_eq!(store.next_run_id("Add search").unwrap(), "001-add-search");

        store.create_run_dir("001-add-search").unwrap();
        store.create_run_dir("007-other").unwrap();
        assert_eq!(store.next_run_id("more").unwrap(), "008-more");
    }

    #[test]
    fn write_and_read_round_trip() {
        let (_td, store) = store();
        store.create_run_dir("001-demo").unwrap();
        store.write_text("001-demo", SPEC_FILE, "# Spec\n").unwrap();
        assert_eq!(store.read_text("001-demo", SPEC_FILE).unwrap(), "# Spec\n");
        assert!(store.exists("001-demo", SPEC_FILE));
    }

    #[test]
    fn list_contracts_sorted() {
        let (_td, store) = store();
        store.create_run_dir("001-demo").unwrap();
        store
            .write_text("001-demo", "contracts/users.yaml", "openapi: 3.0.0\n")
            .unwrap();
        store
            .write_text("001-demo", "contracts/auth.yaml", "openapi: 3.0.0\n")
            .unwrap();

        assert_eq!(
            store.list_contracts("001-demo").unwrap(),
            vec!["auth.yaml".to_string(), "users.yaml".to_string()]
        );
    }

    #[test]
    fn list_contracts_empty_when_dir_missing() {
        let (_td, store) = store();
        assert!(store.list_contracts("001-none").unwrap().is_empty());
    }
}

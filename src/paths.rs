//! Workspace layout resolution for acpctl
//!
//! All on-disk locations hang off a single workspace root: `.acp/` for the
//! engine's own files (constitution template, checkpoints) and `specs/` for
//! per-run artifacts. Tests redirect the root through a thread-local override
//! so they never touch the process working directory.

use camino::{Utf8Path, Utf8PathBuf};
use std::cell::RefCell;

// Thread-local override used only in tests to avoid process-global env races.
thread_local! {
    static THREAD_ROOT: RefCell<Option<Utf8PathBuf>> = const { RefCell::new(None) };
}

/// Resolve the workspace root:
/// 1) thread-local override (tests use this)
/// 2) default "." (the current working directory)
#[must_use]
pub fn workspace_root() -> Utf8PathBuf {
    if let Some(tl) = THREAD_ROOT.with(|tl| tl.borrow().clone()) {
        return tl;
    }
    Utf8PathBuf::from(".")
}

/// On-disk layout of one workspace.
///
/// ```text
/// <root>/
///   .acp/
///     templates/constitution.md
///     state/<run-id>.json
///   specs/<run-id>/
/// ```
#[derive(Debug, Clone)]
pub struct AcpPaths {
    root: Utf8PathBuf,
}

impl AcpPaths {
    /// Layout rooted at an explicit directory.
    #[must_use]
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Layout rooted at the resolved workspace root.
    #[must_use]
    pub fn discover() -> Self {
        Self::new(workspace_root())
    }

    #[must_use]
    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    /// Returns `<root>/.acp`
    #[must_use]
    pub fn acp_dir(&self) -> Utf8PathBuf {
        self.root.join(".acp")
    }

    /// Returns `<root>/.acp/templates`
    #[must_use]
    pub fn templates_dir(&self) -> Utf8PathBuf {
        self.acp_dir().join("templates")
    }

    /// Returns `<root>/.acp/templates/constitution.md`
    #[must_use]
    pub fn constitution_path(&self) -> Utf8PathBuf {
        self.templates_dir().join("constitution.md")
    }

    /// Returns `<root>/.acp/state`
    #[must_use]
    pub fn state_dir(&self) -> Utf8PathBuf {
        self.acp_dir().join("state")
    }

    /// Returns `<root>/specs`
    #[must_use]
    pub fn specs_dir(&self) -> Utf8PathBuf {
        self.root.join("specs")
    }

    /// Returns `<root>/.gitignore`
    #[must_use]
    pub fn gitignore_path(&self) -> Utf8PathBuf {
        self.root.join(".gitignore")
    }
}

/// mkdir -p; treat `AlreadyExists` as success (removes TOCTTOU races)
pub fn ensure_dir_all<P: AsRef<std::path::Path>>(p: P) -> std::io::Result<()> {
    match std::fs::create_dir_all(&p) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(()),
        Err(e) => Err(e),
    }
}

/// Test helper: give this test a unique workspace under the system temp dir.
/// Hold the `TempDir` for the test's duration so the directory stays alive.
#[cfg(any(test, feature = "test-utils"))]
#[cfg_attr(not(test), allow(dead_code))]
#[must_use]
pub fn with_isolated_root() -> tempfile::TempDir {
    let td = tempfile::TempDir::new().expect("create temp workspace");
    let p = Utf8PathBuf::from_path_buf(td.path().to_path_buf()).unwrap();
    THREAD_ROOT.with(|tl| *tl.borrow_mut() = Some(p));
    td
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_hangs_off_root() {
        let paths = AcpPaths::new("/work/repo");
        assert_eq!(
            paths.constitution_path(),
            "/work/repo/.acp/templates/constitution.md"
        );
        assert_eq!(paths.state_dir(), "/work/repo/.acp/state");
        assert_eq!(paths.specs_dir(), "/work/repo/specs");
    }

    #[test]
    fn isolated_root_overrides_discovery() {
        let td = with_isolated_root();
        let paths = AcpPaths::discover();
        assert_eq!(paths.root(), td.path().to_str().unwrap());
    }
}

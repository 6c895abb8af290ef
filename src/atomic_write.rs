//! Atomic file writes for checkpoints and artifacts
//!
//! Both stores funnel every write through this module: write to a temporary
//! file in the target directory, fsync, then rename over the destination. A
//! crash at any point leaves either the old file or the new file, never a
//! partial one.

use anyhow::{Context, Result};
use camino::Utf8Path;
use std::fs;
use std::io::Write;

use tempfile::NamedTempFile;

/// Atomically write content to a file using temp file + fsync + rename.
///
/// Line endings are normalized to LF so checkpoints and artifacts diff
/// cleanly across platforms. The parent directory is created if missing.
pub fn write_file_atomic(path: &Utf8Path, content: &str) -> Result<()> {
    let normalized = normalize_line_endings(content);

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create parent directory: {parent}"))?;
    }

    // The temp file must live in the same directory as the target so the
    // final rename stays on one filesystem.
    let temp_dir = path.parent().unwrap_or_else(|| Utf8Path::new("."));
    let mut temp_file = NamedTempFile::new_in(temp_dir)
        .with_context(|| format!("Failed to create temporary file in: {temp_dir}"))?;

    temp_file
        .write_all(normalized.as_bytes())
        .context("Failed to write content to temporary file")?;

    temp_file
        .as_file()
        .sync_all()
        .context("Failed to fsync temporary file")?;

    temp_file
        .persist(path.as_std_path())
        .with_context(|| format!("Failed to atomically write file: {path}"))?;

    Ok(())
}

fn normalize_line_endings(content: &str) -> String {
    content.replace("\r\n", "\n").replace('\r', "\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;

    #[test]
    fn write_creates_parent_and_file() {
        let td = tempfile::TempDir::new().unwrap();
        let root = Utf8PathBuf::from_path_buf(td.path().to_path_buf()).unwrap();
        let path = root.join("nested/dir/out.md");

        write_file_atomic(&path, "hello\n").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "hello\n");
    }

    #[test]
    fn write_replaces_existing_content() {
        let td = tempfile::TempDir::new().unwrap();
        let root = Utf8PathBuf::from_path_buf(td.path().to_path_buf()).unwrap();
        let path = root.join("out.json");

        write_file_atomic(&path, "first").unwrap();
        write_file_atomic(&path, "second").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "second");
    }

    #[test]
    fn crlf_is_normalized_to_lf() {
        let td = tempfile::TempDir::new().unwrap();
        let root = Utf8PathBuf::from_path_buf(td.path().to_path_buf()).unwrap();
        let path = root.join("out.txt");

        write_file_atomic(&path, "a\r\nb\rc\n").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "a\nb\nc\n");
    }
}
